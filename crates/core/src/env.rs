//! Environment variable parsing shared by the configuration structs.
//!
//! Every config type exposes `from_env()` plus a `from_lookup()` variant
//! that takes a key lookup closure, so tests never touch process state.

use std::str::FromStr;

use crate::error::CoreError;

/// Parse `key` with `FromStr`, falling back to `default` when unset or blank.
pub fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, CoreError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            CoreError::Validation(format!("{key} has an invalid value: {raw:?}"))
        }),
    }
}

/// String value of `key`, or `default` when unset or blank.
pub fn string_or<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Boolean value of `key`. Accepts `true/false`, `1/0`, `yes/no`, `on/off`.
pub fn bool_or<F>(lookup: &F, key: &str, default: bool) -> Result<bool, CoreError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key).filter(|v| !v.trim().is_empty()) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(CoreError::Validation(format!(
            "{key} must be a boolean, got {raw:?}"
        ))),
    }
}

/// Lookup backed by the process environment.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
