//! Domain logic for shot generation: screenplay model, seeds, continuity,
//! regeneration strategy, request building and audio timelines.
//!
//! Everything here is pure or trait-only; I/O lives in the service and
//! pipeline crates.

pub mod audio_timeline;
pub mod backend;
pub mod continuity;
pub mod env;
pub mod error;
pub mod generation;
pub mod job_events;
pub mod regeneration;
pub mod screenplay;
pub mod seed;
pub mod types;
