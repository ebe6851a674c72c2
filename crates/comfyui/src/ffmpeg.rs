//! FFmpeg/FFprobe command helpers for the dialogue track.
//!
//! Argument lists are built by pure functions so they can be tested
//! without the binaries installed.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use storyreel_core::audio_timeline::MergeOptions;

#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("no audio clips to mix")]
    NothingToMix,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Duration in seconds of a media file or URL.
pub async fn probe_duration(input: &Path) -> Result<f64, FfmpegError> {
    let output = tokio::process::Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(input)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    parse_probe_duration(&String::from_utf8_lossy(&output.stdout))
}

fn parse_probe_duration(stdout: &str) -> Result<f64, FfmpegError> {
    let probe: ProbeOutput = serde_json::from_str(stdout)
        .map_err(|e| FfmpegError::ParseError(format!("{e}: {stdout}")))?;
    probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| FfmpegError::ParseError(format!("missing duration: {stdout}")))
}

// ---------------------------------------------------------------------------
// Mixing
// ---------------------------------------------------------------------------

/// `filter_complex` that delays each input to its start offset and mixes
/// them into `[out]`.
pub fn mix_filter(start_offsets_secs: &[f64]) -> String {
    let mut parts: Vec<String> = start_offsets_secs
        .iter()
        .enumerate()
        .map(|(i, start)| {
            let ms = (start.max(0.0) * 1000.0).round() as u64;
            format!("[{i}:a]adelay={ms}|{ms}[a{i}]")
        })
        .collect();
    let labels: String = (0..start_offsets_secs.len())
        .map(|i| format!("[a{i}]"))
        .collect();
    parts.push(format!(
        "{labels}amix=inputs={}:duration=longest:normalize=0[out]",
        start_offsets_secs.len()
    ));
    parts.join(";")
}

/// Lay out `clips` (path, start offset) onto one track at `output`.
pub async fn mix_clips(clips: &[(PathBuf, f64)], output: &Path) -> Result<(), FfmpegError> {
    if clips.is_empty() {
        return Err(FfmpegError::NothingToMix);
    }
    let mut cmd = tokio::process::Command::new("ffmpeg");
    cmd.arg("-y");
    for (path, _) in clips {
        cmd.arg("-i").arg(path);
    }
    let starts: Vec<f64> = clips.iter().map(|(_, s)| *s).collect();
    cmd.args(["-filter_complex", &mix_filter(&starts), "-map", "[out]"])
        .arg(output);
    run(cmd).await
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Arguments merging `audio` onto `video` with fades, ending at the
/// shorter stream.
pub fn merge_args(
    video: &str,
    audio: &str,
    output: &Path,
    options: MergeOptions,
    audio_duration_secs: f64,
) -> Vec<String> {
    let mut args: Vec<String> = [
        "-y", "-i", video, "-i", audio, "-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy", "-c:a",
        "aac",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let mut filters = Vec::new();
    if options.fade_in_secs > 0.0 {
        filters.push(format!("afade=t=in:st=0:d={}", options.fade_in_secs));
    }
    if options.fade_out_secs > 0.0 {
        filters.push(format!(
            "afade=t=out:st={}:d={}",
            options.fade_out_start(audio_duration_secs),
            options.fade_out_secs
        ));
    }
    if !filters.is_empty() {
        args.push("-af".to_string());
        args.push(filters.join(","));
    }
    args.push("-shortest".to_string());
    args.push(output.to_string_lossy().to_string());
    args
}

pub async fn merge_video_audio(
    video: &str,
    audio: &str,
    output: &Path,
    options: MergeOptions,
    audio_duration_secs: f64,
) -> Result<(), FfmpegError> {
    let mut cmd = tokio::process::Command::new("ffmpeg");
    cmd.args(merge_args(video, audio, output, options, audio_duration_secs));
    run(cmd).await
}

async fn run(mut cmd: tokio::process::Command) -> Result<(), FfmpegError> {
    let output = cmd.output().await.map_err(FfmpegError::NotFound)?;
    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_duration_parses_format_duration() {
        let d = parse_probe_duration(r#"{"format": {"duration": "2.480000"}}"#).unwrap();
        assert!((d - 2.48).abs() < 1e-9);
    }

    #[test]
    fn probe_without_duration_is_an_error() {
        assert!(parse_probe_duration(r#"{"format": {}}"#).is_err());
    }

    #[test]
    fn mix_filter_delays_each_clip() {
        assert_eq!(
            mix_filter(&[0.5, 3.25]),
            "[0:a]adelay=500|500[a0];[1:a]adelay=3250|3250[a1];\
             [a0][a1]amix=inputs=2:duration=longest:normalize=0[out]"
        );
    }

    #[test]
    fn merge_args_apply_fades_and_shortest() {
        let args = merge_args(
            "in.mp4",
            "dialogue.wav",
            Path::new("out.mp4"),
            MergeOptions {
                fade_in_secs: 0.3,
                fade_out_secs: 0.5,
            },
            4.0,
        );
        let af = args.iter().position(|a| a == "-af").unwrap();
        assert_eq!(args[af + 1], "afade=t=in:st=0:d=0.3,afade=t=out:st=3.5:d=0.5");
        assert_eq!(args[args.len() - 2], "-shortest");
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn merge_args_without_fades_skip_filter() {
        let args = merge_args(
            "in.mp4",
            "a.wav",
            Path::new("o.mp4"),
            MergeOptions {
                fade_in_secs: 0.0,
                fade_out_secs: 0.0,
            },
            1.0,
        );
        assert!(!args.iter().any(|a| a == "-af"));
    }
}
