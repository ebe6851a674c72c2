//! [`AudioBackend`] implementation: voice service synthesis plus local
//! ffmpeg mixing and muxing.
//!
//! Every synthesis run gets its own scratch directory under the media
//! work dir; the merged video is written next to it. A line the voice
//! service cannot render is left out of the track; synthesis fails only
//! when no line could be rendered.

use std::future::Future;
use std::path::{Path, PathBuf};

use storyreel_core::audio_timeline::{AudioTimeline, MergeOptions, PlannedLine, VoiceSource};
use storyreel_core::backend::{AudioBackend, GenerationObserver, SynthesisOptions, SynthesizedDialogue};
use storyreel_core::error::BackendError;
use storyreel_core::types::ArtifactRef;

use crate::config::ServiceConfig;
use crate::ffmpeg::{self, FfmpegError};
use crate::voice::VoiceServiceApi;

impl From<FfmpegError> for BackendError {
    fn from(err: FfmpegError) -> Self {
        BackendError::Generation(err.to_string())
    }
}

pub struct MediaAudioBackend {
    voice: VoiceServiceApi,
    work_dir: PathBuf,
}

impl MediaAudioBackend {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            voice: VoiceServiceApi::new(config.voice_url.clone()),
            work_dir: config.media_work_dir.clone(),
        }
    }

    async fn run_dir(&self) -> Result<PathBuf, BackendError> {
        let dir = self.work_dir.join(uuid::Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| BackendError::Generation(format!("cannot create {}: {e}", dir.display())))?;
        Ok(dir)
    }

    /// Render one line to a clip in `dir` and measure it.
    async fn render_line(
        &self,
        dir: &Path,
        index: usize,
        line: &PlannedLine,
        use_fallback: bool,
    ) -> Result<(PathBuf, f64), BackendError> {
        let bytes = self.synthesize_line(line, use_fallback).await?;
        let path = dir.join(format!("line-{index:03}.wav"));
        write_clip(&path, &bytes).await?;
        let duration = ffmpeg::probe_duration(&path).await?;
        Ok((path, duration))
    }

    async fn synthesize_line(
        &self,
        line: &PlannedLine,
        use_fallback: bool,
    ) -> Result<Vec<u8>, BackendError> {
        let text = line.line.text.as_str();
        let bytes = match (line.source, &line.voice_clone, &line.speech_pattern) {
            (VoiceSource::VoiceClone, Some(voice), _) => {
                self.voice.synthesize_clone(text, voice).await?
            }
            (VoiceSource::SpeechPatternFallback, _, Some(pattern)) if use_fallback => {
                self.voice.synthesize_pattern(text, pattern).await?
            }
            _ => {
                return Err(BackendError::Generation(format!(
                    "No usable voice for {}",
                    line.line.character
                )))
            }
        };
        Ok(bytes)
    }
}

async fn write_clip(path: &Path, bytes: &[u8]) -> Result<(), BackendError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| BackendError::Generation(format!("cannot write {}: {e}", path.display())))
}

/// Lines that were rendered, with their clip and measured duration.
#[derive(Debug)]
struct RenderedLines {
    lines: Vec<PlannedLine>,
    clips: Vec<PathBuf>,
    durations: Vec<f64>,
}

/// Render every line in order, skipping the ones that fail.
///
/// Progress counts skipped lines too. Errors only when nothing rendered.
async fn render_all<'a, F, Fut>(
    lines: &'a [PlannedLine],
    observer: &dyn GenerationObserver,
    mut render: F,
) -> Result<RenderedLines, BackendError>
where
    F: FnMut(usize, &'a PlannedLine) -> Fut,
    Fut: Future<Output = Result<(PathBuf, f64), BackendError>>,
{
    let mut rendered = RenderedLines {
        lines: Vec::with_capacity(lines.len()),
        clips: Vec::with_capacity(lines.len()),
        durations: Vec::with_capacity(lines.len()),
    };
    let mut last_error = None;

    for (i, line) in lines.iter().enumerate() {
        match render(i, line).await {
            Ok((clip, duration)) => {
                tracing::debug!(
                    character = %line.line.character,
                    source = ?line.source,
                    duration_secs = duration,
                    "Line synthesized",
                );
                rendered.lines.push(line.clone());
                rendered.clips.push(clip);
                rendered.durations.push(duration);
            }
            Err(e) => {
                tracing::warn!(
                    character = %line.line.character,
                    source = ?line.source,
                    error = %e,
                    "Line skipped",
                );
                last_error = Some(e);
            }
        }
        observer.on_progress((i + 1) as f64 / lines.len() as f64 * 100.0);
    }

    match last_error {
        Some(e) if rendered.lines.is_empty() => Err(e),
        _ => Ok(rendered),
    }
}

#[async_trait::async_trait]
impl AudioBackend for MediaAudioBackend {
    async fn synthesize_dialogue_audio(
        &self,
        lines: &[PlannedLine],
        options: SynthesisOptions,
        observer: &dyn GenerationObserver,
    ) -> Result<SynthesizedDialogue, BackendError> {
        if lines.is_empty() {
            return Err(BackendError::Generation("No dialogue lines to synthesize".to_string()));
        }
        let run_dir = self.run_dir().await?;
        let dir = run_dir.as_path();
        let use_fallback = options.use_fallback;
        let rendered = render_all(lines, observer, move |i, line| {
            self.render_line(dir, i, line, use_fallback)
        })
        .await?;

        let timeline = AudioTimeline::build(&rendered.lines, &rendered.durations, options.timeline)
            .map_err(|e| BackendError::Generation(e.to_string()))?;
        let placed: Vec<(PathBuf, f64)> = rendered
            .clips
            .into_iter()
            .zip(timeline.segments().iter().map(|s| s.start_offset_secs))
            .collect();

        let output = run_dir.join("dialogue.wav");
        ffmpeg::mix_clips(&placed, &output).await?;
        tracing::info!(
            lines = timeline.segments().len(),
            skipped = lines.len() - timeline.segments().len(),
            total_secs = timeline.total_duration_secs(),
            path = %output.display(),
            "Dialogue track mixed",
        );

        Ok(SynthesizedDialogue {
            audio: output.to_string_lossy().to_string(),
            timeline,
        })
    }

    async fn merge_video_audio(
        &self,
        video: &str,
        audio: &str,
        audio_duration_secs: f64,
        options: MergeOptions,
    ) -> Result<ArtifactRef, BackendError> {
        let dir = self.run_dir().await?;
        let output = dir.join("merged.mp4");
        ffmpeg::merge_video_audio(video, audio, &output, options, audio_duration_secs).await?;
        tracing::info!(
            path = %output.display(),
            fade_out_start = options.fade_out_start(audio_duration_secs),
            "Video and dialogue merged",
        );
        Ok(output.to_string_lossy().to_string())
    }
}
