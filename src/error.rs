//! Error types shared by the pipeline stages

use std::path::PathBuf;

use crate::types::Speaker;

/// The voice service could not produce a usable clip within the retry budget
#[derive(Debug, thiserror::Error)]
#[error("speech synthesis for {speaker:?} failed after {attempts} attempts: {source:#}")]
pub struct SynthesisError {
    pub speaker: Speaker,
    pub attempts: u32,
    #[source]
    pub source: anyhow::Error,
}

/// The image service could not produce an illustration within the retry budget.
/// Never fatal: callers turn it into an absent image.
#[derive(Debug, thiserror::Error)]
#[error("illustration for line {line} failed after {attempts} attempts: {source:#}")]
pub struct IllustrationError {
    pub line: usize,
    pub attempts: u32,
    #[source]
    pub source: anyhow::Error,
}

/// Decoding, concatenating or writing PCM audio
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Unsupported WAV sample format ({bits} bit {format:?})")]
    UnsupportedFormat {
        bits: u16,
        format: hound::SampleFormat,
    },

    #[error("Audio transcoding failed: {0}")]
    Transcode(String),
}

/// Building the timeline and the merged audio track
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Dialogue has no lines")]
    EmptyDialogue,

    #[error("Line {line}: {source}")]
    Synthesis {
        line: usize,
        #[source]
        source: SynthesisError,
    },

    #[error("Line {line}: synthesized clip is empty")]
    EmptySegment { line: usize },

    #[error("Line {line}: audio format {found} does not match {expected}")]
    FormatMismatch {
        line: usize,
        expected: String,
        found: String,
    },

    #[error("Build cancelled before line {line}")]
    Cancelled { line: usize },
}

/// Composing and encoding the final video
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Timeline is empty, nothing to render")]
    EmptyTimeline,

    #[error("Timeline is not contiguous: {0}")]
    InvalidTimeline(String),

    #[error("Audio track not found: {0}")]
    MissingAudio(PathBuf),

    #[error("Background video not found: {0}")]
    MissingBackground(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to run ffmpeg: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("FFmpeg encoding failed: {0}")]
    Encoder(String),

    #[error("Render cancelled")]
    Cancelled,
}

/// Top level failure of a run, naming the stage that failed
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Dialogue stage failed: {0:#}")]
    Dialogue(#[source] anyhow::Error),

    #[error("Timeline stage failed: {0}")]
    Build(#[from] BuildError),

    #[error("Audio stage failed: {0}")]
    Audio(#[from] AudioError),

    #[error("Render stage failed: {0}")]
    Render(#[from] RenderError),

    #[error("Run cancelled during {0}")]
    Cancelled(&'static str),

    #[error("IO error: {0:#}")]
    Io(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_build_error_names_line() {
        let err = BuildError::Synthesis {
            line: 3,
            source: SynthesisError {
                speaker: Speaker::B,
                attempts: 3,
                source: anyhow!("HTTP 500"),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("Line 3"));
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("HTTP 500"));
    }

    #[test]
    fn test_pipeline_error_names_stage() {
        let err: PipelineError = RenderError::EmptyTimeline.into();
        assert!(err.to_string().starts_with("Render stage failed"));
    }
}
