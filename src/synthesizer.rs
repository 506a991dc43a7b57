//! Line synthesizer: one dialogue line in, one decoded audio segment out

use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::ai::VoiceService;
use crate::audio::{self, AudioSegment};
use crate::error::SynthesisError;
use crate::retry::{with_retry, RetryPolicy};
use crate::types::Speaker;

/// Anything that can voice a line. The timeline builder depends only on this.
#[async_trait]
pub trait Synthesize: Send + Sync {
    async fn synthesize(&self, text: &str, speaker: Speaker) -> Result<AudioSegment, SynthesisError>;
}

/// Voices lines through a [`VoiceService`], saving each raw clip into the run's audio directory
pub struct LineSynthesizer {
    service: Arc<dyn VoiceService>,
    retry: RetryPolicy,
    audio_dir: PathBuf,
    counter: AtomicUsize,
}

impl LineSynthesizer {
    pub fn new(service: Arc<dyn VoiceService>, retry: RetryPolicy, audio_dir: PathBuf) -> Self {
        Self {
            service,
            retry,
            audio_dir,
            counter: AtomicUsize::new(0),
        }
    }

    /// One attempt: call the service, save the clip, decode it
    async fn attempt(&self, text: &str, speaker: Speaker) -> anyhow::Result<AudioSegment> {
        let clip = self.service.speak(text, speaker).await?;

        let seq = self.counter.fetch_add(1, Ordering::SeqCst);
        let path = self.audio_dir.join(format!(
            "{}_{:03}.{}",
            speaker.label(),
            seq,
            clip.format.extension()
        ));
        tokio::fs::write(&path, &clip.bytes)
            .await
            .with_context(|| format!("Failed to save clip to {}", path.display()))?;

        let segment = audio::decode_clip(&path, clip.format)
            .await
            .with_context(|| format!("Failed to decode {}", path.display()))?;

        if segment.frames() == 0 {
            anyhow::bail!("Voice service returned a silent clip");
        }

        log::info!(
            "Synthesized {:?} line ({:.2}s) -> {}",
            speaker,
            segment.duration(),
            path.display()
        );

        Ok(segment)
    }
}

#[async_trait]
impl Synthesize for LineSynthesizer {
    async fn synthesize(&self, text: &str, speaker: Speaker) -> Result<AudioSegment, SynthesisError> {
        let label = format!("voice {:?}", speaker);
        with_retry(self.retry, &label, |_| self.attempt(text, speaker))
            .await
            .map_err(|exhausted| SynthesisError {
                speaker,
                attempts: exhausted.attempts,
                source: exhausted.last_error,
            })
    }
}
