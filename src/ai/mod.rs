pub mod elevenlabs;
pub mod openai;

use anyhow::Result;
use async_trait::async_trait;

use crate::audio::AudioFormat;
use crate::types::Speaker;

pub use elevenlabs::ElevenLabsClient;
pub use openai::OpenAiClient;

/// Encoded speech returned by a voice service
#[derive(Debug, Clone)]
pub struct EncodedAudio {
    pub format: AudioFormat,
    pub bytes: Vec<u8>,
}

/// Writes the raw dialogue script
#[async_trait]
pub trait DialogueService: Send + Sync {
    /// Newline-separated lines, speakers alternating
    async fn write_dialogue(&self, topic: &str, num_lines: usize) -> Result<String>;
}

/// Turns text into speech. One call is one attempt; retries live in the synthesizer.
#[async_trait]
pub trait VoiceService: Send + Sync {
    async fn speak(&self, text: &str, speaker: Speaker) -> Result<EncodedAudio>;
}

/// Turns a prompt into an image. One call is one attempt; retries live in the illustrator.
#[async_trait]
pub trait ImageService: Send + Sync {
    /// Encoded image bytes (PNG, JPEG or WebP)
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>>;
}
