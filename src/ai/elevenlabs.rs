use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{EncodedAudio, VoiceService};
use crate::audio::AudioFormat;
use crate::config::VoiceConfig;
use crate::types::Speaker;

const ELEVENLABS_API_URL: &str = "https://api.elevenlabs.io/v1";

/// ElevenLabs text-to-speech client, one voice per speaker
pub struct ElevenLabsClient {
    client: Client,
    api_key: String,
    voice: VoiceConfig,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

impl ElevenLabsClient {
    pub fn new(api_key: String, voice: VoiceConfig) -> Self {
        Self {
            client: Client::new(),
            api_key,
            voice,
        }
    }

    fn voice_id(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::A => &self.voice.speaker_a_voice,
            Speaker::B => &self.voice.speaker_b_voice,
        }
    }

    fn request_body<'a>(&'a self, text: &'a str) -> SpeechRequest<'a> {
        SpeechRequest {
            text,
            model_id: &self.voice.model_id,
            voice_settings: VoiceSettings {
                stability: self.voice.stability,
                similarity_boost: self.voice.similarity_boost,
                style: self.voice.style,
                use_speaker_boost: self.voice.use_speaker_boost,
            },
        }
    }
}

#[async_trait]
impl VoiceService for ElevenLabsClient {
    async fn speak(&self, text: &str, speaker: Speaker) -> Result<EncodedAudio> {
        let url = format!(
            "{}/text-to-speech/{}",
            ELEVENLABS_API_URL,
            self.voice_id(speaker)
        );

        let response = self
            .client
            .post(&url)
            .header("Accept", "audio/mpeg")
            .header("xi-api-key", &self.api_key)
            .json(&self.request_body(text))
            .send()
            .await
            .context("Failed to call ElevenLabs")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("ElevenLabs error ({}): {}", status, error_text.trim()));
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read ElevenLabs audio")?;

        if bytes.is_empty() {
            return Err(anyhow!("ElevenLabs returned an empty clip"));
        }

        Ok(EncodedAudio {
            format: AudioFormat::Mp3,
            bytes: bytes.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_per_speaker() {
        let client = ElevenLabsClient::new("key".to_string(), VoiceConfig::default());
        assert_eq!(client.voice_id(Speaker::A), "21m00Tcm4TlvDq8ikWAM");
        assert_eq!(client.voice_id(Speaker::B), "AZnzlk1XvdvUeBnXmlld");
    }

    #[test]
    fn test_request_body() {
        let client = ElevenLabsClient::new("key".to_string(), VoiceConfig::default());
        let body = serde_json::to_value(client.request_body("Hello")).unwrap();
        assert_eq!(body["text"], "Hello");
        assert_eq!(body["model_id"], "eleven_multilingual_v2");
        assert_eq!(body["voice_settings"]["stability"], 0.5);
        assert_eq!(body["voice_settings"]["use_speaker_boost"], true);
    }
}
