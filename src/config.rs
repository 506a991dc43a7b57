//! Configuration management for Reels Gen
//! Handles loading and creating settings.json

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// How illustrations are placed on the frame
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlayLayout {
    /// Fit the whole frame, centered
    #[default]
    Centered,
    /// Smaller picture per speaker: A top-right, B bottom-left
    DualSpeaker,
}

/// Image generation settings
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ImageConfig {
    #[serde(default = "default_image_model")]
    pub model: String,
    #[serde(default = "default_image_size")]
    pub size: String,
    #[serde(default = "default_image_quality")]
    pub quality: String,
    #[serde(default = "default_image_style")]
    pub style: String,
    /// Prompt used when a line has no override. `{line}` is replaced by the dialogue line.
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
}

fn default_image_model() -> String {
    "dall-e-3".to_string()
}

fn default_image_size() -> String {
    "1024x1024".to_string()
}

fn default_image_quality() -> String {
    "standard".to_string()
}

fn default_image_style() -> String {
    "vivid".to_string()
}

fn default_prompt_template() -> String {
    "Create an image for this line of dialogue: {line}. The image should be cartoon style, bright and suitable for a short video.".to_string()
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            model: default_image_model(),
            size: default_image_size(),
            quality: default_image_quality(),
            style: default_image_style(),
            prompt_template: default_prompt_template(),
        }
    }
}

impl ImageConfig {
    /// Build the prompt for a line, preferring an explicit override
    pub fn prompt_for(&self, line: &str, override_prompt: Option<&str>) -> String {
        match override_prompt {
            Some(prompt) if !prompt.trim().is_empty() => prompt.trim().to_string(),
            _ => self.prompt_template.replace("{line}", line),
        }
    }
}

/// Voice synthesis settings
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VoiceConfig {
    #[serde(default = "default_voice_model")]
    pub model_id: String,
    /// Voice used for even lines
    #[serde(default = "default_speaker_a_voice")]
    pub speaker_a_voice: String,
    /// Voice used for odd lines
    #[serde(default = "default_speaker_b_voice")]
    pub speaker_b_voice: String,
    #[serde(default = "default_stability")]
    pub stability: f32,
    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f32,
    #[serde(default)]
    pub style: f32,
    #[serde(default = "default_true")]
    pub use_speaker_boost: bool,
}

fn default_voice_model() -> String {
    "eleven_multilingual_v2".to_string()
}

fn default_speaker_a_voice() -> String {
    "21m00Tcm4TlvDq8ikWAM".to_string()
}

fn default_speaker_b_voice() -> String {
    "AZnzlk1XvdvUeBnXmlld".to_string()
}

fn default_stability() -> f32 {
    0.5
}

fn default_similarity_boost() -> f32 {
    0.75
}

fn default_true() -> bool {
    true
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            model_id: default_voice_model(),
            speaker_a_voice: default_speaker_a_voice(),
            speaker_b_voice: default_speaker_b_voice(),
            stability: default_stability(),
            similarity_boost: default_similarity_boost(),
            style: 0.0,
            use_speaker_boost: true,
        }
    }
}

/// Video composition settings
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RenderConfig {
    /// Path to background video (looped if shorter than the dialogue, cut if longer)
    #[serde(default)]
    pub background_video: Option<String>,
    /// Solid background color used when no background video is set
    #[serde(default = "default_background_color")]
    pub background_color: String,
    #[serde(default)]
    pub layout: OverlayLayout,
    /// Subtitle font name
    #[serde(default = "default_font")]
    pub font: String,
    /// Subtitle font size at 1080x1920
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    /// x264 preset (default: "medium")
    #[serde(default = "default_preset")]
    pub preset: String,
    /// Constant Rate Factor (default: 23)
    #[serde(default = "default_crf")]
    pub crf: u32,
    /// Audio bitrate (default: "192k")
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
}

fn default_background_color() -> String {
    "black".to_string()
}

fn default_font() -> String {
    "Arial".to_string()
}

fn default_font_size() -> u32 {
    72
}

fn default_preset() -> String {
    "medium".to_string()
}

fn default_crf() -> u32 {
    23
}

fn default_audio_bitrate() -> String {
    "192k".to_string()
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            background_video: None,
            background_color: default_background_color(),
            layout: OverlayLayout::Centered,
            font: default_font(),
            font_size: default_font_size(),
            preset: default_preset(),
            crf: default_crf(),
            audio_bitrate: default_audio_bitrate(),
        }
    }
}

/// Retry settings shared by the voice and image adapters
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_secs() -> u64 {
    2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_delay_secs(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.delay_secs))
    }
}

/// Application configuration stored in settings.json
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppConfig {
    /// OpenAI API key (falls back to OPENAI_API_KEY)
    #[serde(default)]
    pub openai_api_key: Option<String>,
    /// ElevenLabs API key (falls back to ELEVENLABS_API_KEY)
    #[serde(default)]
    pub elevenlabs_api_key: Option<String>,
    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    /// Model used to write the dialogue
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    /// How many illustrations may be requested at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Default output directory for rendered videos
    #[serde(default = "default_output_dir")]
    pub default_output_dir: String,
    /// Scratch directory for per-run audio and images
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
    /// Directory for run metadata JSON files
    #[serde(default = "default_metadata_dir")]
    pub metadata_dir: String,
    /// Whether to use GPU acceleration (NVENC) for FFmpeg
    #[serde(default)]
    pub gpu_acceleration: Option<bool>,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_concurrency() -> usize {
    1
}

fn default_output_dir() -> String {
    "./output".to_string()
}

fn default_work_dir() -> String {
    "./temp".to_string()
}

fn default_metadata_dir() -> String {
    "./metadata".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            elevenlabs_api_key: None,
            openai_base_url: default_openai_base_url(),
            chat_model: default_chat_model(),
            image: ImageConfig::default(),
            voice: VoiceConfig::default(),
            render: RenderConfig::default(),
            retry: RetryConfig::default(),
            concurrency: default_concurrency(),
            default_output_dir: default_output_dir(),
            work_dir: default_work_dir(),
            metadata_dir: default_metadata_dir(),
            gpu_acceleration: None,
        }
    }
}

impl AppConfig {
    /// Configuration file name
    pub const CONFIG_PATH: &'static str = "settings.json";

    /// Load configuration from `settings.json`, or from the user config dir when absent
    pub fn load() -> Result<Self> {
        let path = Self::locate()
            .ok_or_else(|| anyhow!("Configuration file not found. Run `reels-gen init` to create settings.json"))?;
        Self::load_from(&path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// `./settings.json` first, then `<config dir>/reels-gen/settings.json`
    fn locate() -> Option<PathBuf> {
        let local = PathBuf::from(Self::CONFIG_PATH);
        if local.exists() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("reels-gen").join(Self::CONFIG_PATH))
            .filter(|p| p.exists())
    }

    /// Create a default configuration file
    pub fn create_default() -> Result<()> {
        let default_config = AppConfig {
            openai_api_key: Some("YOUR_OPENAI_KEY_HERE".to_string()),
            elevenlabs_api_key: Some("YOUR_ELEVENLABS_KEY_HERE".to_string()),
            ..AppConfig::default()
        };

        let json = serde_json::to_string_pretty(&default_config)?;
        fs::write(Self::CONFIG_PATH, json)?;

        Ok(())
    }

    /// OpenAI key from settings, else from the environment
    pub fn openai_key(&self) -> Result<String> {
        resolve_key(&self.openai_api_key, "OPENAI_API_KEY")
    }

    /// ElevenLabs key from settings, else from the environment
    pub fn elevenlabs_key(&self) -> Result<String> {
        resolve_key(&self.elevenlabs_api_key, "ELEVENLABS_API_KEY")
    }
}

fn resolve_key(configured: &Option<String>, env_var: &str) -> Result<String> {
    let usable = |k: &str| !k.trim().is_empty() && !k.starts_with("YOUR_");

    if let Some(key) = configured.as_deref().filter(|k| usable(k)) {
        return Ok(key.trim().to_string());
    }

    match std::env::var(env_var) {
        Ok(key) if usable(&key) => Ok(key.trim().to_string()),
        _ => Err(anyhow!(
            "No API key configured. Set it in settings.json or the {} environment variable",
            env_var
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let config = AppConfig {
            openai_api_key: Some("sk-test".to_string()),
            ..AppConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.openai_api_key, config.openai_api_key);
        assert_eq!(parsed.render.layout, OverlayLayout::Centered);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"render": {"layout": "dual_speaker"}}"#).unwrap();
        assert_eq!(parsed.render.layout, OverlayLayout::DualSpeaker);
        assert_eq!(parsed.render.font_size, 72);
        assert_eq!(parsed.retry.max_attempts, 3);
        assert_eq!(parsed.retry.delay_secs, 2);
        assert_eq!(parsed.concurrency, 1);
        assert_eq!(parsed.image.model, "dall-e-3");
        assert_eq!(parsed.voice.model_id, "eleven_multilingual_v2");
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = RetryConfig::default().policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(2));
    }

    #[test]
    fn test_prompt_override() {
        let image = ImageConfig::default();
        let generated = image.prompt_for("Hello there", None);
        assert!(generated.contains("Hello there"));
        assert!(!generated.contains("{line}"));

        assert_eq!(image.prompt_for("Hello", Some("  A red fox ")), "A red fox");
        assert_eq!(image.prompt_for("Hello", Some("   ")), generated.replace("Hello there", "Hello"));
    }

    #[test]
    fn test_placeholder_keys_are_rejected() {
        let config = AppConfig {
            elevenlabs_api_key: Some("xi-key".to_string()),
            openai_api_key: Some("YOUR_OPENAI_KEY_HERE".to_string()),
            ..AppConfig::default()
        };
        assert_eq!(config.elevenlabs_key().unwrap(), "xi-key");
        if std::env::var("OPENAI_API_KEY").is_err() {
            assert!(config.openai_key().is_err());
        }
    }
}
