use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use futures_util::StreamExt;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

use super::{DialogueService, ImageService};
use crate::config::{AppConfig, ImageConfig};

/// Client for an OpenAI-compatible API: chat completions for the script, images for illustrations
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    image: ImageConfig,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

const SYSTEM_PROMPT: &str = r#"You write short, punchy two-character dialogues for vertical videos.

Rules:
1. The two characters speak in strict alternation, the first character speaks first.
2. Write exactly one utterance per line.
3. Do not write character names, numbering, stage directions or blank lines.
4. Keep each line under 25 words so it fits on screen."#;

impl OpenAiClient {
    pub fn new(api_key: String, config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            api_key,
            chat_model: config.chat_model.clone(),
            image: config.image.clone(),
        }
    }

    async fn error_message(resp: reqwest::Response) -> String {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        match serde_json::from_str::<ApiErrorBody>(&text) {
            Ok(body) => format!("HTTP {}: {}", status, body.error.message),
            Err(_) => format!("HTTP {}: {}", status, text.trim()),
        }
    }

    /// Download a generated image in chunks
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .context("Failed to download generated image")?
            .error_for_status()
            .context("Image download rejected")?;

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Image download interrupted")?;
            bytes.extend_from_slice(&chunk);
        }

        if bytes.is_empty() {
            return Err(anyhow!("Downloaded image is empty"));
        }

        Ok(bytes)
    }
}

#[async_trait]
impl DialogueService for OpenAiClient {
    async fn write_dialogue(&self, topic: &str, num_lines: usize) -> Result<String> {
        let payload = json!({
            "model": self.chat_model,
            "temperature": 0.9,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": format!(
                        "Write a dialogue of exactly {} lines about: {}",
                        num_lines, topic
                    )
                }
            ]
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("Failed to call chat completions")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Dialogue generation failed: {}",
                Self::error_message(response).await
            ));
        }

        let body: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("Chat completion returned no content"))?;

        log::debug!("Raw dialogue: {}", content);

        clean_generated_dialogue(&content)
    }
}

#[async_trait]
impl ImageService for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>> {
        let payload = json!({
            "model": self.image.model,
            "prompt": prompt,
            "n": 1,
            "size": self.image.size,
            "quality": self.image.quality,
            "style": self.image.style,
            "response_format": "b64_json"
        });

        let response = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("Failed to call image generation")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Image generation failed: {}",
                Self::error_message(response).await
            ));
        }

        let body: ImageResponse = response
            .json()
            .await
            .context("Failed to parse image generation response")?;

        let image = body
            .data
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Image generation returned no data"))?;

        match (image.b64_json, image.url) {
            (Some(b64), _) => general_purpose::STANDARD
                .decode(b64.trim())
                .context("Invalid base64 image payload"),
            (None, Some(url)) => {
                log::debug!("Downloading image from {}", url);
                self.download(&url).await
            }
            (None, None) => Err(anyhow!("Image generation returned neither data nor URL")),
        }
    }
}

/// Strip list numbering, bullets, markdown emphasis and speaker labels from generated lines.
///
/// A leading `Name:` only counts as a speaker label when it is bold (`**Name**:`) or when the
/// same name opens more than one line of the response. Anything else is spoken text.
pub fn clean_generated_dialogue(raw: &str) -> Result<String> {
    let numbering = Regex::new(r"^\s*(?:\d+[.)]\s*|[-*•]\s+)")?;
    let label = Regex::new(
        r"^(?P<bold>\*\*)?(?P<name>\p{L}[\p{L}'-]*(?: \p{L}[\p{L}'-]*)?)(?:\*\*)?\s*:\s+",
    )?;

    let lines: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("```"))
        .map(|line| numbering.replace(line, "").trim().to_string())
        .collect();

    let mut label_counts: HashMap<&str, usize> = HashMap::new();
    for line in &lines {
        if let Some(name) = label.captures(line).and_then(|c| c.name("name")) {
            *label_counts.entry(name.as_str()).or_insert(0) += 1;
        }
    }

    let cleaned: Vec<String> = lines
        .iter()
        .map(|line| {
            let text = match label.captures(line) {
                Some(caps) => {
                    let bold = caps.name("bold").is_some();
                    let repeated = caps
                        .name("name")
                        .and_then(|name| label_counts.get(name.as_str()))
                        .is_some_and(|count| *count > 1);
                    if bold || repeated {
                        &line[caps.get(0).map_or(0, |m| m.end())..]
                    } else {
                        line.as_str()
                    }
                }
                None => line.as_str(),
            };
            text.trim().trim_matches('"').trim().to_string()
        })
        .filter(|line| !line.is_empty())
        .collect();

    Ok(cleaned.join("\n"))
}
