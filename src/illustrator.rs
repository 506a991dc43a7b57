//! Line illustrator: one dialogue line in, one image (or nothing) out.
//! Image failures are cosmetic, so exhaustion yields an absent image instead of an error.

use anyhow::{anyhow, Context};
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::ai::ImageService;
use crate::config::ImageConfig;
use crate::error::IllustrationError;
use crate::retry::{with_retry, RetryPolicy};
use crate::types::{DialogueLine, ImageArtifact, ImageMap};

/// Per-line prompt overrides keyed by line index
pub type PromptOverrides = BTreeMap<usize, String>;

pub struct LineIllustrator {
    service: Arc<dyn ImageService>,
    image: ImageConfig,
    retry: RetryPolicy,
    images_dir: PathBuf,
}

impl LineIllustrator {
    pub fn new(
        service: Arc<dyn ImageService>,
        image: ImageConfig,
        retry: RetryPolicy,
        images_dir: PathBuf,
    ) -> Self {
        Self {
            service,
            image,
            retry,
            images_dir,
        }
    }

    /// Prompt that will be sent for this line
    pub fn prompt_for(&self, line: &DialogueLine, override_prompt: Option<&str>) -> String {
        self.image.prompt_for(&line.text, override_prompt)
    }

    /// One attempt: generate, check it decodes, save it
    async fn attempt(&self, line: &DialogueLine, prompt: &str) -> anyhow::Result<ImageArtifact> {
        let bytes = self.service.generate(prompt).await?;

        let format = image::guess_format(&bytes).context("Generated data is not an image")?;
        let extension = format
            .extensions_str()
            .first()
            .copied()
            .ok_or_else(|| anyhow!("Unknown image format {:?}", format))?;

        let path = self
            .images_dir
            .join(format!("dialogue_line_{}.{}", line.index, extension));
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to save image to {}", path.display()))?;

        Ok(path)
    }

    /// Illustrate one line, retrying per policy
    pub async fn try_illustrate(
        &self,
        line: &DialogueLine,
        override_prompt: Option<&str>,
    ) -> Result<ImageArtifact, IllustrationError> {
        let prompt = self.prompt_for(line, override_prompt);
        let label = format!("image for line {}", line.index);
        log::debug!("{} prompt: {}", label, prompt);

        with_retry(self.retry, &label, |_| self.attempt(line, &prompt))
            .await
            .map_err(|exhausted| IllustrationError {
                line: line.index,
                attempts: exhausted.attempts,
                source: exhausted.last_error,
            })
    }

    /// Illustrate one line; an exhausted retry budget becomes an absent image
    pub async fn illustrate(
        &self,
        line: &DialogueLine,
        override_prompt: Option<&str>,
    ) -> Option<ImageArtifact> {
        match self.try_illustrate(line, override_prompt).await {
            Ok(path) => {
                log::info!("Illustrated line {} -> {}", line.index, path.display());
                Some(path)
            }
            Err(e) => {
                log::warn!("No illustration for line {}: {}", line.index, e);
                None
            }
        }
    }

    /// Illustrate every line, up to `concurrency` requests in flight.
    /// The result holds an entry for every line, in index order.
    pub async fn illustrate_all(
        &self,
        lines: &[DialogueLine],
        overrides: &PromptOverrides,
        concurrency: usize,
    ) -> ImageMap {
        stream::iter(lines)
            .map(|line| async move {
                let override_prompt = overrides.get(&line.index).map(String::as_str);
                (line.index, self.illustrate(line, override_prompt).await)
            })
            .buffered(concurrency.max(1))
            .collect::<BTreeMap<_, _>>()
            .await
    }
}
