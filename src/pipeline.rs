//! End-to-end run: dialogue -> illustrations -> voiced timeline -> video -> metadata

use anyhow::anyhow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ai::{DialogueService, ImageService, VoiceService};
use crate::composer::{self, RenderOptions};
use crate::config::AppConfig;
use crate::dialogue;
use crate::error::{BuildError, PipelineError, RenderError};
use crate::illustrator::{LineIllustrator, PromptOverrides};
use crate::metadata::RunMetadata;
use crate::synthesizer::LineSynthesizer;
use crate::timeline::build_timeline;
use crate::types::{DialogueLine, RenderSpec};
use crate::workspace::RunWorkspace;

/// External collaborators of a run
#[derive(Clone)]
pub struct Services {
    pub dialogue: Arc<dyn DialogueService>,
    pub voice: Arc<dyn VoiceService>,
    pub images: Arc<dyn ImageService>,
}

/// Where the dialogue comes from
#[derive(Debug, Clone)]
pub enum DialogueSource {
    Topic { topic: String, num_lines: usize },
    Lines(Vec<DialogueLine>),
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub source: DialogueSource,
    /// Defaults to `video_<run id>.mp4` in the output dir
    pub output_path: Option<PathBuf>,
    pub prompt_overrides: PromptOverrides,
    pub use_gpu: bool,
}

/// Summary of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub output_file: PathBuf,
    pub metadata_path: PathBuf,
    pub lines: usize,
    pub total_duration: f64,
    pub missing_images: Vec<usize>,
}

fn check_cancelled(token: &AtomicBool, stage: &'static str) -> Result<(), PipelineError> {
    if token.load(Ordering::Relaxed) {
        return Err(PipelineError::Cancelled(stage));
    }
    Ok(())
}

async fn resolve_dialogue(
    source: &DialogueSource,
    services: &Services,
) -> Result<(Option<String>, Vec<DialogueLine>), PipelineError> {
    match source {
        DialogueSource::Topic { topic, num_lines } => {
            log::info!("Writing a {}-line dialogue about {:?}", num_lines, topic);
            let raw = services
                .dialogue
                .write_dialogue(topic, *num_lines)
                .await
                .map_err(PipelineError::Dialogue)?;
            let lines = dialogue::parse_dialogue(&raw);
            if lines.is_empty() {
                return Err(PipelineError::Dialogue(anyhow!(
                    "Dialogue service returned no usable lines"
                )));
            }
            if lines.len() != *num_lines {
                log::warn!("Asked for {} lines, got {}", num_lines, lines.len());
            }
            Ok((Some(topic.clone()), lines))
        }
        DialogueSource::Lines(lines) => Ok((None, lines.clone())),
    }
}

/// Run the whole pipeline once. Any fatal failure names the stage that caused it.
pub async fn run_pipeline(
    config: &AppConfig,
    services: &Services,
    request: RunRequest,
    cancellation_token: Arc<AtomicBool>,
) -> Result<RunReport, PipelineError> {
    let workspace = RunWorkspace::create(config).map_err(PipelineError::Io)?;

    let (topic, lines) = resolve_dialogue(&request.source, services).await?;
    if lines.is_empty() {
        return Err(BuildError::EmptyDialogue.into());
    }

    std::fs::write(workspace.dialogue_path(), dialogue::to_text(&lines))
        .map_err(|e| PipelineError::Io(anyhow!("Failed to save dialogue text: {}", e)))?;
    log::info!("Dialogue has {} lines", lines.len());

    check_cancelled(&cancellation_token, "illustration")?;

    let illustrator = LineIllustrator::new(
        services.images.clone(),
        config.image.clone(),
        config.retry.policy(),
        workspace.images_dir.clone(),
    );
    let image_prompts: Vec<String> = lines
        .iter()
        .map(|line| {
            let override_prompt = request.prompt_overrides.get(&line.index).map(String::as_str);
            illustrator.prompt_for(line, override_prompt)
        })
        .collect();
    let images = illustrator
        .illustrate_all(&lines, &request.prompt_overrides, config.concurrency)
        .await;

    check_cancelled(&cancellation_token, "illustration")?;

    let synthesizer = LineSynthesizer::new(
        services.voice.clone(),
        config.retry.policy(),
        workspace.audio_dir.clone(),
    );
    let built = build_timeline(&lines, &images, &synthesizer, &cancellation_token)
        .await
        .map_err(|e| match e {
            BuildError::Cancelled { .. } => PipelineError::Cancelled("timeline"),
            other => PipelineError::Build(other),
        })?;

    let track_path = workspace.track_path();
    built.track.write_wav(&track_path)?;

    check_cancelled(&cancellation_token, "render")?;

    let output_path = request
        .output_path
        .clone()
        .unwrap_or_else(|| workspace.default_output_path());
    let mut spec = RenderSpec::vertical(output_path);
    if request.use_gpu {
        spec = spec.with_video_codec("h264_nvenc");
    }
    let options = RenderOptions::from_config(&config.render, workspace.root.clone());

    let output_file = composer::render(
        &built.timeline,
        &track_path,
        &spec,
        &options,
        cancellation_token.clone(),
    )
    .await
    .map_err(|e| match e {
        RenderError::Cancelled => PipelineError::Cancelled("render"),
        other => PipelineError::Render(other),
    })?;

    let missing_images = built.timeline.missing_images();
    let metadata = RunMetadata {
        run_id: workspace.run_id.clone(),
        created_at: chrono::Local::now(),
        topic,
        dialogue_lines: lines.iter().map(|l| l.text.clone()).collect(),
        image_prompts,
        images,
        missing_images: missing_images.clone(),
        audio_files: built.clip_paths.clone(),
        track_path,
        total_duration: built.timeline.total_duration(),
        timeline: built.timeline.clone(),
        output_file: output_file.clone(),
        video_size: (spec.width, spec.height),
        fps: spec.fps,
    };
    let metadata_path = workspace.metadata_path();
    metadata.save(&metadata_path).map_err(PipelineError::Io)?;

    Ok(RunReport {
        run_id: workspace.run_id,
        output_file,
        metadata_path,
        lines: lines.len(),
        total_duration: built.timeline.total_duration(),
        missing_images,
    })
}
