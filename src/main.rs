//! Reels Gen
//! Turns a topic (or a hand-written script) into a vertical two-voice dialogue video:
//! generated lines, one voice per speaker, one illustration per line, burned-in captions.

mod ai;
mod audio;
mod composer;
mod config;
mod dialogue;
mod error;
mod illustrator;
mod metadata;
mod pipeline;
mod retry;
mod subtitles;
mod synthesizer;
mod timeline;
mod types;
mod video;
mod workspace;

use ai::{ElevenLabsClient, OpenAiClient};
use anyhow::{anyhow, Context, Result};
use config::AppConfig;
use pipeline::{DialogueSource, RunRequest, Services};
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::types::{APP_NAME, APP_VERSION};

/// Lines requested when `generate` is given no count
const DEFAULT_NUM_LINES: usize = 6;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // Check and strip logging flags
    let debug_mode = args.iter().any(|a| a == "--debug");
    let verbose = args.iter().any(|a| a == "--verbose");
    init_logging(debug_mode, verbose)?;
    log::debug!("Raw Args: {:?}", args);

    let actual_args: Vec<String> = args
        .iter()
        .filter(|a| *a != "--debug" && *a != "--verbose")
        .cloned()
        .collect();

    if actual_args.len() > 1 {
        return handle_cli_command(&actual_args).await;
    }

    print_help(program_name(&actual_args));
    Ok(())
}

/// Warnings on the terminal (info with --verbose), everything to debug.log with --debug
fn init_logging(debug_mode: bool, verbose: bool) -> Result<()> {
    let config = ConfigBuilder::new()
        .add_filter_allow_str("reels_gen")
        .build();
    let term_level = if verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        term_level,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];

    if debug_mode {
        loggers.push(WriteLogger::new(
            LevelFilter::Debug,
            config,
            OpenOptions::new()
                .create(true)
                .append(true)
                .open("debug.log")?,
        ));
    }

    let _ = CombinedLogger::init(loggers);
    if debug_mode {
        log::info!("Starting {} {} with debug logging", APP_NAME, APP_VERSION);
    }
    Ok(())
}

fn program_name(args: &[String]) -> &str {
    args.first().map(String::as_str).unwrap_or("reels-gen")
}

/// Handle CLI commands (generate, render, check, init)
async fn handle_cli_command(args: &[String]) -> Result<()> {
    let program = program_name(args);
    let command = args[1].as_str();

    match command {
        "generate" => {
            if args.len() < 3 {
                eprintln!("Usage: {} generate <topic> [num_lines]", program);
                eprintln!("\nExample:");
                eprintln!(
                    "  {} generate \"Rick and Morty discuss a trip to a parallel universe\" 6",
                    program
                );
                std::process::exit(1);
            }

            let topic = args[2].trim().to_string();
            if topic.is_empty() {
                return Err(anyhow!("Topic must not be empty"));
            }
            let num_lines: usize = match args.get(3) {
                Some(n) => n
                    .parse()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| anyhow!("Invalid number of lines: {}", n))?,
                None => DEFAULT_NUM_LINES,
            };

            let config = load_config_for_cli()?;
            println!("🎬 Generating dialogue video...");
            println!("   Topic: {}", topic);
            println!("   Lines: {}", num_lines);

            let request = RunRequest {
                source: DialogueSource::Topic { topic, num_lines },
                output_path: None,
                prompt_overrides: Default::default(),
                use_gpu: use_gpu(&config),
            };
            run(config, request).await
        }

        "render" => {
            let mut positional = Vec::new();
            let mut prompts_path: Option<PathBuf> = None;
            let mut rest = args[2..].iter();
            while let Some(arg) = rest.next() {
                if arg == "--prompts" {
                    let path = rest
                        .next()
                        .ok_or_else(|| anyhow!("--prompts needs a JSON file path"))?;
                    prompts_path = Some(PathBuf::from(path));
                } else {
                    positional.push(arg.as_str());
                }
            }

            let Some(dialogue_path) = positional.first().map(Path::new) else {
                eprintln!(
                    "Usage: {} render <dialogue.txt> [output.mp4] [--prompts prompts.json]",
                    program
                );
                eprintln!("\nExample:");
                eprintln!("  {} render dialogue.txt", program);
                eprintln!(
                    "  {} render temp/run_20260101_120000/dialogue.txt final.mp4 --prompts prompts.json",
                    program
                );
                std::process::exit(1);
            };

            let lines = dialogue::load_dialogue_file(dialogue_path)?;
            let prompt_overrides = match &prompts_path {
                Some(path) => dialogue::load_prompt_overrides(path)?,
                None => Default::default(),
            };

            let config = load_config_for_cli()?;
            println!("🎬 Rendering dialogue video...");
            println!("   Dialogue: {} ({} lines)", dialogue_path.display(), lines.len());
            if !prompt_overrides.is_empty() {
                println!("   Custom prompts: {}", prompt_overrides.len());
            }

            let request = RunRequest {
                source: DialogueSource::Lines(lines),
                output_path: positional.get(1).map(PathBuf::from),
                prompt_overrides,
                use_gpu: use_gpu(&config),
            };
            run(config, request).await
        }

        "check" => {
            video::check_dependencies()?;
            println!("✅ ffmpeg and ffprobe found");

            if video::has_ffmpeg_filter("ass") {
                println!("✅ Subtitle burning available (libass)");
            } else {
                println!("⚠️  This ffmpeg has no 'ass' filter; captions cannot be rendered");
            }

            if video::check_nvenc_availability() {
                println!("✅ NVENC available (set gpu_acceleration: true to use it)");
            } else {
                println!("ℹ️  NVENC not available, using libx264");
            }
            Ok(())
        }

        "init" => {
            if Path::new(AppConfig::CONFIG_PATH).exists() {
                println!("settings.json already exists, leaving it untouched");
            } else {
                AppConfig::create_default()?;
                println!("📝 Created default settings.json");
            }
            Ok(())
        }

        "help" | "--help" | "-h" => {
            print_help(program);
            Ok(())
        }

        _ => {
            eprintln!("Unknown command: {}", command);
            print_help(program);
            std::process::exit(1);
        }
    }
}

/// Print help message
fn print_help(program: &str) {
    println!("{} v{}", APP_NAME, APP_VERSION);
    println!();
    println!("USAGE:");
    println!(
        "  {} generate <topic> [lines]          Generate a dialogue and render it",
        program
    );
    println!(
        "  {} render <dialogue.txt> [out.mp4]   Render a dialogue file",
        program
    );
    println!("        [--prompts prompts.json]            Per-line image prompts, {{\"0\": \"...\"}}");
    println!(
        "  {} check                             Check ffmpeg, libass and NVENC",
        program
    );
    println!(
        "  {} init                              Create a default settings.json",
        program
    );
    println!(
        "  {} help                              Show this help message",
        program
    );
    println!();
    println!("FLAGS:");
    println!("  --verbose   Show progress logs");
    println!("  --debug     Write detailed logs to debug.log");
    println!();
    println!("CONFIGURATION:");
    println!("  Edit settings.json to configure:");
    println!("  - openai_api_key / elevenlabs_api_key   (or OPENAI_API_KEY / ELEVENLABS_API_KEY)");
    println!("  - render.background_video               Background video path (looped)");
    println!("  - render.layout                         \"centered\" or \"dual_speaker\"");
    println!("  - voice.speaker_a_voice / speaker_b_voice");
    println!("  - image.prompt_template                 {{line}} is replaced by the dialogue line");
}

/// Load config for CLI commands, creating a default one on first use
fn load_config_for_cli() -> Result<AppConfig> {
    match AppConfig::load() {
        Ok(config) => Ok(config),
        Err(e) if e.to_string().contains("Configuration file not found") => {
            println!("📝 Configuration file not found. Creating default settings.json...");
            AppConfig::create_default()?;
            AppConfig::load()
        }
        Err(e) => Err(e),
    }
}

/// NVENC only when enabled in settings and actually present
fn use_gpu(config: &AppConfig) -> bool {
    config.gpu_acceleration.unwrap_or(false) && video::check_nvenc_availability()
}

fn build_services(config: &AppConfig) -> Result<Services> {
    let openai = Arc::new(OpenAiClient::new(
        config.openai_key().context("OpenAI key missing")?,
        config,
    ));
    let voice = Arc::new(ElevenLabsClient::new(
        config.elevenlabs_key().context("ElevenLabs key missing")?,
        config.voice.clone(),
    ));

    Ok(Services {
        dialogue: openai.clone(),
        voice,
        images: openai,
    })
}

/// Run the pipeline with Ctrl-C wired to the cancellation token
async fn run(config: AppConfig, request: RunRequest) -> Result<()> {
    video::check_dependencies()?;
    let services = build_services(&config)?;

    let cancellation_token = Arc::new(AtomicBool::new(false));
    let token = cancellation_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⏹️  Cancelling, waiting for the current step to stop...");
            token.store(true, Ordering::Relaxed);
        }
    });

    let report = pipeline::run_pipeline(&config, &services, request, cancellation_token)
        .await
        .map_err(|e| {
            log::error!("Run failed: {}", e);
            anyhow::Error::new(e)
        })?;

    println!("✅ Video saved to: {}", report.output_file.display());
    println!("   Run: {}", report.run_id);
    println!(
        "   Lines: {} ({:.1}s)",
        report.lines, report.total_duration
    );
    if !report.missing_images.is_empty() {
        println!(
            "   ⚠️  No image for lines: {:?}",
            report.missing_images
        );
    }
    println!("   Metadata: {}", report.metadata_path.display());

    Ok(())
}
