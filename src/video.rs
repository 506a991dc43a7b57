//! FFmpeg helpers for Reels Gen
//! Handles dependency checks, probing and cancellable ffmpeg execution

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Check if required external dependencies are available
pub fn check_dependencies() -> Result<()> {
    let ffmpeg = Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .output();
    let ffprobe = Command::new("ffprobe")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .output();

    let mut missing = Vec::new();

    if ffmpeg.is_err() {
        missing.push("ffmpeg");
    }

    if ffprobe.is_err() {
        missing.push("ffprobe");
    }

    if !missing.is_empty() {
        let os = std::env::consts::OS;
        let mut msg = format!(
            "Missing required dependencies: {}.\nPlease install them first.",
            missing.join(", ")
        );

        if os == "linux" {
            msg.push_str("\n\nOn Linux (Ubuntu/Debian), try:\n  sudo apt update && sudo apt install ffmpeg");
        } else if os == "macos" {
            msg.push_str("\n\nOn macOS, try:\n  brew install ffmpeg");
        } else if os == "windows" {
            msg.push_str("\n\nOn Windows, ensure ffmpeg and ffprobe are in your PATH.");
        }

        return Err(anyhow!(msg));
    }

    Ok(())
}

/// Check if NVENC (NVIDIA Hardware Encoding) is available
pub fn check_nvenc_availability() -> bool {
    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output();

    if let Ok(out) = output {
        let stdout = String::from_utf8_lossy(&out.stdout);
        stdout.contains("h264_nvenc")
    } else {
        false
    }
}

/// Check if this ffmpeg build ships the named filter (e.g. "ass" needs libass)
pub fn has_ffmpeg_filter(name: &str) -> bool {
    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-filters"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output();

    match output {
        Ok(out) => String::from_utf8_lossy(&out.stdout)
            .lines()
            .any(|line| line.split_whitespace().nth(1) == Some(name)),
        Err(_) => false,
    }
}

/// Get media duration in seconds (with decimals) using ffprobe
pub fn probe_duration(file_path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(file_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .context("Failed to run ffprobe")?;

    let duration_str = String::from_utf8_lossy(&output.stdout);
    let duration: f64 = duration_str
        .trim()
        .parse()
        .with_context(|| format!("Failed to parse duration of {}", file_path.display()))?;

    Ok(duration)
}

/// Run an ffmpeg/ffprobe command, killing it if the cancellation token is raised.
/// Returns `Ok(None)` when cancelled.
pub async fn run_command_with_cancellation(
    mut command: tokio::process::Command,
    cancellation_token: Arc<AtomicBool>,
) -> std::io::Result<Option<Output>> {
    command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let run = command.output();
    tokio::pin!(run);

    loop {
        tokio::select! {
            output = &mut run => return output.map(Some),
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if cancellation_token.load(Ordering::Relaxed) {
                    // Dropping the future drops the child, which kills it
                    return Ok(None);
                }
            }
        }
    }
}

/// Format seconds to an ffmpeg-friendly decimal string (millisecond precision)
pub fn format_seconds(seconds: f64) -> String {
    format!("{:.3}", seconds.max(0.0))
}

/// Escape a path for use inside a filtergraph option value
pub fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}
