//! Run metadata saved next to every rendered video

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{ImageMap, Timeline};

/// Everything needed to trace a video back to its inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub created_at: DateTime<Local>,
    /// Topic the dialogue was generated from, `None` for file input
    pub topic: Option<String>,
    pub dialogue_lines: Vec<String>,
    pub image_prompts: Vec<String>,
    pub images: ImageMap,
    /// Lines rendered without an illustration
    pub missing_images: Vec<usize>,
    pub audio_files: Vec<PathBuf>,
    pub track_path: PathBuf,
    pub timeline: Timeline,
    pub total_duration: f64,
    pub output_file: PathBuf,
    pub video_size: (u32, u32),
    pub fps: u32,
}

impl RunMetadata {
    /// Write as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write run metadata to {}", path.display()))?;
        log::info!("Metadata saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Speaker, TimelineEntry};

    #[test]
    fn test_save_and_load() {
        let mut images = ImageMap::new();
        images.insert(0, Some(PathBuf::from("images/dialogue_line_0.png")));
        images.insert(1, None);

        let metadata = RunMetadata {
            run_id: "20260101_120000".to_string(),
            created_at: Local::now(),
            topic: Some("time travel".to_string()),
            dialogue_lines: vec!["Hi".to_string(), "Hello".to_string()],
            image_prompts: vec!["a".to_string(), "b".to_string()],
            images,
            missing_images: vec![1],
            audio_files: vec![PathBuf::from("audio/speaker_a_000.mp3")],
            track_path: PathBuf::from("dialogue_track.wav"),
            timeline: Timeline {
                entries: vec![TimelineEntry {
                    index: 0,
                    text: "Hi".to_string(),
                    speaker: Speaker::A,
                    image: None,
                    start: 0.0,
                    end: 1.25,
                }],
            },
            total_duration: 1.25,
            output_file: PathBuf::from("output/video_20260101_120000.mp4"),
            video_size: (1080, 1920),
            fps: 30,
        };

        let path = std::env::temp_dir().join(format!("reels_gen_meta_{}.json", std::process::id()));
        metadata.save(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(json["missing_images"], serde_json::json!([1]));
        assert_eq!(json["images"]["1"], serde_json::Value::Null);
        assert_eq!(json["video_size"], serde_json::json!([1080, 1920]));

        let loaded: RunMetadata = serde_json::from_str(&content).unwrap();
        assert_eq!(loaded.timeline, metadata.timeline);
        assert_eq!(loaded.images, metadata.images);

        let _ = fs::remove_file(&path);
    }
}
