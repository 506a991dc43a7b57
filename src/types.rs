//! Shared data types for Reels Gen

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One of the two alternating voices of a dialogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Speaker {
    A,
    B,
}

impl Speaker {
    /// Even lines belong to speaker A, odd lines to speaker B
    pub fn for_index(index: usize) -> Self {
        if index % 2 == 0 {
            Speaker::A
        } else {
            Speaker::B
        }
    }

    /// Lowercase label used in file names
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::A => "speaker_a",
            Speaker::B => "speaker_b",
        }
    }
}

/// A single line of dialogue and its position in the script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub index: usize,
    pub text: String,
}

impl DialogueLine {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }

    pub fn speaker(&self) -> Speaker {
        Speaker::for_index(self.index)
    }
}

/// A generated still image on disk
pub type ImageArtifact = PathBuf;

/// Illustrations keyed by line index. `None` means generation failed.
pub type ImageMap = BTreeMap<usize, Option<ImageArtifact>>;

/// Per-line record of what is shown and heard, and when
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub index: usize,
    pub text: String,
    pub speaker: Speaker,
    pub image: Option<ImageArtifact>,
    /// Start in seconds from the beginning of the video
    pub start: f64,
    /// End in seconds, exclusive
    pub end: f64,
}

/// Ordered, gap-free sequence of timeline entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub entries: Vec<TimelineEntry>,
}

impl Timeline {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// End of the last entry, or zero for an empty timeline
    pub fn total_duration(&self) -> f64 {
        self.entries.last().map(|e| e.end).unwrap_or(0.0)
    }

    /// Verify the first entry starts at zero and every entry ends where the next begins
    pub fn check_contiguity(&self) -> Result<(), String> {
        let Some(first) = self.entries.first() else {
            return Ok(());
        };
        if first.start != 0.0 {
            return Err(format!("first entry starts at {} instead of 0", first.start));
        }
        for pair in self.entries.windows(2) {
            if pair[0].end != pair[1].start {
                return Err(format!(
                    "entry {} ends at {} but entry {} starts at {}",
                    pair[0].index, pair[0].end, pair[1].index, pair[1].start
                ));
            }
        }
        for entry in &self.entries {
            if entry.end <= entry.start {
                return Err(format!("entry {} has an empty window", entry.index));
            }
        }
        Ok(())
    }

    /// Line indices that have no illustration
    pub fn missing_images(&self) -> Vec<usize> {
        self.entries
            .iter()
            .filter(|e| e.image.is_none())
            .map(|e| e.index)
            .collect()
    }
}

/// Output frame width (9:16 portrait)
pub const FRAME_WIDTH: u32 = 1080;

/// Output frame height (9:16 portrait)
pub const FRAME_HEIGHT: u32 = 1920;

/// Output frame rate
pub const FRAME_RATE: u32 = 30;

/// Everything the encoder needs to know about the output file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_codec: String,
    pub audio_codec: String,
    pub output_path: PathBuf,
}

impl RenderSpec {
    /// 1080x1920 @ 30fps, H.264 + AAC
    pub fn vertical(output_path: impl Into<PathBuf>) -> Self {
        Self {
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            fps: FRAME_RATE,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            output_path: output_path.into(),
        }
    }

    pub fn with_video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_codec = codec.into();
        self
    }

    /// Length of one frame in seconds
    pub fn frame_interval(&self) -> f64 {
        1.0 / self.fps as f64
    }
}

/// Application version constant
pub const APP_VERSION: &str = "0.3.2";

/// Application name constant
pub const APP_NAME: &str = "Reels Gen";

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: usize, start: f64, end: f64) -> TimelineEntry {
        TimelineEntry {
            index,
            text: format!("line {}", index),
            speaker: Speaker::for_index(index),
            image: None,
            start,
            end,
        }
    }

    #[test]
    fn test_speaker_parity() {
        for i in 0..10 {
            let expected = if i % 2 == 0 { Speaker::A } else { Speaker::B };
            assert_eq!(Speaker::for_index(i), expected);
            assert_eq!(DialogueLine::new(i, "x").speaker(), expected);
        }
    }

    #[test]
    fn test_contiguity_check() {
        let good = Timeline {
            entries: vec![entry(0, 0.0, 2.0), entry(1, 2.0, 3.5)],
        };
        assert!(good.check_contiguity().is_ok());
        assert_eq!(good.total_duration(), 3.5);

        let gap = Timeline {
            entries: vec![entry(0, 0.0, 2.0), entry(1, 2.1, 3.5)],
        };
        assert!(gap.check_contiguity().is_err());

        let late_start = Timeline {
            entries: vec![entry(0, 0.5, 2.0)],
        };
        assert!(late_start.check_contiguity().is_err());
    }

    #[test]
    fn test_empty_timeline() {
        let timeline = Timeline::default();
        assert_eq!(timeline.total_duration(), 0.0);
        assert!(timeline.check_contiguity().is_ok());
    }

    #[test]
    fn test_render_spec_defaults() {
        let spec = RenderSpec::vertical("out.mp4");
        assert_eq!(spec.width, 1080);
        assert_eq!(spec.height, 1920);
        assert_eq!(spec.fps, 30);
        assert_eq!(spec.video_codec, "libx264");
        assert_eq!(spec.audio_codec, "aac");
        assert!((spec.frame_interval() - 1.0 / 30.0).abs() < 1e-12);
    }

    #[test]
    fn test_timeline_entry_json() {
        let mut e = entry(1, 2.0, 3.5);
        e.image = Some(PathBuf::from("images/dialogue_line_1.png"));
        let json = serde_json::to_string(&e).unwrap();
        let parsed: TimelineEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, e);
        assert_eq!(parsed.speaker, Speaker::B);
    }
}
