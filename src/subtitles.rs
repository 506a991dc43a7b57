//! Caption track for the composer
//! Writes one ASS event per timeline entry, visible exactly while that line is spoken.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::types::{Timeline, FRAME_HEIGHT, FRAME_WIDTH};

/// Caption look. Sizes are in output pixels since PlayRes matches the frame.
#[derive(Debug, Clone)]
pub struct CaptionStyle {
    pub font: String,
    pub font_size: u32,
    /// Distance from the bottom edge
    pub margin_v: u32,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font: "Arial".to_string(),
            font_size: 72,
            margin_v: 120,
        }
    }
}

/// Build the full ASS document for a timeline
pub fn build_ass(timeline: &Timeline, style: &CaptionStyle) -> String {
    let mut content = String::new();

    content.push_str("[Script Info]\r\n");
    content.push_str("Title: Reels Gen Captions\r\n");
    content.push_str("ScriptType: v4.00+\r\n");
    content.push_str(&format!("PlayResX: {}\r\n", FRAME_WIDTH));
    content.push_str(&format!("PlayResY: {}\r\n", FRAME_HEIGHT));
    // Smart wrapping, upper line wider
    content.push_str("WrapStyle: 0\r\n");
    content.push_str("\r\n");

    // White bold text, thick black outline, soft shadow, bottom-center
    content.push_str("[V4+ Styles]\r\n");
    content.push_str("Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\r\n");
    content.push_str(&format!(
        "Style: Default,{},{},&H00FFFFFF,&H000000FF,&H00000000,&H80000000,1,0,0,0,100,100,0,0,1,4,2,2,60,60,{},1\r\n",
        style.font.replace(',', " "),
        style.font_size,
        style.margin_v
    ));
    content.push_str("\r\n");

    content.push_str("[Events]\r\n");
    content.push_str(
        "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\r\n",
    );

    for entry in &timeline.entries {
        content.push_str(&format!(
            "Dialogue: 0,{},{},Default,,0,0,0,,{}\r\n",
            format_ass_timestamp(entry.start),
            format_ass_timestamp(entry.end),
            escape_ass_text(&entry.text)
        ));
    }

    content
}

/// Write the caption file for a timeline
pub fn write_ass(timeline: &Timeline, style: &CaptionStyle, output_ass: &Path) -> Result<()> {
    fs::write(output_ass, build_ass(timeline, style))
        .with_context(|| format!("Failed to write ASS subtitle file: {}", output_ass.display()))?;
    Ok(())
}

/// Keep dialogue text literal: braces would start override blocks, newlines break the event.
/// A word joiner after each backslash stops `\N`, `\n` and `\h` from acting as line breaks or spaces.
fn escape_ass_text(text: &str) -> String {
    text.trim()
        .replace('\\', "\\\u{2060}")
        .replace('{', "\\{")
        .replace('}', "\\}")
        .replace("\r\n", "\\N")
        .replace('\n', "\\N")
}

/// Format seconds as an ASS timestamp (H:MM:SS.CC), rounded to the nearest centisecond
fn format_ass_timestamp(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).round() as i64;
    let centiseconds = total_cs % 100;
    let total_seconds = total_cs / 100;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!(
        "{}:{:02}:{:02}.{:02}",
        hours, minutes, seconds, centiseconds
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Speaker, TimelineEntry};

    fn timeline() -> Timeline {
        let lines = [("Hello there", 0.0, 2.0), ("General {Kenobi}", 2.0, 3.5)];
        Timeline {
            entries: lines
                .iter()
                .enumerate()
                .map(|(i, (text, start, end))| TimelineEntry {
                    index: i,
                    text: text.to_string(),
                    speaker: Speaker::for_index(i),
                    image: None,
                    start: *start,
                    end: *end,
                })
                .collect(),
        }
    }

    #[test]
    fn test_format_ass_timestamp() {
        assert_eq!(format_ass_timestamp(0.0), "0:00:00.00");
        assert_eq!(format_ass_timestamp(1.5), "0:00:01.50");
        assert_eq!(format_ass_timestamp(61.0), "0:01:01.00");
        assert_eq!(format_ass_timestamp(3661.5), "1:01:01.50");
        assert_eq!(format_ass_timestamp(2.996), "0:00:03.00");
    }

    #[test]
    fn test_escape_ass_text() {
        assert_eq!(escape_ass_text("a {b} c"), "a \\{b\\} c");
        assert_eq!(escape_ass_text("one\ntwo"), "one\\Ntwo");
    }

    #[test]
    fn test_escape_keeps_backslashes_literal() {
        assert_eq!(
            escape_ass_text(r"C:\New folder"),
            "C:\\\u{2060}New folder"
        );
        assert_eq!(escape_ass_text(r"a\hb"), "a\\\u{2060}hb");
        assert_eq!(escape_ass_text(r"\{x}"), "\\\u{2060}\\{x\\}");
    }

    #[test]
    fn test_one_event_per_entry() {
        let content = build_ass(&timeline(), &CaptionStyle::default());

        assert!(content.contains("[Script Info]"));
        assert!(content.contains("PlayResX: 1080"));
        assert!(content.contains("PlayResY: 1920"));
        assert!(content.contains("Style: Default,Arial,72,"));

        let events: Vec<&str> = content
            .lines()
            .filter(|l| l.starts_with("Dialogue:"))
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            "Dialogue: 0,0:00:00.00,0:00:02.00,Default,,0,0,0,,Hello there"
        );
        assert_eq!(
            events[1],
            "Dialogue: 0,0:00:02.00,0:00:03.50,Default,,0,0,0,,General \\{Kenobi\\}"
        );
    }

    #[test]
    fn test_write_ass() {
        let output = std::env::temp_dir().join(format!("reels_gen_captions_{}.ass", std::process::id()));
        let style = CaptionStyle {
            font: "DejaVu Sans".to_string(),
            font_size: 64,
            margin_v: 200,
        };

        write_ass(&timeline(), &style, &output).unwrap();
        let content = fs::read_to_string(&output).unwrap();
        assert!(content.contains("Style: Default,DejaVu Sans,64,"));
        assert!(content.contains(",60,60,200,1\r\n"));

        let _ = fs::remove_file(&output);
    }
}
