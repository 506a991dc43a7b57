//! Dialogue sources: generated text or a file, plus optional per-line prompt overrides

use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::illustrator::PromptOverrides;
use crate::types::DialogueLine;

/// Split raw text into dialogue lines. Blank lines are dropped, indices are assigned in order.
pub fn parse_dialogue(raw: &str) -> Vec<DialogueLine> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(index, text)| DialogueLine::new(index, text))
        .collect()
}

/// Load a dialogue from a text file, one utterance per line
pub fn load_dialogue_file(path: &Path) -> Result<Vec<DialogueLine>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read dialogue file {}", path.display()))?;
    let lines = parse_dialogue(&raw);
    if lines.is_empty() {
        return Err(anyhow!("Dialogue file {} has no lines", path.display()));
    }
    Ok(lines)
}

/// Text form of a dialogue, as saved next to a run
pub fn to_text(lines: &[DialogueLine]) -> String {
    let mut text = lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    text.push('\n');
    text
}

/// Parse `{"0": "prompt", "3": "prompt"}` into overrides keyed by line index
pub fn parse_prompt_overrides(json: &str) -> Result<PromptOverrides> {
    let raw: BTreeMap<String, String> =
        serde_json::from_str(json).context("Prompt overrides must be a JSON object of strings")?;

    raw.into_iter()
        .map(|(key, prompt)| {
            let index: usize = key
                .trim()
                .parse()
                .map_err(|_| anyhow!("Invalid line index in prompt overrides: {:?}", key))?;
            Ok::<_, anyhow::Error>((index, prompt))
        })
        .collect()
}

/// Load prompt overrides from a JSON file
pub fn load_prompt_overrides(path: &Path) -> Result<PromptOverrides> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read prompt overrides {}", path.display()))?;
    parse_prompt_overrides(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Speaker;

    #[test]
    fn test_parse_skips_blank_lines() {
        let lines = parse_dialogue("  Hi there!  \n\n   \nHello.\r\nBye\n");
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["Hi there!", "Hello.", "Bye"]);
        assert_eq!(lines[1].index, 1);
        assert_eq!(lines[1].speaker(), Speaker::B);
        assert_eq!(lines[2].speaker(), Speaker::A);
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_dialogue("\n  \n").is_empty());
    }

    #[test]
    fn test_text_round_trip() {
        let lines = parse_dialogue("one\ntwo");
        assert_eq!(to_text(&lines), "one\ntwo\n");
        assert_eq!(parse_dialogue(&to_text(&lines)), lines);
    }

    #[test]
    fn test_prompt_overrides() {
        let overrides = parse_prompt_overrides(r#"{"0": "a fox", " 3 ": "a moon"}"#).unwrap();
        assert_eq!(overrides.get(&0).map(String::as_str), Some("a fox"));
        assert_eq!(overrides.get(&3).map(String::as_str), Some("a moon"));
        assert!(overrides.get(&1).is_none());

        assert!(parse_prompt_overrides(r#"{"first": "x"}"#).is_err());
        assert!(parse_prompt_overrides(r#"["x"]"#).is_err());
    }

    #[test]
    fn test_load_dialogue_file() {
        let path = std::env::temp_dir().join(format!("reels_gen_dialogue_{}.txt", std::process::id()));
        fs::write(&path, "A\n\nB\n").unwrap();
        assert_eq!(load_dialogue_file(&path).unwrap().len(), 2);

        fs::write(&path, "\n\n").unwrap();
        assert!(load_dialogue_file(&path).is_err());

        let _ = fs::remove_file(&path);
    }
}
