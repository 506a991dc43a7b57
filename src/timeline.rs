//! Timeline builder
//! Voices every line in order, stamps each one with its start/end time and merges the clips.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::audio::{AudioSegment, AudioTrack};
use crate::error::BuildError;
use crate::synthesizer::Synthesize;
use crate::types::{DialogueLine, ImageMap, Timeline, TimelineEntry};

/// Result of a successful build
#[derive(Debug)]
pub struct BuiltTimeline {
    pub timeline: Timeline,
    pub track: AudioTrack,
    /// Raw clip of every line, in order
    pub clip_paths: Vec<std::path::PathBuf>,
}

/// Build the timeline and the merged audio track.
///
/// Lines are voiced strictly in order because each start time depends on every
/// earlier duration. Any synthesis failure aborts the whole build.
pub async fn build_timeline(
    lines: &[DialogueLine],
    images: &ImageMap,
    synthesizer: &dyn Synthesize,
    cancellation_token: &AtomicBool,
) -> Result<BuiltTimeline, BuildError> {
    if lines.is_empty() {
        return Err(BuildError::EmptyDialogue);
    }

    let mut entries = Vec::with_capacity(lines.len());
    let mut segments: Vec<AudioSegment> = Vec::with_capacity(lines.len());
    let mut current_time = 0.0_f64;

    for line in lines {
        if cancellation_token.load(Ordering::Relaxed) {
            return Err(BuildError::Cancelled { line: line.index });
        }

        let speaker = line.speaker();
        let segment = synthesizer
            .synthesize(&line.text, speaker)
            .await
            .map_err(|source| BuildError::Synthesis {
                line: line.index,
                source,
            })?;

        if let Some(first) = segments.first() {
            if segment.spec != first.spec {
                return Err(BuildError::FormatMismatch {
                    line: line.index,
                    expected: first.spec.to_string(),
                    found: segment.spec.to_string(),
                });
            }
        }

        let duration = segment.duration();
        if duration <= 0.0 {
            return Err(BuildError::EmptySegment { line: line.index });
        }

        let image = images.get(&line.index).cloned().flatten();
        if image.is_none() {
            log::warn!("Line {} has no illustration, showing captions only", line.index);
        }

        entries.push(TimelineEntry {
            index: line.index,
            text: line.text.clone(),
            speaker,
            image,
            start: current_time,
            end: current_time + duration,
        });
        segments.push(segment);
        current_time += duration;
    }

    let clip_paths = segments.iter().map(|s| s.source.clone()).collect();

    // Specs were checked above, so this cannot fail
    let track = AudioTrack::concat(segments).map_err(|(position, expected, found)| {
        BuildError::FormatMismatch {
            line: lines[position].index,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    })?;

    log::info!(
        "Timeline built: {} lines, {:.2}s (track {:.2}s)",
        entries.len(),
        current_time,
        track.duration()
    );

    Ok(BuiltTimeline {
        timeline: Timeline { entries },
        track,
        clip_paths,
    })
}
