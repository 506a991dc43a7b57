//! Video composer
//! Turns a timeline plus its audio track into the final vertical video with one ffmpeg pass:
//! background, time-bounded image overlays, burned-in captions, the merged voice track.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{OverlayLayout, RenderConfig};
use crate::error::RenderError;
use crate::subtitles::{self, CaptionStyle};
use crate::types::{RenderSpec, Speaker, Timeline};
use crate::video::{escape_filter_path, format_seconds, probe_duration, run_command_with_cancellation};

/// Side of the square box each speaker picture is fitted into in the dual layout
const DUAL_BOX: u32 = 440;
/// Horizontal distance from the frame edge in the dual layout
const DUAL_MARGIN_X: u32 = 60;
/// Speaker A picture top edge
const DUAL_TOP: u32 = 100;
/// Space kept free under Speaker B's picture for captions
const DUAL_BOTTOM: u32 = 420;

/// What fills the frame behind the illustrations
#[derive(Debug, Clone, PartialEq)]
pub enum Background {
    /// ffmpeg color name or hex, e.g. "black" or "0x202020"
    Color(String),
    /// Looped if shorter than the dialogue, cut if longer
    Video(PathBuf),
}

/// Composition settings that are not part of the output format
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub background: Background,
    pub layout: OverlayLayout,
    pub captions: CaptionStyle,
    pub preset: String,
    pub crf: u32,
    pub audio_bitrate: String,
    /// Where the scratch caption file is written
    pub scratch_dir: PathBuf,
}

impl RenderOptions {
    pub fn from_config(render: &RenderConfig, scratch_dir: PathBuf) -> Self {
        let background = match render.background_video.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => Background::Video(PathBuf::from(path)),
            _ => Background::Color(render.background_color.clone()),
        };

        Self {
            background,
            layout: render.layout,
            captions: CaptionStyle {
                font: render.font.clone(),
                font_size: render.font_size,
                ..CaptionStyle::default()
            },
            preset: render.preset.clone(),
            crf: render.crf,
            audio_bitrate: render.audio_bitrate.clone(),
            scratch_dir,
        }
    }
}

/// Where and how large an overlay is drawn, in output pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// An illustration and the window it is visible in
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayInput {
    pub path: PathBuf,
    pub placement: Placement,
    pub start: f64,
    pub end: f64,
}

/// Largest even size with the source aspect ratio that fits the box
pub fn fit_within(src_w: u32, src_h: u32, box_w: u32, box_h: u32) -> (u32, u32) {
    if src_w == 0 || src_h == 0 {
        return (box_w & !1, box_h & !1);
    }
    let scale = f64::min(box_w as f64 / src_w as f64, box_h as f64 / src_h as f64);
    let even = |v: f64, max: u32| ((v.round() as u32).min(max) & !1).max(2);
    (even(src_w as f64 * scale, box_w), even(src_h as f64 * scale, box_h))
}

/// Size and position an image of `src_w`x`src_h` for the given layout
pub fn place(
    layout: OverlayLayout,
    speaker: Speaker,
    src_w: u32,
    src_h: u32,
    frame_w: u32,
    frame_h: u32,
) -> Placement {
    match layout {
        OverlayLayout::Centered => {
            let (width, height) = fit_within(src_w, src_h, frame_w, frame_h);
            Placement {
                x: (frame_w - width) / 2,
                y: (frame_h - height) / 2,
                width,
                height,
            }
        }
        OverlayLayout::DualSpeaker => {
            let (width, height) = fit_within(src_w, src_h, DUAL_BOX, DUAL_BOX);
            match speaker {
                Speaker::A => Placement {
                    x: frame_w.saturating_sub(width + DUAL_MARGIN_X),
                    y: DUAL_TOP,
                    width,
                    height,
                },
                Speaker::B => Placement {
                    x: DUAL_MARGIN_X,
                    y: frame_h.saturating_sub(height + DUAL_BOTTOM),
                    width,
                    height,
                },
            }
        }
    }
}

/// One overlay per entry with a readable image. Unreadable images are skipped with a warning.
pub fn plan_overlays(timeline: &Timeline, layout: OverlayLayout, spec: &RenderSpec) -> Vec<OverlayInput> {
    timeline
        .entries
        .iter()
        .filter_map(|entry| {
            let path = entry.image.as_ref()?;
            match image::image_dimensions(path) {
                Ok((w, h)) => Some(OverlayInput {
                    path: path.clone(),
                    placement: place(layout, entry.speaker, w, h, spec.width, spec.height),
                    start: entry.start,
                    end: entry.end,
                }),
                Err(e) => {
                    log::warn!(
                        "Skipping unreadable image for line {} ({}): {}",
                        entry.index,
                        path.display(),
                        e
                    );
                    None
                }
            }
        })
        .collect()
}

/// Build the filtergraph.
///
/// Input 0 is the background, input 1 the audio track, images follow from input 2.
/// The final streams are labelled `[vout]` and `[aout]`, both cut to the track length.
pub fn build_filter_complex(
    spec: &RenderSpec,
    total_duration: f64,
    overlays: &[OverlayInput],
    captions: &Path,
) -> String {
    let mut filters = Vec::with_capacity(overlays.len() * 2 + 3);

    filters.push(format!(
        "[0:v]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1,\
         fps={fps},trim=duration={t},setpts=PTS-STARTPTS,format=yuv420p[bg]",
        w = spec.width,
        h = spec.height,
        fps = spec.fps,
        t = format_seconds(total_duration)
    ));
    filters.push(format!(
        "[1:a]atrim=duration={},asetpts=PTS-STARTPTS[aout]",
        format_seconds(total_duration)
    ));

    let mut current = "bg".to_string();
    for (i, overlay) in overlays.iter().enumerate() {
        let input = i + 2;
        filters.push(format!(
            "[{}:v]scale={}:{},setsar=1[img{}]",
            input, overlay.placement.width, overlay.placement.height, i
        ));
        let next = format!("v{}", i);
        filters.push(format!(
            "[{}][img{}]overlay={}:{}:enable='gte(t,{})*lt(t,{})'[{}]",
            current,
            i,
            overlay.placement.x,
            overlay.placement.y,
            format_seconds(overlay.start),
            format_seconds(overlay.end),
            next
        ));
        current = next;
    }

    filters.push(format!(
        "[{}]ass='{}'[vout]",
        current,
        escape_filter_path(captions)
    ));

    filters.join(";")
}

/// A render matches its timeline when it is within one frame of it
fn duration_matches(spec: &RenderSpec, rendered: f64, total_duration: f64) -> bool {
    (rendered - total_duration).abs() <= spec.frame_interval()
}

/// Full ffmpeg argument list for a render
pub fn build_ffmpeg_args(
    spec: &RenderSpec,
    options: &RenderOptions,
    total_duration: f64,
    track_path: &Path,
    overlays: &[OverlayInput],
    captions: &Path,
) -> Vec<String> {
    let total = format_seconds(total_duration);
    let fps = spec.fps.to_string();
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];

    // Input 0: background
    match &options.background {
        Background::Color(color) => {
            args.extend([
                "-f".into(),
                "lavfi".into(),
                "-i".into(),
                format!(
                    "color=c={}:s={}x{}:r={}:d={}",
                    color, spec.width, spec.height, spec.fps, total
                ),
            ]);
        }
        Background::Video(path) => {
            args.extend([
                "-stream_loop".into(),
                "-1".into(),
                "-i".into(),
                path.to_string_lossy().to_string(),
            ]);
        }
    }

    // Input 1: voice track
    args.push("-i".into());
    args.push(track_path.to_string_lossy().to_string());

    // Inputs 2..: stills, held for the whole video and gated by `enable`
    for overlay in overlays {
        args.extend([
            "-loop".into(),
            "1".into(),
            "-framerate".into(),
            fps.clone(),
            "-t".into(),
            total.clone(),
            "-i".into(),
            overlay.path.to_string_lossy().to_string(),
        ]);
    }

    args.push("-filter_complex".into());
    args.push(build_filter_complex(spec, total_duration, overlays, captions));

    args.extend([
        "-map".into(),
        "[vout]".into(),
        "-map".into(),
        "[aout]".into(),
    ]);

    if spec.video_codec == "h264_nvenc" {
        args.extend([
            "-c:v".into(),
            "h264_nvenc".into(),
            "-preset".into(),
            "p4".into(),
            "-rc".into(),
            "vbr".into(),
            "-cq".into(),
            options.crf.to_string(),
            "-b:v".into(),
            "0".into(),
        ]);
    } else {
        args.extend([
            "-c:v".into(),
            spec.video_codec.clone(),
            "-preset".into(),
            options.preset.clone(),
            "-crf".into(),
            options.crf.to_string(),
        ]);
    }

    args.extend([
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-r".into(),
        fps,
        "-c:a".into(),
        spec.audio_codec.clone(),
        "-b:a".into(),
        options.audio_bitrate.clone(),
        "-t".into(),
        total,
        "-y".into(),
        spec.output_path.to_string_lossy().to_string(),
    ]);

    args
}

/// Scratch file removed when dropped, whatever way the render ends
struct ScratchFile(PathBuf);

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.0.exists() {
            if let Err(e) = std::fs::remove_file(&self.0) {
                log::warn!("Could not remove {}: {}", self.0.display(), e);
            }
        }
    }
}

/// Render the timeline to `spec.output_path`.
/// A failed or cancelled render leaves no output file behind.
pub async fn render(
    timeline: &Timeline,
    track_path: &Path,
    spec: &RenderSpec,
    options: &RenderOptions,
    cancellation_token: Arc<AtomicBool>,
) -> Result<PathBuf, RenderError> {
    if timeline.is_empty() {
        return Err(RenderError::EmptyTimeline);
    }
    timeline
        .check_contiguity()
        .map_err(RenderError::InvalidTimeline)?;
    if !track_path.exists() {
        return Err(RenderError::MissingAudio(track_path.to_path_buf()));
    }
    if let Background::Video(path) = &options.background {
        if !path.exists() {
            return Err(RenderError::MissingBackground(path.clone()));
        }
    }
    if cancellation_token.load(Ordering::Relaxed) {
        return Err(RenderError::Cancelled);
    }

    if let Some(parent) = spec.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&options.scratch_dir)?;

    let total_duration = timeline.total_duration();
    let overlays = plan_overlays(timeline, options.layout, spec);

    let captions = ScratchFile(options.scratch_dir.join("captions.ass"));
    subtitles::write_ass(timeline, &options.captions, &captions.0).map_err(|e| {
        RenderError::Io(std::io::Error::new(std::io::ErrorKind::Other, format!("{:#}", e)))
    })?;

    let args = build_ffmpeg_args(spec, options, total_duration, track_path, &overlays, &captions.0);
    log::debug!("ffmpeg {}", args.join(" "));
    log::info!(
        "Rendering {} lines ({} images, {:.2}s) to {}",
        timeline.len(),
        overlays.len(),
        total_duration,
        spec.output_path.display()
    );

    let mut command = tokio::process::Command::new("ffmpeg");
    command.args(&args);

    let result = run_command_with_cancellation(command, cancellation_token).await;

    let failure = match result {
        Ok(Some(output)) if output.status.success() => None,
        Ok(Some(output)) => Some(RenderError::Encoder(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        )),
        Ok(None) => Some(RenderError::Cancelled),
        Err(e) => Some(RenderError::Spawn(e)),
    };

    if let Some(err) = failure {
        let _ = std::fs::remove_file(&spec.output_path);
        return Err(err);
    }

    match probe_duration(&spec.output_path) {
        Ok(duration) if !duration_matches(spec, duration, total_duration) => {
            log::warn!(
                "Rendered {} is {:.3}s long but the timeline is {:.3}s",
                spec.output_path.display(),
                duration,
                total_duration
            )
        }
        Ok(duration) => log::info!(
            "Rendered {} ({:.2}s, timeline {:.2}s)",
            spec.output_path.display(),
            duration,
            total_duration
        ),
        Err(e) => log::warn!("Could not probe {}: {:#}", spec.output_path.display(), e),
    }

    Ok(spec.output_path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioSegment, AudioTrack, SampleSpec, CANONICAL_SAMPLE_RATE};
    use crate::types::TimelineEntry;
    use crate::video::{check_dependencies, has_ffmpeg_filter};

    fn options(scratch_dir: PathBuf) -> RenderOptions {
        RenderOptions::from_config(&RenderConfig::default(), scratch_dir)
    }

    fn overlay(i: usize, start: f64, end: f64) -> OverlayInput {
        OverlayInput {
            path: PathBuf::from(format!("img_{}.png", i)),
            placement: Placement {
                x: 0,
                y: 420,
                width: 1080,
                height: 1080,
            },
            start,
            end,
        }
    }

    #[test]
    fn test_fit_within_keeps_aspect() {
        assert_eq!(fit_within(1024, 1024, 1080, 1920), (1080, 1080));
        assert_eq!(fit_within(1920, 1080, 1080, 1920), (1080, 608));
        assert_eq!(fit_within(1024, 1792, 440, 440), (250, 440));
    }

    #[test]
    fn test_centered_placement() {
        let p = place(OverlayLayout::Centered, Speaker::B, 1024, 1024, 1080, 1920);
        assert_eq!(
            p,
            Placement {
                x: 0,
                y: 420,
                width: 1080,
                height: 1080
            }
        );
    }

    #[test]
    fn test_dual_speaker_placement() {
        let a = place(OverlayLayout::DualSpeaker, Speaker::A, 1024, 1024, 1080, 1920);
        assert_eq!((a.x, a.y, a.width, a.height), (580, 100, 440, 440));

        let b = place(OverlayLayout::DualSpeaker, Speaker::B, 1024, 1024, 1080, 1920);
        assert_eq!((b.x, b.y), (60, 1920 - 440 - 420));
    }

    #[test]
    fn test_filter_windows_match_entries() {
        let spec = RenderSpec::vertical("out.mp4");
        let overlays = vec![overlay(0, 0.0, 2.0), overlay(2, 3.5, 6.5)];
        let filter = build_filter_complex(&spec, 6.5, &overlays, Path::new("/tmp/run/captions.ass"));

        assert!(filter.starts_with("[0:v]scale=1080:1920:force_original_aspect_ratio=increase,crop=1080:1920"));
        assert!(filter.contains("trim=duration=6.500"));
        assert!(filter.contains("[1:a]atrim=duration=6.500,asetpts=PTS-STARTPTS[aout]"));
        assert!(filter.contains("[2:v]scale=1080:1080,setsar=1[img0]"));
        assert!(filter.contains("[bg][img0]overlay=0:420:enable='gte(t,0.000)*lt(t,2.000)'[v0]"));
        assert!(filter.contains("[3:v]scale=1080:1080,setsar=1[img1]"));
        assert!(filter.contains("[v0][img1]overlay=0:420:enable='gte(t,3.500)*lt(t,6.500)'[v1]"));
        assert!(filter.ends_with("[v1]ass='/tmp/run/captions.ass'[vout]"));
    }

    #[test]
    fn test_filter_without_images() {
        let spec = RenderSpec::vertical("out.mp4");
        let filter = build_filter_complex(&spec, 3.0, &[], Path::new("c.ass"));
        assert!(filter.ends_with("[bg]ass='c.ass'[vout]"));
        assert!(!filter.contains("overlay"));
    }

    #[test]
    fn test_ffmpeg_args_color_background() {
        let spec = RenderSpec::vertical("/tmp/out/video.mp4");
        let opts = options(PathBuf::from("/tmp/run"));
        let args = build_ffmpeg_args(
            &spec,
            &opts,
            6.5,
            Path::new("/tmp/run/track.wav"),
            &[overlay(0, 0.0, 2.0)],
            Path::new("/tmp/run/captions.ass"),
        );
        let joined = args.join(" ");

        assert!(joined.contains("-f lavfi -i color=c=black:s=1080x1920:r=30:d=6.500"));
        assert!(joined.contains("-i /tmp/run/track.wav"));
        assert!(joined.contains("-loop 1 -framerate 30 -t 6.500 -i img_0.png"));
        assert!(joined.contains("-map [vout] -map [aout]"));
        assert!(joined.contains("-c:v libx264 -preset medium -crf 23"));
        assert!(joined.contains("-c:a aac -b:a 192k"));
        assert!(joined.ends_with("-t 6.500 -y /tmp/out/video.mp4"));
    }

    #[test]
    fn test_ffmpeg_args_video_background_and_nvenc() {
        let spec = RenderSpec::vertical("out.mp4").with_video_codec("h264_nvenc");
        let mut opts = options(PathBuf::from("scratch"));
        opts.background = Background::Video(PathBuf::from("bg.mp4"));

        let args = build_ffmpeg_args(&spec, &opts, 2.0, Path::new("t.wav"), &[], Path::new("c.ass"));
        let joined = args.join(" ");

        assert!(joined.contains("-stream_loop -1 -i bg.mp4"));
        assert!(joined.contains("-c:v h264_nvenc -preset p4"));
        assert!(!joined.contains("lavfi"));
    }

    #[test]
    fn test_duration_tolerance_is_one_frame() {
        let spec = RenderSpec::vertical("out.mp4");
        assert!(duration_matches(&spec, 3.0, 3.0));
        assert!(duration_matches(&spec, 3.033, 3.0));
        assert!(!duration_matches(&spec, 3.05, 3.0));
        assert!(!duration_matches(&spec, 2.95, 3.0));
    }

    #[test]
    fn test_options_from_config() {
        let mut render = RenderConfig::default();
        assert_eq!(
            options(PathBuf::from("x")).background,
            Background::Color("black".to_string())
        );

        render.background_video = Some("  ".to_string());
        let opts = RenderOptions::from_config(&render, PathBuf::from("x"));
        assert_eq!(opts.background, Background::Color("black".to_string()));

        render.background_video = Some("loop.mp4".to_string());
        let opts = RenderOptions::from_config(&render, PathBuf::from("x"));
        assert_eq!(opts.background, Background::Video(PathBuf::from("loop.mp4")));
    }

    #[tokio::test]
    async fn test_render_rejects_bad_inputs() {
        let dir = std::env::temp_dir().join(format!("reels_gen_render_bad_{}", std::process::id()));
        let spec = RenderSpec::vertical(dir.join("out.mp4"));
        let token = Arc::new(AtomicBool::new(false));

        let err = render(&Timeline::default(), &dir.join("t.wav"), &spec, &options(dir.clone()), token.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::EmptyTimeline));

        let timeline = Timeline {
            entries: vec![TimelineEntry {
                index: 0,
                text: "hi".to_string(),
                speaker: Speaker::A,
                image: None,
                start: 0.0,
                end: 1.0,
            }],
        };
        let err = render(&timeline, &dir.join("missing.wav"), &spec, &options(dir.clone()), token.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::MissingAudio(_)));

        let mut gapped = timeline.clone();
        gapped.entries.push(TimelineEntry {
            index: 1,
            text: "late".to_string(),
            speaker: Speaker::B,
            image: None,
            start: 1.5,
            end: 2.0,
        });
        let err = render(&gapped, &dir.join("missing.wav"), &spec, &options(dir.clone()), token)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidTimeline(_)));
    }

    #[tokio::test]
    async fn test_render_four_lines() {
        if check_dependencies().is_err() || !has_ffmpeg_filter("ass") {
            return;
        }

        let dir = std::env::temp_dir().join(format!("reels_gen_render_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let image_path = dir.join("dialogue_line_1.png");
        image::RgbImage::from_pixel(64, 64, image::Rgb([0, 128, 255]))
            .save(&image_path)
            .unwrap();

        let durations = [1.0, 0.5, 0.8, 0.7];
        let mut entries = Vec::new();
        let mut segments = Vec::new();
        let mut t = 0.0;
        for (i, d) in durations.iter().enumerate() {
            entries.push(TimelineEntry {
                index: i,
                text: format!("Line number {}", i),
                speaker: Speaker::for_index(i),
                image: (i == 1).then(|| image_path.clone()),
                start: t,
                end: t + d,
            });
            let frames = (d * CANONICAL_SAMPLE_RATE as f64).round() as usize;
            segments.push(AudioSegment::new(
                PathBuf::from(format!("clip_{}.wav", i)),
                SampleSpec::CANONICAL,
                vec![0; frames],
            ));
            t += d;
        }
        let timeline = Timeline { entries };
        let track = AudioTrack::concat(segments).unwrap();
        let track_path = dir.join("track.wav");
        track.write_wav(&track_path).unwrap();

        let output = dir.join("out").join("video.mp4");
        let spec = RenderSpec::vertical(&output);
        let opts = options(dir.clone());

        let rendered = render(&timeline, &track_path, &spec, &opts, Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();

        assert_eq!(rendered, output);
        assert!(output.exists());
        assert!(!dir.join("captions.ass").exists());

        let duration = probe_duration(&output).unwrap();
        assert!(
            duration_matches(&spec, duration, track.duration()),
            "video {:.3}s vs track {:.3}s",
            duration,
            track.duration()
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
