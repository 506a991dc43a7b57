//! PCM audio handling for Reels Gen
//! Decodes synthesized clips, measures them and merges them into one track.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::error::AudioError;

/// Sample rate every clip is normalized to
pub const CANONICAL_SAMPLE_RATE: u32 = 44_100;

/// Channel count every clip is normalized to
pub const CANONICAL_CHANNELS: u16 = 1;

/// Sample layout of a PCM buffer (always signed 16 bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

impl SampleSpec {
    pub const CANONICAL: SampleSpec = SampleSpec {
        sample_rate: CANONICAL_SAMPLE_RATE,
        channels: CANONICAL_CHANNELS,
    };

    fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }
}

impl fmt::Display for SampleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz/{}ch", self.sample_rate, self.channels)
    }
}

/// Encoded audio as returned by a voice service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }
}

/// A decoded clip for one dialogue line
#[derive(Debug, Clone)]
pub struct AudioSegment {
    /// Raw artifact the samples were decoded from
    pub source: PathBuf,
    pub spec: SampleSpec,
    /// Interleaved samples
    pub samples: Vec<i16>,
}

impl AudioSegment {
    pub fn new(source: PathBuf, spec: SampleSpec, samples: Vec<i16>) -> Self {
        Self {
            source,
            spec,
            samples,
        }
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.spec.channels.max(1) as usize
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.spec.sample_rate as f64
    }
}

/// The whole dialogue as one contiguous buffer
#[derive(Debug, Clone)]
pub struct AudioTrack {
    pub spec: SampleSpec,
    pub samples: Vec<i16>,
}

impl AudioTrack {
    /// Concatenate segments in order. All segments must share the first one's spec.
    pub fn concat(segments: Vec<AudioSegment>) -> Result<Self, (usize, SampleSpec, SampleSpec)> {
        let spec = segments
            .first()
            .map(|s| s.spec)
            .unwrap_or(SampleSpec::CANONICAL);
        let total: usize = segments.iter().map(|s| s.samples.len()).sum();
        let mut samples = Vec::with_capacity(total);

        for (position, segment) in segments.into_iter().enumerate() {
            if segment.spec != spec {
                return Err((position, spec, segment.spec));
            }
            samples.extend(segment.samples);
        }

        Ok(Self { spec, samples })
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.spec.channels.max(1) as usize
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.spec.sample_rate as f64
    }

    /// Write the track as 16-bit PCM WAV
    pub fn write_wav(&self, path: &Path) -> Result<(), AudioError> {
        let mut writer = hound::WavWriter::create(path, self.spec.wav_spec())?;
        for sample in &self.samples {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;
        Ok(())
    }
}

/// Decode a WAV file on disk into 16-bit samples
pub fn decode_wav_file(path: &Path) -> Result<(SampleSpec, Vec<i16>), AudioError> {
    let reader = hound::WavReader::open(path)?;
    read_wav(reader)
}

fn read_wav<R: std::io::Read>(
    reader: hound::WavReader<R>,
) -> Result<(SampleSpec, Vec<i16>), AudioError> {
    let wav = reader.spec();
    if wav.sample_format != hound::SampleFormat::Int || wav.bits_per_sample != 16 {
        return Err(AudioError::UnsupportedFormat {
            bits: wav.bits_per_sample,
            format: wav.sample_format,
        });
    }

    let samples = reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()?;

    Ok((
        SampleSpec {
            sample_rate: wav.sample_rate,
            channels: wav.channels,
        },
        samples,
    ))
}

/// Encode samples as an in-memory WAV file, standing in for a voice service response
#[cfg(test)]
pub fn encode_wav_bytes(spec: SampleSpec, samples: &[i16]) -> Result<Vec<u8>, AudioError> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec.wav_spec())?;
        for sample in samples {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Convert any audio file to canonical 44.1kHz mono PCM WAV with ffmpeg
pub async fn transcode_to_wav(input: &Path, output_wav: &Path) -> Result<(), AudioError> {
    let sample_rate = CANONICAL_SAMPLE_RATE.to_string();
    let channels = CANONICAL_CHANNELS.to_string();

    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-i"])
        .arg(input)
        .args([
            "-ar",
            sample_rate.as_str(),
            "-ac",
            channels.as_str(),
            "-c:a",
            "pcm_s16le",
            "-y",
        ])
        .arg(output_wav)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| AudioError::Transcode(format!("failed to execute ffmpeg: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AudioError::Transcode(stderr.trim().to_string()));
    }

    Ok(())
}

/// Decode a saved voice clip. Canonical WAV is read directly, everything else goes through ffmpeg.
pub async fn decode_clip(path: &Path, format: AudioFormat) -> Result<AudioSegment, AudioError> {
    if format == AudioFormat::Wav {
        let (spec, samples) = decode_wav_file(path)?;
        if spec == SampleSpec::CANONICAL {
            return Ok(AudioSegment::new(path.to_path_buf(), spec, samples));
        }
    }

    let wav_path = path.with_extension("pcm.wav");
    transcode_to_wav(path, &wav_path).await?;
    let (spec, samples) = decode_wav_file(&wav_path)?;
    std::fs::remove_file(&wav_path).ok();

    Ok(AudioSegment::new(path.to_path_buf(), spec, samples))
}
