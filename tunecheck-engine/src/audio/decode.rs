//! Audio decoding to mono f32 PCM
//!
//! Uses symphonia for format-agnostic decoding (MP3, FLAC, AAC, WAV, OGG) and
//! rubato for conversion to the analysis sample rate.

use anyhow::{Context, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decoded mono audio
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Mono samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Channel count of the source before down-mixing
    pub channels: usize,
}

impl DecodedAudio {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode an audio file to mono samples at `target_rate`
///
/// Decoding stops after `max_seconds` of source audio when a limit is given.
/// Corrupt packets are skipped; a file that yields no samples at all is an error.
pub fn decode_mono(path: &Path, target_rate: u32, max_seconds: Option<f32>) -> Result<DecodedAudio> {
    tracing::debug!(path = %path.display(), target_rate, "Decoding audio file");

    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Failed to probe audio file: {}", path.display()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio track found in file")?;
    let track_id = track.id;
    let source_rate = track.codec_params.sample_rate.context("Sample rate unknown")?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(1)
        .max(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .with_context(|| format!("Failed to create decoder for: {}", path.display()))?;

    let sample_limit = max_seconds.map(|secs| (secs.max(0.0) as f64 * source_rate as f64) as usize);
    let mut mono: Vec<f32> = Vec::new();

    loop {
        if sample_limit.is_some_and(|limit| mono.len() >= limit) {
            break;
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(anyhow::anyhow!("Error reading packet: {}", e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping corrupt packet");
                continue;
            }
            Err(e) => return Err(anyhow::anyhow!("Fatal decode error: {}", e)),
        };

        let spec = *decoded.spec();
        let frame_channels = spec.channels.count().max(1);
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        mono.extend(
            buffer
                .samples()
                .chunks_exact(frame_channels)
                .map(|frame| frame.iter().sum::<f32>() / frame_channels as f32),
        );
    }

    if let Some(limit) = sample_limit {
        mono.truncate(limit);
    }
    if mono.is_empty() {
        anyhow::bail!("No audio samples decoded from {}", path.display());
    }

    let samples = resample_mono(&mono, source_rate, target_rate)?;

    tracing::debug!(
        path = %path.display(),
        source_rate,
        channels,
        samples = samples.len(),
        "Audio decoding complete"
    );

    Ok(DecodedAudio {
        samples,
        sample_rate: target_rate,
        channels,
    })
}

/// Resample a mono signal; returns a copy when the rates already match
pub fn resample_mono(input: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>> {
    if input_rate == output_rate || input.is_empty() {
        return Ok(input.to_vec());
    }

    let mut resampler = FastFixedIn::<f32>::new(
        output_rate as f64 / input_rate as f64,
        1.0,
        PolynomialDegree::Septic,
        input.len(),
        1,
    )
    .context("Failed to create resampler")?;

    let mut output = resampler
        .process(&[input.to_vec()], None)
        .context("Resampling failed")?;

    Ok(output.pop().unwrap_or_default())
}
