//! Synthetic WAV fixtures
//!
//! Tones and chord progressions written with hound so the decode → chroma →
//! alignment path can run on real files without shipping audio.

use std::f32::consts::PI;
use std::path::{Path, PathBuf};

/// Output format of generated files
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub amplitude: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            channels: 1,
            amplitude: 0.3,
        }
    }
}

/// Frequency of a MIDI note number
pub fn midi_hz(note: u8) -> f32 {
    440.0 * 2f32.powf((note as f32 - 69.0) / 12.0)
}

/// Write a sequence of chords, each held for `seconds_per_chord`
///
/// Every chord is a list of MIDI notes summed at equal level.
pub fn generate_chord_wav(
    path: &Path,
    chords: &[&[u8]],
    seconds_per_chord: f32,
    config: &AudioConfig,
) -> anyhow::Result<PathBuf> {
    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    let per_chord = (seconds_per_chord * config.sample_rate as f32) as usize;

    for (c, chord) in chords.iter().enumerate() {
        let freqs: Vec<f32> = chord.iter().map(|&n| midi_hz(n)).collect();
        let level = config.amplitude / freqs.len().max(1) as f32;
        for i in 0..per_chord {
            let t = (c * per_chord + i) as f32 / config.sample_rate as f32;
            let value: f32 = freqs.iter().map(|f| (2.0 * PI * f * t).sin()).sum::<f32>() * level;
            let sample = (value * i16::MAX as f32) as i16;
            for _ in 0..config.channels {
                writer.write_sample(sample)?;
            }
        }
    }

    writer.finalize()?;
    Ok(path.to_path_buf())
}

/// Single sustained tone
pub fn generate_tone_wav(path: &Path, note: u8, seconds: f32, config: &AudioConfig) -> anyhow::Result<PathBuf> {
    generate_chord_wav(path, &[&[note]], seconds, config)
}

/// C major, A minor, F major, G major: a I-vi-IV-V loop
pub const POP_LOOP: &[&[u8]] = &[&[60, 64, 67], &[57, 60, 64], &[53, 57, 60], &[55, 59, 62]];

/// Black-key dyads sharing no pitch class with [`POP_LOOP`]
pub const DISSONANT_LOOP: &[&[u8]] = &[&[61, 63], &[66, 68], &[70, 61], &[63, 66]];

/// Repeat a progression `times` times
pub fn repeat(progression: &[&'static [u8]], times: usize) -> Vec<&'static [u8]> {
    progression.iter().copied().cycle().take(progression.len() * times).collect()
}
