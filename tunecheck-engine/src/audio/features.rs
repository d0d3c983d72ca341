//! Spectral features: Hann-windowed STFT, mel bands and chroma

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Pitch classes per chroma frame (C = 0 … B = 11)
pub const PITCH_CLASSES: usize = 12;

/// One frame of pitch-class energy
pub type ChromaFrame = [f32; PITCH_CLASSES];

/// Short-time Fourier transform with a fixed window and hop
pub struct Stft {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    hop: usize,
}

impl Stft {
    pub fn new(size: usize, hop: usize) -> Self {
        let size = size.max(2);
        let window = (0..size)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / size as f32).cos())
            .collect();
        let fft = FftPlanner::new().plan_fft_forward(size);
        Self {
            fft,
            window,
            hop: hop.max(1),
        }
    }

    pub fn size(&self) -> usize {
        self.window.len()
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Non-negative frequency bins per frame
    pub fn bins(&self) -> usize {
        self.size() / 2 + 1
    }

    /// Power spectrum of every frame
    ///
    /// A signal shorter than one window is zero-padded into a single frame.
    pub fn power_frames(&self, samples: &[f32]) -> Vec<Vec<f32>> {
        if samples.is_empty() {
            return Vec::new();
        }
        let size = self.size();
        let mut frames = Vec::new();
        let mut start = 0usize;
        let mut buffer = vec![Complex { re: 0.0, im: 0.0 }; size];

        loop {
            let end = (start + size).min(samples.len());
            for (i, slot) in buffer.iter_mut().enumerate() {
                let sample = if start + i < end { samples[start + i] } else { 0.0 };
                *slot = Complex {
                    re: sample * self.window[i],
                    im: 0.0,
                };
            }
            self.fft.process(&mut buffer);
            frames.push(buffer[..self.bins()].iter().map(|c| c.norm_sqr()).collect());

            start += self.hop;
            if start + size > samples.len() {
                break;
            }
        }
        frames
    }
}

/// Triangular mel filterbank over STFT bins
pub struct MelFilterbank {
    filters: Vec<Vec<f32>>,
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

impl MelFilterbank {
    pub fn new(sample_rate: u32, fft_size: usize, bands: usize, fmin: f32, fmax: f32) -> Self {
        let bins = fft_size / 2 + 1;
        let fmax = fmax.min(sample_rate as f32 / 2.0);
        let (mel_min, mel_max) = (hz_to_mel(fmin), hz_to_mel(fmax));
        let edges: Vec<usize> = (0..bands + 2)
            .map(|i| mel_min + i as f32 * (mel_max - mel_min) / (bands + 1) as f32)
            .map(|mel| ((fft_size + 1) as f32 * mel_to_hz(mel) / sample_rate as f32).floor() as usize)
            .map(|bin| bin.min(bins - 1))
            .collect();

        let mut filters = vec![vec![0.0; bins]; bands];
        for (band, filter) in filters.iter_mut().enumerate() {
            let (lo, mid, hi) = (edges[band], edges[band + 1], edges[band + 2]);
            for k in lo..mid {
                filter[k] = (k - lo) as f32 / (mid - lo) as f32;
            }
            for k in mid..hi {
                filter[k] = (hi - k) as f32 / (hi - mid) as f32;
            }
            // Narrow low bands can collapse onto one bin
            if lo == hi {
                filter[mid] = 1.0;
            }
        }
        Self { filters }
    }

    pub fn bands(&self) -> usize {
        self.filters.len()
    }

    /// `ln(1 + energy)` per band for one power frame
    pub fn log_energies(&self, power: &[f32]) -> Vec<f32> {
        self.filters
            .iter()
            .map(|filter| {
                let energy: f32 = filter.iter().zip(power).map(|(w, p)| w * p).sum();
                energy.ln_1p()
            })
            .collect()
    }
}

/// Average per-frame log-mel energies into one vector per second of audio
pub fn log_mel_per_second(
    samples: &[f32],
    sample_rate: u32,
    stft: &Stft,
    filterbank: &MelFilterbank,
) -> Vec<Vec<f32>> {
    let mut sums: Vec<Vec<f32>> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();

    for (i, power) in stft.power_frames(samples).iter().enumerate() {
        let second = i * stft.hop() / sample_rate.max(1) as usize;
        if sums.len() <= second {
            sums.resize(second + 1, vec![0.0; filterbank.bands()]);
            counts.resize(second + 1, 0);
        }
        for (acc, value) in sums[second].iter_mut().zip(filterbank.log_energies(power)) {
            *acc += value;
        }
        counts[second] += 1;
    }

    sums.into_iter()
        .zip(counts)
        .filter(|(_, count)| *count > 0)
        .map(|(sum, count)| sum.into_iter().map(|v| v / count as f32).collect())
        .collect()
}

/// Maps STFT bins to pitch classes within a frequency band
pub struct ChromaMap {
    classes: Vec<Option<usize>>,
}

impl ChromaMap {
    /// Bins outside `[fmin, fmax]` are ignored; pitch is referenced to A4 = 440 Hz
    pub fn new(sample_rate: u32, fft_size: usize, fmin: f32, fmax: f32) -> Self {
        let bins = fft_size / 2 + 1;
        let classes = (0..bins)
            .map(|k| {
                let freq = k as f32 * sample_rate as f32 / fft_size as f32;
                if freq < fmin || freq > fmax || freq <= 0.0 {
                    return None;
                }
                let midi = 69.0 + 12.0 * (freq / 440.0).log2();
                Some((midi.round() as i64).rem_euclid(PITCH_CLASSES as i64) as usize)
            })
            .collect();
        Self { classes }
    }

    /// Fold one power frame into a max-normalized chroma frame
    ///
    /// Silent frames stay all-zero.
    pub fn fold(&self, power: &[f32]) -> ChromaFrame {
        let mut chroma = [0.0f32; PITCH_CLASSES];
        for (class, p) in self.classes.iter().zip(power) {
            if let Some(class) = class {
                chroma[*class] += p.sqrt();
            }
        }
        let peak = chroma.iter().cloned().fold(0.0f32, f32::max);
        if peak > f32::EPSILON {
            for value in chroma.iter_mut() {
                *value /= peak;
            }
        }
        chroma
    }
}

/// Chroma frame sequence for a mono signal
pub fn chroma_frames(samples: &[f32], stft: &Stft, map: &ChromaMap) -> Vec<ChromaFrame> {
    stft.power_frames(samples)
        .iter()
        .map(|power| map.fold(power))
        .collect()
}
