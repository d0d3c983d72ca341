//! Audio decoding and spectral feature extraction

pub mod decode;
pub mod features;

pub use decode::{decode_mono, resample_mono, DecodedAudio};
pub use features::{chroma_frames, log_mel_per_second, ChromaFrame, ChromaMap, MelFilterbank, Stft};
