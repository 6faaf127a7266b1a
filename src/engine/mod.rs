//! Audio Engine Module
//!
//! Core audio plumbing shared by every stage:
//! - PCM buffer type
//! - Decoder collaborator and test signals
//! - Waveform peak summaries

pub mod buffer;
pub mod io;
pub mod waveform;

pub use buffer::{sanitize_sample, PcmBuffer};
pub use io::{
    generate_stereo_test_tone, generate_test_tone, write_asset, AudioDecoder, WavDecoder,
};
pub use waveform::WaveformPeaks;
