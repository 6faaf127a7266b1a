//! Crushwave - Bit-Crush and Export Engine
//!
//! Crushwave degrades audio on demand and re-encodes the result:
//! 1. Preview transform - quantize amplitude and sample-and-hold in time,
//!    keeping the buffer length so it can be auditioned immediately
//! 2. Export - a self-sizing WAV writer that physically drops samples, or an
//!    MP3 encoder running on a background worker
//!
//! # Architecture
//!
//! - `engine`: PCM buffers, decoding and waveform peaks
//! - `dsp`: the bit-crush transform
//! - `codec`: WAV and MP3 encoders
//! - `pipeline`: debouncing, the encode worker and the session

pub mod cli;
pub mod codec;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod pipeline;

pub use config::CrushConfig;
pub use error::{CrushError, Result};
