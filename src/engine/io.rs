//! Audio file I/O for Crushwave
//!
//! The decoder is an external collaborator: anything that can turn a file
//! into a [`PcmBuffer`] plugs in through [`AudioDecoder`]. The bundled
//! [`WavDecoder`] covers uncompressed WAV input for the CLI and tests.
//!
//! Nothing here resamples. Sources keep their declared rate all the way to
//! the encoders.

use std::fs;
use std::path::Path;

use hound::{SampleFormat, WavReader};
use log::debug;

use crate::codec::EncodedAsset;
use crate::engine::buffer::PcmBuffer;
use crate::error::{CrushError, Result};

/// Turns a source file into multichannel floating-point PCM
pub trait AudioDecoder {
    /// Decode the whole file into memory
    fn decode(&self, path: &Path) -> Result<PcmBuffer>;
}

/// WAV decoder backed by `hound`
///
/// Supports 8/16/24/32-bit integer and 32-bit float PCM with any channel
/// count.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl AudioDecoder for WavDecoder {
    /// # Errors
    /// * `FileNotFound` - If the file does not exist
    /// * `InvalidAudio` - If the file is not a valid WAV file
    /// * `UnsupportedFormat` - If the integer bit depth is not 8/16/24/32
    fn decode(&self, path: &Path) -> Result<PcmBuffer> {
        if !path.exists() {
            return Err(CrushError::FileNotFound {
                path: path.display().to_string(),
                source: None,
            });
        }

        let reader = WavReader::open(path).map_err(|e| CrushError::InvalidAudio {
            reason: format!("Failed to open WAV file: {}", e),
            source: Some(Box::new(e)),
        })?;

        let spec = reader.spec();
        let channels = spec.channels as usize;
        if channels == 0 {
            return Err(CrushError::InvalidAudio {
                reason: "WAV header declares zero channels".to_string(),
                source: None,
            });
        }

        let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
        let buffer = PcmBuffer::from_interleaved(&interleaved, channels, spec.sample_rate)?;

        debug!(
            "Decoded {}: {} ch, {} Hz, {} frames",
            path.display(),
            buffer.num_channels(),
            buffer.sample_rate(),
            buffer.num_frames()
        );

        Ok(buffer)
    }
}

/// Write an encoded asset to disk
pub fn write_asset(asset: &EncodedAsset, path: &Path) -> Result<()> {
    fs::write(path, asset.bytes())?;
    Ok(())
}

/// Generate a test tone (sine wave)
///
/// Creates a mono buffer containing a full-scale sine wave.
///
/// # Arguments
/// * `frequency` - Frequency of the sine wave in Hz
/// * `duration_secs` - Duration of the tone in seconds
/// * `sample_rate` - Sample rate in Hz
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> PcmBuffer {
    let channel = sine(frequency, duration_secs, sample_rate);
    PcmBuffer::from_validated(vec![channel], sample_rate.max(1))
}

/// Generate a stereo test tone with different frequencies per channel
pub fn generate_stereo_test_tone(
    freq_left: f32,
    freq_right: f32,
    duration_secs: f32,
    sample_rate: u32,
) -> PcmBuffer {
    let left = sine(freq_left, duration_secs, sample_rate);
    let right = sine(freq_right, duration_secs, sample_rate);
    PcmBuffer::from_validated(vec![left, right], sample_rate.max(1))
}

// ============================================================================
// Internal helper functions
// ============================================================================

fn sine(frequency: f32, duration_secs: f32, sample_rate: u32) -> Vec<f32> {
    let num_samples = (duration_secs as f64 * sample_rate as f64).round() as usize;
    let angular_freq = 2.0 * std::f64::consts::PI * frequency as f64 / sample_rate.max(1) as f64;

    (0..num_samples)
        .map(|i| (angular_freq * i as f64).sin() as f32)
        .collect()
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let invalid = |bits: &str, e: hound::Error| CrushError::InvalidAudio {
        reason: format!("Failed to read {} samples: {}", bits, e),
        source: Some(Box::new(e)),
    };

    match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|e| invalid("float", e)),
        SampleFormat::Int => match bits_per_sample {
            8 => reader
                .samples::<i8>()
                .map(|s| s.map(|v| v as f32 / 128.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| invalid("8-bit", e)),
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / 32768.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| invalid("16-bit", e)),
            // 24-bit stored as i32 in hound
            24 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 8388608.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| invalid("24-bit", e)),
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 2147483648.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| invalid("32-bit int", e)),
            _ => Err(CrushError::UnsupportedFormat {
                format: format!("{}-bit integer audio", bits_per_sample),
            }),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================
