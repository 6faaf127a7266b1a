//! PCM Buffer Management
//!
//! Provides the multichannel floating-point buffer that flows through the
//! whole pipeline: decoded by the external decoder, degraded by the preview
//! transform, then serialized by the encoders.

use crate::error::{CrushError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Nominal lower bound of a sample
pub const SAMPLE_MIN: f32 = -1.0;

/// Nominal upper bound of a sample
pub const SAMPLE_MAX: f32 = 1.0;

// ============================================================================
// Helper Functions
// ============================================================================

/// Repair a sample for encoding
///
/// Non-finite values become silence, everything else is hard-clipped to
/// [-1.0, 1.0].
#[inline]
pub fn sanitize_sample(sample: f32) -> f32 {
    if sample.is_finite() {
        sample.clamp(SAMPLE_MIN, SAMPLE_MAX)
    } else {
        0.0
    }
}

// ============================================================================
// PCM Buffer
// ============================================================================

/// Non-interleaved multichannel PCM audio
///
/// Every channel holds exactly `num_frames()` samples. Buffers are never
/// mutated by the processing stages; each stage returns a new buffer.
///
/// # Example
/// ```
/// use crushwave::engine::PcmBuffer;
///
/// let buffer = PcmBuffer::silent(2, 44100, 44100).unwrap();
/// assert_eq!(buffer.num_channels(), 2);
/// assert_eq!(buffer.num_frames(), 44100);
/// assert_eq!(buffer.duration_secs(), 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl PcmBuffer {
    /// Create a buffer from per-channel sample data
    ///
    /// # Errors
    /// * `InvalidBuffer` - no channels, a zero sample rate, or channels of
    ///   differing length
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if channels.is_empty() {
            return Err(CrushError::InvalidBuffer {
                reason: "buffer must have at least one channel".to_string(),
            });
        }

        if sample_rate == 0 {
            return Err(CrushError::InvalidBuffer {
                reason: "sample rate must be positive".to_string(),
            });
        }

        let frames = channels[0].len();
        if let Some((index, ch)) = channels
            .iter()
            .enumerate()
            .find(|(_, ch)| ch.len() != frames)
        {
            return Err(CrushError::InvalidBuffer {
                reason: format!(
                    "channel {} has {} frames, expected {}",
                    index,
                    ch.len(),
                    frames
                ),
            });
        }

        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// Wrap channel data whose shape is already known to be valid
    pub(crate) fn from_validated(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        debug_assert!(!channels.is_empty() && sample_rate > 0);
        debug_assert!(channels.iter().all(|ch| ch.len() == channels[0].len()));
        Self {
            channels,
            sample_rate,
        }
    }

    /// Create a buffer of silence
    pub fn silent(num_channels: usize, num_frames: usize, sample_rate: u32) -> Result<Self> {
        Self::new(vec![vec![0.0; num_frames]; num_channels], sample_rate)
    }

    /// Create a buffer from interleaved sample data
    ///
    /// # Arguments
    /// * `interleaved` - Interleaved sample data (L, R, L, R, ... for stereo)
    /// * `num_channels` - Number of channels in the interleaved stream
    /// * `sample_rate` - Sample rate in Hz
    pub fn from_interleaved(
        interleaved: &[f32],
        num_channels: usize,
        sample_rate: u32,
    ) -> Result<Self> {
        if num_channels == 0 {
            return Err(CrushError::InvalidBuffer {
                reason: "buffer must have at least one channel".to_string(),
            });
        }

        if interleaved.len() % num_channels != 0 {
            return Err(CrushError::InvalidBuffer {
                reason: format!(
                    "Interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    num_channels
                ),
            });
        }

        let num_frames = interleaved.len() / num_channels;
        let mut channels = vec![Vec::with_capacity(num_frames); num_channels];

        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                channels[ch].push(sample);
            }
        }

        Self::new(channels, sample_rate)
    }

    /// Convert the buffer to interleaved format
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut interleaved = Vec::with_capacity(self.num_channels() * self.num_frames());

        for frame in 0..self.num_frames() {
            for channel in &self.channels {
                interleaved.push(channel[frame]);
            }
        }

        interleaved
    }

    /// Get the number of channels
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Get the number of frames (samples per channel)
    #[inline]
    pub fn num_frames(&self) -> usize {
        self.channels.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer holds no frames
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_frames() == 0
    }

    /// Get the sample rate in Hz
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        self.num_frames() as f64 / self.sample_rate as f64
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Iterate over all channels in order
    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        self.channels.iter().map(Vec::as_slice)
    }

    /// Consume the buffer and hand over its channel storage
    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Check if all samples are finite (not NaN or Infinity)
    pub fn is_finite(&self) -> bool {
        self.channels
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }
}

// ============================================================================
// Tests
// ============================================================================
