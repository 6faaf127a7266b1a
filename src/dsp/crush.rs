//! Bit-crush preview transform
//!
//! Quantizes amplitude to a coarse step and applies a zero-order hold
//! decimator. The hold repeats retained samples instead of dropping them, so
//! the output keeps the input's frame count and sample rate and can be played
//! back immediately as a preview.
//!
//! Export uses a different decimator (physical sample dropping with a lowered
//! declared rate), see [`crate::codec::wav`].

use serde::{Deserialize, Serialize};

use crate::engine::buffer::{sanitize_sample, PcmBuffer};
use crate::error::{CrushError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Most destructive bit depth
pub const MIN_BIT_DEPTH: u32 = 1;

/// Transparent bit depth within this effect
pub const MAX_BIT_DEPTH: u32 = 16;

/// Bit depths at or above this skip quantization entirely
pub const BYPASS_BIT_DEPTH: u32 = 32;

/// No decimation
pub const MIN_HOLD_FACTOR: u32 = 1;

/// Largest hold factor exposed to users
pub const MAX_HOLD_FACTOR: u32 = 20;

// ============================================================================
// Processing Parameters
// ============================================================================

/// Parameters for one processing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessingParams {
    bit_depth: u32,
    hold_factor: u32,
}

impl ProcessingParams {
    /// Create validated processing parameters
    ///
    /// # Arguments
    /// * `bit_depth` - 1..=16, or 32 to bypass quantization
    /// * `hold_factor` - 1..=20
    ///
    /// # Errors
    /// * `InvalidParams` - If either value is outside the surface above
    pub fn new(bit_depth: u32, hold_factor: u32) -> Result<Self> {
        let bit_depth_ok =
            (MIN_BIT_DEPTH..=MAX_BIT_DEPTH).contains(&bit_depth) || bit_depth == BYPASS_BIT_DEPTH;
        if !bit_depth_ok {
            return Err(CrushError::InvalidParams {
                name: "bit_depth",
                reason: format!(
                    "{} is outside {}..={} (or {} to bypass)",
                    bit_depth, MIN_BIT_DEPTH, MAX_BIT_DEPTH, BYPASS_BIT_DEPTH
                ),
            });
        }

        if !(MIN_HOLD_FACTOR..=MAX_HOLD_FACTOR).contains(&hold_factor) {
            return Err(CrushError::InvalidParams {
                name: "hold_factor",
                reason: format!(
                    "{} is outside {}..={}",
                    hold_factor, MIN_HOLD_FACTOR, MAX_HOLD_FACTOR
                ),
            });
        }

        Ok(Self {
            bit_depth,
            hold_factor,
        })
    }

    /// Bit depth used for quantization
    #[inline]
    pub fn bit_depth(&self) -> u32 {
        self.bit_depth
    }

    /// Hold factor used for decimation
    #[inline]
    pub fn hold_factor(&self) -> u32 {
        self.hold_factor
    }

    /// Run the preview transform with these parameters
    pub fn apply(&self, input: &PcmBuffer) -> PcmBuffer {
        transform(input, self.bit_depth, self.hold_factor as f64)
    }
}

impl Default for ProcessingParams {
    fn default() -> Self {
        Self {
            bit_depth: 12,
            hold_factor: 1,
        }
    }
}

// ============================================================================
// Transform
// ============================================================================

/// Floor a hold factor to an integer >= 1
///
/// NaN and values below one collapse to 1.
#[inline]
pub fn effective_hold(hold_factor: f64) -> usize {
    if hold_factor.is_finite() && hold_factor >= 1.0 {
        hold_factor.floor() as usize
    } else {
        1
    }
}

/// Quantization step for a bit depth: `2^(bit_depth - 1)`
#[inline]
pub fn quantization_step(bit_depth: u32) -> f64 {
    2.0_f64.powi(bit_depth.max(1) as i32 - 1)
}

/// Clip and quantize a single sample
///
/// Rounds half up, so `x * step` lands on the nearest integer with ties going
/// toward positive infinity.
#[inline]
pub fn quantize_sample(sample: f32, bit_depth: u32) -> f32 {
    let clamped = sanitize_sample(sample);
    if bit_depth >= BYPASS_BIT_DEPTH {
        return clamped;
    }

    let step = quantization_step(bit_depth);
    ((clamped as f64 * step + 0.5).floor() / step) as f32
}

/// Bit-crush and sample-and-hold a buffer
///
/// Each channel is processed independently. At every frame index that is a
/// multiple of the hold factor the input sample is clipped, quantized and
/// held; the frames in between repeat the held value.
///
/// # Arguments
/// * `input` - Source buffer, left untouched
/// * `bit_depth` - Quantization depth; >= 32 bypasses quantization
/// * `hold_factor` - Decimation factor, floored to an integer >= 1
///
/// # Returns
/// A new buffer with the same channel count, sample rate and frame count
pub fn transform(input: &PcmBuffer, bit_depth: u32, hold_factor: f64) -> PcmBuffer {
    let hold = effective_hold(hold_factor);

    let channels = input
        .channels()
        .map(|samples| {
            let mut held = 0.0_f32;
            samples
                .iter()
                .enumerate()
                .map(|(i, &sample)| {
                    if i % hold == 0 {
                        held = quantize_sample(sample, bit_depth);
                    }
                    held
                })
                .collect()
        })
        .collect();

    PcmBuffer::from_validated(channels, input.sample_rate())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::generate_test_tone;
    use approx::assert_abs_diff_eq;

    fn ramp(frames: usize) -> PcmBuffer {
        // Sweeps slightly past full scale on both ends to exercise clipping
        let samples = (0..frames)
            .map(|i| -1.2 + 2.4 * i as f32 / (frames - 1) as f32)
            .collect();
        PcmBuffer::new(vec![samples], 44100).unwrap()
    }

    #[test]
    fn test_params_validation() {
        assert!(ProcessingParams::new(1, 1).is_ok());
        assert!(ProcessingParams::new(16, 20).is_ok());
        assert!(ProcessingParams::new(32, 1).is_ok());
        assert!(ProcessingParams::new(0, 1).is_err());
        assert!(ProcessingParams::new(17, 1).is_err());
        assert!(ProcessingParams::new(8, 0).is_err());
        assert!(ProcessingParams::new(8, 21).is_err());
    }

    #[test]
    fn test_default_params() {
        let params = ProcessingParams::default();
        assert_eq!(params.bit_depth(), 12);
        assert_eq!(params.hold_factor(), 1);
    }

    #[test]
    fn test_effective_hold() {
        assert_eq!(effective_hold(1.0), 1);
        assert_eq!(effective_hold(4.9), 4);
        assert_eq!(effective_hold(0.5), 1);
        assert_eq!(effective_hold(-3.0), 1);
        assert_eq!(effective_hold(f64::NAN), 1);
    }

    #[test]
    fn test_quantize_rounds_half_up() {
        // bit depth 2 -> step 2 -> grid of 0.5
        assert_eq!(quantize_sample(0.25, 2), 0.5);
        assert_eq!(quantize_sample(-0.25, 2), 0.0);
        assert_eq!(quantize_sample(0.2, 2), 0.0);
        assert_eq!(quantize_sample(0.8, 2), 1.0);
    }

    #[test]
    fn test_quantize_levels_and_error_bound() {
        let input = ramp(4001);

        for bit_depth in MIN_BIT_DEPTH..=MAX_BIT_DEPTH {
            let output = transform(&input, bit_depth, 1.0);
            let step = quantization_step(bit_depth);
            let bound = 1.0 / 2.0_f64.powi(bit_depth as i32);

            for (&x, &y) in input.channel(0).iter().zip(output.channel(0)) {
                let level = y as f64 * step;
                assert!(
                    (level - level.round()).abs() < 1e-6,
                    "bit depth {}: {} is off-grid",
                    bit_depth,
                    y
                );
                assert!(level.round().abs() <= step);

                let clipped = x.clamp(-1.0, 1.0) as f64;
                assert!(
                    (y as f64 - clipped).abs() <= bound + 1e-6,
                    "bit depth {}: |{} - {}| exceeds {}",
                    bit_depth,
                    y,
                    clipped,
                    bound
                );
            }
        }
    }

    #[test]
    fn test_one_bit_is_three_levels() {
        let output = transform(&ramp(1000), 1, 1.0);
        assert!(output
            .channel(0)
            .iter()
            .all(|&s| s == -1.0 || s == 0.0 || s == 1.0));
    }

    #[test]
    fn test_hold_repeats_first_frame_of_each_run() {
        let input = generate_test_tone(440.0, 0.1, 44100);

        for hold in [2usize, 3, 7, 10, 20] {
            let output = transform(&input, 16, hold as f64);
            assert_eq!(output.num_frames(), input.num_frames());
            assert_eq!(output.sample_rate(), input.sample_rate());

            for run in output.channel(0).chunks(hold) {
                assert!(run.iter().all(|&s| s == run[0]), "hold {} broke a run", hold);
            }
        }
    }

    #[test]
    fn test_channels_are_independent() {
        let input = PcmBuffer::new(vec![vec![0.5; 6], vec![-0.5; 6]], 8000).unwrap();
        let output = transform(&input, 8, 3.0);

        assert!(output.channel(0).iter().all(|&s| s == 0.5));
        assert!(output.channel(1).iter().all(|&s| s == -0.5));
    }

    #[test]
    fn test_sixteen_bit_is_near_identity() {
        let input = generate_test_tone(1000.0, 0.05, 48000);
        let output = transform(&input, 16, 1.0);

        for (&x, &y) in input.channel(0).iter().zip(output.channel(0)) {
            assert_abs_diff_eq!(x, y, epsilon = 1.0 / 32768.0);
        }
    }

    #[test]
    fn test_bypass_only_clips() {
        let input = PcmBuffer::new(vec![vec![0.123_456, 1.7, -2.0, f32::NAN]], 8000).unwrap();
        let output = transform(&input, BYPASS_BIT_DEPTH, 1.0);
        assert_eq!(output.channel(0), &[0.123_456, 1.0, -1.0, 0.0]);
    }

    #[test]
    fn test_non_finite_becomes_silence() {
        let input =
            PcmBuffer::new(vec![vec![f32::NAN, f32::INFINITY, f32::NEG_INFINITY]], 8000).unwrap();
        let output = transform(&input, 8, 1.0);
        assert_eq!(output.channel(0), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_input_is_not_mutated() {
        let input = generate_test_tone(440.0, 0.01, 44100);
        let snapshot = input.clone();
        let _ = transform(&input, 2, 5.0);
        assert_eq!(input, snapshot);
    }
}
