//! Self-sizing RIFF/WAVE encoder
//!
//! Export physically drops samples (stride = hold factor) and lowers the
//! declared sample rate to match, unlike the preview hold which keeps every
//! frame. When the requested stride would still produce a file larger than
//! the size ceiling, the stride is enlarged just enough to fit. Data is never
//! truncated to meet the ceiling.
//!
//! Output is a canonical 44-byte header followed by interleaved PCM:
//! 8-bit unsigned offset-binary, or 16-bit signed little-endian.

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, warn};

use crate::codec::{EncodedAsset, ExportFormat};
use crate::dsp::effective_hold;
use crate::engine::buffer::{sanitize_sample, PcmBuffer};
use crate::error::{CrushError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Length of the canonical RIFF/WAVE header
pub const WAV_HEADER_LEN: usize = 44;

/// Default output size ceiling in bytes
pub const DEFAULT_SIZE_CEILING_BYTES: usize = 16_000_000;

/// Headroom kept under the ceiling when deriving the maximum safe rate
const SIZE_MARGIN_BYTES: usize = 100;

/// Extra bytes allocated past the planned output
const SAFETY_SLACK_BYTES: usize = 8;

const PCM_FORMAT_TAG: u16 = 1;
const FMT_CHUNK_LEN: u32 = 16;

// ============================================================================
// Sample packing
// ============================================================================

/// Convert a sample to signed 16-bit PCM
///
/// Negative values scale by 32768 and non-negative values by 32767, both
/// truncated toward zero.
#[inline]
pub fn to_pcm16(sample: f32) -> i16 {
    let v = sanitize_sample(sample);
    if v < 0.0 {
        (v * 32768.0) as i16
    } else {
        (v * 32767.0) as i16
    }
}

/// Convert a sample to unsigned 8-bit offset-binary PCM
#[inline]
pub fn to_pcm8(sample: f32) -> u8 {
    let v = sanitize_sample(sample);
    ((v * 0.5 + 0.5) * 255.0) as u8
}

// ============================================================================
// Plan
// ============================================================================

/// Size-budget decision for one export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavPlan {
    /// Stride through the source frames.
    pub step: usize,
    /// Declared output sample rate.
    pub sample_rate: u32,
    pub channels: usize,
    /// 1 for 8-bit, 2 for 16-bit.
    pub bytes_per_sample: usize,
    /// Frames that will be written.
    pub frames: usize,
    /// Bytes allocated before writing (header, data and slack).
    pub capacity: usize,
    /// Whether the stride was enlarged to respect the ceiling.
    pub auto_downsampled: bool,
}

impl WavPlan {
    pub fn bits_per_sample(&self) -> u16 {
        (self.bytes_per_sample * 8) as u16
    }

    pub fn data_len(&self) -> usize {
        self.frames * self.channels * self.bytes_per_sample
    }

    pub fn total_len(&self) -> usize {
        WAV_HEADER_LEN + self.data_len()
    }
}

// ============================================================================
// Encoder
// ============================================================================

/// WAV encoder with a hard output-size ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavEncoder {
    size_ceiling: usize,
}

impl Default for WavEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl WavEncoder {
    /// Create an encoder with the default 16,000,000 byte ceiling
    pub fn new() -> Self {
        Self {
            size_ceiling: DEFAULT_SIZE_CEILING_BYTES,
        }
    }

    /// Create an encoder with a custom size ceiling
    pub fn with_size_ceiling(size_ceiling: usize) -> Self {
        Self { size_ceiling }
    }

    pub fn size_ceiling(&self) -> usize {
        self.size_ceiling
    }

    /// Decide stride, declared rate and allocation for an export
    ///
    /// # Arguments
    /// * `channels` - Channel count of the source
    /// * `frames` - Frame count of the source
    /// * `sample_rate` - Source sample rate in Hz
    /// * `bit_depth` - Requested depth; <= 8 packs 8-bit, anything else 16-bit
    /// * `hold_factor` - Requested stride, floored to an integer >= 1
    ///
    /// # Errors
    /// * `InvalidBuffer` - zero channels or zero sample rate
    /// * `SizeCeilingUnreachable` - the header plus one frame exceeds the ceiling
    pub fn plan(
        &self,
        channels: usize,
        frames: usize,
        sample_rate: u32,
        bit_depth: u32,
        hold_factor: f64,
    ) -> Result<WavPlan> {
        if channels == 0 || sample_rate == 0 {
            return Err(CrushError::InvalidBuffer {
                reason: format!("cannot export {} channels at {} Hz", channels, sample_rate),
            });
        }

        let bytes_per_sample = if bit_depth <= 8 { 1 } else { 2 };
        let frame_bytes = channels * bytes_per_sample;

        let required = WAV_HEADER_LEN + if frames > 0 { frame_bytes } else { 0 };
        if required > self.size_ceiling {
            return Err(CrushError::SizeCeilingUnreachable {
                ceiling: self.size_ceiling,
                required,
            });
        }

        let mut step = effective_hold(hold_factor);
        let mut auto_downsampled = false;

        let duration = frames as f64 / sample_rate as f64;
        if duration > 0.0 {
            let budget = self.size_ceiling.saturating_sub(SIZE_MARGIN_BYTES) as f64;
            let max_safe_rate = budget / duration / channels as f64 / bytes_per_sample as f64;
            let planned_rate = sample_rate as f64 / step as f64;

            if planned_rate > max_safe_rate {
                let tightened = (sample_rate as f64 / max_safe_rate).ceil();
                step = if tightened.is_finite() && tightened < frames as f64 {
                    (tightened as usize).max(step)
                } else {
                    frames
                };
                auto_downsampled = true;
                warn!(
                    "Auto-downsampling enabled. Max safe rate: {:.1} Hz, new step: {}",
                    max_safe_rate, step
                );
            }
        }

        // Rounding in the rate estimate can leave a few bytes over; widen the
        // stride until the exact projected size fits.
        while step < frames && WAV_HEADER_LEN + frames.div_ceil(step) * frame_bytes > self.size_ceiling
        {
            step += 1;
            auto_downsampled = true;
        }

        let out_frames = frames.div_ceil(step);
        let out_rate = ((sample_rate as f64 / step as f64).round() as u32).max(1);

        Ok(WavPlan {
            step,
            sample_rate: out_rate,
            channels,
            bytes_per_sample,
            frames: out_frames,
            capacity: WAV_HEADER_LEN + out_frames * frame_bytes + SAFETY_SLACK_BYTES,
            auto_downsampled,
        })
    }

    /// Encode a buffer as a byte-exact WAV file
    ///
    /// Walks the source in strides of the planned step, writing one
    /// interleaved sample per channel per stride position. The header is
    /// back-patched from the bytes actually written and the output is
    /// truncated to exactly that length.
    pub fn encode(&self, buffer: &PcmBuffer, bit_depth: u32, hold_factor: f64) -> Result<EncodedAsset> {
        let plan = self.plan(
            buffer.num_channels(),
            buffer.num_frames(),
            buffer.sample_rate(),
            bit_depth,
            hold_factor,
        )?;

        let channels: Vec<&[f32]> = buffer.channels().collect();
        let frame_bytes = plan.channels * plan.bytes_per_sample;
        let mut out = vec![0u8; plan.capacity];
        let mut pos = WAV_HEADER_LEN;

        for origin in (0..buffer.num_frames()).step_by(plan.step) {
            if pos + frame_bytes > out.len() {
                warn!(
                    "WAV capacity exhausted at source frame {} ({} bytes); stopping early",
                    origin, pos
                );
                break;
            }

            for channel in &channels {
                let sample = channel[origin];
                if plan.bytes_per_sample == 1 {
                    out[pos] = to_pcm8(sample);
                    pos += 1;
                } else {
                    LittleEndian::write_i16(&mut out[pos..pos + 2], to_pcm16(sample));
                    pos += 2;
                }
            }
        }

        let header = WavHeader::pcm(
            plan.channels,
            plan.sample_rate,
            plan.bits_per_sample(),
            pos - WAV_HEADER_LEN,
        )?;
        header.write(&mut out[..WAV_HEADER_LEN]);
        out.truncate(pos);

        debug!(
            "WAV plan: step {}, {} -> {} Hz, {} frames",
            plan.step,
            buffer.sample_rate(),
            plan.sample_rate,
            plan.frames
        );
        info!(
            "Encoded WAV: {} ch, {} Hz, {}-bit, {} bytes",
            plan.channels,
            plan.sample_rate,
            plan.bits_per_sample(),
            out.len()
        );

        EncodedAsset::new(out, plan.sample_rate, plan.bits_per_sample(), ExportFormat::Wav)
    }
}

// ============================================================================
// Header
// ============================================================================

/// Fields of a canonical 44-byte PCM WAV header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    /// File size minus 8.
    pub riff_len: u32,
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    /// Bytes of sample data following the header.
    pub data_len: u32,
}

impl WavHeader {
    /// Build the header for PCM data of a known length
    ///
    /// # Errors
    /// * `InvalidBuffer` - If a field does not fit its on-disk width
    pub fn pcm(channels: usize, sample_rate: u32, bits_per_sample: u16, data_len: usize) -> Result<Self> {
        let overflow = |what: &str| CrushError::InvalidBuffer {
            reason: format!("{} does not fit in a WAV header", what),
        };

        let bytes_per_sample = (bits_per_sample / 8) as u32;
        let channels_u16 = u16::try_from(channels).map_err(|_| overflow("channel count"))?;
        let data_len = u32::try_from(data_len).map_err(|_| overflow("data length"))?;
        let riff_len = data_len
            .checked_add((WAV_HEADER_LEN - 8) as u32)
            .ok_or_else(|| overflow("file length"))?;
        let byte_rate = sample_rate
            .checked_mul(channels_u16 as u32 * bytes_per_sample)
            .ok_or_else(|| overflow("byte rate"))?;
        let block_align = channels_u16
            .checked_mul(bytes_per_sample as u16)
            .ok_or_else(|| overflow("block align"))?;

        Ok(Self {
            riff_len,
            audio_format: PCM_FORMAT_TAG,
            channels: channels_u16,
            sample_rate,
            byte_rate,
            block_align,
            bits_per_sample,
            data_len,
        })
    }

    /// Serialize into the first 44 bytes of `out`
    ///
    /// # Panics
    /// Panics if `out` is shorter than [`WAV_HEADER_LEN`]
    pub fn write(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(b"RIFF");
        LittleEndian::write_u32(&mut out[4..8], self.riff_len);
        out[8..12].copy_from_slice(b"WAVE");

        out[12..16].copy_from_slice(b"fmt ");
        LittleEndian::write_u32(&mut out[16..20], FMT_CHUNK_LEN);
        LittleEndian::write_u16(&mut out[20..22], self.audio_format);
        LittleEndian::write_u16(&mut out[22..24], self.channels);
        LittleEndian::write_u32(&mut out[24..28], self.sample_rate);
        LittleEndian::write_u32(&mut out[28..32], self.byte_rate);
        LittleEndian::write_u16(&mut out[32..34], self.block_align);
        LittleEndian::write_u16(&mut out[34..36], self.bits_per_sample);

        out[36..40].copy_from_slice(b"data");
        LittleEndian::write_u32(&mut out[40..44], self.data_len);
    }

    /// Decode the canonical header at the start of `bytes`
    ///
    /// # Errors
    /// * `MalformedHeader` - short input, wrong chunk ids, or a non-PCM format tag
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let malformed = |reason: &str| CrushError::MalformedHeader {
            reason: reason.to_string(),
        };

        if bytes.len() < WAV_HEADER_LEN {
            return Err(malformed("shorter than 44 bytes"));
        }
        if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err(malformed("missing RIFF/WAVE signature"));
        }
        if &bytes[12..16] != b"fmt " || LittleEndian::read_u32(&bytes[16..20]) != FMT_CHUNK_LEN {
            return Err(malformed("expected a 16-byte fmt chunk at offset 12"));
        }
        if &bytes[36..40] != b"data" {
            return Err(malformed("expected the data chunk at offset 36"));
        }

        let header = Self {
            riff_len: LittleEndian::read_u32(&bytes[4..8]),
            audio_format: LittleEndian::read_u16(&bytes[20..22]),
            channels: LittleEndian::read_u16(&bytes[22..24]),
            sample_rate: LittleEndian::read_u32(&bytes[24..28]),
            byte_rate: LittleEndian::read_u32(&bytes[28..32]),
            block_align: LittleEndian::read_u16(&bytes[32..34]),
            bits_per_sample: LittleEndian::read_u16(&bytes[34..36]),
            data_len: LittleEndian::read_u32(&bytes[40..44]),
        };

        if header.audio_format != PCM_FORMAT_TAG {
            return Err(malformed("format tag is not PCM"));
        }

        Ok(header)
    }
}

// ============================================================================
// Tests
// ============================================================================
