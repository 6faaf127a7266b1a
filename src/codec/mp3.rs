//! Frame-based MP3 export
//!
//! Samples are converted to signed 16-bit integers in blocks of
//! [`MP3_BLOCK_FRAMES`] frames per channel and pushed through a stateful
//! [`BlockEncoder`]. Every non-empty chunk the encoder emits is kept in
//! order, then the encoder is flushed and the trailing chunk appended.
//!
//! Any block encoder error aborts the whole encode; no partial output is
//! returned.

use log::debug;
use mp3lame_encoder::{Bitrate, Builder, DualPcm, Encoder, FlushNoGap, MonoPcm, Quality};

use crate::codec::wav::to_pcm16;
use crate::codec::{EncodedAsset, ExportFormat};
use crate::engine::buffer::PcmBuffer;
use crate::error::{CrushError, Result};

/// Frames per channel handed to the encoder per call (one MPEG-1 granule pair)
pub const MP3_BLOCK_FRAMES: usize = 1152;

/// Constant bit rate used when none is configured
pub const DEFAULT_MP3_BITRATE_KBPS: u32 = 128;

/// Output space LAME asks for when flushing
const FLUSH_BUFFER_BYTES: usize = 7200;

/// Bit rates accepted for constant bit rate export, in kbps
pub const SUPPORTED_BITRATES_KBPS: [u32; 8] = [96, 112, 128, 160, 192, 224, 256, 320];

// ============================================================================
// Block encoder seam
// ============================================================================

/// A streaming lossy encoder consuming fixed-size 16-bit blocks
pub trait BlockEncoder {
    /// Encode one block; `right` is `None` for mono input
    ///
    /// May return an empty chunk while the encoder buffers internally.
    fn encode_block(&mut self, left: &[i16], right: Option<&[i16]>) -> Result<Vec<u8>>;

    /// Drain any buffered frames
    fn flush(&mut self) -> Result<Vec<u8>>;

    /// Whether mono input must be duplicated into both channel slots
    fn requires_stereo(&self) -> bool {
        false
    }
}

/// Map a kbps value onto LAME's constant bit rate table
fn lame_bitrate(kbps: u32) -> Result<Bitrate> {
    match kbps {
        96 => Ok(Bitrate::Kbps96),
        112 => Ok(Bitrate::Kbps112),
        128 => Ok(Bitrate::Kbps128),
        160 => Ok(Bitrate::Kbps160),
        192 => Ok(Bitrate::Kbps192),
        224 => Ok(Bitrate::Kbps224),
        256 => Ok(Bitrate::Kbps256),
        320 => Ok(Bitrate::Kbps320),
        other => Err(CrushError::InvalidParams {
            name: "mp3_bitrate_kbps",
            reason: format!("{} kbps is not one of {:?}", other, SUPPORTED_BITRATES_KBPS),
        }),
    }
}

fn encoder_failure(context: &str, detail: impl std::fmt::Debug) -> CrushError {
    CrushError::EncoderFailure {
        reason: format!("{}: {:?}", context, detail),
    }
}

/// LAME-backed block encoder
pub struct LameBlockEncoder {
    encoder: Encoder,
}

impl LameBlockEncoder {
    /// Build a constant bit rate LAME encoder
    ///
    /// # Arguments
    /// * `sample_rate` - Input sample rate in Hz
    /// * `channels` - 1 or 2
    /// * `bitrate_kbps` - One of [`SUPPORTED_BITRATES_KBPS`]
    pub fn new(sample_rate: u32, channels: u8, bitrate_kbps: u32) -> Result<Self> {
        let bitrate = lame_bitrate(bitrate_kbps)?;

        let mut builder = Builder::new().ok_or_else(|| CrushError::EncoderFailure {
            reason: "Failed to create LAME encoder".to_string(),
        })?;

        builder
            .set_num_channels(channels)
            .map_err(|e| encoder_failure("Invalid channel count", e))?;
        builder
            .set_sample_rate(sample_rate)
            .map_err(|e| encoder_failure("Invalid sample rate", e))?;
        builder
            .set_brate(bitrate)
            .map_err(|e| encoder_failure("Invalid bitrate", e))?;
        builder
            .set_quality(Quality::Best)
            .map_err(|e| encoder_failure("Failed to set quality", e))?;

        let encoder = builder
            .build()
            .map_err(|e| encoder_failure("Failed to build encoder", e))?;

        Ok(Self { encoder })
    }
}

impl BlockEncoder for LameBlockEncoder {
    fn encode_block(&mut self, left: &[i16], right: Option<&[i16]>) -> Result<Vec<u8>> {
        let mut chunk = Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(left.len()));

        let result = match right {
            Some(right) => self.encoder.encode_to_vec(DualPcm { left, right }, &mut chunk),
            None => self.encoder.encode_to_vec(MonoPcm(left), &mut chunk),
        };
        result.map_err(|e| encoder_failure("MP3 encoding failed", e))?;

        Ok(chunk)
    }

    fn flush(&mut self) -> Result<Vec<u8>> {
        let mut chunk = Vec::with_capacity(FLUSH_BUFFER_BYTES);
        self.encoder
            .flush_to_vec::<FlushNoGap>(&mut chunk)
            .map_err(|e| encoder_failure("MP3 flush failed", e))?;
        Ok(chunk)
    }
}

// ============================================================================
// Frame Encoder
// ============================================================================

/// MP3 encoder for whole in-memory buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEncoder {
    bitrate_kbps: u32,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self {
            bitrate_kbps: DEFAULT_MP3_BITRATE_KBPS,
        }
    }
}

impl FrameEncoder {
    /// Create a frame encoder at a constant bit rate
    pub fn with_bitrate(bitrate_kbps: u32) -> Result<Self> {
        lame_bitrate(bitrate_kbps)?;
        Ok(Self { bitrate_kbps })
    }

    pub fn bitrate_kbps(&self) -> u32 {
        self.bitrate_kbps
    }

    /// Encode a buffer to MP3 with LAME
    ///
    /// # Errors
    /// * `UnsupportedFormat` - more than two channels
    /// * `EncoderFailure` - LAME rejected the configuration or a block
    pub fn encode(&self, buffer: &PcmBuffer) -> Result<EncodedAsset> {
        check_channels(buffer)?;
        let mut encoder =
            LameBlockEncoder::new(buffer.sample_rate(), buffer.num_channels() as u8, self.bitrate_kbps)?;
        encode_with(buffer, &mut encoder)
    }
}

fn check_channels(buffer: &PcmBuffer) -> Result<()> {
    if buffer.num_channels() > 2 {
        return Err(CrushError::UnsupportedFormat {
            format: format!(
                "{}-channel audio (MP3 export supports mono or stereo)",
                buffer.num_channels()
            ),
        });
    }
    Ok(())
}

fn fill_block(block: &mut [i16], samples: &[f32]) {
    for (slot, &sample) in block.iter_mut().zip(samples) {
        *slot = to_pcm16(sample);
    }
}

/// Drive any block encoder over a buffer and wrap the concatenated output
pub fn encode_with<E: BlockEncoder + ?Sized>(buffer: &PcmBuffer, encoder: &mut E) -> Result<EncodedAsset> {
    check_channels(buffer)?;

    let frames = buffer.num_frames();
    let left = buffer.channel(0);
    let right = (buffer.num_channels() == 2).then(|| buffer.channel(1));
    let duplicate_mono = right.is_none() && encoder.requires_stereo();

    // Scratch blocks are reused for every call; the last block uses a prefix.
    let mut left_block = vec![0i16; MP3_BLOCK_FRAMES];
    let mut right_block = vec![0i16; if right.is_some() { MP3_BLOCK_FRAMES } else { 0 }];
    let mut chunks: Vec<Vec<u8>> = Vec::new();
    let mut blocks = 0usize;

    for start in (0..frames).step_by(MP3_BLOCK_FRAMES) {
        let len = MP3_BLOCK_FRAMES.min(frames - start);
        fill_block(&mut left_block[..len], &left[start..start + len]);

        let chunk = match right {
            Some(right) => {
                fill_block(&mut right_block[..len], &right[start..start + len]);
                encoder.encode_block(&left_block[..len], Some(&right_block[..len]))?
            }
            None if duplicate_mono => {
                encoder.encode_block(&left_block[..len], Some(&left_block[..len]))?
            }
            None => encoder.encode_block(&left_block[..len], None)?,
        };

        blocks += 1;
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
    }

    let tail = encoder.flush()?;
    if !tail.is_empty() {
        chunks.push(tail);
    }

    let bytes = chunks.concat();
    debug!(
        "MP3 encode: {} blocks, {} chunks, {} bytes",
        blocks,
        chunks.len(),
        bytes.len()
    );

    EncodedAsset::new(bytes, buffer.sample_rate(), 16, ExportFormat::Mp3)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::{generate_stereo_test_tone, generate_test_tone};

    /// Records every call and emits one tagged chunk per block
    #[derive(Default)]
    struct RecordingEncoder {
        stereo_only: bool,
        fail_on_block: Option<usize>,
        blocks: Vec<(Vec<i16>, Option<Vec<i16>>)>,
        flushed: bool,
    }

    impl BlockEncoder for RecordingEncoder {
        fn encode_block(&mut self, left: &[i16], right: Option<&[i16]>) -> Result<Vec<u8>> {
            if self.fail_on_block == Some(self.blocks.len()) {
                return Err(CrushError::EncoderFailure {
                    reason: "synthetic failure".to_string(),
                });
            }
            self.blocks.push((left.to_vec(), right.map(<[i16]>::to_vec)));
            // Buffer the first block like a real encoder would
            if self.blocks.len() == 1 {
                Ok(Vec::new())
            } else {
                Ok(vec![self.blocks.len() as u8])
            }
        }

        fn flush(&mut self) -> Result<Vec<u8>> {
            self.flushed = true;
            Ok(vec![0xEE])
        }

        fn requires_stereo(&self) -> bool {
            self.stereo_only
        }
    }

    #[test]
    fn test_blocks_are_1152_with_partial_tail() {
        let buffer = PcmBuffer::silent(1, MP3_BLOCK_FRAMES * 2 + 100, 44100).unwrap();
        let mut encoder = RecordingEncoder::default();
        let asset = encode_with(&buffer, &mut encoder).unwrap();

        let lens: Vec<usize> = encoder.blocks.iter().map(|(l, _)| l.len()).collect();
        assert_eq!(lens, vec![1152, 1152, 100]);
        assert!(encoder.flushed);
        // First block emitted nothing, then blocks 2 and 3, then the flush
        assert_eq!(asset.bytes(), &[2, 3, 0xEE]);
        assert_eq!(asset.format(), ExportFormat::Mp3);
        assert_eq!(asset.bit_depth(), 16);
    }

    #[test]
    fn test_samples_use_wav_16bit_rule() {
        let buffer = PcmBuffer::new(vec![vec![1.0, -1.0, 0.5, 9.0, f32::NAN]], 8000).unwrap();
        let mut encoder = RecordingEncoder::default();
        encode_with(&buffer, &mut encoder).unwrap();

        assert_eq!(encoder.blocks[0].0, vec![32767, -32768, 16383, 32767, 0]);
        assert!(encoder.blocks[0].1.is_none());
    }

    #[test]
    fn test_stereo_passes_both_channels() {
        let buffer = generate_stereo_test_tone(440.0, 880.0, 0.05, 44100);
        let mut encoder = RecordingEncoder::default();
        encode_with(&buffer, &mut encoder).unwrap();

        let (left, right) = &encoder.blocks[0];
        let right = right.as_ref().unwrap();
        assert_eq!(left[1], to_pcm16(buffer.channel(0)[1]));
        assert_eq!(right[1], to_pcm16(buffer.channel(1)[1]));
    }

    #[test]
    fn test_mono_duplicated_only_when_required() {
        let buffer = generate_test_tone(440.0, 0.01, 44100);

        let mut passthrough = RecordingEncoder::default();
        encode_with(&buffer, &mut passthrough).unwrap();
        assert!(passthrough.blocks[0].1.is_none());

        let mut stereo_only = RecordingEncoder {
            stereo_only: true,
            ..Default::default()
        };
        encode_with(&buffer, &mut stereo_only).unwrap();
        let (left, right) = &stereo_only.blocks[0];
        assert_eq!(Some(left), right.as_ref());
    }

    #[test]
    fn test_block_failure_aborts_without_flush() {
        let buffer = PcmBuffer::silent(2, MP3_BLOCK_FRAMES * 3, 44100).unwrap();
        let mut encoder = RecordingEncoder {
            fail_on_block: Some(1),
            ..Default::default()
        };

        let err = encode_with(&buffer, &mut encoder).unwrap_err();
        assert_eq!(err.error_code(), "ENCODER_FAILURE");
        assert!(!encoder.flushed);
    }

    #[test]
    fn test_more_than_two_channels_rejected() {
        let buffer = PcmBuffer::silent(3, 10, 44100).unwrap();
        let err = encode_with(&buffer, &mut RecordingEncoder::default()).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");
    }

    #[test]
    fn test_unsupported_bitrate() {
        assert!(FrameEncoder::with_bitrate(128).is_ok());
        assert!(FrameEncoder::with_bitrate(100).is_err());
    }

    #[test]
    fn test_lame_produces_mpeg_frames() {
        let buffer = generate_test_tone(440.0, 0.5, 44100);
        let asset = FrameEncoder::default().encode(&buffer).unwrap();
        let bytes = asset.bytes();

        assert!(bytes.len() > 1000, "only {} bytes", bytes.len());
        // MPEG frame sync: 11 set bits
        assert_eq!(bytes[0], 0xFF);
        assert_eq!(bytes[1] & 0xE0, 0xE0);
    }

    #[test]
    fn test_lame_stereo_is_deterministic() {
        let buffer = generate_stereo_test_tone(330.0, 550.0, 0.3, 48000);
        let first = FrameEncoder::default().encode(&buffer).unwrap();
        let second = FrameEncoder::default().encode(&buffer).unwrap();
        assert_eq!(first.checksum(), second.checksum());
    }
}
