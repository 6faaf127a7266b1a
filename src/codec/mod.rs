//! Encoders that serialize processed PCM into portable containers
//!
//! - [`wav`]: self-sizing RIFF/WAVE writer with physical downsampling
//! - [`mp3`]: frame-based MP3 encoder driven block by block

pub mod mp3;
pub mod wav;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CrushError, Result};

pub use mp3::{BlockEncoder, FrameEncoder, LameBlockEncoder, MP3_BLOCK_FRAMES};
pub use wav::{WavEncoder, WavHeader, WavPlan, DEFAULT_SIZE_CEILING_BYTES, WAV_HEADER_LEN};

/// Prefix of suggested download names
const EXPORT_NAME_PREFIX: &str = "8bit_";

/// Container format of an exported asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Uncompressed RIFF/WAVE
    #[default]
    Wav,
    /// MPEG-1 Layer III at a constant bit rate
    Mp3,
}

impl ExportFormat {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Wav => "wav",
            ExportFormat::Mp3 => "mp3",
        }
    }

    /// MIME type handed to download collaborators
    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Wav => "audio/wav",
            ExportFormat::Mp3 => "audio/mpeg",
        }
    }

    /// Parse an export format from a string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "wav" | "wave" => Some(ExportFormat::Wav),
            "mp3" => Some(ExportFormat::Mp3),
            _ => None,
        }
    }

    /// Suggested output name for a source file, e.g. `song.flac` -> `8bit_song.wav`
    pub fn file_name_for(&self, source: &Path) -> String {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        format!("{}{}.{}", EXPORT_NAME_PREFIX, stem, self.extension())
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Wav => write!(f, "WAV"),
            ExportFormat::Mp3 => write!(f, "MP3"),
        }
    }
}

/// A finished binary export
///
/// Owns its bytes; dropping the asset releases its storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAsset {
    bytes: Vec<u8>,
    sample_rate: u32,
    bit_depth: u16,
    format: ExportFormat,
}

impl EncodedAsset {
    /// Wrap encoder output
    ///
    /// # Errors
    /// * `InvalidParams` - If `bit_depth` is not 8 or 16
    pub fn new(bytes: Vec<u8>, sample_rate: u32, bit_depth: u16, format: ExportFormat) -> Result<Self> {
        if bit_depth != 8 && bit_depth != 16 {
            return Err(CrushError::InvalidParams {
                name: "bit_depth",
                reason: format!("declared bit depth must be 8 or 16, got {}", bit_depth),
            });
        }

        Ok(Self {
            bytes,
            sample_rate,
            bit_depth,
            format,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Sample rate declared by the container
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Bits per sample declared by the container (8 or 16)
    pub fn bit_depth(&self) -> u16 {
        self.bit_depth
    }

    pub fn format(&self) -> ExportFormat {
        self.format
    }

    /// SHA-256 of the encoded bytes as lowercase hex
    pub fn checksum(&self) -> String {
        format!("{:x}", Sha256::digest(&self.bytes))
    }
}
