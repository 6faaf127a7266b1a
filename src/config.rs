//! Session configuration
//!
//! Loaded from JSON; every field is optional and falls back to the defaults
//! below.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::mp3::{FrameEncoder, DEFAULT_MP3_BITRATE_KBPS, SUPPORTED_BITRATES_KBPS};
use crate::codec::wav::{WavEncoder, DEFAULT_SIZE_CEILING_BYTES};
use crate::codec::ExportFormat;
use crate::dsp::ProcessingParams;
use crate::error::{CrushError, Result};

/// Quiet period before a burst of parameter changes is processed
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrushConfig {
    /// Hard upper bound on WAV export size
    pub size_ceiling_bytes: usize,
    pub debounce_ms: u64,
    pub mp3_bitrate_kbps: u32,
    pub default_bit_depth: u32,
    pub default_hold_factor: u32,
    pub export_format: ExportFormat,
}

impl Default for CrushConfig {
    fn default() -> Self {
        let params = ProcessingParams::default();
        Self {
            size_ceiling_bytes: DEFAULT_SIZE_CEILING_BYTES,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            mp3_bitrate_kbps: DEFAULT_MP3_BITRATE_KBPS,
            default_bit_depth: params.bit_depth(),
            default_hold_factor: params.hold_factor(),
            export_format: ExportFormat::Wav,
        }
    }
}

impl CrushConfig {
    /// Load and validate a JSON configuration file
    ///
    /// # Errors
    /// * `FileNotFound` - If the file cannot be read
    /// * `Serialization` - If the JSON is malformed
    /// * `InvalidConfig` - If a value is out of range
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| CrushError::FileNotFound {
            path: path.display().to_string(),
            source: Some(e),
        })?;

        let config: CrushConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.size_ceiling_bytes == 0 {
            return Err(CrushError::InvalidConfig {
                reason: "size_ceiling_bytes must be positive".to_string(),
            });
        }

        if !SUPPORTED_BITRATES_KBPS.contains(&self.mp3_bitrate_kbps) {
            return Err(CrushError::InvalidConfig {
                reason: format!(
                    "mp3_bitrate_kbps {} is not one of {:?}",
                    self.mp3_bitrate_kbps, SUPPORTED_BITRATES_KBPS
                ),
            });
        }

        self.default_params().map_err(|e| CrushError::InvalidConfig {
            reason: e.to_string(),
        })?;

        Ok(())
    }

    /// Parameters a fresh session starts with
    pub fn default_params(&self) -> Result<ProcessingParams> {
        ProcessingParams::new(self.default_bit_depth, self.default_hold_factor)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn wav_encoder(&self) -> WavEncoder {
        WavEncoder::with_size_ceiling(self.size_ceiling_bytes)
    }

    pub fn frame_encoder(&self) -> Result<FrameEncoder> {
        FrameEncoder::with_bitrate(self.mp3_bitrate_kbps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = CrushConfig::default();
        assert_eq!(config.size_ceiling_bytes, 16_000_000);
        assert_eq!(config.debounce(), Duration::from_millis(300));
        assert_eq!(config.mp3_bitrate_kbps, 128);
        assert_eq!(config.default_params().unwrap(), ProcessingParams::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CrushConfig =
            serde_json::from_str(r#"{ "debounce_ms": 50, "export_format": "mp3" }"#).unwrap();
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.export_format, ExportFormat::Mp3);
        assert_eq!(config.size_ceiling_bytes, DEFAULT_SIZE_CEILING_BYTES);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = CrushConfig {
            size_ceiling_bytes: 0,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().error_code(), "INVALID_CONFIG");

        let config = CrushConfig {
            mp3_bitrate_kbps: 129,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CrushConfig {
            default_hold_factor: 40,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "size_ceiling_bytes": 1000000, "default_bit_depth": 4 }}"#).unwrap();

        let config = CrushConfig::load(file.path()).unwrap();
        assert_eq!(config.size_ceiling_bytes, 1_000_000);
        assert_eq!(config.default_params().unwrap().bit_depth(), 4);
        assert_eq!(config.wav_encoder().size_ceiling(), 1_000_000);
    }

    #[test]
    fn test_load_missing_file() {
        let err = CrushConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");
    }
}
