//! Error handling for Crushwave
//!
//! Numeric edge cases (clipping, NaN samples) are repaired in place and never
//! surface here. Everything in this enum is scoped to a single processing
//! run and leaves previously produced assets untouched.

use thiserror::Error;

/// Result type alias for Crushwave operations
pub type Result<T> = std::result::Result<T, CrushError>;

/// Main error type for Crushwave operations
#[derive(Error, Debug)]
pub enum CrushError {
    // Input Errors
    #[error("File not found: {path}")]
    FileNotFound {
        path: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Invalid audio file: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Invalid PCM buffer: {reason}")]
    InvalidBuffer { reason: String },

    #[error("Invalid processing parameter {name}: {reason}")]
    InvalidParams { name: &'static str, reason: String },

    // Encoding Errors
    #[error("Encoding failed: {reason}")]
    EncoderFailure { reason: String },

    #[error("Size ceiling of {ceiling} bytes cannot hold a single frame ({required} bytes needed)")]
    SizeCeilingUnreachable { ceiling: usize, required: usize },

    #[error("Malformed WAV header: {reason}")]
    MalformedHeader { reason: String },

    // Worker Errors
    #[error("Encoder worker unavailable: {reason}")]
    WorkerUnavailable { reason: String },

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CrushError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            CrushError::FileNotFound { .. } => "FILE_NOT_FOUND",
            CrushError::InvalidAudio { .. } => "INVALID_AUDIO",
            CrushError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            CrushError::InvalidBuffer { .. } => "INVALID_BUFFER",
            CrushError::InvalidParams { .. } => "INVALID_PARAMS",
            CrushError::EncoderFailure { .. } => "ENCODER_FAILURE",
            CrushError::SizeCeilingUnreachable { .. } => "SIZE_CEILING_UNREACHABLE",
            CrushError::MalformedHeader { .. } => "MALFORMED_HEADER",
            CrushError::WorkerUnavailable { .. } => "WORKER_UNAVAILABLE",
            CrushError::InvalidConfig { .. } => "INVALID_CONFIG",
            CrushError::Io(_) => "IO_ERROR",
            CrushError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if the session can carry on after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            CrushError::FileNotFound { .. } => true,
            CrushError::InvalidAudio { .. } => true,
            CrushError::UnsupportedFormat { .. } => true,
            CrushError::InvalidParams { .. } => true,
            CrushError::EncoderFailure { .. } => true,
            CrushError::SizeCeilingUnreachable { .. } => true,
            CrushError::InvalidConfig { .. } => true,
            _ => false,
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            CrushError::FileNotFound { .. } => vec![
                "Check the file path is correct",
                "Verify the file hasn't been moved or deleted",
            ],
            CrushError::InvalidAudio { .. } => vec![
                "Check if the file plays in another application",
                "Convert the file to 16-bit PCM WAV first",
            ],
            CrushError::UnsupportedFormat { .. } => vec![
                "MP3 export supports mono or stereo sources only",
                "Export as WAV to keep every channel",
            ],
            CrushError::InvalidParams { .. } => vec![
                "Bit depth must be between 1 and 16 (or 32 to bypass)",
                "Hold factor must be between 1 and 20",
            ],
            CrushError::EncoderFailure { .. } => vec![
                "Try exporting as WAV instead",
                "Previous exports are still available",
            ],
            CrushError::SizeCeilingUnreachable { .. } => vec![
                "Raise size_ceiling_bytes in the configuration",
            ],
            CrushError::InvalidConfig { .. } => vec![
                "Delete the configuration file to fall back to defaults",
            ],
            _ => vec![],
        }
    }
}
