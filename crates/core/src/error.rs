//! Error types for the client core.

use thiserror::Error;

/// Core error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid chunk size: {0} (must be greater than zero)")]
    InvalidChunkSize(u64),

    #[error("unsupported media type: {0} (expected video/*)")]
    UnsupportedMediaType(String),

    #[error("file too large: {size} bytes (max {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("unknown curve: {0} (expected separation, ω_pelvis, ω_thorax or v_hand)")]
    UnknownCurve(String),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("upload failed ({status}) at byte {offset}: {body}")]
    ChunkRejected {
        status: u16,
        offset: u64,
        body: String,
    },

    #[error("range {range} does not continue from offset {offset}")]
    RangeOutOfOrder { range: String, offset: u64 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("upload aborted")]
    Aborted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status carried by a rejected chunk, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ChunkRejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
