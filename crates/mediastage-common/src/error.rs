//! Error types shared across Mediastage components

use thiserror::Error;

/// Result type alias for Mediastage operations
pub type Result<T> = std::result::Result<T, MediastageError>;

/// Main error type for Mediastage
#[derive(Error, Debug)]
pub enum MediastageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Fingerprint mismatch: expected {expected}, got {actual}")]
    FingerprintMismatch { expected: String, actual: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
