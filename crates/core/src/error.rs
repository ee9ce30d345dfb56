//! Error type shared by the pure core utilities.

/// Errors produced by core utilities.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Input failed a validation rule.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML metadata parsing failed.
    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_yaml::Error),
}
