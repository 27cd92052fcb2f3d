//! # Level Error Types

use thiserror::Error;

/// Errors raised while reading a level description.
#[derive(Error, Debug)]
pub enum LevelError {
    /// The TOML text is malformed or has wrongly typed fields.
    #[error("invalid level description: {0}")]
    Toml(#[from] toml::de::Error),

    /// A params document does not describe a level.
    #[error("invalid level params: {0}")]
    Params(#[from] serde_json::Error),

    /// The description file could not be read.
    #[error("failed to read level description: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for level operations.
pub type LevelResult<T> = Result<T, LevelError>;
