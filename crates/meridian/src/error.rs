//! # World Error Types
//!
//! Only loading paths fail with an error. Everything else reports misses
//! through `bool`/`Option`, like the storages underneath.

use meridian_core::CoreError;
use meridian_level::LevelError;
use thiserror::Error;

/// Errors raised by the world and its configuration.
#[derive(Error, Debug)]
pub enum WorldError {
    /// Malformed or truncated persisted world data.
    #[error("world stream: {0}")]
    Core(#[from] CoreError),

    /// Malformed level description.
    #[error("level description: {0}")]
    Level(#[from] LevelError),

    /// Malformed configuration file.
    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// File access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for world operations.
pub type WorldResult<T> = Result<T, WorldError>;
