//! # Core Error Types
//!
//! Errors raised while reading or writing persisted entity/component data.
//! Lookups of missing entities or unregistered component types are not
//! errors; they return `false`/`None` at the call site.

use meridian_shared::StrId;
use thiserror::Error;

/// Errors that can occur in the core storage layer.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The stream ended in the middle of a value.
    #[error("unexpected end of stream: need {needed} bytes at offset {offset}, {remaining} remaining")]
    UnexpectedEof {
        /// Bytes the read required.
        needed: usize,
        /// Offset the read started at.
        offset: usize,
        /// Bytes left in the stream.
        remaining: usize,
    },

    /// A persisted identifier is not valid UTF-8.
    #[error("identifier at offset {0} is not valid UTF-8")]
    InvalidUtf8(usize),

    /// An identifier is too long for its length prefix.
    #[error("identifier too long: {0} bytes")]
    IdTooLong(usize),

    /// A length-prefixed section exceeds `u32::MAX` bytes.
    #[error("section too large: {0} bytes")]
    SectionTooLarge(usize),

    /// A record references the invalid handle where a live one is required.
    #[error("invalid entity handle in {0}")]
    InvalidHandle(&'static str),

    /// A saved entity could not be placed at its saved handle.
    #[error("entity {raw:#x} conflicts with an existing entity")]
    HandleConflict {
        /// Raw handle value.
        raw: u64,
    },

    /// A component payload could not be encoded or decoded.
    #[error("component '{component}' payload: {source}")]
    Payload {
        /// Component type name.
        component: StrId,
        /// Underlying codec error.
        source: postcard::Error,
    },

    /// A component could not be converted to or from params.
    #[error("component '{component}' params: {source}")]
    Params {
        /// Component type name.
        component: StrId,
        /// Underlying conversion error.
        source: serde_json::Error,
    },
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
