//! Error types for the image model
//!
//! This module defines the errors raised while parsing formats and
//! (de)serializing image headers. We use `thiserror` for automatic
//! `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

/// Result type alias for image model operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the image model
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error while reading or writing header bytes
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Integer does not map to any storage format
    #[error("Unknown image format code: {0}")]
    UnknownFormatCode(i32),

    /// Header bytes are structurally invalid
    #[error("Invalid image header: {0}")]
    InvalidHeader(String),

    /// Metadata JSON could not be encoded or decoded
    #[error("Metadata JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid header error
    pub fn invalid_header(msg: impl Into<String>) -> Self {
        Error::InvalidHeader(msg.into())
    }
}
