//! Bundle error types

use crate::config::ConfigError;
use biobundle_codec::CodecError;
use biobundle_core::ImageFormat;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during bundle operations
#[derive(Debug, Error)]
pub enum BundleError {
    /// Bundle handle is already open in some mode
    #[error("Bundle is already open")]
    AlreadyOpen,

    /// Target file exists and overwrite was not requested
    #[error("File already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Operation needs the bundle open for reading
    #[error("Bundle is not open for reading")]
    NotOpenForRead,

    /// Operation needs the bundle open for writing
    #[error("Bundle is not open for writing")]
    NotOpenForWrite,

    /// No codec is registered for the format
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(ImageFormat),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Codec failed on a payload
    #[error("Payload decode error: {0}")]
    PayloadDecode(#[source] CodecError),

    /// Header bytes could not be parsed
    #[error("Header error: {0}")]
    Header(#[from] biobundle_core::Error),

    /// Index file is malformed or disagrees with the data file
    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    /// Record section does not fit a signed 32-bit length
    #[error("Record {section} is too large: {len} bytes")]
    RecordTooLarge {
        /// "header" or "payload"
        section: &'static str,
        /// Actual length
        len: usize,
    },

    /// Record section is empty
    #[error("Record {0} is empty")]
    EmptySection(&'static str),

    /// Requested image index is past the end of the bundle
    #[error("Image index {index} out of range ({available} images)")]
    ImageIndexOutOfRange {
        /// Requested index
        index: u64,
        /// Number of images in the bundle
        available: u64,
    },

    /// Writer hit an I/O error earlier and refuses further writes
    #[error("Writer is poisoned by an earlier I/O error")]
    Poisoned,

    /// Configuration is invalid
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl BundleError {
    /// Create an invalid index error
    pub fn invalid_index(msg: impl Into<String>) -> Self {
        BundleError::InvalidIndex(msg.into())
    }

    /// True for errors caused by the file system rather than by the caller's input
    pub fn is_io(&self) -> bool {
        matches!(self, BundleError::Io(_) | BundleError::Poisoned)
    }
}

impl From<CodecError> for BundleError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::UnsupportedFormat(format) => BundleError::UnsupportedFormat(format),
            CodecError::Header(e) => BundleError::Header(e),
            CodecError::Io(e) => BundleError::Io(e),
            other => BundleError::PayloadDecode(other),
        }
    }
}

/// Result type for bundle operations
pub type BundleResult<T> = Result<T, BundleError>;
