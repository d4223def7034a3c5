//! Codec error types

use biobundle_core::ImageFormat;
use std::io;
use thiserror::Error;

/// Errors raised by codecs and the codec registry.
#[derive(Debug, Error)]
pub enum CodecError {
    /// No codec is registered for the format.
    #[error("No codec registered for format {0}")]
    UnsupportedFormat(ImageFormat),

    /// Encoded bytes could not be parsed.
    #[error("Decode error ({format}): {detail}")]
    Decode {
        /// Format of the codec that failed
        format: ImageFormat,
        /// Human-readable error description
        detail: String,
    },

    /// Image could not be written.
    #[error("Encode error ({format}): {detail}")]
    Encode {
        /// Format of the codec that failed
        format: ImageFormat,
        /// Human-readable error description
        detail: String,
    },

    /// Image or header belongs to a different format than the codec.
    #[error("Format mismatch: expected {expected}, got {actual}")]
    FormatMismatch {
        /// Format the codec handles
        expected: ImageFormat,
        /// Format it was given
        actual: ImageFormat,
    },

    /// Portable image bytes are malformed.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Header bytes could not be parsed.
    #[error("Header error: {0}")]
    Header(#[from] biobundle_core::Error),

    /// Output sink failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Create a decode error
    pub fn decode(format: ImageFormat, detail: impl Into<String>) -> Self {
        CodecError::Decode {
            format,
            detail: detail.into(),
        }
    }

    /// Create an encode error
    pub fn encode(format: ImageFormat, detail: impl Into<String>) -> Self {
        CodecError::Encode {
            format,
            detail: detail.into(),
        }
    }

    /// Create an invalid image error
    pub fn invalid_image(msg: impl Into<String>) -> Self {
        CodecError::InvalidImage(msg.into())
    }
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::decode(ImageFormat::Png, "bad IHDR");
        let msg = err.to_string();
        assert!(msg.contains("PNG"));
        assert!(msg.contains("bad IHDR"));

        let err = CodecError::UnsupportedFormat(ImageFormat::Dicom);
        assert!(err.to_string().contains("DICOM"));

        let err = CodecError::FormatMismatch {
            expected: ImageFormat::Jpeg,
            actual: ImageFormat::Nifti,
        };
        let msg = err.to_string();
        assert!(msg.contains("JPEG"));
        assert!(msg.contains("NIFTI"));
    }

    #[test]
    fn test_codec_error_from_header() {
        let err: CodecError = biobundle_core::Error::UnknownFormatCode(9).into();
        assert!(matches!(err, CodecError::Header(_)));
        assert!(err.to_string().contains("9"));
    }
}
