//! Core image model for BioBundle
//!
//! This crate defines the format-agnostic types shared by the codecs and the
//! bundle storage layer:
//! - ImageFormat: Closed set of storage formats with stable on-disk codes
//! - ColorSpace: Raster color space names stored in metadata
//! - ImageHeader: Storage format plus string metadata, with its byte encoding
//! - keys: Well-known metadata keys
//! - Error: Error type for format and header parsing

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod format;
pub mod header;

pub use error::{Error, Result};
pub use format::{ColorSpace, ImageFormat};
pub use header::{keys, ImageHeader, HEADER_PREFIX_SIZE};
