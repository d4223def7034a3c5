//! Image codecs for BioBundle
//!
//! This crate turns encoded image payloads into typed images and back:
//! - ImageDecoder / ImageEncoder: Per-format codec traits
//! - CodecRegistry: Format-keyed codec lookup, shared via `Arc`
//! - DomainImage: Typed image keyed by storage format
//! - JPEG, PNG, NIfTI and DICOM codecs (header-level parsing only)
//! - testing: Builders for small valid encoded images

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dicom;
pub mod error;
pub mod image;
pub mod jpeg;
pub mod nifti;
pub mod png;
pub mod registry;
pub mod testing;
pub mod traits;

pub use dicom::{DicomCodec, DicomTag};
pub use error::{CodecError, CodecResult};
pub use image::{ClinicalImage, DomainImage, RasterImage, VolumeImage};
pub use jpeg::JpegCodec;
pub use nifti::{Endianness, NiftiCodec, NiftiGeometry, NiftiVersion};
pub use png::PngCodec;
pub use registry::CodecRegistry;
pub use traits::{ImageDecoder, ImageEncoder};
