//! BioBundle - flat-file bundles of biomedical images
//!
//! A bundle is an index file plus a data file holding framed image records
//! (JPEG, PNG, NIfTI, DICOM). Bundles are written sequentially, scanned
//! sequentially or in parallel byte ranges, and merged by verbatim copy.
//!
//! # Quick Start
//!
//! ```ignore
//! use biobundle::{BundleReader, BundleWriter, BundleConfig, CodecRegistry, ImageFormat};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(CodecRegistry::with_default_codecs());
//!
//! let mut writer = BundleWriter::create("scans.hib", false, registry.clone(), BundleConfig::default())?;
//! writer.add_encoded(&jpeg, ImageFormat::Jpeg, [("source", "camera-1")])?;
//! let summary = writer.close()?;
//!
//! for record in BundleReader::open_full(&summary.data_path, registry)? {
//!     println!("{} at {}", record.format(), record.offset);
//! }
//! ```
//!
//! # Architecture
//!
//! - `biobundle-core`: storage formats and image headers
//! - `biobundle-codec`: per-format codecs and the codec registry
//! - `biobundle-storage`: record framing, writer, reader, merge

pub use biobundle_codec::{
    testing, ClinicalImage, CodecError, CodecRegistry, CodecResult, DicomTag, DomainImage,
    ImageDecoder, ImageEncoder, RasterImage, VolumeImage,
};
pub use biobundle_core::{keys, ColorSpace, Error, ImageFormat, ImageHeader, Result};
pub use biobundle_storage::{
    append, format, BundleConfig, BundleError, BundleMode, BundlePaths, BundleReader,
    BundleResult, BundleWriter, ConfigError, ImageBundle, MergeSummary, ScanStop, ScannedRecord,
    WriteSummary,
};
