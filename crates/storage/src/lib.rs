//! Bundle storage for BioBundle
//!
//! This crate implements the two-file bundle container:
//! - BundleWriter: Appends framed records and cumulative index offsets
//! - BundleReader: Sequential, range-bounded scans with skip-on-corruption
//! - merge: Verbatim append of one bundle onto an open writer
//! - ImageBundle: Stateful Closed/Write/Read handle over both
//! - format: Record signature and index file layouts
//!
//! # Concurrency
//!
//! Handles are single-threaded. Any number of readers may scan disjoint
//! ranges of one data file in parallel, sharing one `Arc<CodecRegistry>`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bundle;
pub mod config;
pub mod error;
pub mod format;
pub mod merge;
pub mod paths;
pub mod reader;
pub mod writer;

pub use bundle::{BundleMode, ImageBundle};
pub use config::{BundleConfig, ConfigError};
pub use error::{BundleError, BundleResult};
pub use merge::{append, MergeSummary};
pub use paths::BundlePaths;
pub use reader::{BundleReader, ScanStop, ScannedRecord};
pub use writer::{BundleWriter, WriteSummary};
