//! Bundle reader
//!
//! Scans records sequentially from a byte range of a data file. The range
//! follows the split convention: a record is read if it *starts* at or
//! before the inclusive range end, even when it extends past it. Readers
//! of adjacent ranges therefore see each record exactly once.
//!
//! # Stop and skip rules
//!
//! - Clean end of file or end of range: stop with `ScanStop::Exhausted`
//! - Truncated or malformed signature: stop with `ScanStop::SignatureError`
//! - Short header or payload read, or any I/O error: stop with `ScanStop::Io`
//! - No decoder for the record's format: stop with `ScanStop::UnsupportedFormat`
//! - Header or payload that fails to decode: record skipped, scan continues
//!
//! There is no resynchronization after a bad signature.

use crate::config::BundleConfig;
use crate::error::BundleResult;
use crate::format::{decode_signature, read_fully, SIGNATURE_SIZE};
use biobundle_codec::{CodecRegistry, DomainImage};
use biobundle_core::{ImageFormat, ImageHeader};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Why a scan ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStop {
    /// End of file or end of range reached cleanly
    Exhausted,
    /// Signature at `offset` is truncated or invalid
    SignatureError {
        /// Data file offset of the record
        offset: u64,
        /// What was wrong
        detail: String,
    },
    /// Read failed or ended early inside the record at `offset`
    Io {
        /// Data file offset of the record
        offset: u64,
        /// What was wrong
        detail: String,
    },
    /// No decoder is registered for the record's format
    UnsupportedFormat {
        /// Data file offset of the record
        offset: u64,
        /// Format of the record
        format: ImageFormat,
    },
}

impl ScanStop {
    /// True for a clean end of scan.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, ScanStop::Exhausted)
    }
}

impl fmt::Display for ScanStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStop::Exhausted => write!(f, "exhausted"),
            ScanStop::SignatureError { offset, detail } => {
                write!(f, "bad signature at offset {}: {}", offset, detail)
            }
            ScanStop::Io { offset, detail } => {
                write!(f, "read error at offset {}: {}", offset, detail)
            }
            ScanStop::UnsupportedFormat { offset, format } => {
                write!(f, "unsupported format {} at offset {}", format, offset)
            }
        }
    }
}

/// One decoded record.
#[derive(Debug, Clone)]
pub struct ScannedRecord {
    /// Data file offset where the record starts
    pub offset: u64,
    /// Decoded image; its encoded bytes are the record payload
    pub image: DomainImage,
}

impl ScannedRecord {
    /// Record header.
    pub fn header(&self) -> &ImageHeader {
        self.image.header()
    }

    /// Record payload.
    pub fn payload(&self) -> &[u8] {
        self.image.encoded()
    }

    /// Storage format of the record.
    pub fn format(&self) -> ImageFormat {
        self.image.format()
    }
}

enum Step {
    Record(ScannedRecord),
    Skip,
    Stop(ScanStop),
}

/// Sequential reader over a byte range of a data file.
pub struct BundleReader {
    path: PathBuf,
    file: Option<BufReader<File>>,
    registry: Arc<CodecRegistry>,
    start: u64,
    /// Exclusive upper bound on record start offsets; `None` reads to EOF
    limit: Option<u64>,
    file_len: u64,
    offset: u64,
    current: Option<ScannedRecord>,
    stop: Option<ScanStop>,
    skipped: u64,
}

impl BundleReader {
    /// Open a reader over `[start, end]` of the data file.
    ///
    /// `end` is inclusive; `0` means read until end of file.
    pub fn open(
        data_path: impl AsRef<Path>,
        start: u64,
        end: u64,
        registry: Arc<CodecRegistry>,
    ) -> BundleResult<Self> {
        Self::open_with_config(data_path, start, end, registry, &BundleConfig::default())
    }

    /// Open a reader over the whole data file.
    pub fn open_full(data_path: impl AsRef<Path>, registry: Arc<CodecRegistry>) -> BundleResult<Self> {
        Self::open(data_path, 0, 0, registry)
    }

    /// Open a reader over `length` bytes starting at `start`.
    pub fn open_split(
        data_path: impl AsRef<Path>,
        start: u64,
        length: u64,
        registry: Arc<CodecRegistry>,
    ) -> BundleResult<Self> {
        Self::open_limit(
            data_path.as_ref(),
            start,
            Some(start.saturating_add(length)),
            registry,
            &BundleConfig::default(),
        )
    }

    /// Open a reader over `[start, end]` with an explicit configuration.
    pub fn open_with_config(
        data_path: impl AsRef<Path>,
        start: u64,
        end: u64,
        registry: Arc<CodecRegistry>,
        config: &BundleConfig,
    ) -> BundleResult<Self> {
        let limit = if end == 0 {
            None
        } else {
            Some(end.saturating_add(1))
        };
        Self::open_limit(data_path.as_ref(), start, limit, registry, config)
    }

    fn open_limit(
        path: &Path,
        start: u64,
        limit: Option<u64>,
        registry: Arc<CodecRegistry>,
        config: &BundleConfig,
    ) -> BundleResult<Self> {
        config.validate()?;
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();
        file.seek(SeekFrom::Start(start))?;

        debug!(
            path = %path.display(),
            start,
            limit = ?limit,
            file_len,
            "Opened bundle reader"
        );

        Ok(BundleReader {
            path: path.to_path_buf(),
            file: Some(BufReader::with_capacity(config.read_buffer_size, file)),
            registry,
            start,
            limit,
            file_len,
            offset: start,
            current: None,
            stop: None,
            skipped: 0,
        })
    }

    /// Advance to the next decodable record.
    ///
    /// Returns false once the scan has stopped; `stop_reason` says why.
    /// Records whose header or payload fail to decode are skipped.
    pub fn next(&mut self) -> bool {
        self.current = None;
        if self.stop.is_some() {
            return false;
        }

        loop {
            match self.read_record() {
                Step::Record(record) => {
                    self.current = Some(record);
                    return true;
                }
                Step::Skip => {
                    self.skipped += 1;
                }
                Step::Stop(reason) => {
                    if reason.is_exhausted() {
                        debug!(path = %self.path.display(), offset = self.offset, "Scan exhausted");
                    } else {
                        warn!(path = %self.path.display(), reason = %reason, "Scan stopped");
                    }
                    self.stop = Some(reason);
                    return false;
                }
            }
        }
    }

    fn read_record(&mut self) -> Step {
        let offset = self.offset;
        if self.limit.map_or(false, |limit| offset >= limit) {
            return Step::Stop(ScanStop::Exhausted);
        }
        let Some(file) = self.file.as_mut() else {
            return Step::Stop(ScanStop::Exhausted);
        };

        let mut sig_bytes = [0u8; SIGNATURE_SIZE];
        match read_fully(file, &mut sig_bytes) {
            Ok(0) => return Step::Stop(ScanStop::Exhausted),
            Ok(n) if n < SIGNATURE_SIZE => {
                return Step::Stop(ScanStop::SignatureError {
                    offset,
                    detail: format!("truncated signature: {} of {} bytes", n, SIGNATURE_SIZE),
                })
            }
            Ok(_) => {}
            Err(e) => {
                return Step::Stop(ScanStop::Io {
                    offset,
                    detail: e.to_string(),
                })
            }
        }

        let signature = match decode_signature(&sig_bytes) {
            Ok(sig) => sig,
            Err(e) => {
                return Step::Stop(ScanStop::SignatureError {
                    offset,
                    detail: e.to_string(),
                })
            }
        };

        let record_end = offset + signature.record_len();
        if record_end > self.file_len {
            return Step::Stop(ScanStop::Io {
                offset,
                detail: format!(
                    "record needs {} bytes but data file ends at {}",
                    signature.record_len(),
                    self.file_len
                ),
            });
        }

        let mut header_bytes = vec![0u8; signature.header_len as usize];
        let mut payload = vec![0u8; signature.payload_len as usize];
        for (section, buf) in [("header", &mut header_bytes), ("payload", &mut payload)] {
            match read_fully(file, buf) {
                Ok(n) if n == buf.len() => {}
                Ok(n) => {
                    return Step::Stop(ScanStop::Io {
                        offset,
                        detail: format!("short {} read: {} of {} bytes", section, n, buf.len()),
                    })
                }
                Err(e) => {
                    return Step::Stop(ScanStop::Io {
                        offset,
                        detail: e.to_string(),
                    })
                }
            }
        }
        self.offset = record_end;

        let header = match ImageHeader::from_bytes(&header_bytes) {
            Ok(header) => header,
            Err(e) => {
                warn!(offset, error = %e, "Skipping record with unreadable header");
                return Step::Skip;
            }
        };
        if header.storage_format() != signature.format {
            warn!(
                offset,
                signature = %signature.format,
                header = %header.storage_format(),
                "Skipping record whose header disagrees with its signature"
            );
            return Step::Skip;
        }

        if !self.registry.supports(signature.format) {
            return Step::Stop(ScanStop::UnsupportedFormat {
                offset,
                format: signature.format,
            });
        }

        match self.registry.decode_image(&payload, header) {
            Ok(image) => Step::Record(ScannedRecord { offset, image }),
            Err(e) => {
                warn!(offset, format = %signature.format, error = %e, "Skipping undecodable record");
                Step::Skip
            }
        }
    }

    /// Why the scan stopped, once it has.
    pub fn stop_reason(&self) -> Option<&ScanStop> {
        self.stop.as_ref()
    }

    /// Header of the current record.
    pub fn current_header(&self) -> Option<&ImageHeader> {
        self.current.as_ref().map(|r| r.header())
    }

    /// Decoded image of the current record.
    pub fn current_image(&self) -> Option<&DomainImage> {
        self.current.as_ref().map(|r| &r.image)
    }

    /// Payload bytes of the current record.
    pub fn current_payload(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|r| r.payload())
    }

    /// Storage format of the current record.
    pub fn current_format(&self) -> Option<ImageFormat> {
        self.current.as_ref().map(|r| r.format())
    }

    /// Data file offset of the current record.
    pub fn current_offset(&self) -> Option<u64> {
        self.current.as_ref().map(|r| r.offset)
    }

    /// Move the current record out of the reader.
    pub fn take_current(&mut self) -> Option<ScannedRecord> {
        self.current.take()
    }

    /// Records skipped because their header or payload failed to decode.
    pub fn skipped_records(&self) -> u64 {
        self.skipped
    }

    /// Offset of the next record to read.
    pub fn position(&self) -> u64 {
        self.offset
    }

    /// Fraction of the range consumed, in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        let limit = self.limit.unwrap_or(self.file_len);
        if limit <= self.start {
            return 0.0;
        }
        let done = self.offset.saturating_sub(self.start) as f64;
        let total = (limit - self.start) as f64;
        (done / total).clamp(0.0, 1.0) as f32
    }

    /// Release the file handle. Safe to call more than once.
    pub fn close(&mut self) {
        self.current = None;
        if self.file.take().is_some() {
            debug!(
                path = %self.path.display(),
                offset = self.offset,
                skipped = self.skipped,
                "Closed bundle reader"
            );
        }
    }

    /// True until `close` is called.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

impl Iterator for BundleReader {
    type Item = ScannedRecord;

    fn next(&mut self) -> Option<ScannedRecord> {
        if BundleReader::next(self) {
            self.take_current()
        } else {
            None
        }
    }
}

impl fmt::Debug for BundleReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleReader")
            .field("path", &self.path)
            .field("start", &self.start)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("stop", &self.stop)
            .finish()
    }
}
