//! Bundle writer
//!
//! Appends records to the data file and one cumulative offset per record to
//! the index file. Writes are buffered; nothing is guaranteed on disk until
//! `flush` or `close`.
//!
//! # Failure model
//!
//! Validation failures (empty sections, unsupported formats, codec errors)
//! are reported without touching the files. Any I/O failure poisons the
//! writer: the files may now hold a torn record, so every later call fails
//! with `BundleError::Poisoned`.

use crate::config::BundleConfig;
use crate::error::{BundleError, BundleResult};
use crate::format::{frame_record, read_fully, IndexPreamble, IndexWriter};
use crate::paths::BundlePaths;
use biobundle_codec::{CodecRegistry, DomainImage};
use biobundle_core::{ImageFormat, ImageHeader};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of closing a writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    /// Records in the bundle
    pub records: u64,
    /// Data file length in bytes
    pub data_len: u64,
    /// Index file path
    pub index_path: PathBuf,
    /// Data file path
    pub data_path: PathBuf,
}

/// Appends images to a bundle.
pub struct BundleWriter {
    paths: BundlePaths,
    data: BufWriter<File>,
    index: IndexWriter<BufWriter<File>>,
    offset: u64,
    registry: Arc<CodecRegistry>,
    config: BundleConfig,
    poisoned: bool,
}

impl BundleWriter {
    /// Create a new bundle at `index_path`.
    ///
    /// Fails with `AlreadyExists` if either file exists and `overwrite` is
    /// false. Missing parent directories are created.
    pub fn create(
        index_path: impl AsRef<Path>,
        overwrite: bool,
        registry: Arc<CodecRegistry>,
        config: BundleConfig,
    ) -> BundleResult<Self> {
        config.validate()?;
        let paths = BundlePaths::new(index_path, &config.data_suffix);

        if !overwrite && paths.any_exists() {
            let existing = if paths.index().exists() {
                paths.index()
            } else {
                paths.data()
            };
            return Err(BundleError::AlreadyExists(existing.to_path_buf()));
        }

        if let Some(parent) = paths.index().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let data = BufWriter::with_capacity(config.write_buffer_size, File::create(paths.data())?);
        let index = IndexWriter::new(
            BufWriter::with_capacity(config.write_buffer_size, File::create(paths.index())?),
            &IndexPreamble::default(),
        )?;

        debug!(
            index = %paths.index().display(),
            data = %paths.data().display(),
            overwrite,
            "Created bundle"
        );

        Ok(BundleWriter {
            paths,
            data,
            index,
            offset: 0,
            registry,
            config,
            poisoned: false,
        })
    }

    /// Append one record and return the data file offset just past it.
    ///
    /// The payload is stored as-is; it is not checked against the header.
    pub fn add_image(&mut self, header: &ImageHeader, payload: &[u8]) -> BundleResult<u64> {
        self.ensure_usable()?;
        let record = frame_record(&header.to_bytes(), payload, header.storage_format())?;

        let end = self.offset + record.len() as u64;
        let result = self
            .data
            .write_all(&record)
            .and_then(|_| self.index.append(end));
        self.check_io(result)?;

        self.offset = end;
        Ok(end)
    }

    /// Drain `payload` into memory, then append it.
    pub fn add_image_from_reader<R: Read>(
        &mut self,
        header: &ImageHeader,
        mut payload: R,
    ) -> BundleResult<u64> {
        self.ensure_usable()?;
        let mut bytes = Vec::new();
        payload.read_to_end(&mut bytes)?;
        self.add_image(header, &bytes)
    }

    /// Append encoded image bytes, synthesizing the header with the
    /// registered decoder for `format`.
    ///
    /// `extra` entries are added to the synthesized metadata and win on
    /// key collisions.
    pub fn add_encoded<K, V, I>(
        &mut self,
        bytes: &[u8],
        format: ImageFormat,
        extra: I,
    ) -> BundleResult<u64>
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.ensure_usable()?;
        let mut header = self.registry.decode_header(format, bytes)?;
        header.append_metadata(extra);
        self.add_image(&header, bytes)
    }

    /// Encode a typed image with the registered encoder, then append it.
    pub fn add_domain_image(&mut self, image: &DomainImage) -> BundleResult<u64> {
        self.ensure_usable()?;
        let bytes = self.registry.encode_image(image)?;
        self.add_image(image.header(), &bytes)
    }

    /// Flush buffered records and index entries.
    pub fn flush(&mut self) -> BundleResult<()> {
        self.ensure_usable()?;
        let result = self.data.flush().and_then(|_| self.index.flush());
        self.check_io(result)
    }

    /// Flush both files and release them.
    pub fn close(mut self) -> BundleResult<WriteSummary> {
        self.flush()?;
        if self.config.sync_on_close {
            let result = self
                .data
                .get_ref()
                .sync_all()
                .and_then(|_| self.index.get_ref().get_ref().sync_all());
            self.check_io(result)?;
        }

        debug!(
            index = %self.paths.index().display(),
            records = self.records_written(),
            data_len = self.offset,
            "Closed bundle writer"
        );

        Ok(WriteSummary {
            records: self.records_written(),
            data_len: self.offset,
            index_path: self.paths.index().to_path_buf(),
            data_path: self.paths.data().to_path_buf(),
        })
    }

    /// Data file offset where the next record will start.
    pub fn current_offset(&self) -> u64 {
        self.offset
    }

    /// Records written so far, counted by index entries.
    pub fn records_written(&self) -> u64 {
        self.index.entries()
    }

    /// Paths of this bundle.
    pub fn paths(&self) -> &BundlePaths {
        &self.paths
    }

    /// True once an I/O error has occurred.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Writer configuration.
    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    /// Codec registry used for `add_encoded` and `add_domain_image`.
    pub fn registry(&self) -> &Arc<CodecRegistry> {
        &self.registry
    }

    /// Copy already-framed records verbatim from `source`.
    ///
    /// `record_ends` are the source's cumulative offsets; the last one is
    /// the number of bytes to copy. Returns the number of bytes copied.
    pub(crate) fn append_raw<R: Read>(
        &mut self,
        source: &mut R,
        record_ends: &[u64],
    ) -> BundleResult<u64> {
        self.ensure_usable()?;
        let len = record_ends.last().copied().unwrap_or(0);
        let base = self.offset;

        let result = copy_chunks(source, &mut self.data, len, self.config.copy_chunk_size)
            .and_then(|_| {
                record_ends
                    .iter()
                    .try_for_each(|end| self.index.append(base + end))
            })
            .and_then(|_| self.data.flush())
            .and_then(|_| self.index.flush());
        self.check_io(result)?;

        self.offset = base + len;
        Ok(len)
    }

    fn ensure_usable(&self) -> BundleResult<()> {
        if self.poisoned {
            return Err(BundleError::Poisoned);
        }
        Ok(())
    }

    fn check_io<T>(&mut self, result: io::Result<T>) -> BundleResult<T> {
        result.map_err(|e| {
            warn!(
                index = %self.paths.index().display(),
                offset = self.offset,
                error = %e,
                "Bundle writer poisoned"
            );
            self.poisoned = true;
            BundleError::Io(e)
        })
    }
}

impl std::fmt::Debug for BundleWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleWriter")
            .field("paths", &self.paths)
            .field("offset", &self.offset)
            .field("records", &self.records_written())
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

fn copy_chunks<R: Read, W: Write>(
    source: &mut R,
    dest: &mut W,
    len: u64,
    chunk_size: usize,
) -> io::Result<()> {
    let mut buf = vec![0u8; chunk_size];
    let mut remaining = len;
    while remaining > 0 {
        let want = remaining.min(chunk_size as u64) as usize;
        let n = read_fully(source, &mut buf[..want])?;
        if n < want {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("source data ended {} bytes early", remaining - n as u64),
            ));
        }
        dest.write_all(&buf[..n])?;
        remaining -= n as u64;
    }
    Ok(())
}
