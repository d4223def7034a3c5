//! Stateful bundle handle
//!
//! `ImageBundle` wraps a writer or a reader behind one handle whose mode
//! moves between Closed, Write and Read:
//!
//! ```text
//!            open_for_write            close
//!   Closed ─────────────────▶ Write ─────────▶ Closed
//!      │
//!      │     open_for_read(_at)        close
//!      └────────────────────▶ Read ──────────▶ Closed
//! ```
//!
//! Opening an already open handle fails with `AlreadyOpen`. An I/O failure
//! while writing drops the handle and returns it to Closed; the bundle on
//! disk may then end with a partial record.

use crate::config::BundleConfig;
use crate::error::{BundleError, BundleResult};
use crate::format::{read_offsets, IndexPreamble};
use crate::merge::{self, MergeSummary};
use crate::paths::BundlePaths;
use crate::reader::{BundleReader, ScanStop};
use crate::writer::{BundleWriter, WriteSummary};
use biobundle_codec::{CodecRegistry, DomainImage};
use biobundle_core::{ImageFormat, ImageHeader};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Current mode of an `ImageBundle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleMode {
    /// No files open
    Closed,
    /// Open for appending records
    Write,
    /// Open for sequential reading
    Read,
}

#[derive(Debug)]
enum Handle {
    Closed,
    Write(BundleWriter),
    Read(BundleReader),
}

/// A bundle on disk plus the handle currently open on it.
#[derive(Debug)]
pub struct ImageBundle {
    paths: BundlePaths,
    registry: Arc<CodecRegistry>,
    config: BundleConfig,
    handle: Handle,
}

impl ImageBundle {
    /// Closed handle for the bundle at `index_path`.
    pub fn new(index_path: impl AsRef<Path>, registry: Arc<CodecRegistry>) -> Self {
        Self::with_config(index_path, registry, BundleConfig::default())
    }

    /// Closed handle with an explicit configuration.
    pub fn with_config(
        index_path: impl AsRef<Path>,
        registry: Arc<CodecRegistry>,
        config: BundleConfig,
    ) -> Self {
        ImageBundle {
            paths: BundlePaths::new(index_path, &config.data_suffix),
            registry,
            config,
            handle: Handle::Closed,
        }
    }

    /// Current mode.
    pub fn mode(&self) -> BundleMode {
        match self.handle {
            Handle::Closed => BundleMode::Closed,
            Handle::Write(_) => BundleMode::Write,
            Handle::Read(_) => BundleMode::Read,
        }
    }

    /// Index and data file paths.
    pub fn paths(&self) -> &BundlePaths {
        &self.paths
    }

    /// Index file path.
    pub fn index_path(&self) -> &Path {
        self.paths.index()
    }

    /// Data file path.
    pub fn data_path(&self) -> &Path {
        self.paths.data()
    }

    /// Create the bundle files and open for writing.
    pub fn open_for_write(&mut self, overwrite: bool) -> BundleResult<()> {
        self.ensure_closed()?;
        let writer = BundleWriter::create(
            self.paths.index(),
            overwrite,
            self.registry.clone(),
            self.config.clone(),
        )?;
        self.handle = Handle::Write(writer);
        Ok(())
    }

    /// Open for reading from the first record.
    pub fn open_for_read(&mut self) -> BundleResult<()> {
        self.ensure_closed()?;
        let reader = BundleReader::open_with_config(
            self.paths.data(),
            0,
            0,
            self.registry.clone(),
            &self.config,
        )?;
        self.handle = Handle::Read(reader);
        Ok(())
    }

    /// Open for reading from the `image_index`-th record (zero based).
    ///
    /// An index equal to the record count opens at end of file, so the
    /// first `next` returns false.
    pub fn open_for_read_at(&mut self, image_index: u64) -> BundleResult<()> {
        self.ensure_closed()?;
        let wanted = usize::try_from(image_index).map_err(|_| BundleError::ImageIndexOutOfRange {
            index: image_index,
            available: 0,
        })?;
        let offsets = self.load_offsets(Some(wanted))?;
        if offsets.len() < wanted {
            return Err(BundleError::ImageIndexOutOfRange {
                index: image_index,
                available: offsets.len() as u64,
            });
        }

        let start = offsets.last().copied().unwrap_or(0);
        let reader = BundleReader::open_with_config(
            self.paths.data(),
            start,
            0,
            self.registry.clone(),
            &self.config,
        )?;
        self.handle = Handle::Read(reader);
        Ok(())
    }

    /// Append a record.
    pub fn add_image(&mut self, header: &ImageHeader, payload: &[u8]) -> BundleResult<u64> {
        let result = self.writer()?.add_image(header, payload);
        self.after_write(result)
    }

    /// Append encoded image bytes with a synthesized header.
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
        let result = self.writer()?.add_encoded(bytes, format, extra);
        self.after_write(result)
    }

    /// Encode and append a typed image.
    pub fn add_domain_image(&mut self, image: &DomainImage) -> BundleResult<u64> {
        let result = self.writer()?.add_domain_image(image);
        self.after_write(result)
    }

    /// Append every record of `other`, which must not be open for writing.
    pub fn append(&mut self, other: &ImageBundle) -> BundleResult<MergeSummary> {
        if other.mode() == BundleMode::Write {
            return Err(BundleError::AlreadyOpen);
        }
        let result = merge::append(self.writer()?, other.index_path());
        self.after_write(result)
    }

    /// Advance to the next record.
    pub fn next(&mut self) -> BundleResult<bool> {
        match &mut self.handle {
            Handle::Read(reader) => Ok(reader.next()),
            _ => Err(BundleError::NotOpenForRead),
        }
    }

    /// Header of the current record.
    pub fn current_header(&self) -> Option<&ImageHeader> {
        self.reader().and_then(|r| r.current_header())
    }

    /// Decoded image of the current record.
    pub fn current_image(&self) -> Option<&DomainImage> {
        self.reader().and_then(|r| r.current_image())
    }

    /// Why the current read scan stopped, if it has.
    pub fn stop_reason(&self) -> Option<&ScanStop> {
        self.reader().and_then(|r| r.stop_reason())
    }

    /// Read progress in `[0, 1]`, or 0 when not reading.
    pub fn progress(&self) -> f32 {
        self.reader().map_or(0.0, |r| r.progress())
    }

    /// All record end offsets from the index file.
    ///
    /// Buffered entries are flushed first when open for writing.
    pub fn read_all_offsets(&mut self) -> BundleResult<Vec<u64>> {
        if let Handle::Write(writer) = &mut self.handle {
            let result = writer.flush();
            self.after_write(result)?;
        }
        self.load_offsets(None)
    }

    /// Close the handle. Returns the write summary when closing a writer.
    pub fn close(&mut self) -> BundleResult<Option<WriteSummary>> {
        match std::mem::replace(&mut self.handle, Handle::Closed) {
            Handle::Closed => Ok(None),
            Handle::Read(mut reader) => {
                reader.close();
                Ok(None)
            }
            Handle::Write(writer) => writer.close().map(Some),
        }
    }

    fn ensure_closed(&self) -> BundleResult<()> {
        match self.handle {
            Handle::Closed => Ok(()),
            _ => Err(BundleError::AlreadyOpen),
        }
    }

    fn writer(&mut self) -> BundleResult<&mut BundleWriter> {
        match &mut self.handle {
            Handle::Write(writer) => Ok(writer),
            _ => Err(BundleError::NotOpenForWrite),
        }
    }

    fn reader(&self) -> Option<&BundleReader> {
        match &self.handle {
            Handle::Read(reader) => Some(reader),
            _ => None,
        }
    }

    /// Drop the writer after an I/O failure.
    fn after_write<T>(&mut self, result: BundleResult<T>) -> BundleResult<T> {
        if let Err(e) = &result {
            if e.is_io() {
                warn!(
                    index = %self.paths.index().display(),
                    error = %e,
                    "Closing bundle after write failure"
                );
                self.handle = Handle::Closed;
            }
        }
        result
    }

    fn load_offsets(&self, max: Option<usize>) -> BundleResult<Vec<u64>> {
        let mut index = BufReader::new(File::open(self.paths.index())?);
        IndexPreamble::read_from(&mut index)?;
        read_offsets(&mut index, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biobundle_codec::testing::{jpeg_bytes, nifti1_bytes};
    use tempfile::TempDir;

    fn bundle(dir: &TempDir, name: &str) -> ImageBundle {
        ImageBundle::with_config(
            dir.path().join(name),
            Arc::new(CodecRegistry::with_default_codecs()),
            BundleConfig::for_testing(),
        )
    }

    #[test]
    fn test_mode_transitions() {
        let dir = TempDir::new().unwrap();
        let mut b = bundle(&dir, "m.hib");
        assert_eq!(b.mode(), BundleMode::Closed);

        b.open_for_write(false).unwrap();
        assert_eq!(b.mode(), BundleMode::Write);
        assert!(matches!(b.open_for_read(), Err(BundleError::AlreadyOpen)));
        assert!(matches!(b.open_for_write(true), Err(BundleError::AlreadyOpen)));
        assert!(matches!(b.next(), Err(BundleError::NotOpenForRead)));

        let summary = b.close().unwrap().unwrap();
        assert_eq!(summary.records, 0);
        assert_eq!(b.mode(), BundleMode::Closed);

        b.open_for_read().unwrap();
        assert_eq!(b.mode(), BundleMode::Read);
        assert!(matches!(
            b.add_image(&ImageHeader::new(ImageFormat::Jpeg), b"x"),
            Err(BundleError::NotOpenForWrite)
        ));
        assert!(!b.next().unwrap());
        assert!(b.close().unwrap().is_none());
        assert!(b.close().unwrap().is_none());
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let mut b = bundle(&dir, "rw.hib");
        b.open_for_write(false).unwrap();
        b.add_encoded(&jpeg_bytes(8, 4), ImageFormat::Jpeg, [("source", "cam")])
            .unwrap();
        b.add_encoded(&nifti1_bytes([3, 3, 2, 1]), ImageFormat::Nifti, Vec::<(String, String)>::new())
            .unwrap();
        b.close().unwrap();

        b.open_for_read().unwrap();
        assert!(b.next().unwrap());
        assert_eq!(b.current_header().unwrap().get("source"), Some("cam"));
        assert!(b.next().unwrap());
        let volume = b.current_image().unwrap().as_volume().unwrap();
        assert_eq!(volume.x_len(), 3);
        assert_eq!(volume.voxel_count(), 18);
        assert!(!b.next().unwrap());
        assert_eq!(b.stop_reason(), Some(&ScanStop::Exhausted));
    }

    #[test]
    fn test_validation_error_keeps_writer_open() {
        let dir = TempDir::new().unwrap();
        let mut b = bundle(&dir, "v.hib");
        b.open_for_write(false).unwrap();
        assert!(b.add_encoded(b"garbage", ImageFormat::Png, Vec::<(String, String)>::new()).is_err());
        assert_eq!(b.mode(), BundleMode::Write);
    }

    #[test]
    fn test_open_for_read_at() {
        let dir = TempDir::new().unwrap();
        let mut b = bundle(&dir, "at.hib");
        b.open_for_write(false).unwrap();
        for i in 0..4 {
            let header = ImageHeader::with_metadata(ImageFormat::Jpeg, [("source", i.to_string())]);
            b.add_image(&header, &jpeg_bytes(2, 2)).unwrap();
        }
        assert_eq!(b.read_all_offsets().unwrap().len(), 4);
        b.close().unwrap();

        b.open_for_read_at(2).unwrap();
        assert!(b.next().unwrap());
        assert_eq!(b.current_header().unwrap().get("source"), Some("2"));
        b.close().unwrap();

        b.open_for_read_at(0).unwrap();
        assert!(b.next().unwrap());
        assert_eq!(b.current_header().unwrap().get("source"), Some("0"));
        b.close().unwrap();

        b.open_for_read_at(3).unwrap();
        assert!(b.next().unwrap());
        assert_eq!(b.current_header().unwrap().get("source"), Some("3"));
        assert!(!b.next().unwrap());
        b.close().unwrap();

        assert!(matches!(
            b.open_for_read_at(5),
            Err(BundleError::ImageIndexOutOfRange {
                index: 5,
                available: 4
            })
        ));
        assert_eq!(b.mode(), BundleMode::Closed);
    }

    #[test]
    fn test_bad_signature_reports_record_offset() {
        let dir = TempDir::new().unwrap();
        let mut b = bundle(&dir, "sig.hib");
        b.open_for_write(false).unwrap();
        for _ in 0..3 {
            b.add_image(&ImageHeader::new(ImageFormat::Jpeg), &jpeg_bytes(2, 2))
                .unwrap();
        }
        b.close().unwrap();
        let offsets = b.read_all_offsets().unwrap();

        let mut data = std::fs::read(b.data_path()).unwrap();
        let start = offsets[1] as usize;
        data[start + 4..start + 8].copy_from_slice(&(-1i32).to_be_bytes());
        std::fs::write(b.data_path(), &data).unwrap();

        b.open_for_read().unwrap();
        assert!(b.next().unwrap());
        assert!(b.next().unwrap());
        assert!(!b.next().unwrap());
        match b.stop_reason() {
            Some(ScanStop::SignatureError { offset, detail }) => {
                assert_eq!(*offset, offsets[1]);
                assert!(detail.contains("-1"));
            }
            other => panic!("unexpected stop {:?}", other),
        }
        assert_eq!(b.mode(), BundleMode::Read);
    }

    #[test]
    fn test_open_for_read_at_record_count() {
        let dir = TempDir::new().unwrap();
        let mut b = bundle(&dir, "end.hib");
        b.open_for_write(false).unwrap();
        b.close().unwrap();

        b.open_for_read_at(0).unwrap();
        assert!(!b.next().unwrap());
        assert_eq!(b.stop_reason(), Some(&ScanStop::Exhausted));
        b.close().unwrap();

        b.open_for_write(true).unwrap();
        for _ in 0..2 {
            b.add_image(&ImageHeader::new(ImageFormat::Jpeg), &jpeg_bytes(2, 2))
                .unwrap();
        }
        b.close().unwrap();

        b.open_for_read_at(2).unwrap();
        assert_eq!(b.mode(), BundleMode::Read);
        assert!(!b.next().unwrap());
        assert!(b.current_header().is_none());
        assert_eq!(b.stop_reason(), Some(&ScanStop::Exhausted));
        b.close().unwrap();

        assert!(matches!(
            b.open_for_read_at(3),
            Err(BundleError::ImageIndexOutOfRange {
                index: 3,
                available: 2
            })
        ));
    }

    #[test]
    fn test_append_requires_closed_source() {
        let dir = TempDir::new().unwrap();
        let mut a = bundle(&dir, "a.hib");
        let mut other = bundle(&dir, "b.hib");
        a.open_for_write(false).unwrap();
        other.open_for_write(false).unwrap();
        assert!(matches!(a.append(&other), Err(BundleError::AlreadyOpen)));
        other.close().unwrap();
        assert_eq!(a.append(&other).unwrap().records, 0);
    }
}
