//! Index file format
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │ Magic (4 bytes, BE) = 0x81911B18    │
//! ├─────────────────────────────────────┤
//! │ Reserved (8 bytes, BE) = 0          │
//! ├─────────────────────────────────────┤
//! │ Reserved (8 bytes, BE) = 0          │
//! ├─────────────────────────────────────┤
//! │ Skip bytes (4 bytes, BE)            │
//! ├─────────────────────────────────────┤
//! │ Skipped bytes (variable)            │
//! ├─────────────────────────────────────┤
//! │ Record end offset (8 bytes, BE)     │
//! │ ... one per record                  │
//! └─────────────────────────────────────┘
//! ```
//!
//! Entry k is the data file offset just past record k, so entries are
//! strictly increasing and the last one equals the data file length.

use crate::error::{BundleError, BundleResult};
use crate::format::read_fully;
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::io::{self, Read, Write};
use tracing::debug;

/// Magic number at the start of every index file.
pub const INDEX_MAGIC: u32 = 0x8191_1B18;

/// Size of the fixed preamble in bytes (excluding skipped bytes).
pub const PREAMBLE_SIZE: usize = 24;

/// Size of one offset entry.
pub const INDEX_ENTRY_SIZE: usize = 8;

/// Index file preamble.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexPreamble {
    /// Reserved words, written as zero
    pub reserved: [i64; 2],
    /// Number of bytes between the preamble and the first entry
    pub skip_bytes: u32,
}

impl IndexPreamble {
    /// Bytes occupied before the first offset entry.
    pub fn encoded_len(&self) -> u64 {
        PREAMBLE_SIZE as u64 + self.skip_bytes as u64
    }

    /// Write the preamble followed by `skip_bytes` zero bytes.
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u32::<BigEndian>(INDEX_MAGIC)?;
        writer.write_i64::<BigEndian>(self.reserved[0])?;
        writer.write_i64::<BigEndian>(self.reserved[1])?;
        writer.write_i32::<BigEndian>(self.skip_bytes as i32)?;
        io::copy(&mut io::repeat(0).take(self.skip_bytes as u64), writer)?;
        Ok(())
    }

    /// Read and validate a preamble, leaving the reader at the first entry.
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> BundleResult<Self> {
        let mut buf = [0u8; PREAMBLE_SIZE];
        let n = read_fully(reader, &mut buf)?;
        if n < PREAMBLE_SIZE {
            return Err(BundleError::invalid_index(format!(
                "truncated preamble: {} of {} bytes",
                n, PREAMBLE_SIZE
            )));
        }

        let magic = BigEndian::read_u32(&buf[0..4]);
        if magic != INDEX_MAGIC {
            return Err(BundleError::invalid_index(format!(
                "bad magic {:#010x}, expected {:#010x}",
                magic, INDEX_MAGIC
            )));
        }
        let reserved = [
            BigEndian::read_i64(&buf[4..12]),
            BigEndian::read_i64(&buf[12..20]),
        ];
        let skip = BigEndian::read_i32(&buf[20..24]);
        if skip < 0 {
            return Err(BundleError::invalid_index(format!(
                "negative skip byte count {}",
                skip
            )));
        }

        let skipped = io::copy(&mut (&mut *reader).take(skip as u64), &mut io::sink())?;
        if skipped < skip as u64 {
            return Err(BundleError::invalid_index("index ends inside skipped bytes"));
        }

        Ok(IndexPreamble {
            reserved,
            skip_bytes: skip as u32,
        })
    }
}

/// Read offset entries until EOF or until `max` entries have been read.
///
/// A trailing partial entry is ignored. Negative offsets are rejected.
pub fn read_offsets<R: Read + ?Sized>(reader: &mut R, max: Option<usize>) -> BundleResult<Vec<u64>> {
    let mut offsets = Vec::new();
    let mut buf = [0u8; INDEX_ENTRY_SIZE];
    while max.map_or(true, |m| offsets.len() < m) {
        let n = read_fully(reader, &mut buf)?;
        if n < INDEX_ENTRY_SIZE {
            if n > 0 {
                debug!(entries = offsets.len(), partial = n, "Ignoring partial index entry");
            }
            break;
        }
        let offset = BigEndian::read_i64(&buf);
        if offset < 0 {
            return Err(BundleError::invalid_index(format!(
                "negative offset {} at entry {}",
                offset,
                offsets.len()
            )));
        }
        offsets.push(offset as u64);
    }
    Ok(offsets)
}

/// Appends offset entries to an index file.
#[derive(Debug)]
pub struct IndexWriter<W: Write> {
    inner: W,
    entries: u64,
}

impl<W: Write> IndexWriter<W> {
    /// Write the preamble and return a writer positioned for the first entry.
    pub fn new(mut inner: W, preamble: &IndexPreamble) -> io::Result<Self> {
        preamble.write_to(&mut inner)?;
        Ok(IndexWriter { inner, entries: 0 })
    }

    /// Append one record end offset.
    pub fn append(&mut self, offset: u64) -> io::Result<()> {
        self.inner.write_i64::<BigEndian>(offset as i64)?;
        self.entries += 1;
        Ok(())
    }

    /// Number of entries appended by this writer.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Flush buffered entries.
    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    /// Underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}
