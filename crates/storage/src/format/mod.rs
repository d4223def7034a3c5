//! On-disk byte formats for bundle files.
//!
//! This module centralizes the serialization of record signatures and the
//! index file. Keeping it separate from the writer and reader makes the
//! layout easy to audit in one place.
//!
//! # Module Structure
//!
//! - `signature`: 12-byte record signature framing each data file record
//! - `index`: Index file preamble and cumulative offset entries

pub mod index;
pub mod signature;

pub use index::{
    read_offsets, IndexPreamble, IndexWriter, INDEX_ENTRY_SIZE, INDEX_MAGIC, PREAMBLE_SIZE,
};
pub use signature::{
    decode_signature, encode_signature, frame_record, RecordSignature, SignatureError,
    SIGNATURE_SIZE,
};

use std::io::{self, Read};

/// Read until `buf` is full or EOF is reached, retrying on interrupts.
///
/// Returns the number of bytes read. A short count means EOF.
pub(crate) fn read_fully<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
