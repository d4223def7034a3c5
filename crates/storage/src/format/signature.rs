//! Record signature format
//!
//! Every record in a data file starts with a fixed 12-byte signature:
//!
//! ```text
//! ┌────────────────────┬────────────────────┬────────────────────┐
//! │ Header len (4, BE) │ Payload len (4,BE) │ Format code (4,BE) │
//! └────────────────────┴────────────────────┴────────────────────┘
//! ┌──────────────────────────┬──────────────────────────┐
//! │ Header bytes (variable)  │ Payload bytes (variable) │
//! └──────────────────────────┴──────────────────────────┘
//! ```
//!
//! Both lengths are signed 32-bit values and must be positive. The format
//! code must name a defined storage format.

use crate::error::{BundleError, BundleResult};
use biobundle_core::ImageFormat;
use byteorder::{BigEndian, ByteOrder};

/// Size of a record signature in bytes.
pub const SIGNATURE_SIZE: usize = 12;

/// Decoded record signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSignature {
    /// Length of the header bytes
    pub header_len: u32,
    /// Length of the payload bytes
    pub payload_len: u32,
    /// Storage format of the payload
    pub format: ImageFormat,
}

impl RecordSignature {
    /// Validate section lengths and format for a new record.
    pub fn for_sections(header: &[u8], payload: &[u8], format: ImageFormat) -> BundleResult<Self> {
        Ok(RecordSignature {
            header_len: section_len("header", header)?,
            payload_len: section_len("payload", payload)?,
            format: defined(format)?,
        })
    }

    /// Total bytes the record occupies in the data file.
    pub fn record_len(&self) -> u64 {
        SIGNATURE_SIZE as u64 + self.header_len as u64 + self.payload_len as u64
    }

    /// Serialize to the 12-byte wire form.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_SIZE] {
        encode_signature(
            self.header_len as i32,
            self.payload_len as i32,
            self.format.code(),
        )
    }
}

fn section_len(section: &'static str, bytes: &[u8]) -> BundleResult<u32> {
    if bytes.is_empty() {
        return Err(BundleError::EmptySection(section));
    }
    if bytes.len() > i32::MAX as usize {
        return Err(BundleError::RecordTooLarge {
            section,
            len: bytes.len(),
        });
    }
    Ok(bytes.len() as u32)
}

fn defined(format: ImageFormat) -> BundleResult<ImageFormat> {
    if format.is_defined() {
        Ok(format)
    } else {
        Err(BundleError::UnsupportedFormat(format))
    }
}

/// Signature validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// Header length is zero or negative
    #[error("non-positive header length {0}")]
    NonPositiveHeaderLength(i32),

    /// Payload length is zero or negative
    #[error("non-positive payload length {0}")]
    NonPositivePayloadLength(i32),

    /// Format code is not a known storage format
    #[error("unknown format code {0}")]
    UnknownFormatCode(i32),

    /// Format code is the undefined format
    #[error("undefined storage format")]
    UndefinedFormat,
}

/// Encode a signature from raw signed fields.
pub fn encode_signature(header_len: i32, payload_len: i32, format_code: i32) -> [u8; SIGNATURE_SIZE] {
    let mut buf = [0u8; SIGNATURE_SIZE];
    BigEndian::write_i32(&mut buf[0..4], header_len);
    BigEndian::write_i32(&mut buf[4..8], payload_len);
    BigEndian::write_i32(&mut buf[8..12], format_code);
    buf
}

/// Decode and validate a signature.
pub fn decode_signature(bytes: &[u8; SIGNATURE_SIZE]) -> Result<RecordSignature, SignatureError> {
    let header_len = BigEndian::read_i32(&bytes[0..4]);
    let payload_len = BigEndian::read_i32(&bytes[4..8]);
    let code = BigEndian::read_i32(&bytes[8..12]);

    if header_len <= 0 {
        return Err(SignatureError::NonPositiveHeaderLength(header_len));
    }
    if payload_len <= 0 {
        return Err(SignatureError::NonPositivePayloadLength(payload_len));
    }
    let format =
        ImageFormat::from_code(code).map_err(|_| SignatureError::UnknownFormatCode(code))?;
    if !format.is_defined() {
        return Err(SignatureError::UndefinedFormat);
    }

    Ok(RecordSignature {
        header_len: header_len as u32,
        payload_len: payload_len as u32,
        format,
    })
}

/// Frame one complete record: signature, header bytes, payload bytes.
pub fn frame_record(header: &[u8], payload: &[u8], format: ImageFormat) -> BundleResult<Vec<u8>> {
    let signature = RecordSignature::for_sections(header, payload, format)?;
    let mut out = Vec::with_capacity(signature.record_len() as usize);
    out.extend_from_slice(&signature.to_bytes());
    out.extend_from_slice(header);
    out.extend_from_slice(payload);
    Ok(out)
}
