//! Generic image header
//!
//! An [`ImageHeader`] is the storage format of a record plus a flat
//! string-to-string metadata map. Codecs fill the map with whatever they can
//! read cheaply from the encoded bytes (dimensions, color space, patient
//! identifiers) so consumers can filter records without decoding payloads.
//!
//! # Header Bytes
//!
//! ```text
//! ┌──────────────────────┬──────────────────────┬──────────────────────────┐
//! │ Format code (i32 BE) │ JSON length (i32 BE) │ JSON object (UTF-8)      │
//! └──────────────────────┴──────────────────────┴──────────────────────────┘
//! ```
//!
//! The metadata is kept in a `BTreeMap`, so the same header always
//! serializes to the same bytes.

use crate::error::{Error, Result};
use crate::format::{ColorSpace, ImageFormat};
use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{Cursor, Read};
use std::str::FromStr;

/// Well-known metadata keys.
///
/// Producers and consumers must tolerate keys outside this list.
pub mod keys {
    /// Where the image came from (file name, URL)
    pub const SOURCE: &str = "source";
    /// Color space name, see [`crate::ColorSpace`]
    pub const COLOR_SPACE: &str = "color space";
    /// Raster width in pixels
    pub const WIDTH: &str = "width";
    /// Raster height in pixels
    pub const HEIGHT: &str = "height";
    /// Number of raster bands
    pub const NUMBER_BANDS: &str = "number bands";
    /// Volume extent along x
    pub const X_AXIS: &str = "x-axis";
    /// Volume extent along y
    pub const Y_AXIS: &str = "y-axis";
    /// Volume extent along z
    pub const Z_AXIS: &str = "z-axis";
    /// Volume extent along t
    pub const T_AXIS: &str = "t-axis";
    /// DICOM (0010,0020)
    pub const PATIENT_ID: &str = "patient id";
    /// DICOM (0010,0010)
    pub const PATIENT_NAME: &str = "patient name";
    /// DICOM (0028,0010)
    pub const ROWS: &str = "rows";
    /// DICOM (0028,0011)
    pub const COLUMNS: &str = "columns";
}

/// Size of the fixed prefix of serialized header bytes.
pub const HEADER_PREFIX_SIZE: usize = 8;

/// Storage format plus free-form metadata for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHeader {
    storage_format: ImageFormat,
    metadata: BTreeMap<String, String>,
}

impl ImageHeader {
    /// Create a header with an empty metadata map.
    pub fn new(storage_format: ImageFormat) -> Self {
        ImageHeader {
            storage_format,
            metadata: BTreeMap::new(),
        }
    }

    /// Create a header with the given metadata.
    pub fn with_metadata<K, V, I>(storage_format: ImageFormat, metadata: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        ImageHeader {
            storage_format,
            metadata: metadata
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Storage format of the payload this header describes.
    pub fn storage_format(&self) -> ImageFormat {
        self.storage_format
    }

    /// Look up a metadata value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Look up and parse a metadata value. Surrounding whitespace is ignored.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    /// Color space from the `color space` key, `Undefined` when absent or unknown.
    pub fn color_space(&self) -> ColorSpace {
        self.get(keys::COLOR_SPACE)
            .and_then(|v| v.parse().ok())
            .unwrap_or(ColorSpace::Undefined)
    }

    /// Insert a single entry, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.metadata.insert(key.into(), value.into())
    }

    /// Remove a single entry.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.metadata.remove(key)
    }

    /// Merge entries into the map. Incoming values win on conflict.
    pub fn append_metadata<K, V, I>(&mut self, entries: I)
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (k, v) in entries {
            self.metadata.insert(k.into(), v.into());
        }
    }

    /// Replace the whole metadata map.
    pub fn set_metadata(&mut self, metadata: BTreeMap<String, String>) {
        self.metadata = metadata;
    }

    /// Copy of the metadata map.
    ///
    /// Callers get their own map; mutating it never affects this header.
    pub fn metadata(&self) -> BTreeMap<String, String> {
        self.metadata.clone()
    }

    /// Iterate entries in key order without copying.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.metadata.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of metadata entries.
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    /// True when there is no metadata.
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// Metadata as a compact JSON object.
    pub fn metadata_json(&self) -> String {
        let object: Map<String, Value> = self
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Value::Object(object).to_string()
    }

    /// Serialize to header bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let json = self.metadata_json();
        let mut buf = vec![0u8; HEADER_PREFIX_SIZE + json.len()];
        BigEndian::write_i32(&mut buf[0..4], self.storage_format.code());
        BigEndian::write_i32(&mut buf[4..8], json.len() as i32);
        buf[HEADER_PREFIX_SIZE..].copy_from_slice(json.as_bytes());
        buf
    }

    /// Deserialize from header bytes.
    ///
    /// A JSON length of zero yields an empty map. Bytes after the JSON object
    /// are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_PREFIX_SIZE {
            return Err(Error::invalid_header(format!(
                "header is {} bytes, need at least {}",
                bytes.len(),
                HEADER_PREFIX_SIZE
            )));
        }

        let mut cursor = Cursor::new(bytes);
        let code = cursor.read_i32::<BigEndian>()?;
        let json_len = cursor.read_i32::<BigEndian>()?;

        let storage_format = ImageFormat::from_code(code)?;

        if json_len < 0 {
            return Err(Error::invalid_header(format!(
                "negative metadata length {}",
                json_len
            )));
        }
        let json_len = json_len as usize;
        if json_len == 0 {
            return Ok(ImageHeader::new(storage_format));
        }

        let available = bytes.len() - HEADER_PREFIX_SIZE;
        if json_len > available {
            return Err(Error::invalid_header(format!(
                "metadata length {} exceeds remaining {} bytes",
                json_len, available
            )));
        }

        let mut json = vec![0u8; json_len];
        cursor.read_exact(&mut json)?;
        let metadata: BTreeMap<String, String> = serde_json::from_slice(&json)?;

        Ok(ImageHeader {
            storage_format,
            metadata,
        })
    }

    fn write_remaining(&self, f: &mut fmt::Formatter<'_>, shown: &[&str]) -> fmt::Result {
        for (k, v) in self.iter().filter(|(k, _)| !shown.contains(k)) {
            write!(f, "\n  {}: {}", k, v)?;
        }
        Ok(())
    }
}

impl fmt::Display for ImageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = |key: &str| self.get(key).unwrap_or("?").to_string();
        match self.storage_format {
            ImageFormat::Jpeg | ImageFormat::Png => {
                write!(
                    f,
                    "({} {}) {} x {} x {}",
                    self.storage_format,
                    self.color_space(),
                    value(keys::WIDTH),
                    value(keys::HEIGHT),
                    value(keys::NUMBER_BANDS)
                )?;
                self.write_remaining(
                    f,
                    &[keys::COLOR_SPACE, keys::WIDTH, keys::HEIGHT, keys::NUMBER_BANDS],
                )
            }
            ImageFormat::Nifti => {
                write!(
                    f,
                    "({}) {} x {} x {} x {}",
                    self.storage_format,
                    value(keys::X_AXIS),
                    value(keys::Y_AXIS),
                    value(keys::Z_AXIS),
                    value(keys::T_AXIS)
                )?;
                self.write_remaining(f, &[keys::X_AXIS, keys::Y_AXIS, keys::Z_AXIS, keys::T_AXIS])
            }
            ImageFormat::Dicom => {
                write!(
                    f,
                    "({}) patient {} ({}) {} rows x {} columns",
                    self.storage_format,
                    value(keys::PATIENT_ID),
                    value(keys::PATIENT_NAME),
                    value(keys::ROWS),
                    value(keys::COLUMNS)
                )?;
                self.write_remaining(
                    f,
                    &[keys::PATIENT_ID, keys::PATIENT_NAME, keys::ROWS, keys::COLUMNS],
                )
            }
            ImageFormat::Undefined => {
                write!(f, "({})", self.storage_format)?;
                self.write_remaining(f, &[])
            }
        }
    }
}

impl PartialOrd for ImageHeader {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Headers order by storage format code; metadata only breaks ties.
impl Ord for ImageHeader {
    fn cmp(&self, other: &Self) -> Ordering {
        self.storage_format
            .code()
            .cmp(&other.storage_format.code())
            .then_with(|| self.metadata.cmp(&other.metadata))
    }
}
