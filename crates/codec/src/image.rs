//! Typed images produced by codecs
//!
//! [`DomainImage`] is keyed by storage format: decoding a JPEG payload always
//! yields `DomainImage::Jpeg`, a NIfTI payload `DomainImage::Nifti`, and so on.
//! Every variant keeps the encoded bytes it was decoded from, so an image can
//! be written back to a bundle unchanged.
//!
//! # Portable Bytes
//!
//! ```text
//! ┌───────────────────┬──────────────┬────────────────────┬──────────────────┬──────────────┐
//! │ Header len (i32)  │ Header bytes │ Format code (i32)  │ Payload len (i32)│ Payload      │
//! └───────────────────┴──────────────┴────────────────────┴──────────────────┴──────────────┘
//! ```
//!
//! All integers are big-endian.

use crate::dicom::DicomTag;
use crate::error::{CodecError, CodecResult};
use crate::nifti::NiftiGeometry;
use crate::registry::CodecRegistry;
use biobundle_core::{keys, ColorSpace, ImageFormat, ImageHeader};
use byteorder::{BigEndian, ByteOrder};
use std::collections::BTreeMap;

/// 2D raster image (JPEG or PNG).
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    header: ImageHeader,
    encoded: Vec<u8>,
}

impl RasterImage {
    /// Wrap a header and its encoded bytes.
    pub fn new(header: ImageHeader, encoded: Vec<u8>) -> Self {
        RasterImage { header, encoded }
    }

    /// Width in pixels from metadata.
    pub fn width(&self) -> Option<u32> {
        self.header.get_parsed(keys::WIDTH)
    }

    /// Height in pixels from metadata.
    pub fn height(&self) -> Option<u32> {
        self.header.get_parsed(keys::HEIGHT)
    }

    /// Number of bands from metadata.
    pub fn bands(&self) -> Option<u32> {
        self.header.get_parsed(keys::NUMBER_BANDS)
    }

    /// Color space from metadata.
    pub fn color_space(&self) -> ColorSpace {
        self.header.color_space()
    }

    pub(crate) fn require_dims(&self, format: ImageFormat) -> CodecResult<(u32, u32)> {
        match (self.width(), self.height()) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Ok((w, h)),
            (w, h) => Err(CodecError::encode(
                format,
                format!("dimensions must be positive, got {:?} x {:?}", w, h),
            )),
        }
    }
}

/// Fail when the header carries dimensions that disagree with the ones
/// found in the encoded stream. Missing header dimensions are accepted.
pub(crate) fn check_raster_dims(header: &ImageHeader, width: u32, height: u32) -> CodecResult<()> {
    let format = header.storage_format();
    for (key, actual) in [(keys::WIDTH, width), (keys::HEIGHT, height)] {
        if let Some(expected) = header.get_parsed::<u32>(key) {
            if expected != actual {
                return Err(CodecError::decode(
                    format,
                    format!("header {} is {} but stream has {}", key, expected, actual),
                ));
            }
        }
    }
    Ok(())
}

pub(crate) fn expect_format(expected: ImageFormat, actual: ImageFormat) -> CodecResult<()> {
    if expected != actual {
        return Err(CodecError::FormatMismatch { expected, actual });
    }
    Ok(())
}

/// NIfTI volume.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeImage {
    header: ImageHeader,
    encoded: Vec<u8>,
    geometry: NiftiGeometry,
}

impl VolumeImage {
    /// Wrap a header, the encoded volume and its parsed geometry.
    pub fn new(header: ImageHeader, encoded: Vec<u8>, geometry: NiftiGeometry) -> Self {
        VolumeImage {
            header,
            encoded,
            geometry,
        }
    }

    /// Parsed NIfTI header fields.
    pub fn geometry(&self) -> &NiftiGeometry {
        &self.geometry
    }

    /// Extent along x.
    pub fn x_len(&self) -> i64 {
        self.geometry.axis_len(1)
    }

    /// Extent along y.
    pub fn y_len(&self) -> i64 {
        self.geometry.axis_len(2)
    }

    /// Extent along z.
    pub fn z_len(&self) -> i64 {
        self.geometry.axis_len(3)
    }

    /// Extent along t. A stored length of 0 is reported as 1.
    pub fn t_len(&self) -> i64 {
        self.geometry.axis_len(4)
    }

    /// Number of voxels across all dimensions.
    pub fn voxel_count(&self) -> u64 {
        self.geometry.voxel_count()
    }

    /// Raw voxel data of a single-file volume, `None` for header/image pairs.
    pub fn voxel_bytes(&self) -> Option<&[u8]> {
        let range = self.geometry.voxel_range()?;
        self.encoded.get(range)
    }
}

/// DICOM dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ClinicalImage {
    header: ImageHeader,
    encoded: Vec<u8>,
    transfer_syntax: String,
    attributes: BTreeMap<DicomTag, String>,
}

impl ClinicalImage {
    /// Wrap a header, the encoded dataset and the attributes parsed from it.
    pub fn new(
        header: ImageHeader,
        encoded: Vec<u8>,
        transfer_syntax: impl Into<String>,
        attributes: BTreeMap<DicomTag, String>,
    ) -> Self {
        ClinicalImage {
            header,
            encoded,
            transfer_syntax: transfer_syntax.into(),
            attributes,
        }
    }

    /// Transfer syntax UID of the dataset.
    pub fn transfer_syntax(&self) -> &str {
        &self.transfer_syntax
    }

    /// Textual value of an attribute.
    pub fn attribute(&self, tag: DicomTag) -> Option<&str> {
        self.attributes.get(&tag).map(String::as_str)
    }

    /// All textual attributes in tag order.
    pub fn attributes(&self) -> &BTreeMap<DicomTag, String> {
        &self.attributes
    }

    /// Patient ID (0010,0020).
    pub fn patient_id(&self) -> Option<&str> {
        self.attribute(DicomTag::PATIENT_ID)
    }

    /// Patient's name (0010,0010).
    pub fn patient_name(&self) -> Option<&str> {
        self.attribute(DicomTag::PATIENT_NAME)
    }

    /// Rows (0028,0010).
    pub fn rows(&self) -> Option<u32> {
        self.attribute(DicomTag::ROWS)?.trim().parse().ok()
    }

    /// Columns (0028,0011).
    pub fn columns(&self) -> Option<u32> {
        self.attribute(DicomTag::COLUMNS)?.trim().parse().ok()
    }
}

/// A decoded image, tagged by storage format.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainImage {
    /// JPEG raster
    Jpeg(RasterImage),
    /// PNG raster
    Png(RasterImage),
    /// NIfTI volume
    Nifti(VolumeImage),
    /// DICOM dataset
    Dicom(ClinicalImage),
}

impl DomainImage {
    /// Storage format of this image.
    pub fn format(&self) -> ImageFormat {
        match self {
            DomainImage::Jpeg(_) => ImageFormat::Jpeg,
            DomainImage::Png(_) => ImageFormat::Png,
            DomainImage::Nifti(_) => ImageFormat::Nifti,
            DomainImage::Dicom(_) => ImageFormat::Dicom,
        }
    }

    /// Header the image was decoded with.
    pub fn header(&self) -> &ImageHeader {
        match self {
            DomainImage::Jpeg(r) | DomainImage::Png(r) => &r.header,
            DomainImage::Nifti(v) => &v.header,
            DomainImage::Dicom(c) => &c.header,
        }
    }

    /// Encoded bytes the image was decoded from.
    pub fn encoded(&self) -> &[u8] {
        match self {
            DomainImage::Jpeg(r) | DomainImage::Png(r) => &r.encoded,
            DomainImage::Nifti(v) => &v.encoded,
            DomainImage::Dicom(c) => &c.encoded,
        }
    }

    /// Split into header and encoded bytes.
    pub fn into_parts(self) -> (ImageHeader, Vec<u8>) {
        match self {
            DomainImage::Jpeg(r) | DomainImage::Png(r) => (r.header, r.encoded),
            DomainImage::Nifti(v) => (v.header, v.encoded),
            DomainImage::Dicom(c) => (c.header, c.encoded),
        }
    }

    /// Raster view for JPEG and PNG images.
    pub fn as_raster(&self) -> Option<&RasterImage> {
        match self {
            DomainImage::Jpeg(r) | DomainImage::Png(r) => Some(r),
            _ => None,
        }
    }

    /// Volume view for NIfTI images.
    pub fn as_volume(&self) -> Option<&VolumeImage> {
        match self {
            DomainImage::Nifti(v) => Some(v),
            _ => None,
        }
    }

    /// Clinical view for DICOM images.
    pub fn as_clinical(&self) -> Option<&ClinicalImage> {
        match self {
            DomainImage::Dicom(c) => Some(c),
            _ => None,
        }
    }

    /// Serialize to portable bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = self.header().to_bytes();
        let payload = self.encoded();
        let mut buf = vec![0u8; 12 + header.len() + payload.len()];

        BigEndian::write_i32(&mut buf[0..4], header.len() as i32);
        let mut pos = 4;
        buf[pos..pos + header.len()].copy_from_slice(&header);
        pos += header.len();
        BigEndian::write_i32(&mut buf[pos..pos + 4], self.format().code());
        BigEndian::write_i32(&mut buf[pos + 4..pos + 8], payload.len() as i32);
        pos += 8;
        buf[pos..].copy_from_slice(payload);
        buf
    }

    /// Rebuild an image from portable bytes, decoding the payload with the
    /// registry's codec for the tagged format.
    pub fn from_bytes(bytes: &[u8], registry: &CodecRegistry) -> CodecResult<Self> {
        let header_len = read_len(bytes, 0, "header length")?;
        let header_end = 4 + header_len;
        let header_bytes = bytes
            .get(4..header_end)
            .ok_or_else(|| CodecError::invalid_image("truncated header bytes"))?;
        let header = ImageHeader::from_bytes(header_bytes)?;

        let tag = bytes
            .get(header_end..header_end + 4)
            .ok_or_else(|| CodecError::invalid_image("missing format tag"))?;
        let format = ImageFormat::from_code(BigEndian::read_i32(tag))?;
        if format != header.storage_format() {
            return Err(CodecError::FormatMismatch {
                expected: header.storage_format(),
                actual: format,
            });
        }

        let payload_len = read_len(bytes, header_end + 4, "payload length")?;
        let payload_start = header_end + 8;
        let payload = bytes
            .get(payload_start..payload_start + payload_len)
            .ok_or_else(|| CodecError::invalid_image("truncated payload bytes"))?;

        registry.decode_image(payload, header)
    }
}

fn read_len(bytes: &[u8], at: usize, what: &str) -> CodecResult<usize> {
    let raw = bytes
        .get(at..at + 4)
        .ok_or_else(|| CodecError::invalid_image(format!("missing {}", what)))?;
    let len = BigEndian::read_i32(raw);
    if len < 0 {
        return Err(CodecError::invalid_image(format!("negative {} {}", what, len)));
    }
    Ok(len as usize)
}
