//! NIfTI codec
//!
//! Supports NIfTI-1 (348-byte header) and NIfTI-2 (540-byte header) in either
//! byte order. Version and byte order are detected from `sizeof_hdr`.
//!
//! Single-file volumes (`n+1` / `n+2` magic) carry their voxels after
//! `vox_offset`; the decoder checks that every voxel is present. Header-only
//! files (`ni1` / `ni2`) are accepted without voxel data.

use crate::error::{CodecError, CodecResult};
use crate::image::{expect_format, DomainImage, VolumeImage};
use crate::traits::{ImageDecoder, ImageEncoder};
use biobundle_core::{keys, ImageFormat, ImageHeader};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::io::Write;
use std::ops::Range;

/// NIfTI format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NiftiVersion {
    /// NIfTI-1, 16-bit dimensions
    Nifti1,
    /// NIfTI-2, 64-bit dimensions
    Nifti2,
}

impl NiftiVersion {
    /// Header size in bytes for this version.
    pub const fn header_size(self) -> usize {
        match self {
            NiftiVersion::Nifti1 => 348,
            NiftiVersion::Nifti2 => 540,
        }
    }
}

/// Byte order of the header and voxel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    /// Little endian
    Little,
    /// Big endian
    Big,
}

/// NIfTI-1 header field byte offsets.
mod offsets_v1 {
    pub const DIM: usize = 40;
    pub const DATATYPE: usize = 70;
    pub const BITPIX: usize = 72;
    pub const VOX_OFFSET: usize = 108;
    pub const MAGIC: usize = 344;
}

/// NIfTI-2 header field byte offsets.
mod offsets_v2 {
    pub const MAGIC: usize = 4;
    pub const DATATYPE: usize = 12;
    pub const BITPIX: usize = 14;
    pub const DIM: usize = 16;
    pub const VOX_OFFSET: usize = 168;
}

/// Header fields needed to locate and size the voxel data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NiftiGeometry {
    /// Header version
    pub version: NiftiVersion,
    /// Byte order
    pub byte_order: Endianness,
    /// `dim[0]` is the number of dimensions, `dim[1..=7]` the extents
    pub dim: [i64; 8],
    /// NIfTI datatype code
    pub datatype: i16,
    /// Bits per voxel
    pub bitpix: i16,
    /// Byte offset of voxel data in a single-file volume
    pub vox_offset: f64,
    /// True for `n+1` / `n+2`, false for header/image pairs
    pub single_file: bool,
}

impl NiftiGeometry {
    /// Parse geometry with automatic version and byte order detection.
    pub fn parse(bytes: &[u8]) -> CodecResult<Self> {
        if bytes.len() < 4 {
            return Err(err("header too short to detect version"));
        }

        let sizeof_hdr_le = LittleEndian::read_i32(&bytes[0..4]);
        let sizeof_hdr_be = BigEndian::read_i32(&bytes[0..4]);
        let (version, byte_order) = if sizeof_hdr_le == 348 {
            (NiftiVersion::Nifti1, Endianness::Little)
        } else if sizeof_hdr_be == 348 {
            (NiftiVersion::Nifti1, Endianness::Big)
        } else if sizeof_hdr_le == 540 {
            (NiftiVersion::Nifti2, Endianness::Little)
        } else if sizeof_hdr_be == 540 {
            (NiftiVersion::Nifti2, Endianness::Big)
        } else {
            return Err(err(format!(
                "sizeof_hdr is neither 348 nor 540 (le={}, be={})",
                sizeof_hdr_le, sizeof_hdr_be
            )));
        };

        if bytes.len() < version.header_size() {
            return Err(err(format!(
                "header too short: got {} bytes, need {} for {:?}",
                bytes.len(),
                version.header_size(),
                version
            )));
        }

        let geometry = match (version, byte_order) {
            (NiftiVersion::Nifti1, Endianness::Little) => Self::parse_v1::<LittleEndian>(bytes)?,
            (NiftiVersion::Nifti1, Endianness::Big) => Self::parse_v1::<BigEndian>(bytes)?,
            (NiftiVersion::Nifti2, Endianness::Little) => Self::parse_v2::<LittleEndian>(bytes)?,
            (NiftiVersion::Nifti2, Endianness::Big) => Self::parse_v2::<BigEndian>(bytes)?,
        };
        NiftiGeometry {
            byte_order,
            ..geometry
        }
        .validated()
    }

    fn parse_v1<E: ByteOrder>(bytes: &[u8]) -> CodecResult<Self> {
        use offsets_v1::*;

        let magic = &bytes[MAGIC..MAGIC + 4];
        let single_file = match magic {
            b"n+1\0" => true,
            b"ni1\0" => false,
            _ => return Err(err(format!("invalid NIfTI-1 magic {:?}", magic))),
        };

        let mut dim = [0i64; 8];
        for (i, d) in dim.iter_mut().enumerate() {
            let at = DIM + i * 2;
            *d = E::read_i16(&bytes[at..at + 2]) as i64;
        }

        Ok(NiftiGeometry {
            version: NiftiVersion::Nifti1,
            byte_order: Endianness::Little,
            dim,
            datatype: E::read_i16(&bytes[DATATYPE..DATATYPE + 2]),
            bitpix: E::read_i16(&bytes[BITPIX..BITPIX + 2]),
            vox_offset: E::read_f32(&bytes[VOX_OFFSET..VOX_OFFSET + 4]) as f64,
            single_file,
        })
    }

    fn parse_v2<E: ByteOrder>(bytes: &[u8]) -> CodecResult<Self> {
        use offsets_v2::*;

        let magic = &bytes[MAGIC..MAGIC + 8];
        let single_file = match magic {
            b"n+2\0\r\n\x1a\n" => true,
            b"ni2\0\r\n\x1a\n" => false,
            _ => return Err(err(format!("invalid NIfTI-2 magic {:?}", &magic[..4]))),
        };

        let mut dim = [0i64; 8];
        for (i, d) in dim.iter_mut().enumerate() {
            let at = DIM + i * 8;
            *d = E::read_i64(&bytes[at..at + 8]);
        }

        Ok(NiftiGeometry {
            version: NiftiVersion::Nifti2,
            byte_order: Endianness::Little,
            dim,
            datatype: E::read_i16(&bytes[DATATYPE..DATATYPE + 2]),
            bitpix: E::read_i16(&bytes[BITPIX..BITPIX + 2]),
            vox_offset: E::read_i64(&bytes[VOX_OFFSET..VOX_OFFSET + 8]) as f64,
            single_file,
        })
    }

    fn validated(self) -> CodecResult<Self> {
        let ndim = self.dim[0];
        if !(1..=7).contains(&ndim) {
            return Err(err(format!("ndim must be 1..=7, got {}", ndim)));
        }
        if let Some((i, d)) = self.dim[1..=ndim as usize]
            .iter()
            .enumerate()
            .find(|(_, d)| **d < 0)
        {
            return Err(err(format!("dimension {} has negative value {}", i + 1, d)));
        }
        if self.bitpix <= 0 {
            return Err(err(format!("invalid bitpix {}", self.bitpix)));
        }
        if self.single_file && (self.vox_offset < self.version.header_size() as f64) {
            return Err(err(format!(
                "vox_offset {} points inside the header",
                self.vox_offset
            )));
        }
        Ok(self)
    }

    /// Extent of axis `i` (1-based). Axes beyond `dim[0]` and stored extents
    /// of zero are reported as 1.
    pub fn axis_len(&self, i: usize) -> i64 {
        if i == 0 || i > 7 || i as i64 > self.dim[0] {
            return 1;
        }
        self.dim[i].max(1)
    }

    /// Number of voxels across all dimensions.
    pub fn voxel_count(&self) -> u64 {
        (1..=self.dim[0] as usize)
            .map(|i| self.axis_len(i) as u64)
            .fold(1u64, |acc, n| acc.saturating_mul(n))
    }

    /// Size of the voxel data in bytes.
    pub fn voxel_data_len(&self) -> u64 {
        self.voxel_count()
            .saturating_mul(self.bitpix as u64)
            .saturating_add(7)
            / 8
    }

    /// Byte range of the voxel data in a single-file volume.
    pub fn voxel_range(&self) -> Option<Range<usize>> {
        if !self.single_file {
            return None;
        }
        let start = self.vox_offset as usize;
        Some(start..start.saturating_add(self.voxel_data_len() as usize))
    }
}

fn err(detail: impl Into<String>) -> CodecError {
    CodecError::decode(ImageFormat::Nifti, detail)
}

/// Stateless NIfTI codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct NiftiCodec;

impl NiftiCodec {
    fn read_geometry(bytes: &[u8]) -> CodecResult<NiftiGeometry> {
        let geometry = NiftiGeometry::parse(bytes)?;
        if let Some(range) = geometry.voxel_range() {
            if range.end > bytes.len() {
                return Err(err(format!(
                    "volume needs {} bytes of voxel data at offset {}, only {} present",
                    geometry.voxel_data_len(),
                    range.start,
                    bytes.len().saturating_sub(range.start)
                )));
            }
        }
        Ok(geometry)
    }
}

impl ImageDecoder for NiftiCodec {
    fn format(&self) -> ImageFormat {
        ImageFormat::Nifti
    }

    fn decode_header(&self, bytes: &[u8]) -> CodecResult<ImageHeader> {
        let geometry = Self::read_geometry(bytes)?;
        let mut header = ImageHeader::new(ImageFormat::Nifti);
        header.insert(keys::X_AXIS, geometry.axis_len(1).to_string());
        header.insert(keys::Y_AXIS, geometry.axis_len(2).to_string());
        header.insert(keys::Z_AXIS, geometry.axis_len(3).to_string());
        header.insert(keys::T_AXIS, geometry.axis_len(4).to_string());
        Ok(header)
    }

    fn decode_image(&self, bytes: &[u8], header: ImageHeader) -> CodecResult<DomainImage> {
        expect_format(ImageFormat::Nifti, header.storage_format())?;
        let geometry = Self::read_geometry(bytes)?;
        Ok(DomainImage::Nifti(VolumeImage::new(
            header,
            bytes.to_vec(),
            geometry,
        )))
    }
}

impl ImageEncoder for NiftiCodec {
    fn format(&self) -> ImageFormat {
        ImageFormat::Nifti
    }

    fn encode_image_to(&self, image: &DomainImage, out: &mut dyn Write) -> CodecResult<()> {
        expect_format(ImageFormat::Nifti, image.format())?;
        out.write_all(image.encoded())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{nifti1_bytes, nifti_bytes};

    #[test]
    fn test_nifti1_header() {
        let header = NiftiCodec.decode_header(&nifti1_bytes([4, 3, 2, 5])).unwrap();
        assert_eq!(header.get(keys::X_AXIS), Some("4"));
        assert_eq!(header.get(keys::Y_AXIS), Some("3"));
        assert_eq!(header.get(keys::Z_AXIS), Some("2"));
        assert_eq!(header.get(keys::T_AXIS), Some("5"));
    }

    #[test]
    fn test_zero_t_reported_as_one() {
        let image = NiftiCodec
            .decode_header_and_image(&nifti1_bytes([4, 3, 2, 0]))
            .unwrap();
        let volume = image.as_volume().unwrap();
        assert_eq!(volume.t_len(), 1);
        assert_eq!(volume.voxel_count(), 24);
        assert_eq!(volume.voxel_bytes().map(|v| v.len()), Some(24));
        assert_eq!(image.header().get(keys::T_AXIS), Some("1"));
    }

    #[test]
    fn test_nifti2_both_byte_orders() {
        for byte_order in [Endianness::Little, Endianness::Big] {
            let bytes = nifti_bytes(NiftiVersion::Nifti2, byte_order, [5, 6, 7, 1]);
            let image = NiftiCodec.decode_header_and_image(&bytes).unwrap();
            let volume = image.as_volume().unwrap();
            assert_eq!(volume.geometry().version, NiftiVersion::Nifti2);
            assert_eq!(volume.geometry().byte_order, byte_order);
            assert_eq!((volume.x_len(), volume.y_len(), volume.z_len()), (5, 6, 7));
        }
    }

    #[test]
    fn test_nifti1_big_endian() {
        let bytes = nifti_bytes(NiftiVersion::Nifti1, Endianness::Big, [2, 2, 2, 2]);
        let geometry = NiftiGeometry::parse(&bytes).unwrap();
        assert_eq!(geometry.byte_order, Endianness::Big);
        assert_eq!(geometry.voxel_count(), 16);
    }

    #[test]
    fn test_missing_voxels_rejected() {
        let bytes = nifti1_bytes([4, 4, 4, 1]);
        let err = NiftiCodec.decode_header(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(err.to_string().contains("voxel data"));
    }

    #[test]
    fn test_bad_sizeof_hdr() {
        let mut bytes = nifti1_bytes([1, 1, 1, 1]);
        bytes[0] = 0;
        assert!(NiftiCodec.decode_header(&bytes).is_err());
        assert!(NiftiCodec.decode_header(&[0, 1]).is_err());
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = nifti1_bytes([1, 1, 1, 1]);
        bytes[344] = b'x';
        assert!(NiftiCodec.decode_header(&bytes).is_err());
    }

    #[test]
    fn test_encode_roundtrip() {
        let bytes = nifti1_bytes([3, 3, 3, 1]);
        let image = NiftiCodec.decode_header_and_image(&bytes).unwrap();
        assert_eq!(NiftiCodec.encode_image(&image).unwrap(), bytes);
    }
}
