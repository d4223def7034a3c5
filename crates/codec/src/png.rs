//! PNG codec
//!
//! Reads the signature and the IHDR chunk (with its CRC) and nothing else.
//! Only 8-bit samples are accepted.

use crate::error::{CodecError, CodecResult};
use crate::image::{check_raster_dims, expect_format, DomainImage, RasterImage};
use crate::traits::{ImageDecoder, ImageEncoder};
use biobundle_core::{keys, ColorSpace, ImageFormat, ImageHeader};
use byteorder::{BigEndian, ByteOrder};
use std::io::Write;

/// PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Signature, IHDR length and type, 13 data bytes, CRC.
const IHDR_END: usize = 8 + 8 + 13 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ihdr {
    width: u32,
    height: u32,
    bit_depth: u8,
    color_type: u8,
}

/// Stateless PNG codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngCodec;

impl PngCodec {
    fn err(detail: impl Into<String>) -> CodecError {
        CodecError::decode(ImageFormat::Png, detail)
    }

    fn read_ihdr(bytes: &[u8]) -> CodecResult<Ihdr> {
        if bytes.len() < PNG_SIGNATURE.len() || bytes[..8] != PNG_SIGNATURE {
            return Err(Self::err("missing PNG signature"));
        }
        if bytes.len() < IHDR_END {
            return Err(Self::err("truncated IHDR chunk"));
        }
        let chunk_len = BigEndian::read_u32(&bytes[8..12]);
        if &bytes[12..16] != b"IHDR" || chunk_len != 13 {
            return Err(Self::err("first chunk is not a 13-byte IHDR"));
        }

        let stored_crc = BigEndian::read_u32(&bytes[29..33]);
        let computed_crc = crc32fast::hash(&bytes[12..29]);
        if stored_crc != computed_crc {
            return Err(Self::err(format!(
                "IHDR CRC mismatch: stored {:08x}, computed {:08x}",
                stored_crc, computed_crc
            )));
        }

        Ok(Ihdr {
            width: BigEndian::read_u32(&bytes[16..20]),
            height: BigEndian::read_u32(&bytes[20..24]),
            bit_depth: bytes[24],
            color_type: bytes[25],
        })
    }

    /// Bands and color space after expansion to 8-bit samples.
    fn layout(color_type: u8) -> Option<(u32, ColorSpace)> {
        match color_type {
            0 => Some((1, ColorSpace::Lum)),
            2 => Some((3, ColorSpace::Rgb)),
            3 => Some((3, ColorSpace::Rgb)),
            4 => Some((2, ColorSpace::Lum)),
            6 => Some((4, ColorSpace::Rgb)),
            _ => None,
        }
    }
}

impl ImageDecoder for PngCodec {
    fn format(&self) -> ImageFormat {
        ImageFormat::Png
    }

    fn decode_header(&self, bytes: &[u8]) -> CodecResult<ImageHeader> {
        let ihdr = Self::read_ihdr(bytes)?;
        if ihdr.bit_depth != 8 {
            return Err(Self::err(format!(
                "unsupported bit depth {}",
                ihdr.bit_depth
            )));
        }
        if ihdr.width == 0 || ihdr.height == 0 {
            return Err(Self::err(format!(
                "empty image {} x {}",
                ihdr.width, ihdr.height
            )));
        }
        let (bands, color_space) = Self::layout(ihdr.color_type)
            .ok_or_else(|| Self::err(format!("unknown color type {}", ihdr.color_type)))?;

        let mut header = ImageHeader::new(ImageFormat::Png);
        header.insert(keys::COLOR_SPACE, color_space.name());
        header.insert(keys::WIDTH, ihdr.width.to_string());
        header.insert(keys::HEIGHT, ihdr.height.to_string());
        header.insert(keys::NUMBER_BANDS, bands.to_string());
        Ok(header)
    }

    fn decode_image(&self, bytes: &[u8], header: ImageHeader) -> CodecResult<DomainImage> {
        expect_format(ImageFormat::Png, header.storage_format())?;
        let ihdr = Self::read_ihdr(bytes)?;
        check_raster_dims(&header, ihdr.width, ihdr.height)?;
        Ok(DomainImage::Png(RasterImage::new(header, bytes.to_vec())))
    }
}

impl ImageEncoder for PngCodec {
    fn format(&self) -> ImageFormat {
        ImageFormat::Png
    }

    fn encode_image_to(&self, image: &DomainImage, out: &mut dyn Write) -> CodecResult<()> {
        let raster = match image {
            DomainImage::Png(r) => r,
            other => {
                return Err(CodecError::FormatMismatch {
                    expected: ImageFormat::Png,
                    actual: other.format(),
                })
            }
        };
        raster.require_dims(ImageFormat::Png)?;
        match raster.bands() {
            Some(1..=4) => {}
            other => {
                return Err(CodecError::encode(
                    ImageFormat::Png,
                    format!("expected 1 to 4 bands, got {:?}", other),
                ))
            }
        }
        out.write_all(image.encoded())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::png_bytes;

    #[test]
    fn test_decode_header_color_types() {
        let cases = [
            (0u8, "1", "LUM"),
            (2, "3", "RGB"),
            (3, "3", "RGB"),
            (4, "2", "LUM"),
            (6, "4", "RGB"),
        ];
        for (color_type, bands, space) in cases {
            let header = PngCodec.decode_header(&png_bytes(7, 5, color_type)).unwrap();
            assert_eq!(header.get(keys::NUMBER_BANDS), Some(bands), "type {}", color_type);
            assert_eq!(header.get(keys::COLOR_SPACE), Some(space));
            assert_eq!(header.get(keys::WIDTH), Some("7"));
            assert_eq!(header.get(keys::HEIGHT), Some("5"));
        }
    }

    #[test]
    fn test_rejects_unknown_color_type() {
        assert!(PngCodec.decode_header(&png_bytes(2, 2, 5)).is_err());
    }

    #[test]
    fn test_rejects_sixteen_bit() {
        let mut bytes = png_bytes(2, 2, 2);
        bytes[24] = 16;
        let crc = crc32fast::hash(&bytes[12..29]);
        BigEndian::write_u32(&mut bytes[29..33], crc);
        let err = PngCodec.decode_header(&bytes).unwrap_err();
        assert!(err.to_string().contains("bit depth"));
    }

    #[test]
    fn test_rejects_bad_crc() {
        let mut bytes = png_bytes(2, 2, 2);
        bytes[17] ^= 0x01;
        let err = PngCodec.decode_header(&bytes).unwrap_err();
        assert!(err.to_string().contains("CRC"));
    }

    #[test]
    fn test_rejects_missing_signature() {
        let mut bytes = png_bytes(2, 2, 2);
        bytes[1] = b'X';
        assert!(PngCodec.decode_header(&bytes).is_err());
        assert!(PngCodec.decode_header(&bytes[..4]).is_err());
    }

    #[test]
    fn test_decode_image_checks_dimensions() {
        let header = ImageHeader::with_metadata(ImageFormat::Png, [(keys::HEIGHT, "3")]);
        assert!(PngCodec.decode_image(&png_bytes(2, 2, 0), header).is_err());
    }

    #[test]
    fn test_encode_roundtrip() {
        let bytes = png_bytes(3, 3, 6);
        let image = PngCodec.decode_header_and_image(&bytes).unwrap();
        assert_eq!(PngCodec.encode_image(&image).unwrap(), bytes);
    }
}
