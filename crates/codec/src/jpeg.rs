//! JPEG codec
//!
//! Only the marker structure is parsed: the decoder walks segments from the
//! SOI marker to the first frame header (SOF0, SOF1 or SOF2) and reads the
//! sample precision and frame size from it. Entropy-coded data is never
//! touched; the encoded stream is kept as-is.

use crate::error::{CodecError, CodecResult};
use crate::image::{check_raster_dims, expect_format, DomainImage, RasterImage};
use crate::traits::{ImageDecoder, ImageEncoder};
use biobundle_core::{keys, ColorSpace, ImageFormat, ImageHeader};
use byteorder::{BigEndian, ByteOrder};
use std::io::Write;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const SOF0: u8 = 0xC0;
const SOF1: u8 = 0xC1;
const SOF2: u8 = 0xC2;
const TEM: u8 = 0x01;

/// Frame header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JpegFrame {
    precision: u8,
    height: u16,
    width: u16,
    components: u8,
}

/// Stateless JPEG codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegCodec;

impl JpegCodec {
    fn err(detail: impl Into<String>) -> CodecError {
        CodecError::decode(ImageFormat::Jpeg, detail)
    }

    /// Find the first frame header. `Ok(None)` when the stream reaches scan
    /// data or ends before any frame header.
    fn read_frame(bytes: &[u8]) -> CodecResult<Option<JpegFrame>> {
        if bytes.len() < 2 || bytes[0..2] != SOI {
            return Err(Self::err("missing SOI marker"));
        }

        let mut pos = 2;
        loop {
            if pos >= bytes.len() {
                return Ok(None);
            }
            if bytes[pos] != 0xFF {
                return Err(Self::err(format!("expected marker at offset {}", pos)));
            }
            // Any number of 0xFF fill bytes may precede a marker
            while pos < bytes.len() && bytes[pos] == 0xFF {
                pos += 1;
            }
            let Some(&marker) = bytes.get(pos) else {
                return Ok(None);
            };
            pos += 1;

            match marker {
                TEM | 0xD0..=0xD7 => continue,
                EOI | SOS => return Ok(None),
                _ => {}
            }

            let len_bytes = bytes
                .get(pos..pos + 2)
                .ok_or_else(|| Self::err(format!("truncated segment 0xFF{:02X}", marker)))?;
            let seg_len = BigEndian::read_u16(len_bytes) as usize;
            if seg_len < 2 {
                return Err(Self::err(format!(
                    "segment 0xFF{:02X} has invalid length {}",
                    marker, seg_len
                )));
            }

            if matches!(marker, SOF0 | SOF1 | SOF2) {
                let seg = bytes
                    .get(pos..pos + seg_len)
                    .filter(|s| s.len() >= 8)
                    .ok_or_else(|| Self::err("truncated frame header"))?;
                return Ok(Some(JpegFrame {
                    precision: seg[2],
                    height: BigEndian::read_u16(&seg[3..5]),
                    width: BigEndian::read_u16(&seg[5..7]),
                    components: seg[7],
                }));
            }

            pos += seg_len;
        }
    }

    fn check_precision(frame: &JpegFrame) -> CodecResult<()> {
        if frame.precision != 8 {
            return Err(Self::err(format!(
                "unsupported sample precision {}",
                frame.precision
            )));
        }
        Ok(())
    }
}

impl ImageDecoder for JpegCodec {
    fn format(&self) -> ImageFormat {
        ImageFormat::Jpeg
    }

    fn decode_header(&self, bytes: &[u8]) -> CodecResult<ImageHeader> {
        let frame = Self::read_frame(bytes)?
            .ok_or_else(|| Self::err("no SOF0/SOF2 frame header before scan data"))?;
        Self::check_precision(&frame)?;
        if frame.width == 0 || frame.height == 0 {
            return Err(Self::err(format!(
                "empty frame {} x {}",
                frame.width, frame.height
            )));
        }
        tracing::trace!(
            width = frame.width,
            height = frame.height,
            components = frame.components,
            "Parsed JPEG frame header"
        );

        // Decoded rasters are always expanded to RGB
        let mut header = ImageHeader::new(ImageFormat::Jpeg);
        header.insert(keys::COLOR_SPACE, ColorSpace::Rgb.name());
        header.insert(keys::WIDTH, frame.width.to_string());
        header.insert(keys::HEIGHT, frame.height.to_string());
        header.insert(keys::NUMBER_BANDS, "3");
        Ok(header)
    }

    fn decode_image(&self, bytes: &[u8], header: ImageHeader) -> CodecResult<DomainImage> {
        expect_format(ImageFormat::Jpeg, header.storage_format())?;
        if let Some(frame) = Self::read_frame(bytes)? {
            Self::check_precision(&frame)?;
            check_raster_dims(&header, frame.width as u32, frame.height as u32)?;
        }
        Ok(DomainImage::Jpeg(RasterImage::new(header, bytes.to_vec())))
    }
}

impl ImageEncoder for JpegCodec {
    fn format(&self) -> ImageFormat {
        ImageFormat::Jpeg
    }

    fn encode_image_to(&self, image: &DomainImage, out: &mut dyn Write) -> CodecResult<()> {
        let raster = match image {
            DomainImage::Jpeg(r) => r,
            other => {
                return Err(CodecError::FormatMismatch {
                    expected: ImageFormat::Jpeg,
                    actual: other.format(),
                })
            }
        };
        raster.require_dims(ImageFormat::Jpeg)?;
        if raster.color_space() != ColorSpace::Rgb {
            return Err(CodecError::encode(
                ImageFormat::Jpeg,
                format!("color space must be RGB, got {}", raster.color_space()),
            ));
        }
        if raster.bands() != Some(3) {
            return Err(CodecError::encode(
                ImageFormat::Jpeg,
                format!("expected 3 bands, got {:?}", raster.bands()),
            ));
        }
        out.write_all(image.encoded())?;
        Ok(())
    }
}
