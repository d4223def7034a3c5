//! Codec registry
//!
//! Maps each storage format to its decoder and encoder. A registry is built
//! once, wrapped in an `Arc` and handed to every bundle reader and writer;
//! it is never mutated while shared.

use crate::dicom::DicomCodec;
use crate::error::{CodecError, CodecResult};
use crate::image::DomainImage;
use crate::jpeg::JpegCodec;
use crate::nifti::NiftiCodec;
use crate::png::PngCodec;
use crate::traits::{ImageDecoder, ImageEncoder};
use biobundle_core::{ImageFormat, ImageHeader};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Format-keyed set of decoders and encoders.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    decoders: HashMap<ImageFormat, Arc<dyn ImageDecoder>>,
    encoders: HashMap<ImageFormat, Arc<dyn ImageEncoder>>,
}

impl CodecRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the JPEG, PNG, NIfTI and DICOM codecs.
    pub fn with_default_codecs() -> Self {
        let mut registry = Self::new();
        registry
            .register(JpegCodec)
            .register(PngCodec)
            .register(NiftiCodec)
            .register(DicomCodec);
        registry
    }

    /// Register a codec as both decoder and encoder for its format.
    pub fn register<C>(&mut self, codec: C) -> &mut Self
    where
        C: ImageDecoder + ImageEncoder + 'static,
    {
        let codec = Arc::new(codec);
        self.register_decoder(codec.clone());
        self.register_encoder(codec)
    }

    /// Register a decoder, replacing any previous one for its format.
    pub fn register_decoder(&mut self, decoder: Arc<dyn ImageDecoder>) -> &mut Self {
        let format = decoder.format();
        debug!(format = %format, "Registered image decoder");
        self.decoders.insert(format, decoder);
        self
    }

    /// Register an encoder, replacing any previous one for its format.
    pub fn register_encoder(&mut self, encoder: Arc<dyn ImageEncoder>) -> &mut Self {
        let format = encoder.format();
        debug!(format = %format, "Registered image encoder");
        self.encoders.insert(format, encoder);
        self
    }

    /// Decoder for a format.
    pub fn decoder(&self, format: ImageFormat) -> CodecResult<&dyn ImageDecoder> {
        if !format.is_defined() {
            return Err(CodecError::UnsupportedFormat(format));
        }
        self.decoders
            .get(&format)
            .map(|d| d.as_ref())
            .ok_or(CodecError::UnsupportedFormat(format))
    }

    /// Encoder for a format.
    pub fn encoder(&self, format: ImageFormat) -> CodecResult<&dyn ImageEncoder> {
        if !format.is_defined() {
            return Err(CodecError::UnsupportedFormat(format));
        }
        self.encoders
            .get(&format)
            .map(|e| e.as_ref())
            .ok_or(CodecError::UnsupportedFormat(format))
    }

    /// Formats that can be decoded, in code order.
    pub fn formats(&self) -> Vec<ImageFormat> {
        let mut formats: Vec<_> = self
            .decoders
            .keys()
            .copied()
            .filter(|f| f.is_defined())
            .collect();
        formats.sort();
        formats
    }

    /// True when a decoder is registered for the format.
    pub fn supports(&self, format: ImageFormat) -> bool {
        self.decoder(format).is_ok()
    }

    /// Synthesize a header from encoded bytes.
    pub fn decode_header(&self, format: ImageFormat, bytes: &[u8]) -> CodecResult<ImageHeader> {
        let header = self.decoder(format)?.decode_header(bytes)?;
        if header.storage_format() != format {
            return Err(CodecError::FormatMismatch {
                expected: format,
                actual: header.storage_format(),
            });
        }
        Ok(header)
    }

    /// Decode a payload with the decoder for the header's storage format.
    ///
    /// The returned image always has the header's format.
    pub fn decode_image(&self, bytes: &[u8], header: ImageHeader) -> CodecResult<DomainImage> {
        let format = header.storage_format();
        let image = self.decoder(format)?.decode_image(bytes, header)?;
        if image.format() != format {
            return Err(CodecError::FormatMismatch {
                expected: format,
                actual: image.format(),
            });
        }
        Ok(image)
    }

    /// Synthesize a header, then decode the image from the same bytes.
    pub fn decode_header_and_image(
        &self,
        format: ImageFormat,
        bytes: &[u8],
    ) -> CodecResult<DomainImage> {
        let header = self.decode_header(format, bytes)?;
        self.decode_image(bytes, header)
    }

    /// Encode an image with the encoder for its format.
    pub fn encode_image(&self, image: &DomainImage) -> CodecResult<Vec<u8>> {
        self.encoder(image.format())?.encode_image(image)
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut encoders: Vec<_> = self.encoders.keys().copied().collect();
        encoders.sort();
        f.debug_struct("CodecRegistry")
            .field("decoders", &self.formats())
            .field("encoders", &encoders)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::RasterImage;
    use crate::testing::{jpeg_bytes, png_bytes};
    use std::io::Write;

    /// Decoder that claims JPEG but produces PNG images.
    struct Liar;

    impl ImageDecoder for Liar {
        fn format(&self) -> ImageFormat {
            ImageFormat::Jpeg
        }

        fn decode_header(&self, _bytes: &[u8]) -> CodecResult<ImageHeader> {
            Ok(ImageHeader::new(ImageFormat::Jpeg))
        }

        fn decode_image(&self, bytes: &[u8], _header: ImageHeader) -> CodecResult<DomainImage> {
            Ok(DomainImage::Png(RasterImage::new(
                ImageHeader::new(ImageFormat::Png),
                bytes.to_vec(),
            )))
        }
    }

    struct NullEncoder;

    impl ImageEncoder for NullEncoder {
        fn format(&self) -> ImageFormat {
            ImageFormat::Png
        }

        fn encode_image_to(&self, _image: &DomainImage, out: &mut dyn Write) -> CodecResult<()> {
            out.write_all(b"null")?;
            Ok(())
        }
    }

    #[test]
    fn test_default_codecs() {
        let registry = CodecRegistry::with_default_codecs();
        assert_eq!(registry.formats(), ImageFormat::ALL.to_vec());
        for format in ImageFormat::ALL {
            assert_eq!(registry.decoder(format).unwrap().format(), format);
            assert_eq!(registry.encoder(format).unwrap().format(), format);
        }
    }

    #[test]
    fn test_empty_registry() {
        let registry = CodecRegistry::new();
        assert!(registry.formats().is_empty());
        assert!(matches!(
            registry.decoder(ImageFormat::Jpeg),
            Err(CodecError::UnsupportedFormat(ImageFormat::Jpeg))
        ));
        assert!(registry.encoder(ImageFormat::Png).is_err());
    }

    #[test]
    fn test_undefined_always_unsupported() {
        let registry = CodecRegistry::with_default_codecs();
        assert!(registry.decoder(ImageFormat::Undefined).is_err());
        assert!(registry.encoder(ImageFormat::Undefined).is_err());
        assert!(!registry.supports(ImageFormat::Undefined));
    }

    #[test]
    fn test_decode_image_enforces_variant() {
        let mut registry = CodecRegistry::new();
        registry.register_decoder(Arc::new(Liar));
        let result = registry.decode_image(b"x", ImageHeader::new(ImageFormat::Jpeg));
        assert!(matches!(
            result,
            Err(CodecError::FormatMismatch {
                expected: ImageFormat::Jpeg,
                actual: ImageFormat::Png
            })
        ));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = CodecRegistry::with_default_codecs();
        registry.register_encoder(Arc::new(NullEncoder));
        let image = registry
            .decode_header_and_image(ImageFormat::Png, &png_bytes(1, 1, 0))
            .unwrap();
        assert_eq!(registry.encode_image(&image).unwrap(), b"null");
    }

    #[test]
    fn test_decode_header_through_registry() {
        let registry = CodecRegistry::with_default_codecs();
        let header = registry
            .decode_header(ImageFormat::Jpeg, &jpeg_bytes(5, 6))
            .unwrap();
        assert_eq!(header.get("width"), Some("5"));
        assert!(registry
            .decode_header(ImageFormat::Png, &jpeg_bytes(5, 6))
            .is_err());
    }

    #[test]
    fn test_registry_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CodecRegistry>();
        assert_send_sync::<Arc<CodecRegistry>>();
    }
}
