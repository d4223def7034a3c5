//! Codec trait definitions.

use crate::error::CodecResult;
use crate::image::DomainImage;
use biobundle_core::{ImageFormat, ImageHeader};
use std::io::Write;

/// Turns encoded bytes of one storage format into headers and images.
///
/// # Thread Safety
///
/// Decoders must be `Send + Sync`; one registry is shared by every reader
/// scanning a bundle, including readers on different threads.
///
/// # Re-reading
///
/// Both methods receive the complete encoded image. `decode_image` may parse
/// the same bytes `decode_header` already looked at.
pub trait ImageDecoder: Send + Sync {
    /// Storage format this decoder handles.
    fn format(&self) -> ImageFormat;

    /// Build a header from the encoded bytes.
    fn decode_header(&self, bytes: &[u8]) -> CodecResult<ImageHeader>;

    /// Build a typed image from the encoded bytes and an existing header.
    ///
    /// The header usually comes from the bundle record, not from
    /// `decode_header`.
    fn decode_image(&self, bytes: &[u8], header: ImageHeader) -> CodecResult<DomainImage>;

    /// Decode the header, then the image, from the same bytes.
    fn decode_header_and_image(&self, bytes: &[u8]) -> CodecResult<DomainImage> {
        let header = self.decode_header(bytes)?;
        self.decode_image(bytes, header)
    }
}

/// Turns typed images back into encoded bytes.
pub trait ImageEncoder: Send + Sync {
    /// Storage format this encoder produces.
    fn format(&self) -> ImageFormat;

    /// Write the encoded image to a sink.
    fn encode_image_to(&self, image: &DomainImage, out: &mut dyn Write) -> CodecResult<()>;

    /// Encode the image into a new buffer.
    fn encode_image(&self, image: &DomainImage) -> CodecResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode_image_to(image, &mut buf)?;
        Ok(buf)
    }
}
