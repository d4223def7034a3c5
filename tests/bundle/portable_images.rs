//! Portable image serialization of scanned records

use crate::common::{registry, sample, write_mixed_bundle};
use biobundle::{BundleReader, CodecError, CodecRegistry, DomainImage, ImageFormat};
use tempfile::TempDir;

#[test]
fn test_scanned_images_survive_portable_bytes() {
    let dir = TempDir::new().unwrap();
    let summary = write_mixed_bundle(&dir.path().join("portable.hib"), 8);
    let registry = registry();

    let mut count = 0;
    for record in BundleReader::open_full(&summary.data_path, registry.clone()).unwrap() {
        let bytes = record.image.to_bytes();
        let restored = DomainImage::from_bytes(&bytes, &registry).unwrap();
        assert_eq!(restored, record.image);
        count += 1;
    }
    assert_eq!(count, 8);
}

#[test]
fn test_portable_bytes_need_a_codec() {
    let registry = registry();
    let image = registry
        .decode_header_and_image(ImageFormat::Dicom, &sample(ImageFormat::Dicom, 3))
        .unwrap();
    let bytes = image.to_bytes();

    let empty = CodecRegistry::new();
    assert!(matches!(
        DomainImage::from_bytes(&bytes, &empty),
        Err(CodecError::UnsupportedFormat(ImageFormat::Dicom))
    ));
}
