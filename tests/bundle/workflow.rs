//! Write, merge and resume workflows through `ImageBundle`

use crate::common::{registry, sample, write_mixed_bundle};
use biobundle::{keys, BundleError, BundleMode, ImageBundle, ImageFormat, ScanStop};
use tempfile::TempDir;

#[test]
fn test_merge_two_bundles_and_resume_reading() {
    let dir = TempDir::new().unwrap();
    write_mixed_bundle(&dir.path().join("first.hib"), 6);
    write_mixed_bundle(&dir.path().join("second.hib"), 5);

    let first = ImageBundle::new(dir.path().join("first.hib"), registry());
    let second = ImageBundle::new(dir.path().join("second.hib"), registry());

    let mut merged = ImageBundle::new(dir.path().join("out").join("merged.hib"), registry());
    merged.open_for_write(false).unwrap();
    assert_eq!(merged.append(&first).unwrap().records, 6);
    assert_eq!(merged.append(&second).unwrap().records, 5);
    let summary = merged.close().unwrap().unwrap();
    assert_eq!(summary.records, 11);

    // Resume at the first record that came from the second bundle
    merged.open_for_read_at(6).unwrap();
    let mut sources = Vec::new();
    while merged.next().unwrap() {
        sources.push(merged.current_header().unwrap().get("source").unwrap().to_string());
    }
    assert_eq!(sources, vec!["0", "1", "2", "3", "4"]);
    assert_eq!(merged.stop_reason(), Some(&ScanStop::Exhausted));
    merged.close().unwrap();

    merged.open_for_read_at(11).unwrap();
    assert!(!merged.next().unwrap());
    merged.close().unwrap();

    assert!(matches!(
        merged.open_for_read_at(12),
        Err(BundleError::ImageIndexOutOfRange { available: 11, .. })
    ));
}

#[test]
fn test_headers_synthesized_per_format() {
    let dir = TempDir::new().unwrap();
    let mut bundle = ImageBundle::new(dir.path().join("formats.hib"), registry());
    bundle.open_for_write(false).unwrap();
    for format in ImageFormat::ALL {
        bundle
            .add_encoded(&sample(format, 1), format, Vec::<(String, String)>::new())
            .unwrap();
    }
    bundle.close().unwrap();

    bundle.open_for_read().unwrap();
    let mut seen = Vec::new();
    while bundle.next().unwrap() {
        let header = bundle.current_header().unwrap().clone();
        seen.push(header.storage_format());
        match header.storage_format() {
            ImageFormat::Jpeg => assert_eq!(header.get(keys::WIDTH), Some("9")),
            ImageFormat::Png => assert_eq!(header.get(keys::NUMBER_BANDS), Some("3")),
            ImageFormat::Nifti => assert_eq!(header.get(keys::X_AXIS), Some("3")),
            ImageFormat::Dicom => assert_eq!(header.get(keys::PATIENT_ID), Some("P-1")),
            ImageFormat::Undefined => unreachable!(),
        }
    }
    assert_eq!(seen, ImageFormat::ALL.to_vec());
}

#[test]
fn test_write_after_close_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut bundle = ImageBundle::new(dir.path().join("closed.hib"), registry());
    bundle.open_for_write(false).unwrap();
    bundle.close().unwrap();
    assert_eq!(bundle.mode(), BundleMode::Closed);
    assert!(matches!(
        bundle.add_encoded(&sample(ImageFormat::Png, 0), ImageFormat::Png, [("a", "b")]),
        Err(BundleError::NotOpenForWrite)
    ));
}
