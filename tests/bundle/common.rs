//! Shared helpers for bundle tests

use biobundle::testing::{dicom_part10_bytes, jpeg_bytes, nifti1_bytes, png_bytes};
use biobundle::{BundleConfig, BundleWriter, CodecRegistry, ImageFormat, WriteSummary};
use std::path::Path;
use std::sync::Arc;

pub fn registry() -> Arc<CodecRegistry> {
    Arc::new(CodecRegistry::with_default_codecs())
}

/// Encoded image of the given format, varied by `seed`.
pub fn sample(format: ImageFormat, seed: u32) -> Vec<u8> {
    match format {
        ImageFormat::Jpeg => jpeg_bytes(8 + seed as u16, 8),
        ImageFormat::Png => png_bytes(4 + seed, 4, 2),
        ImageFormat::Nifti => nifti1_bytes([2 + seed as i64, 2, 2, 1]),
        ImageFormat::Dicom => dicom_part10_bytes(&format!("P-{}", seed), "Doe^John", 2, 2),
        ImageFormat::Undefined => Vec::new(),
    }
}

/// Bundle of `count` records cycling through all formats, tagged "0", "1", ...
pub fn write_mixed_bundle(index_path: &Path, count: u32) -> WriteSummary {
    let mut writer =
        BundleWriter::create(index_path, false, registry(), BundleConfig::for_testing()).unwrap();
    for i in 0..count {
        let format = ImageFormat::ALL[i as usize % ImageFormat::ALL.len()];
        writer
            .add_encoded(&sample(format, i), format, [("source", i.to_string())])
            .unwrap();
    }
    writer.close().unwrap()
}
