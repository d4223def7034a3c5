//! Range reads over a single data file
//!
//! A range yields exactly the records that start inside it. A prefix range
//! cut at any byte, followed by a scan from the next record start, must
//! yield every record exactly once, in order.

use std::fs::File;
use std::sync::Arc;

use biobundle_codec::testing::png_bytes;
use biobundle_codec::CodecRegistry;
use biobundle_core::ImageFormat;
use biobundle_storage::format::{read_offsets, IndexPreamble};
use biobundle_storage::{BundleConfig, BundleReader, BundleWriter};
use tempfile::TempDir;

const RECORDS: u32 = 12;

fn registry() -> Arc<CodecRegistry> {
    Arc::new(CodecRegistry::with_default_codecs())
}

/// Writes RECORDS PNG images tagged with their ordinal.
fn build_bundle(dir: &TempDir) -> (std::path::PathBuf, Vec<u64>) {
    let mut writer = BundleWriter::create(
        dir.path().join("split.hib"),
        false,
        registry(),
        BundleConfig::for_testing(),
    )
    .unwrap();
    for i in 0..RECORDS {
        writer
            .add_encoded(
                &png_bytes(i + 1, 3, 6),
                ImageFormat::Png,
                [("source", i.to_string())],
            )
            .unwrap();
    }
    let summary = writer.close().unwrap();

    let mut index = File::open(&summary.index_path).unwrap();
    IndexPreamble::read_from(&mut index).unwrap();
    (summary.data_path, read_offsets(&mut index, None).unwrap())
}

fn sources(reader: BundleReader) -> Vec<u32> {
    reader
        .map(|r| r.header().get_parsed::<u32>("source").unwrap())
        .collect()
}

#[test]
fn test_ranges_at_record_boundaries_partition_scan() {
    let dir = TempDir::new().unwrap();
    let (path, offsets) = build_bundle(&dir);
    let total = *offsets.last().unwrap();
    let full = sources(BundleReader::open_full(&path, registry()).unwrap());
    assert_eq!(full, (0..RECORDS).collect::<Vec<_>>());

    for k in 0..offsets.len() - 1 {
        let split = offsets[k];
        let mut joined = sources(BundleReader::open_split(&path, 0, split, registry()).unwrap());
        joined.extend(sources(
            BundleReader::open_split(&path, split, total - split, registry()).unwrap(),
        ));
        assert_eq!(joined, full, "split at record end {}", k);
    }
}

#[test]
fn test_prefix_cut_at_every_byte() {
    let dir = TempDir::new().unwrap();
    let (path, offsets) = build_bundle(&dir);
    let total = *offsets.last().unwrap();
    let full: Vec<u32> = (0..RECORDS).collect();
    let starts: Vec<u64> = std::iter::once(0)
        .chain(offsets[..offsets.len() - 1].iter().copied())
        .collect();

    for cut in 1..total {
        let head = sources(BundleReader::open_split(&path, 0, cut, registry()).unwrap());
        let started = starts.iter().filter(|s| **s < cut).count();
        assert_eq!(head.len(), started, "cut at byte {}", cut);

        let mut joined = head;
        if let Some(&next) = starts.iter().find(|s| **s >= cut) {
            joined.extend(sources(
                BundleReader::open_split(&path, next, total - next, registry()).unwrap(),
            ));
        }
        assert_eq!(joined, full, "cut at byte {}", cut);
    }
}

#[test]
fn test_inclusive_end_reads_record_starting_there() {
    let dir = TempDir::new().unwrap();
    let (path, offsets) = build_bundle(&dir);
    let total = *offsets.last().unwrap();

    // An inclusive end on the first byte of record k + 1 still reads it
    for k in 0..offsets.len() - 1 {
        let first = sources(BundleReader::open(&path, 0, offsets[k], registry()).unwrap());
        assert_eq!(first.len(), k + 2, "inclusive end {} reaches record {}", offsets[k], k + 1);

        let next_start = offsets[k + 1];
        let rest = if next_start < total {
            sources(BundleReader::open(&path, next_start, 0, registry()).unwrap())
        } else {
            Vec::new()
        };
        let mut joined = first;
        joined.extend(rest);
        assert_eq!(joined, (0..RECORDS).collect::<Vec<_>>());
    }
}

#[test]
fn test_parallel_disjoint_ranges() {
    let dir = TempDir::new().unwrap();
    let (path, offsets) = build_bundle(&dir);
    let registry = registry();

    let bounds: Vec<(u64, u64)> = std::iter::once(0)
        .chain(offsets.iter().copied().step_by(3).skip(1))
        .zip(offsets.iter().copied().step_by(3).skip(1).chain(std::iter::once(u64::MAX)))
        .collect();

    let parts: Vec<Vec<u32>> = std::thread::scope(|s| {
        let handles: Vec<_> = bounds
            .iter()
            .map(|&(start, end)| {
                let registry = registry.clone();
                let path = path.clone();
                s.spawn(move || {
                    let length = end.saturating_sub(start);
                    sources(BundleReader::open_split(&path, start, length, registry).unwrap())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let joined: Vec<u32> = parts.into_iter().flatten().collect();
    assert_eq!(joined, (0..RECORDS).collect::<Vec<_>>());
}

#[test]
fn test_progress_reaches_one_at_range_end() {
    let dir = TempDir::new().unwrap();
    let (path, offsets) = build_bundle(&dir);

    let mut reader = BundleReader::open_split(&path, offsets[1], offsets[3] - offsets[1], registry())
        .unwrap();
    assert_eq!(reader.progress(), 0.0);
    let mut last = 0.0;
    while reader.next() {
        let p = reader.progress();
        assert!(p > last);
        last = p;
    }
    assert_eq!(reader.progress(), 1.0);
}

#[test]
fn test_start_past_end_of_file() {
    let dir = TempDir::new().unwrap();
    let (path, offsets) = build_bundle(&dir);
    let total = *offsets.last().unwrap();
    let mut reader = BundleReader::open(&path, total + 100, 0, registry()).unwrap();
    assert!(!reader.next());
    assert_eq!(reader.progress(), 0.0);
}
