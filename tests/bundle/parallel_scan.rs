//! Split-parallel scanning of one data file

use crate::common::{registry, write_mixed_bundle};
use biobundle::{BundleMode, BundleReader, ImageBundle};
use tempfile::TempDir;

/// Split the data file into at most `parts` ranges on record boundaries.
fn plan_ranges(offsets: &[u64], parts: usize) -> Vec<(u64, u64)> {
    let per = (offsets.len() + parts - 1) / parts;
    let mut ranges = Vec::new();
    let mut start = 0;
    for chunk in offsets.chunks(per) {
        let end = *chunk.last().unwrap();
        ranges.push((start, end - start));
        start = end;
    }
    ranges
}

#[test]
fn test_parallel_scan_matches_sequential() {
    let dir = TempDir::new().unwrap();
    let index = dir.path().join("parallel.hib");
    let summary = write_mixed_bundle(&index, 40);

    let mut bundle = ImageBundle::new(&index, registry());
    let offsets = bundle.read_all_offsets().unwrap();
    assert_eq!(bundle.mode(), BundleMode::Closed);
    assert_eq!(offsets.len(), 40);

    let sequential: Vec<String> = BundleReader::open_full(&summary.data_path, registry())
        .unwrap()
        .map(|r| r.header().get("source").unwrap().to_string())
        .collect();

    let shared = registry();
    let parts: Vec<Vec<String>> = std::thread::scope(|s| {
        let handles: Vec<_> = plan_ranges(&offsets, 4)
            .into_iter()
            .map(|(start, len)| {
                let registry = shared.clone();
                let path = summary.data_path.clone();
                s.spawn(move || {
                    BundleReader::open_split(&path, start, len, registry)
                        .unwrap()
                        .map(|r| r.header().get("source").unwrap().to_string())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(parts.len(), 4);
    assert!(parts.iter().all(|p| p.len() == 10));
    let joined: Vec<String> = parts.into_iter().flatten().collect();
    assert_eq!(joined, sequential);
}

#[test]
fn test_plan_ranges_covers_file() {
    let offsets = [10, 25, 40, 70, 90];
    let ranges = plan_ranges(&offsets, 2);
    assert_eq!(ranges, vec![(0, 40), (40, 50)]);
}
