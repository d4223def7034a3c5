//! Bundle merge
//!
//! Appends every record of a closed source bundle to an open writer. Record
//! bytes are copied verbatim; only the index entries are shifted by the
//! writer's current offset. Records are not decoded.
//!
//! The source index is validated before the target is touched. The copy
//! itself is not transactional: an I/O error part way through poisons the
//! target writer.

use crate::error::{BundleError, BundleResult};
use crate::format::{read_offsets, IndexPreamble};
use crate::paths::BundlePaths;
use crate::writer::BundleWriter;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// Result of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeSummary {
    /// Records appended
    pub records: u64,
    /// Data bytes appended
    pub bytes: u64,
}

/// Append all records of the bundle at `source_index_path` to `target`.
pub fn append(
    target: &mut BundleWriter,
    source_index_path: impl AsRef<Path>,
) -> BundleResult<MergeSummary> {
    let source = BundlePaths::new(source_index_path, &target.config().data_suffix);
    if same_file(source.index(), target.paths().index()) {
        return Err(BundleError::invalid_index(
            "cannot append a bundle to itself",
        ));
    }

    let offsets = load_offsets(&source)?;
    if offsets.is_empty() {
        return Ok(MergeSummary::default());
    }

    let mut data = BufReader::with_capacity(
        target.config().read_buffer_size,
        File::open(source.data())?,
    );
    let bytes = target.append_raw(&mut data, &offsets)?;

    let summary = MergeSummary {
        records: offsets.len() as u64,
        bytes,
    };
    info!(
        source = %source.index().display(),
        target = %target.paths().index().display(),
        records = summary.records,
        bytes = summary.bytes,
        "Merged bundle"
    );
    Ok(summary)
}

/// Read the source offsets and check them against its data file.
fn load_offsets(source: &BundlePaths) -> BundleResult<Vec<u64>> {
    let mut index = BufReader::new(File::open(source.index())?);
    IndexPreamble::read_from(&mut index)?;
    let offsets = read_offsets(&mut index, None)?;

    let mut prev = 0u64;
    for (i, off) in offsets.iter().enumerate() {
        if *off <= prev {
            return Err(BundleError::invalid_index(format!(
                "entry {} ({}) does not follow {}",
                i, off, prev
            )));
        }
        prev = *off;
    }

    let data_len = fs::metadata(source.data())?.len();
    if prev != data_len {
        return Err(BundleError::invalid_index(format!(
            "last offset {} does not match data length {}",
            prev, data_len
        )));
    }
    Ok(offsets)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
