//! Bundle file paths

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Index and data file paths of one bundle.
///
/// The data file is the index path with a suffix appended to its file
/// name: `scans.hib` pairs with `scans.hib.dat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlePaths {
    index: PathBuf,
    data: PathBuf,
}

impl BundlePaths {
    /// Derive the data path from an index path.
    pub fn new(index: impl AsRef<Path>, data_suffix: &str) -> Self {
        let index = index.as_ref().to_path_buf();
        let mut data: OsString = index.clone().into_os_string();
        data.push(data_suffix);
        BundlePaths {
            index,
            data: PathBuf::from(data),
        }
    }

    /// Index file path.
    pub fn index(&self) -> &Path {
        &self.index
    }

    /// Data file path.
    pub fn data(&self) -> &Path {
        &self.data
    }

    /// True if either file exists.
    pub fn any_exists(&self) -> bool {
        self.index.exists() || self.data.exists()
    }
}
