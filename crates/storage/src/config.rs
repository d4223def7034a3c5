//! Bundle configuration.

/// Minimum chunk size for copying data during merges.
pub const MIN_COPY_CHUNK: usize = 4 * 1024;

/// Bundle configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleConfig {
    /// Suffix appended to the index path to name the data file (default: ".dat").
    pub data_suffix: String,

    /// Buffer size for the data and index writers (default: 64KB).
    pub write_buffer_size: usize,

    /// Buffer size for scanning the data file (default: 64KB).
    pub read_buffer_size: usize,

    /// Chunk size for copying data during merges (default: 1MB).
    pub copy_chunk_size: usize,

    /// Whether `close` calls `sync_all` on both files (default: false).
    pub sync_on_close: bool,
}

impl Default for BundleConfig {
    fn default() -> Self {
        BundleConfig {
            data_suffix: ".dat".to_string(),
            write_buffer_size: 64 * 1024, // 64KB
            read_buffer_size: 64 * 1024,  // 64KB
            copy_chunk_size: 1024 * 1024, // 1MB
            sync_on_close: false,
        }
    }
}

impl BundleConfig {
    /// Create a new bundle configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set data file suffix (builder pattern).
    pub fn with_data_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.data_suffix = suffix.into();
        self
    }

    /// Set write buffer size (builder pattern).
    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Set read buffer size (builder pattern).
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set merge copy chunk size (builder pattern).
    pub fn with_copy_chunk_size(mut self, size: usize) -> Self {
        self.copy_chunk_size = size;
        self
    }

    /// Set sync-on-close (builder pattern).
    pub fn with_sync_on_close(mut self, sync: bool) -> Self {
        self.sync_on_close = sync;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_suffix.is_empty() {
            return Err(ConfigError::EmptyDataSuffix);
        }
        if self.write_buffer_size == 0 || self.read_buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        if self.copy_chunk_size < MIN_COPY_CHUNK {
            return Err(ConfigError::CopyChunkTooSmall);
        }
        Ok(())
    }

    /// Create a configuration optimized for testing (small buffers).
    pub fn for_testing() -> Self {
        BundleConfig {
            data_suffix: ".dat".to_string(),
            write_buffer_size: 256,
            read_buffer_size: 256,
            copy_chunk_size: MIN_COPY_CHUNK,
            sync_on_close: false,
        }
    }
}

/// Bundle configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Data suffix is empty, so the data file would overwrite the index.
    #[error("Data file suffix must not be empty")]
    EmptyDataSuffix,

    /// A buffer size is zero.
    #[error("Buffer sizes must be non-zero")]
    ZeroBufferSize,

    /// Copy chunk is below the minimum.
    #[error("Copy chunk size must be at least 4KB")]
    CopyChunkTooSmall,
}
