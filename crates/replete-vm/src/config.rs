//! VM configuration.

use std::path::PathBuf;

/// Default upper bound on bytes returned by one input-stream read.
pub const DEFAULT_MAX_READ_CHUNK: usize = 1024;

/// Configuration for a [`Dispatcher`](crate::Dispatcher).
///
/// # Example
///
/// ```
/// use replete_vm::VmConfig;
///
/// let config = VmConfig::new()
///     .with_files_root("/tmp/replete")
///     .with_thread_name("repl-vm");
/// assert_eq!(config.thread_name, "repl-vm");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct VmConfig {
    /// Writable root that script-visible paths are resolved against
    pub files_root: PathBuf,
    /// Name of the dispatcher thread
    pub thread_name: String,
    /// Maximum number of bytes per input-stream read
    pub max_read_chunk: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            files_root: std::env::temp_dir().join("replete"),
            thread_name: "replete-vm".to_string(),
            max_read_chunk: DEFAULT_MAX_READ_CHUNK,
        }
    }
}

impl VmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.files_root = root.into();
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Sets the input-stream read chunk. Zero is clamped to one.
    pub fn with_max_read_chunk(mut self, chunk: usize) -> Self {
        self.max_read_chunk = chunk.max(1);
        self
    }
}
