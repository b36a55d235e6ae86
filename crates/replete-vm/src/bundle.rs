//! Bundled script sources
//!
//! The VM treats the compiled ClojureScript output (module loader, core
//! library, REPL library) as opaque text looked up by relative path.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Read-only source of bundled scripts.
pub trait Bundle: Send + Sync {
    /// Return the text stored at `path`, or `None` if there is none.
    fn get_contents(&self, path: &str) -> Option<String>;
}

/// A bundle backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct DirBundle {
    root: PathBuf,
}

impl DirBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Bundle for DirBundle {
    fn get_contents(&self, path: &str) -> Option<String> {
        let relative = Path::new(path);
        // bundle lookups never escape the root
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            tracing::warn!("Rejected bundle path outside root: {}", path);
            return None;
        }

        match std::fs::read_to_string(self.root.join(relative)) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::debug!("Bundle miss for {}: {}", path, e);
                None
            }
        }
    }
}

/// An in-memory bundle, mostly useful for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryBundle {
    files: HashMap<String, String>,
}

impl MemoryBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, text: impl Into<String>) {
        self.files.insert(path.into(), text.into());
    }
}

impl Bundle for MemoryBundle {
    fn get_contents(&self, path: &str) -> Option<String> {
        self.files.get(path).cloned()
    }
}
