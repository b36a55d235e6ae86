//! Filesystem operations rooted at the app's writable directory
//!
//! Script-visible paths are always resolved against a [`FileRoot`]. A leading
//! `/` is treated as relative to the root. Paths with `..` or a drive prefix
//! are rejected, so scripts cannot address the host filesystem outside it.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// The writable root directory scripts see as their filesystem.
#[derive(Debug, Clone)]
pub struct FileRoot {
    root: PathBuf,
}

impl FileRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a script-visible path to a host path under the root.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the path would leave the root.
    pub fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is outside the files root", path),
            ));
        }
        Ok(self.root.join(relative))
    }

    pub fn is_directory(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|target| target.is_dir())
    }

    /// List the entry names of a directory (names only, not full paths).
    pub fn list_files(&self, path: &str) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.resolve(path)?)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    /// Delete a file or an empty directory.
    pub fn delete(&self, path: &str) -> io::Result<()> {
        let target = self.resolve(path)?;
        if target.is_dir() {
            fs::remove_dir(target)
        } else {
            fs::remove_file(target)
        }
    }

    /// Byte-copy `from` to `to`, truncating the destination.
    ///
    /// Both files are closed when this returns, on success or failure.
    pub fn copy(&self, from: &str, to: &str) -> io::Result<u64> {
        let mut source = fs::File::open(self.resolve(from)?)?;
        let mut dest = fs::File::create(self.resolve(to)?)?;
        let copied = io::copy(&mut source, &mut dest)?;
        dest.sync_all()?;
        Ok(copied)
    }

    /// Create `path` and its ancestors if it does not exist yet.
    pub fn make_dirs(&self, path: &str) -> io::Result<()> {
        let target = self.resolve(path)?;
        if target.exists() {
            return Ok(());
        }
        fs::create_dir_all(target)
    }
}
