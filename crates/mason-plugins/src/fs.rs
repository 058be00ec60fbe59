//! Filesystem access seam for the invocation core.
//!
//! The core touches the filesystem in only three ways: it creates plugin
//! output directories, checks for cached artifacts, and reads plugin source
//! files when fingerprinting. Those operations sit behind the [`FileSystem`]
//! trait so tests can substitute a double, mirroring the executor seam used
//! elsewhere in the workspace.

use std::fs;
use std::io;
use std::path::Path;

/// Minimal filesystem operations consumed by the invocation core.
pub trait FileSystem: Send + Sync {
    /// Creates a directory, optionally creating missing parents.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when creation fails.
    fn create_directory(&self, path: &Path, recursive: bool) -> io::Result<()>;

    /// Returns whether the path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Reads the full contents of a file.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the file cannot be read.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Production [`FileSystem`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn create_directory(&self, path: &Path, recursive: bool) -> io::Result<()> {
        if recursive {
            fs::create_dir_all(path)
        } else {
            fs::create_dir(path)
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn local_filesystem_round_trip() {
        let dir = tempdir().expect("create tempdir");
        let fs = LocalFileSystem;

        let nested = dir.path().join("a/b/c");
        fs.create_directory(&nested, true).expect("create nested");
        assert!(fs.exists(&nested));

        let file = nested.join("source.mason");
        std::fs::write(&file, b"plugin body").expect("write file");
        assert_eq!(fs.read(&file).expect("read file"), b"plugin body");
    }

    #[test]
    fn non_recursive_creation_requires_parent() {
        let dir = tempdir().expect("create tempdir");
        let fs = LocalFileSystem;
        let nested = dir.path().join("missing/child");
        assert!(fs.create_directory(&nested, false).is_err());
        assert!(!fs.exists(&nested));
    }
}
