//! Common test utilities for integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A directory tree to run the binary against.
pub struct TestTree {
    pub root: TempDir,
}

impl TestTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            root: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Write `content` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.root.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create directory");
        }
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Create `count` files of `size` bytes directly under the root.
    pub fn create_files(&self, count: usize, size: usize) {
        for i in 0..count {
            self.write(&format!("file{}.txt", i), "x".repeat(size));
        }
    }

    /// Create a nested directory structure with files.
    pub fn create_nested_structure(&self, depth: usize, files_per_level: usize) {
        let mut rel = String::new();
        for level in 0..depth {
            rel.push_str(&format!("level{}/", level));
            for i in 0..files_per_level {
                self.write(
                    &format!("{}file{}.txt", rel, i),
                    format!("content at level {}", level),
                );
            }
        }
    }

    /// All regular files with their contents, sorted by path.
    pub fn snapshot(&self) -> Vec<(PathBuf, Vec<u8>)> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.path().to_path_buf()];
        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir).expect("Failed to read directory") {
                let entry = entry.expect("Failed to read entry");
                let file_type = entry.file_type().expect("Failed to read file type");
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    let content = fs::read(entry.path()).expect("Failed to read file");
                    files.push((entry.path(), content));
                }
            }
        }
        files.sort();
        files
    }

    /// Paths of leftover temp files anywhere in the tree.
    pub fn temp_files(&self) -> Vec<PathBuf> {
        self.snapshot()
            .into_iter()
            .map(|(path, _)| path)
            .filter(|path| recompress::is_stale_temp_file(path))
            .collect()
    }
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Inode number of `path`.
#[cfg(unix)]
pub fn inode(path: &Path) -> u64 {
    use std::os::unix::fs::MetadataExt;
    fs::metadata(path).expect("Failed to stat").ino()
}

/// Whether the tests run with root privileges (permission tests are meaningless then).
#[cfg(unix)]
pub fn running_as_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}
