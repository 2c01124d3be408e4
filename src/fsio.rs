//! Filesystem collaborator interface.
//!
//! The core never touches the filesystem directly: the indexing pipeline
//! reads, stats, and walks through the [`FileSystem`] trait so the embedding
//! host can inject its own implementation (sandboxed, virtual, remote).
//! [`OsFileSystem`] is the standard-library implementation, memory-mapping
//! large files for efficient reads.

use crate::error::{IoError, Result};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Threshold for using memory mapping (1MB).
const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Size and modification time of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// File size in bytes.
    pub size: u64,
    /// Modification time in milliseconds since the epoch.
    pub mtime_ms: u64,
}

/// Read/stat/walk interface the indexing pipeline consumes.
///
/// Implementations must be `Send + Sync`: the pipeline reads files from
/// parallel workers.
pub trait FileSystem: Send + Sync {
    /// Reads the full contents of a file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::FileNotFound`] for missing paths and
    /// [`IoError::ReadFailed`] for other failures.
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Returns size and mtime for a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be stat'd.
    fn stat(&self, path: &Path) -> Result<FileStat>;

    /// Recursively lists all regular files under `root`.
    ///
    /// Symlinked directories are not followed.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be enumerated. Unreadable
    /// subdirectories are skipped.
    fn walk(&self, root: &Path) -> Result<Vec<PathBuf>>;
}

/// Standard-library filesystem with memory-mapped reads for large files.
///
/// # Examples
///
/// ```no_run
/// use promptpack::fsio::{FileSystem, OsFileSystem};
/// use std::path::Path;
///
/// let fs = OsFileSystem;
/// let bytes = fs.read(Path::new("src/lib.rs")).unwrap();
/// assert!(!bytes.is_empty());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl OsFileSystem {
    fn read_mapped(path: &Path, file: &File) -> Result<Vec<u8>> {
        // Memory mapping requires unsafe but is read-only here; the file is
        // not mutated for the lifetime of the map.
        #[allow(unsafe_code)]
        let mmap = unsafe {
            memmap2::Mmap::map(file).map_err(|e| IoError::MmapFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
        };
        Ok(mmap.to_vec())
    }

    fn walk_into(dir: &Path, out: &mut Vec<PathBuf>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                Self::walk_into(&path, out);
            } else if file_type.is_file() {
                out.push(path);
            }
        }
    }
}

impl FileSystem for OsFileSystem {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        if !path.exists() {
            return Err(IoError::FileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let mut file = File::open(path).map_err(|e| IoError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let size = file
            .metadata()
            .map_err(|e| IoError::StatFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
            .len();

        if size >= MMAP_THRESHOLD {
            return Self::read_mapped(path, &file);
        }

        #[allow(clippy::cast_possible_truncation)]
        let mut buf = Vec::with_capacity(size as usize);
        file.read_to_end(&mut buf).map_err(|e| IoError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(buf)
    }

    fn stat(&self, path: &Path) -> Result<FileStat> {
        let meta = std::fs::metadata(path).map_err(|e| IoError::StatFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));

        Ok(FileStat {
            size: meta.len(),
            mtime_ms,
        })
    }

    fn walk(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(IoError::WalkFailed {
                root: root.display().to_string(),
                reason: "not a directory".to_string(),
            }
            .into());
        }
        let mut out = Vec::new();
        Self::walk_into(root, &mut out);
        out.sort();
        Ok(out)
    }
}
