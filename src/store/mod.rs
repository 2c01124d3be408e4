//! Fragment storage.
//!
//! The [`FragmentStore`] owns canonical [`Fragment`](crate::core::Fragment)
//! values plus the file-modification records that drive incremental
//! reindexing. Two backends are provided: [`MemoryFragmentStore`] for
//! ephemeral corpora and [`SqliteFragmentStore`] for state that must survive
//! process restarts.

mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryFragmentStore;
pub use sqlite::SqliteFragmentStore;

use crate::core::Fragment;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Per-file bookkeeping for incremental reindexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileModificationRecord {
    /// Absolute file path (primary key).
    pub path: String,
    /// Filesystem mtime (ms since epoch) at the moment of successful
    /// indexing.
    pub last_indexed_mtime: u64,
    /// File size in bytes.
    pub file_size: u64,
    /// Content digest at index time. Stored for safer change detection;
    /// mtime remains the sole change signal.
    pub checksum: Option<String>,
}

/// Store statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    /// Number of fragments stored.
    pub fragment_count: usize,
    /// Number of distinct files with fragments.
    pub file_count: usize,
    /// Number of file-modification records.
    pub record_count: usize,
    /// Total bytes of fragment content.
    pub total_content_bytes: usize,
}

/// Canonical fragment storage plus incremental-indexing metadata.
///
/// Implementations must support concurrent inserts: the indexing pipeline
/// writes from parallel workers, so all methods take `&self` and interior
/// synchronization is the implementation's responsibility.
pub trait FragmentStore: Send + Sync {
    /// Inserts or replaces a fragment by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    fn insert(&self, fragment: &Fragment) -> Result<()>;

    /// Inserts a batch of fragments atomically.
    ///
    /// Either every fragment is committed or none are.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    fn insert_batch(&self, fragments: &[Fragment]) -> Result<()>;

    /// Looks up a fragment by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn get(&self, id: &str) -> Result<Option<Fragment>>;

    /// Returns all fragments for a file, ordered by start line.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn fragments_for_file(&self, path: &str) -> Result<Vec<Fragment>>;

    /// Removes every fragment originating from a file.
    ///
    /// Returns the number of fragments removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    fn remove_by_file(&self, path: &str) -> Result<usize>;

    /// Finds fragments whose name equals or contains `symbol`, or whose
    /// exports contain it (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn find_symbol(&self, symbol: &str) -> Result<Vec<Fragment>>;

    /// Total number of fragments.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn fragment_count(&self) -> Result<usize>;

    /// Looks up the modification record for a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn modification_record(&self, path: &str) -> Result<Option<FileModificationRecord>>;

    /// Creates or updates a modification record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    fn set_modification_record(&self, record: &FileModificationRecord) -> Result<()>;

    /// Deletes the modification record for a file, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    fn remove_modification_record(&self, path: &str) -> Result<()>;

    /// Lists every path with a modification record. The pipeline uses this
    /// to evict files that disappeared between runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn record_paths(&self) -> Result<Vec<String>>;

    /// Gathers store statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn stats(&self) -> Result<StoreStats>;
}

/// Case-insensitive symbol match shared by store backends: name equality,
/// name containment in either direction, or an export equal to the symbol.
pub(crate) fn symbol_matches(fragment: &Fragment, symbol_lower: &str) -> bool {
    let name_lower = fragment.name.to_lowercase();
    if name_lower == symbol_lower
        || name_lower.contains(symbol_lower)
        || symbol_lower.contains(&name_lower)
    {
        return true;
    }
    fragment
        .metadata
        .exports
        .iter()
        .any(|e| e.to_lowercase() == symbol_lower)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FragmentKind, FragmentMetadata};

    fn frag(name: &str, exports: &[&str]) -> Fragment {
        Fragment::new(
            "/repo/a.ts",
            name,
            FragmentKind::Function,
            1,
            3,
            "function x() {}",
            "typescript",
        )
        .with_metadata(FragmentMetadata {
            exports: exports.iter().map(|s| (*s).to_string()).collect(),
            ..Default::default()
        })
    }

    #[test]
    fn test_symbol_matches_name_equality() {
        assert!(symbol_matches(&frag("fetchUser", &[]), "fetchuser"));
    }

    #[test]
    fn test_symbol_matches_containment() {
        assert!(symbol_matches(&frag("UserService.fetchUser", &[]), "fetchuser"));
        assert!(symbol_matches(&frag("fetch", &[]), "fetchuser"));
    }

    #[test]
    fn test_symbol_matches_exports() {
        assert!(symbol_matches(&frag("lines-1-3", &["TokenCache"]), "tokencache"));
        assert!(!symbol_matches(&frag("zz", &["Other"]), "tokencache"));
    }
}
