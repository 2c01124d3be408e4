//! Vector index.
//!
//! Stores `(fragment id, vector)` pairs and answers k-nearest-neighbor
//! queries over cosine similarity. The flat implementation scans all
//! vectors; with a few thousand fragments at a few hundred dimensions a
//! scan is faster than maintaining an approximate structure.

use crate::embedding::cosine_similarity;
use crate::error::{Result, VectorDbError};
use crate::extract::Language;
use std::collections::HashMap;
use std::sync::RwLock;

/// One entry for a batch insert.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// Fragment id.
    pub id: String,
    /// Source file of the fragment (drives `delete_by_file`).
    pub file_path: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
}

/// Optional restrictions on a search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Only fragments whose file path starts with this prefix.
    pub path_prefix: Option<String>,
    /// Only fragments from files of this language (by extension).
    pub language: Option<String>,
}

impl SearchFilter {
    fn accepts(&self, file_path: &str) -> bool {
        if let Some(prefix) = &self.path_prefix
            && !file_path.starts_with(prefix.as_str())
        {
            return false;
        }
        if let Some(language) = &self.language {
            let detected = Language::from_path(file_path).map(Language::as_str);
            if detected != Some(language.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Nearest-neighbor store over fragment embeddings.
///
/// Invariants: exactly one stored vector per id (re-insert replaces); all
/// vectors have the index dimension; a failed insert commits nothing.
/// Implementations must support concurrent inserts.
pub trait VectorIndex: Send + Sync {
    /// The vector dimension this index accepts.
    fn dimensions(&self) -> usize;

    /// Inserts or replaces one vector.
    ///
    /// # Errors
    ///
    /// Returns [`VectorDbError::DimensionMismatch`] for a wrong-sized
    /// vector, or a storage error.
    fn insert(&self, id: &str, file_path: &str, vector: Vec<f32>) -> Result<()>;

    /// Inserts a batch atomically: either every entry commits or none.
    ///
    /// # Errors
    ///
    /// Returns an error on dimension mismatch or storage failure.
    fn insert_batch(&self, entries: Vec<VectorEntry>) -> Result<()>;

    /// Removes all vectors for fragments originating from `path`.
    ///
    /// Returns the number of vectors removed.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    fn delete_by_file(&self, path: &str) -> Result<usize>;

    /// Returns up to `k` ids scored by cosine similarity, descending.
    ///
    /// Ties are broken by insertion order. The result reflects a consistent
    /// snapshot of the index at the time the search began.
    ///
    /// # Errors
    ///
    /// Returns an error on dimension mismatch or storage failure.
    fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<(String, f32)>>;

    /// Number of stored vectors.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    fn size(&self) -> Result<usize>;
}

struct StoredVector {
    id: String,
    file_path: String,
    vector: Vec<f32>,
}

#[derive(Default)]
struct Inner {
    /// Insertion-ordered vectors; order is the search tiebreak.
    entries: Vec<StoredVector>,
    /// id -> position in `entries`.
    positions: HashMap<String, usize>,
}

/// Brute-force cosine index over a flat vector list.
///
/// # Examples
///
/// ```
/// use promptpack::index::{FlatVectorIndex, VectorIndex};
///
/// let index = FlatVectorIndex::new(3);
/// index.insert("a", "/repo/a.ts", vec![1.0, 0.0, 0.0]).unwrap();
/// index.insert("b", "/repo/b.ts", vec![0.0, 1.0, 0.0]).unwrap();
///
/// let hits = index.search(&[1.0, 0.0, 0.0], 1, None).unwrap();
/// assert_eq!(hits[0].0, "a");
/// ```
pub struct FlatVectorIndex {
    dimensions: usize,
    inner: RwLock<Inner>,
}

impl FlatVectorIndex {
    /// Creates an empty index accepting vectors of the given dimension.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            inner: RwLock::new(Inner::default()),
        }
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(VectorDbError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            }
            .into());
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|e| VectorDbError::Storage {
                reason: format!("lock poisoned: {e}"),
            }
            .into())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|e| VectorDbError::Storage {
                reason: format!("lock poisoned: {e}"),
            }
            .into())
    }
}

fn insert_one(inner: &mut Inner, id: &str, file_path: &str, vector: Vec<f32>) {
    if let Some(&pos) = inner.positions.get(id) {
        // Replace in place; the original insertion order is kept.
        inner.entries[pos].file_path = file_path.to_string();
        inner.entries[pos].vector = vector;
        return;
    }
    inner.positions.insert(id.to_string(), inner.entries.len());
    inner.entries.push(StoredVector {
        id: id.to_string(),
        file_path: file_path.to_string(),
        vector,
    });
}

impl VectorIndex for FlatVectorIndex {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn insert(&self, id: &str, file_path: &str, vector: Vec<f32>) -> Result<()> {
        self.check_dimension(&vector)?;
        let mut inner = self.write()?;
        insert_one(&mut inner, id, file_path, vector);
        Ok(())
    }

    fn insert_batch(&self, entries: Vec<VectorEntry>) -> Result<()> {
        // Validate everything before touching state so a failure commits
        // nothing.
        for entry in &entries {
            self.check_dimension(&entry.vector)?;
        }
        let mut inner = self.write()?;
        for entry in entries {
            insert_one(&mut inner, &entry.id, &entry.file_path, entry.vector);
        }
        Ok(())
    }

    fn delete_by_file(&self, path: &str) -> Result<usize> {
        let mut inner = self.write()?;
        let before = inner.entries.len();
        inner.entries.retain(|e| e.file_path != path);
        let removed = before - inner.entries.len();
        if removed > 0 {
            inner.positions.clear();
            let positions: Vec<(String, usize)> = inner
                .entries
                .iter()
                .enumerate()
                .map(|(pos, e)| (e.id.clone(), pos))
                .collect();
            inner.positions.extend(positions);
        }
        Ok(removed)
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<(String, f32)>> {
        self.check_dimension(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        // The read guard is a consistent snapshot: concurrent inserts wait.
        let inner = self.read()?;
        let mut scored: Vec<(usize, &StoredVector, f32)> = inner
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| filter.is_none_or(|f| f.accepts(&e.file_path)))
            .map(|(pos, e)| (pos, e, cosine_similarity(query, &e.vector)))
            .collect();

        scored.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, e, score)| (e.id.clone(), score))
            .collect())
    }

    fn size(&self) -> Result<usize> {
        Ok(self.read()?.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = 1.0;
        v
    }

    #[test]
    fn test_insert_and_size() {
        let index = FlatVectorIndex::new(4);
        index.insert("a", "/r/a.ts", unit(4, 0)).unwrap();
        index.insert("b", "/r/b.ts", unit(4, 1)).unwrap();
        assert_eq!(index.size().unwrap(), 2);
    }

    #[test]
    fn test_dimension_enforced() {
        let index = FlatVectorIndex::new(4);
        let err = index.insert("a", "/r/a.ts", vec![1.0, 0.0]).unwrap_err();
        assert!(err.to_string().contains("dimension"));
        assert_eq!(index.size().unwrap(), 0);

        assert!(index.search(&[1.0], 5, None).is_err());
    }

    #[test]
    fn test_reinsert_replaces() {
        let index = FlatVectorIndex::new(2);
        index.insert("a", "/r/a.ts", vec![1.0, 0.0]).unwrap();
        index.insert("a", "/r/a.ts", vec![0.0, 1.0]).unwrap();
        assert_eq!(index.size().unwrap(), 1);

        let hits = index.search(&[0.0, 1.0], 1, None).unwrap();
        assert_eq!(hits[0].0, "a");
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_batch_insert_is_all_or_nothing() {
        let index = FlatVectorIndex::new(2);
        let entries = vec![
            VectorEntry {
                id: "good".to_string(),
                file_path: "/r/a.ts".to_string(),
                vector: vec![1.0, 0.0],
            },
            VectorEntry {
                id: "bad".to_string(),
                file_path: "/r/b.ts".to_string(),
                vector: vec![1.0, 0.0, 0.0],
            },
        ];
        assert!(index.insert_batch(entries).is_err());
        assert_eq!(index.size().unwrap(), 0);
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let index = FlatVectorIndex::new(2);
        index.insert("x", "/r/x.ts", vec![1.0, 0.0]).unwrap();
        index.insert("y", "/r/y.ts", vec![0.7, 0.7]).unwrap();
        index.insert("z", "/r/z.ts", vec![0.0, 1.0]).unwrap();

        let hits = index.search(&[1.0, 0.0], 3, None).unwrap();
        let ids: Vec<&str> = hits.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
        assert!(hits[0].1 >= hits[1].1 && hits[1].1 >= hits[2].1);
    }

    #[test]
    fn test_search_ties_break_by_insertion_order() {
        let index = FlatVectorIndex::new(2);
        index.insert("second", "/r/b.ts", vec![1.0, 0.0]).unwrap();
        index.insert("first", "/r/a.ts", vec![1.0, 0.0]).unwrap();

        let hits = index.search(&[1.0, 0.0], 2, None).unwrap();
        assert_eq!(hits[0].0, "second");
        assert_eq!(hits[1].0, "first");
    }

    #[test]
    fn test_search_k_limits_results() {
        let index = FlatVectorIndex::new(2);
        for i in 0..10 {
            index.insert(&format!("id{i}"), "/r/a.ts", vec![1.0, 0.0]).unwrap();
        }
        assert_eq!(index.search(&[1.0, 0.0], 3, None).unwrap().len(), 3);
        assert!(index.search(&[1.0, 0.0], 0, None).unwrap().is_empty());
    }

    #[test]
    fn test_delete_by_file() {
        let index = FlatVectorIndex::new(2);
        index.insert("a1", "/r/a.ts", vec![1.0, 0.0]).unwrap();
        index.insert("a2", "/r/a.ts", vec![0.0, 1.0]).unwrap();
        index.insert("b1", "/r/b.ts", vec![1.0, 0.0]).unwrap();

        assert_eq!(index.delete_by_file("/r/a.ts").unwrap(), 2);
        assert_eq!(index.size().unwrap(), 1);
        let hits = index.search(&[1.0, 0.0], 10, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "b1");

        // Insert after delete keeps positions consistent.
        index.insert("c1", "/r/c.ts", vec![1.0, 0.0]).unwrap();
        assert_eq!(index.size().unwrap(), 2);
    }

    #[test]
    fn test_search_filter_path_prefix() {
        let index = FlatVectorIndex::new(2);
        index.insert("a", "/repo/src/a.ts", vec![1.0, 0.0]).unwrap();
        index.insert("b", "/repo/tests/b.ts", vec![1.0, 0.0]).unwrap();

        let filter = SearchFilter {
            path_prefix: Some("/repo/src/".to_string()),
            language: None,
        };
        let hits = index.search(&[1.0, 0.0], 10, Some(&filter)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "a");
    }

    #[test]
    fn test_search_filter_language() {
        let index = FlatVectorIndex::new(2);
        index.insert("ts", "/repo/a.ts", vec![1.0, 0.0]).unwrap();
        index.insert("py", "/repo/b.py", vec![1.0, 0.0]).unwrap();

        let filter = SearchFilter {
            path_prefix: None,
            language: Some("python".to_string()),
        };
        let hits = index.search(&[1.0, 0.0], 10, Some(&filter)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "py");
    }

    #[test]
    fn test_concurrent_inserts() {
        use std::sync::Arc;

        let index = Arc::new(FlatVectorIndex::new(4));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    for j in 0..50 {
                        index
                            .insert(&format!("{i}-{j}"), &format!("/r/{i}.ts"), unit(4, j % 4))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(index.size().unwrap(), 400);
    }
}
