//! In-memory fragment store.
//!
//! Backs non-incremental runs and tests. All state lives in `RwLock`-guarded
//! maps; writers from parallel indexing workers interleave safely.

use crate::core::Fragment;
use crate::error::{Result, StoreError};
use crate::store::{FileModificationRecord, FragmentStore, StoreStats, symbol_matches};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct Inner {
    by_id: HashMap<String, Fragment>,
    /// file path -> fragment ids, insertion-ordered.
    by_file: HashMap<String, Vec<String>>,
    records: HashMap<String, FileModificationRecord>,
}

/// In-memory [`FragmentStore`] implementation.
///
/// # Examples
///
/// ```
/// use promptpack::core::{Fragment, FragmentKind};
/// use promptpack::store::{FragmentStore, MemoryFragmentStore};
///
/// let store = MemoryFragmentStore::new();
/// let frag = Fragment::new("/r/a.ts", "f", FragmentKind::Function, 1, 2, "fn", "typescript");
/// store.insert(&frag).unwrap();
/// assert_eq!(store.fragment_count().unwrap(), 1);
/// ```
#[derive(Default)]
pub struct MemoryFragmentStore {
    inner: RwLock<Inner>,
}

impl MemoryFragmentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Database(format!("lock poisoned: {e}")).into())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Database(format!("lock poisoned: {e}")).into())
    }
}

impl FragmentStore for MemoryFragmentStore {
    fn insert(&self, fragment: &Fragment) -> Result<()> {
        let mut inner = self.write()?;
        insert_one(&mut inner, fragment);
        Ok(())
    }

    fn insert_batch(&self, fragments: &[Fragment]) -> Result<()> {
        // Single write lock = atomic with respect to readers.
        let mut inner = self.write()?;
        for fragment in fragments {
            insert_one(&mut inner, fragment);
        }
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Fragment>> {
        Ok(self.read()?.by_id.get(id).cloned())
    }

    fn fragments_for_file(&self, path: &str) -> Result<Vec<Fragment>> {
        let inner = self.read()?;
        let mut fragments: Vec<Fragment> = inner
            .by_file
            .get(path)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.by_id.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        fragments.sort_by_key(|f| f.start_line);
        Ok(fragments)
    }

    fn remove_by_file(&self, path: &str) -> Result<usize> {
        let mut inner = self.write()?;
        let Some(ids) = inner.by_file.remove(path) else {
            return Ok(0);
        };
        let mut removed = 0;
        for id in ids {
            if inner.by_id.remove(&id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn find_symbol(&self, symbol: &str) -> Result<Vec<Fragment>> {
        let symbol_lower = symbol.to_lowercase();
        let inner = self.read()?;
        let mut hits: Vec<Fragment> = inner
            .by_id
            .values()
            .filter(|f| symbol_matches(f, &symbol_lower))
            .cloned()
            .collect();
        // Deterministic order for callers.
        hits.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(hits)
    }

    fn fragment_count(&self) -> Result<usize> {
        Ok(self.read()?.by_id.len())
    }

    fn modification_record(&self, path: &str) -> Result<Option<FileModificationRecord>> {
        Ok(self.read()?.records.get(path).cloned())
    }

    fn set_modification_record(&self, record: &FileModificationRecord) -> Result<()> {
        self.write()?
            .records
            .insert(record.path.clone(), record.clone());
        Ok(())
    }

    fn remove_modification_record(&self, path: &str) -> Result<()> {
        self.write()?.records.remove(path);
        Ok(())
    }

    fn record_paths(&self) -> Result<Vec<String>> {
        let mut paths: Vec<String> = self.read()?.records.keys().cloned().collect();
        paths.sort();
        Ok(paths)
    }

    fn stats(&self) -> Result<StoreStats> {
        let inner = self.read()?;
        Ok(StoreStats {
            fragment_count: inner.by_id.len(),
            file_count: inner.by_file.len(),
            record_count: inner.records.len(),
            total_content_bytes: inner.by_id.values().map(|f| f.content.len()).sum(),
        })
    }
}

fn insert_one(inner: &mut Inner, fragment: &Fragment) {
    let ids = inner
        .by_file
        .entry(fragment.file_path.clone())
        .or_default();
    if !ids.contains(&fragment.id) {
        ids.push(fragment.id.clone());
    }
    inner.by_id.insert(fragment.id.clone(), fragment.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FragmentKind, FragmentMetadata};

    fn frag(path: &str, name: &str, start: u32, content: &str) -> Fragment {
        Fragment::new(
            path,
            name,
            FragmentKind::Function,
            start,
            start + 2,
            content,
            "typescript",
        )
    }

    #[test]
    fn test_insert_and_get() {
        let store = MemoryFragmentStore::new();
        let f = frag("/r/a.ts", "foo", 1, "function foo() {}");
        store.insert(&f).unwrap();

        let got = store.get(&f.id).unwrap();
        assert_eq!(got, Some(f));
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_reinsert_replaces() {
        let store = MemoryFragmentStore::new();
        let mut f = frag("/r/a.ts", "foo", 1, "function foo() {}");
        store.insert(&f).unwrap();
        f.set_embedding(vec![1.0]);
        store.insert(&f).unwrap();

        assert_eq!(store.fragment_count().unwrap(), 1);
        assert!(store.get(&f.id).unwrap().map(|g| g.has_embedding()) == Some(true));
    }

    #[test]
    fn test_fragments_for_file_ordered() {
        let store = MemoryFragmentStore::new();
        store.insert(&frag("/r/a.ts", "b", 20, "function b() {}")).unwrap();
        store.insert(&frag("/r/a.ts", "a", 5, "function a() {}")).unwrap();
        store.insert(&frag("/r/other.ts", "c", 1, "function c() {}")).unwrap();

        let got = store.fragments_for_file("/r/a.ts").unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].name, "a");
        assert_eq!(got[1].name, "b");
    }

    #[test]
    fn test_remove_by_file() {
        let store = MemoryFragmentStore::new();
        store.insert(&frag("/r/a.ts", "a", 1, "function a() {}")).unwrap();
        store.insert(&frag("/r/a.ts", "b", 10, "function b() {}")).unwrap();
        store.insert(&frag("/r/b.ts", "c", 1, "function c() {}")).unwrap();

        assert_eq!(store.remove_by_file("/r/a.ts").unwrap(), 2);
        assert_eq!(store.fragment_count().unwrap(), 1);
        assert!(store.fragments_for_file("/r/a.ts").unwrap().is_empty());
        assert_eq!(store.remove_by_file("/r/a.ts").unwrap(), 0);
    }

    #[test]
    fn test_find_symbol_by_name_and_export() {
        let store = MemoryFragmentStore::new();
        store
            .insert(&frag("/r/a.ts", "UserService.fetchUser", 1, "fetchUser() {}"))
            .unwrap();
        let exporter = frag("/r/b.ts", "lines-1-3", 1, "export const TokenCache = {};")
            .with_metadata(FragmentMetadata {
                exports: vec!["TokenCache".to_string()],
                ..Default::default()
            });
        store.insert(&exporter).unwrap();

        assert_eq!(store.find_symbol("fetchUser").unwrap().len(), 1);
        assert_eq!(store.find_symbol("TokenCache").unwrap().len(), 1);
        assert!(store.find_symbol("nothing_like_this").unwrap().is_empty());
    }

    #[test]
    fn test_modification_records() {
        let store = MemoryFragmentStore::new();
        assert!(store.modification_record("/r/a.ts").unwrap().is_none());

        let rec = FileModificationRecord {
            path: "/r/a.ts".to_string(),
            last_indexed_mtime: 1_000,
            file_size: 42,
            checksum: Some("abcd".to_string()),
        };
        store.set_modification_record(&rec).unwrap();
        assert_eq!(store.modification_record("/r/a.ts").unwrap(), Some(rec));

        store.remove_modification_record("/r/a.ts").unwrap();
        assert!(store.modification_record("/r/a.ts").unwrap().is_none());
    }

    #[test]
    fn test_stats() {
        let store = MemoryFragmentStore::new();
        store.insert(&frag("/r/a.ts", "a", 1, "aaaa")).unwrap();
        store.insert(&frag("/r/b.ts", "b", 1, "bbbbbbbb")).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.fragment_count, 2);
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.total_content_bytes, 12);
    }

    #[test]
    fn test_concurrent_inserts() {
        use std::sync::Arc;

        let store = Arc::new(MemoryFragmentStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for j in 0..50 {
                        let f = frag(
                            &format!("/r/file{i}.ts"),
                            &format!("fn{j}"),
                            j * 10 + 1,
                            &format!("function fn{j}() {{ /* {i} */ }}"),
                        );
                        store.insert(&f).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.fragment_count().unwrap(), 8 * 50);
    }
}
