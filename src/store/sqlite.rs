//! `SQLite` fragment store.
//!
//! Persistent [`FragmentStore`] backend. Fragments and file-modification
//! records survive process restarts, which incremental indexing requires.
//! The connection is mutex-guarded so parallel indexing workers can insert
//! concurrently.

// SQLite stores all integers as i64. These casts are intentional and safe
// because we only store non-negative values that fit in the target types.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use crate::core::{Fragment, FragmentKind, FragmentMetadata};
use crate::error::{Result, StoreError};
use crate::store::schema::{
    CHECK_SCHEMA_SQL, CURRENT_SCHEMA_VERSION, GET_VERSION_SQL, SCHEMA_SQL, SET_VERSION_SQL,
};
use crate::store::{FileModificationRecord, FragmentStore, StoreStats, symbol_matches};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// SQLite-backed fragment store.
///
/// # Examples
///
/// ```no_run
/// use promptpack::store::{FragmentStore, SqliteFragmentStore};
///
/// let store = SqliteFragmentStore::open("promptpack.db").unwrap();
/// assert_eq!(store.fragment_count().unwrap(), 0);
/// ```
pub struct SqliteFragmentStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteFragmentStore {
    /// Opens or creates a database at the given path and initializes the
    /// schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Database(e.to_string()))?;
        }

        let conn = Connection::open(&path).map_err(StoreError::from)?;

        // WAL mode for better concurrent access (returns a row, use query_row)
        let _: String = conn
            .query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))
            .map_err(StoreError::from)?;

        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path),
        };
        store.init()?;
        Ok(store)
    }

    /// Creates an in-memory database. Useful for testing; contents do not
    /// survive the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::from)?;
        let store = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        store.init()?;
        Ok(store)
    }

    /// Returns the database path (`None` for in-memory).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Database(format!("lock poisoned: {e}")).into())
    }

    fn init(&self) -> Result<()> {
        let conn = self.lock()?;

        let is_init: i64 = conn
            .query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))
            .map_err(StoreError::from)?;

        if is_init == 0 {
            conn.execute_batch(SCHEMA_SQL).map_err(StoreError::from)?;
            conn.execute(SET_VERSION_SQL, params![CURRENT_SCHEMA_VERSION.to_string()])
                .map_err(StoreError::from)?;
            return Ok(());
        }

        let version: Option<String> = conn
            .query_row(GET_VERSION_SQL, [], |row| row.get(0))
            .optional()
            .map_err(StoreError::from)?;
        let version: u32 = version.and_then(|v| v.parse().ok()).unwrap_or(0);
        if version > CURRENT_SCHEMA_VERSION {
            return Err(StoreError::Migration(format!(
                "database schema version {version} is newer than supported {CURRENT_SCHEMA_VERSION}"
            ))
            .into());
        }
        Ok(())
    }

    /// Returns current Unix timestamp in seconds.
    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    fn insert_with(conn: &Connection, fragment: &Fragment) -> Result<()> {
        let embedding = fragment.embedding.as_ref().map(|v| vector_to_blob(v));
        let exports = serde_json::to_string(&fragment.metadata.exports).map_err(StoreError::from)?;
        let imports = serde_json::to_string(&fragment.metadata.imports).map_err(StoreError::from)?;
        let dependencies =
            serde_json::to_string(&fragment.metadata.dependencies).map_err(StoreError::from)?;
        let extra = if fragment.metadata.extra.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&fragment.metadata.extra).map_err(StoreError::from)?)
        };

        conn.execute(
            "INSERT OR REPLACE INTO fragments
             (id, file_path, name, kind, start_line, end_line, content, signature,
              language, embedding, last_modified, exports, imports, dependencies,
              extra, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                fragment.id,
                fragment.file_path,
                fragment.name,
                fragment.kind.as_str(),
                fragment.start_line,
                fragment.end_line,
                fragment.content,
                fragment.signature,
                fragment.language,
                embedding,
                fragment.last_modified.map(|m| m as i64),
                exports,
                imports,
                dependencies,
                extra,
                Self::now(),
            ],
        )
        .map_err(StoreError::from)?;
        Ok(())
    }

    fn row_to_fragment(row: &Row<'_>) -> rusqlite::Result<Fragment> {
        let kind_str: String = row.get("kind")?;
        let kind = FragmentKind::parse(&kind_str).unwrap_or(FragmentKind::Function);

        let embedding: Option<Vec<u8>> = row.get("embedding")?;
        let exports: String = row.get("exports")?;
        let imports: String = row.get("imports")?;
        let dependencies: String = row.get("dependencies")?;
        let extra: Option<String> = row.get("extra")?;
        let last_modified: Option<i64> = row.get("last_modified")?;

        Ok(Fragment {
            id: row.get("id")?,
            file_path: row.get("file_path")?,
            name: row.get("name")?,
            kind,
            start_line: row.get("start_line")?,
            end_line: row.get("end_line")?,
            content: row.get("content")?,
            signature: row.get("signature")?,
            language: row.get("language")?,
            embedding: embedding.map(|b| blob_to_vector(&b)),
            last_modified: last_modified.map(|m| m as u64),
            metadata: FragmentMetadata {
                exports: serde_json::from_str(&exports).unwrap_or_default(),
                imports: serde_json::from_str(&imports).unwrap_or_default(),
                dependencies: serde_json::from_str(&dependencies).unwrap_or_default(),
                extra: extra
                    .and_then(|e| serde_json::from_str(&e).ok())
                    .unwrap_or_default(),
            },
        })
    }
}

impl FragmentStore for SqliteFragmentStore {
    fn insert(&self, fragment: &Fragment) -> Result<()> {
        let conn = self.lock()?;
        Self::insert_with(&conn, fragment)
    }

    fn insert_batch(&self, fragments: &[Fragment]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        for fragment in fragments {
            Self::insert_with(&tx, fragment)?;
        }
        tx.commit()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Fragment>> {
        let conn = self.lock()?;
        let fragment = conn
            .query_row(
                "SELECT * FROM fragments WHERE id = ?1",
                params![id],
                Self::row_to_fragment,
            )
            .optional()
            .map_err(StoreError::from)?;
        Ok(fragment)
    }

    fn fragments_for_file(&self, path: &str) -> Result<Vec<Fragment>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT * FROM fragments WHERE file_path = ?1 ORDER BY start_line")
            .map_err(StoreError::from)?;
        let rows = stmt
            .query_map(params![path], Self::row_to_fragment)
            .map_err(StoreError::from)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(StoreError::from)?);
        }
        Ok(out)
    }

    fn remove_by_file(&self, path: &str) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn
            .execute("DELETE FROM fragments WHERE file_path = ?1", params![path])
            .map_err(StoreError::from)?;
        Ok(removed)
    }

    fn find_symbol(&self, symbol: &str) -> Result<Vec<Fragment>> {
        let symbol_lower = symbol.to_lowercase();
        let pattern = format!("%{}%", escape_like(&symbol_lower));
        let conn = self.lock()?;
        // Coarse SQL prefilter; exact semantics applied in Rust below.
        let mut stmt = conn
            .prepare(
                "SELECT * FROM fragments
                 WHERE LOWER(name) LIKE ?1 ESCAPE '\\'
                    OR LOWER(exports) LIKE ?1 ESCAPE '\\'
                    OR LENGTH(?2) >= LENGTH(name)
                 ORDER BY id",
            )
            .map_err(StoreError::from)?;
        let rows = stmt
            .query_map(params![pattern, symbol_lower], Self::row_to_fragment)
            .map_err(StoreError::from)?;
        let mut out = Vec::new();
        for row in rows {
            let fragment = row.map_err(StoreError::from)?;
            if symbol_matches(&fragment, &symbol_lower) {
                out.push(fragment);
            }
        }
        Ok(out)
    }

    fn fragment_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM fragments", [], |row| row.get(0))
            .map_err(StoreError::from)?;
        Ok(count as usize)
    }

    fn modification_record(&self, path: &str) -> Result<Option<FileModificationRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT path, last_indexed_mtime, file_size, checksum
                 FROM file_records WHERE path = ?1",
                params![path],
                |row| {
                    let mtime: i64 = row.get(1)?;
                    let size: i64 = row.get(2)?;
                    Ok(FileModificationRecord {
                        path: row.get(0)?,
                        last_indexed_mtime: mtime as u64,
                        file_size: size as u64,
                        checksum: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)?;
        Ok(record)
    }

    fn set_modification_record(&self, record: &FileModificationRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO file_records (path, last_indexed_mtime, file_size, checksum, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(path) DO UPDATE SET
               last_indexed_mtime = excluded.last_indexed_mtime,
               file_size = excluded.file_size,
               checksum = excluded.checksum,
               updated_at = excluded.updated_at",
            params![
                record.path,
                record.last_indexed_mtime as i64,
                record.file_size as i64,
                record.checksum,
                Self::now(),
            ],
        )
        .map_err(StoreError::from)?;
        Ok(())
    }

    fn remove_modification_record(&self, path: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM file_records WHERE path = ?1", params![path])
            .map_err(StoreError::from)?;
        Ok(())
    }

    fn record_paths(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT path FROM file_records ORDER BY path")
            .map_err(StoreError::from)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(StoreError::from)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(StoreError::from)?);
        }
        Ok(out)
    }

    fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;
        let (fragment_count, file_count, total_content_bytes): (i64, i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COUNT(DISTINCT file_path), COALESCE(SUM(LENGTH(content)), 0)
                 FROM fragments",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(StoreError::from)?;
        let record_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM file_records", [], |row| row.get(0))
            .map_err(StoreError::from)?;

        Ok(StoreStats {
            fragment_count: fragment_count as usize,
            file_count: file_count as usize,
            record_count: record_count as usize,
            total_content_bytes: total_content_bytes as usize,
        })
    }
}

/// Serializes an f32 vector as little-endian bytes.
fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Deserializes little-endian bytes back into an f32 vector.
fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Escapes `%`, `_`, and the escape character itself for a LIKE pattern.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
