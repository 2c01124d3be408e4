//! Database schema for the `SQLite` fragment store.

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// SQL schema for initial database setup.
pub const SCHEMA_SQL: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_info (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Indexed code fragments
CREATE TABLE IF NOT EXISTS fragments (
    id TEXT PRIMARY KEY,
    file_path TEXT NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    content TEXT NOT NULL,
    signature TEXT,
    language TEXT NOT NULL,
    embedding BLOB,           -- f32 array serialized as little-endian bytes
    last_modified INTEGER,
    exports TEXT NOT NULL,    -- JSON array
    imports TEXT NOT NULL,    -- JSON array
    dependencies TEXT NOT NULL, -- JSON array
    extra TEXT,               -- JSON object for extensible metadata
    created_at INTEGER NOT NULL
);

-- Index for eviction and lookup by source file
CREATE INDEX IF NOT EXISTS idx_fragments_file ON fragments(file_path);

-- Index for symbol-definition lookup
CREATE INDEX IF NOT EXISTS idx_fragments_name ON fragments(name);

-- File-modification records for incremental reindexing
CREATE TABLE IF NOT EXISTS file_records (
    path TEXT PRIMARY KEY,
    last_indexed_mtime INTEGER NOT NULL,
    file_size INTEGER NOT NULL,
    checksum TEXT,
    updated_at INTEGER NOT NULL
);
";

/// SQL to check if schema is initialized.
pub const CHECK_SCHEMA_SQL: &str = r"
SELECT COUNT(*) FROM sqlite_master
WHERE type='table' AND name='schema_info';
";

/// SQL to get schema version.
pub const GET_VERSION_SQL: &str = r"
SELECT value FROM schema_info WHERE key = 'version';
";

/// SQL to set schema version.
pub const SET_VERSION_SQL: &str = r"
INSERT INTO schema_info (key, value) VALUES ('version', ?1)
ON CONFLICT(key) DO UPDATE SET value = excluded.value;
";
