//! Database schema definitions.
//!
//! Contains the SQL schema and the forward-only migration ladder for the
//! application database. Migrations are idempotent by construction:
//! `CREATE TABLE IF NOT EXISTS` everywhere, and `ALTER TABLE ... ADD
//! COLUMN` statements tolerate "duplicate column" errors on re-run.

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 4;

/// SQL schema for a fresh install.
pub const SCHEMA_SQL: &str = r"
-- Schema version tracking (singleton row)
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Core files table
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT UNIQUE NOT NULL,
    filename TEXT NOT NULL,
    sha256 TEXT NOT NULL,
    mtime REAL NOT NULL,
    size INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending', 'indexing', 'indexed', 'error')),
    last_error TEXT,
    pages INTEGER,
    extracted_at TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    public_read INTEGER NOT NULL DEFAULT 0,
    employer_name TEXT,
    union_local TEXT,
    effective_date TEXT,
    expiry_date TEXT,
    region TEXT,
    short_name TEXT
);

-- Extracted pages
CREATE TABLE IF NOT EXISTS pdf_pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    page_number INTEGER NOT NULL,
    text TEXT NOT NULL,
    raw_text TEXT,
    UNIQUE(file_id, page_number)
);

-- FTS5 virtual table for page full-text search
CREATE VIRTUAL TABLE IF NOT EXISTS page_fts USING fts5(
    file_id UNINDEXED,
    page_id UNINDEXED,
    page_number UNINDEXED,
    text,
    tokenize='porter unicode61'
);

-- Semantic chunks for structure-aware indexing
CREATE TABLE IF NOT EXISTS document_chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    chunk_number INTEGER NOT NULL,
    text TEXT NOT NULL,
    heading TEXT,
    parent_heading TEXT,
    section_number TEXT,
    page_start INTEGER NOT NULL,
    page_end INTEGER NOT NULL,
    headings_json TEXT,
    chunk_type TEXT DEFAULT 'text',
    created_at TEXT DEFAULT (datetime('now')),
    UNIQUE(file_id, chunk_number)
);

-- FTS5 for chunk-based search (heading is separately searchable)
CREATE VIRTUAL TABLE IF NOT EXISTS chunk_fts USING fts5(
    file_id UNINDEXED,
    chunk_id UNINDEXED,
    heading,
    text,
    tokenize='porter unicode61'
);

-- Extracted tables from PDFs
CREATE TABLE IF NOT EXISTS document_tables (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    page_number INTEGER NOT NULL,
    table_index INTEGER NOT NULL DEFAULT 0,
    headers_json TEXT,
    rows_json TEXT,
    markdown_text TEXT NOT NULL,
    context_heading TEXT,
    is_wage_table INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Custom synonyms overlay
CREATE TABLE IF NOT EXISTS custom_synonyms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    canonical_term TEXT NOT NULL UNIQUE,
    synonyms TEXT NOT NULL,  -- JSON array of synonyms
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Dense-vector collection: stable ids with a metadata mirror
CREATE TABLE IF NOT EXISTS vector_entries (
    id TEXT PRIMARY KEY,  -- chunk_<file_id>_<chunk_id> or page_<file_id>_<page_id>
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    chunk_id INTEGER,
    page_id INTEGER,
    page_number INTEGER NOT NULL DEFAULT 1,
    page_start INTEGER NOT NULL DEFAULT 1,
    page_end INTEGER NOT NULL DEFAULT 1,
    filename TEXT NOT NULL DEFAULT '',
    file_path TEXT NOT NULL DEFAULT '',
    heading TEXT,
    is_page INTEGER NOT NULL DEFAULT 0,
    document TEXT NOT NULL,  -- truncated to 1000 chars
    embedding BLOB NOT NULL,  -- f32 array serialized little-endian
    dimensions INTEGER NOT NULL,
    model_name TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_files_status ON files(status);
CREATE INDEX IF NOT EXISTS idx_files_filename ON files(filename);
CREATE INDEX IF NOT EXISTS idx_files_public_read ON files(public_read);
CREATE INDEX IF NOT EXISTS idx_pages_file ON pdf_pages(file_id);
CREATE INDEX IF NOT EXISTS idx_chunks_file ON document_chunks(file_id);
CREATE INDEX IF NOT EXISTS idx_chunks_heading ON document_chunks(heading);
CREATE INDEX IF NOT EXISTS idx_chunks_type ON document_chunks(chunk_type);
CREATE INDEX IF NOT EXISTS idx_tables_file ON document_tables(file_id);
CREATE INDEX IF NOT EXISTS idx_tables_wage ON document_tables(is_wage_table);
CREATE INDEX IF NOT EXISTS idx_custom_synonyms_canonical ON custom_synonyms(canonical_term);
CREATE INDEX IF NOT EXISTS idx_vector_file ON vector_entries(file_id);
";

/// A forward-only migration step.
pub struct Migration {
    /// Version this migration upgrades from.
    pub from_version: u32,
    /// Version this migration upgrades to.
    pub to_version: u32,
    /// SQL statements to execute, in order.
    pub statements: &'static [&'static str],
}

/// v1 -> v2: semantic chunks + chunk FTS.
const MIGRATION_V1_TO_V2: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS document_chunks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
        chunk_number INTEGER NOT NULL,
        text TEXT NOT NULL,
        heading TEXT,
        parent_heading TEXT,
        section_number TEXT,
        page_start INTEGER NOT NULL,
        page_end INTEGER NOT NULL,
        headings_json TEXT,
        created_at TEXT DEFAULT (datetime('now')),
        UNIQUE(file_id, chunk_number)
    )",
    r"CREATE VIRTUAL TABLE IF NOT EXISTS chunk_fts USING fts5(
        file_id UNINDEXED,
        chunk_id UNINDEXED,
        heading,
        text,
        tokenize='porter unicode61'
    )",
    "CREATE INDEX IF NOT EXISTS idx_chunks_file ON document_chunks(file_id)",
    "CREATE INDEX IF NOT EXISTS idx_chunks_heading ON document_chunks(heading)",
];

/// v2 -> v3: table extraction + chunk types + file metadata.
const MIGRATION_V2_TO_V3: &[&str] = &[
    "ALTER TABLE document_chunks ADD COLUMN chunk_type TEXT DEFAULT 'text'",
    r"CREATE TABLE IF NOT EXISTS document_tables (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
        page_number INTEGER NOT NULL,
        table_index INTEGER NOT NULL DEFAULT 0,
        headers_json TEXT,
        rows_json TEXT,
        markdown_text TEXT NOT NULL,
        context_heading TEXT,
        is_wage_table INTEGER NOT NULL DEFAULT 0,
        created_at TEXT DEFAULT (datetime('now'))
    )",
    "ALTER TABLE files ADD COLUMN employer_name TEXT",
    "ALTER TABLE files ADD COLUMN union_local TEXT",
    "ALTER TABLE files ADD COLUMN effective_date TEXT",
    "ALTER TABLE files ADD COLUMN expiry_date TEXT",
    "ALTER TABLE files ADD COLUMN region TEXT",
    "ALTER TABLE files ADD COLUMN short_name TEXT",
    "CREATE INDEX IF NOT EXISTS idx_chunks_type ON document_chunks(chunk_type)",
    "CREATE INDEX IF NOT EXISTS idx_tables_file ON document_tables(file_id)",
    "CREATE INDEX IF NOT EXISTS idx_tables_wage ON document_tables(is_wage_table)",
];

/// v3 -> v4: custom synonyms + dense-vector collection.
const MIGRATION_V3_TO_V4: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS custom_synonyms (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        canonical_term TEXT NOT NULL UNIQUE,
        synonyms TEXT NOT NULL,
        created_at TEXT DEFAULT (datetime('now')),
        updated_at TEXT DEFAULT (datetime('now'))
    )",
    r"CREATE TABLE IF NOT EXISTS vector_entries (
        id TEXT PRIMARY KEY,
        file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
        chunk_id INTEGER,
        page_id INTEGER,
        page_number INTEGER NOT NULL DEFAULT 1,
        page_start INTEGER NOT NULL DEFAULT 1,
        page_end INTEGER NOT NULL DEFAULT 1,
        filename TEXT NOT NULL DEFAULT '',
        file_path TEXT NOT NULL DEFAULT '',
        heading TEXT,
        is_page INTEGER NOT NULL DEFAULT 0,
        document TEXT NOT NULL,
        embedding BLOB NOT NULL,
        dimensions INTEGER NOT NULL,
        model_name TEXT,
        created_at TEXT DEFAULT (datetime('now'))
    )",
    "CREATE INDEX IF NOT EXISTS idx_custom_synonyms_canonical ON custom_synonyms(canonical_term)",
    "CREATE INDEX IF NOT EXISTS idx_vector_file ON vector_entries(file_id)",
];

/// Available migrations, oldest first.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        from_version: 1,
        to_version: 2,
        statements: MIGRATION_V1_TO_V2,
    },
    Migration {
        from_version: 2,
        to_version: 3,
        statements: MIGRATION_V2_TO_V3,
    },
    Migration {
        from_version: 3,
        to_version: 4,
        statements: MIGRATION_V3_TO_V4,
    },
];

/// Gets the migrations needed to upgrade from a version.
#[must_use]
pub fn migrations_from(current_version: u32) -> Vec<&'static Migration> {
    MIGRATIONS
        .iter()
        .filter(|m| m.from_version >= current_version && m.to_version <= CURRENT_SCHEMA_VERSION)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_sql_not_empty() {
        assert!(SCHEMA_SQL.contains("CREATE TABLE"));
        assert!(SCHEMA_SQL.contains("page_fts"));
        assert!(SCHEMA_SQL.contains("chunk_fts"));
    }

    #[test]
    fn test_migrations_ordered() {
        let mut last = 0;
        for migration in MIGRATIONS {
            assert!(migration.to_version > migration.from_version);
            assert!(migration.from_version >= last);
            last = migration.from_version;
        }
    }

    #[test]
    fn test_migration_chain_reaches_current() {
        assert_eq!(
            MIGRATIONS.last().map(|m| m.to_version),
            Some(CURRENT_SCHEMA_VERSION)
        );
    }

    #[test]
    fn test_migrations_from() {
        assert_eq!(migrations_from(1).len(), MIGRATIONS.len());
        assert_eq!(migrations_from(CURRENT_SCHEMA_VERSION).len(), 0);
    }
}
