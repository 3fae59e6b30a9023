//! `SQLite` store implementation.
//!
//! One [`Store`] owns the connection behind a mutex; every call acquires it
//! for the duration of one statement or one transaction. Transactions
//! commit on scoped success and roll back on error. Foreign keys are
//! enforced and WAL is enabled on open.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::chunking::{ChunkType, DocumentChunk};
use crate::error::{Result, StorageError};
use crate::extract::{PageText, TableData};
use crate::models::{ChunkHit, FileInfo, FileStatus, SearchResult};
use crate::storage::schema::{migrations_from, CURRENT_SCHEMA_VERSION, SCHEMA_SQL};

/// Default database path relative to the working directory.
pub const DEFAULT_DB_PATH: &str = "data/app.db";

/// A chunk row with its file context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Chunk row id.
    pub id: i64,
    /// Owning file id.
    pub file_id: i64,
    /// Owning filename.
    pub filename: String,
    /// Owning file path.
    pub file_path: String,
    /// Per-file sequence number.
    pub chunk_number: u32,
    /// Chunk text including overlap prefix.
    pub text: String,
    /// Section heading.
    pub heading: Option<String>,
    /// Parent heading.
    pub parent_heading: Option<String>,
    /// Section number.
    pub section_number: Option<String>,
    /// First page covered.
    pub page_start: u32,
    /// Last page covered.
    pub page_end: u32,
    /// Headings spanning the chunk.
    pub headings: Vec<String>,
    /// Text or table.
    pub chunk_type: ChunkType,
}

/// A table row with its file context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTable {
    /// Table row id.
    pub id: i64,
    /// Owning file id.
    pub file_id: i64,
    /// Owning filename.
    pub filename: String,
    /// Owning file path.
    pub file_path: String,
    /// Page the table appears on.
    pub page_number: u32,
    /// Per-page table index.
    pub table_index: u32,
    /// Column headers.
    pub headers: Vec<String>,
    /// Data rows.
    pub rows: Vec<Vec<String>>,
    /// Markdown rendering.
    pub markdown_text: String,
    /// Heading above the table.
    pub context_heading: Option<String>,
    /// Wage-table flag.
    pub is_wage_table: bool,
}

/// A dense-vector collection entry with its metadata mirror.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// Stable id: `chunk_<file_id>_<chunk_id>` or `page_<file_id>_<page_id>`.
    pub id: String,
    /// Owning file id.
    pub file_id: i64,
    /// Chunk id for chunk entries.
    pub chunk_id: Option<i64>,
    /// Page id for page entries.
    pub page_id: Option<i64>,
    /// Page number (page entries) or page start (chunk entries).
    pub page_number: u32,
    /// First page covered.
    pub page_start: u32,
    /// Last page covered.
    pub page_end: u32,
    /// Owning filename.
    pub filename: String,
    /// Owning file path.
    pub file_path: String,
    /// Section heading, if any.
    pub heading: Option<String>,
    /// True for page entries.
    pub is_page: bool,
    /// Stored document text, truncated to 1000 characters.
    pub document: String,
    /// Dense embedding.
    pub embedding: Vec<f32>,
    /// Model that produced the embedding.
    pub model_name: Option<String>,
}

/// Aggregate database statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbStats {
    /// Total tracked files.
    pub total_files: usize,
    /// Files with status indexed.
    pub indexed_files: usize,
    /// Files with status error.
    pub error_files: usize,
    /// Total stored pages.
    pub total_pages: usize,
    /// Total stored chunks.
    pub total_chunks: usize,
    /// Total vector entries.
    pub vector_entries: usize,
    /// Schema version.
    pub schema_version: u32,
}

/// SQLite-backed store for files, pages, chunks, tables, synonyms and the
/// vector collection.
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

/// Serializes an f32 slice as little-endian bytes.
#[must_use]
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decodes little-endian bytes back into an f32 vector.
#[must_use]
pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

impl Store {
    /// Opens or creates the database at the given path.
    ///
    /// The parent directory is created when missing. Foreign keys are
    /// enforced and WAL journaling is enabled.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Database(e.to_string()))?;
            }
        }

        let conn = Connection::open(&path).map_err(StorageError::from)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])
            .map_err(StorageError::from)?;
        let _: String = conn
            .query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))
            .map_err(StorageError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path),
        })
    }

    /// Creates an in-memory database. Useful for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])
            .map_err(StorageError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Runs a closure with the connection held.
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StorageError::Database(format!("connection lock poisoned: {e}")))?;
        f(&conn)
    }

    /// Runs a closure inside a transaction: commit on `Ok`, rollback on `Err`.
    pub(crate) fn with_tx<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StorageError::Database(format!("connection lock poisoned: {e}")))?;
        let tx = conn.transaction().map_err(StorageError::from)?;
        let value = f(&tx)?;
        tx.commit().map_err(StorageError::from)?;
        Ok(value)
    }

    /// Initializes the schema, applying any pending migrations.
    ///
    /// Each migration step runs in its own transaction. `ALTER TABLE ...
    /// ADD COLUMN` statements tolerate duplicate-column errors so re-running
    /// a step is harmless.
    pub fn init(&self) -> Result<()> {
        let current = self.schema_version()?;

        if current == 0 {
            self.with_tx(|tx| {
                tx.execute_batch(SCHEMA_SQL).map_err(StorageError::from)?;
                tx.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![CURRENT_SCHEMA_VERSION],
                )
                .map_err(StorageError::from)?;
                Ok(())
            })?;
            return Ok(());
        }

        if current < CURRENT_SCHEMA_VERSION {
            for migration in migrations_from(current) {
                self.with_tx(|tx| {
                    for statement in migration.statements {
                        if let Err(e) = tx.execute_batch(statement) {
                            let message = e.to_string();
                            // Re-running ADD COLUMN against an upgraded table
                            if message.contains("duplicate column name") {
                                continue;
                            }
                            return Err(StorageError::Migration(message).into());
                        }
                    }
                    tx.execute(
                        "UPDATE schema_version SET version = ?",
                        params![migration.to_version],
                    )
                    .map_err(StorageError::from)?;
                    Ok(())
                })?;
            }
        }

        Ok(())
    }

    /// Returns the schema version, or 0 when uninitialized.
    pub fn schema_version(&self) -> Result<u32> {
        self.with_conn(|conn| {
            let exists: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
                    [],
                    |row| row.get(0),
                )
                .map_err(StorageError::from)?;
            if exists == 0 {
                return Ok(0);
            }
            let version: Option<i64> = conn
                .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
                .optional()
                .map_err(StorageError::from)?;
            Ok(version.unwrap_or(0) as u32)
        })
    }

    // ==================== File operations ====================

    /// Inserts a newly discovered file with status pending.
    pub fn insert_file(
        &self,
        path: &str,
        filename: &str,
        sha256: &str,
        mtime: f64,
        size: u64,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                r"INSERT INTO files (path, filename, sha256, mtime, size, status, public_read)
                  VALUES (?, ?, ?, ?, ?, 'pending', 0)",
                params![path, filename, sha256, mtime, size as i64],
            )
            .map_err(StorageError::from)?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn row_to_file_info(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileInfo> {
        Ok(FileInfo {
            id: row.get(0)?,
            path: row.get(1)?,
            filename: row.get(2)?,
            sha256: row.get(3)?,
            mtime: row.get(4)?,
            size: row.get::<_, i64>(5)? as u64,
            status: FileStatus::parse(&row.get::<_, String>(6)?),
            last_error: row.get(7)?,
            pages: row.get::<_, Option<i64>>(8)?.map(|p| p as u32),
            extracted_at: row.get(9)?,
            created_at: row.get(10)?,
            public_read: row.get::<_, i64>(11)? != 0,
            employer_name: row.get(12)?,
            union_local: row.get(13)?,
            effective_date: row.get(14)?,
            expiry_date: row.get(15)?,
            region: row.get(16)?,
            short_name: row.get(17)?,
        })
    }

    const FILE_COLS: &'static str = "id, path, filename, sha256, mtime, size, status, last_error, \
        pages, extracted_at, created_at, public_read, employer_name, union_local, effective_date, \
        expiry_date, region, short_name";

    /// Fetches a file by id.
    pub fn get_file(&self, id: i64) -> Result<Option<FileInfo>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM files WHERE id = ?", Self::FILE_COLS),
                params![id],
                Self::row_to_file_info,
            )
            .optional()
            .map_err(|e| StorageError::from(e).into())
        })
    }

    /// Fetches a file by absolute path.
    pub fn get_file_by_path(&self, path: &str) -> Result<Option<FileInfo>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM files WHERE path = ?", Self::FILE_COLS),
                params![path],
                Self::row_to_file_info,
            )
            .optional()
            .map_err(|e| StorageError::from(e).into())
        })
    }

    /// Lists all tracked files ordered by filename.
    pub fn list_files(&self) -> Result<Vec<FileInfo>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM files ORDER BY filename",
                    Self::FILE_COLS
                ))
                .map_err(StorageError::from)?;
            let files = stmt
                .query_map([], Self::row_to_file_info)
                .map_err(StorageError::from)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StorageError::from)?;
            Ok(files)
        })
    }

    /// Lists files with the given status.
    pub fn list_files_with_status(&self, status: FileStatus) -> Result<Vec<FileInfo>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM files WHERE status = ? ORDER BY filename",
                    Self::FILE_COLS
                ))
                .map_err(StorageError::from)?;
            let files = stmt
                .query_map(params![status.as_str()], Self::row_to_file_info)
                .map_err(StorageError::from)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StorageError::from)?;
            Ok(files)
        })
    }

    /// Records a content change: resets status to pending and clears the
    /// stale page rows and FTS entries in the same transaction.
    pub fn mark_file_changed(&self, id: i64, sha256: &str, mtime: f64, size: u64) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute(
                r"UPDATE files
                  SET sha256 = ?, mtime = ?, size = ?, status = 'pending',
                      last_error = NULL, pages = NULL, extracted_at = NULL
                  WHERE id = ?",
                params![sha256, mtime, size as i64, id],
            )
            .map_err(StorageError::from)?;
            tx.execute("DELETE FROM pdf_pages WHERE file_id = ?", params![id])
                .map_err(StorageError::from)?;
            tx.execute("DELETE FROM page_fts WHERE file_id = ?", params![id])
                .map_err(StorageError::from)?;
            Ok(())
        })
    }

    /// Deletes a file row; pages, chunks, tables and vector entries cascade,
    /// and the FTS rows are removed in the same transaction.
    pub fn delete_file(&self, id: i64) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute("DELETE FROM page_fts WHERE file_id = ?", params![id])
                .map_err(StorageError::from)?;
            tx.execute("DELETE FROM chunk_fts WHERE file_id = ?", params![id])
                .map_err(StorageError::from)?;
            tx.execute("DELETE FROM files WHERE id = ?", params![id])
                .map_err(StorageError::from)?;
            Ok(())
        })
    }

    /// Sets a file's status (and optional error message).
    pub fn set_file_status(
        &self,
        id: i64,
        status: FileStatus,
        last_error: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE files SET status = ?, last_error = ? WHERE id = ?",
                params![status.as_str(), last_error, id],
            )
            .map_err(StorageError::from)?;
            Ok(())
        })
    }

    /// Marks a file indexed with its page count and extraction timestamp.
    pub fn set_file_indexed(&self, id: i64, pages: usize) -> Result<()> {
        let extracted_at = chrono::Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                r"UPDATE files
                  SET status = 'indexed', pages = ?, extracted_at = ?, last_error = NULL
                  WHERE id = ?",
                params![pages as i64, extracted_at, id],
            )
            .map_err(StorageError::from)?;
            Ok(())
        })
    }

    /// Toggles the public-read flag; returns the new value.
    pub fn toggle_public(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let current: Option<i64> = conn
                .query_row(
                    "SELECT public_read FROM files WHERE id = ?",
                    params![id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(StorageError::from)?;
            let Some(current) = current else {
                return Err(StorageError::FileNotFound {
                    identifier: id.to_string(),
                }
                .into());
            };
            let new_value = current == 0;
            conn.execute(
                "UPDATE files SET public_read = ? WHERE id = ?",
                params![i64::from(new_value), id],
            )
            .map_err(StorageError::from)?;
            Ok(new_value)
        })
    }

    /// Updates the descriptive metadata of a file.
    #[allow(clippy::too_many_arguments)]
    pub fn set_file_metadata(
        &self,
        id: i64,
        employer_name: Option<&str>,
        union_local: Option<&str>,
        effective_date: Option<&str>,
        expiry_date: Option<&str>,
        region: Option<&str>,
        short_name: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn
                .execute(
                    r"UPDATE files
                      SET employer_name = ?, union_local = ?, effective_date = ?,
                          expiry_date = ?, region = ?, short_name = ?
                      WHERE id = ?",
                    params![
                        employer_name,
                        union_local,
                        effective_date,
                        expiry_date,
                        region,
                        short_name,
                        id
                    ],
                )
                .map_err(StorageError::from)?;
            if updated == 0 {
                return Err(StorageError::FileNotFound {
                    identifier: id.to_string(),
                }
                .into());
            }
            Ok(())
        })
    }

    // ==================== Indexing write path ====================

    /// Replaces all derived content for a file in one transaction: deletes
    /// prior pages/chunks/tables/FTS/vector rows, then inserts the new
    /// pages (with page FTS), tables, and chunks (with chunk FTS).
    ///
    /// Returns (pages inserted, chunks inserted).
    pub fn replace_file_content(
        &self,
        file_id: i64,
        pages: &[PageText],
        tables: &[TableData],
        chunks: &[DocumentChunk],
    ) -> Result<(usize, usize)> {
        self.with_tx(|tx| {
            for sql in [
                "DELETE FROM pdf_pages WHERE file_id = ?",
                "DELETE FROM page_fts WHERE file_id = ?",
                "DELETE FROM document_chunks WHERE file_id = ?",
                "DELETE FROM chunk_fts WHERE file_id = ?",
                "DELETE FROM document_tables WHERE file_id = ?",
                "DELETE FROM vector_entries WHERE file_id = ?",
            ] {
                tx.execute(sql, params![file_id]).map_err(StorageError::from)?;
            }

            for page in pages {
                tx.execute(
                    "INSERT INTO pdf_pages (file_id, page_number, text, raw_text) VALUES (?, ?, ?, ?)",
                    params![file_id, page.page_number, page.text, page.raw_text],
                )
                .map_err(StorageError::from)?;
                let page_id = tx.last_insert_rowid();
                tx.execute(
                    "INSERT INTO page_fts (file_id, page_id, page_number, text) VALUES (?, ?, ?, ?)",
                    params![file_id, page_id, page.page_number, page.text],
                )
                .map_err(StorageError::from)?;
            }

            for table in tables {
                tx.execute(
                    r"INSERT INTO document_tables
                      (file_id, page_number, table_index, headers_json, rows_json,
                       markdown_text, context_heading, is_wage_table)
                      VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        file_id,
                        table.page_number,
                        table.table_index,
                        serde_json::to_string(&table.headers).map_err(StorageError::from)?,
                        serde_json::to_string(&table.rows).map_err(StorageError::from)?,
                        table.markdown_text,
                        table.context_heading,
                        i64::from(table.is_wage_table),
                    ],
                )
                .map_err(StorageError::from)?;
            }

            for chunk in chunks {
                let headings_json = if chunk.headings_in_chunk.is_empty() {
                    None
                } else {
                    Some(serde_json::to_string(&chunk.headings_in_chunk).map_err(StorageError::from)?)
                };
                tx.execute(
                    r"INSERT INTO document_chunks
                      (file_id, chunk_number, text, heading, parent_heading,
                       section_number, page_start, page_end, headings_json, chunk_type)
                      VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        file_id,
                        chunk.chunk_number,
                        chunk.text,
                        chunk.heading,
                        chunk.parent_heading,
                        chunk.section_number,
                        chunk.page_start,
                        chunk.page_end,
                        headings_json,
                        chunk.chunk_type.as_str(),
                    ],
                )
                .map_err(StorageError::from)?;
                let chunk_id = tx.last_insert_rowid();
                tx.execute(
                    "INSERT INTO chunk_fts (file_id, chunk_id, heading, text) VALUES (?, ?, ?, ?)",
                    params![
                        file_id,
                        chunk_id,
                        chunk.heading.as_deref().unwrap_or(""),
                        chunk.text
                    ],
                )
                .map_err(StorageError::from)?;
            }

            Ok((pages.len(), chunks.len()))
        })
    }

    // ==================== Page operations ====================

    /// Counts stored pages for a file.
    pub fn page_count(&self, file_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM pdf_pages WHERE file_id = ?",
                    params![file_id],
                    |row| row.get(0),
                )
                .map_err(StorageError::from)?;
            Ok(count as usize)
        })
    }

    /// Counts page FTS rows for a file.
    pub fn fts_page_count(&self, file_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM page_fts WHERE file_id = ?",
                    params![file_id],
                    |row| row.get(0),
                )
                .map_err(StorageError::from)?;
            Ok(count as usize)
        })
    }

    /// Fetches the cleaned text of a specific page.
    pub fn get_page_text(&self, file_id: i64, page_number: u32) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT text FROM pdf_pages WHERE file_id = ? AND page_number = ?",
                params![file_id, page_number],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StorageError::from(e).into())
        })
    }

    /// Fetches all pages of a document as (page number, cleaned text).
    pub fn get_document_pages(&self, file_id: i64) -> Result<Vec<(u32, String)>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT page_number, text FROM pdf_pages WHERE file_id = ? ORDER BY page_number",
                )
                .map_err(StorageError::from)?;
            let pages = stmt
                .query_map(params![file_id], |row| {
                    Ok((row.get::<_, i64>(0)? as u32, row.get(1)?))
                })
                .map_err(StorageError::from)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StorageError::from)?;
            Ok(pages)
        })
    }

    // ==================== Chunk operations ====================

    fn row_to_stored_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredChunk> {
        let headings_json: Option<String> = row.get(12)?;
        let headings = headings_json
            .and_then(|j| serde_json::from_str(&j).ok())
            .unwrap_or_default();
        Ok(StoredChunk {
            id: row.get(0)?,
            file_id: row.get(1)?,
            filename: row.get(2)?,
            file_path: row.get(3)?,
            chunk_number: row.get::<_, i64>(4)? as u32,
            text: row.get(5)?,
            heading: row.get(6)?,
            parent_heading: row.get(7)?,
            section_number: row.get(8)?,
            page_start: row.get::<_, i64>(9)? as u32,
            page_end: row.get::<_, i64>(10)? as u32,
            chunk_type: ChunkType::parse(&row.get::<_, Option<String>>(11)?.unwrap_or_default()),
            headings,
        })
    }

    const CHUNK_COLS: &'static str = "c.id, c.file_id, f.filename, f.path, c.chunk_number, \
        c.text, c.heading, c.parent_heading, c.section_number, c.page_start, c.page_end, \
        c.chunk_type, c.headings_json";

    /// Fetches one chunk with its file context.
    pub fn get_chunk(&self, chunk_id: i64) -> Result<Option<StoredChunk>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM document_chunks c JOIN files f ON c.file_id = f.id WHERE c.id = ?",
                    Self::CHUNK_COLS
                ),
                params![chunk_id],
                Self::row_to_stored_chunk,
            )
            .optional()
            .map_err(|e| StorageError::from(e).into())
        })
    }

    /// Fetches all chunks of a file in sequence order.
    pub fn chunks_for_file(&self, file_id: i64) -> Result<Vec<StoredChunk>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM document_chunks c JOIN files f ON c.file_id = f.id \
                     WHERE c.file_id = ? ORDER BY c.chunk_number",
                    Self::CHUNK_COLS
                ))
                .map_err(StorageError::from)?;
            let chunks = stmt
                .query_map(params![file_id], Self::row_to_stored_chunk)
                .map_err(StorageError::from)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StorageError::from)?;
            Ok(chunks)
        })
    }

    /// Counts chunks for a file.
    pub fn chunk_count(&self, file_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM document_chunks WHERE file_id = ?",
                    params![file_id],
                    |row| row.get(0),
                )
                .map_err(StorageError::from)?;
            Ok(count as usize)
        })
    }

    /// Fetches indexed chunks across all indexed files, for rebuilds.
    pub fn all_indexed_chunks(&self) -> Result<Vec<StoredChunk>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM document_chunks c JOIN files f ON c.file_id = f.id \
                     WHERE f.status = 'indexed' AND length(c.text) > 0 \
                     ORDER BY c.file_id, c.chunk_number",
                    Self::CHUNK_COLS
                ))
                .map_err(StorageError::from)?;
            let chunks = stmt
                .query_map([], Self::row_to_stored_chunk)
                .map_err(StorageError::from)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StorageError::from)?;
            Ok(chunks)
        })
    }

    /// Fetches indexed pages across all indexed files, for rebuilds:
    /// (page id, file id, page number, text, filename, path).
    #[allow(clippy::type_complexity)]
    pub fn all_indexed_pages(&self) -> Result<Vec<(i64, i64, u32, String, String, String)>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT p.id, p.file_id, p.page_number, p.text, f.filename, f.path \
                     FROM pdf_pages p JOIN files f ON p.file_id = f.id \
                     WHERE f.status = 'indexed' AND length(p.text) > 0 \
                     ORDER BY p.file_id, p.page_number",
                )
                .map_err(StorageError::from)?;
            let pages = stmt
                .query_map([], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get::<_, i64>(2)? as u32,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                })
                .map_err(StorageError::from)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StorageError::from)?;
            Ok(pages)
        })
    }

    // ==================== Table operations ====================

    fn row_to_stored_table(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredTable> {
        let headers_json: Option<String> = row.get(6)?;
        let rows_json: Option<String> = row.get(7)?;
        Ok(StoredTable {
            id: row.get(0)?,
            file_id: row.get(1)?,
            filename: row.get(2)?,
            file_path: row.get(3)?,
            page_number: row.get::<_, i64>(4)? as u32,
            table_index: row.get::<_, i64>(5)? as u32,
            headers: headers_json
                .and_then(|j| serde_json::from_str(&j).ok())
                .unwrap_or_default(),
            rows: rows_json
                .and_then(|j| serde_json::from_str(&j).ok())
                .unwrap_or_default(),
            markdown_text: row.get(8)?,
            context_heading: row.get(9)?,
            is_wage_table: row.get::<_, i64>(10)? != 0,
        })
    }

    /// Fetches wage tables, optionally scoped to one file.
    pub fn wage_tables(&self, file_id: Option<i64>, limit: usize) -> Result<Vec<StoredTable>> {
        self.with_conn(|conn| {
            let sql_base = "SELECT dt.id, dt.file_id, f.filename, f.path, dt.page_number, \
                 dt.table_index, dt.headers_json, dt.rows_json, dt.markdown_text, \
                 dt.context_heading, dt.is_wage_table \
                 FROM document_tables dt JOIN files f ON dt.file_id = f.id \
                 WHERE dt.is_wage_table = 1";
            let tables = if let Some(fid) = file_id {
                let mut stmt = conn
                    .prepare(&format!(
                        "{sql_base} AND dt.file_id = ? ORDER BY dt.page_number LIMIT ?"
                    ))
                    .map_err(StorageError::from)?;
                let result = stmt
                    .query_map(params![fid, limit as i64], Self::row_to_stored_table)
                    .map_err(StorageError::from)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(StorageError::from)?;
                result
            } else {
                let mut stmt = conn
                    .prepare(&format!("{sql_base} ORDER BY dt.page_number LIMIT ?"))
                    .map_err(StorageError::from)?;
                let result = stmt
                    .query_map(params![limit as i64], Self::row_to_stored_table)
                    .map_err(StorageError::from)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(StorageError::from)?;
                result
            };
            Ok(tables)
        })
    }

    // ==================== FTS search ====================

    /// Runs an FTS5 MATCH over page text, returning ranked hits.
    ///
    /// Malformed MATCH expressions log a warning and yield an empty list;
    /// "no match" is never an error.
    pub fn search_page_fts(
        &self,
        fts_query: &str,
        limit: usize,
        file_id: Option<i64>,
    ) -> Result<Vec<SearchResult>> {
        let run = self.with_conn(|conn| {
            let base = r"
                SELECT f.id AS file_id, f.path, f.filename, page_fts.page_number,
                       snippet(page_fts, 3, '<mark>', '</mark>', '...', 64) AS snippet,
                       rank
                FROM page_fts
                JOIN pdf_pages p ON page_fts.page_id = p.id
                JOIN files f ON p.file_id = f.id
                WHERE page_fts MATCH ?";
            let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<SearchResult> {
                Ok(SearchResult {
                    file_id: row.get(0)?,
                    file_path: row.get(1)?,
                    filename: row.get(2)?,
                    page_number: row.get::<_, i64>(3)? as u32,
                    snippet: row.get(4)?,
                    score: row.get::<_, f64>(5)?.abs(),
                })
            };
            let rows = if let Some(fid) = file_id {
                let mut stmt = conn
                    .prepare(&format!("{base} AND f.id = ? ORDER BY rank LIMIT ?"))
                    .map_err(StorageError::from)?;
                let result = stmt
                    .query_map(params![fts_query, fid, limit as i64], map_row)
                    .map_err(StorageError::from)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(StorageError::from)?;
                result
            } else {
                let mut stmt = stmt_or_err(conn, &format!("{base} ORDER BY rank LIMIT ?"))?;
                let result = stmt
                    .query_map(params![fts_query, limit as i64], map_row)
                    .map_err(StorageError::from)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(StorageError::from)?;
                result
            };
            Ok(rows)
        });

        match run {
            Ok(rows) => Ok(rows),
            Err(e) => {
                warn!(error = %e, query = fts_query, "page FTS search error");
                Ok(Vec::new())
            }
        }
    }

    /// Runs an FTS5 MATCH over chunk text and headings, returning ranked
    /// hits with structural context. Malformed queries yield an empty list.
    pub fn search_chunk_fts(
        &self,
        fts_query: &str,
        limit: usize,
        file_id: Option<i64>,
    ) -> Result<Vec<ChunkHit>> {
        let run = self.with_conn(|conn| {
            let base = r"
                SELECT f.id AS file_id, f.path, f.filename, c.id AS chunk_id,
                       c.heading, c.parent_heading, c.section_number,
                       c.page_start, c.page_end,
                       snippet(chunk_fts, 3, '<mark>', '</mark>', '...', 64) AS snippet,
                       rank
                FROM chunk_fts
                JOIN document_chunks c ON chunk_fts.chunk_id = c.id
                JOIN files f ON c.file_id = f.id
                WHERE chunk_fts MATCH ?";
            let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<ChunkHit> {
                Ok(ChunkHit {
                    file_id: row.get(0)?,
                    file_path: row.get(1)?,
                    filename: row.get(2)?,
                    chunk_id: row.get(3)?,
                    heading: row.get(4)?,
                    parent_heading: row.get(5)?,
                    section_number: row.get(6)?,
                    page_start: row.get::<_, i64>(7)? as u32,
                    page_end: row.get::<_, i64>(8)? as u32,
                    snippet: row.get(9)?,
                    score: row.get::<_, f64>(10)?.abs(),
                })
            };
            let rows = if let Some(fid) = file_id {
                let mut stmt = conn
                    .prepare(&format!("{base} AND f.id = ? ORDER BY rank LIMIT ?"))
                    .map_err(StorageError::from)?;
                let result = stmt
                    .query_map(params![fts_query, fid, limit as i64], map_row)
                    .map_err(StorageError::from)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(StorageError::from)?;
                result
            } else {
                let mut stmt = stmt_or_err(conn, &format!("{base} ORDER BY rank LIMIT ?"))?;
                let result = stmt
                    .query_map(params![fts_query, limit as i64], map_row)
                    .map_err(StorageError::from)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(StorageError::from)?;
                result
            };
            Ok(rows)
        });

        match run {
            Ok(rows) => Ok(rows),
            Err(e) => {
                warn!(error = %e, query = fts_query, "chunk FTS search error");
                Ok(Vec::new())
            }
        }
    }

    /// Rebuilds both FTS indexes from the entity tables. Returns the number
    /// of page rows indexed.
    pub fn rebuild_fts(&self) -> Result<usize> {
        self.with_tx(|tx| {
            tx.execute("DELETE FROM page_fts", [])
                .map_err(StorageError::from)?;
            tx.execute("DELETE FROM chunk_fts", [])
                .map_err(StorageError::from)?;

            let pages = tx
                .execute(
                    r"INSERT INTO page_fts (file_id, page_id, page_number, text)
                      SELECT p.file_id, p.id, p.page_number, p.text
                      FROM pdf_pages p JOIN files f ON p.file_id = f.id
                      WHERE f.status = 'indexed'",
                    [],
                )
                .map_err(StorageError::from)?;

            tx.execute(
                r"INSERT INTO chunk_fts (file_id, chunk_id, heading, text)
                  SELECT c.file_id, c.id, COALESCE(c.heading, ''), c.text
                  FROM document_chunks c JOIN files f ON c.file_id = f.id
                  WHERE f.status = 'indexed'",
                [],
            )
            .map_err(StorageError::from)?;

            Ok(pages)
        })
    }

    // ==================== LIKE fallbacks ====================

    /// Substring search over page text. Returns hits plus the full page
    /// text so the caller can re-filter on word boundaries.
    pub fn like_search_pages(
        &self,
        keywords: &[String],
        file_id: Option<i64>,
        fetch_limit: usize,
    ) -> Result<Vec<(SearchResult, String)>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| {
            let conditions: Vec<&str> = keywords.iter().map(|_| "p.text LIKE ?").collect();
            let where_clause = conditions.join(" OR ");
            let scope = if file_id.is_some() { "AND f.id = ?" } else { "" };
            let sql = format!(
                r"SELECT f.id AS file_id, f.path, f.filename, p.page_number, p.text
                  FROM pdf_pages p JOIN files f ON p.file_id = f.id
                  WHERE f.status = 'indexed' {scope} AND ({where_clause})
                  ORDER BY f.filename, p.page_number
                  LIMIT ?"
            );

            let mut stmt = conn.prepare(&sql).map_err(StorageError::from)?;
            let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
            if let Some(fid) = file_id {
                values.push(Box::new(fid));
            }
            for kw in keywords {
                values.push(Box::new(format!("%{kw}%")));
            }
            values.push(Box::new(fetch_limit as i64));

            let params_ref: Vec<&dyn rusqlite::types::ToSql> =
                values.iter().map(std::convert::AsRef::as_ref).collect();

            let rows = stmt
                .query_map(params_ref.as_slice(), |row| {
                    let text: String = row.get(4)?;
                    Ok((
                        SearchResult {
                            file_id: row.get(0)?,
                            file_path: row.get(1)?,
                            filename: row.get(2)?,
                            page_number: row.get::<_, i64>(3)? as u32,
                            snippet: text.chars().take(200).collect(),
                            score: 1.0,
                        },
                        text,
                    ))
                })
                .map_err(StorageError::from)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StorageError::from)?;
            Ok(rows)
        })
    }

    /// Heuristic fallback for wage queries: pages that mention `$` together
    /// with rate-schedule vocabulary, optionally scoped to one file.
    pub fn money_pages(&self, file_id: Option<i64>, limit: usize) -> Result<Vec<SearchResult>> {
        self.with_conn(|conn| {
            let scope = if file_id.is_some() { "AND f.id = ?" } else { "" };
            let sql = format!(
                r"SELECT f.id AS file_id, f.path, f.filename, p.page_number, p.text
                  FROM pdf_pages p JOIN files f ON p.file_id = f.id
                  WHERE f.status = 'indexed' {scope} AND p.text LIKE '%$%'
                    AND (p.text LIKE '%hour%' OR p.text LIKE '%annual%'
                         OR p.text LIKE '%biweekly%' OR p.text LIKE '%Appendix%'
                         OR p.text LIKE '%Schedule%')
                  ORDER BY f.filename, p.page_number
                  LIMIT ?"
            );
            let mut stmt = conn.prepare(&sql).map_err(StorageError::from)?;
            let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<SearchResult> {
                let text: String = row.get(4)?;
                Ok(SearchResult {
                    file_id: row.get(0)?,
                    file_path: row.get(1)?,
                    filename: row.get(2)?,
                    page_number: row.get::<_, i64>(3)? as u32,
                    snippet: text.chars().take(200).collect(),
                    score: 2.0,
                })
            };
            let rows = if let Some(fid) = file_id {
                stmt.query_map(params![fid, limit as i64], map_row)
                    .map_err(StorageError::from)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(StorageError::from)?
            } else {
                stmt.query_map(params![limit as i64], map_row)
                    .map_err(StorageError::from)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(StorageError::from)?
            };
            Ok(rows)
        })
    }

    // ==================== Synonym overlay ====================

    /// Loads the custom synonym overlay.
    pub fn custom_synonyms(&self) -> Result<BTreeMap<String, Vec<String>>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT canonical_term, synonyms FROM custom_synonyms")
                .map_err(StorageError::from)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(StorageError::from)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StorageError::from)?;

            let mut result = BTreeMap::new();
            for (canonical, json) in rows {
                if let Ok(synonyms) = serde_json::from_str::<Vec<String>>(&json) {
                    result.insert(canonical.to_lowercase(), synonyms);
                }
            }
            Ok(result)
        })
    }

    /// Saves custom synonyms. With `replace`, the existing overlay is
    /// cleared first. Returns the number of terms written.
    pub fn save_custom_synonyms(
        &self,
        synonyms: &BTreeMap<String, Vec<String>>,
        replace: bool,
    ) -> Result<usize> {
        self.with_tx(|tx| {
            if replace {
                tx.execute("DELETE FROM custom_synonyms", [])
                    .map_err(StorageError::from)?;
            }
            let mut count = 0;
            for (canonical, syns) in synonyms {
                let canonical = canonical.to_lowercase();
                let syns: Vec<String> = syns
                    .iter()
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect();
                if syns.is_empty() {
                    continue;
                }
                tx.execute(
                    r"INSERT INTO custom_synonyms (canonical_term, synonyms, updated_at)
                      VALUES (?, ?, datetime('now'))
                      ON CONFLICT(canonical_term) DO UPDATE SET
                      synonyms = excluded.synonyms,
                      updated_at = datetime('now')",
                    params![canonical, serde_json::to_string(&syns).map_err(StorageError::from)?],
                )
                .map_err(StorageError::from)?;
                count += 1;
            }
            Ok(count)
        })
    }

    /// Deletes one custom synonym term. Returns whether a row was removed.
    pub fn delete_custom_synonym(&self, canonical_term: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM custom_synonyms WHERE canonical_term = ?",
                    params![canonical_term.to_lowercase()],
                )
                .map_err(StorageError::from)?;
            Ok(deleted > 0)
        })
    }

    // ==================== Vector collection ====================

    /// Upserts a batch of vector entries in one transaction.
    pub fn upsert_vector_entries(&self, entries: &[VectorEntry]) -> Result<()> {
        self.with_tx(|tx| {
            let mut stmt = tx
                .prepare(
                    r"INSERT OR REPLACE INTO vector_entries
                      (id, file_id, chunk_id, page_id, page_number, page_start, page_end,
                       filename, file_path, heading, is_page, document, embedding,
                       dimensions, model_name)
                      VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .map_err(StorageError::from)?;
            for entry in entries {
                stmt.execute(params![
                    entry.id,
                    entry.file_id,
                    entry.chunk_id,
                    entry.page_id,
                    entry.page_number,
                    entry.page_start,
                    entry.page_end,
                    entry.filename,
                    entry.file_path,
                    entry.heading,
                    i64::from(entry.is_page),
                    entry.document,
                    encode_embedding(&entry.embedding),
                    entry.embedding.len() as i64,
                    entry.model_name,
                ])
                .map_err(StorageError::from)?;
            }
            Ok(())
        })
    }

    /// Deletes every vector entry of a file. Returns rows removed.
    pub fn delete_file_vectors(&self, file_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn
                .execute(
                    "DELETE FROM vector_entries WHERE file_id = ?",
                    params![file_id],
                )
                .map_err(StorageError::from)?;
            Ok(removed)
        })
    }

    /// Clears the whole vector collection.
    pub fn clear_vectors(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM vector_entries", [])
                .map_err(StorageError::from)?;
            Ok(())
        })
    }

    /// Fetches vector entries, optionally scoped by file and restricted to
    /// chunk entries.
    pub fn vector_entries(
        &self,
        file_id: Option<i64>,
        chunks_only: bool,
    ) -> Result<Vec<VectorEntry>> {
        self.with_conn(|conn| {
            let mut sql = String::from(
                "SELECT id, file_id, chunk_id, page_id, page_number, page_start, page_end, \
                 filename, file_path, heading, is_page, document, embedding, model_name \
                 FROM vector_entries WHERE 1=1",
            );
            if file_id.is_some() {
                sql.push_str(" AND file_id = ?");
            }
            if chunks_only {
                sql.push_str(" AND is_page = 0");
            }

            let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<VectorEntry> {
                Ok(VectorEntry {
                    id: row.get(0)?,
                    file_id: row.get(1)?,
                    chunk_id: row.get(2)?,
                    page_id: row.get(3)?,
                    page_number: row.get::<_, i64>(4)? as u32,
                    page_start: row.get::<_, i64>(5)? as u32,
                    page_end: row.get::<_, i64>(6)? as u32,
                    filename: row.get(7)?,
                    file_path: row.get(8)?,
                    heading: row.get(9)?,
                    is_page: row.get::<_, i64>(10)? != 0,
                    document: row.get(11)?,
                    embedding: decode_embedding(&row.get::<_, Vec<u8>>(12)?),
                    model_name: row.get(13)?,
                })
            };

            let mut stmt = conn.prepare(&sql).map_err(StorageError::from)?;
            let rows = if let Some(fid) = file_id {
                stmt.query_map(params![fid], map_row)
                    .map_err(StorageError::from)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(StorageError::from)?
            } else {
                stmt.query_map([], map_row)
                    .map_err(StorageError::from)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(StorageError::from)?
            };
            Ok(rows)
        })
    }

    /// Counts vector entries.
    pub fn vector_count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM vector_entries", [], |row| row.get(0))
                .map_err(StorageError::from)?;
            Ok(count as usize)
        })
    }

    // ==================== Stats ====================

    /// Aggregate statistics for diagnostics.
    pub fn stats(&self) -> Result<DbStats> {
        let schema_version = self.schema_version()?;
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<usize> {
                let n: i64 = conn
                    .query_row(sql, [], |row| row.get(0))
                    .map_err(StorageError::from)?;
                Ok(n as usize)
            };
            Ok(DbStats {
                total_files: count("SELECT COUNT(*) FROM files")?,
                indexed_files: count("SELECT COUNT(*) FROM files WHERE status = 'indexed'")?,
                error_files: count("SELECT COUNT(*) FROM files WHERE status = 'error'")?,
                total_pages: count("SELECT COUNT(*) FROM pdf_pages")?,
                total_chunks: count("SELECT COUNT(*) FROM document_chunks")?,
                vector_entries: count("SELECT COUNT(*) FROM vector_entries")?,
                schema_version,
            })
        })
    }
}

fn stmt_or_err<'a>(conn: &'a Connection, sql: &str) -> Result<rusqlite::Statement<'a>> {
    conn.prepare(sql).map_err(|e| StorageError::from(e).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Store {
        let store = Store::in_memory().unwrap();
        store.init().unwrap();
        store
    }

    fn add_file(store: &Store, path: &str) -> i64 {
        store
            .insert_file(path, path.rsplit('/').next().unwrap(), "hash", 0.0, 100)
            .unwrap()
    }

    fn page(number: u32, text: &str) -> PageText {
        PageText {
            page_number: number,
            text: text.to_string(),
            raw_text: text.to_string(),
        }
    }

    #[test]
    fn test_init_idempotent() {
        let store = Store::in_memory().unwrap();
        store.init().unwrap();
        store.init().unwrap();
        assert_eq!(store.schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_file_crud() {
        let store = setup();
        let id = add_file(&store, "/tmp/a.pdf");
        assert!(id > 0);

        let file = store.get_file(id).unwrap().unwrap();
        assert_eq!(file.filename, "a.pdf");
        assert_eq!(file.status, FileStatus::Pending);
        assert!(!file.public_read);

        let by_path = store.get_file_by_path("/tmp/a.pdf").unwrap().unwrap();
        assert_eq!(by_path.id, id);

        store
            .set_file_status(id, FileStatus::Error, Some("boom"))
            .unwrap();
        let file = store.get_file(id).unwrap().unwrap();
        assert_eq!(file.status, FileStatus::Error);
        assert_eq!(file.last_error.as_deref(), Some("boom"));

        store.set_file_indexed(id, 3).unwrap();
        let file = store.get_file(id).unwrap().unwrap();
        assert_eq!(file.status, FileStatus::Indexed);
        assert_eq!(file.pages, Some(3));
        assert!(file.extracted_at.is_some());
        assert!(file.last_error.is_none());

        store.delete_file(id).unwrap();
        assert!(store.get_file(id).unwrap().is_none());
    }

    #[test]
    fn test_toggle_public() {
        let store = setup();
        let id = add_file(&store, "/tmp/a.pdf");
        assert!(store.toggle_public(id).unwrap());
        assert!(!store.toggle_public(id).unwrap());
    }

    #[test]
    fn test_toggle_public_missing_file() {
        let store = setup();
        assert!(store.toggle_public(999).is_err());
    }

    #[test]
    fn test_replace_file_content_and_fts() {
        let store = setup();
        let id = add_file(&store, "/tmp/a.pdf");

        let pages = vec![
            page(1, "Employees are entitled to sick leave benefits."),
            page(2, "Overtime is paid at time and one half."),
        ];
        let (page_count, chunk_count) = store.replace_file_content(id, &pages, &[], &[]).unwrap();
        assert_eq!(page_count, 2);
        assert_eq!(chunk_count, 0);

        store.set_file_indexed(id, 2).unwrap();
        assert_eq!(store.page_count(id).unwrap(), 2);
        assert_eq!(store.fts_page_count(id).unwrap(), 2);

        let hits = store.search_page_fts("sick*", 10, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].page_number, 1);
        assert!(hits[0].snippet.contains("<mark>"));
    }

    #[test]
    fn test_replace_file_content_idempotent() {
        let store = setup();
        let id = add_file(&store, "/tmp/a.pdf");
        let pages = vec![page(1, "sick leave text")];

        store.replace_file_content(id, &pages, &[], &[]).unwrap();
        store.replace_file_content(id, &pages, &[], &[]).unwrap();

        assert_eq!(store.page_count(id).unwrap(), 1);
        assert_eq!(store.fts_page_count(id).unwrap(), 1);
    }

    #[test]
    fn test_chunk_storage() {
        let store = setup();
        let id = add_file(&store, "/tmp/a.pdf");
        let chunks = vec![DocumentChunk {
            chunk_number: 1,
            text: "Article 5 sick leave provisions text".to_string(),
            heading: Some("Article 5 — Sick Time".to_string()),
            parent_heading: None,
            section_number: Some("5".to_string()),
            page_start: 1,
            page_end: 2,
            headings_in_chunk: vec!["Article 5 — Sick Time".to_string()],
            chunk_type: crate::chunking::ChunkType::Text,
        }];
        store
            .replace_file_content(id, &[page(1, "x"), page(2, "y")], &[], &chunks)
            .unwrap();

        let stored = store.chunks_for_file(id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].heading.as_deref(), Some("Article 5 — Sick Time"));
        assert_eq!(stored[0].page_start, 1);
        assert_eq!(stored[0].page_end, 2);

        let fetched = store.get_chunk(stored[0].id).unwrap().unwrap();
        assert_eq!(fetched.text, stored[0].text);

        let hits = store.search_chunk_fts("sick*", 10, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].heading.as_deref(), Some("Article 5 — Sick Time"));
    }

    #[test]
    fn test_fts_search_bad_query_returns_empty() {
        let store = setup();
        let hits = store.search_page_fts("AND OR ((", 10, None).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_cascade_delete() {
        let store = setup();
        let id = add_file(&store, "/tmp/a.pdf");
        store
            .replace_file_content(id, &[page(1, "text")], &[], &[])
            .unwrap();
        store.delete_file(id).unwrap();

        assert_eq!(store.page_count(id).unwrap(), 0);
        assert_eq!(store.fts_page_count(id).unwrap(), 0);
    }

    #[test]
    fn test_wage_tables() {
        let store = setup();
        let id = add_file(&store, "/tmp/a.pdf");
        let tables = vec![TableData {
            page_number: 4,
            table_index: 0,
            headers: vec!["Step".to_string(), "Rate".to_string()],
            rows: vec![vec!["1".to_string(), "$25.00".to_string()]],
            markdown_text: "| Step | Rate |".to_string(),
            context_heading: Some("SCHEDULE A".to_string()),
            is_wage_table: true,
        }];
        store
            .replace_file_content(id, &[page(1, "x")], &tables, &[])
            .unwrap();

        let wage = store.wage_tables(None, 5).unwrap();
        assert_eq!(wage.len(), 1);
        assert_eq!(wage[0].page_number, 4);
        assert_eq!(wage[0].headers, vec!["Step", "Rate"]);

        let scoped = store.wage_tables(Some(id + 1), 5).unwrap();
        assert!(scoped.is_empty());
    }

    #[test]
    fn test_rebuild_fts_round_trip() {
        let store = setup();
        let id = add_file(&store, "/tmp/a.pdf");
        store
            .replace_file_content(id, &[page(1, "grievance procedure text")], &[], &[])
            .unwrap();
        store.set_file_indexed(id, 1).unwrap();

        let before = store.search_page_fts("grievance*", 10, None).unwrap();
        let rebuilt = store.rebuild_fts().unwrap();
        assert_eq!(rebuilt, 1);
        let after = store.search_page_fts("grievance*", 10, None).unwrap();

        assert_eq!(before.len(), after.len());
        assert_eq!(before[0].page_number, after[0].page_number);
    }

    #[test]
    fn test_like_search() {
        let store = setup();
        let id = add_file(&store, "/tmp/a.pdf");
        store
            .replace_file_content(id, &[page(1, "the bereavement leave policy")], &[], &[])
            .unwrap();
        store.set_file_indexed(id, 1).unwrap();

        let rows = store
            .like_search_pages(&["bereavement".to_string()], None, 10)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].1.contains("bereavement"));
    }

    #[test]
    fn test_money_pages() {
        let store = setup();
        let id = add_file(&store, "/tmp/a.pdf");
        store
            .replace_file_content(
                id,
                &[page(1, "Schedule A rates: $25.00 per hour effective May 1")],
                &[],
                &[],
            )
            .unwrap();
        store.set_file_indexed(id, 1).unwrap();

        let rows = store.money_pages(None, 5).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(store.money_pages(Some(id + 1), 5).unwrap().is_empty());
    }

    #[test]
    fn test_custom_synonyms_round_trip() {
        let store = setup();
        let mut map = BTreeMap::new();
        map.insert(
            "sick leave".to_string(),
            vec!["sick credits".to_string(), "wellness days".to_string()],
        );

        let saved = store.save_custom_synonyms(&map, true).unwrap();
        assert_eq!(saved, 1);

        let loaded = store.custom_synonyms().unwrap();
        assert_eq!(loaded, map);

        assert!(store.delete_custom_synonym("sick leave").unwrap());
        assert!(!store.delete_custom_synonym("sick leave").unwrap());
        assert!(store.custom_synonyms().unwrap().is_empty());
    }

    #[test]
    fn test_save_custom_synonyms_replace() {
        let store = setup();
        let mut first = BTreeMap::new();
        first.insert("a".to_string(), vec!["b".to_string()]);
        store.save_custom_synonyms(&first, false).unwrap();

        let mut second = BTreeMap::new();
        second.insert("c".to_string(), vec!["d".to_string()]);
        store.save_custom_synonyms(&second, true).unwrap();

        let loaded = store.custom_synonyms().unwrap();
        assert_eq!(loaded, second);
    }

    #[test]
    fn test_vector_entries_round_trip() {
        let store = setup();
        let id = add_file(&store, "/tmp/a.pdf");
        store
            .replace_file_content(id, &[page(1, "text")], &[], &[])
            .unwrap();

        let entry = VectorEntry {
            id: format!("chunk_{id}_1"),
            file_id: id,
            chunk_id: Some(1),
            page_id: None,
            page_number: 1,
            page_start: 1,
            page_end: 2,
            filename: "a.pdf".to_string(),
            file_path: "/tmp/a.pdf".to_string(),
            heading: Some("Article 5".to_string()),
            is_page: false,
            document: "sick leave text".to_string(),
            embedding: vec![0.1, 0.2, 0.3],
            model_name: Some("test-model".to_string()),
        };
        store.upsert_vector_entries(&[entry.clone()]).unwrap();
        store.upsert_vector_entries(&[entry]).unwrap();
        assert_eq!(store.vector_count().unwrap(), 1);

        let entries = store.vector_entries(None, false).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].embedding, vec![0.1, 0.2, 0.3]);
        assert_eq!(entries[0].heading.as_deref(), Some("Article 5"));

        assert_eq!(store.delete_file_vectors(id).unwrap(), 1);
        assert_eq!(store.vector_count().unwrap(), 0);
    }

    #[test]
    fn test_vector_entries_chunks_only() {
        let store = setup();
        let id = add_file(&store, "/tmp/a.pdf");
        store
            .replace_file_content(id, &[page(1, "text")], &[], &[])
            .unwrap();

        let chunk_entry = VectorEntry {
            id: format!("chunk_{id}_1"),
            file_id: id,
            chunk_id: Some(1),
            page_id: None,
            page_number: 1,
            page_start: 1,
            page_end: 1,
            filename: "a.pdf".to_string(),
            file_path: "/tmp/a.pdf".to_string(),
            heading: None,
            is_page: false,
            document: "chunk text".to_string(),
            embedding: vec![1.0],
            model_name: None,
        };
        let mut page_entry = chunk_entry.clone();
        page_entry.id = format!("page_{id}_1");
        page_entry.chunk_id = None;
        page_entry.page_id = Some(1);
        page_entry.is_page = true;

        store
            .upsert_vector_entries(&[chunk_entry, page_entry])
            .unwrap();

        assert_eq!(store.vector_entries(None, false).unwrap().len(), 2);
        assert_eq!(store.vector_entries(None, true).unwrap().len(), 1);
    }

    #[test]
    fn test_embedding_codec() {
        let values = vec![0.5f32, -1.25, 3.75];
        assert_eq!(decode_embedding(&encode_embedding(&values)), values);
    }

    #[test]
    fn test_stats() {
        let store = setup();
        let id = add_file(&store, "/tmp/a.pdf");
        store
            .replace_file_content(id, &[page(1, "text")], &[], &[])
            .unwrap();
        store.set_file_indexed(id, 1).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.indexed_files, 1);
        assert_eq!(stats.total_pages, 1);
        assert_eq!(stats.schema_version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_migration_from_v1() {
        // Build a v1-era database by hand, then migrate
        let store = Store::in_memory().unwrap();
        store
            .with_tx(|tx| {
                tx.execute_batch(
                    r"CREATE TABLE schema_version (version INTEGER NOT NULL);
                      CREATE TABLE files (
                          id INTEGER PRIMARY KEY AUTOINCREMENT,
                          path TEXT UNIQUE NOT NULL,
                          filename TEXT NOT NULL,
                          sha256 TEXT NOT NULL,
                          mtime REAL NOT NULL,
                          size INTEGER NOT NULL,
                          status TEXT NOT NULL DEFAULT 'pending',
                          last_error TEXT,
                          pages INTEGER,
                          extracted_at TEXT,
                          created_at TEXT DEFAULT (datetime('now')),
                          public_read INTEGER NOT NULL DEFAULT 0
                      );
                      CREATE TABLE pdf_pages (
                          id INTEGER PRIMARY KEY AUTOINCREMENT,
                          file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                          page_number INTEGER NOT NULL,
                          text TEXT NOT NULL,
                          raw_text TEXT,
                          UNIQUE(file_id, page_number)
                      );
                      CREATE VIRTUAL TABLE page_fts USING fts5(
                          file_id UNINDEXED, page_id UNINDEXED, page_number UNINDEXED,
                          text, tokenize='porter unicode61'
                      );
                      INSERT INTO schema_version (version) VALUES (1);",
                )
                .map_err(StorageError::from)?;
                Ok(())
            })
            .unwrap();

        store.init().unwrap();
        assert_eq!(store.schema_version().unwrap(), CURRENT_SCHEMA_VERSION);

        // Migrated tables are usable
        let id = add_file(&store, "/tmp/a.pdf");
        store.set_file_metadata(id, None, None, None, None, None, Some("Example")).unwrap();
        let file = store.get_file(id).unwrap().unwrap();
        assert_eq!(file.short_name.as_deref(), Some("Example"));
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("app.db");
        let store = Store::open(&path).unwrap();
        store.init().unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), Some(path.as_path()));
    }
}
