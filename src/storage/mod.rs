//! Relational store: files, pages, chunks, tables, synonyms, vectors.
//!
//! SQLite with FTS5 full-text indexes and a forward-only migration ladder.

pub mod schema;
mod sqlite;

pub use schema::{migrations_from, Migration, CURRENT_SCHEMA_VERSION, MIGRATIONS, SCHEMA_SQL};
pub use sqlite::{
    decode_embedding, encode_embedding, DbStats, Store, StoredChunk, StoredTable, VectorEntry,
    DEFAULT_DB_PATH,
};
