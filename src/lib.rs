//! # casearch
//!
//! Hybrid retrieval and question-answering engine for collective
//! agreement PDFs.
//!
//! The engine ingests PDF documents (deterministic extraction, heading
//! detection, semantic chunking, table detection), maintains three
//! parallel indices (lexical FTS5, dense vectors, structured wage tables),
//! and answers questions by fusing parallel retrievers with weighted
//! Reciprocal Rank Fusion, calling an external LLM with evidence-grounded
//! prompts, and verifying the response against the cited sources.
//!
//! ## Subsystems
//!
//! - [`extract`]: structure-aware PDF extraction
//! - [`chunking`]: heading-driven semantic chunking with overlap
//! - [`storage`]: SQLite store with FTS5 and migrations
//! - [`search`]: lexical query parsing, FTS search, RRF fusion
//! - [`semantic`]: embeddings, vector collection, re-ranking, TF-IDF
//! - [`synonyms`]: term expansion and document-reference detection
//! - [`retrieval`]: parallel hybrid orchestration with staged fallback
//! - [`qa`]: classification, prompt assembly, the LLM call, verification
//! - [`indexer`]: the per-file ingest pipeline
//! - [`engine`]: the handle tying it all together

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]

pub mod chunking;
pub mod cli;
pub mod compare;
pub mod compare_ai;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod indexer;
pub mod models;
pub mod package;
pub mod qa;
pub mod retrieval;
pub mod scanner;
pub mod search;
pub mod semantic;
pub mod storage;
pub mod synonyms;

// Re-export the common surface at the crate root
pub use config::Settings;
pub use engine::Engine;
pub use error::{Error, Result};
pub use models::{
    Citation, Diagnostics, FileInfo, FileStatus, Hit, QAResponse, ScanReport, SearchResult,
};
pub use storage::Store;
