//! Error types for casearch operations.
//!
//! This module provides the error hierarchy using `thiserror` for all
//! engine operations including extraction, storage, retrieval, and the
//! LLM transport.

use thiserror::Error;

/// Result type alias for casearch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for engine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Storage-related errors (database operations).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// PDF extraction errors.
    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),

    /// Chunking errors (text segmentation).
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    /// LLM transport errors.
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    /// Index package errors (build/verify/install).
    #[error("package error: {0}")]
    Package(#[from] PackageError),

    /// I/O errors (file operations).
    #[error("I/O error: {0}")]
    Io(String),

    /// Configuration errors.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid state errors.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the invalid state.
        message: String,
    },
}

/// Storage-specific errors for database operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),

    /// File row not found by id or path.
    #[error("file not found: {identifier}")]
    FileNotFound {
        /// File id or path that was not found.
        identifier: String,
    },

    /// Chunk not found by id.
    #[error("chunk not found: {id}")]
    ChunkNotFound {
        /// Chunk id that was not found.
        id: i64,
    },

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Index content is inconsistent with the entity tables.
    ///
    /// Fatal for the current request; an admin rebuild is required.
    #[error("index corruption: {0}")]
    Corrupt(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Extraction errors raised by the PDF backend.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The file could not be opened or parsed at all.
    #[error("cannot read PDF: {reason}")]
    Unreadable {
        /// Reason reported by the backend.
        reason: String,
    },

    /// The document contains no pages.
    #[error("PDF has no pages: {path}")]
    Empty {
        /// Path to the offending file.
        path: String,
    },
}

/// Chunking-specific errors for text segmentation.
#[derive(Error, Debug)]
pub enum ChunkingError {
    /// Invalid chunk configuration.
    #[error("invalid chunk configuration: {reason}")]
    InvalidConfig {
        /// Reason the configuration is invalid.
        reason: String,
    },

    /// Overlap exceeds chunk size.
    #[error("overlap {overlap} must be less than chunk size {size}")]
    OverlapTooLarge {
        /// Overlap size.
        overlap: usize,
        /// Chunk size.
        size: usize,
    },

    /// Regex compilation error.
    #[error("regex error: {0}")]
    Regex(String),
}

/// Errors from the external LLM transport.
///
/// The Q&A layer converts each of these into a user-facing `QAResponse`
/// rather than propagating them to the caller.
#[derive(Error, Debug)]
pub enum LlmError {
    /// No API key configured.
    #[error("API key not configured")]
    MissingApiKey,

    /// Authentication failed (bad key).
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    /// Request timed out.
    #[error("request timed out after {seconds}s")]
    Timeout {
        /// Configured timeout in seconds.
        seconds: u64,
    },

    /// Any other transport or protocol failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body did not contain usable content.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Index package errors.
#[derive(Error, Debug)]
pub enum PackageError {
    /// The archive is missing a required member.
    #[error("package missing member: {name}")]
    MissingMember {
        /// Name of the missing archive member.
        name: String,
    },

    /// Checksum mismatch between archive and sidecar file.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Checksum recorded in the sidecar file.
        expected: String,
        /// Checksum computed over the archive.
        actual: String,
    },

    /// The package metadata is invalid.
    #[error("invalid package metadata: {0}")]
    InvalidMetadata(String),

    /// Archive read/write error.
    #[error("archive error: {0}")]
    Archive(String),
}

// Implement From traits for standard library and third-party errors

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Database(err.to_string()))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(StorageError::Serialization(err.to_string()))
    }
}

impl From<regex::Error> for ChunkingError {
    fn from(err: regex::Error) -> Self {
        Self::Regex(err.to_string())
    }
}

impl From<zip::result::ZipError> for PackageError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidState {
            message: "test error".to_string(),
        };
        assert_eq!(err.to_string(), "invalid state: test error");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::FileNotFound {
            identifier: "42".to_string(),
        };
        assert_eq!(err.to_string(), "file not found: 42");

        let err = StorageError::ChunkNotFound { id: 7 };
        assert_eq!(err.to_string(), "chunk not found: 7");
    }

    #[test]
    fn test_extract_error_display() {
        let err = ExtractError::Unreadable {
            reason: "bad xref".to_string(),
        };
        assert_eq!(err.to_string(), "cannot read PDF: bad xref");
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::Timeout { seconds: 60 };
        assert_eq!(err.to_string(), "request timed out after 60s");

        let err = LlmError::MissingApiKey;
        assert_eq!(err.to_string(), "API key not configured");
    }

    #[test]
    fn test_package_error_display() {
        let err = PackageError::ChecksumMismatch {
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert!(err.to_string().contains("aa"));
        assert!(err.to_string().contains("bb"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_from_storage() {
        let storage_err = StorageError::Database("locked".to_string());
        let err: Error = storage_err.into();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: Error = rusqlite_err.into();
        assert!(matches!(err, Error::Storage(StorageError::Database(_))));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err: serde_json::Error = match serde_json::from_str::<i32>("invalid") {
            Err(e) => e,
            Ok(_) => unreachable!(),
        };
        let err: StorageError = json_err.into();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[test]
    fn test_chunking_error_variants() {
        let err = ChunkingError::OverlapTooLarge {
            overlap: 300,
            size: 200,
        };
        assert!(err.to_string().contains("300"));
        assert!(err.to_string().contains("200"));
    }
}
