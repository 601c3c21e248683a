// src/error.rs

use thiserror::Error;

/// Core error types for yumsync
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),

    /// Repository manifest could not be decoded or violates its invariants
    #[error("Malformed repository manifest: {0}")]
    MalformedManifest(String),

    /// A remote file could not be fetched
    #[error("Failed to fetch {location}: {reason}")]
    TransportFailure { location: String, reason: String },

    /// Fetched bytes do not match the declared digest
    #[error("{kind} mismatch for '{data_type}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        data_type: String,
        kind: ChecksumKind,
        expected: String,
        actual: String,
    },

    /// The manifest declares a digest algorithm we cannot compute
    #[error("Unsupported checksum algorithm '{algorithm}' for '{data_type}'")]
    UnsupportedChecksum { data_type: String, algorithm: String },

    /// The local mirror could not be committed
    #[error("Failed to persist {path}: {reason}")]
    PersistFailure { path: String, reason: String },

    /// Invalid Yumfile
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Which of the two digests of a database entry failed verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    /// Digest over the compressed bytes as fetched
    Checksum,
    /// Digest over the decompressed bytes
    OpenChecksum,
}

impl std::fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChecksumKind::Checksum => write!(f, "checksum"),
            ChecksumKind::OpenChecksum => write!(f, "open-checksum"),
        }
    }
}

/// Result type alias using yumsync's Error type
pub type Result<T> = std::result::Result<T, Error>;
