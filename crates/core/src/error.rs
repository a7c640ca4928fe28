//! Error types for sc-core
//!
//! Provides a unified error type that can be converted to appropriate exit codes.
//! Transfer failures are wrapped in variants that carry the piece or session
//! context while keeping the underlying storage error as the source.

use std::fmt;

use thiserror::Error;

/// Result type alias for sc-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Stage of a multipart session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    Create,
    Complete,
    Abort,
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            SessionStage::Create => "create",
            SessionStage::Complete => "complete",
            SessionStage::Abort => "abort",
        };
        f.write_str(stage)
    }
}

/// Error types for sc-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid S3 URI or local path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Transfer job parameters rejected by the planner
    #[error("Invalid transfer job: {0}")]
    InvalidJob(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Authentication or permission failure
    #[error("Access denied: {0}")]
    Auth(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network error (retryable)
    #[error("Network error: {0}")]
    Network(String),

    /// Precondition or concurrent-modification failure reported by the server
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation not implemented by the storage backend
    #[error("Not supported: {0}")]
    Unsupported(String),

    /// Size lookup or destination preparation failed; no piece was attempted
    #[error("Planning failed: {0}")]
    Planning(#[source] Box<Error>),

    /// A single range GET or part PUT failed
    #[error("Piece {index} ({start}-{end}) failed: {source}")]
    PieceTransfer {
        index: usize,
        start: u64,
        end: u64,
        #[source]
        source: Box<Error>,
    },

    /// Local read or write for a piece failed
    #[error("Piece {index} local IO at offset {offset} failed: {source}")]
    Write {
        index: usize,
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// Multipart session create/complete/abort failed
    #[error("Multipart session {stage} failed: {source}")]
    Session {
        stage: SessionStage,
        #[source]
        source: Box<Error>,
    },

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Wrap an error as a planning failure
    pub fn planning(source: Error) -> Self {
        Error::Planning(Box::new(source))
    }

    /// Wrap an error as a session failure at the given stage
    pub fn session(stage: SessionStage, source: Error) -> Self {
        Error::Session {
            stage,
            source: Box::new(source),
        }
    }

    /// Innermost storage or IO error, skipping transfer context wrappers
    pub fn root(&self) -> &Error {
        match self {
            Error::Planning(inner) => inner.root(),
            Error::PieceTransfer { source, .. } => source.root(),
            Error::Session { source, .. } => source.root(),
            other => other,
        }
    }

    /// Get the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.root() {
            Error::InvalidPath(_) | Error::InvalidJob(_) => 2, // UsageError
            Error::Config(_) | Error::InvalidUrl(_) => 2,      // UsageError
            Error::TomlParse(_) | Error::TomlSerialize(_) => 2, // UsageError
            Error::Network(_) => 3,                            // NetworkError
            Error::Auth(_) => 4,                               // AuthError
            Error::NotFound(_) => 5,                           // NotFound
            Error::Conflict(_) => 6,                           // Conflict
            Error::Unsupported(_) => 7,                        // UnsupportedFeature
            _ => 1,                                            // GeneralError
        }
    }
}
