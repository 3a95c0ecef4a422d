//! Error types for bcp-core

use thiserror::Error;

/// Result type alias for bcp-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while resolving, walking or transferring
#[derive(Debug, Error)]
pub enum Error {
    /// Source/destination pair is not exactly one local and one remote location
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// Location string could not be parsed at all
    #[error("Malformed location: {0}")]
    MalformedLocation(String),

    /// Remote location without a bucket
    #[error("Illegal object path: {0}")]
    IllegalObjectPath(String),

    /// Local source does not exist
    #[error("The user provided path {0} does not exist")]
    SourceNotFound(String),

    /// Directory traversal failed
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// Remote object does not exist
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Request to the object store failed
    #[error("Network error: {0}")]
    Network(String),

    /// A file transfer failed; `completed` files were copied before it
    #[error("Failed to copy {path} ({completed} file(s) copied before the failure): {source}")]
    Transfer {
        path: String,
        completed: usize,
        #[source]
        source: Box<Error>,
    },

    /// Invalid configuration or tuning value
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    General(String),
}

impl Error {
    /// Wrap a per-file failure with the file it happened on
    pub fn transfer(path: impl Into<String>, completed: usize, source: Error) -> Self {
        Error::Transfer {
            path: path.into(),
            completed,
            source: Box::new(source),
        }
    }

    /// True when the failure means the remote object is absent
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Transfer { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// True for errors caused by the arguments rather than the environment
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Error::InvalidUsage(_) | Error::MalformedLocation(_) | Error::IllegalObjectPath(_)
        )
    }
}
