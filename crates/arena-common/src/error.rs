//! Error types for Project Arena.

use thiserror::Error;

/// Top-level error type for Arena operations.
///
/// Subsystem crates define their own narrower errors and convert into this
/// one at the application boundary.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// An actor ID was not known to a collaborator
    #[error("Unknown actor: {0}")]
    UnknownActor(crate::ActorId),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema version mismatch
    #[error("Schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Expected version
        expected: String,
        /// Actual version found
        actual: String,
    },
}

/// Result type alias for Arena operations.
pub type ArenaResult<T> = Result<T, ArenaError>;
