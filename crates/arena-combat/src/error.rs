//! Error types for the combat core.

use arena_common::{ActorId, ArenaError, SchemaVersion};
use thiserror::Error;

use crate::physics::PhysicsError;

/// Errors raised while simulating combat.
#[derive(Debug, Error)]
pub enum CombatError {
    /// Physics collaborator rejected a request
    #[error(transparent)]
    Physics(#[from] PhysicsError),

    /// Actor is not part of the simulation
    #[error("actor not in simulation: {0}")]
    UnknownActor(ActorId),

    /// Actor was added twice
    #[error("actor already in simulation: {0}")]
    DuplicateActor(ActorId),
}

/// Result type alias for combat operations.
pub type CombatResult<T> = Result<T, CombatError>;

/// Errors raised by event subscribers.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// Handler could not process the event
    #[error("handler failed: {0}")]
    Failed(String),
}

/// Errors loading or saving combat configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO errors
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse errors
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize errors
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Errors loading or saving a knowledge base.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    /// IO errors
    #[error("knowledge base io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error("knowledge base format error: {0}")]
    Json(#[from] serde_json::Error),

    /// Stored data has an unreadable version
    #[error("knowledge base version {found} cannot be read (expected {expected})")]
    Version {
        /// Version found in the data
        found: SchemaVersion,
        /// Version this build reads
        expected: SchemaVersion,
    },
}

impl From<CombatError> for ArenaError {
    fn from(err: CombatError) -> Self {
        match err {
            CombatError::UnknownActor(id) => Self::UnknownActor(id),
            CombatError::Physics(PhysicsError::UnknownActor(id)) => Self::UnknownActor(id),
            CombatError::DuplicateActor(id) => Self::Config(format!("duplicate actor {id}")),
        }
    }
}

impl From<ConfigError> for ArenaError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config(other.to_string()),
        }
    }
}

impl From<KnowledgeError> for ArenaError {
    fn from(err: KnowledgeError) -> Self {
        match err {
            KnowledgeError::Io(e) => Self::Io(e),
            KnowledgeError::Json(e) => Self::Serialization(e.to_string()),
            KnowledgeError::Version { found, expected } => Self::VersionMismatch {
                expected: expected.to_string(),
                actual: found.to_string(),
            },
        }
    }
}
