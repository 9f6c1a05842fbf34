//! Error taxonomy for the simulator core.
//!
//! Nothing in the core catches or retries these. They propagate to whoever
//! drives the simulation loop, which is expected to halt the run.

use crate::connection::DatabaseError;

/// Errors raised by the schema, generator, mutation and evolution layers.
#[derive(Debug)]
pub enum KraftError {
    /// Missing or unusable setup: no columns to generate from, bad knobs.
    Configuration(String),
    /// A column specification is not well formed.
    SchemaValidation(String),
    /// A value was requested for a column absent from the current snapshot.
    UnknownColumn(String),
    /// The database rejected a statement or the round trip failed.
    Database(DatabaseError),
}

impl std::fmt::Display for KraftError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Self::SchemaValidation(msg) => write!(f, "schema validation error: {msg}"),
            Self::UnknownColumn(name) => write!(f, "unknown column '{name}'"),
            Self::Database(e) => write!(f, "database operation failed: {e}"),
        }
    }
}

impl std::error::Error for KraftError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DatabaseError> for KraftError {
    fn from(e: DatabaseError) -> Self {
        Self::Database(e)
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, KraftError>;
