//! Error types for finjudge-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the backing database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned by the storage traits.
///
/// Conflict variants (`DuplicateSubmission`, `AlreadyAdvanced`,
/// `TankOccupied`, ...) are decided by the store at write time, never by an
/// in-process flag.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {key}")]
    Duplicate { kind: &'static str, key: String },

    #[error("referee {referee_id} already submitted for registration round {registration_round_id}")]
    DuplicateSubmission {
        registration_round_id: String,
        referee_id: String,
    },

    #[error("registration round {registration_round_id} is already published")]
    AlreadyPublished { registration_round_id: String },

    #[error("round {round_id} was already advanced to {advanced_to}")]
    AlreadyAdvanced {
        round_id: String,
        advanced_to: String,
    },

    #[error("tank {tank_id} already holds {occupancy} entries in round {round_id} (limit {limit})")]
    TankOccupied {
        tank_id: String,
        round_id: String,
        occupancy: u32,
        limit: u32,
    },

    #[error("round {round_id} has {unassigned} entries without a tank")]
    IncompleteAllocation { round_id: String, unassigned: u64 },

    #[error("results for round {round_id} are already public")]
    ResultsAlreadyPublic { round_id: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        StorageError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}
