//! Domain-level error taxonomy for finjudge.

use finjudge_state::{RoundType, ScoringMode, Severity, StorageError};

/// Errors produced by input validation, raised before anything is written.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("percentage {percentage} outside {severity} band [{min}, {max}] for criterion {criterion_id}")]
    PercentageOutOfBand {
        criterion_id: String,
        severity: Severity,
        percentage: f64,
        min: f64,
        max: f64,
    },

    #[error("unknown criterion: {criterion_id}")]
    UnknownCriterion { criterion_id: String },

    #[error("unknown error type: {error_type_id}")]
    UnknownErrorType { error_type_id: String },

    #[error("error type {error_type_id} belongs to criterion {actual}, not {expected}")]
    ErrorTypeCriterionMismatch {
        error_type_id: String,
        expected: String,
        actual: String,
    },

    #[error("initial score {initial_score} must be in (0, {max}]")]
    InitialScoreOutOfRange { initial_score: f64, max: f64 },

    #[error("criterion weights for {category_id}/{round_type} sum to {sum}, expected 1.0")]
    WeightSum {
        category_id: String,
        round_type: RoundType,
        sum: f64,
    },

    #[error("criterion {name} has invalid weight {weight}")]
    InvalidWeight { name: String, weight: f64 },

    #[error("{field} must not be empty")]
    EmptyName { field: &'static str },

    #[error("round {round_id} is scored by {actual:?}, not {expected:?}")]
    WrongScoringMode {
        round_id: String,
        expected: ScoringMode,
        actual: ScoringMode,
    },

    #[error("referee {referee_id} is not on the roster of round {round_id}")]
    RefereeNotOnRoster { referee_id: String, round_id: String },

    #[error("tank {tank_id} does not belong to category {category_id}")]
    TankCategoryMismatch { tank_id: String, category_id: String },
}

/// finjudge domain errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JudgeError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("referee {referee_id} already submitted for registration round {registration_round_id}")]
    DuplicateSubmission {
        registration_round_id: String,
        referee_id: String,
    },

    #[error("round {round_id} has {unassigned} entries without a tank")]
    IncompleteAllocation { round_id: String, unassigned: u64 },

    #[error("round {round_id} has {unevaluated} entries without a result")]
    IncompleteEvaluation { round_id: String, unevaluated: u64 },

    #[error("round {round_id} has {incomplete} entries without a complete referee set")]
    InsufficientData { round_id: String, incomplete: u64 },

    #[error("round {round_id} was already advanced to {advanced_to}")]
    AlreadyAdvanced {
        round_id: String,
        advanced_to: String,
        /// Target of the call that hit the marker, when known
        requested: Option<String>,
    },

    #[error("registration round {registration_round_id} is already published")]
    AlreadyPublished { registration_round_id: String },

    #[error("round {round_id} ({round_type}) has no next round")]
    NoNextRound {
        round_id: String,
        round_type: RoundType,
    },

    #[error("tank {tank_id} is full in round {round_id} ({occupancy}/{limit})")]
    CapacityExceeded {
        tank_id: String,
        round_id: String,
        occupancy: u32,
        limit: u32,
    },

    #[error("registration round {registration_round_id} is not published")]
    NotPublished { registration_round_id: String },

    #[error("cannot advance {source_round} into {target_round}: {reason}")]
    InvalidTarget {
        source_round: String,
        target_round: String,
        reason: String,
    },

    #[error("results for round {round_id} are already public")]
    ResultsAlreadyPublic { round_id: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {key}")]
    Duplicate { kind: &'static str, key: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),
}

impl JudgeError {
    /// Whether this error signals a retry of an operation that already
    /// succeeded, which the caller may treat as success.
    ///
    /// Only an `AlreadyAdvanced` whose recorded target equals the requested
    /// target qualifies. Idempotent publish calls never error in the first
    /// place, and repeating the tank an entry already holds succeeds, so only
    /// a move to a different tank after publish errors.
    pub fn is_benign_retry(&self) -> bool {
        match self {
            JudgeError::AlreadyAdvanced {
                advanced_to,
                requested: Some(requested),
                ..
            } => advanced_to == requested,
            _ => false,
        }
    }

    /// Stable kind label for operator output and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            JudgeError::Validation(_) => "validation",
            JudgeError::DuplicateSubmission { .. } => "duplicate_submission",
            JudgeError::IncompleteAllocation { .. } => "incomplete_allocation",
            JudgeError::IncompleteEvaluation { .. } => "incomplete_evaluation",
            JudgeError::InsufficientData { .. } => "insufficient_data",
            JudgeError::AlreadyAdvanced { .. } => "already_advanced",
            JudgeError::AlreadyPublished { .. } => "already_published",
            JudgeError::NoNextRound { .. } => "no_next_round",
            JudgeError::CapacityExceeded { .. } => "capacity_exceeded",
            JudgeError::NotPublished { .. } => "not_published",
            JudgeError::InvalidTarget { .. } => "invalid_target",
            JudgeError::ResultsAlreadyPublic { .. } => "results_already_public",
            JudgeError::NotFound { .. } => "not_found",
            JudgeError::Duplicate { .. } => "duplicate",
            JudgeError::Storage(_) => "storage",
            JudgeError::Config(_) => "config",
        }
    }
}

impl From<StorageError> for JudgeError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { kind, id } => JudgeError::NotFound { kind, id },
            StorageError::Duplicate { kind, key } => JudgeError::Duplicate { kind, key },
            StorageError::DuplicateSubmission {
                registration_round_id,
                referee_id,
            } => JudgeError::DuplicateSubmission {
                registration_round_id,
                referee_id,
            },
            StorageError::AlreadyPublished {
                registration_round_id,
            } => JudgeError::AlreadyPublished {
                registration_round_id,
            },
            StorageError::AlreadyAdvanced {
                round_id,
                advanced_to,
            } => JudgeError::AlreadyAdvanced {
                round_id,
                advanced_to,
                requested: None,
            },
            StorageError::TankOccupied {
                tank_id,
                round_id,
                occupancy,
                limit,
            } => JudgeError::CapacityExceeded {
                tank_id,
                round_id,
                occupancy,
                limit,
            },
            StorageError::IncompleteAllocation {
                round_id,
                unassigned,
            } => JudgeError::IncompleteAllocation {
                round_id,
                unassigned,
            },
            StorageError::ResultsAlreadyPublic { round_id } => {
                JudgeError::ResultsAlreadyPublic { round_id }
            }
            StorageError::Backend(msg) => JudgeError::Storage(msg),
        }
    }
}

/// Result type for finjudge domain operations.
pub type Result<T> = std::result::Result<T, JudgeError>;
