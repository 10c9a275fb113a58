//! finjudge-state: persistence layer for finjudge competitions
//!
//! This crate owns every write the judging core makes. It is the sole
//! authority for "already submitted", "already advanced" and tank
//! exclusivity: those conflicts are decided at write time by the store,
//! never by an in-process flag.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: data integrity, transactionality, consistent round snapshots.
//!
//! ## Key Components
//!
//! - `storage_traits`: `CatalogStore`, `RoundStore`, `ScoreStore` and the
//!   record types they exchange
//! - `fakes::MemoryCompetitionStore`: single-mutex in-memory backend
//! - `SurrealCompetitionStore`: SurrealDB backend with unique indexes and
//!   transactional multi-row writes

mod error;
pub mod fakes;
pub mod handle;
pub mod migrations;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use handle::CloudConfig;
pub use storage_traits::{
    CatalogStore, CategoryId, CategoryRecord, CompetitionStore, CriteriaErrorRecord, CriterionId,
    CriterionRecord, EntryId, EntryRecord, ErrorTypeId, ErrorTypeRecord, Page, PageResult,
    RefereeAssignment, RefereeId, RegistrationRoundId, RegistrationRoundRecord, RoundId,
    RoundRecord, RoundResultRecord, RoundStore, RoundType, ScoreDetailId, ScoreDetailRecord,
    ScoreStore, ScoringMode, Severity, StorageResult, TankId, TankRecord, Verdict, VerdictRecord,
};
pub use surreal_store::SurrealCompetitionStore;

/// Result type for connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;
