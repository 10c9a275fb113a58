//! Storage trait definitions for finjudge
//!
//! These traits define the persistence interface consumed by the judging core:
//! - `CatalogStore`: reference data (categories, rounds, tanks, criteria,
//!   error types, entries, referee rosters)
//! - `RoundStore`: registration rounds, tank assignment, round publication and
//!   advancement markers
//! - `ScoreStore`: score details, elimination verdicts and round results
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! via the `fakes` module; `SurrealCompetitionStore` is the durable backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random identifier
            pub fn new() -> Self {
                $name(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }
    };
}

define_id!(
    /// A judged class of entries
    CategoryId
);
define_id!(
    /// One sub-round of a round type within a category
    RoundId
);
define_id!(
    /// One entry's participation in one round
    RegistrationRoundId
);
define_id!(
    /// A competitor registered into a category
    EntryId
);
define_id!(
    /// A physical viewing tank
    TankId
);
define_id!(
    /// A weighted axis of judgment
    CriterionId
);
define_id!(
    /// A named fault registered under a criterion
    ErrorTypeId
);
define_id!(
    /// A judge
    RefereeId
);
define_id!(
    /// One referee's evaluation of one registration round
    ScoreDetailId
);

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// How results of a round are decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Pass/Fail verdicts
    Elimination,
    /// Deduction-based weighted scores
    Weighted,
}

/// Round type. Rounds progress Preliminary → Evaluation → Final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundType {
    Preliminary,
    Evaluation,
    Final,
}

impl RoundType {
    /// The round type entries advance into, if any.
    pub fn successor(self) -> Option<RoundType> {
        match self {
            RoundType::Preliminary => Some(RoundType::Evaluation),
            RoundType::Evaluation => Some(RoundType::Final),
            RoundType::Final => None,
        }
    }

    pub fn scoring_mode(self) -> ScoringMode {
        match self {
            RoundType::Preliminary => ScoringMode::Elimination,
            RoundType::Evaluation | RoundType::Final => ScoringMode::Weighted,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoundType::Preliminary => "preliminary",
            RoundType::Evaluation => "evaluation",
            RoundType::Final => "final",
        }
    }
}

impl std::fmt::Display for RoundType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse deduction magnitude of a criteria error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Light,
    Medium,
    Severe,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Light => "light",
            Severity::Medium => "medium",
            Severity::Severe => "severe",
        };
        f.write_str(s)
    }
}

/// Elimination-round outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

// ---------------------------------------------------------------------------
// Catalog records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub category_id: CategoryId,
    pub name: String,
    /// Entries must hold a tank before their round can be published
    pub requires_tanks: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round_id: RoundId,
    pub category_id: CategoryId,
    pub round_type: RoundType,
    /// Position of this sub-round among rounds of the same type (1-based)
    pub round_order: u32,
    pub name: String,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub results_published: bool,
    /// Persisted advancement marker; set exactly once by `commit_advancement`
    pub advanced_to: Option<RoundId>,
    pub advanced_at: Option<DateTime<Utc>>,
}

impl RoundRecord {
    pub fn new(
        category_id: CategoryId,
        round_type: RoundType,
        round_order: u32,
        name: impl Into<String>,
    ) -> Self {
        Self {
            round_id: RoundId::new(),
            category_id,
            round_type,
            round_order,
            name: name.into(),
            published: false,
            results_published: false,
            advanced_to: None,
            advanced_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankRecord {
    pub tank_id: TankId,
    pub category_id: CategoryId,
    pub label: String,
    /// Maximum entries per sub-round; `None` means unbounded
    pub capacity: Option<u32>,
    /// At most one entry per sub-round, regardless of `capacity`
    pub exclusive: bool,
}

impl TankRecord {
    /// Occupancy limit enforced at assignment time.
    pub fn occupancy_limit(&self) -> Option<u32> {
        if self.exclusive {
            Some(1)
        } else {
            self.capacity
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionRecord {
    pub criterion_id: CriterionId,
    pub category_id: CategoryId,
    pub round_type: RoundType,
    pub name: String,
    /// Fraction of the total deduction budget; weights of a round type sum to 1.0
    pub weight: f64,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorTypeRecord {
    pub error_type_id: ErrorTypeId,
    pub criterion_id: CriterionId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub entry_id: EntryId,
    pub category_id: CategoryId,
    /// Tie-break key, compared lexicographically
    pub registration_number: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefereeAssignment {
    pub round_id: RoundId,
    pub referee_id: RefereeId,
    /// Free-form role label (e.g. "head", "panel") used by role-weighted aggregation
    pub role: String,
}

// ---------------------------------------------------------------------------
// Round participation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRoundRecord {
    pub registration_round_id: RegistrationRoundId,
    pub round_id: RoundId,
    pub entry_id: EntryId,
    pub registration_number: String,
    pub tank_id: Option<TankId>,
    /// Visibility only moves forward: unpublished → published
    #[serde(default)]
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl RegistrationRoundRecord {
    pub fn new(round_id: RoundId, entry_id: EntryId, registration_number: String) -> Self {
        Self {
            registration_round_id: RegistrationRoundId::new(),
            round_id,
            entry_id,
            registration_number,
            tank_id: None,
            published: false,
            created_at: Utc::now(),
            published_at: None,
        }
    }

    /// A fresh, unassigned record carrying this entry into `target`.
    pub fn carried_into(&self, target: &RoundId) -> Self {
        Self::new(
            target.clone(),
            self.entry_id.clone(),
            self.registration_number.clone(),
        )
    }
}

/// Zero-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub index: u32,
    pub size: u32,
}

impl Page {
    pub fn first(size: u32) -> Self {
        Self {
            index: 0,
            size: size.max(1),
        }
    }

    pub fn next(self) -> Self {
        Self {
            index: self.index + 1,
            size: self.size,
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.index) * u64::from(self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    /// Total rows matching the query across all pages
    pub total: u64,
}

impl<T> PageResult<T> {
    /// Whether rows remain after `page`.
    pub fn has_more(&self, page: Page) -> bool {
        page.offset() + (self.items.len() as u64) < self.total
    }
}

// ---------------------------------------------------------------------------
// Scoring records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaErrorRecord {
    pub criterion_id: CriterionId,
    pub error_type_id: Option<ErrorTypeId>,
    pub severity: Severity,
    /// Percentage within the severity band (0–100)
    pub percentage: f64,
    /// weight × (percentage / 100) × 100, rounded to 2 decimals
    pub point_minus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDetailRecord {
    pub score_detail_id: ScoreDetailId,
    pub registration_round_id: RegistrationRoundId,
    pub round_id: RoundId,
    pub referee_id: RefereeId,
    pub initial_score: f64,
    pub errors: Vec<CriteriaErrorRecord>,
    pub total_point_minus: f64,
    pub score: f64,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub registration_round_id: RegistrationRoundId,
    pub round_id: RoundId,
    pub referee_id: RefereeId,
    pub verdict: Verdict,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResultRecord {
    pub registration_round_id: RegistrationRoundId,
    pub round_id: RoundId,
    /// Pass/Fail for elimination rounds
    pub status: Option<Verdict>,
    /// Aggregated score for weighted rounds
    pub total_score: Option<f64>,
    /// Breakdown this result was aggregated from
    #[serde(default)]
    pub score_detail_ids: Vec<ScoreDetailId>,
    pub referee_count: u32,
    /// Cached competition rank; recomputed from the result set, never authoritative
    pub rank: Option<u32>,
    #[serde(default)]
    pub is_public: bool,
    pub finalized_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Reference data consumed by the judging core.
///
/// `put_*` operations reject an existing identifier with
/// `StorageError::Duplicate`.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn put_category(&self, category: CategoryRecord) -> StorageResult<()>;

    async fn get_category(&self, category_id: &CategoryId) -> StorageResult<CategoryRecord>;

    async fn put_round(&self, round: RoundRecord) -> StorageResult<()>;

    async fn get_round(&self, round_id: &RoundId) -> StorageResult<RoundRecord>;

    /// Rounds of a category ordered by (round type, round order).
    async fn list_rounds(&self, category_id: &CategoryId) -> StorageResult<Vec<RoundRecord>>;

    async fn put_tank(&self, tank: TankRecord) -> StorageResult<()>;

    async fn get_tank(&self, tank_id: &TankId) -> StorageResult<TankRecord>;

    async fn list_tanks(&self, category_id: &CategoryId) -> StorageResult<Vec<TankRecord>>;

    /// Store the whole criteria set of a category and round type at once.
    ///
    /// Nothing is written unless every record is: the set must not exist yet
    /// (`Duplicate { kind: "criteria set" }`) and no criterion id may repeat
    /// or already be taken (`Duplicate { kind: "criterion" }`).
    async fn put_criteria(
        &self,
        category_id: &CategoryId,
        round_type: RoundType,
        criteria: Vec<CriterionRecord>,
    ) -> StorageResult<()>;

    async fn get_criterion(&self, criterion_id: &CriterionId) -> StorageResult<CriterionRecord>;

    /// Criteria of a category and round type ordered by position.
    async fn get_criteria(
        &self,
        category_id: &CategoryId,
        round_type: RoundType,
    ) -> StorageResult<Vec<CriterionRecord>>;

    /// Register an error type. Names are unique per criterion.
    async fn register_error_type(&self, error_type: ErrorTypeRecord) -> StorageResult<()>;

    async fn get_error_type(&self, error_type_id: &ErrorTypeId) -> StorageResult<ErrorTypeRecord>;

    async fn list_error_types(
        &self,
        criterion_id: &CriterionId,
    ) -> StorageResult<Vec<ErrorTypeRecord>>;

    async fn put_entry(&self, entry: EntryRecord) -> StorageResult<()>;

    async fn get_entry(&self, entry_id: &EntryId) -> StorageResult<EntryRecord>;

    /// Add a referee to a round's roster. Re-assigning updates the role.
    async fn assign_referee(&self, assignment: RefereeAssignment) -> StorageResult<()>;

    async fn list_referees(&self, round_id: &RoundId) -> StorageResult<Vec<RefereeAssignment>>;
}

/// Registration rounds and round-level visibility.
///
/// Guarantees:
/// - `(round_id, entry_id)` is unique.
/// - A published registration round never reverts and rejects tank changes.
/// - `commit_advancement` writes the marker and every new row together or
///   not at all; a second call for the same source fails with
///   `StorageError::AlreadyAdvanced` and creates nothing.
#[async_trait]
pub trait RoundStore: Send + Sync {
    async fn create_registration_round(
        &self,
        round_id: &RoundId,
        entry_id: &EntryId,
    ) -> StorageResult<RegistrationRoundRecord>;

    async fn get_registration_round(
        &self,
        registration_round_id: &RegistrationRoundId,
    ) -> StorageResult<RegistrationRoundRecord>;

    /// Registration rounds ordered by registration number.
    async fn list_registration_rounds(
        &self,
        round_id: &RoundId,
        page: Page,
    ) -> StorageResult<PageResult<RegistrationRoundRecord>>;

    /// Assign a tank, last write wins per entry.
    ///
    /// When `occupancy_limit` is set, other entries of the same round holding
    /// `tank_id` are counted at write time and the assignment fails with
    /// `StorageError::TankOccupied` once the limit is reached.
    async fn update_tank_assignment(
        &self,
        registration_round_id: &RegistrationRoundId,
        tank_id: &TankId,
        occupancy_limit: Option<u32>,
    ) -> StorageResult<RegistrationRoundRecord>;

    /// Flip every registration round of the round to published, returning
    /// how many changed. With `require_tanks`, fails with
    /// `StorageError::IncompleteAllocation` and changes nothing if any entry
    /// lacks a tank.
    async fn set_round_published(&self, round_id: &RoundId, require_tanks: bool)
        -> StorageResult<u64>;

    /// Persist the advancement marker on `source` and create one registration
    /// round in `target` per carried record, atomically.
    async fn commit_advancement(
        &self,
        source: &RoundId,
        target: &RoundId,
        carried: &[RegistrationRoundRecord],
    ) -> StorageResult<Vec<RegistrationRoundRecord>>;
}

/// Referee submissions and aggregated results.
///
/// Guarantees:
/// - At most one score detail and one verdict per (registration round, referee);
///   a duplicate fails with `StorageError::DuplicateSubmission` and the
///   original is preserved.
/// - `list_*` reads of a round return one consistent snapshot.
/// - Once any result of a round is public, `replace_round_results` fails with
///   `StorageError::ResultsAlreadyPublic`.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn create_score_detail(&self, detail: ScoreDetailRecord) -> StorageResult<()>;

    async fn create_verdict(&self, verdict: VerdictRecord) -> StorageResult<()>;

    async fn list_score_details(&self, round_id: &RoundId) -> StorageResult<Vec<ScoreDetailRecord>>;

    async fn list_verdicts(&self, round_id: &RoundId) -> StorageResult<Vec<VerdictRecord>>;

    async fn replace_round_results(
        &self,
        round_id: &RoundId,
        results: Vec<RoundResultRecord>,
    ) -> StorageResult<()>;

    async fn list_round_results(&self, round_id: &RoundId)
        -> StorageResult<Vec<RoundResultRecord>>;

    /// Flip `is_public` on every result of the round, returning how many changed.
    async fn set_results_published(&self, round_id: &RoundId) -> StorageResult<u64>;
}

/// Everything the judging core needs from a backend.
pub trait CompetitionStore: CatalogStore + RoundStore + ScoreStore {}

impl<T> CompetitionStore for T where T: CatalogStore + RoundStore + ScoreStore {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_type_successor_chain() {
        assert_eq!(RoundType::Preliminary.successor(), Some(RoundType::Evaluation));
        assert_eq!(RoundType::Evaluation.successor(), Some(RoundType::Final));
        assert_eq!(RoundType::Final.successor(), None);
    }

    #[test]
    fn exclusive_tank_limit_overrides_capacity() {
        let tank = TankRecord {
            tank_id: TankId::from("t1"),
            category_id: CategoryId::from("c1"),
            label: "T1".to_string(),
            capacity: Some(4),
            exclusive: true,
        };
        assert_eq!(tank.occupancy_limit(), Some(1));
    }

    #[test]
    fn page_result_has_more() {
        let page = Page::first(2);
        let result = PageResult {
            items: vec![1, 2],
            total: 3,
        };
        assert!(result.has_more(page));
        let last = PageResult {
            items: vec![3],
            total: 3,
        };
        assert!(!last.has_more(page.next()));
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = RoundId::from("round-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"round-1\"");
    }
}
