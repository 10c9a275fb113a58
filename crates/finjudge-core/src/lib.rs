//! finjudge Core Library
//!
//! The round-progression and scoring engine for judged show competitions:
//! which entries survive a round, how several referees' evaluations combine
//! into one score, how tanks are allocated without conflicts, and how
//! results move from private to public exactly once.
//!
//! ## Components
//!
//! - `catalog::CriteriaCatalog`: weighted criteria and registered error types
//! - `scoring::ScoringEngine`: evaluations, verdicts, round finalization
//! - `tanks::TankAllocator`: write-time checked tank assignment
//! - `progression::RoundProgression`: publish transitions, snapshots, standings
//! - `ranking`: pure competition ranking with tie-breaks
//! - `advancement::AdvancementCoordinator`: at-most-once advancement
//!
//! Persistence is delegated to `finjudge_state::CompetitionStore`.

pub mod advancement;
pub mod catalog;
pub mod competition;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod obs;
pub mod progression;
pub mod ranking;
pub mod scoring;
pub mod tanks;
pub mod telemetry;

pub use advancement::{
    select_advancing, validate_target, AdvancementCoordinator, AdvancementReport,
};
pub use catalog::{check_weight_sum, CriteriaCatalog, CriterionSpec};
pub use competition::Competition;
pub use config::{
    AdvancementPolicy, AggregationPolicy, Band, JudgingConfig, SeverityBands, VerdictPolicy,
};
pub use domain::{
    entry_status, EntryStatus, JudgeError, Result, RoundSnapshot, RoundSummary, StatusCounts,
    ValidationError,
};
pub use obs::{
    emit_evaluation_recorded, emit_results_published, emit_round_advanced, emit_round_finalized,
    emit_round_published, emit_tank_assigned, round_span, RoundSpan,
};
pub use progression::RoundProgression;
pub use ranking::{rank, standings, Standing, Visibility};
pub use scoring::{
    aggregate_scores, compute_breakdown, decide_verdict, point_minus, CriteriaErrorInput,
    ScoreBreakdown, ScoringEngine,
};
pub use tanks::TankAllocator;

pub use finjudge_state::{
    CategoryId, CompetitionStore, EntryId, RefereeId, RegistrationRoundId, RoundId, RoundType,
    Severity, TankId, Verdict,
};
