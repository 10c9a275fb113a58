//! Structured observability hooks for round lifecycle events.
//!
//! This module provides:
//! - Round-scoped tracing spans via [`round_span`] and the `RoundSpan` RAII guard
//! - Emission functions for key lifecycle events: evaluation recorded, tank
//!   assigned, round published, round finalized, results published, round advanced
//!
//! Events are emitted at `info!` level (configurable via `FINJUDGE_LOG`).
//! For JSON output, pass `json = true` to [`crate::telemetry::init_tracing`].

use tracing::info;

/// A span tagged with the round id, for use with `tracing::Instrument`.
pub fn round_span(round_id: &str) -> tracing::Span {
    tracing::info_span!("finjudge.round", round_id = %round_id)
}

/// RAII guard that enters a round-scoped span in synchronous code.
///
/// Do not hold it across an `.await`; instrument the future with
/// [`round_span`] instead.
pub struct RoundSpan {
    _span: tracing::span::EnteredSpan,
}

impl RoundSpan {
    pub fn enter(round_id: &str) -> Self {
        Self {
            _span: round_span(round_id).entered(),
        }
    }
}

/// Emit event: one referee's weighted evaluation stored.
pub fn emit_evaluation_recorded(
    registration_round_id: &str,
    referee_id: &str,
    total_point_minus: f64,
    score: f64,
) {
    info!(
        event = "evaluation.recorded",
        registration_round_id = %registration_round_id,
        referee_id = %referee_id,
        total_point_minus = total_point_minus,
        score = score,
    );
}

/// Emit event: one referee's Pass/Fail verdict stored.
pub fn emit_verdict_recorded(registration_round_id: &str, referee_id: &str, verdict: &str) {
    info!(
        event = "verdict.recorded",
        registration_round_id = %registration_round_id,
        referee_id = %referee_id,
        verdict = %verdict,
    );
}

pub fn emit_tank_assigned(registration_round_id: &str, tank_id: &str) {
    info!(event = "tank.assigned", registration_round_id = %registration_round_id, tank_id = %tank_id);
}

/// Emit event: round publication, with how many entries changed.
pub fn emit_round_published(round_id: &str, flipped: u64, total: u64) {
    info!(event = "round.published", round_id = %round_id, flipped = flipped, total = total);
}

pub fn emit_round_finalized(round_id: &str, mode: &str, results: usize) {
    info!(event = "round.finalized", round_id = %round_id, mode = %mode, results = results);
}

pub fn emit_results_published(round_id: &str, flipped: u64) {
    info!(event = "results.published", round_id = %round_id, flipped = flipped);
}

pub fn emit_round_advanced(source_round_id: &str, target_round_id: &str, created: usize) {
    info!(
        event = "round.advanced",
        source_round_id = %source_round_id,
        target_round_id = %target_round_id,
        created = created,
    );
}

/// Emit event: an operation rejected by a precondition (warning level).
pub fn emit_rejected(operation: &str, kind: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "operation.rejected", operation = %operation, kind = %kind, error = %error);
}
