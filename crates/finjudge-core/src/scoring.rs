//! Scoring Engine.
//!
//! Records one referee's evaluation (weighted rounds) or verdict
//! (elimination rounds) per registration round, and finalizes a round into
//! one `RoundResultRecord` per entry once every required referee has
//! submitted.
//!
//! Deduction arithmetic:
//! - `point_minus = weight × (percentage / 100) × 100`, rounded to 2 decimals
//!   and never above `weight × 100`
//! - `score = max(initial_score − Σ point_minus, score_floor)`

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use finjudge_state::{
    CompetitionStore, CriteriaErrorRecord, CriterionId, CriterionRecord, ErrorTypeId,
    RefereeAssignment, RefereeId, RegistrationRoundId, RegistrationRoundRecord, RoundId,
    RoundRecord, RoundResultRecord, ScoreDetailId, ScoreDetailRecord, ScoringMode, Severity,
    Verdict, VerdictRecord,
};

use crate::catalog::check_weight_sum;
use crate::config::{AggregationPolicy, JudgingConfig, SeverityBands, VerdictPolicy};
use crate::domain::{JudgeError, Result, ValidationError};
use crate::metrics::METRICS;
use crate::progression::load_round_rows;
use crate::{obs, ranking};

/// One deduction as submitted by a referee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaErrorInput {
    pub criterion_id: CriterionId,
    /// A registered error type of the same criterion
    #[serde(default)]
    pub error_type_id: Option<ErrorTypeId>,
    pub severity: Severity,
    pub percentage: f64,
}

/// Derived deduction totals for one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub errors: Vec<CriteriaErrorRecord>,
    pub total_point_minus: f64,
    pub score: f64,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn point_minus(weight: f64, percentage: f64) -> f64 {
    round2(weight * (percentage / 100.0) * 100.0).min(weight * 100.0)
}

/// Compute deductions and the clamped score. Each error is paired with the
/// weight of its criterion.
pub fn compute_breakdown(
    initial_score: f64,
    score_floor: f64,
    errors: Vec<(CriteriaErrorInput, f64)>,
) -> ScoreBreakdown {
    let errors: Vec<CriteriaErrorRecord> = errors
        .into_iter()
        .map(|(input, weight)| CriteriaErrorRecord {
            point_minus: point_minus(weight, input.percentage),
            criterion_id: input.criterion_id,
            error_type_id: input.error_type_id,
            severity: input.severity,
            percentage: input.percentage,
        })
        .collect();
    let total_point_minus = round2(errors.iter().map(|e| e.point_minus).sum());
    let score = round2((initial_score - total_point_minus).max(score_floor));
    ScoreBreakdown {
        errors,
        total_point_minus,
        score,
    }
}

/// Check each error against the catalog and the severity bands.
pub fn validate_errors(
    errors: &[CriteriaErrorInput],
    criteria: &HashMap<CriterionId, CriterionRecord>,
    bands: &SeverityBands,
) -> std::result::Result<(), ValidationError> {
    for error in errors {
        if !criteria.contains_key(&error.criterion_id) {
            return Err(ValidationError::UnknownCriterion {
                criterion_id: error.criterion_id.to_string(),
            });
        }
        let band = bands.band(error.severity);
        if !error.percentage.is_finite() || !band.contains(error.percentage) {
            return Err(ValidationError::PercentageOutOfBand {
                criterion_id: error.criterion_id.to_string(),
                severity: error.severity,
                percentage: error.percentage,
                min: band.min,
                max: band.max,
            });
        }
    }
    Ok(())
}

/// Combine scores under the aggregation policy. Each score is paired with
/// its referee's roster role. Returns `None` for an empty set.
pub fn aggregate_scores(policy: &AggregationPolicy, scores: &[(f64, Option<&str>)]) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    let weighted: Vec<(f64, f64)> = scores
        .iter()
        .map(|(score, role)| (*score, policy.weight_for(*role)))
        .collect();
    let total_weight: f64 = weighted.iter().map(|(_, w)| w).sum();
    // All-zero weights degrade to a plain mean.
    if total_weight <= 0.0 {
        let sum: f64 = scores.iter().map(|(s, _)| s).sum();
        return Some(round2(sum / scores.len() as f64));
    }
    let sum: f64 = weighted.iter().map(|(s, w)| s * w).sum();
    Some(round2(sum / total_weight))
}

/// Combine Pass/Fail verdicts. Returns `None` for an empty set.
pub fn decide_verdict(policy: VerdictPolicy, verdicts: &[Verdict]) -> Option<Verdict> {
    if verdicts.is_empty() {
        return None;
    }
    let passes = verdicts.iter().filter(|v| **v == Verdict::Pass).count();
    let fails = verdicts.len() - passes;
    let pass = match policy {
        VerdictPolicy::Unanimous => fails == 0,
        VerdictPolicy::Majority => passes > fails,
        VerdictPolicy::Any => passes > 0,
    };
    Some(if pass { Verdict::Pass } else { Verdict::Fail })
}

/// Whether the submitting referees cover the required set. An empty roster
/// requires at least one submission.
pub fn is_complete<'a>(
    required: &HashSet<&RefereeId>,
    submitted: impl IntoIterator<Item = &'a RefereeId>,
) -> bool {
    let submitted: HashSet<&RefereeId> = submitted.into_iter().collect();
    if required.is_empty() {
        !submitted.is_empty()
    } else {
        required.iter().all(|r| submitted.contains(*r))
    }
}

/// Scoring operations over a competition store.
pub struct ScoringEngine<S> {
    store: Arc<S>,
    config: Arc<JudgingConfig>,
}

impl<S> Clone for ScoringEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S> ScoringEngine<S>
where
    S: CompetitionStore,
{
    pub fn new(store: Arc<S>, config: Arc<JudgingConfig>) -> Self {
        Self { store, config }
    }

    /// Load a published registration round, its round and roster, checking
    /// the scoring mode and that the referee may submit.
    async fn submission_target(
        &self,
        registration_round_id: &RegistrationRoundId,
        referee_id: &RefereeId,
        expected: ScoringMode,
    ) -> Result<(RegistrationRoundRecord, RoundRecord)> {
        let row = self
            .store
            .get_registration_round(registration_round_id)
            .await?;
        if !row.published {
            return Err(JudgeError::NotPublished {
                registration_round_id: registration_round_id.to_string(),
            });
        }
        let round = self.store.get_round(&row.round_id).await?;
        let actual = round.round_type.scoring_mode();
        if actual != expected {
            return Err(ValidationError::WrongScoringMode {
                round_id: round.round_id.to_string(),
                expected,
                actual,
            }
            .into());
        }
        let roster = self.store.list_referees(&round.round_id).await?;
        if !roster.is_empty() && !roster.iter().any(|a| &a.referee_id == referee_id) {
            return Err(ValidationError::RefereeNotOnRoster {
                referee_id: referee_id.to_string(),
                round_id: round.round_id.to_string(),
            }
            .into());
        }
        Ok((row, round))
    }

    /// Record one referee's evaluation of a weighted-round entry.
    ///
    /// Everything is validated before the single write; a second submission
    /// by the same referee is rejected by the store and the original kept.
    #[instrument(skip(self, errors), fields(registration_round_id = %registration_round_id, referee_id = %referee_id, errors = errors.len()))]
    pub async fn record_evaluation(
        &self,
        registration_round_id: &RegistrationRoundId,
        referee_id: &RefereeId,
        initial_score: Option<f64>,
        errors: Vec<CriteriaErrorInput>,
    ) -> Result<ScoreDetailRecord> {
        let (row, round) = self
            .submission_target(registration_round_id, referee_id, ScoringMode::Weighted)
            .await?;

        let initial_score = initial_score.unwrap_or(self.config.default_initial_score);
        if !(initial_score > 0.0 && initial_score <= self.config.max_initial_score) {
            return Err(ValidationError::InitialScoreOutOfRange {
                initial_score,
                max: self.config.max_initial_score,
            }
            .into());
        }

        let criteria = self
            .store
            .get_criteria(&round.category_id, round.round_type)
            .await?;
        if !criteria.is_empty() {
            check_weight_sum(
                &round.category_id,
                round.round_type,
                criteria.iter().map(|c| c.weight),
                self.config.weight_tolerance,
            )?;
        }
        let criteria: HashMap<CriterionId, CriterionRecord> = criteria
            .into_iter()
            .map(|c| (c.criterion_id.clone(), c))
            .collect();
        validate_errors(&errors, &criteria, &self.config.severity_bands)?;

        for error in &errors {
            if let Some(error_type_id) = &error.error_type_id {
                let error_type = self
                    .store
                    .get_error_type(error_type_id)
                    .await
                    .map_err(|_| ValidationError::UnknownErrorType {
                        error_type_id: error_type_id.to_string(),
                    })?;
                if error_type.criterion_id != error.criterion_id {
                    return Err(ValidationError::ErrorTypeCriterionMismatch {
                        error_type_id: error_type_id.to_string(),
                        expected: error.criterion_id.to_string(),
                        actual: error_type.criterion_id.to_string(),
                    }
                    .into());
                }
            }
        }

        let weighted = errors
            .into_iter()
            .filter_map(|e| criteria.get(&e.criterion_id).map(|c| (c.weight, e)))
            .map(|(weight, e)| (e, weight))
            .collect();
        let breakdown = compute_breakdown(initial_score, self.config.score_floor, weighted);

        let detail = ScoreDetailRecord {
            score_detail_id: ScoreDetailId::new(),
            registration_round_id: row.registration_round_id.clone(),
            round_id: row.round_id.clone(),
            referee_id: referee_id.clone(),
            initial_score,
            errors: breakdown.errors,
            total_point_minus: breakdown.total_point_minus,
            score: breakdown.score,
            submitted_at: Utc::now(),
        };
        if let Err(err) = self.store.create_score_detail(detail.clone()).await {
            let err = JudgeError::from(err);
            METRICS.inc_rejected_submissions();
            obs::emit_rejected("record_evaluation", err.kind(), &err);
            return Err(err);
        }

        METRICS.inc_evaluations();
        obs::emit_evaluation_recorded(
            registration_round_id.as_str(),
            referee_id.as_str(),
            detail.total_point_minus,
            detail.score,
        );
        Ok(detail)
    }

    /// Record one referee's Pass/Fail verdict for an elimination-round entry.
    #[instrument(skip(self), fields(registration_round_id = %registration_round_id, referee_id = %referee_id))]
    pub async fn record_verdict(
        &self,
        registration_round_id: &RegistrationRoundId,
        referee_id: &RefereeId,
        verdict: Verdict,
    ) -> Result<VerdictRecord> {
        let (row, _) = self
            .submission_target(registration_round_id, referee_id, ScoringMode::Elimination)
            .await?;

        let record = VerdictRecord {
            registration_round_id: row.registration_round_id.clone(),
            round_id: row.round_id.clone(),
            referee_id: referee_id.clone(),
            verdict,
            submitted_at: Utc::now(),
        };
        if let Err(err) = self.store.create_verdict(record.clone()).await {
            let err = JudgeError::from(err);
            METRICS.inc_rejected_submissions();
            obs::emit_rejected("record_verdict", err.kind(), &err);
            return Err(err);
        }

        METRICS.inc_verdicts();
        let label = match verdict {
            Verdict::Pass => "pass",
            Verdict::Fail => "fail",
        };
        obs::emit_verdict_recorded(registration_round_id.as_str(), referee_id.as_str(), label);
        Ok(record)
    }

    /// Aggregate every entry of a round into a result, ranked.
    ///
    /// Fails with `InsufficientData` (and writes nothing) if any entry lacks
    /// a complete referee set. Once results are public the stored results
    /// are returned unchanged.
    #[instrument(skip(self), fields(round_id = %round_id))]
    pub async fn finalize_round(&self, round_id: &RoundId) -> Result<Vec<RoundResultRecord>> {
        let round = self.store.get_round(round_id).await?;
        let existing = self.store.list_round_results(round_id).await?;
        let rows = load_round_rows(self.store.as_ref(), round_id, self.config.page_size).await?;

        if round.results_published || existing.iter().any(|r| r.is_public) {
            debug!("results already public, returning stored results");
            return Ok(order_by_rank(&rows, existing));
        }

        let roster = self.store.list_referees(round_id).await?;
        let mode = round.round_type.scoring_mode();
        let (mut results, incomplete) = match mode {
            ScoringMode::Weighted => {
                let details = self.store.list_score_details(round_id).await?;
                self.aggregate_weighted(&rows, &roster, &details)
            }
            ScoringMode::Elimination => {
                let verdicts = self.store.list_verdicts(round_id).await?;
                self.aggregate_elimination(&rows, &roster, &verdicts)
            }
        };
        if incomplete > 0 {
            let err = JudgeError::InsufficientData {
                round_id: round_id.to_string(),
                incomplete,
            };
            obs::emit_rejected("finalize_round", err.kind(), &err);
            return Err(err);
        }

        // Previous ranks act as the secondary key; the new rank is a cache.
        let previous: HashMap<&RegistrationRoundId, Option<u32>> = existing
            .iter()
            .map(|r| (&r.registration_round_id, r.rank))
            .collect();
        for result in &mut results {
            result.rank = previous
                .get(&result.registration_round_id)
                .copied()
                .flatten();
        }
        let ranked = ranking::standings(&rows, &results, ranking::Visibility::Internal);
        let ranks: HashMap<&RegistrationRoundId, Option<u32>> = ranked
            .iter()
            .map(|s| (&s.registration_round_id, s.rank))
            .collect();
        for result in &mut results {
            result.rank = ranks
                .get(&result.registration_round_id)
                .copied()
                .flatten();
        }

        self.store
            .replace_round_results(round_id, results.clone())
            .await?;

        METRICS.inc_rounds_finalized();
        let mode_label = match mode {
            ScoringMode::Weighted => "weighted",
            ScoringMode::Elimination => "elimination",
        };
        obs::emit_round_finalized(round_id.as_str(), mode_label, results.len());
        Ok(order_by_rank(&rows, results))
    }

    fn aggregate_weighted(
        &self,
        rows: &[RegistrationRoundRecord],
        roster: &[RefereeAssignment],
        details: &[ScoreDetailRecord],
    ) -> (Vec<RoundResultRecord>, u64) {
        let required: HashSet<&RefereeId> = roster.iter().map(|a| &a.referee_id).collect();
        let roles: HashMap<&RefereeId, &str> = roster
            .iter()
            .map(|a| (&a.referee_id, a.role.as_str()))
            .collect();
        let mut by_entry: HashMap<&RegistrationRoundId, Vec<&ScoreDetailRecord>> = HashMap::new();
        for detail in details {
            by_entry
                .entry(&detail.registration_round_id)
                .or_default()
                .push(detail);
        }

        let now = Utc::now();
        let mut results = Vec::with_capacity(rows.len());
        let mut incomplete = 0;
        for row in rows {
            let submitted = by_entry
                .get(&row.registration_round_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            if !is_complete(&required, submitted.iter().map(|d| &d.referee_id)) {
                incomplete += 1;
                continue;
            }
            let scores: Vec<(f64, Option<&str>)> = submitted
                .iter()
                .map(|d| (d.score, roles.get(&d.referee_id).copied()))
                .collect();
            results.push(RoundResultRecord {
                registration_round_id: row.registration_round_id.clone(),
                round_id: row.round_id.clone(),
                status: None,
                total_score: aggregate_scores(&self.config.aggregation, &scores),
                score_detail_ids: submitted.iter().map(|d| d.score_detail_id.clone()).collect(),
                referee_count: submitted.len() as u32,
                rank: None,
                is_public: false,
                finalized_at: now,
                published_at: None,
            });
        }
        (results, incomplete)
    }

    fn aggregate_elimination(
        &self,
        rows: &[RegistrationRoundRecord],
        roster: &[RefereeAssignment],
        verdicts: &[VerdictRecord],
    ) -> (Vec<RoundResultRecord>, u64) {
        let required: HashSet<&RefereeId> = roster.iter().map(|a| &a.referee_id).collect();
        let mut by_entry: HashMap<&RegistrationRoundId, Vec<&VerdictRecord>> = HashMap::new();
        for verdict in verdicts {
            by_entry
                .entry(&verdict.registration_round_id)
                .or_default()
                .push(verdict);
        }

        let now = Utc::now();
        let mut results = Vec::with_capacity(rows.len());
        let mut incomplete = 0;
        for row in rows {
            let submitted = by_entry
                .get(&row.registration_round_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            if !is_complete(&required, submitted.iter().map(|v| &v.referee_id)) {
                incomplete += 1;
                continue;
            }
            let verdicts: Vec<Verdict> = submitted.iter().map(|v| v.verdict).collect();
            results.push(RoundResultRecord {
                registration_round_id: row.registration_round_id.clone(),
                round_id: row.round_id.clone(),
                status: decide_verdict(self.config.verdict, &verdicts),
                total_score: None,
                score_detail_ids: vec![],
                referee_count: submitted.len() as u32,
                rank: None,
                is_public: false,
                finalized_at: now,
                published_at: None,
            });
        }
        (results, incomplete)
    }
}

/// Order results the way the ranking resolver orders their entries.
fn order_by_rank(
    rows: &[RegistrationRoundRecord],
    results: Vec<RoundResultRecord>,
) -> Vec<RoundResultRecord> {
    let order: HashMap<RegistrationRoundId, usize> =
        ranking::standings(rows, &results, ranking::Visibility::Internal)
            .into_iter()
            .enumerate()
            .map(|(idx, s)| (s.registration_round_id, idx))
            .collect();
    let mut results = results;
    results.sort_by_key(|r| {
        order
            .get(&r.registration_round_id)
            .copied()
            .unwrap_or(usize::MAX)
    });
    results
}
