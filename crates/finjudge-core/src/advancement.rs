//! Advancement Coordinator.
//!
//! Carries the selected entries of a finished sub-round into the first
//! sub-round of the next round type. The advancement marker on the source
//! round and every new registration round are committed by the store in one
//! atomic write, so concurrent or repeated callers produce exactly one set
//! of next-round entries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use finjudge_state::{
    CompetitionStore, EntryId, RegistrationRoundId, RegistrationRoundRecord, RoundId,
    RoundRecord, RoundResultRecord, ScoringMode, StorageError, Verdict,
};

use crate::config::{AdvancementPolicy, JudgingConfig};
use crate::domain::{JudgeError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::progression::load_round_rows;
use crate::ranking::{self, Visibility};

/// Outcome of a successful advancement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancementReport {
    pub source_round_id: RoundId,
    pub target_round_id: RoundId,
    pub advanced: Vec<EntryId>,
    pub created: Vec<RegistrationRoundRecord>,
}

impl AdvancementReport {
    pub fn count(&self) -> usize {
        self.created.len()
    }
}

/// Check that `target` is the first sub-round of the successor round type
/// in the source's category. `rounds` are all rounds of that category.
pub fn validate_target(
    source: &RoundRecord,
    target: &RoundRecord,
    rounds: &[RoundRecord],
) -> Result<()> {
    let invalid = |reason: String| JudgeError::InvalidTarget {
        source_round: source.round_id.to_string(),
        target_round: target.round_id.to_string(),
        reason,
    };
    let successor = source
        .round_type
        .successor()
        .ok_or_else(|| JudgeError::NoNextRound {
            round_id: source.round_id.to_string(),
            round_type: source.round_type,
        })?;
    if target.category_id != source.category_id {
        return Err(invalid(format!(
            "target belongs to category {}",
            target.category_id
        )));
    }
    if target.round_type != successor {
        return Err(invalid(format!(
            "target is a {} round, expected {}",
            target.round_type, successor
        )));
    }
    let first = rounds
        .iter()
        .filter(|r| r.round_type == successor)
        .map(|r| r.round_order)
        .min();
    if first != Some(target.round_order) {
        return Err(invalid(format!(
            "target is {} sub-round {}, not the first",
            successor, target.round_order
        )));
    }
    Ok(())
}

/// Pick the registration rounds that advance.
///
/// Elimination rounds carry every Pass. Weighted rounds follow `policy`.
pub fn select_advancing<'a>(
    mode: ScoringMode,
    policy: &AdvancementPolicy,
    rows: &'a [RegistrationRoundRecord],
    results: &[RoundResultRecord],
) -> Vec<&'a RegistrationRoundRecord> {
    let by_id: HashMap<&RegistrationRoundId, &RoundResultRecord> = results
        .iter()
        .map(|r| (&r.registration_round_id, r))
        .collect();
    let result_of = |row: &RegistrationRoundRecord| by_id.get(&row.registration_round_id).copied();

    match (mode, policy) {
        (ScoringMode::Elimination, _) => rows
            .iter()
            .filter(|row| result_of(*row).and_then(|r| r.status) == Some(Verdict::Pass))
            .collect(),
        (ScoringMode::Weighted, AdvancementPolicy::AllEvaluated) => rows
            .iter()
            .filter(|row| result_of(*row).and_then(|r| r.total_score).is_some())
            .collect(),
        (ScoringMode::Weighted, AdvancementPolicy::MinScore { threshold }) => rows
            .iter()
            .filter(|row| {
                result_of(*row)
                    .and_then(|r| r.total_score)
                    .map(|s| s >= *threshold)
                    .unwrap_or(false)
            })
            .collect(),
        (ScoringMode::Weighted, AdvancementPolicy::TopN { n }) => {
            let qualifying: HashSet<RegistrationRoundId> =
                ranking::standings(rows, results, Visibility::Internal)
                    .into_iter()
                    .filter(|s| s.rank.map(|rank| rank <= *n).unwrap_or(false))
                    .map(|s| s.registration_round_id)
                    .collect();
            rows.iter()
                .filter(|row| qualifying.contains(&row.registration_round_id))
                .collect()
        }
    }
}

/// Advancement over a competition store.
pub struct AdvancementCoordinator<S> {
    store: Arc<S>,
    config: Arc<JudgingConfig>,
}

impl<S> Clone for AdvancementCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S> AdvancementCoordinator<S>
where
    S: CompetitionStore,
{
    pub fn new(store: Arc<S>, config: Arc<JudgingConfig>) -> Self {
        Self { store, config }
    }

    /// Advance the selected entries of `source_id` into `target_id`.
    ///
    /// Preconditions, in order: the source round type has a successor
    /// (`NoNextRound`), the source carries no advancement marker
    /// (`AlreadyAdvanced`), the target is valid (`InvalidTarget`), and every
    /// source entry has a result (`IncompleteEvaluation`). The marker is
    /// checked again by the store inside the commit.
    #[instrument(skip(self), fields(source = %source_id, target = %target_id))]
    pub async fn advance(
        &self,
        source_id: &RoundId,
        target_id: &RoundId,
    ) -> Result<AdvancementReport> {
        let already_advanced = |advanced_to: String| JudgeError::AlreadyAdvanced {
            round_id: source_id.to_string(),
            advanced_to,
            requested: Some(target_id.to_string()),
        };

        let source = self.store.get_round(source_id).await?;
        if source.round_type.successor().is_none() {
            return Err(JudgeError::NoNextRound {
                round_id: source_id.to_string(),
                round_type: source.round_type,
            });
        }
        if let Some(previous) = &source.advanced_to {
            let err = already_advanced(previous.to_string());
            obs::emit_rejected("advance", err.kind(), &err);
            return Err(err);
        }

        let target = self.store.get_round(target_id).await?;
        let rounds = self.store.list_rounds(&source.category_id).await?;
        validate_target(&source, &target, &rounds)?;

        let rows = load_round_rows(self.store.as_ref(), source_id, self.config.page_size).await?;
        let results = self.store.list_round_results(source_id).await?;
        let evaluated: HashSet<&RegistrationRoundId> =
            results.iter().map(|r| &r.registration_round_id).collect();
        let unevaluated = rows
            .iter()
            .filter(|r| !evaluated.contains(&r.registration_round_id))
            .count() as u64;
        if unevaluated > 0 {
            let err = JudgeError::IncompleteEvaluation {
                round_id: source_id.to_string(),
                unevaluated,
            };
            obs::emit_rejected("advance", err.kind(), &err);
            return Err(err);
        }

        let selected: Vec<RegistrationRoundRecord> = select_advancing(
            source.round_type.scoring_mode(),
            &self.config.advancement,
            &rows,
            &results,
        )
        .into_iter()
        .cloned()
        .collect();
        info!(
            evaluated = rows.len(),
            selected = selected.len(),
            "advancement selection"
        );

        let created = match self
            .store
            .commit_advancement(source_id, target_id, &selected)
            .await
        {
            Ok(created) => created,
            Err(StorageError::AlreadyAdvanced { advanced_to, .. }) => {
                let err = already_advanced(advanced_to);
                obs::emit_rejected("advance", err.kind(), &err);
                return Err(err);
            }
            Err(failed @ (StorageError::Backend(_) | StorageError::Duplicate { .. })) => {
                // A commit that lost to a concurrent advancement leaves the
                // winner's marker behind.
                let err = match self.store.get_round(source_id).await {
                    Ok(RoundRecord {
                        advanced_to: Some(previous),
                        ..
                    }) => already_advanced(previous.to_string()),
                    _ => JudgeError::from(failed),
                };
                obs::emit_rejected("advance", err.kind(), &err);
                return Err(err);
            }
            Err(other) => return Err(other.into()),
        };

        METRICS.add_entries_advanced(created.len() as u64);
        obs::emit_round_advanced(source_id.as_str(), target_id.as_str(), created.len());
        Ok(AdvancementReport {
            source_round_id: source_id.clone(),
            target_round_id: target_id.clone(),
            advanced: selected.into_iter().map(|r| r.entry_id).collect(),
            created,
        })
    }
}
