//! Round Progression State Machine.
//!
//! Round-level transitions are all-or-nothing and idempotent: the store
//! checks the postcondition on every call, so a retry after a partial
//! failure signal either completes the transition or reports that it was
//! already complete.

use std::sync::Arc;

use tracing::instrument;

use finjudge_state::{CompetitionStore, Page, RegistrationRoundRecord, RoundId, RoundStore};

use crate::config::JudgingConfig;
use crate::domain::{JudgeError, Result, RoundSnapshot, RoundSummary};
use crate::obs;
use crate::ranking::{self, Standing, Visibility};

/// Read every registration round of a round, page by page.
pub async fn load_round_rows<S>(
    store: &S,
    round_id: &RoundId,
    page_size: u32,
) -> Result<Vec<RegistrationRoundRecord>>
where
    S: RoundStore + ?Sized,
{
    let mut page = Page::first(page_size);
    let mut rows = Vec::new();
    loop {
        let batch = store.list_registration_rounds(round_id, page).await?;
        let more = batch.has_more(page) && !batch.items.is_empty();
        rows.extend(batch.items);
        if !more {
            return Ok(rows);
        }
        page = page.next();
    }
}

/// Round-level transitions and read views over a competition store.
pub struct RoundProgression<S> {
    store: Arc<S>,
    config: Arc<JudgingConfig>,
}

impl<S> Clone for RoundProgression<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S> RoundProgression<S>
where
    S: CompetitionStore,
{
    pub fn new(store: Arc<S>, config: Arc<JudgingConfig>) -> Self {
        Self { store, config }
    }

    /// Current rows and results of a round.
    pub async fn snapshot(&self, round_id: &RoundId) -> Result<RoundSnapshot> {
        let round = self.store.get_round(round_id).await?;
        let category = self.store.get_category(&round.category_id).await?;
        let rows = load_round_rows(self.store.as_ref(), round_id, self.config.page_size).await?;
        let results = self.store.list_round_results(round_id).await?;
        Ok(RoundSnapshot::new(
            round,
            category.requires_tanks,
            rows,
            results,
        ))
    }

    pub async fn summary(&self, round_id: &RoundId) -> Result<RoundSummary> {
        Ok(self.snapshot(round_id).await?.summary())
    }

    /// Flip every entry of the round to published.
    ///
    /// In a tank-requiring category this fails with `IncompleteAllocation`
    /// and publishes nothing while any entry lacks a tank. Returns how many
    /// entries changed; a repeat call returns 0.
    #[instrument(skip(self), fields(round_id = %round_id))]
    pub async fn publish_round(&self, round_id: &RoundId) -> Result<u64> {
        let snapshot = self.snapshot(round_id).await?;
        let unassigned = snapshot.unassigned();
        if unassigned > 0 {
            let err = JudgeError::IncompleteAllocation {
                round_id: round_id.to_string(),
                unassigned,
            };
            obs::emit_rejected("publish_round", err.kind(), &err);
            return Err(err);
        }

        // The store re-checks allocation inside the write.
        let flipped = self
            .store
            .set_round_published(round_id, snapshot.requires_tanks)
            .await?;
        obs::emit_round_published(round_id.as_str(), flipped, snapshot.rows.len() as u64);
        Ok(flipped)
    }

    /// Make every result of the round public.
    ///
    /// Requires a result for every entry (`IncompleteEvaluation` otherwise).
    /// Returns how many results changed; a repeat call returns 0.
    #[instrument(skip(self), fields(round_id = %round_id))]
    pub async fn publish_results(&self, round_id: &RoundId) -> Result<u64> {
        let snapshot = self.snapshot(round_id).await?;
        let unevaluated = snapshot.unevaluated();
        if unevaluated > 0 {
            let err = JudgeError::IncompleteEvaluation {
                round_id: round_id.to_string(),
                unevaluated,
            };
            obs::emit_rejected("publish_results", err.kind(), &err);
            return Err(err);
        }

        let flipped = self.store.set_results_published(round_id).await?;
        obs::emit_results_published(round_id.as_str(), flipped);
        Ok(flipped)
    }

    /// Ranked view of a round, recomputed from the current results.
    pub async fn standings(
        &self,
        round_id: &RoundId,
        visibility: Visibility,
    ) -> Result<Vec<Standing>> {
        self.store.get_round(round_id).await?;
        let rows = load_round_rows(self.store.as_ref(), round_id, self.config.page_size).await?;
        let results = self.store.list_round_results(round_id).await?;
        Ok(ranking::standings(&rows, &results, visibility))
    }
}
