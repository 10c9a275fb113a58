//! In-memory fake for the storage traits
//!
//! `MemoryCompetitionStore` satisfies the `CatalogStore`, `RoundStore` and
//! `ScoreStore` contracts without external dependencies. All state lives
//! behind a single mutex, so every multi-row write is atomic and every list
//! call reads a consistent snapshot.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct Inner {
    categories: HashMap<CategoryId, CategoryRecord>,
    rounds: HashMap<RoundId, RoundRecord>,
    tanks: HashMap<TankId, TankRecord>,
    criteria: HashMap<CriterionId, CriterionRecord>,
    error_types: HashMap<ErrorTypeId, ErrorTypeRecord>,
    entries: HashMap<EntryId, EntryRecord>,
    referees: BTreeMap<(RoundId, RefereeId), RefereeAssignment>,
    registration_rounds: HashMap<RegistrationRoundId, RegistrationRoundRecord>,
    score_details: BTreeMap<(RegistrationRoundId, RefereeId), ScoreDetailRecord>,
    verdicts: BTreeMap<(RegistrationRoundId, RefereeId), VerdictRecord>,
    results: HashMap<RegistrationRoundId, RoundResultRecord>,
}

impl Inner {
    fn round_rows(&self, round_id: &RoundId) -> Vec<&RegistrationRoundRecord> {
        let mut rows: Vec<&RegistrationRoundRecord> = self
            .registration_rounds
            .values()
            .filter(|r| &r.round_id == round_id)
            .collect();
        rows.sort_by(|a, b| {
            a.registration_number
                .cmp(&b.registration_number)
                .then_with(|| a.registration_round_id.cmp(&b.registration_round_id))
        });
        rows
    }

    fn has_entry_in_round(&self, round_id: &RoundId, entry_id: &EntryId) -> bool {
        self.registration_rounds
            .values()
            .any(|r| &r.round_id == round_id && &r.entry_id == entry_id)
    }
}

/// In-memory competition store.
#[derive(Debug, Default)]
pub struct MemoryCompetitionStore {
    inner: Mutex<Inner>,
}

impl MemoryCompetitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// CatalogStore
// ---------------------------------------------------------------------------

#[async_trait]
impl CatalogStore for MemoryCompetitionStore {
    async fn put_category(&self, category: CategoryRecord) -> StorageResult<()> {
        let mut inner = self.lock();
        if inner.categories.contains_key(&category.category_id) {
            return Err(StorageError::Duplicate {
                kind: "category",
                key: category.category_id.to_string(),
            });
        }
        inner
            .categories
            .insert(category.category_id.clone(), category);
        Ok(())
    }

    async fn get_category(&self, category_id: &CategoryId) -> StorageResult<CategoryRecord> {
        self.lock()
            .categories
            .get(category_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("category", category_id))
    }

    async fn put_round(&self, round: RoundRecord) -> StorageResult<()> {
        let mut inner = self.lock();
        if inner.rounds.contains_key(&round.round_id) {
            return Err(StorageError::Duplicate {
                kind: "round",
                key: round.round_id.to_string(),
            });
        }
        inner.rounds.insert(round.round_id.clone(), round);
        Ok(())
    }

    async fn get_round(&self, round_id: &RoundId) -> StorageResult<RoundRecord> {
        self.lock()
            .rounds
            .get(round_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("round", round_id))
    }

    async fn list_rounds(&self, category_id: &CategoryId) -> StorageResult<Vec<RoundRecord>> {
        let inner = self.lock();
        let mut rounds: Vec<RoundRecord> = inner
            .rounds
            .values()
            .filter(|r| &r.category_id == category_id)
            .cloned()
            .collect();
        rounds.sort_by_key(|r| (r.round_type, r.round_order));
        Ok(rounds)
    }

    async fn put_tank(&self, tank: TankRecord) -> StorageResult<()> {
        let mut inner = self.lock();
        if inner.tanks.contains_key(&tank.tank_id) {
            return Err(StorageError::Duplicate {
                kind: "tank",
                key: tank.tank_id.to_string(),
            });
        }
        inner.tanks.insert(tank.tank_id.clone(), tank);
        Ok(())
    }

    async fn get_tank(&self, tank_id: &TankId) -> StorageResult<TankRecord> {
        self.lock()
            .tanks
            .get(tank_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("tank", tank_id))
    }

    async fn list_tanks(&self, category_id: &CategoryId) -> StorageResult<Vec<TankRecord>> {
        let inner = self.lock();
        let mut tanks: Vec<TankRecord> = inner
            .tanks
            .values()
            .filter(|t| &t.category_id == category_id)
            .cloned()
            .collect();
        tanks.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(tanks)
    }

    async fn put_criteria(
        &self,
        category_id: &CategoryId,
        round_type: RoundType,
        criteria: Vec<CriterionRecord>,
    ) -> StorageResult<()> {
        let mut inner = self.lock();
        if inner
            .criteria
            .values()
            .any(|c| &c.category_id == category_id && c.round_type == round_type)
        {
            return Err(StorageError::Duplicate {
                kind: "criteria set",
                key: format!("{category_id}/{round_type}"),
            });
        }
        let mut ids = HashSet::new();
        for criterion in &criteria {
            if inner.criteria.contains_key(&criterion.criterion_id)
                || !ids.insert(&criterion.criterion_id)
            {
                return Err(StorageError::Duplicate {
                    kind: "criterion",
                    key: criterion.criterion_id.to_string(),
                });
            }
        }
        for criterion in criteria {
            inner
                .criteria
                .insert(criterion.criterion_id.clone(), criterion);
        }
        Ok(())
    }

    async fn get_criterion(&self, criterion_id: &CriterionId) -> StorageResult<CriterionRecord> {
        self.lock()
            .criteria
            .get(criterion_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("criterion", criterion_id))
    }

    async fn get_criteria(
        &self,
        category_id: &CategoryId,
        round_type: RoundType,
    ) -> StorageResult<Vec<CriterionRecord>> {
        let inner = self.lock();
        let mut criteria: Vec<CriterionRecord> = inner
            .criteria
            .values()
            .filter(|c| &c.category_id == category_id && c.round_type == round_type)
            .cloned()
            .collect();
        criteria.sort_by_key(|c| c.position);
        Ok(criteria)
    }

    async fn register_error_type(&self, error_type: ErrorTypeRecord) -> StorageResult<()> {
        let mut inner = self.lock();
        let clash = inner.error_types.values().any(|e| {
            e.error_type_id == error_type.error_type_id
                || (e.criterion_id == error_type.criterion_id && e.name == error_type.name)
        });
        if clash {
            return Err(StorageError::Duplicate {
                kind: "error type",
                key: format!("{}/{}", error_type.criterion_id, error_type.name),
            });
        }
        inner
            .error_types
            .insert(error_type.error_type_id.clone(), error_type);
        Ok(())
    }

    async fn get_error_type(&self, error_type_id: &ErrorTypeId) -> StorageResult<ErrorTypeRecord> {
        self.lock()
            .error_types
            .get(error_type_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("error type", error_type_id))
    }

    async fn list_error_types(
        &self,
        criterion_id: &CriterionId,
    ) -> StorageResult<Vec<ErrorTypeRecord>> {
        let inner = self.lock();
        let mut types: Vec<ErrorTypeRecord> = inner
            .error_types
            .values()
            .filter(|e| &e.criterion_id == criterion_id)
            .cloned()
            .collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(types)
    }

    async fn put_entry(&self, entry: EntryRecord) -> StorageResult<()> {
        let mut inner = self.lock();
        let clash = inner.entries.values().any(|e| {
            e.entry_id == entry.entry_id
                || (e.category_id == entry.category_id
                    && e.registration_number == entry.registration_number)
        });
        if clash {
            return Err(StorageError::Duplicate {
                kind: "entry",
                key: format!("{}/{}", entry.category_id, entry.registration_number),
            });
        }
        inner.entries.insert(entry.entry_id.clone(), entry);
        Ok(())
    }

    async fn get_entry(&self, entry_id: &EntryId) -> StorageResult<EntryRecord> {
        self.lock()
            .entries
            .get(entry_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("entry", entry_id))
    }

    async fn assign_referee(&self, assignment: RefereeAssignment) -> StorageResult<()> {
        let mut inner = self.lock();
        inner.referees.insert(
            (assignment.round_id.clone(), assignment.referee_id.clone()),
            assignment,
        );
        Ok(())
    }

    async fn list_referees(&self, round_id: &RoundId) -> StorageResult<Vec<RefereeAssignment>> {
        let inner = self.lock();
        Ok(inner
            .referees
            .values()
            .filter(|a| &a.round_id == round_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// RoundStore
// ---------------------------------------------------------------------------

#[async_trait]
impl RoundStore for MemoryCompetitionStore {
    async fn create_registration_round(
        &self,
        round_id: &RoundId,
        entry_id: &EntryId,
    ) -> StorageResult<RegistrationRoundRecord> {
        let mut inner = self.lock();
        if !inner.rounds.contains_key(round_id) {
            return Err(StorageError::not_found("round", round_id));
        }
        let entry = inner
            .entries
            .get(entry_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("entry", entry_id))?;
        if inner.has_entry_in_round(round_id, entry_id) {
            return Err(StorageError::Duplicate {
                kind: "registration round",
                key: format!("{}/{}", round_id, entry_id),
            });
        }
        let record =
            RegistrationRoundRecord::new(round_id.clone(), entry_id.clone(), entry.registration_number);
        inner
            .registration_rounds
            .insert(record.registration_round_id.clone(), record.clone());
        Ok(record)
    }

    async fn get_registration_round(
        &self,
        registration_round_id: &RegistrationRoundId,
    ) -> StorageResult<RegistrationRoundRecord> {
        self.lock()
            .registration_rounds
            .get(registration_round_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("registration round", registration_round_id))
    }

    async fn list_registration_rounds(
        &self,
        round_id: &RoundId,
        page: Page,
    ) -> StorageResult<PageResult<RegistrationRoundRecord>> {
        let inner = self.lock();
        let rows = inner.round_rows(round_id);
        let total = rows.len() as u64;
        let items = rows
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size as usize)
            .cloned()
            .collect();
        Ok(PageResult { items, total })
    }

    async fn update_tank_assignment(
        &self,
        registration_round_id: &RegistrationRoundId,
        tank_id: &TankId,
        occupancy_limit: Option<u32>,
    ) -> StorageResult<RegistrationRoundRecord> {
        let mut inner = self.lock();
        let current = inner
            .registration_rounds
            .get(registration_round_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("registration round", registration_round_id))?;
        if current.published {
            return Err(StorageError::AlreadyPublished {
                registration_round_id: registration_round_id.to_string(),
            });
        }
        if let Some(limit) = occupancy_limit {
            let occupancy = inner
                .registration_rounds
                .values()
                .filter(|r| {
                    r.round_id == current.round_id
                        && r.registration_round_id != current.registration_round_id
                        && r.tank_id.as_ref() == Some(tank_id)
                })
                .count() as u32;
            if occupancy >= limit {
                return Err(StorageError::TankOccupied {
                    tank_id: tank_id.to_string(),
                    round_id: current.round_id.to_string(),
                    occupancy,
                    limit,
                });
            }
        }
        let row = inner
            .registration_rounds
            .get_mut(registration_round_id)
            .ok_or_else(|| StorageError::not_found("registration round", registration_round_id))?;
        row.tank_id = Some(tank_id.clone());
        Ok(row.clone())
    }

    async fn set_round_published(
        &self,
        round_id: &RoundId,
        require_tanks: bool,
    ) -> StorageResult<u64> {
        let mut inner = self.lock();
        if !inner.rounds.contains_key(round_id) {
            return Err(StorageError::not_found("round", round_id));
        }
        if require_tanks {
            let unassigned = inner
                .round_rows(round_id)
                .iter()
                .filter(|r| r.tank_id.is_none())
                .count() as u64;
            if unassigned > 0 {
                return Err(StorageError::IncompleteAllocation {
                    round_id: round_id.to_string(),
                    unassigned,
                });
            }
        }
        let now = Utc::now();
        let mut flipped = 0;
        for row in inner
            .registration_rounds
            .values_mut()
            .filter(|r| &r.round_id == round_id && !r.published)
        {
            row.published = true;
            row.published_at = Some(now);
            flipped += 1;
        }
        if let Some(round) = inner.rounds.get_mut(round_id) {
            round.published = true;
        }
        Ok(flipped)
    }

    async fn commit_advancement(
        &self,
        source: &RoundId,
        target: &RoundId,
        carried: &[RegistrationRoundRecord],
    ) -> StorageResult<Vec<RegistrationRoundRecord>> {
        let mut inner = self.lock();
        let source_round = inner
            .rounds
            .get(source)
            .ok_or_else(|| StorageError::not_found("round", source))?;
        if let Some(previous) = &source_round.advanced_to {
            return Err(StorageError::AlreadyAdvanced {
                round_id: source.to_string(),
                advanced_to: previous.to_string(),
            });
        }
        if !inner.rounds.contains_key(target) {
            return Err(StorageError::not_found("round", target));
        }

        // Validate every row before touching anything.
        let created: Vec<RegistrationRoundRecord> =
            carried.iter().map(|r| r.carried_into(target)).collect();
        for row in &created {
            if inner.has_entry_in_round(target, &row.entry_id) {
                return Err(StorageError::Duplicate {
                    kind: "registration round",
                    key: format!("{}/{}", target, row.entry_id),
                });
            }
        }

        for row in &created {
            inner
                .registration_rounds
                .insert(row.registration_round_id.clone(), row.clone());
        }
        if let Some(round) = inner.rounds.get_mut(source) {
            round.advanced_to = Some(target.clone());
            round.advanced_at = Some(Utc::now());
        }
        Ok(created)
    }
}

// ---------------------------------------------------------------------------
// ScoreStore
// ---------------------------------------------------------------------------

#[async_trait]
impl ScoreStore for MemoryCompetitionStore {
    async fn create_score_detail(&self, detail: ScoreDetailRecord) -> StorageResult<()> {
        let mut inner = self.lock();
        let key = (
            detail.registration_round_id.clone(),
            detail.referee_id.clone(),
        );
        if inner.score_details.contains_key(&key) {
            return Err(StorageError::DuplicateSubmission {
                registration_round_id: detail.registration_round_id.to_string(),
                referee_id: detail.referee_id.to_string(),
            });
        }
        inner.score_details.insert(key, detail);
        Ok(())
    }

    async fn create_verdict(&self, verdict: VerdictRecord) -> StorageResult<()> {
        let mut inner = self.lock();
        let key = (
            verdict.registration_round_id.clone(),
            verdict.referee_id.clone(),
        );
        if inner.verdicts.contains_key(&key) {
            return Err(StorageError::DuplicateSubmission {
                registration_round_id: verdict.registration_round_id.to_string(),
                referee_id: verdict.referee_id.to_string(),
            });
        }
        inner.verdicts.insert(key, verdict);
        Ok(())
    }

    async fn list_score_details(&self, round_id: &RoundId) -> StorageResult<Vec<ScoreDetailRecord>> {
        let inner = self.lock();
        Ok(inner
            .score_details
            .values()
            .filter(|d| &d.round_id == round_id)
            .cloned()
            .collect())
    }

    async fn list_verdicts(&self, round_id: &RoundId) -> StorageResult<Vec<VerdictRecord>> {
        let inner = self.lock();
        Ok(inner
            .verdicts
            .values()
            .filter(|v| &v.round_id == round_id)
            .cloned()
            .collect())
    }

    async fn replace_round_results(
        &self,
        round_id: &RoundId,
        results: Vec<RoundResultRecord>,
    ) -> StorageResult<()> {
        let mut inner = self.lock();
        if inner
            .results
            .values()
            .any(|r| &r.round_id == round_id && r.is_public)
        {
            return Err(StorageError::ResultsAlreadyPublic {
                round_id: round_id.to_string(),
            });
        }
        inner.results.retain(|_, r| &r.round_id != round_id);
        for result in results {
            inner
                .results
                .insert(result.registration_round_id.clone(), result);
        }
        Ok(())
    }

    async fn list_round_results(
        &self,
        round_id: &RoundId,
    ) -> StorageResult<Vec<RoundResultRecord>> {
        let inner = self.lock();
        let mut results: Vec<RoundResultRecord> = inner
            .results
            .values()
            .filter(|r| &r.round_id == round_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| a.registration_round_id.cmp(&b.registration_round_id));
        Ok(results)
    }

    async fn set_results_published(&self, round_id: &RoundId) -> StorageResult<u64> {
        let mut inner = self.lock();
        if !inner.rounds.contains_key(round_id) {
            return Err(StorageError::not_found("round", round_id));
        }
        let now = Utc::now();
        let mut flipped = 0;
        for result in inner
            .results
            .values_mut()
            .filter(|r| &r.round_id == round_id && !r.is_public)
        {
            result.is_public = true;
            result.published_at = Some(now);
            flipped += 1;
        }
        if let Some(round) = inner.rounds.get_mut(round_id) {
            round.results_published = true;
        }
        Ok(flipped)
    }
}
