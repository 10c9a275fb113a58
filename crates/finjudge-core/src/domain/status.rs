//! Per-entry lifecycle status, derived rather than stored.
//!
//! `Unassigned → TankAssigned → Published → Evaluated → ResultPublished`.
//! Every status is a pure function of one registration round and its
//! (optional) round result; no flag mirrors it anywhere else.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use finjudge_state::{
    RegistrationRoundId, RegistrationRoundRecord, RoundId, RoundRecord, RoundResultRecord,
    RoundType,
};

/// Lifecycle position of one registration round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Unassigned,
    TankAssigned,
    Published,
    Evaluated,
    ResultPublished,
}

/// Derive the status of one registration round.
pub fn entry_status(
    row: &RegistrationRoundRecord,
    result: Option<&RoundResultRecord>,
) -> EntryStatus {
    match result {
        Some(r) if r.is_public => EntryStatus::ResultPublished,
        Some(_) => EntryStatus::Evaluated,
        None if row.published => EntryStatus::Published,
        None if row.tank_id.is_some() => EntryStatus::TankAssigned,
        None => EntryStatus::Unassigned,
    }
}

/// Rows that would block publication in a tank-requiring category.
pub fn count_unassigned(rows: &[RegistrationRoundRecord]) -> u64 {
    rows.iter().filter(|r| r.tank_id.is_none()).count() as u64
}

/// A consistent view of one round: its registration rounds and results.
#[derive(Debug, Clone)]
pub struct RoundSnapshot {
    pub round: RoundRecord,
    pub requires_tanks: bool,
    pub rows: Vec<RegistrationRoundRecord>,
    results: HashMap<RegistrationRoundId, RoundResultRecord>,
}

impl RoundSnapshot {
    pub fn new(
        round: RoundRecord,
        requires_tanks: bool,
        rows: Vec<RegistrationRoundRecord>,
        results: Vec<RoundResultRecord>,
    ) -> Self {
        let results = results
            .into_iter()
            .map(|r| (r.registration_round_id.clone(), r))
            .collect();
        Self {
            round,
            requires_tanks,
            rows,
            results,
        }
    }

    pub fn result(&self, id: &RegistrationRoundId) -> Option<&RoundResultRecord> {
        self.results.get(id)
    }

    pub fn status_of(&self, row: &RegistrationRoundRecord) -> EntryStatus {
        entry_status(row, self.result(&row.registration_round_id))
    }

    /// Entries lacking a tank, counted only when the category requires tanks.
    pub fn unassigned(&self) -> u64 {
        if self.requires_tanks {
            count_unassigned(&self.rows)
        } else {
            0
        }
    }

    pub fn all_published(&self) -> bool {
        self.rows.iter().all(|r| r.published)
    }

    /// Entries without a round result.
    pub fn unevaluated(&self) -> u64 {
        self.rows
            .iter()
            .filter(|r| !self.results.contains_key(&r.registration_round_id))
            .count() as u64
    }

    pub fn all_evaluated(&self) -> bool {
        self.unevaluated() == 0
    }

    pub fn all_results_public(&self) -> bool {
        self.rows.iter().all(|r| {
            self.result(&r.registration_round_id)
                .map(|res| res.is_public)
                .unwrap_or(false)
        })
    }

    pub fn summary(&self) -> RoundSummary {
        let mut counts = StatusCounts::default();
        for row in &self.rows {
            counts.add(self.status_of(row));
        }
        RoundSummary {
            round_id: self.round.round_id.clone(),
            round_type: self.round.round_type,
            round_order: self.round.round_order,
            total: self.rows.len() as u64,
            counts,
            unassigned: self.unassigned(),
            all_published: self.all_published(),
            all_evaluated: self.all_evaluated(),
            all_results_public: self.all_results_public(),
            advanced_to: self.round.advanced_to.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub unassigned: u64,
    pub tank_assigned: u64,
    pub published: u64,
    pub evaluated: u64,
    pub result_published: u64,
}

impl StatusCounts {
    fn add(&mut self, status: EntryStatus) {
        let slot = match status {
            EntryStatus::Unassigned => &mut self.unassigned,
            EntryStatus::TankAssigned => &mut self.tank_assigned,
            EntryStatus::Published => &mut self.published,
            EntryStatus::Evaluated => &mut self.evaluated,
            EntryStatus::ResultPublished => &mut self.result_published,
        };
        *slot += 1;
    }
}

/// Operator-facing round status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round_id: RoundId,
    pub round_type: RoundType,
    pub round_order: u32,
    pub total: u64,
    pub counts: StatusCounts,
    pub unassigned: u64,
    pub all_published: bool,
    pub all_evaluated: bool,
    pub all_results_public: bool,
    pub advanced_to: Option<RoundId>,
}
