//! Tank Allocator.
//!
//! Assignment is last-write-wins per entry. Occupancy (exclusivity or
//! capacity) is counted by the store at write time, so two callers can
//! never both claim the last slot of a tank.

use std::sync::Arc;

use tracing::{debug, instrument};

use finjudge_state::{
    CompetitionStore, RegistrationRoundId, RegistrationRoundRecord, StorageError, TankId,
};

use crate::config::JudgingConfig;
use crate::domain::{JudgeError, Result, ValidationError};
use crate::metrics::METRICS;
use crate::obs;
use crate::progression::load_round_rows;

/// Tank assignment over a competition store.
pub struct TankAllocator<S> {
    store: Arc<S>,
    config: Arc<JudgingConfig>,
}

impl<S> Clone for TankAllocator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S> TankAllocator<S>
where
    S: CompetitionStore,
{
    pub fn new(store: Arc<S>, config: Arc<JudgingConfig>) -> Self {
        Self { store, config }
    }

    /// Assign `tank_id` to a registration round.
    ///
    /// Fails with `AlreadyPublished` once the entry is published, with a
    /// validation error if the tank belongs to another category, and with
    /// `CapacityExceeded` when the tank is full in this sub-round. Repeating
    /// an assignment the entry already holds succeeds, before or after
    /// publish.
    #[instrument(skip(self), fields(registration_round_id = %registration_round_id, tank_id = %tank_id))]
    pub async fn assign_tank(
        &self,
        registration_round_id: &RegistrationRoundId,
        tank_id: &TankId,
    ) -> Result<RegistrationRoundRecord> {
        let row = self
            .store
            .get_registration_round(registration_round_id)
            .await?;
        if row.published {
            if row.tank_id.as_ref() == Some(tank_id) {
                debug!("tank already held, nothing to write");
                return Ok(row);
            }
            let err = JudgeError::AlreadyPublished {
                registration_round_id: registration_round_id.to_string(),
            };
            obs::emit_rejected("assign_tank", err.kind(), &err);
            return Err(err);
        }
        let round = self.store.get_round(&row.round_id).await?;
        let tank = self.store.get_tank(tank_id).await?;
        if tank.category_id != round.category_id {
            return Err(ValidationError::TankCategoryMismatch {
                tank_id: tank_id.to_string(),
                category_id: round.category_id.to_string(),
            }
            .into());
        }

        let limit = tank.occupancy_limit();
        let updated = match self
            .store
            .update_tank_assignment(registration_round_id, tank_id, limit)
            .await
        {
            Ok(updated) => updated,
            Err(StorageError::Backend(msg)) => {
                let err = self
                    .reconcile(registration_round_id, tank_id, limit, msg)
                    .await;
                obs::emit_rejected("assign_tank", err.kind(), &err);
                return Err(err);
            }
            Err(other) => {
                let err = JudgeError::from(other);
                obs::emit_rejected("assign_tank", err.kind(), &err);
                return Err(err);
            }
        };

        METRICS.inc_tanks_assigned();
        obs::emit_tank_assigned(registration_round_id.as_str(), tank_id.as_str());
        Ok(updated)
    }

    /// Explain a failed write from the state it left behind: a concurrent
    /// publish or a concurrent claim on the last slot. Anything else stays a
    /// storage error.
    async fn reconcile(
        &self,
        registration_round_id: &RegistrationRoundId,
        tank_id: &TankId,
        limit: Option<u32>,
        msg: String,
    ) -> JudgeError {
        let storage = JudgeError::Storage(msg);
        let Ok(row) = self.store.get_registration_round(registration_round_id).await else {
            return storage;
        };
        if row.published {
            return JudgeError::AlreadyPublished {
                registration_round_id: registration_round_id.to_string(),
            };
        }
        let Some(limit) = limit else {
            return storage;
        };
        let Ok(rows) =
            load_round_rows(self.store.as_ref(), &row.round_id, self.config.page_size).await
        else {
            return storage;
        };
        let occupancy = rows
            .iter()
            .filter(|r| {
                r.tank_id.as_ref() == Some(tank_id)
                    && r.registration_round_id != *registration_round_id
            })
            .count() as u32;
        if occupancy >= limit {
            JudgeError::CapacityExceeded {
                tank_id: tank_id.to_string(),
                round_id: row.round_id.to_string(),
                occupancy,
                limit,
            }
        } else {
            storage
        }
    }
}
