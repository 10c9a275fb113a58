//! Criteria Catalog.
//!
//! Criteria are the weighted axes a category is judged on for one round
//! type. Error types are named faults registered under a criterion in a
//! separate step, so recording an evaluation never changes the catalog.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use finjudge_state::{
    CategoryId, CompetitionStore, CriterionId, CriterionRecord, ErrorTypeId, ErrorTypeRecord,
    RoundType,
};

use crate::config::JudgingConfig;
use crate::domain::{JudgeError, Result, ValidationError};

/// One criterion as declared by an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionSpec {
    /// Optional stable id; generated when absent.
    #[serde(default)]
    pub criterion_id: Option<CriterionId>,
    pub name: String,
    pub weight: f64,
}

/// Check that weights sum to 1.0 within `tolerance`.
pub fn check_weight_sum(
    category_id: &CategoryId,
    round_type: RoundType,
    weights: impl IntoIterator<Item = f64>,
    tolerance: f64,
) -> std::result::Result<(), ValidationError> {
    let sum: f64 = weights.into_iter().sum();
    if (sum - 1.0).abs() > tolerance {
        return Err(ValidationError::WeightSum {
            category_id: category_id.to_string(),
            round_type,
            sum,
        });
    }
    Ok(())
}

/// Catalog operations over a competition store.
pub struct CriteriaCatalog<S> {
    store: Arc<S>,
    config: Arc<JudgingConfig>,
}

impl<S> Clone for CriteriaCatalog<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S> CriteriaCatalog<S>
where
    S: CompetitionStore,
{
    pub fn new(store: Arc<S>, config: Arc<JudgingConfig>) -> Self {
        Self { store, config }
    }

    /// Declare the full criteria set of a category and round type.
    ///
    /// The set is validated as a whole before anything is written: names and
    /// criterion ids are non-empty and unique, each weight is in (0, 1], and
    /// the weights sum to 1.0 within the configured tolerance. The store
    /// writes the set in one step, so a rejected definition leaves nothing
    /// behind.
    #[instrument(skip(self, specs), fields(category_id = %category_id, round_type = %round_type, count = specs.len()))]
    pub async fn define_criteria(
        &self,
        category_id: &CategoryId,
        round_type: RoundType,
        specs: Vec<CriterionSpec>,
    ) -> Result<Vec<CriterionRecord>> {
        self.store.get_category(category_id).await?;

        let mut seen = HashSet::new();
        for spec in &specs {
            if spec.name.trim().is_empty() {
                return Err(ValidationError::EmptyName {
                    field: "criterion name",
                }
                .into());
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(JudgeError::Duplicate {
                    kind: "criterion",
                    key: format!("{category_id}/{round_type}/{}", spec.name),
                });
            }
            if !(spec.weight > 0.0 && spec.weight <= 1.0) {
                return Err(ValidationError::InvalidWeight {
                    name: spec.name.clone(),
                    weight: spec.weight,
                }
                .into());
            }
        }
        check_weight_sum(
            category_id,
            round_type,
            specs.iter().map(|s| s.weight),
            self.config.weight_tolerance,
        )?;

        let existing = self.store.get_criteria(category_id, round_type).await?;
        if !existing.is_empty() {
            return Err(JudgeError::Duplicate {
                kind: "criteria set",
                key: format!("{category_id}/{round_type}"),
            });
        }

        let records: Vec<CriterionRecord> = specs
            .into_iter()
            .enumerate()
            .map(|(position, spec)| CriterionRecord {
                criterion_id: spec.criterion_id.unwrap_or_default(),
                category_id: category_id.clone(),
                round_type,
                name: spec.name,
                weight: spec.weight,
                position: position as u32,
            })
            .collect();
        let mut ids = HashSet::new();
        for record in &records {
            if !ids.insert(&record.criterion_id) {
                return Err(JudgeError::Duplicate {
                    kind: "criterion",
                    key: record.criterion_id.to_string(),
                });
            }
        }

        self.store
            .put_criteria(category_id, round_type, records.clone())
            .await?;
        info!(count = records.len(), "criteria defined");
        Ok(records)
    }

    /// Criteria of a category and round type, with the weight sum checked.
    pub async fn criteria(
        &self,
        category_id: &CategoryId,
        round_type: RoundType,
    ) -> Result<Vec<CriterionRecord>> {
        let criteria = self.store.get_criteria(category_id, round_type).await?;
        if !criteria.is_empty() {
            check_weight_sum(
                category_id,
                round_type,
                criteria.iter().map(|c| c.weight),
                self.config.weight_tolerance,
            )?;
        }
        Ok(criteria)
    }

    /// Register a named fault under a criterion.
    #[instrument(skip(self), fields(criterion_id = %criterion_id))]
    pub async fn register_error_type(
        &self,
        criterion_id: &CriterionId,
        name: &str,
    ) -> Result<ErrorTypeRecord> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName {
                field: "error type name",
            }
            .into());
        }
        self.store
            .get_criterion(criterion_id)
            .await
            .map_err(|_| ValidationError::UnknownCriterion {
                criterion_id: criterion_id.to_string(),
            })?;

        let record = ErrorTypeRecord {
            error_type_id: ErrorTypeId::new(),
            criterion_id: criterion_id.clone(),
            name: name.to_string(),
        };
        self.store.register_error_type(record.clone()).await?;
        info!(error_type_id = %record.error_type_id, name = %record.name, "error type registered");
        Ok(record)
    }

    pub async fn error_types(&self, criterion_id: &CriterionId) -> Result<Vec<ErrorTypeRecord>> {
        Ok(self.store.list_error_types(criterion_id).await?)
    }
}
