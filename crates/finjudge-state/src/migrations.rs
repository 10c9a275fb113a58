//! SurrealDB schema migrations and initialization
//!
//! Unique indexes here are what make the database, not the caller, the
//! authority for duplicate submissions, duplicate registrations and
//! catalog identity.

use crate::error::StateError;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all finjudge tables.
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing finjudge SurrealDB schema");

    init_catalog_tables(db).await?;
    init_registration_rounds_table(db).await?;
    init_scoring_tables(db).await?;

    info!("finjudge schema initialization complete");
    Ok(())
}

async fn run(db: &Surreal<Any>, table: &str, sql: &str) -> Result<()> {
    debug!(table = table, "defining table");
    let mut response = db
        .query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    let errors = response.take_errors();
    if let Some(err) = errors.into_values().next() {
        return Err(StateError::SchemaSetup(format!("{table}: {err}")));
    }
    Ok(())
}

/// Reference data: categories, rounds, tanks, criteria, error types,
/// entries and referee rosters.
async fn init_catalog_tables(db: &Surreal<Any>) -> Result<()> {
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS categories SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_category_id ON TABLE categories COLUMNS category_id UNIQUE;

        DEFINE TABLE IF NOT EXISTS rounds SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_round_id ON TABLE rounds COLUMNS round_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_round_category ON TABLE rounds COLUMNS category_id;

        DEFINE TABLE IF NOT EXISTS tanks SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_tank_id ON TABLE tanks COLUMNS tank_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_tank_category ON TABLE tanks COLUMNS category_id;

        DEFINE TABLE IF NOT EXISTS criteria SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_criterion_id ON TABLE criteria COLUMNS criterion_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_criteria_scope ON TABLE criteria COLUMNS category_id, round_type;

        DEFINE TABLE IF NOT EXISTS error_types SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_error_type_id ON TABLE error_types COLUMNS error_type_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_error_type_name ON TABLE error_types COLUMNS criterion_id, name UNIQUE;

        DEFINE TABLE IF NOT EXISTS entries SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_entry_id ON TABLE entries COLUMNS entry_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_entry_number ON TABLE entries COLUMNS category_id, registration_number UNIQUE;

        DEFINE TABLE IF NOT EXISTS referee_roster SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_roster_member ON TABLE referee_roster COLUMNS round_id, referee_id UNIQUE;
    "#;
    run(db, "catalog", sql).await
}

/// `registration_rounds`: one row per (round, entry).
///
/// Constraints:
/// - `registration_round_id` is unique
/// - `(round_id, entry_id)` is unique, so advancement can never register an
///   entry twice in the same target round
async fn init_registration_rounds_table(db: &Surreal<Any>) -> Result<()> {
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS registration_rounds SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_rr_id ON TABLE registration_rounds COLUMNS registration_round_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_rr_round_entry ON TABLE registration_rounds COLUMNS round_id, entry_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_rr_round_tank ON TABLE registration_rounds COLUMNS round_id, tank_id;
    "#;
    run(db, "registration_rounds", sql).await
}

/// Score details, verdicts and round results.
///
/// Constraints:
/// - `(registration_round_id, referee_id)` is unique for score details and
///   verdicts: a second submission is rejected, never overwrites
/// - one result per registration round
async fn init_scoring_tables(db: &Surreal<Any>) -> Result<()> {
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS score_details SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_score_detail_id ON TABLE score_details COLUMNS score_detail_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_score_submission ON TABLE score_details COLUMNS registration_round_id, referee_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_score_round ON TABLE score_details COLUMNS round_id;

        DEFINE TABLE IF NOT EXISTS verdicts SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_verdict_submission ON TABLE verdicts COLUMNS registration_round_id, referee_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_verdict_round ON TABLE verdicts COLUMNS round_id;

        DEFINE TABLE IF NOT EXISTS round_results SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_result_rr ON TABLE round_results COLUMNS registration_round_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_result_round ON TABLE round_results COLUMNS round_id;
    "#;
    run(db, "scoring", sql).await
}
