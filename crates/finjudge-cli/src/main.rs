//! finjudge - judged show competition CLI
//!
//! The `finjudge` command drives one competition stored in SurrealDB.
//!
//! ## Commands
//!
//! - `seed`: Load categories, rounds, tanks, criteria, entries and referees
//! - `assign-tank` / `publish-round`: Prepare and open a sub-round
//! - `evaluate` / `verdict`: Record one referee's submission
//! - `finalize` / `publish-results`: Aggregate and reveal results
//! - `advance`: Carry entries into the next round type
//! - `status` / `standings`: Inspect a round
//!
//! Every command prints JSON on stdout. Logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, Instrument, Level};

use finjudge_core::metrics::METRICS;
use finjudge_core::telemetry::init_tracing;
use finjudge_core::{
    round_span, Competition, CriteriaErrorInput, CriterionSpec, JudgeError, JudgingConfig,
    Visibility,
};
use finjudge_state::{
    CategoryId, CategoryRecord, CompetitionStore, CriterionId, EntryId, EntryRecord,
    RefereeAssignment, RefereeId, RegistrationRoundId, RoundId, RoundRecord, RoundType,
    SurrealCompetitionStore, TankId, TankRecord, Verdict,
};

#[derive(Parser)]
#[command(name = "finjudge")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Round progression and scoring for judged show competitions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Judging config (TOML); defaults apply when absent
    #[arg(long, global = true, env = "FINJUDGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a competition fixture (JSON)
    Seed {
        /// Path to the fixture file
        fixture: PathBuf,
    },

    /// Show the criteria of a category for one round type
    Criteria {
        category: String,

        #[arg(value_parser = parse_round_type)]
        round_type: RoundType,
    },

    /// Register a named error type under a criterion
    RegisterErrorType {
        #[arg(long)]
        criterion: String,

        #[arg(long)]
        name: String,
    },

    /// Assign a tank to an entry's registration round
    AssignTank {
        /// Registration round id
        #[arg(long)]
        entry: String,

        #[arg(long)]
        tank: String,
    },

    /// Publish every entry of a round
    PublishRound { round: String },

    /// Record a referee's weighted evaluation
    Evaluate {
        /// Registration round id
        #[arg(long)]
        entry: String,

        #[arg(long)]
        referee: String,

        /// Baseline score (default from config)
        #[arg(long)]
        initial: Option<f64>,

        /// JSON file holding a list of criteria errors
        #[arg(long)]
        errors: Option<PathBuf>,
    },

    /// Record a referee's Pass/Fail verdict
    Verdict {
        /// Registration round id
        #[arg(long)]
        entry: String,

        #[arg(long)]
        referee: String,

        #[arg(value_enum)]
        verdict: VerdictArg,
    },

    /// Aggregate submissions into ranked round results
    Finalize { round: String },

    /// Make a round's results public
    PublishResults { round: String },

    /// Ranked standings of a round
    Standings {
        round: String,

        /// Include results that are not public yet
        #[arg(long)]
        internal: bool,
    },

    /// Advance selected entries of a round into the next round type
    Advance { source: String, target: String },

    /// Lifecycle counts of a round
    Status { round: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum VerdictArg {
    Pass,
    Fail,
}

impl From<VerdictArg> for Verdict {
    fn from(arg: VerdictArg) -> Self {
        match arg {
            VerdictArg::Pass => Verdict::Pass,
            VerdictArg::Fail => Verdict::Fail,
        }
    }
}

fn parse_round_type(s: &str) -> std::result::Result<RoundType, String> {
    match s.to_ascii_lowercase().as_str() {
        "preliminary" => Ok(RoundType::Preliminary),
        "evaluation" => Ok(RoundType::Evaluation),
        "final" => Ok(RoundType::Final),
        other => Err(format!(
            "unknown round type '{other}' (expected preliminary, evaluation or final)"
        )),
    }
}

/// Attach the error kind so scripts can match on it.
fn judged(err: JudgeError) -> anyhow::Error {
    anyhow!("[{}] {}", err.kind(), err)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let config = match &cli.config {
        Some(path) => JudgingConfig::load(path).map_err(judged)?,
        None => JudgingConfig::default(),
    };
    let store = SurrealCompetitionStore::from_env()
        .await
        .context("Failed to connect to finjudge database")?;
    let competition = Competition::new(Arc::new(store), config).map_err(judged)?;

    let output = run(&competition, cli.command).await;
    METRICS.flush();
    println!("{}", serde_json::to_string_pretty(&output?)?);
    Ok(())
}

async fn run<S: CompetitionStore>(
    competition: &Competition<S>,
    command: Commands,
) -> Result<Value> {
    match command {
        Commands::Seed { fixture } => cmd_seed(competition, &fixture).await,
        Commands::Criteria {
            category,
            round_type,
        } => {
            let criteria = competition
                .catalog
                .criteria(&CategoryId::from(category), round_type)
                .await
                .map_err(judged)?;
            Ok(serde_json::to_value(criteria)?)
        }
        Commands::RegisterErrorType { criterion, name } => {
            let error_type = competition
                .catalog
                .register_error_type(&CriterionId::from(criterion), &name)
                .await
                .map_err(judged)?;
            Ok(serde_json::to_value(error_type)?)
        }
        Commands::AssignTank { entry, tank } => {
            let row = competition
                .tanks
                .assign_tank(&RegistrationRoundId::from(entry), &TankId::from(tank))
                .await
                .map_err(judged)?;
            Ok(serde_json::to_value(row)?)
        }
        Commands::PublishRound { round } => {
            let round_id = RoundId::from(round);
            let flipped = competition
                .progression
                .publish_round(&round_id)
                .instrument(round_span(round_id.as_str()))
                .await
                .map_err(judged)?;
            Ok(json!({ "round_id": round_id, "published": flipped }))
        }
        Commands::Evaluate {
            entry,
            referee,
            initial,
            errors,
        } => {
            let errors = match errors {
                Some(path) => read_json_file::<Vec<CriteriaErrorInput>>(&path)?,
                None => Vec::new(),
            };
            let detail = competition
                .scoring
                .record_evaluation(
                    &RegistrationRoundId::from(entry),
                    &RefereeId::from(referee),
                    initial,
                    errors,
                )
                .await
                .map_err(judged)?;
            Ok(serde_json::to_value(detail)?)
        }
        Commands::Verdict {
            entry,
            referee,
            verdict,
        } => {
            let record = competition
                .scoring
                .record_verdict(
                    &RegistrationRoundId::from(entry),
                    &RefereeId::from(referee),
                    verdict.into(),
                )
                .await
                .map_err(judged)?;
            Ok(serde_json::to_value(record)?)
        }
        Commands::Finalize { round } => {
            let round_id = RoundId::from(round);
            let results = competition
                .scoring
                .finalize_round(&round_id)
                .instrument(round_span(round_id.as_str()))
                .await
                .map_err(judged)?;
            Ok(serde_json::to_value(results)?)
        }
        Commands::PublishResults { round } => {
            let round_id = RoundId::from(round);
            let flipped = competition
                .progression
                .publish_results(&round_id)
                .instrument(round_span(round_id.as_str()))
                .await
                .map_err(judged)?;
            Ok(json!({ "round_id": round_id, "results_published": flipped }))
        }
        Commands::Standings { round, internal } => {
            let visibility = if internal {
                Visibility::Internal
            } else {
                Visibility::Public
            };
            let standings = competition
                .progression
                .standings(&RoundId::from(round), visibility)
                .await
                .map_err(judged)?;
            Ok(serde_json::to_value(standings)?)
        }
        Commands::Advance { source, target } => cmd_advance(competition, source, target).await,
        Commands::Status { round } => {
            let summary = competition
                .progression
                .summary(&RoundId::from(round))
                .await
                .map_err(judged)?;
            Ok(serde_json::to_value(summary)?)
        }
    }
}

/// Advance, treating a repeat of an already committed advancement as success.
async fn cmd_advance<S: CompetitionStore>(
    competition: &Competition<S>,
    source: String,
    target: String,
) -> Result<Value> {
    let source = RoundId::from(source);
    let target = RoundId::from(target);
    match competition
        .advancement
        .advance(&source, &target)
        .instrument(round_span(source.as_str()))
        .await
    {
        Ok(report) => Ok(serde_json::to_value(report)?),
        Err(err) if err.is_benign_retry() => {
            info!(source = %source, target = %target, "advancement already committed");
            Ok(json!({
                "source_round_id": source,
                "target_round_id": target,
                "already_advanced": true,
            }))
        }
        Err(err) => Err(judged(err)),
    }
}

// ---- Seeding ----

#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(default)]
    categories: Vec<CategoryRecord>,
    #[serde(default)]
    rounds: Vec<RoundSeed>,
    #[serde(default)]
    tanks: Vec<TankRecord>,
    #[serde(default)]
    criteria: Vec<CriteriaSeed>,
    #[serde(default)]
    entries: Vec<EntrySeed>,
    #[serde(default)]
    referees: Vec<RefereeAssignment>,
}

#[derive(Debug, Deserialize)]
struct RoundSeed {
    round_id: Option<RoundId>,
    category_id: CategoryId,
    round_type: RoundType,
    round_order: u32,
    name: String,
}

#[derive(Debug, Deserialize)]
struct CriteriaSeed {
    category_id: CategoryId,
    round_type: RoundType,
    criteria: Vec<CriterionSpec>,
}

#[derive(Debug, Deserialize)]
struct EntrySeed {
    entry_id: Option<EntryId>,
    category_id: CategoryId,
    registration_number: String,
    name: String,
    /// Round to register the entry in, usually the first preliminary
    round_id: Option<RoundId>,
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Invalid JSON in {}", path.display()))
}

async fn cmd_seed<S: CompetitionStore>(competition: &Competition<S>, path: &Path) -> Result<Value> {
    let fixture: Fixture = read_json_file(path)?;
    let store = competition.store();

    for category in &fixture.categories {
        store.put_category(category.clone()).await?;
    }

    let mut round_ids = Vec::with_capacity(fixture.rounds.len());
    for seed in fixture.rounds {
        let mut round = RoundRecord::new(
            seed.category_id,
            seed.round_type,
            seed.round_order,
            seed.name,
        );
        if let Some(id) = seed.round_id {
            round.round_id = id;
        }
        round_ids.push(round.round_id.clone());
        store.put_round(round).await?;
    }

    for tank in &fixture.tanks {
        store.put_tank(tank.clone()).await?;
    }

    let mut criteria = 0;
    for seed in fixture.criteria {
        criteria += competition
            .catalog
            .define_criteria(&seed.category_id, seed.round_type, seed.criteria)
            .await
            .map_err(judged)?
            .len();
    }

    let mut registrations = Vec::new();
    for seed in &fixture.entries {
        let entry = EntryRecord {
            entry_id: seed.entry_id.clone().unwrap_or_default(),
            category_id: seed.category_id.clone(),
            registration_number: seed.registration_number.clone(),
            name: seed.name.clone(),
        };
        store.put_entry(entry.clone()).await?;
        if let Some(round_id) = &seed.round_id {
            let row = store
                .create_registration_round(round_id, &entry.entry_id)
                .await?;
            registrations.push(json!({
                "registration_number": row.registration_number,
                "registration_round_id": row.registration_round_id,
                "round_id": row.round_id,
            }));
        }
    }

    for assignment in &fixture.referees {
        store.assign_referee(assignment.clone()).await?;
    }

    info!(
        categories = fixture.categories.len(),
        rounds = round_ids.len(),
        tanks = fixture.tanks.len(),
        criteria,
        entries = fixture.entries.len(),
        "fixture seeded"
    );
    Ok(json!({
        "categories": fixture.categories.len(),
        "rounds": round_ids,
        "tanks": fixture.tanks.len(),
        "criteria": criteria,
        "entries": fixture.entries.len(),
        "registrations": registrations,
        "referees": fixture.referees.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use finjudge_state::fakes::MemoryCompetitionStore;
    use std::io::Write;

    const FIXTURE: &str = r#"{
        "categories": [
            { "category_id": "kohaku", "name": "Kohaku", "requires_tanks": false }
        ],
        "rounds": [
            { "round_id": "prelim", "category_id": "kohaku", "round_type": "preliminary", "round_order": 1, "name": "Preliminary" },
            { "round_id": "eval", "category_id": "kohaku", "round_type": "evaluation", "round_order": 1, "name": "Evaluation" },
            { "round_id": "final", "category_id": "kohaku", "round_type": "final", "round_order": 1, "name": "Final" }
        ],
        "tanks": [
            { "tank_id": "t1", "category_id": "kohaku", "label": "T1", "exclusive": true }
        ],
        "criteria": [
            {
                "category_id": "kohaku",
                "round_type": "evaluation",
                "criteria": [
                    { "criterion_id": "body", "name": "Body", "weight": 0.5 },
                    { "criterion_id": "pattern", "name": "Pattern", "weight": 0.5 }
                ]
            }
        ],
        "entries": [
            { "category_id": "kohaku", "registration_number": "001", "name": "Koi 1", "round_id": "prelim" },
            { "category_id": "kohaku", "registration_number": "002", "name": "Koi 2", "round_id": "prelim" }
        ],
        "referees": [
            { "round_id": "prelim", "referee_id": "ref-a", "role": "head" }
        ]
    }"#;

    fn competition() -> Competition<MemoryCompetitionStore> {
        Competition::new(
            Arc::new(MemoryCompetitionStore::new()),
            JudgingConfig::default(),
        )
        .unwrap()
    }

    async fn seeded() -> (Competition<MemoryCompetitionStore>, Vec<String>) {
        let competition = competition();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FIXTURE.as_bytes()).unwrap();
        let out = cmd_seed(&competition, file.path()).await.unwrap();
        let rows = out["registrations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["registration_round_id"].as_str().unwrap().to_string())
            .collect();
        (competition, rows)
    }

    #[test]
    fn cli_parses_commands() {
        let cli = Cli::try_parse_from([
            "finjudge", "--json", "verdict", "--entry", "rr-1", "--referee", "ref-a", "pass",
        ])
        .unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Verdict {
                verdict: VerdictArg::Pass,
                ..
            }
        ));

        let cli = Cli::try_parse_from(["finjudge", "criteria", "kohaku", "Final"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Criteria {
                round_type: RoundType::Final,
                ..
            }
        ));
        assert!(Cli::try_parse_from(["finjudge", "criteria", "kohaku", "semi"]).is_err());
    }

    #[tokio::test]
    async fn seed_loads_fixture() {
        let (competition, rows) = seeded().await;
        assert_eq!(rows.len(), 2);

        let criteria = run(
            &competition,
            Commands::Criteria {
                category: "kohaku".to_string(),
                round_type: RoundType::Evaluation,
            },
        )
        .await
        .unwrap();
        assert_eq!(criteria.as_array().unwrap().len(), 2);

        let status = run(&competition, Commands::Status { round: "prelim".to_string() })
            .await
            .unwrap();
        assert_eq!(status["total"], 2);
        assert_eq!(status["counts"]["unassigned"], 2);
    }

    #[tokio::test]
    async fn preliminary_flow_and_benign_retry() {
        let (competition, rows) = seeded().await;
        run(&competition, Commands::PublishRound { round: "prelim".to_string() })
            .await
            .unwrap();
        for (rr, verdict) in rows.iter().zip([VerdictArg::Pass, VerdictArg::Fail]) {
            run(
                &competition,
                Commands::Verdict {
                    entry: rr.clone(),
                    referee: "ref-a".to_string(),
                    verdict,
                },
            )
            .await
            .unwrap();
        }
        run(&competition, Commands::Finalize { round: "prelim".to_string() })
            .await
            .unwrap();

        let advance = || Commands::Advance {
            source: "prelim".to_string(),
            target: "eval".to_string(),
        };
        let report = run(&competition, advance()).await.unwrap();
        assert_eq!(report["created"].as_array().unwrap().len(), 1);
        let retry = run(&competition, advance()).await.unwrap();
        assert_eq!(retry["already_advanced"], true);
    }

    #[tokio::test]
    async fn failures_carry_error_kind() {
        let (competition, rows) = seeded().await;
        let err = run(
            &competition,
            Commands::Verdict {
                entry: rows[0].clone(),
                referee: "ref-a".to_string(),
                verdict: VerdictArg::Pass,
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().starts_with("[not_published]"), "{err}");

        let err = run(
            &competition,
            Commands::Advance {
                source: "final".to_string(),
                target: "final".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().starts_with("[no_next_round]"), "{err}");
    }
}
