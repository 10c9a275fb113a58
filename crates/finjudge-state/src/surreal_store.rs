//! SurrealDB-backed implementation of the storage traits
//!
//! Multi-row writes (tank assignment, round publication, result replacement,
//! advancement) run inside a single `BEGIN TRANSACTION … COMMIT TRANSACTION`
//! block. Preconditions are re-checked inside the transaction and reported by
//! `THROW`ing a `finjudge:` marker, which is decoded back into a
//! [`StorageError`] at the boundary.
//!
//! A transaction that loses an optimistic commit race is re-run, so the
//! loser re-evaluates its preconditions and reports the domain conflict it
//! lost to rather than the raw commit error.

use std::future::IntoFuture;

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::{Response, Surreal};
use tracing::{debug, info, instrument};

use crate::error::StorageError;
use crate::handle;
use crate::storage_traits::*;

const MARKER: &str = "finjudge:";

/// Attempts made for a transaction that keeps losing commit races.
const MAX_ATTEMPTS: u32 = 8;

/// SurrealDB-backed competition store.
#[derive(Clone)]
pub struct SurrealCompetitionStore {
    db: Surreal<Any>,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    total: u64,
}

/// A statement failure surfaced from a query response.
#[derive(Debug)]
enum Failure {
    /// A `THROW`n marker: kind plus `|`-separated arguments
    Thrown { kind: String, args: Vec<String> },
    /// A UNIQUE index rejected the write
    Unique(String),
    /// The transaction lost a commit race and can be re-run
    Conflict(String),
    Other(String),
}

impl Failure {
    fn classify(message: String) -> Failure {
        if let Some(thrown) = decode_thrown(&message) {
            thrown
        } else if message.contains("already contains") {
            Failure::Unique(message)
        } else if message.contains("can be retried") || message.contains("conflict") {
            Failure::Conflict(message)
        } else {
            Failure::Other(message)
        }
    }

    /// Lower is reported first when several statements failed.
    fn precedence(&self) -> u8 {
        match self {
            Failure::Thrown { .. } => 0,
            Failure::Unique(_) => 1,
            Failure::Conflict(_) => 2,
            Failure::Other(_) => 3,
        }
    }

    fn into_storage(self) -> StorageError {
        match self {
            Failure::Thrown { kind, args } => {
                StorageError::Backend(format!("unexpected precondition {kind}: {args:?}"))
            }
            Failure::Conflict(msg) => {
                StorageError::Backend(format!("transaction conflict: {msg}"))
            }
            Failure::Unique(msg) | Failure::Other(msg) => StorageError::Backend(msg),
        }
    }
}

fn backend(err: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(err.to_string())
}

fn decode_thrown(message: &str) -> Option<Failure> {
    let start = message.find(MARKER)? + MARKER.len();
    let payload = message[start..].trim_end_matches(['\'', '"', '`', '.']);
    let mut parts = payload.split('|');
    let kind = parts.next()?.to_string();
    let args = parts.map(str::to_string).collect();
    Some(Failure::Thrown { kind, args })
}

/// Collect statement errors from a response, preferring thrown markers over
/// unique-index violations over commit conflicts over anything else.
fn failure(response: &mut Response) -> Option<Failure> {
    let mut errors: Vec<(usize, String)> = response
        .take_errors()
        .into_iter()
        .map(|(idx, err)| (idx, err.to_string()))
        .collect();
    errors.sort_by_key(|(idx, _)| *idx);
    errors
        .into_iter()
        .map(|(_, msg)| Failure::classify(msg))
        .min_by_key(Failure::precedence)
}

/// Run a query until it no longer fails with a commit conflict, returning
/// the failure of the last attempt. `attempt` must rebuild the whole query
/// each time.
async fn transact<F, Q>(mut attempt: F) -> Option<Failure>
where
    F: FnMut() -> Q,
    Q: IntoFuture<Output = surrealdb::Result<Response>>,
{
    let mut tries = 0;
    loop {
        tries += 1;
        let outcome = match attempt().await {
            Ok(mut res) => failure(&mut res),
            Err(err) => Some(Failure::classify(err.to_string())),
        };
        match outcome {
            Some(Failure::Conflict(msg)) if tries < MAX_ATTEMPTS => {
                debug!(attempt = tries, error = %msg, "transaction conflict, retrying");
            }
            other => return other,
        }
    }
}

fn parse_count(args: &[String], idx: usize) -> u64 {
    args.get(idx)
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

impl SurrealCompetitionStore {
    /// Wrap an already connected, schema-initialized client.
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        let db = handle::connect_in_memory().await?;
        info!("SurrealCompetitionStore connected (in-memory)");
        Ok(Self { db })
    }

    /// Create from environment variables (see [`handle::connect_from_env`]).
    pub async fn from_env() -> crate::Result<Self> {
        let db = handle::connect_from_env().await?;
        Ok(Self { db })
    }

    // -- private helpers -----------------------------------------------------

    async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        field: &str,
        kind: &'static str,
        id: &str,
    ) -> StorageResult<T> {
        let sql = format!("SELECT * FROM {table} WHERE {field} = $id");
        let mut res = self
            .db
            .query(sql)
            .bind(("id", id.to_string()))
            .await
            .map_err(backend)?;
        let rows: Vec<T> = res.take(0).map_err(backend)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::not_found(kind, id))
    }

    async fn select_where<T: DeserializeOwned>(
        &self,
        sql: &str,
        key: &'static str,
        value: String,
    ) -> StorageResult<Vec<T>> {
        let mut res = self
            .db
            .query(sql.to_string())
            .bind((key, value))
            .await
            .map_err(backend)?;
        res.take(0).map_err(backend)
    }

    /// `CREATE` a row, mapping a UNIQUE index violation to `Duplicate`.
    async fn create_row<T>(
        &self,
        table: &str,
        kind: &'static str,
        key: String,
        row: T,
    ) -> StorageResult<()>
    where
        T: Serialize + Clone + Send + Sync + 'static,
    {
        let sql = format!("CREATE {table} CONTENT $row");
        let db = &self.db;
        let row = &row;
        match transact(move || db.query(sql.clone()).bind(("row", row.clone()))).await {
            None => Ok(()),
            Some(Failure::Unique(_)) => Err(StorageError::Duplicate { kind, key }),
            Some(other) => Err(other.into_storage()),
        }
    }

    /// Count the rows a committed publish attempt tagged with `batch`.
    async fn count_batch(
        &self,
        sql: &str,
        round_id: &RoundId,
        batch: String,
    ) -> StorageResult<u64> {
        let mut res = self
            .db
            .query(sql.to_string())
            .bind(("rid", round_id.to_string()))
            .bind(("batch", batch))
            .await
            .map_err(backend)?;
        let rows: Vec<CountRow> = res.take(0).map_err(backend)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }
}

// ---------------------------------------------------------------------------
// CatalogStore
// ---------------------------------------------------------------------------

#[async_trait]
impl CatalogStore for SurrealCompetitionStore {
    async fn put_category(&self, category: CategoryRecord) -> StorageResult<()> {
        let key = category.category_id.to_string();
        self.create_row("categories", "category", key, category)
            .await
    }

    async fn get_category(&self, category_id: &CategoryId) -> StorageResult<CategoryRecord> {
        self.select_one("categories", "category_id", "category", category_id.as_str())
            .await
    }

    async fn put_round(&self, round: RoundRecord) -> StorageResult<()> {
        let key = round.round_id.to_string();
        self.create_row("rounds", "round", key, round).await
    }

    async fn get_round(&self, round_id: &RoundId) -> StorageResult<RoundRecord> {
        self.select_one("rounds", "round_id", "round", round_id.as_str())
            .await
    }

    async fn list_rounds(&self, category_id: &CategoryId) -> StorageResult<Vec<RoundRecord>> {
        let mut rounds: Vec<RoundRecord> = self
            .select_where(
                "SELECT * FROM rounds WHERE category_id = $cid",
                "cid",
                category_id.to_string(),
            )
            .await?;
        rounds.sort_by_key(|r| (r.round_type, r.round_order));
        Ok(rounds)
    }

    async fn put_tank(&self, tank: TankRecord) -> StorageResult<()> {
        let key = tank.tank_id.to_string();
        self.create_row("tanks", "tank", key, tank).await
    }

    async fn get_tank(&self, tank_id: &TankId) -> StorageResult<TankRecord> {
        self.select_one("tanks", "tank_id", "tank", tank_id.as_str())
            .await
    }

    async fn list_tanks(&self, category_id: &CategoryId) -> StorageResult<Vec<TankRecord>> {
        self.select_where(
            "SELECT * FROM tanks WHERE category_id = $cid ORDER BY label ASC",
            "cid",
            category_id.to_string(),
        )
        .await
    }

    #[instrument(skip(self, criteria), fields(category_id = %category_id, round_type = %round_type, count = criteria.len()))]
    async fn put_criteria(
        &self,
        category_id: &CategoryId,
        round_type: RoundType,
        criteria: Vec<CriterionRecord>,
    ) -> StorageResult<()> {
        let insert = if criteria.is_empty() {
            ""
        } else {
            "INSERT INTO criteria $rows;"
        };
        // The lock row turns two concurrent definitions of the same set into
        // a commit conflict, so the re-run sees the winner's rows.
        let sql = format!(
            r#"
            BEGIN TRANSACTION;
            LET $existing = (SELECT criterion_id FROM criteria
                WHERE category_id = $cid AND round_type = $rt);
            IF array::len($existing) > 0 {{ THROW "finjudge:criteria_defined"; }};
            UPSERT type::thing("criteria_locks", [$cid, $rt]) SET touched_at = time::now();
            {insert}
            COMMIT TRANSACTION;
            "#
        );
        let db = &self.db;
        let rows = &criteria;
        let outcome = transact(move || {
            db.query(sql.clone())
                .bind(("cid", category_id.to_string()))
                .bind(("rt", round_type.as_str()))
                .bind(("rows", rows.clone()))
        })
        .await;

        match outcome {
            None => Ok(()),
            Some(Failure::Thrown { kind, .. }) if kind == "criteria_defined" => {
                Err(StorageError::Duplicate {
                    kind: "criteria set",
                    key: format!("{category_id}/{round_type}"),
                })
            }
            Some(Failure::Unique(_)) => {
                let mut seen = std::collections::HashSet::new();
                let key = criteria
                    .iter()
                    .find(|c| !seen.insert(&c.criterion_id))
                    .map(|c| c.criterion_id.to_string())
                    .unwrap_or_else(|| {
                        criteria
                            .iter()
                            .map(|c| c.criterion_id.to_string())
                            .collect::<Vec<_>>()
                            .join(",")
                    });
                Err(StorageError::Duplicate {
                    kind: "criterion",
                    key,
                })
            }
            Some(other) => Err(other.into_storage()),
        }
    }

    async fn get_criterion(&self, criterion_id: &CriterionId) -> StorageResult<CriterionRecord> {
        self.select_one("criteria", "criterion_id", "criterion", criterion_id.as_str())
            .await
    }

    async fn get_criteria(
        &self,
        category_id: &CategoryId,
        round_type: RoundType,
    ) -> StorageResult<Vec<CriterionRecord>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM criteria WHERE category_id = $cid AND round_type = $rt ORDER BY position ASC",
            )
            .bind(("cid", category_id.to_string()))
            .bind(("rt", round_type.as_str()))
            .await
            .map_err(backend)?;
        res.take(0).map_err(backend)
    }

    async fn register_error_type(&self, error_type: ErrorTypeRecord) -> StorageResult<()> {
        let key = format!("{}/{}", error_type.criterion_id, error_type.name);
        self.create_row("error_types", "error type", key, error_type)
            .await
    }

    async fn get_error_type(&self, error_type_id: &ErrorTypeId) -> StorageResult<ErrorTypeRecord> {
        self.select_one(
            "error_types",
            "error_type_id",
            "error type",
            error_type_id.as_str(),
        )
        .await
    }

    async fn list_error_types(
        &self,
        criterion_id: &CriterionId,
    ) -> StorageResult<Vec<ErrorTypeRecord>> {
        self.select_where(
            "SELECT * FROM error_types WHERE criterion_id = $cid ORDER BY name ASC",
            "cid",
            criterion_id.to_string(),
        )
        .await
    }

    async fn put_entry(&self, entry: EntryRecord) -> StorageResult<()> {
        let key = format!("{}/{}", entry.category_id, entry.registration_number);
        self.create_row("entries", "entry", key, entry).await
    }

    async fn get_entry(&self, entry_id: &EntryId) -> StorageResult<EntryRecord> {
        self.select_one("entries", "entry_id", "entry", entry_id.as_str())
            .await
    }

    async fn assign_referee(&self, assignment: RefereeAssignment) -> StorageResult<()> {
        let sql = r#"
            BEGIN TRANSACTION;
            DELETE referee_roster WHERE round_id = $rid AND referee_id = $referee;
            CREATE referee_roster CONTENT $row;
            COMMIT TRANSACTION;
        "#;
        let db = &self.db;
        let row = &assignment;
        let outcome = transact(move || {
            db.query(sql)
                .bind(("rid", row.round_id.to_string()))
                .bind(("referee", row.referee_id.to_string()))
                .bind(("row", row.clone()))
        })
        .await;
        match outcome {
            None => Ok(()),
            Some(other) => Err(other.into_storage()),
        }
    }

    async fn list_referees(&self, round_id: &RoundId) -> StorageResult<Vec<RefereeAssignment>> {
        self.select_where(
            "SELECT * FROM referee_roster WHERE round_id = $rid ORDER BY referee_id ASC",
            "rid",
            round_id.to_string(),
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// RoundStore
// ---------------------------------------------------------------------------

#[async_trait]
impl RoundStore for SurrealCompetitionStore {
    #[instrument(skip(self), fields(round_id = %round_id, entry_id = %entry_id))]
    async fn create_registration_round(
        &self,
        round_id: &RoundId,
        entry_id: &EntryId,
    ) -> StorageResult<RegistrationRoundRecord> {
        self.get_round(round_id).await?;
        let entry = self.get_entry(entry_id).await?;
        let record =
            RegistrationRoundRecord::new(round_id.clone(), entry_id.clone(), entry.registration_number);
        self.create_row(
            "registration_rounds",
            "registration round",
            format!("{}/{}", round_id, entry_id),
            record.clone(),
        )
        .await?;
        Ok(record)
    }

    async fn get_registration_round(
        &self,
        registration_round_id: &RegistrationRoundId,
    ) -> StorageResult<RegistrationRoundRecord> {
        self.select_one(
            "registration_rounds",
            "registration_round_id",
            "registration round",
            registration_round_id.as_str(),
        )
        .await
    }

    async fn list_registration_rounds(
        &self,
        round_id: &RoundId,
        page: Page,
    ) -> StorageResult<PageResult<RegistrationRoundRecord>> {
        // LIMIT/START are formatted from integers, never from caller strings.
        let sql = format!(
            "SELECT * FROM registration_rounds WHERE round_id = $rid \
             ORDER BY registration_number ASC, registration_round_id ASC \
             LIMIT {} START {};
             SELECT count() AS total FROM registration_rounds WHERE round_id = $rid GROUP ALL;",
            page.size,
            page.offset()
        );
        let mut res = self
            .db
            .query(sql)
            .bind(("rid", round_id.to_string()))
            .await
            .map_err(backend)?;
        let items: Vec<RegistrationRoundRecord> = res.take(0).map_err(backend)?;
        let counts: Vec<CountRow> = res.take(1).map_err(backend)?;
        Ok(PageResult {
            items,
            total: counts.first().map(|c| c.total).unwrap_or(0),
        })
    }

    #[instrument(skip(self), fields(registration_round_id = %registration_round_id, tank_id = %tank_id))]
    async fn update_tank_assignment(
        &self,
        registration_round_id: &RegistrationRoundId,
        tank_id: &TankId,
        occupancy_limit: Option<u32>,
    ) -> StorageResult<RegistrationRoundRecord> {
        let capacity_check = match occupancy_limit {
            Some(_) => {
                r#"
            LET $held = (SELECT registration_round_id FROM registration_rounds
                WHERE round_id = $row.round_id AND tank_id = $tank AND registration_round_id != $rrid);
            IF array::len($held) >= $limit {
                THROW "finjudge:tank_occupied|" + <string> $row.round_id + "|" + <string> array::len($held);
            };"#
            }
            None => "",
        };
        // Touching a per-(round, tank) lock row makes concurrent claims on
        // the same tank conflict instead of both passing the occupancy read.
        let sql = format!(
            r#"
            BEGIN TRANSACTION;
            LET $row = (SELECT * FROM registration_rounds WHERE registration_round_id = $rrid)[0];
            IF $row = NONE {{ THROW "finjudge:not_found"; }};
            IF $row.published = true {{ THROW "finjudge:already_published"; }};
            {capacity_check}
            UPSERT type::thing("tank_locks", [$row.round_id, $tank]) SET touched_at = time::now();
            UPDATE registration_rounds SET tank_id = $tank WHERE registration_round_id = $rrid;
            COMMIT TRANSACTION;
            "#
        );
        let db = &self.db;
        let outcome = transact(move || {
            db.query(sql.clone())
                .bind(("rrid", registration_round_id.to_string()))
                .bind(("tank", tank_id.to_string()))
                .bind(("limit", occupancy_limit.unwrap_or(0)))
        })
        .await;

        match outcome {
            None => {}
            Some(Failure::Thrown { kind, args }) => {
                return Err(match kind.as_str() {
                    "not_found" => {
                        StorageError::not_found("registration round", registration_round_id)
                    }
                    "already_published" => StorageError::AlreadyPublished {
                        registration_round_id: registration_round_id.to_string(),
                    },
                    "tank_occupied" => StorageError::TankOccupied {
                        tank_id: tank_id.to_string(),
                        round_id: args.first().cloned().unwrap_or_default(),
                        occupancy: parse_count(&args, 1) as u32,
                        limit: occupancy_limit.unwrap_or(0),
                    },
                    _ => Failure::Thrown { kind, args }.into_storage(),
                })
            }
            Some(other) => return Err(other.into_storage()),
        }

        debug!("tank assignment committed");
        self.get_registration_round(registration_round_id).await
    }

    #[instrument(skip(self), fields(round_id = %round_id))]
    async fn set_round_published(
        &self,
        round_id: &RoundId,
        require_tanks: bool,
    ) -> StorageResult<u64> {
        let allocation_check = if require_tanks {
            r#"
            LET $unassigned = (SELECT registration_round_id FROM registration_rounds
                WHERE round_id = $rid AND tank_id = NONE);
            IF array::len($unassigned) > 0 {
                THROW "finjudge:incomplete_allocation|" + <string> array::len($unassigned);
            };"#
        } else {
            ""
        };
        let sql = format!(
            r#"
            BEGIN TRANSACTION;
            LET $round = (SELECT * FROM rounds WHERE round_id = $rid)[0];
            IF $round = NONE {{ THROW "finjudge:not_found"; }};
            {allocation_check}
            UPDATE registration_rounds SET published = true, published_at = $now, publish_batch = $batch
                WHERE round_id = $rid AND published = false;
            UPDATE rounds SET published = true WHERE round_id = $rid;
            COMMIT TRANSACTION;
            "#
        );
        // Rows flipped by the committed attempt carry its batch id, so
        // racing publishers never both count the same rows.
        let batch = uuid::Uuid::new_v4().to_string();
        let db = &self.db;
        let outcome = {
            let batch = batch.clone();
            transact(move || {
                db.query(sql.clone())
                    .bind(("rid", round_id.to_string()))
                    .bind(("now", Utc::now()))
                    .bind(("batch", batch.clone()))
            })
            .await
        };

        match outcome {
            None => {
                self.count_batch(
                    "SELECT count() AS total FROM registration_rounds \
                     WHERE round_id = $rid AND publish_batch = $batch GROUP ALL",
                    round_id,
                    batch,
                )
                .await
            }
            Some(Failure::Thrown { kind, args }) => Err(match kind.as_str() {
                "not_found" => StorageError::not_found("round", round_id),
                "incomplete_allocation" => StorageError::IncompleteAllocation {
                    round_id: round_id.to_string(),
                    unassigned: parse_count(&args, 0),
                },
                _ => Failure::Thrown { kind, args }.into_storage(),
            }),
            Some(other) => Err(other.into_storage()),
        }
    }

    #[instrument(skip(self, carried), fields(source = %source, target = %target, carried = carried.len()))]
    async fn commit_advancement(
        &self,
        source: &RoundId,
        target: &RoundId,
        carried: &[RegistrationRoundRecord],
    ) -> StorageResult<Vec<RegistrationRoundRecord>> {
        let created: Vec<RegistrationRoundRecord> =
            carried.iter().map(|r| r.carried_into(target)).collect();

        let insert = if created.is_empty() {
            ""
        } else {
            "INSERT INTO registration_rounds $rows;"
        };
        let sql = format!(
            r#"
            BEGIN TRANSACTION;
            LET $src = (SELECT * FROM rounds WHERE round_id = $source)[0];
            IF $src = NONE {{ THROW "finjudge:not_found|" + $source; }};
            IF $src.advanced_to != NONE {{
                THROW "finjudge:already_advanced|" + <string> $src.advanced_to;
            }};
            LET $dst = (SELECT * FROM rounds WHERE round_id = $target)[0];
            IF $dst = NONE {{ THROW "finjudge:not_found|" + $target; }};
            UPDATE rounds SET advanced_to = $target, advanced_at = $now WHERE round_id = $source;
            {insert}
            COMMIT TRANSACTION;
            "#
        );
        let db = &self.db;
        let rows = &created;
        let outcome = transact(move || {
            db.query(sql.clone())
                .bind(("source", source.to_string()))
                .bind(("target", target.to_string()))
                .bind(("now", Utc::now()))
                .bind(("rows", rows.clone()))
        })
        .await;

        match outcome {
            None => {
                info!(created = created.len(), "advancement committed");
                Ok(created)
            }
            Some(Failure::Thrown { kind, args }) => Err(match kind.as_str() {
                "not_found" => {
                    StorageError::not_found("round", args.first().cloned().unwrap_or_default())
                }
                "already_advanced" => StorageError::AlreadyAdvanced {
                    round_id: source.to_string(),
                    advanced_to: args.first().cloned().unwrap_or_default(),
                },
                _ => Failure::Thrown { kind, args }.into_storage(),
            }),
            Some(Failure::Unique(_)) => Err(StorageError::Duplicate {
                kind: "registration round",
                key: target.to_string(),
            }),
            Some(other) => Err(other.into_storage()),
        }
    }
}

// ---------------------------------------------------------------------------
// ScoreStore
// ---------------------------------------------------------------------------

#[async_trait]
impl ScoreStore for SurrealCompetitionStore {
    #[instrument(skip(self, detail), fields(registration_round_id = %detail.registration_round_id, referee_id = %detail.referee_id))]
    async fn create_score_detail(&self, detail: ScoreDetailRecord) -> StorageResult<()> {
        let registration_round_id = detail.registration_round_id.to_string();
        let referee_id = detail.referee_id.to_string();
        match self
            .create_row("score_details", "score detail", String::new(), detail)
            .await
        {
            Err(StorageError::Duplicate { .. }) => Err(StorageError::DuplicateSubmission {
                registration_round_id,
                referee_id,
            }),
            other => other,
        }
    }

    #[instrument(skip(self, verdict), fields(registration_round_id = %verdict.registration_round_id, referee_id = %verdict.referee_id))]
    async fn create_verdict(&self, verdict: VerdictRecord) -> StorageResult<()> {
        let registration_round_id = verdict.registration_round_id.to_string();
        let referee_id = verdict.referee_id.to_string();
        match self
            .create_row("verdicts", "verdict", String::new(), verdict)
            .await
        {
            Err(StorageError::Duplicate { .. }) => Err(StorageError::DuplicateSubmission {
                registration_round_id,
                referee_id,
            }),
            other => other,
        }
    }

    async fn list_score_details(&self, round_id: &RoundId) -> StorageResult<Vec<ScoreDetailRecord>> {
        self.select_where(
            "SELECT * FROM score_details WHERE round_id = $rid",
            "rid",
            round_id.to_string(),
        )
        .await
    }

    async fn list_verdicts(&self, round_id: &RoundId) -> StorageResult<Vec<VerdictRecord>> {
        self.select_where(
            "SELECT * FROM verdicts WHERE round_id = $rid",
            "rid",
            round_id.to_string(),
        )
        .await
    }

    #[instrument(skip(self, results), fields(round_id = %round_id, results = results.len()))]
    async fn replace_round_results(
        &self,
        round_id: &RoundId,
        results: Vec<RoundResultRecord>,
    ) -> StorageResult<()> {
        let insert = if results.is_empty() {
            ""
        } else {
            "INSERT INTO round_results $rows;"
        };
        let sql = format!(
            r#"
            BEGIN TRANSACTION;
            LET $public = (SELECT registration_round_id FROM round_results
                WHERE round_id = $rid AND is_public = true);
            IF array::len($public) > 0 {{ THROW "finjudge:results_public"; }};
            DELETE round_results WHERE round_id = $rid;
            {insert}
            COMMIT TRANSACTION;
            "#
        );
        let db = &self.db;
        let rows = &results;
        let outcome = transact(move || {
            db.query(sql.clone())
                .bind(("rid", round_id.to_string()))
                .bind(("rows", rows.clone()))
        })
        .await;

        match outcome {
            None => Ok(()),
            Some(Failure::Thrown { kind, .. }) if kind == "results_public" => {
                Err(StorageError::ResultsAlreadyPublic {
                    round_id: round_id.to_string(),
                })
            }
            Some(other) => Err(other.into_storage()),
        }
    }

    async fn list_round_results(
        &self,
        round_id: &RoundId,
    ) -> StorageResult<Vec<RoundResultRecord>> {
        self.select_where(
            "SELECT * FROM round_results WHERE round_id = $rid ORDER BY registration_round_id ASC",
            "rid",
            round_id.to_string(),
        )
        .await
    }

    #[instrument(skip(self), fields(round_id = %round_id))]
    async fn set_results_published(&self, round_id: &RoundId) -> StorageResult<u64> {
        let sql = r#"
            BEGIN TRANSACTION;
            LET $round = (SELECT * FROM rounds WHERE round_id = $rid)[0];
            IF $round = NONE { THROW "finjudge:not_found"; };
            UPDATE round_results SET is_public = true, published_at = $now, publish_batch = $batch
                WHERE round_id = $rid AND is_public = false;
            UPDATE rounds SET results_published = true WHERE round_id = $rid;
            COMMIT TRANSACTION;
        "#;
        let batch = uuid::Uuid::new_v4().to_string();
        let db = &self.db;
        let outcome = {
            let batch = batch.clone();
            transact(move || {
                db.query(sql)
                    .bind(("rid", round_id.to_string()))
                    .bind(("now", Utc::now()))
                    .bind(("batch", batch.clone()))
            })
            .await
        };

        match outcome {
            None => {
                self.count_batch(
                    "SELECT count() AS total FROM round_results \
                     WHERE round_id = $rid AND publish_batch = $batch GROUP ALL",
                    round_id,
                    batch,
                )
                .await
            }
            Some(Failure::Thrown { kind, .. }) if kind == "not_found" => {
                Err(StorageError::not_found("round", round_id))
            }
            Some(other) => Err(other.into_storage()),
        }
    }
}
