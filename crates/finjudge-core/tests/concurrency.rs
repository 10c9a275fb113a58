//! Racing callers against write-time conflict checks.
//!
//! Every race runs against the in-memory fake and the SurrealDB `mem://`
//! backend, where losers of an optimistic commit must still report the
//! domain conflict they lost to.

mod common;

use std::sync::Arc;

use futures::future::join_all;

use common::{enter, publish, referee, show, show_on, Show};
use finjudge_core::{JudgingConfig, Verdict};
use finjudge_state::{CompetitionStore, Page, RoundStore, ScoreStore, SurrealCompetitionStore};

async fn surreal_show() -> Show<SurrealCompetitionStore> {
    let store = Arc::new(SurrealCompetitionStore::in_memory().await.unwrap());
    show_on(store, JudgingConfig::default(), true).await
}

async fn duplicate_submissions_store_one<S: CompetitionStore + 'static>(show: Show<S>) {
    let show = Arc::new(show);
    let rows = enter(&show, &show.eval1, &["001"]).await;
    publish(&show, &show.eval1, &rows).await;
    let rr = rows[0].registration_round_id.clone();

    let handles = (0..8).map(|i| {
        let show = Arc::clone(&show);
        let rr = rr.clone();
        tokio::spawn(async move {
            show.engine
                .scoring
                .record_evaluation(&rr, &referee("ref-a"), Some(100.0 - i as f64), vec![])
                .await
        })
    });
    let outcomes: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let accepted = outcomes.iter().filter(|o| o.is_ok()).count();
    assert_eq!(accepted, 1);
    for err in outcomes.iter().filter_map(|o| o.as_ref().err()) {
        assert_eq!(err.kind(), "duplicate_submission", "{err}");
    }
    assert_eq!(
        show.store().list_score_details(&show.eval1).await.unwrap().len(),
        1
    );
}

async fn distinct_referees_all_land<S: CompetitionStore + 'static>(show: Show<S>) {
    let show = Arc::new(show);
    let rows = enter(&show, &show.eval1, &["001"]).await;
    publish(&show, &show.eval1, &rows).await;
    let rr = rows[0].registration_round_id.clone();

    let handles = (0..6).map(|i| {
        let show = Arc::clone(&show);
        let rr = rr.clone();
        tokio::spawn(async move {
            show.engine
                .scoring
                .record_evaluation(&rr, &referee(&format!("ref-{i}")), Some(90.0), vec![])
                .await
        })
    });
    for joined in join_all(handles).await {
        joined.unwrap().unwrap();
    }

    let results = show.engine.scoring.finalize_round(&show.eval1).await.unwrap();
    assert_eq!(results[0].referee_count, 6);
    assert_eq!(results[0].total_score, Some(90.0));
}

async fn claims_on_exclusive_tank_admit_one<S: CompetitionStore + 'static>(show: Show<S>) {
    let show = Arc::new(show);
    let rows = enter(&show, &show.eval1, &["001", "002", "003", "004", "005"]).await;

    let handles = rows.iter().map(|row| {
        let show = Arc::clone(&show);
        let rr = row.registration_round_id.clone();
        tokio::spawn(async move { show.engine.tanks.assign_tank(&rr, &show.solo).await })
    });
    let outcomes: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    for err in outcomes.iter().filter_map(|o| o.as_ref().err()) {
        assert_eq!(err.kind(), "capacity_exceeded", "{err}");
    }
    let holders = show
        .store()
        .list_registration_rounds(&show.eval1, Page::first(100))
        .await
        .unwrap()
        .items
        .into_iter()
        .filter(|r| r.tank_id.as_ref() == Some(&show.solo))
        .count();
    assert_eq!(holders, 1);
}

async fn advancement_creates_one_set<S: CompetitionStore + 'static>(show: Show<S>) {
    let show = Arc::new(show);
    let rows = enter(&show, &show.prelim, &["001", "002"]).await;
    publish(&show, &show.prelim, &rows).await;
    for row in &rows {
        show.engine
            .scoring
            .record_verdict(&row.registration_round_id, &referee("ref-a"), Verdict::Pass)
            .await
            .unwrap();
    }
    show.engine.scoring.finalize_round(&show.prelim).await.unwrap();

    let handles = (0..8).map(|_| {
        let show = Arc::clone(&show);
        tokio::spawn(async move {
            show.engine
                .advancement
                .advance(&show.prelim, &show.eval1)
                .await
        })
    });
    let outcomes: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    for err in outcomes.iter().filter_map(|o| o.as_ref().err()) {
        assert_eq!(err.kind(), "already_advanced", "{err}");
        assert!(err.is_benign_retry(), "{err}");
    }
    let created = show
        .store()
        .list_registration_rounds(&show.eval1, Page::first(100))
        .await
        .unwrap();
    assert_eq!(created.total, 2);
}

async fn repeated_publish_counts_once<S: CompetitionStore + 'static>(show: Show<S>) {
    let show = Arc::new(show);
    let rows = enter(&show, &show.prelim, &["001", "002", "003"]).await;
    for row in &rows {
        show.engine
            .tanks
            .assign_tank(&row.registration_round_id, &show.pond)
            .await
            .unwrap();
    }

    let handles = (0..6).map(|_| {
        let show = Arc::clone(&show);
        tokio::spawn(async move { show.engine.progression.publish_round(&show.prelim).await })
    });
    let flipped: u64 = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .sum();
    assert_eq!(flipped, 3);
}

// ===========================================================================
// In-memory
// ===========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_concurrent_duplicate_submissions_store_one() {
    duplicate_submissions_store_one(show(JudgingConfig::default(), true).await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_concurrent_distinct_referees_all_land() {
    distinct_referees_all_land(show(JudgingConfig::default(), true).await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_concurrent_claims_on_exclusive_tank_admit_one() {
    claims_on_exclusive_tank_admit_one(show(JudgingConfig::default(), true).await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_concurrent_advancement_creates_one_set() {
    advancement_creates_one_set(show(JudgingConfig::default(), true).await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_concurrent_publish_counts_once() {
    repeated_publish_counts_once(show(JudgingConfig::default(), true).await).await;
}

// ===========================================================================
// SurrealDB (mem://)
// ===========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn surreal_concurrent_duplicate_submissions_store_one() {
    duplicate_submissions_store_one(surreal_show().await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn surreal_concurrent_distinct_referees_all_land() {
    distinct_referees_all_land(surreal_show().await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn surreal_concurrent_claims_on_exclusive_tank_admit_one() {
    claims_on_exclusive_tank_admit_one(surreal_show().await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn surreal_concurrent_advancement_creates_one_set() {
    advancement_creates_one_set(surreal_show().await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn surreal_concurrent_publish_counts_once() {
    repeated_publish_counts_once(surreal_show().await).await;
}
