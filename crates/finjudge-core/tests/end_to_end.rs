//! A full show from preliminary to final, on both backends.

mod common;

use std::sync::Arc;

use common::{deduction, enter, publish, referee, roster, show, show_on, Show};
use finjudge_core::{
    CriterionSpec, JudgeError, JudgingConfig, RoundType, Severity, ValidationError, Verdict,
    Visibility,
};
use finjudge_state::{CategoryId, CompetitionStore, SurrealCompetitionStore};

async fn full_show<S: CompetitionStore>(show: Show<S>) {
    let judges = [("ref-a", "head"), ("ref-b", "judge")];

    // ---- Preliminary: Pass, Fail, Pass under the unanimous policy ----
    let prelim = enter(&show, &show.prelim, &["001", "002", "003"]).await;
    publish(&show, &show.prelim, &prelim).await;
    roster(&show, &show.prelim, &judges).await;
    for (row, second) in prelim.iter().zip([Verdict::Pass, Verdict::Fail, Verdict::Pass]) {
        let rr = &row.registration_round_id;
        show.engine
            .scoring
            .record_verdict(rr, &referee("ref-a"), Verdict::Pass)
            .await
            .unwrap();
        show.engine
            .scoring
            .record_verdict(rr, &referee("ref-b"), second)
            .await
            .unwrap();
    }
    let results = show.engine.scoring.finalize_round(&show.prelim).await.unwrap();
    let statuses: Vec<Option<Verdict>> = results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![Some(Verdict::Pass), Some(Verdict::Pass), Some(Verdict::Fail)]
    );

    let report = show
        .engine
        .advancement
        .advance(&show.prelim, &show.eval1)
        .await
        .unwrap();
    assert_eq!(report.count(), 2);
    let retry = show
        .engine
        .advancement
        .advance(&show.prelim, &show.eval1)
        .await
        .unwrap_err();
    assert!(retry.is_benign_retry());

    // ---- Evaluation: tanks, weighted scores, a tie ----
    let eval = report.created;
    show.engine
        .tanks
        .assign_tank(&eval[0].registration_round_id, &show.solo)
        .await
        .unwrap();
    let err = show
        .engine
        .progression
        .publish_round(&show.eval1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "incomplete_allocation");
    show.engine
        .tanks
        .assign_tank(&eval[1].registration_round_id, &show.pond)
        .await
        .unwrap();
    assert_eq!(
        show.engine.progression.publish_round(&show.eval1).await.unwrap(),
        2
    );

    roster(&show, &show.eval1, &judges).await;
    let body = show.body(RoundType::Evaluation);
    let pattern = show.pattern(RoundType::Evaluation);
    for (row, criterion) in eval.iter().zip([body, pattern]) {
        for (who, _) in judges {
            let detail = show
                .engine
                .scoring
                .record_evaluation(
                    &row.registration_round_id,
                    &referee(who),
                    None,
                    vec![deduction(criterion.clone(), Severity::Medium, 50.0)],
                )
                .await
                .unwrap();
            assert_eq!(detail.score, 75.0);
        }
    }
    let results = show.engine.scoring.finalize_round(&show.eval1).await.unwrap();
    assert!(results
        .iter()
        .all(|r| r.total_score == Some(75.0) && r.rank == Some(1)));

    assert!(show
        .engine
        .progression
        .standings(&show.eval1, Visibility::Public)
        .await
        .unwrap()
        .is_empty());
    show.engine.progression.publish_results(&show.eval1).await.unwrap();
    let err = show
        .store()
        .replace_round_results(&show.eval1, vec![])
        .await
        .unwrap_err();
    assert_eq!(JudgeError::from(err).kind(), "results_already_public");

    // ---- Final ----
    let report = show
        .engine
        .advancement
        .advance(&show.eval1, &show.final1)
        .await
        .unwrap();
    assert_eq!(report.count(), 2);
    publish(&show, &show.final1, &report.created).await;
    for (row, initial) in report.created.iter().zip([95.0, 88.0]) {
        show.engine
            .scoring
            .record_evaluation(&row.registration_round_id, &referee("ref-a"), Some(initial), vec![])
            .await
            .unwrap();
    }
    show.engine.scoring.finalize_round(&show.final1).await.unwrap();
    show.engine.progression.publish_results(&show.final1).await.unwrap();

    let podium = show
        .engine
        .progression
        .standings(&show.final1, Visibility::Public)
        .await
        .unwrap();
    assert_eq!(podium.len(), 2);
    assert_eq!(podium[0].total_score, Some(95.0));
    assert_eq!(podium[0].rank, Some(1));
    assert_eq!(podium[1].rank, Some(2));

    let err = show
        .engine
        .advancement
        .advance(&show.final1, &show.final1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "no_next_round");

    let summary = show.engine.progression.summary(&show.prelim).await.unwrap();
    assert_eq!(summary.advanced_to, Some(show.eval1.clone()));
}

#[tokio::test]
async fn memory_full_show() {
    full_show(show(JudgingConfig::default(), true).await).await;
}

#[tokio::test]
async fn surreal_full_show() {
    let store = Arc::new(SurrealCompetitionStore::in_memory().await.unwrap());
    full_show(show_on(store, JudgingConfig::default(), true).await).await;
}

// ---- Properties ----

#[tokio::test]
async fn criteria_weights_must_sum_to_one() {
    let show = show(JudgingConfig::default(), true).await;
    let err = show
        .engine
        .catalog
        .define_criteria(
            &CategoryId::from("showa-sansai"),
            RoundType::Preliminary,
            vec![
                CriterionSpec {
                    criterion_id: None,
                    name: "Body".to_string(),
                    weight: 0.6,
                },
                CriterionSpec {
                    criterion_id: None,
                    name: "Pattern".to_string(),
                    weight: 0.3,
                },
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        JudgeError::Validation(ValidationError::WeightSum { .. })
    ));

    let criteria = show
        .engine
        .catalog
        .criteria(&show.category, RoundType::Evaluation)
        .await
        .unwrap();
    let sum: f64 = criteria.iter().map(|c| c.weight).sum();
    assert!((sum - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn equal_scores_share_a_rank_and_skip_the_next() {
    let show = show(JudgingConfig::default(), true).await;
    let rows = enter(&show, &show.eval1, &["001", "002", "003"]).await;
    publish(&show, &show.eval1, &rows).await;
    for (row, score) in rows.iter().zip([80.0, 80.0, 70.0]) {
        show.engine
            .scoring
            .record_evaluation(&row.registration_round_id, &referee("ref-a"), Some(score), vec![])
            .await
            .unwrap();
    }

    let results = show.engine.scoring.finalize_round(&show.eval1).await.unwrap();
    let ranks: Vec<Option<u32>> = results.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![Some(1), Some(1), Some(3)]);
}

#[tokio::test]
async fn refinalizing_keeps_previous_order_for_ties() {
    let show = show(JudgingConfig::default(), true).await;
    let rows = enter(&show, &show.eval1, &["001", "002"]).await;
    publish(&show, &show.eval1, &rows).await;
    for (row, score) in rows.iter().zip([80.0, 80.0]) {
        show.engine
            .scoring
            .record_evaluation(&row.registration_round_id, &referee("ref-a"), Some(score), vec![])
            .await
            .unwrap();
    }

    let first = show.engine.scoring.finalize_round(&show.eval1).await.unwrap();
    let second = show.engine.scoring.finalize_round(&show.eval1).await.unwrap();
    let order = |results: &[finjudge_state::RoundResultRecord]| -> Vec<String> {
        results
            .iter()
            .map(|r| r.registration_round_id.to_string())
            .collect()
    };
    assert_eq!(order(&first), order(&second));
    assert_eq!(second[0].registration_round_id, rows[0].registration_round_id);
}
