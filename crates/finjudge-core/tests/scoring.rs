mod common;

use common::{deduction, enter, publish, referee, roster, show};
use finjudge_core::{
    AggregationPolicy, JudgeError, JudgingConfig, RoundType, Severity, ValidationError, Verdict,
    VerdictPolicy,
};
use finjudge_state::{ErrorTypeId, ScoreStore};

// ---- Evaluations ----

#[tokio::test]
async fn evaluation_deducts_weighted_percentages() {
    let show = show(JudgingConfig::default(), true).await;
    let rows = enter(&show, &show.eval1, &["001"]).await;
    publish(&show, &show.eval1, &rows).await;

    let detail = show
        .engine
        .scoring
        .record_evaluation(
            &rows[0].registration_round_id,
            &referee("ref-a"),
            None,
            vec![deduction(show.body(RoundType::Evaluation), Severity::Medium, 50.0)],
        )
        .await
        .unwrap();

    assert_eq!(detail.initial_score, 100.0);
    assert_eq!(detail.errors[0].point_minus, 25.0);
    assert_eq!(detail.total_point_minus, 25.0);
    assert_eq!(detail.score, 75.0);
}

#[tokio::test]
async fn evaluation_is_clamped_at_the_floor() {
    let show = show(JudgingConfig::default(), false).await;
    let rows = enter(&show, &show.eval1, &["001"]).await;
    show.engine.progression.publish_round(&show.eval1).await.unwrap();

    let detail = show
        .engine
        .scoring
        .record_evaluation(
            &rows[0].registration_round_id,
            &referee("ref-a"),
            Some(40.0),
            vec![
                deduction(show.body(RoundType::Evaluation), Severity::Severe, 100.0),
                deduction(show.pattern(RoundType::Evaluation), Severity::Severe, 80.0),
            ],
        )
        .await
        .unwrap();

    assert_eq!(detail.total_point_minus, 90.0);
    assert_eq!(detail.score, 0.0);
}

#[tokio::test]
async fn second_submission_by_same_referee_keeps_original() {
    let show = show(JudgingConfig::default(), true).await;
    let rows = enter(&show, &show.eval1, &["001"]).await;
    publish(&show, &show.eval1, &rows).await;
    let rr = &rows[0].registration_round_id;

    let first = show
        .engine
        .scoring
        .record_evaluation(rr, &referee("ref-a"), None, vec![])
        .await
        .unwrap();
    let err = show
        .engine
        .scoring
        .record_evaluation(
            rr,
            &referee("ref-a"),
            None,
            vec![deduction(show.body(RoundType::Evaluation), Severity::Light, 10.0)],
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "duplicate_submission");

    let stored = show.store().list_score_details(&show.eval1).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].score_detail_id, first.score_detail_id);
    assert_eq!(stored[0].score, 100.0);
}

#[tokio::test]
async fn percentage_outside_band_writes_nothing() {
    let show = show(JudgingConfig::default(), true).await;
    let rows = enter(&show, &show.eval1, &["001"]).await;
    publish(&show, &show.eval1, &rows).await;

    let err = show
        .engine
        .scoring
        .record_evaluation(
            &rows[0].registration_round_id,
            &referee("ref-a"),
            None,
            vec![deduction(show.body(RoundType::Evaluation), Severity::Light, 45.0)],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        JudgeError::Validation(ValidationError::PercentageOutOfBand { .. })
    ));
    assert!(show
        .store()
        .list_score_details(&show.eval1)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn unknown_criterion_is_rejected() {
    let show = show(JudgingConfig::default(), true).await;
    let rows = enter(&show, &show.eval1, &["001"]).await;
    publish(&show, &show.eval1, &rows).await;

    // Final-round criteria do not apply to an evaluation round.
    let err = show
        .engine
        .scoring
        .record_evaluation(
            &rows[0].registration_round_id,
            &referee("ref-a"),
            None,
            vec![deduction(show.body(RoundType::Final), Severity::Light, 5.0)],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        JudgeError::Validation(ValidationError::UnknownCriterion { .. })
    ));
}

#[tokio::test]
async fn error_type_must_belong_to_its_criterion() {
    let show = show(JudgingConfig::default(), true).await;
    let rows = enter(&show, &show.eval1, &["001"]).await;
    publish(&show, &show.eval1, &rows).await;
    let scar = show
        .engine
        .catalog
        .register_error_type(&show.pattern(RoundType::Evaluation), "Scar")
        .await
        .unwrap();

    let mut input = deduction(show.body(RoundType::Evaluation), Severity::Light, 5.0);
    input.error_type_id = Some(scar.error_type_id.clone());
    let err = show
        .engine
        .scoring
        .record_evaluation(&rows[0].registration_round_id, &referee("ref-a"), None, vec![input])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        JudgeError::Validation(ValidationError::ErrorTypeCriterionMismatch { .. })
    ));

    let mut input = deduction(show.pattern(RoundType::Evaluation), Severity::Light, 5.0);
    input.error_type_id = Some(ErrorTypeId::from("missing"));
    let err = show
        .engine
        .scoring
        .record_evaluation(&rows[0].registration_round_id, &referee("ref-a"), None, vec![input])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        JudgeError::Validation(ValidationError::UnknownErrorType { .. })
    ));
}

#[tokio::test]
async fn initial_score_above_maximum_is_rejected() {
    let show = show(JudgingConfig::default(), true).await;
    let rows = enter(&show, &show.eval1, &["001"]).await;
    publish(&show, &show.eval1, &rows).await;

    let err = show
        .engine
        .scoring
        .record_evaluation(&rows[0].registration_round_id, &referee("ref-a"), Some(120.0), vec![])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        JudgeError::Validation(ValidationError::InitialScoreOutOfRange { .. })
    ));
}

#[tokio::test]
async fn unpublished_entry_cannot_be_evaluated() {
    let show = show(JudgingConfig::default(), true).await;
    let rows = enter(&show, &show.eval1, &["001"]).await;

    let err = show
        .engine
        .scoring
        .record_evaluation(&rows[0].registration_round_id, &referee("ref-a"), None, vec![])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_published");
}

#[tokio::test]
async fn referee_off_roster_is_rejected() {
    let show = show(JudgingConfig::default(), true).await;
    let rows = enter(&show, &show.eval1, &["001"]).await;
    publish(&show, &show.eval1, &rows).await;
    roster(&show, &show.eval1, &[("ref-a", "judge")]).await;

    let err = show
        .engine
        .scoring
        .record_evaluation(&rows[0].registration_round_id, &referee("ref-z"), None, vec![])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        JudgeError::Validation(ValidationError::RefereeNotOnRoster { .. })
    ));
}

#[tokio::test]
async fn submission_kind_must_match_round_mode() {
    let show = show(JudgingConfig::default(), true).await;
    let prelim = enter(&show, &show.prelim, &["001"]).await;
    publish(&show, &show.prelim, &prelim).await;
    let eval = enter(&show, &show.eval1, &["002"]).await;
    publish(&show, &show.eval1, &eval).await;

    let err = show
        .engine
        .scoring
        .record_evaluation(&prelim[0].registration_round_id, &referee("ref-a"), None, vec![])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        JudgeError::Validation(ValidationError::WrongScoringMode { .. })
    ));

    let err = show
        .engine
        .scoring
        .record_verdict(&eval[0].registration_round_id, &referee("ref-a"), Verdict::Pass)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        JudgeError::Validation(ValidationError::WrongScoringMode { .. })
    ));
}

#[tokio::test]
async fn duplicate_verdict_is_rejected() {
    let show = show(JudgingConfig::default(), true).await;
    let rows = enter(&show, &show.prelim, &["001"]).await;
    publish(&show, &show.prelim, &rows).await;
    let rr = &rows[0].registration_round_id;

    show.engine
        .scoring
        .record_verdict(rr, &referee("ref-a"), Verdict::Pass)
        .await
        .unwrap();
    let err = show
        .engine
        .scoring
        .record_verdict(rr, &referee("ref-a"), Verdict::Fail)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "duplicate_submission");

    let verdicts = show.store().list_verdicts(&show.prelim).await.unwrap();
    assert_eq!(verdicts.len(), 1);
    assert_eq!(verdicts[0].verdict, Verdict::Pass);
}

// ---- Finalization ----

#[tokio::test]
async fn finalize_requires_every_rostered_referee() {
    let show = show(JudgingConfig::default(), true).await;
    let rows = enter(&show, &show.eval1, &["001", "002"]).await;
    publish(&show, &show.eval1, &rows).await;
    roster(&show, &show.eval1, &[("ref-a", "judge"), ("ref-b", "judge")]).await;

    for row in &rows {
        show.engine
            .scoring
            .record_evaluation(&row.registration_round_id, &referee("ref-a"), None, vec![])
            .await
            .unwrap();
    }
    show.engine
        .scoring
        .record_evaluation(&rows[0].registration_round_id, &referee("ref-b"), None, vec![])
        .await
        .unwrap();

    let err = show.engine.scoring.finalize_round(&show.eval1).await.unwrap_err();
    assert_eq!(
        err,
        JudgeError::InsufficientData {
            round_id: show.eval1.to_string(),
            incomplete: 1,
        }
    );
    assert!(show
        .store()
        .list_round_results(&show.eval1)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn finalize_averages_referee_scores() {
    let show = show(JudgingConfig::default(), true).await;
    let rows = enter(&show, &show.eval1, &["001"]).await;
    publish(&show, &show.eval1, &rows).await;
    roster(&show, &show.eval1, &[("ref-a", "judge"), ("ref-b", "judge")]).await;
    let rr = &rows[0].registration_round_id;

    show.engine
        .scoring
        .record_evaluation(
            rr,
            &referee("ref-a"),
            None,
            vec![deduction(show.body(RoundType::Evaluation), Severity::Medium, 50.0)],
        )
        .await
        .unwrap();
    show.engine
        .scoring
        .record_evaluation(
            rr,
            &referee("ref-b"),
            None,
            vec![deduction(show.pattern(RoundType::Evaluation), Severity::Light, 10.0)],
        )
        .await
        .unwrap();

    let results = show.engine.scoring.finalize_round(&show.eval1).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].total_score, Some(85.0));
    assert_eq!(results[0].referee_count, 2);
    assert_eq!(results[0].score_detail_ids.len(), 2);
    assert_eq!(results[0].rank, Some(1));
    assert!(!results[0].is_public);
}

#[tokio::test]
async fn finalize_applies_role_weights() {
    let config = JudgingConfig {
        aggregation: AggregationPolicy::RoleWeighted {
            weights: [("head".to_string(), 3.0)].into_iter().collect(),
            default_weight: 1.0,
        },
        ..JudgingConfig::default()
    };
    let show = show(config, true).await;
    let rows = enter(&show, &show.eval1, &["001"]).await;
    publish(&show, &show.eval1, &rows).await;
    roster(&show, &show.eval1, &[("ref-head", "head"), ("ref-b", "judge")]).await;
    let rr = &rows[0].registration_round_id;

    show.engine
        .scoring
        .record_evaluation(rr, &referee("ref-head"), Some(80.0), vec![])
        .await
        .unwrap();
    show.engine
        .scoring
        .record_evaluation(rr, &referee("ref-b"), Some(40.0), vec![])
        .await
        .unwrap();

    let results = show.engine.scoring.finalize_round(&show.eval1).await.unwrap();
    assert_eq!(results[0].total_score, Some(70.0));
}

#[tokio::test]
async fn verdict_policy_decides_elimination_status() {
    for (policy, expected) in [
        (VerdictPolicy::Unanimous, Verdict::Fail),
        (VerdictPolicy::Majority, Verdict::Pass),
        (VerdictPolicy::Any, Verdict::Pass),
    ] {
        let config = JudgingConfig {
            verdict: policy,
            ..JudgingConfig::default()
        };
        let show = show(config, true).await;
        let rows = enter(&show, &show.prelim, &["001"]).await;
        publish(&show, &show.prelim, &rows).await;
        roster(&show, &show.prelim, &[("a", "judge"), ("b", "judge"), ("c", "judge")]).await;
        let rr = &rows[0].registration_round_id;
        for (who, verdict) in [("a", Verdict::Pass), ("b", Verdict::Pass), ("c", Verdict::Fail)] {
            show.engine
                .scoring
                .record_verdict(rr, &referee(who), verdict)
                .await
                .unwrap();
        }

        let results = show.engine.scoring.finalize_round(&show.prelim).await.unwrap();
        assert_eq!(results[0].status, Some(expected), "policy {policy:?}");
        assert_eq!(results[0].total_score, None);
    }
}

#[tokio::test]
async fn finalize_after_public_results_returns_stored_results() {
    let show = show(JudgingConfig::default(), true).await;
    let rows = enter(&show, &show.eval1, &["001"]).await;
    publish(&show, &show.eval1, &rows).await;
    let rr = &rows[0].registration_round_id;
    show.engine
        .scoring
        .record_evaluation(rr, &referee("ref-a"), Some(90.0), vec![])
        .await
        .unwrap();

    let first = show.engine.scoring.finalize_round(&show.eval1).await.unwrap();
    show.engine.progression.publish_results(&show.eval1).await.unwrap();
    show.engine
        .scoring
        .record_evaluation(rr, &referee("ref-late"), Some(10.0), vec![])
        .await
        .unwrap();

    let again = show.engine.scoring.finalize_round(&show.eval1).await.unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].total_score, first[0].total_score);
    assert!(again[0].is_public);
}
