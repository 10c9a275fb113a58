use std::io::Write;

use finjudge_core::config::CONFIG_ENV;
use finjudge_core::{AdvancementPolicy, AggregationPolicy, JudgingConfig, VerdictPolicy};

const SAMPLE: &str = r#"
default_initial_score = 90.0
page_size = 25
verdict = "majority"

[severity_bands]
light = { min = 0.0, max = 20.0 }
medium = { min = 20.0, max = 60.0 }
severe = { min = 60.0, max = 100.0 }

[aggregation]
type = "role_weighted"
weights = { head = 2.0 }

[advancement]
type = "top_n"
n = 10
"#;

#[test]
fn load_reads_toml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SAMPLE.as_bytes()).unwrap();

    let config = JudgingConfig::load(file.path()).unwrap();
    assert_eq!(config.default_initial_score, 90.0);
    assert_eq!(config.max_initial_score, 100.0);
    assert_eq!(config.page_size, 25);
    assert_eq!(config.verdict, VerdictPolicy::Majority);
    assert_eq!(config.severity_bands.light.max, 20.0);
    assert_eq!(config.advancement, AdvancementPolicy::TopN { n: 10 });
    assert_eq!(config.aggregation.weight_for(Some("head")), 2.0);
    assert_eq!(config.aggregation.weight_for(Some("judge")), 1.0);
    assert!(matches!(
        config.aggregation,
        AggregationPolicy::RoleWeighted { .. }
    ));
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = JudgingConfig::load(dir.path().join("absent.toml")).unwrap_err();
    assert_eq!(err.kind(), "config");
}

#[test]
fn invalid_values_are_rejected() {
    for doc in [
        "default_initial_score = 0.0",
        "default_initial_score = 150.0",
        "score_floor = 100.0",
        "page_size = 0",
        "[severity_bands]\nlight = { min = 40.0, max = 10.0 }",
        "[advancement]\ntype = \"top_n\"\nn = 0",
        "verdict = \"coin_flip\"",
        "[aggregation]\ntype = \"role_weighted\"\ndefault_weight = nan",
        "[aggregation]\ntype = \"role_weighted\"\nweights = { head = nan }",
        "[aggregation]\ntype = \"role_weighted\"\ndefault_weight = -1.0",
    ] {
        let err = JudgingConfig::from_toml_str(doc).unwrap_err();
        assert_eq!(err.kind(), "config", "accepted: {doc}");
    }
}

#[test]
fn env_var_selects_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"page_size = 7\n").unwrap();

    std::env::set_var(CONFIG_ENV, file.path());
    let loaded = JudgingConfig::from_env().unwrap();
    std::env::set_var(CONFIG_ENV, "");
    let fallback = JudgingConfig::from_env().unwrap();
    std::env::remove_var(CONFIG_ENV);

    assert_eq!(loaded.page_size, 7);
    assert_eq!(fallback, JudgingConfig::default());
}
