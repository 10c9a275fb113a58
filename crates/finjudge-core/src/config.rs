//! Judging configuration.
//!
//! Every rule the judging core treats as policy lives here: severity band
//! bounds, initial score limits, the score floor, how referee submissions
//! are combined and which entries of a weighted round advance.
//!
//! ```
//! use finjudge_core::config::{AdvancementPolicy, JudgingConfig};
//!
//! let config = JudgingConfig::from_toml_str(r#"
//!     score_floor = 10.0
//!     verdict = "majority"
//!
//!     [advancement]
//!     type = "top_n"
//!     n = 8
//! "#).unwrap();
//!
//! assert_eq!(config.advancement, AdvancementPolicy::TopN { n: 8 });
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use finjudge_state::Severity;

use crate::domain::{JudgeError, Result};

/// Environment variable naming a TOML config file.
pub const CONFIG_ENV: &str = "FINJUDGE_CONFIG";

/// Inclusive percentage range of one severity band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: f64,
    pub max: f64,
}

impl Band {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, percentage: f64) -> bool {
        percentage >= self.min && percentage <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityBands {
    pub light: Band,
    pub medium: Band,
    pub severe: Band,
}

impl Default for SeverityBands {
    fn default() -> Self {
        Self {
            light: Band::new(0.0, 30.0),
            medium: Band::new(30.0, 70.0),
            severe: Band::new(70.0, 100.0),
        }
    }
}

impl SeverityBands {
    pub fn band(&self, severity: Severity) -> Band {
        match severity {
            Severity::Light => self.light,
            Severity::Medium => self.medium,
            Severity::Severe => self.severe,
        }
    }
}

/// How several referees' scores for one entry combine into `total_score`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// Arithmetic mean of submitted scores.
    #[default]
    Mean,
    /// Mean weighted by each referee's roster role.
    RoleWeighted {
        #[serde(default)]
        weights: BTreeMap<String, f64>,
        #[serde(default = "one")]
        default_weight: f64,
    },
}

fn one() -> f64 {
    1.0
}

impl AggregationPolicy {
    /// Weight applied to a referee holding `role`.
    pub fn weight_for(&self, role: Option<&str>) -> f64 {
        match self {
            AggregationPolicy::Mean => 1.0,
            AggregationPolicy::RoleWeighted {
                weights,
                default_weight,
            } => role
                .and_then(|r| weights.get(r).copied())
                .unwrap_or(*default_weight),
        }
    }
}

/// How several referees' Pass/Fail verdicts combine in an elimination round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictPolicy {
    /// Pass only if every referee passed the entry.
    #[default]
    Unanimous,
    /// Pass if strictly more referees passed than failed.
    Majority,
    /// Pass if any referee passed.
    Any,
}

/// Which entries of a weighted round are carried into the next round type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdvancementPolicy {
    /// Every entry with a total score.
    #[default]
    AllEvaluated,
    /// Entries scoring at or above `threshold`.
    MinScore { threshold: f64 },
    /// Entries ranked `n` or better; ties at the boundary all advance.
    TopN { n: u32 },
}

/// Top-level judging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgingConfig {
    pub severity_bands: SeverityBands,
    /// Baseline used when an evaluation does not name one.
    pub default_initial_score: f64,
    pub max_initial_score: f64,
    /// Scores are clamped at this value.
    pub score_floor: f64,
    /// Allowed deviation of a criteria weight sum from 1.0.
    pub weight_tolerance: f64,
    pub aggregation: AggregationPolicy,
    pub verdict: VerdictPolicy,
    pub advancement: AdvancementPolicy,
    /// Rows fetched per storage page when reading a whole round.
    pub page_size: u32,
}

impl Default for JudgingConfig {
    fn default() -> Self {
        Self {
            severity_bands: SeverityBands::default(),
            default_initial_score: 100.0,
            max_initial_score: 100.0,
            score_floor: 0.0,
            weight_tolerance: 1e-6,
            aggregation: AggregationPolicy::default(),
            verdict: VerdictPolicy::default(),
            advancement: AdvancementPolicy::default(),
            page_size: 100,
        }
    }
}

impl JudgingConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: JudgingConfig =
            toml::from_str(s).map_err(|e| JudgeError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| JudgeError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&contents)?;
        info!(path = %path.display(), "judging config loaded");
        Ok(config)
    }

    /// Load from `FINJUDGE_CONFIG` if set, else defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load(path),
            _ => {
                debug!("FINJUDGE_CONFIG not set, using default judging config");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, band) in [
            ("light", self.severity_bands.light),
            ("medium", self.severity_bands.medium),
            ("severe", self.severity_bands.severe),
        ] {
            if !(band.min.is_finite() && band.max.is_finite()) {
                return Err(invalid(format!("{name} band bounds must be finite")));
            }
            if band.min < 0.0 || band.max > 100.0 || band.min > band.max {
                return Err(invalid(format!(
                    "{name} band [{}, {}] must satisfy 0 <= min <= max <= 100",
                    band.min, band.max
                )));
            }
        }
        if !(self.max_initial_score.is_finite() && self.max_initial_score > 0.0) {
            return Err(invalid("max_initial_score must be positive".to_string()));
        }
        if self.default_initial_score <= 0.0 || self.default_initial_score > self.max_initial_score
        {
            return Err(invalid(format!(
                "default_initial_score {} must be in (0, {}]",
                self.default_initial_score, self.max_initial_score
            )));
        }
        if !self.score_floor.is_finite()
            || self.score_floor < 0.0
            || self.score_floor >= self.max_initial_score
        {
            return Err(invalid(format!(
                "score_floor {} must be in [0, {})",
                self.score_floor, self.max_initial_score
            )));
        }
        if !(self.weight_tolerance >= 0.0 && self.weight_tolerance < 0.5) {
            return Err(invalid("weight_tolerance must be in [0, 0.5)".to_string()));
        }
        if self.page_size == 0 {
            return Err(invalid("page_size must be positive".to_string()));
        }
        if let AggregationPolicy::RoleWeighted {
            weights,
            default_weight,
        } = &self.aggregation
        {
            let valid = |w: f64| w.is_finite() && w >= 0.0;
            if !valid(*default_weight) || !weights.values().all(|w| valid(*w)) {
                return Err(invalid("role weights must be non-negative".to_string()));
            }
        }
        match self.advancement {
            AdvancementPolicy::TopN { n: 0 } => {
                Err(invalid("top_n advancement needs n >= 1".to_string()))
            }
            AdvancementPolicy::MinScore { threshold } if !threshold.is_finite() => {
                Err(invalid("min_score threshold must be finite".to_string()))
            }
            _ => Ok(()),
        }
    }
}

fn invalid(msg: String) -> JudgeError {
    JudgeError::Config(msg)
}
