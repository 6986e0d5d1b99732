//! Configuration management for Parley components

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Global Parley configuration
///
/// Tuning knobs only. The TRS composite weights are published methodology
/// and deliberately not configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// EWMA smoothing factor for TRS component updates
    #[serde(default = "default_smoothing")]
    pub trs_smoothing: f64,

    /// Challenge expiry window in seconds
    #[serde(default = "default_challenge_window_secs")]
    pub challenge_window_secs: i64,

    /// Geometric decay applied to repeat-challenge probability
    #[serde(default = "default_challenge_decay")]
    pub challenge_decay: f64,

    /// Floor probability for repeat challenges
    #[serde(default = "default_challenge_floor")]
    pub challenge_floor: f64,

    /// Minimum reply quality for a SENSITIVE/RESEARCH grant
    #[serde(default = "default_quality_floor")]
    pub quality_floor: f64,

    /// Minimum written-justification length for RESEARCH grants
    #[serde(default = "default_min_justification_len")]
    pub min_justification_len: usize,

    /// Bounded retry count for ledger append conflicts
    #[serde(default = "default_append_retries")]
    pub append_retries: usize,
}

fn default_smoothing() -> f64 {
    0.3
}

fn default_challenge_window_secs() -> i64 {
    120
}

fn default_challenge_decay() -> f64 {
    0.5
}

fn default_challenge_floor() -> f64 {
    0.1
}

fn default_quality_floor() -> f64 {
    0.5
}

fn default_min_justification_len() -> usize {
    40
}

fn default_append_retries() -> usize {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trs_smoothing: default_smoothing(),
            challenge_window_secs: default_challenge_window_secs(),
            challenge_decay: default_challenge_decay(),
            challenge_floor: default_challenge_floor(),
            quality_floor: default_quality_floor(),
            min_justification_len: default_min_justification_len(),
            append_retries: default_append_retries(),
        }
    }
}

impl Config {
    /// Load config from file, falling back to defaults if absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
