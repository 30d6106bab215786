use crate::alerts::{default_rules, AlertRule};
use crate::decision::DEFAULT_TOP_FACTORS;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PerformanceConfig {
    pub band_count:          usize,
    /// Below this many observations Gini/KS/PSI are reported unavailable.
    pub min_sample_size:     usize,
    pub psi_warning:         f64,
    pub psi_critical:        f64,
    /// Band shares are floored at this before the PSI log term.
    pub psi_floor:           f64,
    pub analysis_timeout_ms: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            band_count: 10,
            min_sample_size: 100,
            psi_warning: 0.1,
            psi_critical: 0.25,
            psi_floor: 1e-4,
            analysis_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Top positive / negative factors reported per decision.
    pub top_factors: usize,
    pub performance: PerformanceConfig,
    pub alert_rules: Vec<AlertRule>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            top_factors: DEFAULT_TOP_FACTORS,
            performance: PerformanceConfig::default(),
            alert_rules: default_rules(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file. Missing keys fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        log::info!(
            "Loaded engine config from {} ({} alert rules, {} bands)",
            path.display(),
            config.alert_rules.len(),
            config.performance.band_count
        );
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let p = &self.performance;
        if p.band_count == 0 {
            anyhow::bail!("performance.band_count must be at least 1");
        }
        if !(p.psi_floor > 0.0 && p.psi_floor < 1.0) {
            anyhow::bail!("performance.psi_floor must be in (0, 1)");
        }
        if p.psi_warning > p.psi_critical {
            anyhow::bail!("performance.psi_warning must not exceed psi_critical");
        }
        let mut rule_ids = HashSet::new();
        for rule in &self.alert_rules {
            if rule.rule_id.trim().is_empty() {
                anyhow::bail!("alert rules need a non-empty rule_id");
            }
            if !rule_ids.insert(rule.rule_id.as_str()) {
                anyhow::bail!("alert rule {} is defined more than once", rule.rule_id);
            }
            if rule.min_consecutive_periods == 0 {
                anyhow::bail!("alert rule {} needs min_consecutive_periods >= 1", rule.rule_id);
            }
            if !rule.threshold.is_finite() {
                anyhow::bail!("alert rule {} has a non-finite threshold", rule.rule_id);
            }
        }
        Ok(())
    }

    /// Small samples so tests can exercise every metric with a few rows.
    pub fn default_test() -> Self {
        Self {
            performance: PerformanceConfig {
                band_count: 4,
                min_sample_size: 10,
                ..PerformanceConfig::default()
            },
            ..Self::default()
        }
    }
}
