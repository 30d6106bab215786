//! Alert rules over the performance snapshot history.
//!
//! A rule fires once per violation episode. The episode opens when the
//! metric has violated the threshold for `min_consecutive_periods`
//! snapshots in a row and closes on the first snapshot where it no
//! longer does. A snapshot that could not compute the metric is no
//! evidence either way: it neither extends nor breaks a run, and never
//! fires or closes. Alerts are never resolved automatically; closing an
//! episode only allows the next violation to fire a fresh alert.

use crate::performance::PerformanceSnapshot;
use crate::types::ScorecardId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Gini,
    Ks,
    Psi,
    ApprovalRate,
    DefaultRate,
    MeanScore,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gini         => "gini",
            Self::Ks           => "ks",
            Self::Psi          => "psi",
            Self::ApprovalRate => "approval_rate",
            Self::DefaultRate  => "default_rate",
            Self::MeanScore    => "mean_score",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "gini"          => Some(Self::Gini),
            "ks"            => Some(Self::Ks),
            "psi"           => Some(Self::Psi),
            "approval_rate" => Some(Self::ApprovalRate),
            "default_rate"  => Some(Self::DefaultRate),
            "mean_score"    => Some(Self::MeanScore),
            _ => None,
        }
    }

    /// Observed value, or `None` when the snapshot could not compute it.
    pub fn read(&self, snapshot: &PerformanceSnapshot) -> Option<f64> {
        match self {
            Self::Gini         => snapshot.gini.value(),
            Self::Ks           => snapshot.ks.value(),
            Self::Psi          => snapshot.psi.value(),
            Self::ApprovalRate => (snapshot.total_applications > 0).then_some(snapshot.approval_rate),
            Self::DefaultRate  => snapshot.default_rate,
            Self::MeanScore    => snapshot.mean_score,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Comparison {
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Lt  => value < threshold,
            Self::Lte => value <= threshold,
            Self::Gt  => value > threshold,
            Self::Gte => value >= threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Lt  => "<",
            Self::Lte => "<=",
            Self::Gt  => ">",
            Self::Gte => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info     => "info",
            Self::Warning  => "warning",
            Self::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "info"     => Some(Self::Info),
            "warning"  => Some(Self::Warning),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRule {
    pub rule_id:                 String,
    pub metric:                  Metric,
    pub operator:                Comparison,
    pub threshold:               f64,
    #[serde(default = "one")]
    pub min_consecutive_periods: u32,
    pub severity:                Severity,
}

impl AlertRule {
    pub fn new(rule_id: &str, metric: Metric, operator: Comparison, threshold: f64, severity: Severity) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            metric,
            operator,
            threshold,
            min_consecutive_periods: 1,
            severity,
        }
    }

    pub fn for_periods(mut self, periods: u32) -> Self {
        self.min_consecutive_periods = periods.max(1);
        self
    }

    /// Trailing run of violating readings, skipping snapshots where the
    /// metric is unavailable.
    pub fn violation_streak(&self, history: &[PerformanceSnapshot]) -> u32 {
        history
            .iter()
            .rev()
            .filter_map(|s| self.metric.read(s))
            .take_while(|v| self.operator.holds(*v, self.threshold))
            .count() as u32
    }
}

pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new("psi_critical", Metric::Psi, Comparison::Gt, 0.25, Severity::Critical),
        AlertRule::new("psi_warning", Metric::Psi, Comparison::Gt, 0.10, Severity::Warning).for_periods(2),
        AlertRule::new("gini_degraded", Metric::Gini, Comparison::Lt, 0.30, Severity::Warning).for_periods(2),
        AlertRule::new("ks_degraded", Metric::Ks, Comparison::Lt, 0.20, Severity::Warning).for_periods(2),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertItem {
    pub alert_id:        String,
    pub scorecard_id:    ScorecardId,
    pub rule_id:         String,
    pub metric:          Metric,
    pub severity:        Severity,
    pub message:         String,
    pub observed_value:  f64,
    pub threshold:       f64,
    pub fired_at:        DateTime<Utc>,
    /// True while the violation that fired this alert is ongoing.
    pub episode_open:    bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl AlertItem {
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_at.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertEvaluation {
    pub fired:        Vec<AlertItem>,
    /// Rules whose open episode ended with the latest snapshot.
    pub closed_rules: Vec<String>,
}

/// Evaluate every rule against `history` (oldest first, latest last).
/// `open_rules` are the rules that already have an open episode.
pub fn evaluate(
    rules: &[AlertRule],
    scorecard_id: &str,
    history: &[PerformanceSnapshot],
    open_rules: &HashSet<String>,
    now: DateTime<Utc>,
) -> AlertEvaluation {
    let mut out = AlertEvaluation::default();
    let Some(latest) = history.last() else {
        return out;
    };

    for rule in rules {
        let Some(observed) = rule.metric.read(latest) else {
            continue;
        };
        let streak = rule.violation_streak(history);
        let open = open_rules.contains(&rule.rule_id);

        if streak == 0 {
            if open {
                out.closed_rules.push(rule.rule_id.clone());
            }
            continue;
        }
        if open || streak < rule.min_consecutive_periods {
            continue;
        }

        let message = format!(
            "{} {:.4} {} {} for {} consecutive snapshot(s) on v{}",
            rule.metric,
            observed,
            rule.operator.symbol(),
            rule.threshold,
            streak,
            latest.scorecard_version,
        );
        log::warn!("scorecard={scorecard_id} alert {}: {message}", rule.rule_id);
        out.fired.push(AlertItem {
            alert_id: uuid::Uuid::new_v4().to_string(),
            scorecard_id: scorecard_id.to_string(),
            rule_id: rule.rule_id.clone(),
            metric: rule.metric,
            severity: rule.severity,
            message,
            observed_value: observed,
            threshold: rule.threshold,
            fired_at: now,
            episode_open: true,
            acknowledged_by: None,
            acknowledged_at: None,
        });
    }
    out
}
