//! Performance analyzer: population monitoring for a scorecard.
//!
//! Computes, from historical scored + resolved applications:
//!   1. Score-band breakdown (count, share, approval rate, default rate)
//!   2. Gini = 2·AUC − 1 (trapezoidal AUC over cumulative good/bad)
//!   3. KS = max |CDF_good − CDF_bad| over ascending scores
//!   4. PSI against a stored baseline band distribution
//!
//! The population is streamed once. Outcomes are folded into per-band
//! counters and a per-score good/bad histogram, so memory is bounded by
//! the number of distinct scores, not the population size.
//!
//! A metric without enough data is reported as `Unavailable` instead of
//! failing the whole snapshot.

use crate::{
    calculator::round_for_display,
    config::PerformanceConfig,
    error::{EngineError, EngineResult},
    model::Scorecard,
    types::{ApplicationId, ScorecardId, Version},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Records between cancellation/deadline checks.
const CHECK_EVERY: u64 = 1024;

// ── Inputs ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoricalOutcome {
    pub application_id: ApplicationId,
    pub score:          f64,
    pub approved:       bool,
    /// Known only for approved applications that have matured.
    pub defaulted:      Option<bool>,
}

// ── Outputs ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MetricValue {
    Available { value: f64 },
    Unavailable { reason: String },
}

impl MetricValue {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Available { value } => Some(*value),
            Self::Unavailable { .. } => None,
        }
    }

    fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PsiStatus {
    Stable,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BandStats {
    pub label:             String,
    pub lower:             Option<f64>,
    pub upper:             Option<f64>,
    pub count:             u64,
    pub pct_of_population: f64,
    pub approval_rate:     f64,
    pub default_rate:      Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceSnapshot {
    pub scorecard_id:       ScorecardId,
    pub scorecard_version:  Version,
    pub computed_at:        DateTime<Utc>,
    pub total_applications: u64,
    pub approved:           u64,
    pub declined:           u64,
    pub approval_rate:      f64,
    /// Approved applications with a known outcome.
    pub resolved:           u64,
    pub defaults:           u64,
    pub default_rate:       Option<f64>,
    pub mean_score:         Option<f64>,
    pub gini:               MetricValue,
    pub ks:                 MetricValue,
    pub psi:                MetricValue,
    pub psi_status:         Option<PsiStatus>,
    pub bands:              Vec<BandStats>,
}

/// Band distribution captured at activation, the reference for PSI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PsiBaseline {
    pub scorecard_id: ScorecardId,
    pub band_labels:  Vec<String>,
    pub shares:       Vec<f64>,
    pub captured_at:  DateTime<Utc>,
}

// ── Score bands ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBand {
    pub label: String,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

/// Equal-width bands over `[min_score, max_score)`. The first and last
/// bands are open-ended so out-of-range scores still land somewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct BandScheme {
    min:   f64,
    width: f64,
    bands: Vec<ScoreBand>,
}

impl BandScheme {
    pub fn uniform(min_score: f64, max_score: f64, count: usize) -> Self {
        let count = count.max(1);
        let width = (max_score - min_score) / count as f64;
        let bands = (0..count)
            .map(|i| {
                let lower = (i > 0).then(|| round_for_display(min_score + width * i as f64));
                let upper = (i + 1 < count).then(|| round_for_display(min_score + width * (i + 1) as f64));
                let label = match (lower, upper) {
                    (None, None) => "all".to_string(),
                    (None, Some(hi)) => format!("<{hi}"),
                    (Some(lo), None) => format!(">={lo}"),
                    (Some(lo), Some(hi)) => format!("{lo}-{hi}"),
                };
                ScoreBand { label, lower, upper }
            })
            .collect();
        Self {
            min: min_score,
            width,
            bands,
        }
    }

    pub fn bands(&self) -> &[ScoreBand] {
        &self.bands
    }

    pub fn labels(&self) -> Vec<String> {
        self.bands.iter().map(|b| b.label.clone()).collect()
    }

    pub fn index_of(&self, score: f64) -> usize {
        let last = self.bands.len() - 1;
        if last == 0 || self.width <= 0.0 {
            return 0;
        }
        let raw = ((score - self.min) / self.width).floor();
        if raw < 0.0 {
            0
        } else {
            (raw as usize).min(last)
        }
    }
}

// ── Cancellation ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisControl {
    cancel:   CancelToken,
    started:  Instant,
    deadline: Option<Instant>,
}

impl Default for AnalysisControl {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisControl {
    pub fn new() -> Self {
        Self {
            cancel: CancelToken::new(),
            started: Instant::now(),
            deadline: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(self.started + timeout);
        self
    }

    pub fn token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn check(&self) -> EngineResult<()> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::AnalysisCancelled);
        }
        if let Some(deadline) = self.deadline {
            let now = Instant::now();
            if now >= deadline {
                return Err(EngineError::AnalysisTimedOut {
                    elapsed_ms: now.duration_since(self.started).as_millis(),
                });
            }
        }
        Ok(())
    }
}

// ── Accumulation ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct BandCounter {
    count:    u64,
    approved: u64,
    resolved: u64,
    defaults: u64,
}

/// One pass over the population.
struct Accumulator {
    bands:     Vec<BandCounter>,
    /// Score (hundredths) → (goods, bads) among resolved applications.
    histogram: BTreeMap<i64, (u64, u64)>,
    total:     u64,
    approved:  u64,
    resolved:  u64,
    defaults:  u64,
    score_sum: f64,
}

impl Accumulator {
    fn new(band_count: usize) -> Self {
        Self {
            bands: vec![BandCounter::default(); band_count],
            histogram: BTreeMap::new(),
            total: 0,
            approved: 0,
            resolved: 0,
            defaults: 0,
            score_sum: 0.0,
        }
    }

    fn run(
        scheme: &BandScheme,
        outcomes: impl Iterator<Item = HistoricalOutcome>,
        control: &AnalysisControl,
    ) -> EngineResult<Self> {
        control.check()?;
        let mut acc = Self::new(scheme.bands().len());
        for outcome in outcomes {
            acc.add(scheme, &outcome);
            if acc.total % CHECK_EVERY == 0 {
                control.check()?;
            }
        }
        control.check()?;
        Ok(acc)
    }

    fn add(&mut self, scheme: &BandScheme, outcome: &HistoricalOutcome) {
        let band = &mut self.bands[scheme.index_of(outcome.score)];
        band.count += 1;
        self.total += 1;
        self.score_sum += outcome.score;

        if !outcome.approved {
            return;
        }
        band.approved += 1;
        self.approved += 1;

        if let Some(defaulted) = outcome.defaulted {
            band.resolved += 1;
            self.resolved += 1;
            let cell = self.histogram.entry(score_key(outcome.score)).or_default();
            if defaulted {
                band.defaults += 1;
                self.defaults += 1;
                cell.1 += 1;
            } else {
                cell.0 += 1;
            }
        }
    }

    fn shares(&self) -> Vec<f64> {
        self.bands
            .iter()
            .map(|b| ratio(b.count, self.total))
            .collect()
    }
}

fn score_key(score: f64) -> i64 {
    (score * 100.0).round() as i64
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

// ── Statistics ──────────────────────────────────────────────────────

/// Gini from a score → (goods, bads) histogram. Higher scores are
/// expected to be good; walking scores high to low traces the ROC curve.
pub fn gini(histogram: &BTreeMap<i64, (u64, u64)>) -> Option<f64> {
    let (goods, bads) = totals(histogram);
    if goods == 0 || bads == 0 {
        return None;
    }
    let (g_total, b_total) = (goods as f64, bads as f64);

    let mut auc = 0.0;
    let (mut cum_g, mut cum_b) = (0u64, 0u64);
    for (g, b) in histogram.values().rev() {
        let prev_tpr = cum_g as f64 / g_total;
        let prev_fpr = cum_b as f64 / b_total;
        cum_g += g;
        cum_b += b;
        let tpr = cum_g as f64 / g_total;
        let fpr = cum_b as f64 / b_total;
        auc += (fpr - prev_fpr) * (tpr + prev_tpr) / 2.0;
    }
    Some(2.0 * auc - 1.0)
}

/// KS: largest gap between the good and bad cumulative score distributions.
pub fn ks(histogram: &BTreeMap<i64, (u64, u64)>) -> Option<f64> {
    let (goods, bads) = totals(histogram);
    if goods == 0 || bads == 0 {
        return None;
    }
    let (mut cum_g, mut cum_b) = (0u64, 0u64);
    let mut max_gap: f64 = 0.0;
    for (g, b) in histogram.values() {
        cum_g += g;
        cum_b += b;
        let gap = (cum_g as f64 / goods as f64 - cum_b as f64 / bads as f64).abs();
        max_gap = max_gap.max(gap);
    }
    Some(max_gap)
}

/// Σ (current − baseline) · ln(current / baseline), shares floored at `floor`.
pub fn psi(current: &[f64], baseline: &[f64], floor: f64) -> f64 {
    current
        .iter()
        .zip(baseline)
        .map(|(c, b)| {
            let c = c.max(floor);
            let b = b.max(floor);
            (c - b) * (c / b).ln()
        })
        .sum()
}

pub fn psi_status(value: f64, config: &PerformanceConfig) -> PsiStatus {
    if value > config.psi_critical {
        PsiStatus::Critical
    } else if value > config.psi_warning {
        PsiStatus::Warning
    } else {
        PsiStatus::Stable
    }
}

fn totals(histogram: &BTreeMap<i64, (u64, u64)>) -> (u64, u64) {
    histogram
        .values()
        .fold((0, 0), |(g, b), (cg, cb)| (g + cg, b + cb))
}

// ── Analyzer ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PerformanceAnalyzer {
    config: PerformanceConfig,
}

impl PerformanceAnalyzer {
    pub fn new(config: PerformanceConfig) -> Self {
        Self { config }
    }

    pub fn scheme(&self, scorecard: &Scorecard) -> BandScheme {
        BandScheme::uniform(scorecard.min_score, scorecard.max_score, self.config.band_count)
    }

    pub fn analyze(
        &self,
        scorecard: &Scorecard,
        outcomes: impl Iterator<Item = HistoricalOutcome>,
        baseline: Option<&PsiBaseline>,
        control: &AnalysisControl,
        computed_at: DateTime<Utc>,
    ) -> EngineResult<PerformanceSnapshot> {
        let scheme = self.scheme(scorecard);
        let acc = Accumulator::run(&scheme, outcomes, control)?;
        let min_n = self.config.min_sample_size as u64;

        let discrimination_gap = if acc.resolved < min_n {
            Some(format!(
                "{} resolved applications, at least {min_n} required",
                acc.resolved
            ))
        } else if acc.defaults == 0 || acc.defaults == acc.resolved {
            Some("both good and bad outcomes are required".to_string())
        } else {
            None
        };
        let (gini_value, ks_value) = match discrimination_gap {
            Some(reason) => (
                MetricValue::unavailable(reason.clone()),
                MetricValue::unavailable(reason),
            ),
            None => (
                gini(&acc.histogram).map_or_else(
                    || MetricValue::unavailable("no separable outcomes"),
                    |value| MetricValue::Available { value },
                ),
                ks(&acc.histogram).map_or_else(
                    || MetricValue::unavailable("no separable outcomes"),
                    |value| MetricValue::Available { value },
                ),
            ),
        };

        let psi_value = match baseline {
            None => MetricValue::unavailable("no PSI baseline captured"),
            Some(b) if b.band_labels != scheme.labels() => {
                MetricValue::unavailable("baseline band layout differs from current bands")
            }
            Some(_) if acc.total < min_n => MetricValue::unavailable(format!(
                "{} applications, at least {min_n} required",
                acc.total
            )),
            Some(b) => MetricValue::Available {
                value: psi(&acc.shares(), &b.shares, self.config.psi_floor),
            },
        };
        let psi_status = psi_value.value().map(|v| psi_status(v, &self.config));

        let bands = scheme
            .bands()
            .iter()
            .zip(&acc.bands)
            .map(|(band, c)| BandStats {
                label: band.label.clone(),
                lower: band.lower,
                upper: band.upper,
                count: c.count,
                pct_of_population: ratio(c.count, acc.total),
                approval_rate: ratio(c.approved, c.count),
                default_rate: (c.resolved > 0).then(|| ratio(c.defaults, c.resolved)),
            })
            .collect();

        let snapshot = PerformanceSnapshot {
            scorecard_id: scorecard.scorecard_id.clone(),
            scorecard_version: scorecard.version,
            computed_at,
            total_applications: acc.total,
            approved: acc.approved,
            declined: acc.total - acc.approved,
            approval_rate: ratio(acc.approved, acc.total),
            resolved: acc.resolved,
            defaults: acc.defaults,
            default_rate: (acc.resolved > 0).then(|| ratio(acc.defaults, acc.resolved)),
            mean_score: (acc.total > 0).then(|| acc.score_sum / acc.total as f64),
            gini: gini_value,
            ks: ks_value,
            psi: psi_value,
            psi_status,
            bands,
        };

        log::info!(
            "scorecard={} v{} performance: n={} gini={:?} ks={:?} psi={:?}",
            snapshot.scorecard_id,
            snapshot.scorecard_version,
            snapshot.total_applications,
            snapshot.gini.value(),
            snapshot.ks.value(),
            snapshot.psi.value(),
        );
        Ok(snapshot)
    }

    /// Current band distribution as the new PSI reference.
    pub fn capture_baseline(
        &self,
        scorecard: &Scorecard,
        outcomes: impl Iterator<Item = HistoricalOutcome>,
        control: &AnalysisControl,
        captured_at: DateTime<Utc>,
    ) -> EngineResult<PsiBaseline> {
        let scheme = self.scheme(scorecard);
        let acc = Accumulator::run(&scheme, outcomes, control)?;
        if acc.total < self.config.min_sample_size as u64 {
            return Err(EngineError::validation(format!(
                "baseline needs at least {} applications, found {}",
                self.config.min_sample_size, acc.total
            )));
        }
        Ok(PsiBaseline {
            scorecard_id: scorecard.scorecard_id.clone(),
            band_labels: scheme.labels(),
            shares: acc.shares(),
            captured_at,
        })
    }
}
