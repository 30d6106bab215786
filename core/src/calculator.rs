//! Score calculator: applies the bin matcher across all active
//! characteristics and builds the line-by-line trace.
//!
//! RULES:
//!   - Pure function of (scorecard, applicant data). No clock, no RNG.
//!   - Characteristics are visited in list order.
//!   - Points accumulate in f64; rounding happens only for display.

use crate::{
    bin_matcher::{self, MatchStatus},
    decision::{self, Decision, Factor, DEFAULT_TOP_FACTORS},
    model::Scorecard,
    types::{ApplicantData, BinId, CharacteristicId, ScorecardId, Version},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One trace row per active characteristic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CharacteristicScore {
    pub characteristic_id: CharacteristicId,
    pub code:              String,
    pub name:              String,
    pub data_field:        String,
    pub input_value:       Option<Value>,
    pub status:            MatchStatus,
    pub bin_id:            Option<BinId>,
    pub bin_label:         Option<String>,
    pub points:            f64,
    pub weight_multiplier: f64,
    pub weighted_points:   f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringResult {
    pub scorecard_id:          ScorecardId,
    pub scorecard_version:     Version,
    pub base_score:            f64,
    pub total_score:           f64,
    pub characteristic_scores: Vec<CharacteristicScore>,
    pub decision:              Decision,
    pub reason_codes:          Vec<String>,
    pub top_positive_factors:  Vec<Factor>,
    pub top_negative_factors:  Vec<Factor>,
    /// Codes of characteristics that could not be scored.
    pub unscored:              Vec<String>,
}

impl ScoringResult {
    pub fn display_score(&self) -> f64 {
        round_for_display(self.total_score)
    }

    pub fn line(&self, code: &str) -> Option<&CharacteristicScore> {
        self.characteristic_scores.iter().find(|l| l.code == code)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScoreCalculator {
    top_factors: usize,
}

impl Default for ScoreCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_FACTORS)
    }
}

impl ScoreCalculator {
    pub fn new(top_factors: usize) -> Self {
        Self { top_factors }
    }

    pub fn calculate(&self, scorecard: &Scorecard, applicant_data: &ApplicantData) -> ScoringResult {
        let (total_score, lines) = trace(scorecard, applicant_data);
        let decision = decision::decide(scorecard, total_score);
        let explanation = decision::explain(&lines, self.top_factors);
        let unscored = lines
            .iter()
            .filter(|l| l.status != MatchStatus::Matched)
            .map(|l| l.code.clone())
            .collect();

        log::debug!(
            "scorecard={} v{} scored {:.2} -> {decision}",
            scorecard.scorecard_id,
            scorecard.version,
            total_score
        );

        ScoringResult {
            scorecard_id: scorecard.scorecard_id.clone(),
            scorecard_version: scorecard.version,
            base_score: scorecard.base_score,
            total_score,
            characteristic_scores: lines,
            decision,
            reason_codes: explanation.reason_codes,
            top_positive_factors: explanation.top_positive_factors,
            top_negative_factors: explanation.top_negative_factors,
            unscored,
        }
    }
}

/// Score with the default number of top factors.
pub fn calculate(scorecard: &Scorecard, applicant_data: &ApplicantData) -> ScoringResult {
    ScoreCalculator::default().calculate(scorecard, applicant_data)
}

/// Total score and trace rows, without the decision.
pub fn trace(scorecard: &Scorecard, applicant_data: &ApplicantData) -> (f64, Vec<CharacteristicScore>) {
    let mut total = scorecard.base_score;
    let mut lines = Vec::new();

    for characteristic in scorecard.active_characteristics() {
        let input = applicant_data.get(&characteristic.data_field);
        let matched = bin_matcher::match_value(characteristic, input);
        let bin = matched.bin();
        let points = bin.map_or(0.0, |b| b.points);
        let weighted_points = match bin {
            Some(_) => points * characteristic.weight_multiplier,
            None => 0.0,
        };
        total += weighted_points;

        lines.push(CharacteristicScore {
            characteristic_id: characteristic.characteristic_id.clone(),
            code: characteristic.code.clone(),
            name: characteristic.name.clone(),
            data_field: characteristic.data_field.clone(),
            input_value: input.cloned(),
            status: matched.status(),
            bin_id: bin.map(|b| b.bin_id.clone()),
            bin_label: bin.map(|b| b.label.clone()),
            points,
            weight_multiplier: characteristic.weight_multiplier,
            weighted_points,
        });
    }

    (total, lines)
}

/// Two-decimal rounding for presentation and change-log strings.
pub fn round_for_display(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
