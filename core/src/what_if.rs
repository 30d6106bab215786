//! What-if simulator: counterfactual re-scoring of a stored application.
//!
//! RULE: read-only. The baseline values are borrowed, the overlay is a
//! fresh map, and the scorecard is never touched.

use crate::{
    bin_matcher::MatchStatus,
    calculator::{CharacteristicScore, ScoreCalculator, ScoringResult},
    model::Scorecard,
    types::ApplicantData,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A characteristic whose outcome moved between base and modified runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CharacteristicDiff {
    pub code:            String,
    pub data_field:      String,
    pub base_value:      Option<Value>,
    pub modified_value:  Option<Value>,
    pub base_status:     MatchStatus,
    pub modified_status: MatchStatus,
    pub base_bin:        Option<String>,
    pub modified_bin:    Option<String>,
    pub base_points:     f64,
    pub modified_points: f64,
    pub points_delta:    f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WhatIfResult {
    pub base:             ScoringResult,
    pub modified:         ScoringResult,
    pub score_delta:      f64,
    pub decision_changed: bool,
    /// Keys overridden by the modifications, in key order.
    pub modified_fields:  Vec<String>,
    pub diffs:            Vec<CharacteristicDiff>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WhatIfSimulator {
    calculator: ScoreCalculator,
}

impl WhatIfSimulator {
    pub fn new(calculator: ScoreCalculator) -> Self {
        Self { calculator }
    }

    /// Score the baseline, overlay `modifications` (only keys present
    /// override; a null override makes the input missing), score again.
    pub fn simulate(
        &self,
        scorecard: &Scorecard,
        baseline: &ApplicantData,
        modifications: &ApplicantData,
    ) -> WhatIfResult {
        let base = self.calculator.calculate(scorecard, baseline);

        let mut modified_values = baseline.clone();
        for (field, value) in modifications {
            modified_values.insert(field.clone(), value.clone());
        }
        let modified = self.calculator.calculate(scorecard, &modified_values);

        let diffs = base
            .characteristic_scores
            .iter()
            .zip(&modified.characteristic_scores)
            .filter(|(b, m)| changed(b, m))
            .map(|(b, m)| CharacteristicDiff {
                code: b.code.clone(),
                data_field: b.data_field.clone(),
                base_value: b.input_value.clone(),
                modified_value: m.input_value.clone(),
                base_status: b.status,
                modified_status: m.status,
                base_bin: b.bin_label.clone(),
                modified_bin: m.bin_label.clone(),
                base_points: b.weighted_points,
                modified_points: m.weighted_points,
                points_delta: m.weighted_points - b.weighted_points,
            })
            .collect();

        WhatIfResult {
            score_delta: modified.total_score - base.total_score,
            decision_changed: modified.decision != base.decision,
            modified_fields: modifications.keys().cloned().collect(),
            diffs,
            base,
            modified,
        }
    }
}

fn changed(base: &CharacteristicScore, modified: &CharacteristicScore) -> bool {
    base.bin_id != modified.bin_id
        || base.status != modified.status
        || base.weighted_points != modified.weighted_points
}
