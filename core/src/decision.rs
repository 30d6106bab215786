//! Decisioner: maps a total score to a lending decision and derives
//! the factors and adverse-action reason codes behind it.

use crate::{calculator::CharacteristicScore, model::Scorecard};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_TOP_FACTORS: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    ManualReview,
    Decline,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve      => "approve",
            Self::ManualReview => "manual_review",
            Self::Decline      => "decline",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One characteristic's contribution, as shown to an underwriter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Factor {
    pub code:            String,
    pub name:            String,
    pub weighted_points: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Explanation {
    pub reason_codes:         Vec<String>,
    pub top_positive_factors: Vec<Factor>,
    pub top_negative_factors: Vec<Factor>,
}

/// Approve at or above the approve threshold, decline at or below the
/// decline threshold, manual review in between.
pub fn decide(scorecard: &Scorecard, total_score: f64) -> Decision {
    let t = &scorecard.thresholds;
    if total_score >= t.auto_approve {
        Decision::Approve
    } else if total_score <= t.auto_decline {
        Decision::Decline
    } else {
        Decision::ManualReview
    }
}

/// Top-N positive and negative contributors. Zero contributions, which
/// include missing and unmatched inputs, appear in neither list. Ties keep
/// characteristic order.
pub fn explain(lines: &[CharacteristicScore], top_n: usize) -> Explanation {
    let mut negative: Vec<&CharacteristicScore> =
        lines.iter().filter(|l| l.weighted_points < 0.0).collect();
    negative.sort_by(|a, b| a.weighted_points.total_cmp(&b.weighted_points));
    negative.truncate(top_n);

    let mut positive: Vec<&CharacteristicScore> =
        lines.iter().filter(|l| l.weighted_points > 0.0).collect();
    positive.sort_by(|a, b| b.weighted_points.total_cmp(&a.weighted_points));
    positive.truncate(top_n);

    Explanation {
        reason_codes: negative.iter().map(|l| reason_code(&l.code)).collect(),
        top_positive_factors: positive.into_iter().map(factor).collect(),
        top_negative_factors: negative.into_iter().map(factor).collect(),
    }
}

/// Stable adverse-action code for a characteristic code. Case is kept so
/// distinct codes never share a reason code.
pub fn reason_code(code: &str) -> String {
    format!("RC_{code}")
}

fn factor(line: &CharacteristicScore) -> Factor {
    Factor {
        code: line.code.clone(),
        name: line.name.clone(),
        weighted_points: line.weighted_points,
    }
}
