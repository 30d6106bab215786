//! Scorecard model: scorecards, characteristics, bins, thresholds.
//!
//! Pure data plus invariant checks. A scorecard owns its
//! characteristics and bins; they are stored, versioned and retired
//! together with it.
//!
//! INVARIANTS (checked by `Scorecard::validate`, enforced on every save):
//!   - auto_approve >= manual_review >= auto_decline
//!   - characteristic codes unique, `[A-Za-z0-9_]+`, immutable
//!   - weight_multiplier finite and > 0
//!   - all bins of a characteristic share one bin type
//!   - numeric bins never overlap; categorical values unique
//!   - bin labels unique per characteristic (they anchor bin identity)

use crate::{
    error::{EngineError, EngineResult},
    script,
    types::{BinId, CharacteristicId, ScorecardId, Version},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ── Status ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScorecardStatus {
    Draft,
    Shadow,
    Challenger,
    Champion,
    Active,
    Retired,
}

impl ScorecardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft      => "draft",
            Self::Shadow     => "shadow",
            Self::Challenger => "challenger",
            Self::Champion   => "champion",
            Self::Active     => "active",
            Self::Retired    => "retired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft"      => Some(Self::Draft),
            "shadow"     => Some(Self::Shadow),
            "challenger" => Some(Self::Challenger),
            "champion"   => Some(Self::Champion),
            "active"     => Some(Self::Active),
            "retired"    => Some(Self::Retired),
            _ => None,
        }
    }

    /// Statuses whose decisions reach applicants.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Champion | Self::Active)
    }
}

impl fmt::Display for ScorecardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Thresholds ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Thresholds {
    pub auto_approve:  f64,
    pub manual_review: f64,
    pub auto_decline:  f64,
}

impl Thresholds {
    pub fn new(auto_approve: f64, manual_review: f64, auto_decline: f64) -> Self {
        Self {
            auto_approve,
            manual_review,
            auto_decline,
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        for (name, value) in [
            ("auto_approve_threshold", self.auto_approve),
            ("manual_review_threshold", self.manual_review),
            ("auto_decline_threshold", self.auto_decline),
        ] {
            if !value.is_finite() {
                return Err(EngineError::validation(format!("{name} must be a finite number")));
            }
        }
        if self.auto_decline > self.manual_review {
            return Err(EngineError::validation(format!(
                "auto_decline_threshold ({}) must not exceed manual_review_threshold ({})",
                self.auto_decline, self.manual_review
            )));
        }
        if self.manual_review > self.auto_approve {
            return Err(EngineError::validation(format!(
                "manual_review_threshold ({}) must not exceed auto_approve_threshold ({})",
                self.manual_review, self.auto_approve
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Thresholds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "approve>={} review>={} decline<={}",
            self.auto_approve, self.manual_review, self.auto_decline
        )
    }
}

// ── Bins ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BinType {
    NumericRange,
    Categorical,
}

/// What a bin matches. Range bounds are half-open `[min, max)`;
/// `None` is an unbounded end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "bin_type", rename_all = "snake_case")]
pub enum BinCondition {
    NumericRange {
        min_value: Option<f64>,
        max_value: Option<f64>,
    },
    Categorical {
        category_value: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bin {
    pub bin_id: BinId,
    pub label:  String,
    pub points: f64,
    #[serde(flatten)]
    pub condition: BinCondition,
}

impl Bin {
    pub fn range(label: &str, min_value: Option<f64>, max_value: Option<f64>, points: f64) -> Self {
        Self {
            bin_id: new_id(),
            label: label.to_string(),
            points,
            condition: BinCondition::NumericRange {
                min_value,
                max_value,
            },
        }
    }

    pub fn category(label: &str, category_value: &str, points: f64) -> Self {
        Self {
            bin_id: new_id(),
            label: label.to_string(),
            points,
            condition: BinCondition::Categorical {
                category_value: category_value.to_string(),
            },
        }
    }

    pub fn bin_type(&self) -> BinType {
        match self.condition {
            BinCondition::NumericRange { .. } => BinType::NumericRange,
            BinCondition::Categorical { .. } => BinType::Categorical,
        }
    }

    /// Lower bound with the unbounded end mapped to -inf.
    pub fn lower(&self) -> f64 {
        match self.condition {
            BinCondition::NumericRange { min_value, .. } => min_value.unwrap_or(f64::NEG_INFINITY),
            BinCondition::Categorical { .. } => f64::NAN,
        }
    }

    /// Upper bound with the unbounded end mapped to +inf.
    pub fn upper(&self) -> f64 {
        match self.condition {
            BinCondition::NumericRange { max_value, .. } => max_value.unwrap_or(f64::INFINITY),
            BinCondition::Categorical { .. } => f64::NAN,
        }
    }

    /// Human-readable condition, e.g. `[18, 25)` or `= "own"`.
    pub fn describe_condition(&self) -> String {
        match &self.condition {
            BinCondition::NumericRange {
                min_value,
                max_value,
            } => {
                let lo = min_value.map_or("-inf".to_string(), |v| v.to_string());
                let hi = max_value.map_or("+inf".to_string(), |v| v.to_string());
                format!("[{lo}, {hi})")
            }
            BinCondition::Categorical { category_value } => format!("= {category_value:?}"),
        }
    }

    fn validate(&self, code: &str) -> EngineResult<()> {
        if self.label.is_empty() || self.label.trim() != self.label || has_line_break(&self.label) {
            return Err(EngineError::validation(format!(
                "{code}: bin label {:?} must be non-empty, trimmed and single-line",
                self.label
            )));
        }
        if !self.points.is_finite() {
            return Err(EngineError::validation(format!(
                "{code}/{}: points must be finite",
                self.label
            )));
        }
        match &self.condition {
            BinCondition::NumericRange {
                min_value,
                max_value,
            } => {
                if min_value.is_some_and(|v| !v.is_finite()) || max_value.is_some_and(|v| !v.is_finite()) {
                    return Err(EngineError::validation(format!(
                        "{code}/{}: range bounds must be finite or open",
                        self.label
                    )));
                }
                if let (Some(lo), Some(hi)) = (min_value, max_value) {
                    if lo >= hi {
                        return Err(EngineError::validation(format!(
                            "{code}/{}: min_value {lo} must be below max_value {hi}",
                            self.label
                        )));
                    }
                }
            }
            BinCondition::Categorical { category_value } => {
                if category_value.chars().any(char::is_control) {
                    return Err(EngineError::validation(format!(
                        "{code}/{}: category value must not contain control characters",
                        self.label
                    )));
                }
            }
        }
        Ok(())
    }
}

// ── Characteristics ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Characteristic {
    pub characteristic_id: CharacteristicId,
    pub code:              String,
    pub name:              String,
    pub data_field:        String,
    pub is_active:         bool,
    pub weight_multiplier: f64,
    pub bins:              Vec<Bin>,
}

impl Characteristic {
    pub fn new(code: &str, name: &str, data_field: &str) -> Self {
        Self {
            characteristic_id: new_id(),
            code: code.to_string(),
            name: name.to_string(),
            data_field: data_field.to_string(),
            is_active: true,
            weight_multiplier: 1.0,
            bins: Vec::new(),
        }
    }

    pub fn with_bin(mut self, bin: Bin) -> Self {
        self.bins.push(bin);
        self
    }

    pub fn with_weight(mut self, weight_multiplier: f64) -> Self {
        self.weight_multiplier = weight_multiplier;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn bin_type(&self) -> Option<BinType> {
        self.bins.first().map(Bin::bin_type)
    }

    pub fn bin_by_label(&self, label: &str) -> Option<&Bin> {
        self.bins.iter().find(|b| b.label == label)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !is_valid_code(&self.code) {
            return Err(EngineError::validation(format!(
                "characteristic code {:?} must be non-empty and contain only letters, digits or '_'",
                self.code
            )));
        }
        let code = &self.code;
        if self.name.is_empty() || self.name.trim() != self.name || has_line_break(&self.name) {
            return Err(EngineError::validation(format!(
                "{code}: name must be non-empty, trimmed and single-line"
            )));
        }
        if !is_valid_field(&self.data_field) {
            return Err(EngineError::validation(format!(
                "{code}: data_field {:?} must contain only letters, digits, '_' or '.'",
                self.data_field
            )));
        }
        if !self.weight_multiplier.is_finite() || self.weight_multiplier <= 0.0 {
            return Err(EngineError::validation(format!(
                "{code}: weight_multiplier must be positive, got {}",
                self.weight_multiplier
            )));
        }

        let mut labels = HashSet::new();
        for bin in &self.bins {
            bin.validate(code)?;
            if !labels.insert(bin.label.as_str()) {
                return Err(EngineError::validation(format!(
                    "{code}: duplicate bin label {:?}",
                    bin.label
                )));
            }
        }

        match self.bin_type() {
            None => Ok(()),
            Some(kind) => {
                if self.bins.iter().any(|b| b.bin_type() != kind) {
                    return Err(EngineError::validation(format!(
                        "{code}: numeric and categorical bins cannot be mixed"
                    )));
                }
                match kind {
                    BinType::NumericRange => self.check_no_overlap(),
                    BinType::Categorical => self.check_unique_categories(),
                }
            }
        }
    }

    fn check_no_overlap(&self) -> EngineResult<()> {
        let mut ranges: Vec<&Bin> = self.bins.iter().collect();
        ranges.sort_by(|a, b| a.lower().total_cmp(&b.lower()));
        for pair in ranges.windows(2) {
            if pair[0].upper() > pair[1].lower() {
                return Err(EngineError::validation(format!(
                    "{}: bins {:?} {} and {:?} {} overlap",
                    self.code,
                    pair[0].label,
                    pair[0].describe_condition(),
                    pair[1].label,
                    pair[1].describe_condition(),
                )));
            }
        }
        Ok(())
    }

    fn check_unique_categories(&self) -> EngineResult<()> {
        let mut seen = HashSet::new();
        for bin in &self.bins {
            if let BinCondition::Categorical { category_value } = &bin.condition {
                if !seen.insert(category_value.as_str()) {
                    return Err(EngineError::validation(format!(
                        "{}: category value {category_value:?} appears in more than one bin",
                        self.code
                    )));
                }
            }
        }
        Ok(())
    }
}

// ── Scorecard ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scorecard {
    pub scorecard_id:    ScorecardId,
    pub name:            String,
    pub version:         Version,
    pub status:          ScorecardStatus,
    pub base_score:      f64,
    pub min_score:       f64,
    pub max_score:       f64,
    pub thresholds:      Thresholds,
    pub characteristics: Vec<Characteristic>,
    /// Cached script, regenerated after every committed change.
    pub script:          String,
}

impl Scorecard {
    /// A new, empty draft at version 1. Default thresholds span the
    /// nominal range: approve at max, review at midpoint, decline at min.
    pub fn new(name: &str, base_score: f64, min_score: f64, max_score: f64) -> EngineResult<Self> {
        let mut scorecard = Self {
            scorecard_id: new_id(),
            name: name.to_string(),
            version: 1,
            status: ScorecardStatus::Draft,
            base_score,
            min_score,
            max_score,
            thresholds: Thresholds::new(max_score, (min_score + max_score) / 2.0, min_score),
            characteristics: Vec::new(),
            script: String::new(),
        };
        scorecard.validate()?;
        scorecard.refresh_script();
        Ok(scorecard)
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_characteristic(mut self, characteristic: Characteristic) -> Self {
        self.characteristics.push(characteristic);
        self.refresh_script();
        self
    }

    pub fn refresh_script(&mut self) {
        self.script = script::to_script(self);
    }

    pub fn active_characteristics(&self) -> impl Iterator<Item = &Characteristic> {
        self.characteristics.iter().filter(|c| c.is_active)
    }

    pub fn characteristic_by_code(&self, code: &str) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.code == code)
    }

    pub fn characteristic_by_id(&self, id: &str) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.characteristic_id == id)
    }

    /// Position of a bin as (characteristic index, bin index).
    pub fn locate_bin(&self, bin_id: &str) -> Option<(usize, usize)> {
        self.characteristics.iter().enumerate().find_map(|(ci, c)| {
            c.bins
                .iter()
                .position(|b| b.bin_id == bin_id)
                .map(|bi| (ci, bi))
        })
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.name.trim().is_empty() || has_line_break(&self.name) {
            return Err(EngineError::validation("scorecard name must be non-empty and single-line"));
        }
        for (field, value) in [
            ("base_score", self.base_score),
            ("min_score", self.min_score),
            ("max_score", self.max_score),
        ] {
            if !value.is_finite() {
                return Err(EngineError::validation(format!("{field} must be a finite number")));
            }
        }
        if self.min_score >= self.max_score {
            return Err(EngineError::validation(format!(
                "min_score ({}) must be below max_score ({})",
                self.min_score, self.max_score
            )));
        }
        self.thresholds.validate()?;

        let mut codes = HashSet::new();
        let mut characteristic_ids = HashSet::new();
        let mut bin_ids = HashSet::new();
        for characteristic in &self.characteristics {
            characteristic.validate()?;
            if !codes.insert(characteristic.code.as_str()) {
                return Err(EngineError::validation(format!(
                    "duplicate characteristic code {}",
                    characteristic.code
                )));
            }
            if !characteristic_ids.insert(characteristic.characteristic_id.as_str()) {
                return Err(EngineError::validation(format!(
                    "duplicate characteristic id {}",
                    characteristic.characteristic_id
                )));
            }
            for bin in &characteristic.bins {
                if !bin_ids.insert(bin.bin_id.as_str()) {
                    return Err(EngineError::validation(format!("duplicate bin id {}", bin.bin_id)));
                }
            }
        }
        Ok(())
    }
}

pub fn is_valid_code(code: &str) -> bool {
    !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn is_valid_field(field: &str) -> bool {
    !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn has_line_break(s: &str) -> bool {
    s.contains('\n') || s.contains('\r')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn age() -> Characteristic {
        Characteristic::new("AGE", "Applicant Age", "age")
            .with_bin(Bin::range("18-24", Some(18.0), Some(25.0), -20.0))
            .with_bin(Bin::range("25-39", Some(25.0), Some(40.0), 10.0))
            .with_bin(Bin::range("40+", Some(40.0), None, 30.0))
    }

    #[test]
    fn adjacent_ranges_do_not_overlap() {
        assert!(age().validate().is_ok());
    }

    #[test]
    fn overlapping_ranges_rejected() {
        let c = age().with_bin(Bin::range("35-45", Some(35.0), Some(45.0), 5.0));
        let err = c.validate().unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }), "{err}");
    }

    #[test]
    fn two_open_lower_bounds_overlap() {
        let c = Characteristic::new("X", "X", "x")
            .with_bin(Bin::range("low", None, Some(10.0), 1.0))
            .with_bin(Bin::range("lower", None, Some(5.0), 2.0));
        assert!(c.validate().is_err());
    }

    #[test]
    fn gaps_are_legal() {
        let c = Characteristic::new("X", "X", "x")
            .with_bin(Bin::range("a", Some(0.0), Some(10.0), 1.0))
            .with_bin(Bin::range("b", Some(20.0), Some(30.0), 2.0));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn duplicate_category_rejected() {
        let c = Characteristic::new("HOME", "Home", "home")
            .with_bin(Bin::category("Owner", "own", 20.0))
            .with_bin(Bin::category("Owner again", "own", 10.0));
        assert!(c.validate().is_err());
    }

    #[test]
    fn mixed_bin_types_rejected() {
        let c = Characteristic::new("HOME", "Home", "home")
            .with_bin(Bin::category("Owner", "own", 20.0))
            .with_bin(Bin::range("any", None, None, 1.0));
        assert!(c.validate().is_err());
    }

    #[test]
    fn non_positive_weight_rejected() {
        assert!(age().with_weight(0.0).validate().is_err());
        assert!(age().with_weight(-1.5).validate().is_err());
    }

    #[test]
    fn inverted_thresholds_rejected() {
        assert!(Thresholds::new(320.0, 300.0, 280.0).validate().is_ok());
        assert!(Thresholds::new(320.0, 300.0, 301.0).validate().is_err());
        assert!(Thresholds::new(299.0, 300.0, 280.0).validate().is_err());
    }

    #[test]
    fn new_scorecard_is_empty_draft_at_version_one() {
        let s = Scorecard::new("Retail", 300.0, 0.0, 600.0).unwrap();
        assert_eq!(s.version, 1);
        assert_eq!(s.status, ScorecardStatus::Draft);
        assert!(s.characteristics.is_empty());
        assert_eq!(s.thresholds, Thresholds::new(600.0, 300.0, 0.0));
    }

    #[test]
    fn duplicate_codes_rejected() {
        let s = Scorecard::new("Retail", 300.0, 0.0, 600.0)
            .unwrap()
            .with_characteristic(age())
            .with_characteristic(age());
        assert!(s.validate().is_err());
    }
}
