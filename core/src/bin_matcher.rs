//! Bin matcher: resolves one attribute value to a bin.
//!
//! Missing and unmatched inputs are not errors. They come back as
//! distinct `BinMatch` states so the calculator can flag them in the
//! trace instead of treating them as ordinary zero-point bins.

use crate::model::{Bin, BinCondition, Characteristic};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinMatch<'a> {
    Matched(&'a Bin),
    /// Attribute absent or null.
    MissingInput,
    /// Attribute present but no bin accepts it.
    UnmatchedValue,
}

/// Trace-level match state, detached from the bin borrow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    MissingInput,
    UnmatchedValue,
}

impl MatchStatus {
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::Matched        => None,
            Self::MissingInput   => Some("missing input"),
            Self::UnmatchedValue => Some("unmatched value"),
        }
    }
}

impl<'a> BinMatch<'a> {
    pub fn status(&self) -> MatchStatus {
        match self {
            Self::Matched(_)     => MatchStatus::Matched,
            Self::MissingInput   => MatchStatus::MissingInput,
            Self::UnmatchedValue => MatchStatus::UnmatchedValue,
        }
    }

    pub fn bin(&self) -> Option<&'a Bin> {
        match *self {
            Self::Matched(bin) => Some(bin),
            _ => None,
        }
    }
}

/// Select the bin of `characteristic` that accepts `value`.
///
/// Numeric bins take the unique bin with `min <= x < max`. Categorical
/// bins compare the value's string form exactly. Overlaps are rejected
/// when the scorecard is saved, so the first hit is the only hit.
pub fn match_value<'a>(characteristic: &'a Characteristic, value: Option<&Value>) -> BinMatch<'a> {
    let value = match value {
        None | Some(Value::Null) => return BinMatch::MissingInput,
        Some(v) => v,
    };

    let number = as_number(value);
    let text = as_category(value);

    characteristic
        .bins
        .iter()
        .find(|bin| match &bin.condition {
            BinCondition::NumericRange { .. } => {
                number.is_some_and(|x| bin.lower() <= x && x < bin.upper())
            }
            BinCondition::Categorical { category_value } => {
                text.as_deref() == Some(category_value.as_str())
            }
        })
        .map_or(BinMatch::UnmatchedValue, BinMatch::Matched)
}

/// Numeric coercion: JSON numbers, and strings holding a finite number.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|x| x.is_finite()),
        _ => None,
    }
}

/// String form used for categorical matching.
pub fn as_category(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
