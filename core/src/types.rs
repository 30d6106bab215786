//! Shared primitive types used across the entire engine.

use std::collections::BTreeMap;

/// Stable identifier of a scorecard (uuid v4 string).
pub type ScorecardId = String;

/// Stable identifier of a characteristic within a scorecard.
pub type CharacteristicId = String;

/// Stable identifier of a bin within a characteristic.
pub type BinId = String;

/// Identifier of an application held by the applicant-data provider.
pub type ApplicationId = String;

/// Scorecard version. Starts at 1, incremented by every audited change.
pub type Version = u32;

/// Applicant attribute values keyed by data field.
/// A BTreeMap keeps iteration order stable for deterministic output.
pub type ApplicantData = BTreeMap<String, serde_json::Value>;
