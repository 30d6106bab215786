//! Shared fixtures for the integration suite.
#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use scorecard_core::{
    audit::ChangeRequest,
    clock::FixedClock,
    config::EngineConfig,
    engine::ScorecardEngine,
    model::{Bin, Characteristic, Scorecard, Thresholds},
    store::ScorecardStore,
    types::ApplicantData,
};
use serde_json::Value;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn clock() -> FixedClock {
    FixedClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap())
}

pub fn engine() -> ScorecardEngine {
    engine_with(EngineConfig::default_test())
}

pub fn engine_with(config: EngineConfig) -> ScorecardEngine {
    init_logging();
    let store = ScorecardStore::in_memory().expect("in-memory store");
    ScorecardEngine::new(store, config)
        .expect("engine")
        .with_clock(clock())
}

/// Base 300, AGE bins [18,25) -20, [25,40) +10, [40,inf) +30,
/// thresholds 320 / 300 / 280 over a 200..400 range.
pub fn age_scorecard() -> Scorecard {
    Scorecard::new("Age Only", 300.0, 200.0, 400.0)
        .expect("valid scorecard")
        .with_thresholds(Thresholds::new(320.0, 300.0, 280.0))
        .with_characteristic(
            Characteristic::new("AGE", "Applicant Age", "age")
                .with_bin(Bin::range("18-24", Some(18.0), Some(25.0), -20.0))
                .with_bin(Bin::range("25-39", Some(25.0), Some(40.0), 10.0))
                .with_bin(Bin::range("40+", Some(40.0), None, 30.0)),
        )
}

/// Age plus income and home ownership.
pub fn retail_scorecard() -> Scorecard {
    age_scorecard()
        .with_characteristic(
            Characteristic::new("INCOME", "Annual Income", "income")
                .with_bin(Bin::range("<25k", None, Some(25_000.0), -35.0))
                .with_bin(Bin::range("25k-60k", Some(25_000.0), Some(60_000.0), 5.0))
                .with_bin(Bin::range("60k+", Some(60_000.0), None, 40.0)),
        )
        .with_characteristic(
            Characteristic::new("HOME", "Home Ownership", "home")
                .with_bin(Bin::category("Owner", "own", 25.0))
                .with_bin(Bin::category("Renter", "rent", -5.0)),
        )
}

pub fn applicant(fields: &[(&str, Value)]) -> ApplicantData {
    fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn request(justification: &str) -> ChangeRequest {
    ChangeRequest::new("risk-analyst", justification)
}
