//! Live scoring through the engine: totals, traces, decisions and
//! reason codes.

mod common;

use common::{age_scorecard, applicant, engine, retail_scorecard};
use scorecard_core::{
    bin_matcher::MatchStatus,
    calculator::{self, ScoreCalculator},
    decision::Decision,
    model::{Bin, Characteristic},
};
use serde_json::json;

/// Base 300 + AGE 30 in [25,40) → 310, manual review at 320/300/280.
#[test]
fn age_thirty_scores_310_and_goes_to_review() {
    let engine = engine();
    let sc = engine.import_scorecard(age_scorecard()).expect("import");

    let result = engine
        .live_calculate(&sc.scorecard_id, &applicant(&[("age", json!(30))]))
        .expect("score");

    assert_eq!(result.total_score, 310.0);
    assert_eq!(result.decision, Decision::ManualReview);
    let age = result.line("AGE").expect("AGE line");
    assert_eq!(age.bin_label.as_deref(), Some("25-39"));
    assert_eq!(age.weighted_points, 10.0);
    assert_eq!(age.status, MatchStatus::Matched);
    assert!(result.unscored.is_empty());
}

/// Thresholds are inclusive at both ends.
#[test]
fn threshold_boundaries() {
    let sc = age_scorecard()
        .with_characteristic(
            Characteristic::new("ADJ", "Adjustment", "adj")
                .with_bin(Bin::range("any", None, None, 0.0)),
        );
    let calc = ScoreCalculator::default();

    // 300 + 30 - 10 = 320 → approve
    let mut sc_hi = sc.clone();
    sc_hi.characteristics[1].bins[0].points = -10.0;
    let r = calc.calculate(&sc_hi, &applicant(&[("age", json!(45)), ("adj", json!(1))]));
    assert_eq!(r.total_score, 320.0);
    assert_eq!(r.decision, Decision::Approve);

    // 300 - 20 + 0 = 280 → decline
    let r = calc.calculate(&sc, &applicant(&[("age", json!(20)), ("adj", json!(1))]));
    assert_eq!(r.total_score, 280.0);
    assert_eq!(r.decision, Decision::Decline);
}

#[test]
fn calculate_is_deterministic() {
    let sc = retail_scorecard();
    let data = applicant(&[("age", json!(33)), ("income", json!("41000")), ("home", json!("rent"))]);
    let first = calculator::calculate(&sc, &data);
    for _ in 0..20 {
        assert_eq!(calculator::calculate(&sc, &data), first);
    }
}

/// Missing and unmatched inputs score zero and are flagged, never errors.
#[test]
fn missing_and_unmatched_inputs_are_flagged() {
    let sc = retail_scorecard();
    let result = calculator::calculate(
        &sc,
        &applicant(&[("age", json!(16)), ("home", json!("caravan"))]),
    );

    assert_eq!(result.total_score, 300.0, "only the base score remains");
    assert_eq!(result.line("AGE").unwrap().status, MatchStatus::UnmatchedValue);
    assert_eq!(result.line("INCOME").unwrap().status, MatchStatus::MissingInput);
    assert_eq!(result.line("HOME").unwrap().status, MatchStatus::UnmatchedValue);
    assert_eq!(result.unscored, vec!["AGE", "INCOME", "HOME"]);
    assert!(result.reason_codes.is_empty(), "zero contributions are not reasons");
}

#[test]
fn weight_multiplier_scales_points() {
    let mut sc = age_scorecard();
    sc.characteristics[0].weight_multiplier = 1.5;
    let result = calculator::calculate(&sc, &applicant(&[("age", json!(50))]));
    assert_eq!(result.total_score, 345.0);
    assert_eq!(result.line("AGE").unwrap().points, 30.0);
    assert_eq!(result.line("AGE").unwrap().weighted_points, 45.0);
}

#[test]
fn inactive_characteristics_do_not_score() {
    let mut sc = retail_scorecard();
    sc.characteristics[1].is_active = false;
    let result = calculator::calculate(
        &sc,
        &applicant(&[("age", json!(30)), ("income", json!(10_000)), ("home", json!("own"))]),
    );
    assert!(result.line("INCOME").is_none());
    assert_eq!(result.total_score, 335.0);
}

/// Reason codes follow the most negative contributions first.
#[test]
fn reason_codes_and_factors() {
    let sc = retail_scorecard();
    let result = calculator::calculate(
        &sc,
        &applicant(&[("age", json!(20)), ("income", json!(12_000)), ("home", json!("rent"))]),
    );

    assert_eq!(result.total_score, 300.0 - 20.0 - 35.0 - 5.0);
    assert_eq!(result.decision, Decision::Decline);
    assert_eq!(result.reason_codes, vec!["RC_INCOME", "RC_AGE", "RC_HOME"]);
    assert!(result.top_positive_factors.is_empty());

    let limited = ScoreCalculator::new(1).calculate(
        &sc,
        &applicant(&[("age", json!(20)), ("income", json!(12_000)), ("home", json!("rent"))]),
    );
    assert_eq!(limited.reason_codes, vec!["RC_INCOME"]);
}

#[test]
fn unknown_scorecard_is_not_found() {
    let engine = engine();
    let err = engine
        .live_calculate("missing", &applicant(&[]))
        .expect_err("no such scorecard");
    assert!(err.to_string().contains("not found"), "{err}");
}
