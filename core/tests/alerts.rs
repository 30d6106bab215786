//! Alert episodes across a sequence of performance snapshots.

mod common;

use common::{age_scorecard, engine_with};
use scorecard_core::{
    alerts::{AlertRule, Comparison, Metric, Severity},
    config::EngineConfig,
    error::EngineError,
    population::SyntheticPopulation,
    provider::InMemoryOutcomes,
};
use std::sync::Arc;

fn psi_only_config() -> EngineConfig {
    EngineConfig {
        alert_rules: vec![
            AlertRule::new("psi_critical", Metric::Psi, Comparison::Gt, 0.25, Severity::Critical),
            AlertRule::new("psi_drift", Metric::Psi, Comparison::Gt, 0.25, Severity::Warning).for_periods(2),
        ],
        ..EngineConfig::default_test()
    }
}

/// stable → drift → drift → stable → drift.
/// Each rule fires once per episode; recovery closes the episode but
/// never resolves or deletes the alert.
#[test]
fn alerts_fire_once_per_episode() {
    let outcomes = Arc::new(InMemoryOutcomes::new());
    let engine = engine_with(psi_only_config()).with_outcomes(outcomes.clone());
    let sc = engine.import_scorecard(age_scorecard()).expect("import");
    let id = sc.scorecard_id.clone();
    let stable = SyntheticPopulation::new(21, 2_000, sc.min_score, sc.max_score);
    let drifted = stable.clone().with_shift(-100.0);

    outcomes.replace(&id, stable.iter().collect());
    engine.capture_psi_baseline(&id).expect("baseline");

    let mut fired_per_period = Vec::new();
    for population in [&stable, &drifted, &drifted, &stable, &drifted] {
        outcomes.replace(&id, population.iter().collect());
        let report = engine.get_performance(&id).expect("performance");
        let mut rules: Vec<String> = report.fired_alerts.iter().map(|a| a.rule_id.clone()).collect();
        rules.sort();
        fired_per_period.push(rules);
    }

    assert_eq!(
        fired_per_period,
        vec![
            vec![],
            vec!["psi_critical".to_string()],
            vec!["psi_drift".to_string()],
            vec![],
            vec!["psi_critical".to_string()],
        ]
    );

    let alerts = engine.get_alerts(&id).expect("alerts");
    assert_eq!(alerts.len(), 3);
    let open: Vec<&str> = alerts
        .iter()
        .filter(|a| a.episode_open)
        .map(|a| a.rule_id.as_str())
        .collect();
    assert_eq!(open, vec!["psi_critical"], "only the latest episode is open");
    assert!(alerts.iter().all(|a| a.severity >= Severity::Warning));
    assert!(alerts.iter().all(|a| a.observed_value > 0.25));
}

#[test]
fn acknowledging_records_actor_once() {
    let outcomes = Arc::new(InMemoryOutcomes::new());
    let engine = engine_with(psi_only_config()).with_outcomes(outcomes.clone());
    let sc = engine.import_scorecard(age_scorecard()).expect("import");
    let id = sc.scorecard_id.clone();
    let stable = SyntheticPopulation::new(3, 1_000, sc.min_score, sc.max_score);

    outcomes.replace(&id, stable.iter().collect());
    engine.capture_psi_baseline(&id).expect("baseline");
    outcomes.replace(&id, stable.clone().with_shift(-100.0).iter().collect());
    let report = engine.get_performance(&id).expect("performance");
    let alert = report.fired_alerts.first().expect("critical alert");

    let err = engine.acknowledge_alert(&alert.alert_id, "  ").expect_err("blank actor");
    assert!(matches!(err, EngineError::Validation { .. }));

    let acked = engine.acknowledge_alert(&alert.alert_id, "model-risk").expect("ack");
    assert_eq!(acked.acknowledged_by.as_deref(), Some("model-risk"));
    assert!(acked.is_acknowledged());
    assert!(acked.episode_open, "acknowledging does not close the episode");

    assert!(engine.acknowledge_alert(&alert.alert_id, "someone-else").is_err());
    assert!(matches!(
        engine.acknowledge_alert("no-such-alert", "model-risk"),
        Err(EngineError::NotFound { entity: "alert", .. })
    ));
}

#[test]
fn alerts_for_unknown_scorecard_are_not_found() {
    let engine = engine_with(psi_only_config());
    assert!(matches!(
        engine.get_alerts("nope"),
        Err(EngineError::NotFound { entity: "scorecard", .. })
    ));
}
