//! Script editing through the engine: round trip, additions, deletions,
//! and rejection of scripts that would break the model.

mod common;

use common::{engine, request, retail_scorecard};
use scorecard_core::{
    audit::ChangeType,
    error::EngineError,
    script::{from_script, to_script},
};

#[test]
fn generated_script_round_trips() {
    let model = retail_scorecard();
    let patch = from_script(&to_script(&model)).expect("parse");
    assert!(patch.diff(&model).is_empty());
    assert_eq!(patch.apply(&model, false).expect("apply"), model);
}

#[test]
fn saving_an_unchanged_script_is_rejected() {
    let engine = engine();
    let sc = engine.import_scorecard(retail_scorecard()).expect("import");
    let script = engine.get_script(&sc.scorecard_id).expect("script");

    let err = engine
        .save_script(&sc.scorecard_id, &script, &request("no-op"), false)
        .expect_err("no changes");
    assert!(matches!(err, EngineError::Validation { .. }), "{err}");
}

#[test]
fn points_edit_in_script_keeps_identity() {
    let engine = engine();
    let sc = engine.import_scorecard(retail_scorecard()).expect("import");
    let script = engine
        .get_script(&sc.scorecard_id)
        .expect("script")
        .replace("points += 10  # 25-39", "points += 15  # 25-39");

    let diff = engine.preview_script(&sc.scorecard_id, &script).expect("preview");
    assert_eq!(diff.changed.len(), 1);
    assert_eq!(diff.changed[0].code, "AGE");
    assert_eq!(diff.changed[0].bins_changed, vec!["25-39"]);
    assert_eq!(engine.get_scorecard(&sc.scorecard_id).unwrap().version, 1, "preview never mutates");

    let saved = engine
        .save_script(&sc.scorecard_id, &script, &request("script recalibration"), false)
        .expect("save");
    assert_eq!(saved.version, 2);
    let before = &sc.characteristics[0].bins[1];
    let after = &saved.characteristics[0].bins[1];
    assert_eq!(after.bin_id, before.bin_id);
    assert_eq!(after.points, 15.0);
    assert_eq!(saved.script, script);

    let log = engine.get_change_log(&sc.scorecard_id).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].change_type, ChangeType::ScriptEdit);
    assert_eq!(log[0].old_value, sc.script);
    assert_eq!(log[0].new_value, saved.script);
}

#[test]
fn new_block_is_an_addition() {
    let engine = engine();
    let sc = engine.import_scorecard(retail_scorecard()).expect("import");
    let mut script = engine.get_script(&sc.scorecard_id).expect("script");
    script.push_str(
        "\n# Characteristic: DTI - Debt To Income (field: dti)\n# weight: 1\n\
         if dti < 0.3:\n    points += 20  # low\nelif dti >= 0.3:\n    points += -15  # high\n",
    );

    let diff = engine.preview_script(&sc.scorecard_id, &script).expect("preview");
    assert_eq!(diff.added, vec!["DTI"]);

    let saved = engine
        .save_script(&sc.scorecard_id, &script, &request("add DTI"), false)
        .expect("save");
    let dti = saved.characteristic_by_code("DTI").expect("DTI");
    assert_eq!(dti.data_field, "dti");
    assert_eq!(dti.bins.len(), 2);
    assert!(saved.characteristics[..3]
        .iter()
        .zip(&sc.characteristics)
        .all(|(a, b)| a.characteristic_id == b.characteristic_id));
}

#[test]
fn deleting_a_block_needs_confirmation() {
    let engine = engine();
    let sc = engine.import_scorecard(retail_scorecard()).expect("import");
    let script = to_script(&{
        let mut trimmed = sc.clone();
        trimmed.characteristics.retain(|c| c.code != "HOME");
        trimmed
    });

    let diff = engine.preview_script(&sc.scorecard_id, &script).expect("preview");
    assert_eq!(diff.removed, vec!["HOME"]);

    let err = engine
        .save_script(&sc.scorecard_id, &script, &request("drop HOME"), false)
        .expect_err("unconfirmed deletion");
    assert!(matches!(err, EngineError::Validation { .. }), "{err}");
    assert_eq!(engine.get_scorecard(&sc.scorecard_id).unwrap().characteristics.len(), 3);

    let saved = engine
        .save_script(&sc.scorecard_id, &script, &request("drop HOME"), true)
        .expect("confirmed deletion");
    assert!(saved.characteristic_by_code("HOME").is_none());
}

/// A script that makes AGE bins overlap fails model validation.
#[test]
fn overlapping_bins_cannot_be_saved() {
    let engine = engine();
    let sc = engine.import_scorecard(retail_scorecard()).expect("import");
    let script = engine
        .get_script(&sc.scorecard_id)
        .expect("script")
        .replace("elif age >= 25 and age < 40:", "elif age >= 20 and age < 40:");

    let err = engine
        .save_script(&sc.scorecard_id, &script, &request("widen"), false)
        .expect_err("overlap");
    assert!(matches!(err, EngineError::Validation { .. }), "{err}");
    assert_eq!(engine.get_scorecard(&sc.scorecard_id).unwrap(), sc);
}

#[test]
fn unparseable_script_reports_line_and_changes_nothing() {
    let engine = engine();
    let sc = engine.import_scorecard(retail_scorecard()).expect("import");
    let mut script = engine.get_script(&sc.scorecard_id).expect("script");
    let bad_line = script.lines().count() + 1;
    script.push_str("__import__('os').system('true')\n");

    let err = engine
        .save_script(&sc.scorecard_id, &script, &request("inject"), false)
        .expect_err("parse error");
    match err {
        EngineError::Parse { line, .. } => assert_eq!(line, bad_line),
        other => panic!("expected parse error, got {other}"),
    }
    assert!(engine.get_change_log(&sc.scorecard_id).unwrap().is_empty());
}
