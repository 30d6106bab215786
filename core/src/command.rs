use crate::{
    audit::ChangeRequest,
    engine::ScorecardEngine,
    error::EngineResult,
    model::{Scorecard, ScorecardStatus, Thresholds},
    types::{ApplicantData, ScorecardId, Version},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every engine operation as a JSON command.
/// Variants may be added, never removed or renamed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum EngineCommand {
    // ── Scorecards ────────────────────────────────
    CreateScorecard {
        name:       String,
        base_score: f64,
        min_score:  f64,
        max_score:  f64,
    },
    ImportScorecard { scorecard: Box<Scorecard> },
    ListScorecards,
    GetScorecard {
        scorecard_id: ScorecardId,
        #[serde(default)]
        version:      Option<Version>,
    },
    GetScript { scorecard_id: ScorecardId },

    // ── Audited edits ─────────────────────────────
    PreviewScript {
        scorecard_id: ScorecardId,
        script:       String,
    },
    SaveScript {
        scorecard_id:      ScorecardId,
        script:            String,
        request:           ChangeRequest,
        #[serde(default)]
        confirm_deletions: bool,
    },
    EditBinPoints {
        scorecard_id: ScorecardId,
        bin_id:       String,
        new_points:   f64,
        request:      ChangeRequest,
    },
    ScaleWeight {
        scorecard_id:      ScorecardId,
        characteristic_id: String,
        multiplier:        f64,
        request:           ChangeRequest,
    },
    EditCutoffs {
        scorecard_id: ScorecardId,
        thresholds:   Thresholds,
        request:      ChangeRequest,
    },
    SetStatus {
        scorecard_id: ScorecardId,
        status:       ScorecardStatus,
        request:      ChangeRequest,
    },
    GetChangeLog { scorecard_id: ScorecardId },

    // ── Scoring ───────────────────────────────────
    LiveCalculate {
        scorecard_id:   ScorecardId,
        applicant_data: ApplicantData,
    },
    WhatIf {
        scorecard_id:   ScorecardId,
        application_id: String,
        modifications:  ApplicantData,
    },

    // ── Monitoring ────────────────────────────────
    GetPerformance { scorecard_id: ScorecardId },
    CapturePsiBaseline { scorecard_id: ScorecardId },
    GetAlerts { scorecard_id: ScorecardId },
    AcknowledgeAlert {
        alert_id: String,
        actor:    String,
    },
}

impl ScorecardEngine {
    /// Run one command and serialise its result.
    pub fn execute(&self, command: EngineCommand) -> EngineResult<Value> {
        let value = match command {
            EngineCommand::CreateScorecard {
                name,
                base_score,
                min_score,
                max_score,
            } => serde_json::to_value(self.create_scorecard(&name, base_score, min_score, max_score)?)?,
            EngineCommand::ImportScorecard { scorecard } => {
                serde_json::to_value(self.import_scorecard(*scorecard)?)?
            }
            EngineCommand::ListScorecards => serde_json::to_value(self.list_scorecards()?)?,
            EngineCommand::GetScorecard {
                scorecard_id,
                version: None,
            } => serde_json::to_value(self.get_scorecard(&scorecard_id)?)?,
            EngineCommand::GetScorecard {
                scorecard_id,
                version: Some(version),
            } => serde_json::to_value(self.get_scorecard_version(&scorecard_id, version)?)?,
            EngineCommand::GetScript { scorecard_id } => Value::String(self.get_script(&scorecard_id)?),
            EngineCommand::PreviewScript { scorecard_id, script } => {
                serde_json::to_value(self.preview_script(&scorecard_id, &script)?)?
            }
            EngineCommand::SaveScript {
                scorecard_id,
                script,
                request,
                confirm_deletions,
            } => serde_json::to_value(self.save_script(&scorecard_id, &script, &request, confirm_deletions)?)?,
            EngineCommand::EditBinPoints {
                scorecard_id,
                bin_id,
                new_points,
                request,
            } => serde_json::to_value(self.edit_bin_points(&scorecard_id, &bin_id, new_points, &request)?)?,
            EngineCommand::ScaleWeight {
                scorecard_id,
                characteristic_id,
                multiplier,
                request,
            } => serde_json::to_value(self.scale_weight(&scorecard_id, &characteristic_id, multiplier, &request)?)?,
            EngineCommand::EditCutoffs {
                scorecard_id,
                thresholds,
                request,
            } => serde_json::to_value(self.edit_cutoffs(&scorecard_id, thresholds, &request)?)?,
            EngineCommand::SetStatus {
                scorecard_id,
                status,
                request,
            } => serde_json::to_value(self.set_status(&scorecard_id, status, &request)?)?,
            EngineCommand::GetChangeLog { scorecard_id } => {
                serde_json::to_value(self.get_change_log(&scorecard_id)?)?
            }
            EngineCommand::LiveCalculate {
                scorecard_id,
                applicant_data,
            } => serde_json::to_value(self.live_calculate(&scorecard_id, &applicant_data)?)?,
            EngineCommand::WhatIf {
                scorecard_id,
                application_id,
                modifications,
            } => serde_json::to_value(self.what_if(&scorecard_id, &application_id, &modifications)?)?,
            EngineCommand::GetPerformance { scorecard_id } => {
                serde_json::to_value(self.get_performance(&scorecard_id)?)?
            }
            EngineCommand::CapturePsiBaseline { scorecard_id } => {
                serde_json::to_value(self.capture_psi_baseline(&scorecard_id)?)?
            }
            EngineCommand::GetAlerts { scorecard_id } => serde_json::to_value(self.get_alerts(&scorecard_id)?)?,
            EngineCommand::AcknowledgeAlert { alert_id, actor } => {
                serde_json::to_value(self.acknowledge_alert(&alert_id, &actor)?)?
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn commands_parse_from_tagged_json() {
        let cmd: EngineCommand = serde_json::from_value(json!({
            "cmd": "edit_bin_points",
            "scorecard_id": "sc",
            "bin_id": "b1",
            "new_points": 12.5,
            "request": {"actor": "ana", "justification": "recalibration", "expected_version": 3}
        }))
        .unwrap();
        match cmd {
            EngineCommand::EditBinPoints { new_points, request, .. } => {
                assert_eq!(new_points, 12.5);
                assert_eq!(request.expected_version, Some(3));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn execute_round_trips_through_json() {
        let engine = ScorecardEngine::in_memory().unwrap();
        let created = engine
            .execute(EngineCommand::CreateScorecard {
                name: "Retail".into(),
                base_score: 300.0,
                min_score: 200.0,
                max_score: 400.0,
            })
            .unwrap();
        let id = created["scorecard_id"].as_str().unwrap().to_string();
        let listed = engine.execute(EngineCommand::ListScorecards).unwrap();
        assert_eq!(listed[0]["scorecard_id"], json!(id));
        assert_eq!(listed[0]["status"], json!("draft"));
    }
}
