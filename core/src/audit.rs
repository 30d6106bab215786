//! Change auditor: the only way a scorecard changes after creation.
//!
//! Every entry point:
//!   1. requires a non-empty justification,
//!   2. rejects edits based on a stale version,
//!   3. applies the change to a copy and validates every model invariant,
//!   4. bumps the version and regenerates the cached script,
//!   5. emits exactly one change-log entry.
//!
//! Nothing here touches storage. The engine commits the returned
//! `AuditedChange` atomically or not at all.

use crate::{
    clock::Clock,
    error::{EngineError, EngineResult},
    model::{Scorecard, ScorecardStatus, Thresholds},
    script,
    types::{ScorecardId, Version},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    PointsEdit,
    WeightScale,
    CutoffEdit,
    ScriptEdit,
    StatusChange,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PointsEdit   => "points_edit",
            Self::WeightScale  => "weight_scale",
            Self::CutoffEdit   => "cutoff_edit",
            Self::ScriptEdit   => "script_edit",
            Self::StatusChange => "status_change",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "points_edit"   => Some(Self::PointsEdit),
            "weight_scale"  => Some(Self::WeightScale),
            "cutoff_edit"   => Some(Self::CutoffEdit),
            "script_edit"   => Some(Self::ScriptEdit),
            "status_change" => Some(Self::StatusChange),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit record. `id` is assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeLogEntry {
    pub id:            Option<i64>,
    pub scorecard_id:  ScorecardId,
    /// Version produced by this change.
    pub version:       Version,
    pub change_type:   ChangeType,
    pub field_path:    String,
    pub old_value:     String,
    pub new_value:     String,
    pub justification: String,
    pub actor:         String,
    pub changed_at:    DateTime<Utc>,
}

/// Who is changing what, why, and against which version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeRequest {
    pub actor:            String,
    pub justification:    String,
    #[serde(default)]
    pub expected_version: Option<Version>,
}

impl ChangeRequest {
    pub fn new(actor: &str, justification: &str) -> Self {
        Self {
            actor: actor.to_string(),
            justification: justification.to_string(),
            expected_version: None,
        }
    }

    pub fn at_version(mut self, version: Version) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// A validated next state plus its log entry, ready to commit.
#[derive(Debug, Clone)]
pub struct AuditedChange {
    pub previous_version: Version,
    pub scorecard:        Scorecard,
    pub entry:            ChangeLogEntry,
}

pub struct ChangeAuditor<'a> {
    clock: &'a dyn Clock,
}

impl<'a> ChangeAuditor<'a> {
    pub fn new(clock: &'a dyn Clock) -> Self {
        Self { clock }
    }

    pub fn edit_bin_points(
        &self,
        current: &Scorecard,
        bin_id: &str,
        new_points: f64,
        request: &ChangeRequest,
    ) -> EngineResult<AuditedChange> {
        self.preflight(current, request)?;
        let (ci, bi) = current
            .locate_bin(bin_id)
            .ok_or_else(|| EngineError::not_found("bin", bin_id))?;

        let mut next = current.clone();
        let characteristic = &mut next.characteristics[ci];
        let bin = &mut characteristic.bins[bi];
        let old = bin.points;
        if old == new_points {
            return Err(EngineError::validation(format!(
                "bin {} already scores {new_points} points",
                bin.label
            )));
        }
        bin.points = new_points;
        let field_path = format!("characteristics[{}].bins[{}].points", characteristic.code, bin.label);

        self.commit(
            current,
            next,
            request,
            ChangeType::PointsEdit,
            field_path,
            old.to_string(),
            new_points.to_string(),
        )
    }

    /// Set a characteristic's weight multiplier.
    pub fn scale_weight(
        &self,
        current: &Scorecard,
        characteristic_id: &str,
        multiplier: f64,
        request: &ChangeRequest,
    ) -> EngineResult<AuditedChange> {
        self.preflight(current, request)?;
        let ci = current
            .characteristics
            .iter()
            .position(|c| c.characteristic_id == characteristic_id)
            .ok_or_else(|| EngineError::not_found("characteristic", characteristic_id))?;

        let mut next = current.clone();
        let characteristic = &mut next.characteristics[ci];
        let old = characteristic.weight_multiplier;
        if old == multiplier {
            return Err(EngineError::validation(format!(
                "{} already has weight {multiplier}",
                characteristic.code
            )));
        }
        characteristic.weight_multiplier = multiplier;
        let field_path = format!("characteristics[{}].weight_multiplier", characteristic.code);

        self.commit(
            current,
            next,
            request,
            ChangeType::WeightScale,
            field_path,
            old.to_string(),
            multiplier.to_string(),
        )
    }

    pub fn edit_cutoffs(
        &self,
        current: &Scorecard,
        thresholds: Thresholds,
        request: &ChangeRequest,
    ) -> EngineResult<AuditedChange> {
        self.preflight(current, request)?;
        if current.thresholds == thresholds {
            return Err(EngineError::validation("thresholds are unchanged"));
        }
        let mut next = current.clone();
        next.thresholds = thresholds;

        self.commit(
            current,
            next,
            request,
            ChangeType::CutoffEdit,
            "thresholds".to_string(),
            current.thresholds.to_string(),
            thresholds.to_string(),
        )
    }

    pub fn apply_script_edit(
        &self,
        current: &Scorecard,
        text: &str,
        confirm_deletions: bool,
        request: &ChangeRequest,
    ) -> EngineResult<AuditedChange> {
        self.preflight(current, request)?;
        let patch = script::from_script(text)?;
        let diff = patch.diff(current);
        if diff.is_empty() {
            return Err(EngineError::validation("script contains no changes"));
        }
        let next = patch.apply(current, confirm_deletions)?;
        log::debug!("scorecard={} script edit: {}", current.scorecard_id, diff.summary());

        let mut change = self.commit(
            current,
            next,
            request,
            ChangeType::ScriptEdit,
            "script".to_string(),
            current.script.clone(),
            String::new(),
        )?;
        change.entry.new_value = change.scorecard.script.clone();
        Ok(change)
    }

    /// Retired is terminal. Going live needs at least one active characteristic.
    pub fn set_status(
        &self,
        current: &Scorecard,
        status: ScorecardStatus,
        request: &ChangeRequest,
    ) -> EngineResult<AuditedChange> {
        self.preflight(current, request)?;
        if current.status == status {
            return Err(EngineError::validation(format!("scorecard is already {status}")));
        }
        if current.status == ScorecardStatus::Retired {
            return Err(EngineError::validation("a retired scorecard cannot change status"));
        }
        if status.is_live() && current.active_characteristics().next().is_none() {
            return Err(EngineError::validation(format!(
                "cannot move to {status} without an active characteristic"
            )));
        }
        let mut next = current.clone();
        next.status = status;

        self.commit(
            current,
            next,
            request,
            ChangeType::StatusChange,
            "status".to_string(),
            current.status.to_string(),
            status.to_string(),
        )
    }

    fn preflight(&self, current: &Scorecard, request: &ChangeRequest) -> EngineResult<()> {
        if request.justification.trim().is_empty() {
            return Err(EngineError::validation("a justification is required for every change"));
        }
        if request.actor.trim().is_empty() {
            return Err(EngineError::validation("an actor is required for every change"));
        }
        match request.expected_version {
            Some(expected) if expected != current.version => Err(EngineError::StaleVersion {
                expected,
                actual: current.version,
            }),
            _ => Ok(()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn commit(
        &self,
        current: &Scorecard,
        mut next: Scorecard,
        request: &ChangeRequest,
        change_type: ChangeType,
        field_path: String,
        old_value: String,
        new_value: String,
    ) -> EngineResult<AuditedChange> {
        next.validate()?;
        next.version = current.version + 1;
        next.refresh_script();

        let entry = ChangeLogEntry {
            id: None,
            scorecard_id: next.scorecard_id.clone(),
            version: next.version,
            change_type,
            field_path,
            old_value,
            new_value,
            justification: request.justification.trim().to_string(),
            actor: request.actor.clone(),
            changed_at: self.clock.now(),
        };

        Ok(AuditedChange {
            previous_version: current.version,
            scorecard: next,
            entry,
        })
    }
}
