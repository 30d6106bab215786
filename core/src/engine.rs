//! The scorecard engine: the single entry point for every operation.
//!
//! RULES:
//!   - Scoring, decisions and what-if work on a loaded copy of the
//!     scorecard and never take the edit lock.
//!   - Every mutation goes through the change auditor under the
//!     scorecard's edit lock: load → validate → commit. Different
//!     scorecards never contend on it.
//!   - The store commit re-checks the version, so a write that slipped
//!     past the lock still cannot overwrite a newer version.
//!   - Edit locks exist only for known scorecards and only while an
//!     edit holds or waits on them.
//!   - Performance analysis streams outcomes without holding the store.
//!
//! Lock order: edit lock, then store.

use crate::{
    alerts::{self, AlertItem},
    audit::{AuditedChange, ChangeAuditor, ChangeLogEntry, ChangeRequest},
    calculator::{ScoreCalculator, ScoringResult},
    clock::{Clock, SystemClock},
    config::EngineConfig,
    error::{EngineError, EngineResult},
    model::{Scorecard, ScorecardStatus, Thresholds},
    performance::{AnalysisControl, CancelToken, PerformanceAnalyzer, PerformanceSnapshot, PsiBaseline},
    provider::{ApplicationProvider, InMemoryApplications, InMemoryOutcomes, OutcomeProvider},
    script::{self, ScriptDiff},
    store::{ScorecardStore, ScorecardSummary},
    types::{ApplicantData, ScorecardId, Version},
    what_if::{WhatIfResult, WhatIfSimulator},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceReport {
    pub snapshot:     PerformanceSnapshot,
    /// All snapshots for the scorecard, oldest first, ending with `snapshot`.
    pub history:      Vec<PerformanceSnapshot>,
    /// Alerts fired by this computation.
    pub fired_alerts: Vec<AlertItem>,
}

/// A performance analysis running on its own thread.
pub struct PerformanceJob {
    cancel: CancelToken,
    handle: JoinHandle<EngineResult<PerformanceReport>>,
}

impl PerformanceJob {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn join(self) -> EngineResult<PerformanceReport> {
        self.handle
            .join()
            .map_err(|_| EngineError::Other(anyhow::anyhow!("performance analysis thread panicked")))?
    }
}

pub struct ScorecardEngine {
    store:        Mutex<ScorecardStore>,
    edit_locks:   Mutex<HashMap<ScorecardId, Arc<Mutex<()>>>>,
    clock:        Box<dyn Clock>,
    config:       EngineConfig,
    applications: Arc<dyn ApplicationProvider>,
    outcomes:     Arc<dyn OutcomeProvider>,
}

impl ScorecardEngine {
    /// Migrates `store` and wires empty in-memory providers.
    pub fn new(store: ScorecardStore, config: EngineConfig) -> EngineResult<Self> {
        store.migrate()?;
        Ok(Self {
            store: Mutex::new(store),
            edit_locks: Mutex::new(HashMap::new()),
            clock: Box::new(SystemClock),
            config,
            applications: Arc::new(InMemoryApplications::new()),
            outcomes: Arc::new(InMemoryOutcomes::new()),
        })
    }

    /// In-memory store with test configuration.
    pub fn in_memory() -> EngineResult<Self> {
        Self::new(ScorecardStore::in_memory()?, EngineConfig::default_test())
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_applications(mut self, applications: Arc<dyn ApplicationProvider>) -> Self {
        self.applications = applications;
        self
    }

    pub fn with_outcomes(mut self, outcomes: Arc<dyn OutcomeProvider>) -> Self {
        self.outcomes = outcomes;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn calculator(&self) -> ScoreCalculator {
        ScoreCalculator::new(self.config.top_factors)
    }

    fn edit_lock(&self, scorecard_id: &str) -> Arc<Mutex<()>> {
        self.edit_locks
            .lock()
            .entry(scorecard_id.to_string())
            .or_default()
            .clone()
    }

    /// Drops the map entry once no other editor holds or waits on it.
    fn release_edit_lock(&self, scorecard_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.edit_locks.lock();
        drop(lock);
        if locks.get(scorecard_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(scorecard_id);
        }
    }

    // ── Scorecards ─────────────────────────────────────────────

    /// Empty draft at version 1 with thresholds spanning the range.
    pub fn create_scorecard(
        &self,
        name: &str,
        base_score: f64,
        min_score: f64,
        max_score: f64,
    ) -> EngineResult<Scorecard> {
        let scorecard = Scorecard::new(name, base_score, min_score, max_score)?;
        self.store.lock().insert_scorecard(&scorecard, self.clock.now())?;
        log::info!("scorecard={} created '{}' v1", scorecard.scorecard_id, scorecard.name);
        Ok(scorecard)
    }

    /// Register a fully built scorecard as a new draft at version 1.
    pub fn import_scorecard(&self, mut scorecard: Scorecard) -> EngineResult<Scorecard> {
        scorecard.version = 1;
        scorecard.status = ScorecardStatus::Draft;
        scorecard.validate()?;
        scorecard.refresh_script();
        self.store.lock().insert_scorecard(&scorecard, self.clock.now())?;
        log::info!(
            "scorecard={} imported '{}' with {} characteristics",
            scorecard.scorecard_id,
            scorecard.name,
            scorecard.characteristics.len()
        );
        Ok(scorecard)
    }

    pub fn get_scorecard(&self, scorecard_id: &str) -> EngineResult<Scorecard> {
        self.store.lock().load_scorecard(scorecard_id)
    }

    pub fn get_scorecard_version(&self, scorecard_id: &str, version: Version) -> EngineResult<Scorecard> {
        self.store.lock().load_scorecard_version(scorecard_id, version)
    }

    pub fn list_scorecards(&self) -> EngineResult<Vec<ScorecardSummary>> {
        self.store.lock().list_scorecards()
    }

    pub fn get_script(&self, scorecard_id: &str) -> EngineResult<String> {
        Ok(self.get_scorecard(scorecard_id)?.script)
    }

    // ── Audited edits ──────────────────────────────────────────

    pub fn preview_script(&self, scorecard_id: &str, text: &str) -> EngineResult<ScriptDiff> {
        let current = self.get_scorecard(scorecard_id)?;
        Ok(script::from_script(text)?.diff(&current))
    }

    pub fn save_script(
        &self,
        scorecard_id: &str,
        text: &str,
        request: &ChangeRequest,
        confirm_deletions: bool,
    ) -> EngineResult<Scorecard> {
        self.apply_change(scorecard_id, |auditor, current| {
            auditor.apply_script_edit(current, text, confirm_deletions, request)
        })
    }

    pub fn edit_bin_points(
        &self,
        scorecard_id: &str,
        bin_id: &str,
        new_points: f64,
        request: &ChangeRequest,
    ) -> EngineResult<Scorecard> {
        self.apply_change(scorecard_id, |auditor, current| {
            auditor.edit_bin_points(current, bin_id, new_points, request)
        })
    }

    pub fn scale_weight(
        &self,
        scorecard_id: &str,
        characteristic_id: &str,
        multiplier: f64,
        request: &ChangeRequest,
    ) -> EngineResult<Scorecard> {
        self.apply_change(scorecard_id, |auditor, current| {
            auditor.scale_weight(current, characteristic_id, multiplier, request)
        })
    }

    pub fn edit_cutoffs(
        &self,
        scorecard_id: &str,
        thresholds: Thresholds,
        request: &ChangeRequest,
    ) -> EngineResult<Scorecard> {
        self.apply_change(scorecard_id, |auditor, current| {
            auditor.edit_cutoffs(current, thresholds, request)
        })
    }

    pub fn set_status(
        &self,
        scorecard_id: &str,
        status: ScorecardStatus,
        request: &ChangeRequest,
    ) -> EngineResult<Scorecard> {
        self.apply_change(scorecard_id, |auditor, current| {
            auditor.set_status(current, status, request)
        })
    }

    fn apply_change<F>(&self, scorecard_id: &str, edit: F) -> EngineResult<Scorecard>
    where
        F: FnOnce(&ChangeAuditor<'_>, &Scorecard) -> EngineResult<AuditedChange>,
    {
        // Unknown ids never reach the lock map.
        self.store.lock().load_scorecard(scorecard_id)?;

        let lock = self.edit_lock(scorecard_id);
        let result = {
            let _guard = lock.lock();
            self.commit_edit(scorecard_id, edit)
        };
        self.release_edit_lock(scorecard_id, lock);
        result
    }

    fn commit_edit<F>(&self, scorecard_id: &str, edit: F) -> EngineResult<Scorecard>
    where
        F: FnOnce(&ChangeAuditor<'_>, &Scorecard) -> EngineResult<AuditedChange>,
    {
        let current = self.store.lock().load_scorecard(scorecard_id)?;
        let auditor = ChangeAuditor::new(self.clock.as_ref());
        let change = edit(&auditor, &current).inspect_err(|e| {
            log::warn!("scorecard={scorecard_id} v{} change rejected: {e}", current.version);
        })?;
        self.store.lock().commit_change(&change)?;

        log::info!(
            "scorecard={} v{} -> v{} {} {} by {}",
            scorecard_id,
            change.previous_version,
            change.scorecard.version,
            change.entry.change_type,
            change.entry.field_path,
            change.entry.actor,
        );
        Ok(change.scorecard)
    }

    pub fn get_change_log(&self, scorecard_id: &str) -> EngineResult<Vec<ChangeLogEntry>> {
        let store = self.store.lock();
        store.load_scorecard(scorecard_id)?;
        store.change_log(scorecard_id)
    }

    // ── Scoring ────────────────────────────────────────────────

    pub fn live_calculate(&self, scorecard_id: &str, applicant_data: &ApplicantData) -> EngineResult<ScoringResult> {
        let scorecard = self.get_scorecard(scorecard_id)?;
        Ok(self.calculator().calculate(&scorecard, applicant_data))
    }

    pub fn what_if(
        &self,
        scorecard_id: &str,
        application_id: &str,
        modifications: &ApplicantData,
    ) -> EngineResult<WhatIfResult> {
        let scorecard = self.get_scorecard(scorecard_id)?;
        let baseline = self.applications.application_values(application_id)?;
        Ok(WhatIfSimulator::new(self.calculator()).simulate(&scorecard, &baseline, modifications))
    }

    // ── Performance ────────────────────────────────────────────

    fn analysis_control(&self) -> AnalysisControl {
        let control = AnalysisControl::new();
        match self.config.performance.analysis_timeout_ms {
            0 => control,
            ms => control.with_timeout(Duration::from_millis(ms)),
        }
    }

    fn analyzer(&self) -> PerformanceAnalyzer {
        PerformanceAnalyzer::new(self.config.performance.clone())
    }

    pub fn get_performance(&self, scorecard_id: &str) -> EngineResult<PerformanceReport> {
        self.analyze_performance(scorecard_id, &self.analysis_control())
    }

    /// Compute a snapshot, store it, and evaluate alert rules over the
    /// snapshot history.
    pub fn analyze_performance(
        &self,
        scorecard_id: &str,
        control: &AnalysisControl,
    ) -> EngineResult<PerformanceReport> {
        let (scorecard, baseline) = {
            let store = self.store.lock();
            (store.load_scorecard(scorecard_id)?, store.psi_baseline(scorecard_id)?)
        };
        let outcomes = self.outcomes.outcomes(scorecard_id)?;
        let snapshot = self
            .analyzer()
            .analyze(&scorecard, outcomes, baseline.as_ref(), control, self.clock.now())?;

        let mut store = self.store.lock();
        let mut history = store.snapshots(scorecard_id)?;
        history.push(snapshot.clone());
        let open_rules = store.open_alert_rules(scorecard_id)?;
        let evaluation = alerts::evaluate(
            &self.config.alert_rules,
            scorecard_id,
            &history,
            &open_rules,
            self.clock.now(),
        );
        store.record_performance(&snapshot, &evaluation)?;

        Ok(PerformanceReport {
            snapshot,
            history,
            fired_alerts: evaluation.fired,
        })
    }

    /// Run `analyze_performance` on a background thread.
    pub fn spawn_performance(self: &Arc<Self>, scorecard_id: &str) -> PerformanceJob {
        let control = self.analysis_control();
        let cancel = control.token();
        let engine = Arc::clone(self);
        let scorecard_id = scorecard_id.to_string();
        let handle = std::thread::spawn(move || engine.analyze_performance(&scorecard_id, &control));
        PerformanceJob { cancel, handle }
    }

    /// Store the current band distribution as the PSI reference.
    pub fn capture_psi_baseline(&self, scorecard_id: &str) -> EngineResult<PsiBaseline> {
        let scorecard = self.get_scorecard(scorecard_id)?;
        let outcomes = self.outcomes.outcomes(scorecard_id)?;
        let baseline =
            self.analyzer()
                .capture_baseline(&scorecard, outcomes, &self.analysis_control(), self.clock.now())?;
        self.store.lock().save_psi_baseline(&baseline)?;
        log::info!(
            "scorecard={} v{} PSI baseline captured over {} bands",
            scorecard_id,
            scorecard.version,
            baseline.band_labels.len()
        );
        Ok(baseline)
    }

    // ── Alerts ─────────────────────────────────────────────────

    pub fn get_alerts(&self, scorecard_id: &str) -> EngineResult<Vec<AlertItem>> {
        let store = self.store.lock();
        store.load_scorecard(scorecard_id)?;
        store.alerts(scorecard_id)
    }

    pub fn acknowledge_alert(&self, alert_id: &str, actor: &str) -> EngineResult<AlertItem> {
        if actor.trim().is_empty() {
            return Err(EngineError::validation("an actor is required to acknowledge an alert"));
        }
        let alert = self
            .store
            .lock()
            .acknowledge_alert(alert_id, actor.trim(), self.clock.now())?;
        log::info!("scorecard={} alert {} acknowledged by {actor}", alert.scorecard_id, alert.alert_id);
        Ok(alert)
    }
}
