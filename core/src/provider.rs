//! Read-only collaborators the engine pulls data from.
//!
//! Application values feed what-if simulation. Historical outcomes feed
//! performance analysis and are handed out as an iterator so a backing
//! store can stream them without materialising the population.

use crate::{
    error::{EngineError, EngineResult},
    performance::HistoricalOutcome,
    types::{ApplicantData, ApplicationId, ScorecardId},
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub trait ApplicationProvider: Send + Sync {
    fn application_values(&self, application_id: &str) -> EngineResult<ApplicantData>;
}

pub type OutcomeIter<'a> = Box<dyn Iterator<Item = HistoricalOutcome> + Send + 'a>;

pub trait OutcomeProvider: Send + Sync {
    fn outcomes(&self, scorecard_id: &str) -> EngineResult<OutcomeIter<'_>>;
}

#[derive(Default)]
pub struct InMemoryApplications {
    applications: RwLock<HashMap<ApplicationId, ApplicantData>>,
}

impl InMemoryApplications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, application_id: &str, values: ApplicantData) {
        self.applications.write().insert(application_id.to_string(), values);
    }
}

impl ApplicationProvider for InMemoryApplications {
    fn application_values(&self, application_id: &str) -> EngineResult<ApplicantData> {
        self.applications
            .read()
            .get(application_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("application", application_id))
    }
}

/// Outcomes keyed by scorecard. `outcomes` streams from a shared
/// snapshot, so later `replace` calls never disturb an analysis in flight.
#[derive(Default)]
pub struct InMemoryOutcomes {
    by_scorecard: RwLock<HashMap<ScorecardId, Arc<Vec<HistoricalOutcome>>>>,
}

impl InMemoryOutcomes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, scorecard_id: &str, outcomes: Vec<HistoricalOutcome>) {
        self.by_scorecard
            .write()
            .insert(scorecard_id.to_string(), Arc::new(outcomes));
    }
}

impl OutcomeProvider for InMemoryOutcomes {
    fn outcomes(&self, scorecard_id: &str) -> EngineResult<OutcomeIter<'_>> {
        let rows = self
            .by_scorecard
            .read()
            .get(scorecard_id)
            .cloned()
            .unwrap_or_default();
        Ok(Box::new((0..rows.len()).map(move |i| rows[i].clone())))
    }
}
