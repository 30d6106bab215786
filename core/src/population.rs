//! Synthetic back-test population.
//!
//! Generates scored applications lazily from a seed: score uniform-ish
//! across the scorecard range (mean of two uniforms), approval by a score
//! cutoff, and default probability falling logistically with score so the
//! population has realistic discrimination. A score shift simulates drift
//! for PSI monitoring.

use crate::{
    calculator::round_for_display,
    error::EngineResult,
    performance::HistoricalOutcome,
    provider::{OutcomeIter, OutcomeProvider},
    rng::OutcomeRng,
};

const SCORE_STREAM: u64 = 0;
const OUTCOME_STREAM: u64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticPopulation {
    pub seed:             u64,
    pub size:             usize,
    pub min_score:        f64,
    pub max_score:        f64,
    pub approval_cutoff:  f64,
    /// Added to every generated score.
    pub score_shift:      f64,
    /// Score at which default probability is 50%.
    pub default_midpoint: f64,
    /// Logistic scale; smaller is a sharper good/bad split.
    pub default_scale:    f64,
}

impl SyntheticPopulation {
    pub fn new(seed: u64, size: usize, min_score: f64, max_score: f64) -> Self {
        let range = max_score - min_score;
        Self {
            seed,
            size,
            min_score,
            max_score,
            approval_cutoff: min_score + range * 0.4,
            score_shift: 0.0,
            default_midpoint: min_score + range * 0.35,
            default_scale: range / 12.0,
        }
    }

    pub fn with_approval_cutoff(mut self, cutoff: f64) -> Self {
        self.approval_cutoff = cutoff;
        self
    }

    pub fn with_shift(mut self, shift: f64) -> Self {
        self.score_shift = shift;
        self
    }

    pub fn default_probability(&self, score: f64) -> f64 {
        if self.default_scale <= 0.0 {
            return if score < self.default_midpoint { 1.0 } else { 0.0 };
        }
        1.0 / (1.0 + ((score - self.default_midpoint) / self.default_scale).exp())
    }

    pub fn iter(&self) -> impl Iterator<Item = HistoricalOutcome> + Send + '_ {
        let mut scores = OutcomeRng::new(self.seed, SCORE_STREAM);
        let mut outcomes = OutcomeRng::new(self.seed, OUTCOME_STREAM);
        (0..self.size).map(move |i| {
            let u = (scores.next_f64() + scores.next_f64()) / 2.0;
            let score = round_for_display(
                self.min_score + (self.max_score - self.min_score) * u + self.score_shift,
            );
            let approved = score >= self.approval_cutoff;
            // Always draw so the outcome stream stays aligned across cutoffs.
            let defaulted = outcomes.chance(self.default_probability(score));
            HistoricalOutcome {
                application_id: format!("syn-{}-{i:06}", self.seed),
                score,
                approved,
                defaulted: approved.then_some(defaulted),
            }
        })
    }
}

impl OutcomeProvider for SyntheticPopulation {
    fn outcomes(&self, _scorecard_id: &str) -> EngineResult<OutcomeIter<'_>> {
        Ok(Box::new(self.iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_per_seed() {
        let a: Vec<_> = SyntheticPopulation::new(7, 50, 300.0, 700.0).iter().collect();
        let b: Vec<_> = SyntheticPopulation::new(7, 50, 300.0, 700.0).iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn declined_applications_have_no_outcome() {
        let pop = SyntheticPopulation::new(1, 500, 300.0, 700.0);
        for o in pop.iter() {
            assert_eq!(o.defaulted.is_some(), o.approved);
            assert_eq!(o.approved, o.score >= pop.approval_cutoff);
        }
    }

    #[test]
    fn shift_moves_every_score() {
        let base: Vec<_> = SyntheticPopulation::new(3, 20, 300.0, 700.0).iter().collect();
        let shifted: Vec<_> = SyntheticPopulation::new(3, 20, 300.0, 700.0)
            .with_shift(50.0)
            .iter()
            .collect();
        for (b, s) in base.iter().zip(&shifted) {
            assert!((s.score - b.score - 50.0).abs() < 0.011);
        }
    }
}
