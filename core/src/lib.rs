//! Credit scorecard decision engine.
//!
//! Module order follows the dependency order of the engine:
//! model → bin matching → scoring → decisions → what-if,
//! script transcoding and audited edits on the side, performance
//! monitoring and alerting over historical outcomes.

pub mod alerts;
pub mod audit;
pub mod bin_matcher;
pub mod calculator;
pub mod clock;
pub mod command;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod model;
pub mod performance;
pub mod population;
pub mod provider;
pub mod rng;
pub mod script;
pub mod store;
pub mod types;
pub mod what_if;
