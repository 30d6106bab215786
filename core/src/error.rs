use crate::types::Version;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Script parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Stale version: edit was based on version {expected}, scorecard is at version {actual}")]
    StaleVersion { expected: Version, actual: Version },

    #[error("Performance analysis cancelled")]
    AnalysisCancelled,

    #[error("Performance analysis timed out after {elapsed_ms} ms")]
    AnalysisTimedOut { elapsed_ms: u128 },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
