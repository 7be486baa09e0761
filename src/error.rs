use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;

/// A numeric input the cost model cannot work with.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid {field} for record '{record}': {value} ({reason})")]
pub struct ValidationError {
    pub record: String,
    pub field: &'static str,
    pub value: f64,
    pub reason: &'static str,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("city '{city}' is missing required column '{column}' for {field}")]
    MissingColumn {
        city: String,
        field: &'static str,
        column: String,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unknown city '{0}'")]
    UnknownCity(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid CSV data: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AnalysisError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
