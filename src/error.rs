use std::path::PathBuf;

use polars::error::PolarsError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PricingError>;

#[derive(Debug, Error)]
pub enum PricingError {
    /// Required source or derived columns are absent (or hold nulls).
    #[error("Missing columns required by the model: {}", .columns.join(", "))]
    MissingFeature { columns: Vec<String> },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Failed to load model artifact {}: {reason}", .path.display())]
    ArtifactLoad { path: PathBuf, reason: String },

    #[error("Feature table does not match the fitted pipeline: {0}")]
    FeatureMismatch(String),

    #[error("Model has not been fitted")]
    NotFitted,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PricingError {
    pub fn missing<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::MissingFeature {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub(crate) fn artifact(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ArtifactLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<PolarsError> for PricingError {
    fn from(err: PolarsError) -> Self {
        Self::MalformedInput(err.to_string())
    }
}
