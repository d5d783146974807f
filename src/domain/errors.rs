// Error taxonomy for ingestion and classification
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::vitals::VitalSign;

/// A frame that could not be turned into a vitals record.
///
/// Always recoverable: the offending unit is dropped and the connection keeps reading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error(
        "{field:?} carries codes ({mdc_code}, {unit_code}), expected ({expected_mdc}, {expected_unit})"
    )]
    CodeMismatch {
        field: VitalSign,
        mdc_code: i64,
        unit_code: i64,
        expected_mdc: i64,
        expected_unit: i64,
    },
}

impl DecodeError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}

/// Terminates one connection handler and nothing else.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("peer sent nothing for {0:?}")]
    IdleTimeout(Duration),

    #[error("connection i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// The model artifact for the configured kind/class count could not be used.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read model file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse model file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid model: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheContractError {
    #[error("feature vector has {got} values, expected {expected}")]
    WidthMismatch { expected: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),

    #[error(transparent)]
    Contract(#[from] CacheContractError),

    #[error("model produced class index {0} outside the label set")]
    UnknownClass(usize),

    #[error("prediction task failed: {0}")]
    Task(String),
}
