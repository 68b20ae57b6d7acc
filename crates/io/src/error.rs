use facets_engine::{ClassificationError, EngineError};
use thiserror::Error;

/// Failures while reading classification files, manifests or datasets.
///
/// `origin` is the file path, or a caller-chosen label for in-memory input.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("{origin}: {source}")]
    File {
        origin: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{origin}: {source}")]
    Csv {
        origin: String,
        #[source]
        source: csv::Error,
    },
    #[error("{origin}, line {line}: {reason}")]
    InvalidRecord {
        origin: String,
        line: u64,
        reason: String,
    },
    #[error("manifest parse error: {0}")]
    ManifestParse(String),
    #[error("manifest validation error: {0}")]
    ManifestValidation(String),
    #[error("dataset '{0}' has no source file")]
    MissingSource(String),
    #[error(transparent)]
    Classification(#[from] ClassificationError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl IoError {
    pub(crate) fn csv(origin: &str, source: csv::Error) -> Self {
        IoError::Csv {
            origin: origin.to_string(),
            source,
        }
    }

    pub(crate) fn record(origin: &str, line: u64, reason: impl Into<String>) -> Self {
        IoError::InvalidRecord {
            origin: origin.to_string(),
            line,
            reason: reason.into(),
        }
    }
}
