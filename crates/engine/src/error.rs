use thiserror::Error;

use crate::classification::ClassificationId;

/// Structural problems with classification input, or failed lookups.
///
/// Every load-time variant is fatal: a registry that fails to load must
/// abort startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    #[error("unknown taxonomy '{0}'")]
    UnknownTaxonomy(String),
    #[error("taxonomy '{0}' is already registered")]
    DuplicateTaxonomy(String),
    #[error("taxonomy '{taxonomy}' is invalid: {reason}")]
    InvalidTaxonomy { taxonomy: String, reason: String },
    #[error("taxonomy '{taxonomy}': unknown level '{level}'")]
    UnknownLevel { taxonomy: String, level: String },
    #[error("taxonomy '{taxonomy}': no code '{code}' at level '{level}'")]
    UnknownCode {
        taxonomy: String,
        code: String,
        level: String,
    },
    #[error("taxonomy '{taxonomy}': identifier {id} not found")]
    NotFound { taxonomy: String, id: ClassificationId },
    #[error("taxonomy '{taxonomy}': duplicate identifier {id}")]
    DuplicateId { taxonomy: String, id: ClassificationId },
    #[error("taxonomy '{taxonomy}': duplicate code '{code}' at level '{level}'")]
    DuplicateCode {
        taxonomy: String,
        code: String,
        level: String,
    },
    #[error("taxonomy '{taxonomy}': node {id} references missing parent {parent_id}")]
    MissingParent {
        taxonomy: String,
        id: ClassificationId,
        parent_id: ClassificationId,
    },
    #[error(
        "taxonomy '{taxonomy}': node {id} at level '{level}' must be more specific \
         than its parent {parent_id} at level '{parent_level}'"
    )]
    LevelOrder {
        taxonomy: String,
        id: ClassificationId,
        level: String,
        parent_id: ClassificationId,
        parent_level: String,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Descriptor validation error (unknown column reference, empty facet key, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    #[error("missing column '{0}'")]
    MissingColumn(String),
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),
    #[error("row {row} has {found} values, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    /// Rectangularization precondition: one input row per key combination.
    #[error("duplicate rows for key ({columns}) = ({key})")]
    DuplicateKey { columns: String, key: String },
    #[error("completing ({columns}) over {rows} rows has more combinations than fit in usize")]
    ProductTooLarge { columns: String, rows: usize },
    #[error("column '{column}': cannot zero-pad code '{value}'")]
    InvalidCode { column: String, value: String },
    #[error("column '{column}': non-numeric value '{value}'")]
    NonNumeric { column: String, value: String },
    #[error(
        "facet ({facet}), column '{column}': values disagree within group ({key}): \
         '{first}' vs '{other}'"
    )]
    InconsistentFirst {
        facet: String,
        column: String,
        key: String,
        first: String,
        other: String,
    },
    #[error(transparent)]
    Classification(#[from] ClassificationError),
    /// Failure in the external read step.
    #[error("read error: {0}")]
    Read(String),
    #[error("dataset '{name}': {source}")]
    Dataset {
        name: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    pub(crate) fn in_dataset(self, name: &str) -> Self {
        match self {
            already @ Self::Dataset { .. } => already,
            other => Self::Dataset {
                name: name.to_string(),
                source: Box::new(other),
            },
        }
    }
}
