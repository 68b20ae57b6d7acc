use facets_engine::ClassificationError;
use thiserror::Error;

/// Rejections surfaced to the caller. None of these are defaulted away.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    #[error("parameter '{name}' is not a valid entity; expected one of: {expected}")]
    UnknownEntity { name: String, expected: String },
    #[error("range parameters for '{entity}' need both from_{entity} and to_{entity}")]
    IncompleteRange { entity: String },
    #[error("parameter '{name}': '{value}' is not an integer")]
    InvalidParameter { name: String, value: String },
    #[error("parameter '{name}' is given more than once")]
    DuplicateParameter { name: String },
    #[error("range for '{entity}' spans levels '{from_level}' and '{to_level}'")]
    MixedRangeLevels {
        entity: String,
        from_level: String,
        to_level: String,
    },
    #[error("no route for '{primary}' with level combination {key}")]
    NoRouteForLevelCombination { primary: String, key: String },
    #[error("route for '{primary}' with {key} is already registered")]
    DuplicateRoute { primary: String, key: String },
    #[error("invalid route key: {0}")]
    InvalidRouteKey(String),
    #[error(transparent)]
    Classification(#[from] ClassificationError),
}
