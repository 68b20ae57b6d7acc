use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::aggregate::FirstPolicy;
use crate::error::EngineError;
use crate::merge::id_column;
use crate::value::{Table, Value};

/// Programmatic hook run on the prepared table before codes are padded.
pub type PreMergeHook = fn(Table) -> Result<Table, EngineError>;

// ---------------------------------------------------------------------------
// Dataset descriptor
// ---------------------------------------------------------------------------

/// Declarative description of one raw dataset and the facets derived from it.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetDescriptor {
    pub name: String,
    /// Location handed to the read step; interpretation belongs to the reader.
    #[serde(default)]
    pub source: Option<String>,
    /// Source column -> output column. When non-empty, only these columns survive.
    #[serde(default)]
    pub rename: IndexMap<String, String>,
    #[serde(default)]
    pub classification_fields: IndexMap<String, ClassificationField>,
    #[serde(default)]
    pub digit_padding: IndexMap<String, usize>,
    /// Finest-grained dimensions; the dataset is rectangularized over these.
    pub facet_fields: Vec<String>,
    #[serde(default)]
    pub facets: Vec<FacetSpec>,
    #[serde(default)]
    pub filters: Vec<RowFilter>,
    #[serde(default)]
    pub transforms: Vec<ScaleTransform>,
    /// Fail when a `first` rule sees disagreeing values within a group.
    #[serde(default)]
    pub strict_first: bool,
    #[serde(skip)]
    pub pre_merge: Option<PreMergeHook>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClassificationField {
    pub taxonomy: String,
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FacetSpec {
    pub key: Vec<String>,
    pub aggregations: IndexMap<String, AggregationRule>,
}

// ---------------------------------------------------------------------------
// Aggregation rules
// ---------------------------------------------------------------------------

/// The closed set of per-column aggregation rules.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationRule {
    First,
    Sum,
    Count,
    Min,
    Max,
    Mean,
    #[serde(skip_deserializing)]
    Custom(CustomRule),
}

impl AggregationRule {
    pub fn custom(name: &str, func: fn(&[&Value]) -> Value) -> Self {
        Self::Custom(CustomRule {
            name: name.to_string(),
            func,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::First => "first",
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Min => "min",
            Self::Max => "max",
            Self::Mean => "mean",
            Self::Custom(rule) => &rule.name,
        }
    }
}

impl fmt::Display for AggregationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named rule backed by a pure function over the group's values, given in
/// input order.
#[derive(Clone)]
pub struct CustomRule {
    pub name: String,
    pub func: fn(&[&Value]) -> Value,
}

impl fmt::Debug for CustomRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomRule").field("name", &self.name).finish()
    }
}

impl PartialEq for CustomRule {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

// ---------------------------------------------------------------------------
// Filter + Transform
// ---------------------------------------------------------------------------

/// Drop rows whose `column` renders to one of `exclude`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RowFilter {
    pub column: String,
    pub exclude: Vec<String>,
}

/// Multiply a numeric column by a constant, e.g. to undo unit scaling.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScaleTransform {
    pub column: String,
    pub multiply: f64,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl DatasetDescriptor {
    pub fn from_toml(input: &str) -> Result<Self, EngineError> {
        let descriptor: DatasetDescriptor =
            toml::from_str(input).map_err(|e| EngineError::ConfigParse(e.to_string()))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn with_pre_merge(mut self, hook: PreMergeHook) -> Self {
        self.pre_merge = Some(hook);
        self
    }

    /// Set (or replace) the rule for `column` in the facet keyed by `key`.
    pub fn set_rule(&mut self, key: &[&str], column: &str, rule: AggregationRule) -> Result<(), EngineError> {
        let facet = self
            .facets
            .iter_mut()
            .find(|f| f.key.iter().map(String::as_str).eq(key.iter().copied()))
            .ok_or_else(|| {
                EngineError::ConfigValidation(format!("no facet with key ({})", key.join(", ")))
            })?;
        facet.aggregations.insert(column.to_string(), rule);
        Ok(())
    }

    pub fn first_policy(&self) -> FirstPolicy {
        if self.strict_first {
            FirstPolicy::Strict
        } else {
            FirstPolicy::Permissive
        }
    }

    /// Columns present after renaming, or `None` when the raw columns pass
    /// through unrenamed (and so are unknown until read).
    pub fn prepared_columns(&self) -> Option<Vec<&str>> {
        if self.rename.is_empty() {
            None
        } else {
            Some(self.rename.values().map(String::as_str).collect())
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |msg: String| EngineError::ConfigValidation(format!("dataset '{}': {msg}", self.name));

        if self.name.trim().is_empty() {
            return Err(EngineError::ConfigValidation("dataset name must not be empty".into()));
        }

        // Rename targets must be unique
        let mut targets = HashSet::new();
        for dst in self.rename.values() {
            if !targets.insert(dst.as_str()) {
                return Err(invalid(format!("rename target '{dst}' is used twice")));
            }
        }

        let prepared = self.prepared_columns();
        let known = |col: &str| prepared.as_ref().map_or(true, |cols| cols.contains(&col));
        let known_or_id = |col: &str| {
            known(col)
                || self
                    .classification_fields
                    .keys()
                    .any(|field| id_column(field) == col)
        };

        if self.facet_fields.is_empty() {
            return Err(invalid("facet_fields must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for field in &self.facet_fields {
            if !seen.insert(field.as_str()) {
                return Err(invalid(format!("facet field '{field}' is listed twice")));
            }
            if !known(field) {
                return Err(invalid(format!("facet field '{field}' is not a renamed column")));
            }
        }

        for field in self.classification_fields.keys() {
            if !known(field) {
                return Err(invalid(format!("classification field '{field}' is not a renamed column")));
            }
        }

        for (field, width) in &self.digit_padding {
            if *width == 0 {
                return Err(invalid(format!("digit padding for '{field}' must be positive")));
            }
            if !known(field) {
                return Err(invalid(format!("padded field '{field}' is not a renamed column")));
            }
        }

        for filter in &self.filters {
            if !known(&filter.column) {
                return Err(invalid(format!("filter column '{}' is not a renamed column", filter.column)));
            }
        }
        for transform in &self.transforms {
            if !known(&transform.column) {
                return Err(invalid(format!(
                    "transform column '{}' is not a renamed column",
                    transform.column
                )));
            }
            if !transform.multiply.is_finite() {
                return Err(invalid(format!("transform for '{}' must be finite", transform.column)));
            }
        }

        let mut facet_keys = HashSet::new();
        for facet in &self.facets {
            let label = facet.key.join(", ");
            if facet.key.is_empty() {
                return Err(invalid("facet key must not be empty".into()));
            }
            if !facet_keys.insert(facet.key.clone()) {
                return Err(invalid(format!("facet ({label}) is declared twice")));
            }
            for col in &facet.key {
                if !known_or_id(col) {
                    return Err(invalid(format!("facet ({label}): unknown key column '{col}'")));
                }
            }
            if facet.aggregations.is_empty() {
                return Err(invalid(format!("facet ({label}) has no aggregations")));
            }
            for col in facet.aggregations.keys() {
                if facet.key.contains(col) {
                    return Err(invalid(format!("facet ({label}): '{col}' is both key and output")));
                }
                if !known_or_id(col) {
                    return Err(invalid(format!("facet ({label}): unknown output column '{col}'")));
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
