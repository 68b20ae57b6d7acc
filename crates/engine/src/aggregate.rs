use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Serialize;

use crate::config::AggregationRule;
use crate::error::EngineError;
use crate::value::{Table, Value};

/// How `first` treats groups whose non-null values disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FirstPolicy {
    /// Take the first non-null value and ignore the rest.
    #[default]
    Permissive,
    /// Fail with [`EngineError::InconsistentFirst`].
    Strict,
}

/// One aggregate table: key columns first, then one column per rule, with
/// exactly one row per distinct key, sorted by key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetTable {
    pub key: Vec<String>,
    pub table: Table,
}

impl FacetTable {
    pub fn key_label(&self) -> String {
        self.key.join(", ")
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Row for an exact key tuple.
    pub fn row(&self, key: &[Value]) -> Option<&[Value]> {
        let width = self.key.len();
        self.table
            .rows
            .binary_search_by(|row| row[..width].cmp(key))
            .ok()
            .map(|i| self.table.rows[i].as_slice())
    }

    pub fn value(&self, key: &[Value], column: &str) -> Option<&Value> {
        let idx = self.table.column_index(column).ok()?;
        self.row(key).map(|row| &row[idx])
    }
}

/// Group `table` by `facet_key` and apply one rule per output column.
///
/// Rows inside a group are visited in input order, so `first` is
/// reproducible for identical input. Rows with a null in any key column
/// belong to no group: an unresolved code has no identifier to be a facet
/// member under, and still counts toward facets that do not key on it.
pub fn aggregate(
    table: &Table,
    facet_key: &[String],
    rules: &IndexMap<String, AggregationRule>,
    policy: FirstPolicy,
) -> Result<FacetTable, EngineError> {
    let key_idx = facet_key
        .iter()
        .map(|c| table.column_index(c))
        .collect::<Result<Vec<_>, _>>()?;
    let rule_idx = rules
        .keys()
        .map(|c| table.column_index(c))
        .collect::<Result<Vec<_>, _>>()?;

    let mut groups: BTreeMap<Vec<Value>, Vec<usize>> = BTreeMap::new();
    let mut null_keys = 0usize;
    for (i, row) in table.rows.iter().enumerate() {
        if key_idx.iter().any(|&k| row[k].is_null()) {
            null_keys += 1;
            continue;
        }
        let key: Vec<Value> = key_idx.iter().map(|&k| row[k].clone()).collect();
        groups.entry(key).or_default().push(i);
    }

    let columns = facet_key.iter().chain(rules.keys()).cloned();
    let mut out = Table::new(columns);

    for (key, members) in groups {
        let mut row = key.clone();
        for ((column, rule), &col) in rules.iter().zip(&rule_idx) {
            let values: Vec<&Value> = members.iter().map(|&r| &table.rows[r][col]).collect();
            let value = apply_rule(rule, &values, policy).map_err(|failure| match failure {
                RuleFailure::NonNumeric(value) => EngineError::NonNumeric {
                    column: column.clone(),
                    value: value.to_string(),
                },
                RuleFailure::Disagree(first, other) => EngineError::InconsistentFirst {
                    facet: facet_key.join(", "),
                    column: column.clone(),
                    key: key.iter().map(Value::to_string).collect::<Vec<_>>().join(", "),
                    first: first.to_string(),
                    other: other.to_string(),
                },
            })?;
            row.push(value);
        }
        out.rows.push(row);
    }

    tracing::debug!(
        facet = %facet_key.join(", "),
        rows_in = table.len(),
        null_keys,
        groups = out.len(),
        "facet aggregated"
    );

    Ok(FacetTable {
        key: facet_key.to_vec(),
        table: out,
    })
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

enum RuleFailure<'a> {
    NonNumeric(&'a Value),
    Disagree(&'a Value, &'a Value),
}

fn apply_rule<'a>(
    rule: &AggregationRule,
    values: &[&'a Value],
    policy: FirstPolicy,
) -> Result<Value, RuleFailure<'a>> {
    let mut present = values.iter().copied().filter(|v| !v.is_null());
    match rule {
        AggregationRule::First => {
            let Some(first) = present.next() else {
                return Ok(Value::Null);
            };
            if policy == FirstPolicy::Strict {
                if let Some(other) = present.find(|v| *v != first) {
                    return Err(RuleFailure::Disagree(first, other));
                }
            }
            Ok(first.clone())
        }
        AggregationRule::Sum => sum(present),
        AggregationRule::Count => Ok(Value::Int(present.count() as i64)),
        AggregationRule::Min => Ok(present.min().cloned().unwrap_or(Value::Null)),
        AggregationRule::Max => Ok(present.max().cloned().unwrap_or(Value::Null)),
        AggregationRule::Mean => {
            let mut total = 0.0;
            let mut n = 0usize;
            for v in present {
                total += v.as_f64().ok_or(RuleFailure::NonNumeric(v))?;
                n += 1;
            }
            Ok(if n == 0 { Value::Null } else { Value::float(total / n as f64) })
        }
        AggregationRule::Custom(custom) => Ok((custom.func)(values)),
    }
}

/// Integer sums stay integral until a float (or overflow) is seen.
fn sum<'a>(values: impl Iterator<Item = &'a Value>) -> Result<Value, RuleFailure<'a>> {
    let mut int_total: Option<i64> = None;
    let mut float_total: Option<f64> = None;
    for v in values {
        match v {
            Value::Int(i) => {
                if let Some(acc) = float_total.as_mut() {
                    *acc += *i as f64;
                } else {
                    let base = int_total.unwrap_or(0);
                    match base.checked_add(*i) {
                        Some(t) => int_total = Some(t),
                        None => float_total = Some(base as f64 + *i as f64),
                    }
                }
            }
            Value::Float(f) => {
                let base = float_total.unwrap_or_else(|| int_total.unwrap_or(0) as f64);
                float_total = Some(base + f.into_inner());
            }
            _ => return Err(RuleFailure::NonNumeric(v)),
        }
    }
    Ok(match (float_total, int_total) {
        (Some(f), _) => Value::float(f),
        (None, Some(i)) => Value::Int(i),
        (None, None) => Value::Null,
    })
}
