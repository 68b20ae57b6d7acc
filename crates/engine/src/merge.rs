use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::classification::ClassificationRegistry;
use crate::error::EngineError;
use crate::value::{Table, Value};

/// Name of the identifier column attached for a classification-coded column.
pub fn id_column(column: &str) -> String {
    format!("{column}_id")
}

/// Diagnostics for one merged column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub column: String,
    pub taxonomy: String,
    pub level: String,
    pub matched: usize,
    /// Rows whose code cell was null.
    pub null_codes: usize,
    /// Unresolved code -> number of rows carrying it.
    pub unmatched: BTreeMap<String, usize>,
}

impl MergeReport {
    pub fn unmatched_rows(&self) -> usize {
        self.unmatched.values().sum()
    }
}

// ---------------------------------------------------------------------------
// Padding
// ---------------------------------------------------------------------------

/// Rewrite `column` into canonical zero-padded code strings of at least
/// `width` digits. Integral numbers and numeric text are accepted
/// ("8", 8 and 8.0 all become "08" for width 2); nulls stay null.
pub fn pad_codes(table: &mut Table, column: &str, width: usize) -> Result<(), EngineError> {
    let idx = table.column_index(column)?;
    for row in &mut table.rows {
        let cell = &mut row[idx];
        if cell.is_null() {
            continue;
        }
        let digits = code_digits(cell).ok_or_else(|| EngineError::InvalidCode {
            column: column.to_string(),
            value: cell.to_string(),
        })?;
        *cell = Value::Text(format!("{digits:0width$}"));
    }
    Ok(())
}

fn code_digits(value: &Value) -> Option<u64> {
    match value {
        Value::Int(i) => u64::try_from(*i).ok(),
        Value::Float(f) => integral(f.into_inner()),
        Value::Text(s) => {
            let s = s.trim();
            s.parse::<u64>().ok().or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        Value::Null => None,
    }
}

fn integral(f: f64) -> Option<u64> {
    (f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64).then_some(f as u64)
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Attach `<column>_id` holding the identifier each row's code resolves to
/// at `level` of `taxonomy`.
///
/// Unresolvable codes leave a null identifier and are counted in the report;
/// that is a data-quality finding, not a failure. An unknown taxonomy or
/// level is a configuration error and fails the whole merge.
pub fn merge(
    mut table: Table,
    column: &str,
    registry: &ClassificationRegistry,
    taxonomy: &str,
    level: &str,
) -> Result<(Table, MergeReport), EngineError> {
    let classification = registry.get(taxonomy)?;
    let rank = classification.taxonomy().level_rank(level)?;
    let idx = table.column_index(column)?;

    let mut report = MergeReport {
        column: column.to_string(),
        taxonomy: taxonomy.to_string(),
        level: level.to_string(),
        ..MergeReport::default()
    };

    let ids: Vec<Value> = table
        .rows
        .iter()
        .map(|row| {
            let code = match &row[idx] {
                Value::Null => {
                    report.null_codes += 1;
                    return Value::Null;
                }
                Value::Text(s) => Cow::Borrowed(s.as_str()),
                other => Cow::Owned(other.to_string()),
            };
            match classification.lookup(rank, &code) {
                Some(id) => {
                    report.matched += 1;
                    Value::Int(id)
                }
                None => {
                    *report.unmatched.entry(code.into_owned()).or_default() += 1;
                    Value::Null
                }
            }
        })
        .collect();

    table.add_column(&id_column(column), ids)?;

    if !report.unmatched.is_empty() {
        tracing::warn!(
            column,
            taxonomy,
            level,
            unmatched_codes = report.unmatched.len(),
            unmatched_rows = report.unmatched_rows(),
            "codes not found in classification"
        );
    }

    Ok((table, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::{Classification, ClassificationRecord, Taxonomy};
    use crate::error::ClassificationError;

    fn registry() -> ClassificationRegistry {
        let products = Classification::load(
            Taxonomy::builtin("product").unwrap(),
            vec![
                ClassificationRecord::new(1, "01", "2digit", None),
                ClassificationRecord::new(90, "0101", "4digit", Some(1)),
            ],
        )
        .unwrap();
        ClassificationRegistry::new().with(products).unwrap()
    }

    #[test]
    fn pads_numeric_codes() {
        let mut t = Table::from_rows(
            ["product"],
            vec![
                vec![101i64.into()],
                vec!["101".into()],
                vec![101.0f64.into()],
                vec![Value::Null],
                vec!["12345".into()],
            ],
        )
        .unwrap();
        pad_codes(&mut t, "product", 4).unwrap();
        let codes: Vec<_> = t.column("product").unwrap().cloned().collect();
        assert_eq!(
            codes,
            vec!["0101".into(), "0101".into(), "0101".into(), Value::Null, "12345".into()]
        );
    }

    #[test]
    fn padding_rejects_non_numeric_codes() {
        let mut t = Table::from_rows(["product"], vec![vec![".".into()]]).unwrap();
        let err = pad_codes(&mut t, "product", 4).unwrap_err();
        assert!(matches!(err, EngineError::InvalidCode { .. }));

        let mut t = Table::from_rows(["product"], vec![vec![(-3i64).into()]]).unwrap();
        assert!(pad_codes(&mut t, "product", 4).is_err());
    }

    #[test]
    fn merge_attaches_resolved_ids() {
        let t = Table::from_rows(["product"], vec![vec!["0101".into()], vec!["01".into()]]).unwrap();
        let (t, report) = merge(t, "product", &registry(), "product", "4digit").unwrap();
        assert_eq!(t.columns(), &["product".to_string(), "product_id".to_string()]);
        assert_eq!(t.get(0, "product_id"), Some(&Value::Int(90)));
        // "01" exists, but only at the 2digit level
        assert_eq!(t.get(1, "product_id"), Some(&Value::Null));
        assert_eq!(report.matched, 1);
        assert_eq!(report.unmatched.get("01"), Some(&1));
    }

    #[test]
    fn unmatched_and_null_codes_are_counted() {
        let t = Table::from_rows(
            ["product"],
            vec![vec!["9999".into()], vec!["9999".into()], vec![Value::Null], vec!["0101".into()]],
        )
        .unwrap();
        let (_, report) = merge(t, "product", &registry(), "product", "4digit").unwrap();
        assert_eq!(report.matched, 1);
        assert_eq!(report.null_codes, 1);
        assert_eq!(report.unmatched_rows(), 2);
        assert_eq!(report.unmatched.len(), 1);
    }

    #[test]
    fn unknown_taxonomy_or_level_fails() {
        let t = Table::from_rows(["product"], vec![vec!["0101".into()]]).unwrap();
        let err = merge(t.clone(), "product", &registry(), "industry", "class").unwrap_err();
        assert!(matches!(
            err,
            EngineError::Classification(ClassificationError::UnknownTaxonomy(_))
        ));
        let err = merge(t, "product", &registry(), "product", "6digit").unwrap_err();
        assert!(matches!(
            err,
            EngineError::Classification(ClassificationError::UnknownLevel { .. })
        ));
    }
}
