use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::error::EngineError;
use crate::value::{Table, Value};

/// Complete `table` so that every combination of the distinct values
/// observed in `facet_columns` has exactly one row.
///
/// Precondition: at most one input row per combination; a duplicate is
/// reported as [`EngineError::DuplicateKey`]. Present combinations pass
/// through unchanged, missing ones get a row holding the key values and
/// nulls elsewhere. Rows come out in cartesian-product order over the
/// sorted distinct values (last column varying fastest), which makes the
/// operation idempotent.
///
/// Nulls are not key values: a row with a null in any facet column is
/// dropped (and counted in a warning) rather than spawning a null member in
/// the product. A product larger than `usize` fails with
/// [`EngineError::ProductTooLarge`].
pub fn complete<S: AsRef<str>>(table: Table, facet_columns: &[S]) -> Result<Table, EngineError> {
    if facet_columns.is_empty() {
        return Err(EngineError::ConfigValidation(
            "rectangularization needs at least one facet column".into(),
        ));
    }
    let key_idx = facet_columns
        .iter()
        .map(|c| table.column_index(c.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    let Table { columns, rows } = table;
    let rows_in = rows.len();

    let mut distinct: Vec<BTreeSet<Value>> = vec![BTreeSet::new(); key_idx.len()];
    let mut existing: FxHashMap<Vec<Value>, Vec<Value>> = FxHashMap::default();
    existing.reserve(rows.len());
    let mut null_keys = 0usize;
    for row in rows {
        if key_idx.iter().any(|&k| row[k].is_null()) {
            null_keys += 1;
            continue;
        }
        let key: Vec<Value> = key_idx.iter().map(|&k| row[k].clone()).collect();
        for (set, value) in distinct.iter_mut().zip(&key) {
            if !set.contains(value) {
                set.insert(value.clone());
            }
        }
        if existing.contains_key(&key) {
            return Err(EngineError::DuplicateKey {
                columns: join_columns(facet_columns),
                key: key.iter().map(Value::to_string).collect::<Vec<_>>().join(", "),
            });
        }
        existing.insert(key, row);
    }

    let distinct: Vec<Vec<Value>> = distinct.into_iter().map(|s| s.into_iter().collect()).collect();
    if null_keys > 0 {
        tracing::warn!(
            columns = %join_columns(facet_columns),
            rows = null_keys,
            "rows with null facet values dropped"
        );
    }

    let total = distinct
        .iter()
        .try_fold(1usize, |acc, values| acc.checked_mul(values.len()))
        .ok_or_else(|| EngineError::ProductTooLarge {
            columns: join_columns(facet_columns),
            rows: rows_in - null_keys,
        })?;
    let width = columns.len();

    let mut out = Vec::with_capacity(total);
    let mut cursor = vec![0usize; distinct.len()];
    for _ in 0..total {
        let key: Vec<Value> = cursor
            .iter()
            .zip(&distinct)
            .map(|(&i, values)| values[i].clone())
            .collect();
        let row = existing.remove(&key).unwrap_or_else(|| {
            let mut row = vec![Value::Null; width];
            for (&k, value) in key_idx.iter().zip(key) {
                row[k] = value;
            }
            row
        });
        out.push(row);

        for pos in (0..cursor.len()).rev() {
            cursor[pos] += 1;
            if cursor[pos] < distinct[pos].len() {
                break;
            }
            cursor[pos] = 0;
        }
    }

    tracing::debug!(
        rows_in,
        rows_out = out.len(),
        synthesized = out.len() - (rows_in - null_keys),
        "rectangularized"
    );

    Ok(Table { columns, rows: out })
}

fn join_columns<S: AsRef<str>>(columns: &[S]) -> String {
    columns.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ")
}
