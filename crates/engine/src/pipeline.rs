use indexmap::IndexMap;
use rayon::prelude::*;
use serde::Serialize;

use crate::aggregate::{aggregate, FacetTable};
use crate::classification::ClassificationRegistry;
use crate::config::DatasetDescriptor;
use crate::error::EngineError;
use crate::merge::{merge, pad_codes, MergeReport};
use crate::rectangularize::complete;
use crate::value::{Table, Value};

/// The read step of a dataset: produce its raw rows.
///
/// Implementations must be shareable across the batch's worker threads.
pub trait DatasetReader: Sync {
    fn read(&self, descriptor: &DatasetDescriptor) -> Result<Table, EngineError>;
}

impl<F> DatasetReader for F
where
    F: Fn(&DatasetDescriptor) -> Result<Table, EngineError> + Sync,
{
    fn read(&self, descriptor: &DatasetDescriptor) -> Result<Table, EngineError> {
        self(descriptor)
    }
}

/// Facets produced from one dataset, plus merge diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetOutput {
    pub name: String,
    pub rows_read: usize,
    pub rows_rectangularized: usize,
    pub merge_reports: Vec<MergeReport>,
    #[serde(skip)]
    pub facets: IndexMap<Vec<String>, FacetTable>,
}

impl DatasetOutput {
    pub fn facet(&self, key: &[&str]) -> Option<&FacetTable> {
        self.facets
            .iter()
            .find(|(k, _)| k.iter().map(String::as_str).eq(key.iter().copied()))
            .map(|(_, facet)| facet)
    }
}

// ---------------------------------------------------------------------------
// Column preparation
// ---------------------------------------------------------------------------

/// Rename columns per the descriptor and cut everything not renamed.
pub fn prepare_columns(table: Table, descriptor: &DatasetDescriptor) -> Result<Table, EngineError> {
    if descriptor.rename.is_empty() {
        return Ok(table);
    }
    let idx = descriptor
        .rename
        .keys()
        .map(|src| table.column_index(src))
        .collect::<Result<Vec<_>, _>>()?;
    let rows = table
        .rows
        .into_iter()
        .map(|row| idx.iter().map(|&i| row[i].clone()).collect())
        .collect();
    Ok(Table {
        columns: descriptor.rename.values().cloned().collect(),
        rows,
    })
}

fn apply_filters(mut table: Table, descriptor: &DatasetDescriptor) -> Result<Table, EngineError> {
    for filter in &descriptor.filters {
        let idx = table.column_index(&filter.column)?;
        let before = table.len();
        table
            .rows
            .retain(|row| !filter.exclude.iter().any(|x| *x == row[idx].to_string()));
        if table.len() != before {
            tracing::debug!(
                column = %filter.column,
                dropped = before - table.len(),
                "rows filtered"
            );
        }
    }
    Ok(table)
}

fn apply_transforms(mut table: Table, descriptor: &DatasetDescriptor) -> Result<Table, EngineError> {
    for transform in &descriptor.transforms {
        let idx = table.column_index(&transform.column)?;
        let factor = transform.multiply;
        let int_factor = (factor.fract() == 0.0 && factor.abs() <= i64::MAX as f64).then_some(factor as i64);
        for row in &mut table.rows {
            let cell = &mut row[idx];
            *cell = match (&*cell, int_factor) {
                (Value::Null, _) => Value::Null,
                (Value::Int(i), Some(k)) => i
                    .checked_mul(k)
                    .map_or_else(|| Value::float(*i as f64 * factor), Value::Int),
                (Value::Int(i), None) => Value::float(*i as f64 * factor),
                (Value::Float(f), _) => Value::float(f.into_inner() * factor),
                (Value::Text(s), _) => {
                    return Err(EngineError::NonNumeric {
                        column: transform.column.clone(),
                        value: s.clone(),
                    })
                }
            };
        }
    }
    Ok(table)
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Run one dataset through prepare → pad → rectangularize → merge → aggregate.
pub fn process_dataset(
    descriptor: &DatasetDescriptor,
    raw: Table,
    registry: &ClassificationRegistry,
) -> Result<DatasetOutput, EngineError> {
    let rows_read = raw.len();

    let mut table = prepare_columns(raw, descriptor)?;
    table = apply_filters(table, descriptor)?;
    table = apply_transforms(table, descriptor)?;
    if let Some(hook) = descriptor.pre_merge {
        table = hook(table)?;
    }

    for (column, width) in &descriptor.digit_padding {
        pad_codes(&mut table, column, *width)?;
    }

    table = complete(table, &descriptor.facet_fields)?;
    let rows_rectangularized = table.len();

    let mut merge_reports = Vec::with_capacity(descriptor.classification_fields.len());
    for (column, field) in &descriptor.classification_fields {
        let (merged, report) = merge(table, column, registry, &field.taxonomy, &field.level)?;
        table = merged;
        merge_reports.push(report);
    }

    let policy = descriptor.first_policy();
    let mut facets = IndexMap::with_capacity(descriptor.facets.len());
    for spec in &descriptor.facets {
        let facet = aggregate(&table, &spec.key, &spec.aggregations, policy)?;
        facets.insert(spec.key.clone(), facet);
    }

    tracing::info!(
        dataset = %descriptor.name,
        rows_read,
        rows_rectangularized,
        facets = facets.len(),
        "dataset processed"
    );

    Ok(DatasetOutput {
        name: descriptor.name.clone(),
        rows_read,
        rows_rectangularized,
        merge_reports,
        facets,
    })
}

/// Read and process one dataset. Errors carry the dataset name.
pub fn run_dataset<R: DatasetReader + ?Sized>(
    descriptor: &DatasetDescriptor,
    reader: &R,
    registry: &ClassificationRegistry,
) -> Result<DatasetOutput, EngineError> {
    reader
        .read(descriptor)
        .and_then(|raw| process_dataset(descriptor, raw, registry))
        .map_err(|e| e.in_dataset(&descriptor.name))
}

/// Process every dataset independently and in parallel. Results keep the
/// order of `descriptors`; one failing dataset does not stop the others.
pub fn run_batch<R: DatasetReader + ?Sized>(
    descriptors: &[DatasetDescriptor],
    reader: &R,
    registry: &ClassificationRegistry,
) -> Vec<Result<DatasetOutput, EngineError>> {
    descriptors
        .par_iter()
        .map(|descriptor| run_dataset(descriptor, reader, registry))
        .collect()
}
