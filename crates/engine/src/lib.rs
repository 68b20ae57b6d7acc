//! `facets-engine`: descriptor-driven aggregation of classification-coded
//! economic datasets into facet tables.
//!
//! Pure engine crate: receives raw tables through a [`DatasetReader`] and a
//! pre-loaded [`ClassificationRegistry`], returns facet tables. No file
//! formats and no storage.

pub mod aggregate;
pub mod classification;
pub mod config;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod rectangularize;
pub mod value;

pub use aggregate::{aggregate, FacetTable, FirstPolicy};
pub use classification::{
    Classification, ClassificationId, ClassificationNode, ClassificationRecord, ClassificationRegistry, Taxonomy,
};
pub use config::{AggregationRule, DatasetDescriptor, FacetSpec};
pub use error::{ClassificationError, EngineError};
pub use merge::{merge, MergeReport};
pub use pipeline::{process_dataset, run_batch, run_dataset, DatasetOutput, DatasetReader};
pub use rectangularize::complete;
pub use value::{Table, Value};
