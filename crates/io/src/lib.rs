//! File loading for the facet engine: classification CSVs, registry
//! manifests, raw dataset CSVs and facet table export.

pub mod classification;
pub mod dataset;
pub mod error;
pub mod manifest;

pub use classification::{load_classification, parse_classification_records};
pub use dataset::{parse_table, read_file_as_utf8, read_table, sniff_delimiter, write_table, CsvReader};
pub use error::IoError;
pub use manifest::{load_registry, RegistryManifest, TaxonomySource};
