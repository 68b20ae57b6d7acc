//! TOML manifest listing the classification files that make up a registry.
//!
//! ```toml
//! [[taxonomies]]
//! name = "location"
//! file = "locations.csv"
//!
//! [[taxonomies]]
//! name = "region"
//! file = "regions.csv"
//! levels = ["continent", "region"]
//! ```
//!
//! `levels` may be omitted for taxonomies with built-in level definitions.
//! Files are resolved relative to the manifest's directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use facets_engine::{ClassificationRegistry, Taxonomy};

use crate::classification::load_classification;
use crate::dataset::read_file_as_utf8;
use crate::error::IoError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryManifest {
    #[serde(default)]
    pub taxonomies: Vec<TaxonomySource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaxonomySource {
    pub name: String,
    pub file: PathBuf,
    #[serde(default)]
    pub levels: Option<Vec<String>>,
}

impl TaxonomySource {
    pub fn taxonomy(&self) -> Result<Taxonomy, IoError> {
        match &self.levels {
            Some(levels) => Ok(Taxonomy::new(&self.name, levels.iter().map(String::as_str))),
            None => Taxonomy::builtin(&self.name).ok_or_else(|| {
                IoError::ManifestValidation(format!(
                    "taxonomy '{}' has no built-in levels; list them with `levels`",
                    self.name
                ))
            }),
        }
    }
}

impl RegistryManifest {
    pub fn from_toml(input: &str) -> Result<Self, IoError> {
        let manifest: RegistryManifest =
            toml::from_str(input).map_err(|e| IoError::ManifestParse(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), IoError> {
        let mut names = HashSet::new();
        for source in &self.taxonomies {
            if source.name.trim().is_empty() {
                return Err(IoError::ManifestValidation("taxonomy name must not be empty".into()));
            }
            if !names.insert(source.name.as_str()) {
                return Err(IoError::ManifestValidation(format!(
                    "taxonomy '{}' is listed twice",
                    source.name
                )));
            }
            source.taxonomy()?;
        }
        Ok(())
    }

    /// Load every listed file and build the registry.
    pub fn load(&self, base_dir: &Path) -> Result<ClassificationRegistry, IoError> {
        let mut registry = ClassificationRegistry::new();
        for source in &self.taxonomies {
            let classification = load_classification(&base_dir.join(&source.file), source.taxonomy()?)?;
            tracing::info!(taxonomy = %source.name, nodes = classification.len(), "loaded classification");
            registry.insert(classification)?;
        }
        Ok(registry)
    }
}

/// Read a manifest file and load the registry it describes.
pub fn load_registry(manifest_path: &Path) -> Result<ClassificationRegistry, IoError> {
    let manifest = RegistryManifest::from_toml(&read_file_as_utf8(manifest_path)?)?;
    let base_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
    manifest.load(base_dir)
}
