use indexmap::IndexMap;
use serde::Deserialize;

use facets_engine::ClassificationRegistry;

use crate::error::RoutingError;

/// Entities the API understands, standard ones first.
const STANDARD_ENTITIES: &[(&str, Option<&str>)] = &[
    ("product", Some("product")),
    ("location", Some("location")),
    ("industry", Some("industry")),
    ("country", Some("country")),
    ("occupation", Some("occupation")),
    ("livestock", Some("livestock")),
    ("agproduct", Some("agproduct")),
    ("year", None),
];

/// Known entity names and the taxonomy each one is classified by.
///
/// An entity without a taxonomy (such as `year`) is never level-resolved and
/// contributes a null level to route keys.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityCatalog {
    #[serde(default)]
    pub entities: IndexMap<String, EntityConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EntityConfig {
    #[serde(default)]
    pub taxonomy: Option<String>,
}

impl EntityCatalog {
    pub fn standard() -> Self {
        STANDARD_ENTITIES
            .iter()
            .fold(Self::default(), |catalog, (name, taxonomy)| catalog.with_entity(name, *taxonomy))
    }

    pub fn with_entity(mut self, name: &str, taxonomy: Option<&str>) -> Self {
        self.entities.insert(
            name.to_string(),
            EntityConfig {
                taxonomy: taxonomy.map(str::to_string),
            },
        );
        self
    }

    pub fn from_toml(input: &str) -> Result<Self, RoutingError> {
        let catalog: EntityCatalog =
            toml::from_str(input).map_err(|e| RoutingError::ConfigParse(e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<(), RoutingError> {
        for (name, config) in &self.entities {
            if name.is_empty() || name.starts_with("from_") || name.starts_with("to_") {
                return Err(RoutingError::ConfigValidation(format!(
                    "entity name '{name}' is empty or collides with range parameters"
                )));
            }
            if config.taxonomy.as_deref().is_some_and(str::is_empty) {
                return Err(RoutingError::ConfigValidation(format!(
                    "entity '{name}': taxonomy must not be empty"
                )));
            }
        }
        Ok(())
    }

    /// Fail fast when a classified entity names a taxonomy the registry lacks.
    pub fn check_registry(&self, registry: &ClassificationRegistry) -> Result<(), RoutingError> {
        for config in self.entities.values() {
            if let Some(taxonomy) = &config.taxonomy {
                registry.get(taxonomy)?;
            }
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// Taxonomy of a known entity; `Ok(None)` for unclassified entities.
    pub fn taxonomy(&self, name: &str) -> Result<Option<&str>, RoutingError> {
        self.entities
            .get(name)
            .map(|c| c.taxonomy.as_deref())
            .ok_or_else(|| self.unknown(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub(crate) fn unknown(&self, name: &str) -> RoutingError {
        RoutingError::UnknownEntity {
            name: name.to_string(),
            expected: self.names().collect::<Vec<_>>().join(", "),
        }
    }
}
