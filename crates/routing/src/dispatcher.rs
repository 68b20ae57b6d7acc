//! Level-keyed handler dispatch.
//!
//! A request names a primary entity and id (`/location/6`) plus flat query
//! parameters. Every classified entity is resolved to the level of its id;
//! the sorted `(entity, level)` pairs form a [`RouteKey`] that selects one
//! registered handler. Handlers are registered once at startup; the
//! dispatcher is read-only afterwards.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use facets_engine::ClassificationRegistry;

use crate::catalog::EntityCatalog;
use crate::error::RoutingError;
use crate::params::{extract_route_params, EntityValue, RouteParams};
use crate::route_key::RouteKey;

pub type Handler<R> = Box<dyn Fn(&RouteRequest) -> R + Send + Sync>;

/// Everything a handler gets to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequest {
    pub primary: String,
    pub primary_id: i64,
    pub primary_level: Option<String>,
    pub key: RouteKey,
    /// Parsed query values, the primary entity included.
    pub params: RouteParams,
}

pub struct RouteDispatcher<R> {
    registry: Arc<ClassificationRegistry>,
    catalog: EntityCatalog,
    routes: FxHashMap<String, FxHashMap<RouteKey, Handler<R>>>,
}

impl<R> RouteDispatcher<R> {
    pub fn new(registry: Arc<ClassificationRegistry>, catalog: EntityCatalog) -> Self {
        Self {
            registry,
            catalog,
            routes: FxHashMap::default(),
        }
    }

    pub fn catalog(&self) -> &EntityCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &ClassificationRegistry {
        &self.registry
    }

    /// Register `handler` for `primary` under `key`.
    ///
    /// Every entity in the key must be known; classified entities need a
    /// level of their taxonomy, unclassified ones need `None`. The key must
    /// mention the primary entity itself.
    pub fn register<F>(&mut self, primary: &str, key: RouteKey, handler: F) -> Result<(), RoutingError>
    where
        F: Fn(&RouteRequest) -> R + Send + Sync + 'static,
    {
        self.catalog.taxonomy(primary)?;
        if key.level(primary).is_none() {
            return Err(RoutingError::InvalidRouteKey(format!(
                "key {key} does not mention primary entity '{primary}'"
            )));
        }
        for (entity, level) in key.pairs() {
            match (self.catalog.taxonomy(entity)?, level) {
                (Some(taxonomy), Some(level)) => {
                    self.registry.get(taxonomy)?.taxonomy().level_rank(level)?;
                }
                (None, None) => {}
                (Some(taxonomy), None) => {
                    return Err(RoutingError::InvalidRouteKey(format!(
                        "entity '{entity}' is classified by '{taxonomy}' and needs a level"
                    )));
                }
                (None, Some(level)) => {
                    return Err(RoutingError::InvalidRouteKey(format!(
                        "entity '{entity}' is unclassified and cannot have level '{level}'"
                    )));
                }
            }
        }

        let scope = self.routes.entry(primary.to_string()).or_default();
        if scope.contains_key(&key) {
            return Err(RoutingError::DuplicateRoute {
                primary: primary.to_string(),
                key: key.to_string(),
            });
        }
        tracing::debug!(primary, %key, "registered route");
        scope.insert(key, Box::new(handler));
        Ok(())
    }

    /// Registered keys for `primary`, sorted.
    pub fn routes_for(&self, primary: &str) -> Vec<&RouteKey> {
        let mut keys: Vec<_> = self
            .routes
            .get(primary)
            .map(|scope| scope.keys().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Level of each bound entity, sorted into a key.
    pub fn resolve_route_key(&self, params: &RouteParams) -> Result<RouteKey, RoutingError> {
        let mut pairs = Vec::with_capacity(params.len());
        for (entity, value) in &params.entities {
            let level = match self.catalog.taxonomy(entity)? {
                None => None,
                Some(taxonomy) => Some(self.level_of_value(entity, taxonomy, value)?),
            };
            pairs.push((entity.as_str(), level));
        }
        RouteKey::new(pairs)
    }

    fn level_of_value<'a>(
        &'a self,
        entity: &str,
        taxonomy: &str,
        value: &EntityValue,
    ) -> Result<&'a str, RoutingError> {
        match *value {
            EntityValue::Single(id) => Ok(self.registry.level_of(taxonomy, id)?),
            EntityValue::Range { from, to } => {
                let from_level = self.registry.level_of(taxonomy, from)?;
                let to_level = self.registry.level_of(taxonomy, to)?;
                if from_level != to_level {
                    return Err(RoutingError::MixedRangeLevels {
                        entity: entity.to_string(),
                        from_level: from_level.to_string(),
                        to_level: to_level.to_string(),
                    });
                }
                Ok(from_level)
            }
        }
    }

    /// Parse `query`, resolve levels and invoke the matching handler.
    pub fn handle<K, V>(
        &self,
        primary: &str,
        primary_id: i64,
        query: impl IntoIterator<Item = (K, V)>,
    ) -> Result<R, RoutingError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let primary_level = match self.catalog.taxonomy(primary)? {
            Some(taxonomy) => Some(self.registry.level_of(taxonomy, primary_id)?.to_string()),
            None => None,
        };

        let mut params = extract_route_params(query, &self.catalog)?;
        if params.entities.contains_key(primary) {
            return Err(RoutingError::DuplicateParameter {
                name: primary.to_string(),
            });
        }
        params
            .entities
            .insert(primary.to_string(), EntityValue::Single(primary_id));

        let key = self.resolve_route_key(&params)?;
        let handler = self
            .routes
            .get(primary)
            .and_then(|scope| scope.get(&key))
            .ok_or_else(|| RoutingError::NoRouteForLevelCombination {
                primary: primary.to_string(),
                key: key.to_string(),
            })?;

        tracing::debug!(primary, primary_id, %key, "dispatching");
        let request = RouteRequest {
            primary: primary.to_string(),
            primary_id,
            primary_level,
            key,
            params,
        };
        Ok(handler(&request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facets_engine::{Classification, ClassificationRecord, Taxonomy};

    fn registry() -> Arc<ClassificationRegistry> {
        let locations = Classification::load(
            Taxonomy::builtin("location").unwrap(),
            vec![
                ClassificationRecord::new(1, "COL", "country", None),
                ClassificationRecord::new(6, "11", "department", Some(1)),
                ClassificationRecord::new(7, "08", "department", Some(1)),
                ClassificationRecord::new(40, "11001", "municipality", Some(6)),
            ],
        )
        .unwrap();
        Arc::new(ClassificationRegistry::new().with(locations).unwrap())
    }

    fn catalog() -> EntityCatalog {
        EntityCatalog::default()
            .with_entity("location", Some("location"))
            .with_entity("year", None)
    }

    fn key(pairs: &[(&str, Option<&str>)]) -> RouteKey {
        RouteKey::new(pairs.iter().copied()).unwrap()
    }

    #[test]
    fn registration_validates_levels() {
        let mut d: RouteDispatcher<()> = RouteDispatcher::new(registry(), catalog());
        let err = d
            .register("location", key(&[("location", Some("galaxy"))]), |_| ())
            .unwrap_err();
        assert!(matches!(err, RoutingError::Classification(_)));

        let err = d.register("location", key(&[("location", None)]), |_| ()).unwrap_err();
        assert!(matches!(err, RoutingError::InvalidRouteKey(_)));

        let err = d
            .register(
                "location",
                key(&[("location", Some("department")), ("year", Some("annual"))]),
                |_| (),
            )
            .unwrap_err();
        assert!(matches!(err, RoutingError::InvalidRouteKey(_)));

        let err = d.register("location", key(&[("year", None)]), |_| ()).unwrap_err();
        assert!(matches!(err, RoutingError::InvalidRouteKey(_)));

        let err = d
            .register("planet", key(&[("planet", None)]), |_| ())
            .unwrap_err();
        assert!(matches!(err, RoutingError::UnknownEntity { .. }));
    }

    #[test]
    fn duplicate_registration() {
        let mut d: RouteDispatcher<()> = RouteDispatcher::new(registry(), catalog());
        d.register("location", key(&[("location", Some("department"))]), |_| ())
            .unwrap();
        let err = d
            .register("location", key(&[("location", Some("department"))]), |_| ())
            .unwrap_err();
        assert!(matches!(err, RoutingError::DuplicateRoute { .. }));
        assert_eq!(d.routes_for("location").len(), 1);
        assert!(d.routes_for("year").is_empty());
    }

    #[test]
    fn range_levels_must_agree() {
        let d: RouteDispatcher<()> = RouteDispatcher::new(registry(), catalog());
        let params = RouteParams {
            entities: [("location".to_string(), EntityValue::Range { from: 6, to: 40 })]
                .into_iter()
                .collect(),
        };
        let err = d.resolve_route_key(&params).unwrap_err();
        assert_eq!(
            err,
            RoutingError::MixedRangeLevels {
                entity: "location".into(),
                from_level: "department".into(),
                to_level: "municipality".into(),
            }
        );

        let params = RouteParams {
            entities: [("location".to_string(), EntityValue::Range { from: 6, to: 7 })]
                .into_iter()
                .collect(),
        };
        assert_eq!(
            d.resolve_route_key(&params).unwrap(),
            key(&[("location", Some("department"))])
        );
    }

    #[test]
    fn primary_repeated_in_query() {
        let mut d = RouteDispatcher::new(registry(), catalog());
        d.register("location", key(&[("location", Some("department"))]), |_| 1)
            .unwrap();
        let err = d.handle("location", 6, [("location", "7")]).unwrap_err();
        assert!(matches!(err, RoutingError::DuplicateParameter { .. }));
    }

    #[test]
    fn unknown_primary_id() {
        let d: RouteDispatcher<()> = RouteDispatcher::new(registry(), catalog());
        let err = d.handle("location", 999, Vec::<(&str, &str)>::new()).unwrap_err();
        assert!(matches!(err, RoutingError::Classification(_)));
    }
}
