use std::collections::BTreeMap;

use serde::Serialize;

use crate::catalog::EntityCatalog;
use crate::error::RoutingError;

/// Value bound to one entity in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EntityValue {
    Single(i64),
    Range { from: i64, to: i64 },
}

/// Parsed query parameters, keyed by entity name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RouteParams {
    pub entities: BTreeMap<String, EntityValue>,
}

impl RouteParams {
    pub fn get(&self, entity: &str) -> Option<&EntityValue> {
        self.entities.get(entity)
    }

    pub fn single(&self, entity: &str) -> Option<i64> {
        match self.entities.get(entity)? {
            EntityValue::Single(v) => Some(*v),
            EntityValue::Range { .. } => None,
        }
    }

    pub fn range(&self, entity: &str) -> Option<(i64, i64)> {
        match self.entities.get(entity)? {
            EntityValue::Range { from, to } => Some((*from, *to)),
            EntityValue::Single(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[derive(Default)]
struct RangeHalves {
    from: Option<i64>,
    to: Option<i64>,
}

enum ParamName<'a> {
    From(&'a str),
    To(&'a str),
    Bare(&'a str),
}

fn classify(name: &str) -> ParamName<'_> {
    match (name.strip_prefix("from_"), name.strip_prefix("to_")) {
        (Some(entity), _) if !entity.is_empty() => ParamName::From(entity),
        (_, Some(entity)) if !entity.is_empty() => ParamName::To(entity),
        _ => ParamName::Bare(name),
    }
}

fn parse_int(name: &str, value: &str) -> Result<i64, RoutingError> {
    value.trim().parse().map_err(|_| RoutingError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
    })
}

/// Turn flat `key=value` query pairs into entity values.
///
/// `from_<entity>` / `to_<entity>` must come in pairs; every other key must
/// be a known entity; every value must be an integer.
pub fn extract_route_params<K, V>(
    query: impl IntoIterator<Item = (K, V)>,
    catalog: &EntityCatalog,
) -> Result<RouteParams, RoutingError>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut singles: BTreeMap<String, i64> = BTreeMap::new();
    let mut ranges: BTreeMap<String, RangeHalves> = BTreeMap::new();

    for (name, value) in query {
        let (name, value) = (name.as_ref(), value.as_ref());
        let duplicate = || RoutingError::DuplicateParameter { name: name.to_string() };

        match classify(name) {
            ParamName::From(entity) | ParamName::To(entity) if !catalog.contains(entity) => {
                return Err(catalog.unknown(entity));
            }
            ParamName::From(entity) => {
                let halves = ranges.entry(entity.to_string()).or_default();
                if halves.from.replace(parse_int(name, value)?).is_some() {
                    return Err(duplicate());
                }
            }
            ParamName::To(entity) => {
                let halves = ranges.entry(entity.to_string()).or_default();
                if halves.to.replace(parse_int(name, value)?).is_some() {
                    return Err(duplicate());
                }
            }
            ParamName::Bare(entity) => {
                if !catalog.contains(entity) {
                    return Err(catalog.unknown(entity));
                }
                if singles.insert(entity.to_string(), parse_int(name, value)?).is_some() {
                    return Err(duplicate());
                }
            }
        }
    }

    let mut entities: BTreeMap<String, EntityValue> =
        singles.into_iter().map(|(k, v)| (k, EntityValue::Single(v))).collect();

    for (entity, halves) in ranges {
        let (Some(from), Some(to)) = (halves.from, halves.to) else {
            return Err(RoutingError::IncompleteRange { entity });
        };
        if entities.contains_key(&entity) {
            return Err(RoutingError::DuplicateParameter { name: entity });
        }
        entities.insert(entity, EntityValue::Range { from, to });
    }

    Ok(RouteParams { entities })
}
