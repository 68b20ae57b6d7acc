use std::fmt;

use serde::Serialize;

use crate::error::RoutingError;

/// Canonical `(entity, level)` combination identifying a handler.
///
/// Pairs are kept sorted by entity name, so two keys built from the same
/// pairs in any order compare equal. Unclassified entities carry `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RouteKey(Vec<(String, Option<String>)>);

impl RouteKey {
    pub fn new<E, L>(pairs: impl IntoIterator<Item = (E, Option<L>)>) -> Result<Self, RoutingError>
    where
        E: Into<String>,
        L: Into<String>,
    {
        let mut pairs: Vec<(String, Option<String>)> = pairs
            .into_iter()
            .map(|(entity, level)| (entity.into(), level.map(Into::into)))
            .collect();
        pairs.sort();
        if let Some(w) = pairs.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(RoutingError::InvalidRouteKey(format!(
                "entity '{}' appears more than once",
                w[0].0
            )));
        }
        Ok(Self(pairs))
    }

    pub fn pairs(&self) -> &[(String, Option<String>)] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn level(&self, entity: &str) -> Option<Option<&str>> {
        self.0
            .iter()
            .find(|(e, _)| e == entity)
            .map(|(_, level)| level.as_deref())
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, (entity, level)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "({entity}, {})", level.as_deref().unwrap_or("-"))?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_independent() {
        let a = RouteKey::new([("location", Some("department")), ("year", None)]).unwrap();
        let b = RouteKey::new([("year", None), ("location", Some("department"))]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "[(location, department), (year, -)]");
        assert_eq!(a.level("year"), Some(None));
        assert_eq!(a.level("location"), Some(Some("department")));
        assert_eq!(a.level("product"), None);
    }

    #[test]
    fn levels_distinguish_keys() {
        let a = RouteKey::new([("location", Some("department"))]).unwrap();
        let b = RouteKey::new([("location", Some("municipality"))]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn empty_key() {
        let key = RouteKey::new(Vec::<(&str, Option<&str>)>::new()).unwrap();
        assert!(key.is_empty());
        assert_eq!(key.to_string(), "[]");
    }

    #[test]
    fn rejects_repeated_entity() {
        let err = RouteKey::new([("location", Some("department")), ("location", Some("country"))])
            .unwrap_err();
        assert!(matches!(err, RoutingError::InvalidRouteKey(_)));
    }
}
