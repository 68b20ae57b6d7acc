//! Classification taxonomies and the process-wide registry.
//!
//! A [`Classification`] is one code hierarchy (products, locations, ...)
//! loaded once from external records and never mutated afterwards. The
//! [`ClassificationRegistry`] groups them by taxonomy name and is shared
//! read-only (typically behind an `Arc`) by the pipeline and the router.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::ClassificationError;

pub type ClassificationId = i64;

/// Level definitions of the taxonomies shipped with the platform, most
/// general level first.
const BUILTIN_TAXONOMIES: &[(&str, &[&str])] = &[
    ("product", &["section", "2digit", "4digit"]),
    ("location", &["country", "department", "msa", "municipality"]),
    ("industry", &["section", "division", "group", "class"]),
    ("country", &["region", "country"]),
    (
        "occupation",
        &["major_group", "minor_group", "broad_occupation", "detailed_occupation"],
    ),
    ("livestock", &["level0", "level1"]),
    ("agproduct", &["level0", "level1", "level2", "level3"]),
];

// ---------------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------------

/// A taxonomy name plus its ordered aggregation levels.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Taxonomy {
    pub name: String,
    pub levels: Vec<String>,
}

impl Taxonomy {
    pub fn new<S: Into<String>>(name: &str, levels: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.to_string(),
            levels: levels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn builtin(name: &str) -> Option<Self> {
        BUILTIN_TAXONOMIES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(n, levels)| Self::new(n, levels.iter().copied()))
    }

    /// Position of `level` in the ordering; larger is more specific.
    pub fn level_rank(&self, level: &str) -> Result<usize, ClassificationError> {
        self.levels
            .iter()
            .position(|l| l == level)
            .ok_or_else(|| ClassificationError::UnknownLevel {
                taxonomy: self.name.clone(),
                level: level.to_string(),
            })
    }

    fn validate(&self) -> Result<(), ClassificationError> {
        let invalid = |reason: &str| ClassificationError::InvalidTaxonomy {
            taxonomy: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.levels.is_empty() {
            return Err(invalid("at least one level is required"));
        }
        for (i, level) in self.levels.iter().enumerate() {
            if self.levels[..i].contains(level) {
                return Err(invalid(&format!("level '{level}' is listed twice")));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Records + nodes
// ---------------------------------------------------------------------------

/// One raw classification entry as delivered by the loader.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClassificationRecord {
    pub id: ClassificationId,
    pub code: String,
    pub level: String,
    #[serde(default)]
    pub parent_id: Option<ClassificationId>,
    /// Localized names and descriptions, e.g. `name_en`. Carried, not interpreted.
    #[serde(default)]
    pub display: BTreeMap<String, String>,
}

impl ClassificationRecord {
    pub fn new(id: ClassificationId, code: &str, level: &str, parent_id: Option<ClassificationId>) -> Self {
        Self {
            id,
            code: code.to_string(),
            level: level.to_string(),
            parent_id,
            display: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationNode {
    pub id: ClassificationId,
    pub code: String,
    pub level: String,
    pub parent_id: Option<ClassificationId>,
    pub display: BTreeMap<String, String>,
    #[serde(skip)]
    rank: usize,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Classification {
    taxonomy: Taxonomy,
    nodes: FxHashMap<ClassificationId, ClassificationNode>,
    /// Code index per level, indexed by level rank.
    by_code: Vec<FxHashMap<String, ClassificationId>>,
    children: FxHashMap<ClassificationId, Vec<ClassificationId>>,
}

impl Classification {
    /// Build a classification, rejecting structurally invalid input:
    /// unknown levels, duplicate ids or codes, missing parents, and
    /// children that are not strictly more specific than their parent.
    pub fn load(
        taxonomy: Taxonomy,
        records: impl IntoIterator<Item = ClassificationRecord>,
    ) -> Result<Self, ClassificationError> {
        taxonomy.validate()?;

        let mut nodes = FxHashMap::default();
        let mut by_code: Vec<FxHashMap<String, ClassificationId>> =
            vec![FxHashMap::default(); taxonomy.levels.len()];

        for record in records {
            let rank = taxonomy.level_rank(&record.level)?;
            if nodes.contains_key(&record.id) {
                return Err(ClassificationError::DuplicateId {
                    taxonomy: taxonomy.name.clone(),
                    id: record.id,
                });
            }
            if by_code[rank].insert(record.code.clone(), record.id).is_some() {
                return Err(ClassificationError::DuplicateCode {
                    taxonomy: taxonomy.name.clone(),
                    code: record.code,
                    level: record.level,
                });
            }
            nodes.insert(
                record.id,
                ClassificationNode {
                    id: record.id,
                    code: record.code,
                    level: record.level,
                    parent_id: record.parent_id,
                    display: record.display,
                    rank,
                },
            );
        }

        // Strictly increasing rank along every parent edge also rules out cycles.
        let mut children: FxHashMap<ClassificationId, Vec<ClassificationId>> = FxHashMap::default();
        for node in nodes.values() {
            let Some(parent_id) = node.parent_id else {
                continue;
            };
            let parent = nodes.get(&parent_id).ok_or_else(|| ClassificationError::MissingParent {
                taxonomy: taxonomy.name.clone(),
                id: node.id,
                parent_id,
            })?;
            if parent.rank >= node.rank {
                return Err(ClassificationError::LevelOrder {
                    taxonomy: taxonomy.name.clone(),
                    id: node.id,
                    level: node.level.clone(),
                    parent_id,
                    parent_level: parent.level.clone(),
                });
            }
            children.entry(parent_id).or_default().push(node.id);
        }
        for ids in children.values_mut() {
            ids.sort_unstable();
        }

        tracing::debug!(
            taxonomy = %taxonomy.name,
            nodes = nodes.len(),
            "classification loaded"
        );

        Ok(Self {
            taxonomy,
            nodes,
            by_code,
            children,
        })
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub fn name(&self) -> &str {
        &self.taxonomy.name
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn resolve(&self, code: &str, level: &str) -> Result<ClassificationId, ClassificationError> {
        let rank = self.taxonomy.level_rank(level)?;
        self.lookup(rank, code).ok_or_else(|| ClassificationError::UnknownCode {
            taxonomy: self.taxonomy.name.clone(),
            code: code.to_string(),
            level: level.to_string(),
        })
    }

    /// Code lookup by precomputed level rank; used on per-row hot paths.
    pub(crate) fn lookup(&self, rank: usize, code: &str) -> Option<ClassificationId> {
        self.by_code.get(rank)?.get(code).copied()
    }

    pub fn node(&self, id: ClassificationId) -> Result<&ClassificationNode, ClassificationError> {
        self.nodes.get(&id).ok_or_else(|| ClassificationError::NotFound {
            taxonomy: self.taxonomy.name.clone(),
            id,
        })
    }

    pub fn level_of(&self, id: ClassificationId) -> Result<&str, ClassificationError> {
        self.node(id).map(|n| n.level.as_str())
    }

    /// All nodes at `level`, in identifier order.
    pub fn nodes_at_level(&self, level: &str) -> Result<Vec<&ClassificationNode>, ClassificationError> {
        let rank = self.taxonomy.level_rank(level)?;
        let mut nodes: Vec<_> = self.nodes.values().filter(|n| n.rank == rank).collect();
        nodes.sort_unstable_by_key(|n| n.id);
        Ok(nodes)
    }

    pub fn children(&self, id: ClassificationId) -> Result<Vec<&ClassificationNode>, ClassificationError> {
        self.node(id)?;
        Ok(self
            .children
            .get(&id)
            .map(|ids| ids.iter().filter_map(|c| self.nodes.get(c)).collect())
            .unwrap_or_default())
    }

    /// Parent chain of `id`, nearest first.
    pub fn ancestors(&self, id: ClassificationId) -> Result<Vec<&ClassificationNode>, ClassificationError> {
        let mut chain = Vec::new();
        let mut current = self.node(id)?;
        while let Some(parent_id) = current.parent_id {
            current = self.node(parent_id)?;
            chain.push(current);
        }
        Ok(chain)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Read-only set of classifications keyed by taxonomy name.
#[derive(Debug, Clone, Default)]
pub struct ClassificationRegistry {
    classifications: FxHashMap<String, Classification>,
}

impl ClassificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, classification: Classification) -> Result<(), ClassificationError> {
        let name = classification.name().to_string();
        if self.classifications.contains_key(&name) {
            return Err(ClassificationError::DuplicateTaxonomy(name));
        }
        self.classifications.insert(name, classification);
        Ok(())
    }

    pub fn with(mut self, classification: Classification) -> Result<Self, ClassificationError> {
        self.insert(classification)?;
        Ok(self)
    }

    pub fn get(&self, taxonomy: &str) -> Result<&Classification, ClassificationError> {
        self.classifications
            .get(taxonomy)
            .ok_or_else(|| ClassificationError::UnknownTaxonomy(taxonomy.to_string()))
    }

    pub fn resolve(
        &self,
        taxonomy: &str,
        code: &str,
        level: &str,
    ) -> Result<ClassificationId, ClassificationError> {
        self.get(taxonomy)?.resolve(code, level)
    }

    pub fn level_of(&self, taxonomy: &str, id: ClassificationId) -> Result<&str, ClassificationError> {
        self.get(taxonomy)?.level_of(id)
    }

    /// Registered taxonomy names, sorted.
    pub fn taxonomies(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.classifications.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
