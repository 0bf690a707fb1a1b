//! Raw OSM entities as decoded from an Overpass response or a snapshot file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// OSM object identifier
pub type OsmId = i64;

/// Entities of one retrieval, keyed by id.
///
/// Node, way and relation ids are separate namespaces in OSM, so a way can
/// replace a node with the same number here. Overpass responses are keyed the
/// same way; the collision is kept.
pub type EntityMap = BTreeMap<OsmId, GeographicEntity>;

/// Type of OSM object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Node,
    Way,
    Relation,
}

impl EntityKind {
    /// Keyword used for this kind inside an Overpass QL statement
    pub fn query_keyword(&self) -> &'static str {
        match self {
            EntityKind::Node => "node",
            EntityKind::Way => "way",
            EntityKind::Relation => "rel",
        }
    }

    /// Parse the `type` attribute of a relation member
    pub fn from_member_type(value: &str) -> Option<Self> {
        match value {
            "node" => Some(EntityKind::Node),
            "way" => Some(EntityKind::Way),
            "relation" => Some(EntityKind::Relation),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Node => write!(f, "node"),
            EntityKind::Way => write!(f, "way"),
            EntityKind::Relation => write!(f, "relation"),
        }
    }
}

/// Edit metadata carried by every entity (`out meta`)
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMeta {
    pub version: i32,
    pub changeset: i64,
    pub user: String,
    pub timestamp: DateTime<Utc>,
}

impl Default for EntityMeta {
    fn default() -> Self {
        Self {
            version: 0,
            changeset: 0,
            user: String::new(),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// Member reference of a relation
#[derive(Debug, Clone, PartialEq)]
pub struct RelationMember {
    pub kind: EntityKind,
    pub id: OsmId,
    pub role: String,
}

/// Kind-specific payload of an entity
#[derive(Debug, Clone, PartialEq)]
pub enum EntityData {
    Node { lat: f64, lon: f64 },
    Way { node_refs: Vec<OsmId> },
    Relation { members: Vec<RelationMember> },
}

/// A single OSM object. Immutable once decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct GeographicEntity {
    pub id: OsmId,
    pub data: EntityData,
    pub tags: BTreeMap<String, String>,
    pub meta: EntityMeta,
}

impl GeographicEntity {
    /// Create a node at the given latitude/longitude
    pub fn node(id: OsmId, lat: f64, lon: f64) -> Self {
        Self::with_data(id, EntityData::Node { lat, lon })
    }

    /// Create a way referencing the given node ids, in order
    pub fn way(id: OsmId, node_refs: Vec<OsmId>) -> Self {
        Self::with_data(id, EntityData::Way { node_refs })
    }

    /// Create a relation with the given members
    pub fn relation(id: OsmId, members: Vec<RelationMember>) -> Self {
        Self::with_data(id, EntityData::Relation { members })
    }

    fn with_data(id: OsmId, data: EntityData) -> Self {
        Self {
            id,
            data,
            tags: BTreeMap::new(),
            meta: EntityMeta::default(),
        }
    }

    /// Add a tag (builder style)
    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    /// Replace the edit metadata (builder style)
    pub fn with_meta(mut self, meta: EntityMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn kind(&self) -> EntityKind {
        match self.data {
            EntityData::Node { .. } => EntityKind::Node,
            EntityData::Way { .. } => EntityKind::Way,
            EntityData::Relation { .. } => EntityKind::Relation,
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(|v| v.as_str())
    }
}
