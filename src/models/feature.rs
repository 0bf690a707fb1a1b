//! Converted features: typed geometry plus attribute fields.

use geo::{Geometry, Intersects, LineString, Point, Polygon};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::entity::{EntityKind, OsmId};
use super::field::{Field, FieldValue};

/// Geometry type served by a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    /// One feature per node
    Point,
    /// One feature per way that is not a closed ring
    Polyline,
    /// One feature per way that is a closed ring
    Polygon,
}

impl GeometryKind {
    /// Entity kind that has to be requested to build this geometry
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            GeometryKind::Point => EntityKind::Node,
            GeometryKind::Polyline | GeometryKind::Polygon => EntityKind::Way,
        }
    }

    /// Geometry built from an entity kind when nothing else is requested.
    /// Relation members are rendered as lines.
    pub fn from_entity_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Node => GeometryKind::Point,
            EntityKind::Way | EntityKind::Relation => GeometryKind::Polyline,
        }
    }
}

impl std::fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeometryKind::Point => write!(f, "point"),
            GeometryKind::Polyline => write!(f, "polyline"),
            GeometryKind::Polygon => write!(f, "polygon"),
        }
    }
}

/// Geometry of a converted feature
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureGeometry {
    /// Point (x = lon, y = lat) with optional elevation from the `ele` tag
    Point {
        point: Point<f64>,
        elevation: Option<f64>,
    },
    Polyline(LineString<f64>),
    Polygon(Polygon<f64>),
}

impl FeatureGeometry {
    pub fn kind(&self) -> GeometryKind {
        match self {
            FeatureGeometry::Point { .. } => GeometryKind::Point,
            FeatureGeometry::Polyline(_) => GeometryKind::Polyline,
            FeatureGeometry::Polygon(_) => GeometryKind::Polygon,
        }
    }

    /// Exact intersection test against a filter geometry
    pub fn intersects(&self, filter: &Geometry<f64>) -> bool {
        filter.intersects(&self.to_geometry())
    }

    pub fn to_geometry(&self) -> Geometry<f64> {
        match self {
            FeatureGeometry::Point { point, .. } => Geometry::Point(*point),
            FeatureGeometry::Polyline(line) => Geometry::LineString(line.clone()),
            FeatureGeometry::Polygon(polygon) => Geometry::Polygon(polygon.clone()),
        }
    }
}

/// A feature ready to be served: original entity id, geometry and fields
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedFeature {
    pub id: OsmId,
    pub entity_kind: EntityKind,
    pub geometry: FeatureGeometry,
    /// Standard fields first, then tag fields ordered by key
    pub fields: Vec<(Arc<Field>, FieldValue)>,
}

impl ConvertedFeature {
    /// Look up a field value by field name
    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field.name == name)
            .map(|(_, value)| value)
    }

    /// Look up the field identity by name
    pub fn field(&self, name: &str) -> Option<&Arc<Field>> {
        self.fields
            .iter()
            .find(|(field, _)| field.name == name)
            .map(|(field, _)| field)
    }
}
