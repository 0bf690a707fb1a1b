//! Core data models shared by the client, the converter and the stores.

pub mod coverage;
pub mod entity;
pub mod feature;
pub mod field;

pub use coverage::{CoverageRegion, EnvelopeKey};
pub use entity::{
    EntityData, EntityKind, EntityMap, EntityMeta, GeographicEntity, OsmId, RelationMember,
};
pub use feature::{ConvertedFeature, FeatureGeometry, GeometryKind};
pub use field::{Field, FieldDomain, FieldRegistry, FieldType, FieldValue};
