//! Conversion of raw entities into typed features.
//!
//! Nodes become coordinates first, ways are then resolved against those
//! coordinates in their own reference order, and finally every entity gets its
//! attribute fields. Which features come out depends on the requested
//! [`GeometryKind`]; ids are passed through unchanged.

use geo::{Coord, LineString, Point, Polygon};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::field::{
    CHANGESET_FIELD, LAST_CHANGE_FIELD, OBJECT_ID_FIELD, USER_FIELD, VERSION_FIELD,
};
use crate::models::{
    ConvertedFeature, EntityData, EntityKind, EntityMap, FeatureGeometry, Field, FieldRegistry,
    FieldValue, GeographicEntity, GeometryKind, OsmId,
};

/// Tag holding the elevation of a node
const ELEVATION_TAG: &str = "ele";

/// Smallest closed ring: three distinct vertices plus the repeated first one
const MIN_RING_LEN: usize = 4;

#[derive(Debug, Clone, Copy)]
struct Position {
    coord: Coord<f64>,
    elevation: Option<f64>,
}

/// Convert with a registry private to this call
pub fn convert(kind: GeometryKind, entities: &EntityMap) -> BTreeMap<OsmId, ConvertedFeature> {
    let mut registry = FieldRegistry::new();
    convert_with_registry(kind, entities, &mut registry)
}

/// Convert, creating tag fields in (and reusing them from) `registry`
pub fn convert_with_registry(
    kind: GeometryKind,
    entities: &EntityMap,
    registry: &mut FieldRegistry,
) -> BTreeMap<OsmId, ConvertedFeature> {
    let points = resolve_nodes(entities);
    let lines = resolve_ways(entities, &points);

    let mut fields: BTreeMap<OsmId, Vec<(Arc<Field>, FieldValue)>> = entities
        .values()
        .map(|entity| (entity.id, extract_fields(entity, registry)))
        .collect();
    let mut take_fields = |id: OsmId| fields.remove(&id).unwrap_or_default();

    let mut result = BTreeMap::new();

    match kind {
        GeometryKind::Point => {
            debug!("Return all nodes. ({})", points.len());
            for (id, position) in points {
                let geometry = FeatureGeometry::Point {
                    point: Point::from(position.coord),
                    elevation: position.elevation,
                };
                result.insert(id, feature(id, EntityKind::Node, geometry, take_fields(id)));
            }
        }
        GeometryKind::Polyline => {
            for (id, coords) in lines {
                if coords.len() < 2 || is_closed(&coords) {
                    continue;
                }
                let geometry = FeatureGeometry::Polyline(LineString::new(coords));
                result.insert(id, feature(id, EntityKind::Way, geometry, take_fields(id)));
            }
            debug!("Return all open ways. ({})", result.len());
        }
        GeometryKind::Polygon => {
            for (id, coords) in lines {
                if coords.len() < MIN_RING_LEN || !is_closed(&coords) {
                    continue;
                }
                let geometry = FeatureGeometry::Polygon(Polygon::new(LineString::new(coords), vec![]));
                result.insert(id, feature(id, EntityKind::Way, geometry, take_fields(id)));
            }
            debug!("Return all closed ways as polygons. ({})", result.len());
        }
    }

    result
}

/// First and last coordinate are exactly equal
pub fn is_closed(coords: &[Coord<f64>]) -> bool {
    match (coords.first(), coords.last()) {
        (Some(first), Some(last)) => first == last,
        _ => false,
    }
}

fn feature(
    id: OsmId,
    entity_kind: EntityKind,
    geometry: FeatureGeometry,
    fields: Vec<(Arc<Field>, FieldValue)>,
) -> ConvertedFeature {
    ConvertedFeature {
        id,
        entity_kind,
        geometry,
        fields,
    }
}

fn resolve_nodes(entities: &EntityMap) -> BTreeMap<OsmId, Position> {
    entities
        .values()
        .filter_map(|entity| match entity.data {
            EntityData::Node { lat, lon } => Some((
                entity.id,
                Position {
                    coord: Coord { x: lon, y: lat },
                    elevation: parse_elevation(entity),
                },
            )),
            _ => None,
        })
        .collect()
}

fn parse_elevation(entity: &GeographicEntity) -> Option<f64> {
    let raw = entity.tag(ELEVATION_TAG)?;
    match raw.trim().parse::<f64>() {
        Ok(elevation) => {
            debug!("Added elevation {} to node {}", elevation, entity.id);
            Some(elevation)
        }
        Err(e) => {
            warn!(
                "Couldn't parse elevation \"{}\" of node {}: {}",
                raw, entity.id, e
            );
            None
        }
    }
}

fn resolve_ways(
    entities: &EntityMap,
    points: &BTreeMap<OsmId, Position>,
) -> BTreeMap<OsmId, Vec<Coord<f64>>> {
    entities
        .values()
        .filter_map(|entity| match &entity.data {
            EntityData::Way { node_refs } => {
                let coords: Vec<Coord<f64>> = node_refs
                    .iter()
                    .filter_map(|node_id| {
                        let position = points.get(node_id);
                        if position.is_none() {
                            debug!("Way {} references unknown node {}", entity.id, node_id);
                        }
                        position.map(|p| p.coord)
                    })
                    .collect();
                Some((entity.id, coords))
            }
            _ => None,
        })
        .collect()
}

fn extract_fields(
    entity: &GeographicEntity,
    registry: &mut FieldRegistry,
) -> Vec<(Arc<Field>, FieldValue)> {
    let meta = &entity.meta;
    let mut fields = vec![
        (Arc::clone(&OBJECT_ID_FIELD), FieldValue::Integer(entity.id)),
        (Arc::clone(&USER_FIELD), FieldValue::String(meta.user.clone())),
        (
            Arc::clone(&VERSION_FIELD),
            FieldValue::Integer(i64::from(meta.version)),
        ),
        (Arc::clone(&LAST_CHANGE_FIELD), FieldValue::Date(meta.timestamp)),
        (
            Arc::clone(&CHANGESET_FIELD),
            FieldValue::Double(meta.changeset as f64),
        ),
    ];

    for (key, value) in &entity.tags {
        fields.push((registry.field_for(key), FieldValue::String(value.clone())));
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityMeta, RelationMember};
    use chrono::{TimeZone, Utc};

    fn entities(list: Vec<GeographicEntity>) -> EntityMap {
        list.into_iter().map(|e| (e.id, e)).collect()
    }

    fn street() -> EntityMap {
        let meta = EntityMeta {
            version: 4,
            changeset: 987654321,
            user: "mapper".to_string(),
            timestamp: Utc.with_ymd_and_hms(2020, 5, 1, 10, 0, 0).unwrap(),
        };
        entities(vec![
            GeographicEntity::node(1, 51.000, 7.000),
            GeographicEntity::node(2, 51.000, 7.001),
            GeographicEntity::way(10, vec![1, 2])
                .with_tag("highway", "residential")
                .with_meta(meta),
        ])
    }

    fn triangle() -> EntityMap {
        entities(vec![
            GeographicEntity::node(1, 51.0, 7.0),
            GeographicEntity::node(2, 51.0, 7.1),
            GeographicEntity::node(3, 51.1, 7.1),
            GeographicEntity::way(20, vec![1, 2, 3, 1]).with_tag("building", "yes"),
        ])
    }

    #[test]
    fn test_open_way_as_polyline() {
        let features = convert(GeometryKind::Polyline, &street());
        assert_eq!(features.len(), 1);

        let feature = &features[&10];
        assert_eq!(feature.id, 10);
        assert_eq!(feature.entity_kind, EntityKind::Way);
        match &feature.geometry {
            FeatureGeometry::Polyline(line) => {
                assert_eq!(line.0.len(), 2);
                assert_eq!(line.0[0], Coord { x: 7.000, y: 51.000 });
                assert_eq!(line.0[1], Coord { x: 7.001, y: 51.000 });
            }
            other => panic!("expected polyline, got {:?}", other),
        }

        assert_eq!(
            feature.value("highway"),
            Some(&FieldValue::String("residential".to_string()))
        );
        let osm_fields = feature
            .fields
            .iter()
            .filter(|(field, _)| field.name.starts_with("osm:"))
            .count();
        assert_eq!(osm_fields, 4);
        assert_eq!(feature.value("OBJECTID"), Some(&FieldValue::Integer(10)));
        assert_eq!(feature.value("osm:version"), Some(&FieldValue::Integer(4)));
        assert_eq!(
            feature.value("osm:changeset"),
            Some(&FieldValue::Double(987654321.0))
        );
        assert_eq!(
            feature.value("osm:user"),
            Some(&FieldValue::String("mapper".to_string()))
        );
        assert_eq!(feature.fields.len(), 6);
    }

    #[test]
    fn test_open_way_is_not_a_polygon() {
        assert!(convert(GeometryKind::Polygon, &street()).is_empty());
    }

    #[test]
    fn test_closed_way_as_polygon() {
        let features = convert(GeometryKind::Polygon, &triangle());
        assert_eq!(features.len(), 1);

        match &features[&20].geometry {
            FeatureGeometry::Polygon(polygon) => {
                let ring = &polygon.exterior().0;
                assert_eq!(ring.len(), 4);
                assert_eq!(ring.first(), ring.last());
                assert!(polygon.interiors().is_empty());
            }
            other => panic!("expected polygon, got {:?}", other),
        }
    }

    #[test]
    fn test_closed_way_is_not_a_polyline() {
        assert!(convert(GeometryKind::Polyline, &triangle()).is_empty());
    }

    #[test]
    fn test_points() {
        let features = convert(GeometryKind::Point, &triangle());
        assert_eq!(features.len(), 3);
        assert!(features.values().all(|f| f.entity_kind == EntityKind::Node));
        assert_eq!(
            features[&2].geometry,
            FeatureGeometry::Point {
                point: Point::new(7.1, 51.0),
                elevation: None
            }
        );
    }

    #[test]
    fn test_elevation_is_best_effort() {
        let input = entities(vec![
            GeographicEntity::node(1, 51.0, 7.0).with_tag("ele", "312.5"),
            GeographicEntity::node(2, 51.0, 7.1).with_tag("ele", "about 300 m"),
        ]);
        let features = convert(GeometryKind::Point, &input);

        assert!(matches!(
            features[&1].geometry,
            FeatureGeometry::Point { elevation: Some(e), .. } if e == 312.5
        ));
        assert!(matches!(
            features[&2].geometry,
            FeatureGeometry::Point { elevation: None, .. }
        ));
    }

    #[test]
    fn test_unresolved_references_are_skipped() {
        let input = entities(vec![
            GeographicEntity::node(1, 51.0, 7.0),
            GeographicEntity::node(3, 51.2, 7.2),
            GeographicEntity::way(30, vec![1, 2, 3]),
        ]);
        let features = convert(GeometryKind::Polyline, &input);

        match &features[&30].geometry {
            FeatureGeometry::Polyline(line) => assert_eq!(line.0.len(), 2),
            other => panic!("expected polyline, got {:?}", other),
        }
    }

    #[test]
    fn test_ring_closure_is_exact() {
        let input = entities(vec![
            GeographicEntity::node(1, 51.0, 7.0),
            GeographicEntity::node(2, 51.0, 7.1),
            GeographicEntity::node(3, 51.1, 7.1),
            GeographicEntity::node(4, 51.0, 7.000_000_001),
            GeographicEntity::way(40, vec![1, 2, 3, 4]),
        ]);

        assert!(convert(GeometryKind::Polygon, &input).is_empty());
        assert_eq!(convert(GeometryKind::Polyline, &input).len(), 1);
    }

    #[test]
    fn test_shared_tag_key_shares_field() {
        let input = entities(vec![
            GeographicEntity::node(1, 51.0, 7.0).with_tag("amenity", "cafe"),
            GeographicEntity::node(2, 51.0, 7.1).with_tag("amenity", "bench"),
        ]);
        let features = convert(GeometryKind::Point, &input);

        let a = features[&1].field("amenity").unwrap();
        let b = features[&2].field("amenity").unwrap();
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn test_registry_collects_keys_of_every_entity() {
        let input = entities(vec![
            GeographicEntity::node(1, 51.0, 7.0).with_tag("barrier", "gate"),
            GeographicEntity::relation(
                5,
                vec![RelationMember {
                    kind: EntityKind::Node,
                    id: 1,
                    role: String::new(),
                }],
            )
            .with_tag("route", "bus"),
        ]);
        let mut registry = FieldRegistry::new();
        let features = convert_with_registry(GeometryKind::Point, &input, &mut registry);

        assert_eq!(features.len(), 1);
        assert!(registry.get("barrier").is_some());
        assert!(registry.get("route").is_some());
    }

    #[test]
    fn test_conversion_is_deterministic() {
        let mut input = triangle();
        input.extend(street().into_iter().filter(|(id, _)| *id == 10));

        for kind in [
            GeometryKind::Point,
            GeometryKind::Polyline,
            GeometryKind::Polygon,
        ] {
            let first = convert(kind, &input);
            let second = convert(kind, &input);
            assert_eq!(first, second);
            assert_eq!(format!("{:?}", first), format!("{:?}", second));
        }
    }
}
