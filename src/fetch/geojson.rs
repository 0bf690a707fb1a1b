//! GeoJSON rendering of converted features.

use geo::{Coord, LineString};
use serde_json::{json, Map, Value};

use overpass_store::models::FeatureGeometry;
use overpass_store::ConvertedFeature;

pub fn feature_collection<F: AsRef<ConvertedFeature>>(features: &[F]) -> Value {
    json!({
        "type": "FeatureCollection",
        "features": features.iter().map(|f| feature(f.as_ref())).collect::<Vec<_>>(),
    })
}

fn feature(feature: &ConvertedFeature) -> Value {
    let properties: Map<String, Value> = feature
        .fields
        .iter()
        .map(|(field, value)| {
            (
                field.name.clone(),
                serde_json::to_value(value).unwrap_or(Value::Null),
            )
        })
        .collect();

    json!({
        "type": "Feature",
        "id": format!("{}/{}", feature.entity_kind, feature.id),
        "geometry": geometry(&feature.geometry),
        "properties": properties,
    })
}

fn geometry(geometry: &FeatureGeometry) -> Value {
    match geometry {
        FeatureGeometry::Point { point, elevation } => {
            let mut coordinates = vec![point.x(), point.y()];
            coordinates.extend(elevation);
            json!({ "type": "Point", "coordinates": coordinates })
        }
        FeatureGeometry::Polyline(line) => {
            json!({ "type": "LineString", "coordinates": positions(line) })
        }
        FeatureGeometry::Polygon(polygon) => json!({
            "type": "Polygon",
            "coordinates": std::iter::once(polygon.exterior())
                .chain(polygon.interiors())
                .map(positions)
                .collect::<Vec<_>>(),
        }),
    }
}

fn positions(line: &LineString<f64>) -> Vec<[f64; 2]> {
    line.coords().map(|Coord { x, y }| [*x, *y]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;
    use overpass_store::models::{EntityKind, FieldValue};
    use std::sync::Arc;

    #[test]
    fn test_point_with_elevation() {
        let feature = Arc::new(ConvertedFeature {
            id: 5,
            entity_kind: EntityKind::Node,
            geometry: FeatureGeometry::Point {
                point: Point::new(7.0, 51.0),
                elevation: Some(120.5),
            },
            fields: vec![(
                Arc::new(overpass_store::models::Field::tag("name")),
                FieldValue::String("Summit".to_string()),
            )],
        });

        let collection = feature_collection(&[feature]);
        let first = &collection["features"][0];
        assert_eq!(first["id"], "node/5");
        assert_eq!(first["geometry"]["coordinates"], json!([7.0, 51.0, 120.5]));
        assert_eq!(first["properties"]["name"], "Summit");
    }
}
