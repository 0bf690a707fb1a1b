//! Conversion of request envelopes into the service's reference system.

use geo::{Coord, Rect};

use crate::error::{OverpassError, Result};

/// Converts caller coordinates (x, y) into WGS 84 longitude/latitude
pub trait CoordinateTransform: Send + Sync {
    fn to_service_crs(&self, coord: Coord<f64>) -> Result<Coord<f64>>;
}

/// Identity transform for callers that already work in WGS 84 (x = lon, y = lat).
/// Rejects coordinates outside the valid lon/lat range.
#[derive(Debug, Clone, Copy, Default)]
pub struct Wgs84;

impl CoordinateTransform for Wgs84 {
    fn to_service_crs(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let valid = coord.x.is_finite()
            && coord.y.is_finite()
            && (-180.0..=180.0).contains(&coord.x)
            && (-90.0..=90.0).contains(&coord.y);

        if valid {
            Ok(coord)
        } else {
            Err(OverpassError::Transform(format!(
                "({}, {}) is not a WGS 84 longitude/latitude",
                coord.x, coord.y
            )))
        }
    }
}

/// Transform both corners of an envelope
pub fn transform_rect(transform: &dyn CoordinateTransform, rect: &Rect<f64>) -> Result<Rect<f64>> {
    let min = transform.to_service_crs(rect.min())?;
    let max = transform.to_service_crs(rect.max())?;
    Ok(Rect::new(min, max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    #[test]
    fn test_wgs84_passes_valid_coordinates() {
        let c = coord! { x: 7.0, y: 51.0 };
        assert_eq!(Wgs84.to_service_crs(c).unwrap(), c);
    }

    #[test]
    fn test_wgs84_rejects_out_of_range() {
        assert!(matches!(
            Wgs84.to_service_crs(coord! { x: 7.0, y: 95.0 }),
            Err(OverpassError::Transform(_))
        ));
        assert!(Wgs84.to_service_crs(coord! { x: f64::NAN, y: 0.0 }).is_err());
    }
}
