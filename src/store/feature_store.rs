//! Spatially cached features of one layer.
//!
//! A store remembers which envelopes it has fetched (coverage regions) and
//! only asks its source for the part of a request that is not covered yet.
//! Fetch failures never reach the caller; they are logged and whatever is
//! cached is served instead.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use geo::{Area, BooleanOps, BoundingRect, Geometry, MultiPolygon, Rect};
use hashbrown::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::converter::convert;
use super::registry::Sweepable;
use super::source::{CoverageMode, FeatureSource};
use crate::error::Result;
use crate::models::{ConvertedFeature, CoverageRegion, EnvelopeKey, GeometryKind, OsmId};

/// Pieces with less area than this are numerical noise of the difference
const AREA_EPSILON: f64 = 1e-12;

/// How often an uncovered remainder may be split before it is fetched as a whole
const MAX_SPLIT_DEPTH: usize = 4;

pub type FeatureMap = HashMap<OsmId, Arc<ConvertedFeature>>;

pub struct FeatureStore {
    name: String,
    geometry: GeometryKind,
    source: Box<dyn FeatureSource>,
    ttl: chrono::Duration,
    features: DashMap<OsmId, Arc<ConvertedFeature>>,
    coverage: DashMap<EnvelopeKey, CoverageRegion>,
    /// Serializes the remainder / fetch / merge sequence
    fetch_lock: Mutex<()>,
}

impl FeatureStore {
    pub fn new(
        name: impl Into<String>,
        geometry: GeometryKind,
        source: Box<dyn FeatureSource>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            name: name.into(),
            geometry,
            source,
            ttl,
            features: DashMap::new(),
            coverage: DashMap::new(),
            fetch_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> GeometryKind {
        self.geometry
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    pub fn coverage_count(&self) -> usize {
        self.coverage.len()
    }

    /// Features intersecting `filter`, fetching uncovered parts first.
    ///
    /// Without a filter nothing is fetched and every cached feature is returned.
    pub async fn get_features(&self, filter: Option<&Geometry<f64>>) -> FeatureMap {
        let Some(filter) = filter else {
            return self.all_features();
        };

        if let Err(e) = self.ensure_covered(filter).await {
            warn!(
                "Couldn't update layer {}, serving cached features: {}",
                self.name, e
            );
        }

        self.features
            .iter()
            .filter(|entry| entry.value().geometry.intersects(filter))
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    fn all_features(&self) -> FeatureMap {
        self.features
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    async fn ensure_covered(&self, filter: &Geometry<f64>) -> Result<()> {
        let _guard = self.fetch_lock.lock().await;

        if self.source.coverage_mode() == CoverageMode::LoadOnce {
            if self.features.is_empty() {
                self.fetch(None).await?;
            }
            return Ok(());
        }

        let Some(bounds) = filter.bounding_rect() else {
            return Ok(());
        };

        if self.is_covered(&bounds) {
            debug!("Layer {} already covers {:?}", self.name, bounds);
            return Ok(());
        }

        let Some(area) = filter_area(filter) else {
            // Points, lines and other zero-area filters
            return self.fetch(Some(bounds)).await;
        };

        let mut pending = vec![(area, 0)];
        while let Some((area, depth)) = pending.pop() {
            let pieces = self.remainder(&area);

            match pieces.len() {
                0 => debug!("Layer {} has nothing left to fetch", self.name),
                1 => self.fetch(Some(pieces[0])).await?,
                n if depth < MAX_SPLIT_DEPTH => {
                    debug!("Split uncovered remainder into {} pieces", n);
                    pending.extend(
                        pieces
                            .into_iter()
                            .map(|rect| (MultiPolygon::new(vec![rect.to_polygon()]), depth + 1)),
                    );
                }
                _ => {
                    let envelope = MultiPolygon::new(pieces.iter().map(|r| r.to_polygon()).collect())
                        .bounding_rect();
                    if let Some(envelope) = envelope {
                        self.fetch(Some(envelope)).await?;
                    }
                }
            }
        }

        Ok(())
    }

    fn is_covered(&self, rect: &Rect<f64>) -> bool {
        let now = Utc::now();
        self.coverage
            .iter()
            .any(|entry| !entry.is_expired(now) && entry.contains(rect))
    }

    /// Bounding envelopes of the disjoint parts of `area` not covered by an unexpired region
    fn remainder(&self, area: &MultiPolygon<f64>) -> Vec<Rect<f64>> {
        let now = Utc::now();
        let mut remainder = area.clone();

        for entry in self.coverage.iter() {
            if entry.is_expired(now) {
                continue;
            }
            remainder = remainder.difference(&MultiPolygon::new(vec![entry.envelope.to_polygon()]));
            if remainder.0.is_empty() {
                break;
            }
        }

        remainder
            .0
            .iter()
            .filter(|piece| piece.unsigned_area() > AREA_EPSILON)
            .filter_map(|piece| piece.bounding_rect())
            .collect()
    }

    async fn fetch(&self, envelope: Option<Rect<f64>>) -> Result<()> {
        info!(
            "Fetching {} features of layer {} in {:?}",
            self.geometry, self.name, envelope
        );

        let entities = self.source.load(envelope.as_ref()).await?;
        let converted = convert(self.geometry, &entities);
        debug!(
            "Converted {} of {} entities for layer {}",
            converted.len(),
            entities.len(),
            self.name
        );

        for (id, feature) in converted {
            self.features.insert(id, Arc::new(feature));
        }

        if let Some(envelope) = envelope {
            self.coverage.insert(
                EnvelopeKey::from(&envelope),
                CoverageRegion::new(envelope, Utc::now(), self.ttl),
            );
        }

        Ok(())
    }
}

impl Sweepable for FeatureStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.coverage.len();
        self.coverage.retain(|_, region| !region.is_expired(now));
        before - self.coverage.len()
    }

    fn clear(&self) {
        self.features.clear();
        self.coverage.clear();
    }
}

/// The filter as an area, if it has one
fn filter_area(filter: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    let area = match filter {
        Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon.clone()]),
        Geometry::MultiPolygon(polygons) => polygons.clone(),
        Geometry::Rect(rect) => MultiPolygon::new(vec![rect.to_polygon()]),
        Geometry::Triangle(triangle) => MultiPolygon::new(vec![triangle.to_polygon()]),
        _ => return None,
    };

    (area.unsigned_area() > AREA_EPSILON).then_some(area)
}
