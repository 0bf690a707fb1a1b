//! Coverage bookkeeping: which envelopes a store has already fetched.

use chrono::{DateTime, Duration, Utc};
use geo::Rect;

/// Bounding envelope plus the instant after which it no longer counts as fetched
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageRegion {
    pub envelope: Rect<f64>,
    pub expires_at: DateTime<Utc>,
}

impl CoverageRegion {
    /// Region fetched at `fetched_at`, valid for `ttl`
    pub fn new(envelope: Rect<f64>, fetched_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            envelope,
            expires_at: fetched_at + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether `other` lies completely inside this region's envelope
    pub fn contains(&self, other: &Rect<f64>) -> bool {
        let (outer_min, outer_max) = (self.envelope.min(), self.envelope.max());
        let (inner_min, inner_max) = (other.min(), other.max());

        outer_min.x <= inner_min.x
            && outer_min.y <= inner_min.y
            && outer_max.x >= inner_max.x
            && outer_max.y >= inner_max.y
    }
}

/// Hashable identity of an envelope (bit patterns of its corners)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvelopeKey([u64; 4]);

impl From<&Rect<f64>> for EnvelopeKey {
    fn from(rect: &Rect<f64>) -> Self {
        let (min, max) = (rect.min(), rect.max());
        Self([
            min.x.to_bits(),
            min.y.to_bits(),
            max.x.to_bits(),
            max.y.to_bits(),
        ])
    }
}
