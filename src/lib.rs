//! Overpass Store - spatially cached OpenStreetMap features from the Overpass API
//!
//! This library provides the retrieval client, the entity converter and the
//! feature and content caches used by the `fetch` binary.

pub mod config;
pub mod error;
pub mod io;
pub mod models;
pub mod overpass;
pub mod store;

#[cfg(test)]
mod test_support;

pub use error::{OverpassError, Result};
pub use models::{ConvertedFeature, EntityKind, GeometryKind, OsmId};
pub use store::{ContentCache, FeatureStore, StoreRegistry};
