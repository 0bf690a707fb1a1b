//! Entity sources behind a feature store.

use async_trait::async_trait;
use geo::Rect;
use tracing::debug;

use super::layer::TagFilter;
use crate::error::{OverpassError, Result};
use crate::io::OsmFile;
use crate::models::{EntityKind, EntityMap};
use crate::overpass::OverpassClient;

/// How a store decides whether it already holds the requested area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageMode {
    /// Track fetched envelopes and fetch what is not covered yet
    Regional,
    /// Any cached feature counts as full coverage
    LoadOnce,
}

/// Something that yields raw entities for an envelope
#[async_trait]
pub trait FeatureSource: Send + Sync {
    /// Load entities inside `bbox`, or everything for `None`
    async fn load(&self, bbox: Option<&Rect<f64>>) -> Result<EntityMap>;

    fn coverage_mode(&self) -> CoverageMode;
}

/// Entities fetched from the Overpass API with a fixed script
pub struct OverpassSource {
    client: OverpassClient,
    script: String,
}

impl OverpassSource {
    pub fn new(client: OverpassClient, script: impl Into<String>) -> Self {
        Self {
            client,
            script: script.into(),
        }
    }

    pub fn script(&self) -> &str {
        &self.script
    }
}

#[async_trait]
impl FeatureSource for OverpassSource {
    async fn load(&self, bbox: Option<&Rect<f64>>) -> Result<EntityMap> {
        self.client.fetch_entities(&self.script, bbox).await
    }

    fn coverage_mode(&self) -> CoverageMode {
        CoverageMode::Regional
    }
}

/// Entities read from a local snapshot, optionally narrowed by a tag filter.
///
/// The filter only applies to entities of `kind`; nodes are always kept so
/// that ways can still be resolved.
pub struct FileSource {
    file: OsmFile,
    filter: Option<TagFilter>,
    kind: EntityKind,
}

impl FileSource {
    pub fn new(file: OsmFile, filter: Option<TagFilter>, kind: EntityKind) -> Self {
        Self { file, filter, kind }
    }
}

#[async_trait]
impl FeatureSource for FileSource {
    async fn load(&self, _bbox: Option<&Rect<f64>>) -> Result<EntityMap> {
        let file = self.file.clone();

        let mut entities = tokio::task::spawn_blocking(move || file.read_entities())
            .await
            .map_err(|e| OverpassError::Io(std::io::Error::other(e)))??;

        if let Some(filter) = &self.filter {
            let before = entities.len();
            entities.retain(|_, entity| {
                (entity.kind() == EntityKind::Node && self.kind != EntityKind::Node)
                    || (entity.kind() == self.kind && filter.matches(entity))
            });
            debug!(
                "Tag filter on {} kept {} of {} entities",
                filter.key,
                entities.len(),
                before
            );
        }

        Ok(entities)
    }

    fn coverage_mode(&self) -> CoverageMode {
        CoverageMode::LoadOnce
    }
}
