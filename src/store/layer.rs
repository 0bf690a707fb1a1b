//! Layer definitions: what a store serves and where its entities come from.

use hashbrown::HashSet;
use regex::Regex;

use crate::io::OsmFile;
use crate::models::{GeographicEntity, GeometryKind};

/// A named layer served by one [`FeatureStore`](super::FeatureStore)
#[derive(Debug, Clone)]
pub struct LayerDefinition {
    pub name: String,
    pub geometry: GeometryKind,
    pub source: LayerSource,
}

/// Where a layer's entities come from
#[derive(Debug, Clone)]
pub enum LayerSource {
    /// Literal Overpass QL script containing `{{bbox}}`
    Script(String),
    /// Tag filter clauses for a generated script
    TagFilters(Vec<String>),
    /// Local snapshot, read once
    File {
        file: OsmFile,
        filter: Option<TagFilter>,
    },
}

/// Tag predicate applied to snapshot entities before conversion.
///
/// An entity matches if it carries `key` and, when `values` is not empty, one
/// of the values. With a delimiter pattern the tag value is split first, so
/// `route=bus;tram` matches `tram` for the delimiter `;`.
#[derive(Debug, Clone)]
pub struct TagFilter {
    pub key: String,
    pub values: HashSet<String>,
    pub delimiter: Option<Regex>,
}

impl TagFilter {
    pub fn matches(&self, entity: &GeographicEntity) -> bool {
        let Some(raw) = entity.tag(&self.key) else {
            return false;
        };

        if self.values.is_empty() {
            return true;
        }

        match &self.delimiter {
            Some(delimiter) => delimiter
                .split(raw)
                .map(str::trim)
                .any(|value| self.values.contains(value)),
            None => self.values.contains(raw),
        }
    }
}
