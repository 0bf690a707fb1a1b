//! Feature stores, the content cache and the registry that owns them.

mod content;
pub mod converter;
mod feature_store;
mod layer;
mod registry;
mod source;

pub use content::{ContentCache, ContentFetcher};
pub use feature_store::{FeatureMap, FeatureStore};
pub use layer::{LayerDefinition, LayerSource, TagFilter};
pub use registry::{StoreRegistry, Sweepable, SWEEP_FACTOR};
pub use source::{CoverageMode, FeatureSource, FileSource, OverpassSource};
