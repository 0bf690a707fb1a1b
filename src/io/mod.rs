//! Local OSM snapshot files.

mod osm_file;

pub use osm_file::{CompressionMethod, OsmFile, OsmFileFormat};
