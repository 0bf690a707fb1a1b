//! OSM snapshot file: path, encoding and compression.

use bzip2::read::BzDecoder;
use flate2::read::MultiGzDecoder;
use osmpbfreader::{OsmId as PbfId, OsmObj, OsmPbfReader};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{OverpassError, Result};
use crate::models::{EntityKind, EntityMap, GeographicEntity, RelationMember};
use crate::overpass::decode_entities;

/// Encoding of an OSM file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsmFileFormat {
    /// Plain OSM XML
    #[default]
    Xml,
    /// Protocolbuffer Binary Format
    Pbf,
}

/// Compression applied on top of the encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMethod {
    #[default]
    None,
    Gzip,
    Bzip2,
}

/// A file containing OpenStreetMap data
#[derive(Debug, Clone, PartialEq)]
pub struct OsmFile {
    path: PathBuf,
    format: OsmFileFormat,
    compression: CompressionMethod,
}

impl OsmFile {
    /// Describe an existing file. Fails with `FileMissing` if `path` doesn't exist.
    pub fn open<P: AsRef<Path>>(
        path: P,
        format: OsmFileFormat,
        compression: CompressionMethod,
    ) -> Result<Self> {
        let file = Self {
            path: path.as_ref().to_path_buf(),
            format,
            compression,
        };
        file.ensure_exists()?;
        Ok(file)
    }

    /// Fails with `FileMissing` if the file is gone
    pub fn ensure_exists(&self) -> Result<()> {
        if self.path.exists() {
            Ok(())
        } else {
            Err(OverpassError::FileMissing(self.path.clone()))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> OsmFileFormat {
        self.format
    }

    pub fn compression(&self) -> CompressionMethod {
        self.compression
    }

    /// Read every entity in the file
    pub fn read_entities(&self) -> Result<EntityMap> {
        info!(
            "Reading {:?} ({:?}) file {}",
            self.format,
            self.compression,
            self.path.display()
        );

        let file = File::open(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => OverpassError::FileMissing(self.path.clone()),
            _ => OverpassError::Io(e),
        })?;

        let reader: Box<dyn Read> = match self.compression {
            CompressionMethod::None => Box::new(file),
            CompressionMethod::Gzip => Box::new(MultiGzDecoder::new(file)),
            CompressionMethod::Bzip2 => Box::new(BzDecoder::new(file)),
        };

        let entities = match self.format {
            OsmFileFormat::Xml => decode_entities(BufReader::new(reader))?,
            OsmFileFormat::Pbf => read_pbf(reader)?,
        };

        info!("Read {} entities from {}", entities.len(), self.path.display());
        Ok(entities)
    }
}

/// PBF blocks decoded by `osmpbfreader` carry no edit metadata, so entities
/// get the default metadata.
fn read_pbf<R: Read>(reader: R) -> Result<EntityMap> {
    let mut pbf = OsmPbfReader::new(reader);
    let mut entities = EntityMap::new();

    for obj in pbf.iter() {
        let obj = obj?;

        let mut entity = match &obj {
            OsmObj::Node(node) => GeographicEntity::node(node.id.0, node.lat(), node.lon()),
            OsmObj::Way(way) => {
                GeographicEntity::way(way.id.0, way.nodes.iter().map(|n| n.0).collect())
            }
            OsmObj::Relation(rel) => {
                let members = rel
                    .refs
                    .iter()
                    .map(|r| {
                        let (kind, id) = match r.member {
                            PbfId::Node(id) => (EntityKind::Node, id.0),
                            PbfId::Way(id) => (EntityKind::Way, id.0),
                            PbfId::Relation(id) => (EntityKind::Relation, id.0),
                        };
                        RelationMember {
                            kind,
                            id,
                            role: r.role.to_string(),
                        }
                    })
                    .collect();
                GeographicEntity::relation(rel.id.0, members)
            }
        };

        for (key, value) in obj.tags().iter() {
            entity.tags.insert(key.to_string(), value.to_string());
        }

        entities.insert(entity.id, entity);
    }

    debug!("Decoded {} PBF entities", entities.len());
    Ok(entities)
}
