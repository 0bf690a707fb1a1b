//! Decoding of OSM XML (as returned by the Overpass API and found in `.osm` snapshots).

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::BufRead;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::{OverpassError, Result};
use crate::models::{
    EntityData, EntityKind, EntityMap, EntityMeta, GeographicEntity, RelationMember,
};

/// Decode every node, way and relation of an OSM XML document
pub fn decode_entities<R: BufRead>(input: R) -> Result<EntityMap> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut entities = EntityMap::new();
    let mut current: Option<GeographicEntity> = None;
    let mut in_remark = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"node" | b"way" | b"relation" => current = Some(start_entity(&e)?),
                b"tag" | b"nd" | b"member" => {
                    if let Some(entity) = current.as_mut() {
                        add_child(entity, &e)?;
                    }
                }
                b"remark" => in_remark = true,
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"node" | b"way" | b"relation" => {
                    let entity = start_entity(&e)?;
                    entities.insert(entity.id, entity);
                }
                b"tag" | b"nd" | b"member" => {
                    if let Some(entity) = current.as_mut() {
                        add_child(entity, &e)?;
                    }
                }
                _ => {}
            },
            Event::Text(text) if in_remark => {
                warn!("Overpass API remark: {}", text.unescape()?);
            }
            Event::End(e) => match e.name().as_ref() {
                b"node" | b"way" | b"relation" => {
                    if let Some(entity) = current.take() {
                        entities.insert(entity.id, entity);
                    }
                }
                b"remark" => in_remark = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    debug!("Decoded {} entities", entities.len());
    Ok(entities)
}

fn start_entity(e: &BytesStart) -> Result<GeographicEntity> {
    let id = required(e, "id")?;

    let data = match e.name().as_ref() {
        b"node" => EntityData::Node {
            lat: required(e, "lat")?,
            lon: required(e, "lon")?,
        },
        b"way" => EntityData::Way {
            node_refs: Vec::new(),
        },
        _ => EntityData::Relation {
            members: Vec::new(),
        },
    };

    let defaults = EntityMeta::default();
    let meta = EntityMeta {
        version: optional(e, "version")?.unwrap_or(defaults.version),
        changeset: optional(e, "changeset")?.unwrap_or(defaults.changeset),
        user: attribute(e, "user")?.unwrap_or_default(),
        timestamp: match attribute(e, "timestamp")? {
            Some(raw) => parse_timestamp(&raw)?,
            None => defaults.timestamp,
        },
    };

    Ok(GeographicEntity {
        id,
        data,
        tags: Default::default(),
        meta,
    })
}

fn add_child(entity: &mut GeographicEntity, e: &BytesStart) -> Result<()> {
    match (e.name().as_ref(), &mut entity.data) {
        (b"tag", _) => {
            let key = attribute(e, "k")?.unwrap_or_default();
            let value = attribute(e, "v")?.unwrap_or_default();
            entity.tags.insert(key, value);
        }
        (b"nd", EntityData::Way { node_refs }) => node_refs.push(required(e, "ref")?),
        (b"member", EntityData::Relation { members }) => {
            let member_type = attribute(e, "type")?.unwrap_or_default();
            match EntityKind::from_member_type(&member_type) {
                Some(kind) => members.push(RelationMember {
                    kind,
                    id: required(e, "ref")?,
                    role: attribute(e, "role")?.unwrap_or_default(),
                }),
                None => debug!(
                    "Skipping member of unknown type {} in relation {}",
                    member_type, entity.id
                ),
            }
        }
        _ => {}
    }
    Ok(())
}

fn attribute(e: &BytesStart, name: &str) -> Result<Option<String>> {
    let attr = e
        .try_get_attribute(name)
        .map_err(quick_xml::Error::from)?;

    match attr {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn optional<T: FromStr>(e: &BytesStart, name: &str) -> Result<Option<T>> {
    match attribute(e, name)? {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| OverpassError::Parse(format!("invalid {} attribute: {}", name, raw))),
        None => Ok(None),
    }
}

fn required<T: FromStr>(e: &BytesStart, name: &str) -> Result<T> {
    optional(e, name)?.ok_or_else(|| {
        OverpassError::Parse(format!(
            "missing {} attribute on <{}>",
            name,
            String::from_utf8_lossy(e.name().as_ref())
        ))
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| OverpassError::Parse(format!("invalid timestamp {}: {}", raw, e)))
}
