//! Shared helpers for unit tests: a scripted transport and OSM XML builders.

use async_trait::async_trait;
use geo::{coord, Rect};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::Write;
use std::time::Duration;
use url::Url;

use crate::error::{OverpassError, Result};
use crate::models::{EntityData, GeographicEntity};
use crate::overpass::{Transport, TransportResponse};

/// Transport answering from a queue of canned responses and recording every URL.
/// An exhausted queue answers with a network error.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<TransportResponse>>>,
    urls: Mutex<Vec<String>>,
    latency: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request only after `latency` has passed
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn push_ok(&self, body: &[u8]) {
        self.push_status(200, body);
    }

    pub fn push_status(&self, status: u16, body: &[u8]) {
        self.responses.lock().push_back(Ok(TransportResponse {
            status,
            body: body.to_vec(),
        }));
    }

    pub fn push_error(&self, message: &str) {
        self.responses
            .lock()
            .push_back(Err(OverpassError::Network(message.to_string())));
    }

    pub fn calls(&self) -> usize {
        self.urls.lock().len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }

    /// Bounding boxes of every request, in request order
    pub fn requested_bboxes(&self) -> Vec<Option<Rect<f64>>> {
        self.urls()
            .iter()
            .map(|url| bbox_in_script(&decoded_script(url)))
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &Url) -> Result<TransportResponse> {
        self.urls.lock().push(url.to_string());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(OverpassError::Network("no scripted response".to_string())))
    }
}

/// The `data` query parameter of a request URL
pub fn decoded_script(url: &str) -> String {
    let url = Url::parse(url).unwrap();
    url.query_pairs()
        .find(|(key, _)| key == "data")
        .map(|(_, value)| value.into_owned())
        .unwrap()
}

/// Parse the first `(south,west,north,east)` group of a script
pub fn bbox_in_script(script: &str) -> Option<Rect<f64>> {
    script.match_indices('(').find_map(|(start, _)| {
        let rest = &script[start + 1..];
        let inner = &rest[..rest.find(')')?];
        let values: Vec<f64> = inner
            .split(',')
            .map(|v| v.parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .ok()?;
        match values[..] {
            [south, west, north, east] => Some(Rect::new(
                coord! { x: west, y: south },
                coord! { x: east, y: north },
            )),
            _ => None,
        }
    })
}

/// Render entities the way the Overpass API does with `out meta`
pub fn to_osm_xml(entities: &[GeographicEntity]) -> Vec<u8> {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<osm version=\"0.6\">\n");

    for entity in entities {
        let meta = format!(
            "id=\"{}\" version=\"{}\" timestamp=\"{}\" changeset=\"{}\" user=\"{}\"",
            entity.id,
            entity.meta.version,
            entity.meta.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
            entity.meta.changeset,
            entity.meta.user
        );
        let (element, children) = match &entity.data {
            EntityData::Node { lat, lon } => (format!("node {} lat=\"{}\" lon=\"{}\"", meta, lat, lon), String::new()),
            EntityData::Way { node_refs } => (
                format!("way {}", meta),
                node_refs.iter().map(|r| format!("<nd ref=\"{}\"/>", r)).collect(),
            ),
            EntityData::Relation { members } => (
                format!("relation {}", meta),
                members
                    .iter()
                    .map(|m| format!("<member type=\"{}\" ref=\"{}\" role=\"{}\"/>", m.kind, m.id, m.role))
                    .collect(),
            ),
        };
        let tags: String = entity
            .tags
            .iter()
            .map(|(k, v)| format!("<tag k=\"{}\" v=\"{}\"/>", k, v))
            .collect();
        let name = element.split(' ').next().unwrap_or_default().to_string();
        let _ = writeln!(xml, "<{}>{}{}</{}>", element, children, tags, name);
    }

    xml.push_str("</osm>\n");
    xml.into_bytes()
}
