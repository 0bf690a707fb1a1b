//! Cache for the descriptive (popup) content of single entities.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use quick_xml::escape::escape;
use std::sync::Arc;
use tracing::{debug, warn};

use super::registry::Sweepable;
use crate::error::{OverpassError, Result};
use crate::models::{EntityKind, OsmId};

const OSM_BROWSE_URL: &str = "https://www.openstreetmap.org";

/// Fetches the descriptive content of one entity
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch_content(&self, kind: EntityKind, id: OsmId) -> Result<String>;
}

#[derive(Debug, Clone)]
struct ContentEntry {
    content: String,
    expires_at: DateTime<Utc>,
}

/// Content per entity, kept for `ttl` after a successful fetch and for
/// `retry_ttl` after a failed one
pub struct ContentCache {
    fetcher: Arc<dyn ContentFetcher>,
    ttl: chrono::Duration,
    retry_ttl: chrono::Duration,
    entries: DashMap<(EntityKind, OsmId), ContentEntry>,
}

impl ContentCache {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        ttl: chrono::Duration,
        retry_ttl: chrono::Duration,
    ) -> Self {
        Self {
            fetcher,
            ttl,
            retry_ttl,
            entries: DashMap::new(),
        }
    }

    /// Cached content, or freshly fetched content, or a fallback page
    pub async fn get_content(&self, id: OsmId, kind: EntityKind) -> String {
        let key = (kind, id);

        if let Some(entry) = self.entries.get(&key) {
            if entry.expires_at > Utc::now() {
                return entry.content.clone();
            }
        }

        debug!("Requesting content of {} {}", kind, id);
        let entry = match self.fetcher.fetch_content(kind, id).await {
            Ok(content) => ContentEntry {
                content,
                expires_at: Utc::now() + self.ttl,
            },
            Err(e) => {
                warn!("Couldn't load content of {} {}: {}", kind, id, e);
                ContentEntry {
                    content: fallback_content(kind, id, &e),
                    expires_at: Utc::now() + self.retry_ttl,
                }
            }
        };

        let content = entry.content.clone();
        self.entries.insert(key, entry);
        content
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Sweepable for ContentCache {
    fn name(&self) -> &str {
        "content"
    }

    fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    fn clear(&self) {
        self.entries.clear();
    }
}

fn fallback_content(kind: EntityKind, id: OsmId, error: &OverpassError) -> String {
    let link = format!("{}/{}/{}", OSM_BROWSE_URL, kind, id);
    let message = error.to_string();

    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<html xmlns=\"http://www.w3.org/1999/xhtml\">",
            "<head><title>{kind} {id}</title></head>",
            "<body><p>Couldn't load the description of {kind} {id}: {message}</p>",
            "<p><a href=\"{link}\" target=\"_blank\">{link}</a></p></body></html>"
        ),
        kind = kind,
        id = id,
        message = escape(message.as_str()),
        link = link
    )
}
