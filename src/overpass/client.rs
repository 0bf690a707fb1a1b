//! Overpass API client: script templating, submission and bounded retry.

use async_trait::async_trait;
use geo::Rect;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use super::script::{
    apply_default_output, apply_timeout, format_bbox, has_placeholder, substitute_bbox,
    BBOX_PLACEHOLDER,
};
use super::transform::{transform_rect, CoordinateTransform, Wgs84};
use super::transport::{HttpTransport, Transport};
use super::response::decode_entities;
use crate::config::OverpassConfig;
use crate::error::{OverpassError, Result};
use crate::models::{EntityKind, EntityMap, OsmId};
use crate::store::ContentFetcher;

/// Total attempts for one script, including the first
pub const MAX_ATTEMPTS: u32 = 3;

const STATUS_BAD_REQUEST: u16 = 400;
const STATUS_TOO_MANY_REQUESTS: u16 = 429;
const STATUS_GATEWAY_TIMEOUT: u16 = 504;

/// Client for the Overpass `interpreter` endpoint
#[derive(Clone)]
pub struct OverpassClient {
    transport: Arc<dyn Transport>,
    transform: Arc<dyn CoordinateTransform>,
    interpreter_url: Url,
    retry_delay: Duration,
    request_timeout_s: u64,
}

impl std::fmt::Debug for OverpassClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverpassClient")
            .field("interpreter_url", &self.interpreter_url.as_str())
            .field("retry_delay", &self.retry_delay)
            .field("request_timeout_s", &self.request_timeout_s)
            .finish()
    }
}

impl OverpassClient {
    /// Create a client talking HTTP to the configured service
    pub fn new(config: &OverpassConfig) -> Result<Self> {
        let transport = HttpTransport::new(
            &config.user_agent,
            Duration::from_secs(config.request_timeout_s),
        )?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client on top of an arbitrary transport
    pub fn with_transport(
        config: &OverpassConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let interpreter_url = config.base_url()?.join("interpreter").map_err(|e| {
            OverpassError::Config(format!("invalid interpreter URL: {}", e))
        })?;

        Ok(Self {
            transport,
            transform: Arc::new(Wgs84),
            interpreter_url,
            retry_delay: config.retry_delay(),
            request_timeout_s: config.request_timeout_s,
        })
    }

    /// Replace the coordinate transform applied to request envelopes
    pub fn with_transform(mut self, transform: Arc<dyn CoordinateTransform>) -> Self {
        self.transform = transform;
        self
    }

    /// Template `script` and submit it, returning the raw response body.
    ///
    /// Fails with `InvalidScript` before any network access if the script has no
    /// `{{bbox}}` placeholder.
    pub async fn fetch(&self, script: &str, bbox: Option<&Rect<f64>>) -> Result<Vec<u8>> {
        let script = self.prepare_script(script, bbox)?;
        self.submit(&script).await
    }

    /// [`fetch`](Self::fetch) and decode the response into entities
    pub async fn fetch_entities(&self, script: &str, bbox: Option<&Rect<f64>>) -> Result<EntityMap> {
        let body = self.fetch(script, bbox).await?;
        decode_entities(body.as_slice())
    }

    /// Apply timeout, default output and bbox substitution, in that order
    pub fn prepare_script(&self, script: &str, bbox: Option<&Rect<f64>>) -> Result<String> {
        if !has_placeholder(script) {
            return Err(OverpassError::InvalidScript {
                placeholder: BBOX_PLACEHOLDER,
            });
        }

        let script = apply_timeout(script, self.request_timeout_s);
        let script = apply_default_output(&script);

        let bbox = match bbox {
            Some(rect) => {
                let rect = transform_rect(self.transform.as_ref(), rect).map_err(|e| {
                    error!("Couldn't transform requested envelope to WGS 84: {}", e);
                    e
                })?;
                let (min, max) = (rect.min(), rect.max());
                Some(format_bbox(min.y, min.x, max.y, max.x))
            }
            None => None,
        };

        Ok(substitute_bbox(&script, bbox.as_deref()))
    }

    fn query_url(&self, script: &str) -> Url {
        let mut url = self.interpreter_url.clone();
        url.query_pairs_mut().append_pair("data", script);
        url
    }

    async fn submit(&self, script: &str) -> Result<Vec<u8>> {
        let url = self.query_url(script);

        for attempt in 1..=MAX_ATTEMPTS {
            debug!(
                "Request features from the Overpass API (attempt {}/{}): {}",
                attempt, MAX_ATTEMPTS, script
            );

            let response = self.transport.get(&url).await.map_err(|e| {
                error!("An error occurred while requesting the Overpass API: {}", e);
                e
            })?;

            debug!("Overpass API returned HTTP status code {}", response.status);

            match response.status {
                STATUS_BAD_REQUEST => {
                    let diagnostic = String::from_utf8_lossy(&response.body).into_owned();
                    error!("Overpass API rejected the query: {}", diagnostic);
                    return Err(OverpassError::ServerRejected(diagnostic));
                }
                STATUS_TOO_MANY_REQUESTS | STATUS_GATEWAY_TIMEOUT => {
                    drop(response);
                    if attempt < MAX_ATTEMPTS {
                        debug!("Retry after {:?}", self.retry_delay);
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
                _ => return Ok(response.body),
            }
        }

        warn!("Overpass API kept throttling after {} attempts", MAX_ATTEMPTS);
        Err(OverpassError::Network("retries exhausted".to_string()))
    }
}

#[async_trait]
impl ContentFetcher for OverpassClient {
    async fn fetch_content(&self, kind: EntityKind, id: OsmId) -> Result<String> {
        let script = format!("[out:popup];{}({});out;", kind.query_keyword(), id);
        let response = self.transport.get(&self.query_url(&script)).await?;

        if response.status >= STATUS_BAD_REQUEST {
            return Err(OverpassError::Network(format!(
                "Overpass API returned HTTP status code {} for {} {}",
                response.status, kind, id
            )));
        }

        String::from_utf8(response.body)
            .map_err(|e| OverpassError::Parse(format!("content is not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{decoded_script, ScriptedTransport};
    use geo::coord;

    fn client(transport: &Arc<ScriptedTransport>) -> OverpassClient {
        let config = OverpassConfig {
            service_url: "http://overpass.test/api/".to_string(),
            retry_delay_ms: 1000,
            ..Default::default()
        };
        OverpassClient::with_transport(&config, transport.clone()).unwrap()
    }

    #[test]
    fn test_invalid_service_url_is_rejected() {
        let config = OverpassConfig {
            service_url: "ftp://overpass.test/api/".to_string(),
            ..Default::default()
        };
        let result = OverpassClient::with_transport(&config, Arc::new(ScriptedTransport::new()));
        assert!(matches!(result, Err(OverpassError::Config(_))));
    }

    #[test]
    fn test_prepare_script_order() {
        let transport = Arc::new(ScriptedTransport::new());
        let bbox = Rect::new(coord! { x: 7.0, y: 51.0 }, coord! { x: 7.5, y: 51.25 });

        let script = client(&transport)
            .prepare_script("node[amenity]({{bbox}});", Some(&bbox))
            .unwrap();
        assert_eq!(
            script,
            "[timeout:30];node[amenity](51,7,51.25,7.5);out meta;"
        );
    }

    #[test]
    fn test_prepare_script_unbounded() {
        let transport = Arc::new(ScriptedTransport::new());
        let script = client(&transport)
            .prepare_script("[timeout:5];way({{bbox}});out body;", None)
            .unwrap();
        assert_eq!(script, "[timeout:30];way;out body;");
    }

    #[tokio::test]
    async fn test_missing_placeholder_is_rejected_without_network() {
        let transport = Arc::new(ScriptedTransport::new());
        let result = client(&transport).fetch("node[shop];out meta;", None).await;

        assert!(matches!(result, Err(OverpassError::InvalidScript { .. })));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_transform_failure_is_reported() {
        let transport = Arc::new(ScriptedTransport::new());
        let bbox = Rect::new(coord! { x: 7.0, y: 51.0 }, coord! { x: 7.5, y: 95.0 });
        let result = client(&transport).fetch("node({{bbox}});", Some(&bbox)).await;

        assert!(matches!(result, Err(OverpassError::Transform(_))));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_script_is_url_encoded() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(b"<osm/>");

        client(&transport).fetch("node[name=\"A B\"]({{bbox}});", None).await.unwrap();

        let urls = transport.urls();
        assert!(urls[0].starts_with("http://overpass.test/api/interpreter?data="));
        assert_eq!(
            decoded_script(&urls[0]),
            "[timeout:30];node[name=\"A B\"];out meta;"
        );
    }

    #[tokio::test]
    async fn test_bad_request_is_server_rejected() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(400, b"line 1: parse error: unknown type \"nod\"");

        let result = client(&transport).fetch("nod({{bbox}});", None).await;
        match result {
            Err(OverpassError::ServerRejected(text)) => assert!(text.contains("unknown type")),
            other => panic!("expected ServerRejected, got {:?}", other),
        }
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_throttles_exhaust_retries() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(429, b"");
        transport.push_status(504, b"");
        transport.push_status(429, b"");

        let start = tokio::time::Instant::now();
        let result = client(&transport).fetch("node({{bbox}});", None).await;

        assert!(matches!(result, Err(OverpassError::Network(ref m)) if m == "retries exhausted"));
        assert_eq!(transport.calls(), 3);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(2000) && waited < Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_throttles_then_success() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(429, b"");
        transport.push_status(429, b"");
        transport.push_ok(b"<osm/>");

        let start = tokio::time::Instant::now();
        let body = client(&transport).fetch("node({{bbox}});", None).await.unwrap();

        assert_eq!(body, b"<osm/>");
        assert_eq!(transport.calls(), 3);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(2000) && waited < Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn test_other_statuses_are_success() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(302, b"moved");

        let body = client(&transport).fetch("node({{bbox}});", None).await.unwrap();
        assert_eq!(body, b"moved");
    }

    #[tokio::test]
    async fn test_transport_failure_is_network_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_error("connection refused");

        let result = client(&transport).fetch("node({{bbox}});", None).await;
        assert!(matches!(result, Err(OverpassError::Network(_))));
    }

    #[tokio::test]
    async fn test_fetch_content() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(b"<p>popup</p>");

        let content = client(&transport)
            .fetch_content(EntityKind::Relation, 62422)
            .await
            .unwrap();

        assert_eq!(content, "<p>popup</p>");
        assert_eq!(
            decoded_script(&transport.urls()[0]),
            "[out:popup];rel(62422);out;"
        );
    }

    #[tokio::test]
    async fn test_fetch_content_error_status() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(500, b"");

        let result = client(&transport).fetch_content(EntityKind::Node, 1).await;
        assert!(matches!(result, Err(OverpassError::Network(_))));
    }
}
