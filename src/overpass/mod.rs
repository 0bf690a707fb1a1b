//! Access to the Overpass API.
//!
//! Scripts are templated (timeout, output directive, bounding box), submitted
//! as a URL-encoded `data` parameter and retried on throttling. Responses are
//! decoded from OSM XML into [`GeographicEntity`](crate::models::GeographicEntity) maps.

mod client;
pub mod response;
pub mod script;
pub mod transform;
mod transport;

pub use client::{OverpassClient, MAX_ATTEMPTS};
pub use response::decode_entities;
pub use script::{generate_script, BBOX_PLACEHOLDER};
pub use transform::{CoordinateTransform, Wgs84};
pub use transport::{HttpTransport, Transport, TransportResponse};
