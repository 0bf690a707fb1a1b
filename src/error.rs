//! Error types for retrieval and snapshot reading.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the retrieval layer and the snapshot reader
#[derive(Error, Debug)]
pub enum OverpassError {
    /// Script has no `{{bbox}}` placeholder
    #[error("the script must contain one or more \"{placeholder}\"")]
    InvalidScript { placeholder: &'static str },

    /// The service reported a malformed query
    #[error("the Overpass API rejected the query: {0}")]
    ServerRejected(String),

    /// Transport failure or retries exhausted
    #[error("network error: {0}")]
    Network(String),

    /// Snapshot path does not exist
    #[error("couldn't find OSM file: {}", .0.display())]
    FileMissing(PathBuf),

    /// Coordinate conversion failed
    #[error("couldn't transform coordinates: {0}")]
    Transform(String),

    /// Entity stream couldn't be decoded
    #[error("couldn't decode OSM data: {0}")]
    Parse(String),

    /// Invalid service URL, layer definition or filter pattern
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OverpassError {
    /// Whether the error came from the network rather than from the request itself
    pub fn is_network(&self) -> bool {
        matches!(self, OverpassError::Network(_))
    }
}

impl From<reqwest::Error> for OverpassError {
    fn from(err: reqwest::Error) -> Self {
        OverpassError::Network(err.to_string())
    }
}

impl From<quick_xml::Error> for OverpassError {
    fn from(err: quick_xml::Error) -> Self {
        OverpassError::Parse(err.to_string())
    }
}

impl From<osmpbfreader::Error> for OverpassError {
    fn from(err: osmpbfreader::Error) -> Self {
        OverpassError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OverpassError>;
