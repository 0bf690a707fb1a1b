//! Service configuration loaded from TOML.
//!
//! Missing sections and keys fall back to the documented defaults. A file that
//! is absent or invalid as a whole is replaced by the defaults with a warning.

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::OverpassError;
use crate::io::{CompressionMethod, OsmFile, OsmFileFormat};
use crate::models::GeometryKind;
use crate::store::{LayerDefinition, LayerSource, TagFilter};

pub const DEFAULT_SERVICE_URL: &str = "http://overpass-api.de/api/";
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_REQUEST_TIMEOUT_S: u64 = 30;
pub const DEFAULT_FEATURE_TTL_S: u64 = 900;
pub const DEFAULT_CONTENT_RETRY_S: u64 = 15;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub overpass: OverpassConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OverpassConfig {
    pub service_url: String,
    pub retry_delay_ms: u64,
    pub request_timeout_s: u64,
    pub user_agent: String,
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            request_timeout_s: DEFAULT_REQUEST_TIMEOUT_S,
            user_agent: concat!("overpass-store/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl OverpassConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Base URL of the service, always ending with `/`
    pub fn base_url(&self) -> crate::Result<Url> {
        let mut raw = self.service_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw)
            .map_err(|e| OverpassError::Config(format!("invalid service URL {}: {}", raw, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(OverpassError::Config(format!(
                "service URL must use http or https: {}",
                raw
            )));
        }
        Ok(url)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub feature_ttl_s: u64,
    pub content_ttl_s: u64,
    pub content_retry_s: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            feature_ttl_s: DEFAULT_FEATURE_TTL_S,
            content_ttl_s: DEFAULT_FEATURE_TTL_S,
            content_retry_s: DEFAULT_CONTENT_RETRY_S,
        }
    }
}

impl CacheConfig {
    pub fn feature_ttl(&self) -> Duration {
        Duration::from_secs(self.feature_ttl_s)
    }

    pub fn content_ttl(&self) -> Duration {
        Duration::from_secs(self.content_ttl_s)
    }

    pub fn content_retry(&self) -> Duration {
        Duration::from_secs(self.content_retry_s)
    }
}

/// One `[[layers]]` entry. `script` wins over `file`, which wins over `filters`.
#[derive(Debug, Deserialize, Clone)]
pub struct LayerConfig {
    pub name: String,
    pub geometry: GeometryKind,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub file: Option<FileLayerConfig>,
    #[serde(default)]
    pub filters: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FileLayerConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub format: OsmFileFormat,
    #[serde(default)]
    pub compression: CompressionMethod,
    #[serde(default)]
    pub type_key: Option<String>,
    #[serde(default)]
    pub type_values: Vec<String>,
    /// Regular expression splitting multi-valued tags, e.g. `\s*;\s*`
    #[serde(default)]
    pub value_delimiter: Option<String>,
}

impl FileLayerConfig {
    fn delimiter(&self) -> crate::Result<Option<Regex>> {
        self.value_delimiter
            .as_deref()
            .filter(|pattern| !pattern.is_empty())
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    OverpassError::Config(format!("invalid value delimiter {:?}: {}", pattern, e))
                })
            })
            .transpose()
    }
}

impl LayerConfig {
    /// Resolve this entry into a layer definition. Fails if a snapshot file is
    /// missing or the value delimiter is not a valid pattern.
    pub fn to_definition(&self) -> crate::Result<LayerDefinition> {
        let source = match (&self.script, &self.file) {
            (Some(script), _) if !script.is_empty() => LayerSource::Script(script.clone()),
            (_, Some(file)) => {
                let delimiter = file.delimiter()?;
                let osm_file = OsmFile::open(&file.path, file.format, file.compression)?;
                let filter = file.type_key.as_ref().map(|key| TagFilter {
                    key: key.clone(),
                    values: file.type_values.iter().cloned().collect(),
                    delimiter,
                });
                LayerSource::File {
                    file: osm_file,
                    filter,
                }
            }
            _ => LayerSource::TagFilters(self.filters.clone()),
        };

        Ok(LayerDefinition {
            name: self.name.clone(),
            geometry: self.geometry,
            source,
        })
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file, or fall back to the defaults if it is absent or invalid
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load_from_file(path.as_ref()) {
            Ok(config) => {
                debug!("Using Overpass service on {}", config.overpass.service_url);
                config
            }
            Err(e) => {
                warn!(
                    "Not able to load configuration file {}! Using standard values instead. ({:#})",
                    path.as_ref().display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.overpass.base_url()?;

        for layer in &self.layers {
            if let Some(file) = &layer.file {
                file.delimiter()
                    .with_context(|| format!("Layer {}", layer.name))?;
            }
        }

        if self.overpass.retry_delay_ms == 0 || self.overpass.request_timeout_s == 0 {
            bail!("Retry delay and request timeout must be positive");
        }
        if self.cache.feature_ttl_s == 0
            || self.cache.content_ttl_s == 0
            || self.cache.content_retry_s == 0
        {
            bail!("Cache lifetimes must be positive");
        }

        Ok(())
    }
}
