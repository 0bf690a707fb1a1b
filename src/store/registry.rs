//! Registry owning every store of a service, plus the background sweep.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::content::{ContentCache, ContentFetcher};
use super::feature_store::FeatureStore;
use super::layer::{LayerDefinition, LayerSource};
use super::source::{FeatureSource, FileSource, OverpassSource};
use crate::config::CacheConfig;
use crate::error::{OverpassError, Result};
use crate::overpass::{generate_script, OverpassClient};

/// Share of the feature TTL between two sweeps
pub const SWEEP_FACTOR: f64 = 0.975;

/// A cache whose expired entries can be purged
pub trait Sweepable: Send + Sync {
    fn name(&self) -> &str;

    /// Remove everything expired at `now`, returning the number of removed entries
    fn sweep_expired(&self, now: DateTime<Utc>) -> usize;

    fn clear(&self);
}

/// Creates, owns and sweeps the stores of one service instance.
///
/// The registry can be started again after a shutdown; the caches are empty then.
pub struct StoreRegistry {
    client: OverpassClient,
    cache_config: CacheConfig,
    layers: DashMap<String, Arc<FeatureStore>>,
    sweepables: RwLock<Vec<Arc<dyn Sweepable>>>,
    cancel: Mutex<CancellationToken>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl StoreRegistry {
    pub fn new(client: OverpassClient, cache_config: CacheConfig) -> Self {
        Self {
            client,
            cache_config,
            layers: DashMap::new(),
            sweepables: RwLock::new(Vec::new()),
            cancel: Mutex::new(CancellationToken::new()),
            sweeper: Mutex::new(None),
        }
    }

    /// Build the store for a layer and register it under the layer's name.
    /// Fails with `Config` if a store with that name exists already.
    pub fn create_store(&self, layer: &LayerDefinition) -> Result<Arc<FeatureStore>> {
        let source: Box<dyn FeatureSource> = match &layer.source {
            LayerSource::Script(script) => {
                Box::new(OverpassSource::new(self.client.clone(), script.clone()))
            }
            LayerSource::TagFilters(filters) => Box::new(OverpassSource::new(
                self.client.clone(),
                generate_script(layer.geometry.entity_kind(), filters),
            )),
            LayerSource::File { file, filter } => {
                // Re-check, the file may have gone since the layer was defined
                file.ensure_exists()?;
                Box::new(FileSource::new(
                    file.clone(),
                    filter.clone(),
                    layer.geometry.entity_kind(),
                ))
            }
        };

        let store = match self.layers.entry(layer.name.clone()) {
            Entry::Occupied(_) => {
                return Err(OverpassError::Config(format!(
                    "layer {} already exists",
                    layer.name
                )));
            }
            Entry::Vacant(entry) => {
                let store = Arc::new(FeatureStore::new(
                    layer.name.clone(),
                    layer.geometry,
                    source,
                    self.feature_ttl(),
                ));
                entry.insert(Arc::clone(&store));
                store
            }
        };

        info!("Created {} store for layer {}", layer.geometry, layer.name);
        self.register(store.clone());
        Ok(store)
    }

    /// Content cache backed by the registry's Overpass client
    pub fn create_content_cache(&self) -> Arc<ContentCache> {
        self.create_content_cache_with(Arc::new(self.client.clone()))
    }

    pub fn create_content_cache_with(&self, fetcher: Arc<dyn ContentFetcher>) -> Arc<ContentCache> {
        let cache = Arc::new(ContentCache::new(
            fetcher,
            to_chrono(self.cache_config.content_ttl()),
            to_chrono(self.cache_config.content_retry()),
        ));
        self.register(cache.clone());
        cache
    }

    pub fn register(&self, sweepable: Arc<dyn Sweepable>) {
        debug!("Registered cache {}", sweepable.name());
        self.sweepables.write().push(sweepable);
    }

    /// Number of caches swept by this registry
    pub fn cache_count(&self) -> usize {
        self.sweepables.read().len()
    }

    pub fn store(&self, name: &str) -> Option<Arc<FeatureStore>> {
        self.layers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn layer_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.layers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Interval of the background sweep
    pub fn sweep_interval(&self) -> Duration {
        self.cache_config.feature_ttl().mul_f64(SWEEP_FACTOR)
    }

    /// Purge expired entries of every registered cache
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let sweepables = self.sweepables.read().clone();
        let removed: usize = sweepables.iter().map(|s| s.sweep_expired(now)).sum();
        debug!("Sweep removed {} expired entries", removed);
        removed
    }

    /// Start the background sweep. Calling it again while running has no effect.
    pub fn start(self: &Arc<Self>) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return;
        }

        let cancel = {
            let mut token = self.cancel.lock();
            if token.is_cancelled() {
                debug!("Restarting sweep after shutdown");
                *token = CancellationToken::new();
            }
            token.clone()
        };

        let period = self.sweep_interval();
        let registry = Arc::downgrade(self);
        info!("Sweeping expired cache entries every {:?}", period);

        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(registry) = registry.upgrade() else {
                            break;
                        };
                        registry.sweep(Utc::now());
                    }
                }
            }

            debug!("Sweep task stopped");
        }));
    }

    /// Stop the sweep and clear every registered cache
    pub async fn shutdown(&self) {
        self.cancel.lock().cancel();

        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        for sweepable in self.sweepables.read().iter() {
            sweepable.clear();
        }
        info!("Cache registry shut down");
    }

    fn feature_ttl(&self) -> chrono::Duration {
        to_chrono(self.cache_config.feature_ttl())
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
