//! Command line client for the feature and content caches.
//!
//! Loads the layer definitions, requests the features of one layer inside an
//! optional bounding box and prints them as a GeoJSON FeatureCollection.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use geo::{coord, Geometry, Rect};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use overpass_store::config::Config;
use overpass_store::overpass::OverpassClient;
use overpass_store::StoreRegistry;

mod geojson;
use geojson::feature_collection;

#[derive(Parser, Debug)]
#[command(name = "fetch")]
#[command(about = "Fetch OpenStreetMap features through the Overpass cache")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "overpass-store.toml")]
    config: PathBuf,

    /// Layer to query
    #[arg(short, long)]
    layer: String,

    /// Bounding box as west,south,east,north (all cached features if omitted)
    #[arg(short, long)]
    bbox: Option<String>,

    /// Print the popup content of this entity instead of the features
    #[arg(long)]
    popup: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = Config::load_or_default(&args.config);

    let client = OverpassClient::new(&config.overpass)?;
    let registry = Arc::new(StoreRegistry::new(client, config.cache.clone()));
    registry.start();

    let result = run(&args, &config, &registry).await;

    registry.shutdown().await;
    result
}

async fn run(args: &Args, config: &Config, registry: &StoreRegistry) -> Result<()> {
    let layer = config
        .layers
        .iter()
        .find(|layer| layer.name == args.layer)
        .with_context(|| format!("Unknown layer: {}", args.layer))?;
    let definition = layer.to_definition()?;
    let store = registry.create_store(&definition)?;

    if let Some(id) = args.popup {
        let content_cache = registry.create_content_cache();
        let content = content_cache
            .get_content(id, definition.geometry.entity_kind())
            .await;
        println!("{}", content);
        return Ok(());
    }

    let filter = args.bbox.as_deref().map(parse_bbox).transpose()?;
    let features = store.get_features(filter.as_ref()).await;
    info!("Layer {} returned {} features", layer.name, features.len());

    let mut features: Vec<_> = features.into_values().collect();
    features.sort_by_key(|feature| feature.id);

    let collection = feature_collection(&features);
    println!("{}", serde_json::to_string_pretty(&collection)?);

    Ok(())
}

/// `west,south,east,north` to a rectangle filter
fn parse_bbox(raw: &str) -> Result<Geometry<f64>> {
    let values = raw
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid bounding box: {}", raw))?;

    let [west, south, east, north] = values[..] else {
        bail!("Bounding box needs four values, got {}", values.len());
    };

    Ok(Geometry::Rect(Rect::new(
        coord! { x: west, y: south },
        coord! { x: east, y: north },
    )))
}
