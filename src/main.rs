use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tunehub_server::catalog::{CatalogProvider, HttpCatalogClient};
use tunehub_server::config::{AppConfig, CliArgs};
use tunehub_server::keepalive;
use tunehub_server::profile::{ProfileStore, TreeProfileStore};
use tunehub_server::server::{make_state, run_server, LocalTokenVerifier, TokenVerifier};
use tunehub_server::store::{MemoryTreeStore, TreeStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let cli_args = CliArgs::parse();
    let config = AppConfig::resolve(&cli_args)?;

    info!(
        "catalog providers: primary {} / fallback {}",
        config.primary_api_url, config.fallback_api_url
    );
    let provider: Arc<dyn CatalogProvider> = Arc::new(
        HttpCatalogClient::with_timeouts(
            &config.primary_api_url,
            &config.fallback_api_url,
            Duration::from_millis(config.primary_timeout_ms),
            Duration::from_millis(config.fallback_timeout_ms),
            Duration::from_millis(config.lookup_timeout_ms),
        )
        .context("building catalog client")?,
    );

    // The remote tree adapter plugs in behind the TreeStore trait; this
    // build ships the in-memory store.
    if config.database_url.is_some() {
        warn!(
            "FIREBASE_DATABASE_URL set but no remote tree adapter is linked; using the in-memory store"
        );
    }
    let tree: Arc<dyn TreeStore> = Arc::new(MemoryTreeStore::new());
    let profiles: Arc<dyn ProfileStore> = Arc::new(TreeProfileStore::new(tree));

    let verifier: Arc<dyn TokenVerifier> = Arc::new(LocalTokenVerifier);

    let state = make_state(provider, profiles, verifier).context("assembling server state")?;

    keepalive::spawn(
        config.keepalive_url.as_deref(),
        config.keepalive_interval_ms,
        config.keepalive_timeout_ms,
    );

    info!("ready to serve at port {}!", config.port);
    run_server(state, config.port).await
}
