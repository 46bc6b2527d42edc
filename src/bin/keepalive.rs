//! Standalone keepalive worker.
//!
//! Deployments that cannot run the in-process task (for example a
//! separate cron-style dyno) run this binary instead. It exits with
//! code 1 on a missing URL or an invalid interval so the supervisor
//! notices the misconfiguration.

use clap::Parser;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tunehub_server::keepalive::{KeepAlive, DEFAULT_INTERVAL_MS, DEFAULT_TIMEOUT_MS};

#[derive(Parser, Debug)]
#[command(name = "keepalive", about = "Self-ping worker for the TuneHub server")]
struct WorkerArgs {
    /// URL to ping, typically the server's /healthz.
    #[clap(long, env = "KEEPALIVE_URL")]
    url: Option<String>,

    #[clap(long, env = "KEEPALIVE_INTERVAL_MS", default_value_t = DEFAULT_INTERVAL_MS)]
    interval_ms: u64,

    #[clap(long, env = "KEEPALIVE_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .init();

    let args = WorkerArgs::parse();

    let Some(url) = args.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
        error!("KEEPALIVE_URL is required");
        std::process::exit(1);
    };

    let keepalive = match KeepAlive::new(url, args.interval_ms, args.timeout_ms) {
        Ok(keepalive) => keepalive,
        Err(err) => {
            error!("invalid keepalive configuration: {err}");
            std::process::exit(1);
        }
    };

    info!("pinging {url} every {}ms", args.interval_ms);
    keepalive.run().await;
}
