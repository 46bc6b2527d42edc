//! Self-ping keepalive task.
//!
//! Free-tier hosts idle out; a periodic GET against our own health
//! endpoint keeps the process warm. Operational glue, not core
//! behavior: it can run in-process or as the standalone worker binary.

use std::time::Duration;

use anyhow::{bail, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_INTERVAL_MS: u64 = 240_000;
pub const MIN_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const MIN_TIMEOUT_MS: u64 = 1_000;

pub struct KeepAlive {
    url: String,
    interval: Duration,
    client: reqwest::Client,
}

impl KeepAlive {
    /// Strict construction: the worker binary exits non-zero on any of
    /// these errors instead of silently running misconfigured.
    pub fn new(url: &str, interval_ms: u64, timeout_ms: u64) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            bail!("keepalive URL must not be empty");
        }
        if interval_ms < MIN_INTERVAL_MS {
            bail!("keepalive interval {interval_ms}ms is below the {MIN_INTERVAL_MS}ms minimum");
        }
        if timeout_ms < MIN_TIMEOUT_MS {
            bail!("keepalive timeout {timeout_ms}ms is below the {MIN_TIMEOUT_MS}ms minimum");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;

        Ok(Self {
            url: url.to_string(),
            interval: Duration::from_millis(interval_ms),
            client,
        })
    }

    async fn ping(&self) {
        match self.client.get(&self.url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("keepalive ping ok ({})", response.status());
            }
            Ok(response) => warn!("keepalive ping returned {}", response.status()),
            Err(err) => warn!("keepalive ping failed: {err}"),
        }
    }

    /// Ping forever at the configured interval. The first tick is
    /// skipped; the server is obviously awake at startup.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.ping().await;
        }
    }
}

/// Spawn the in-process keepalive task if a URL is configured.
pub fn spawn(url: Option<&str>, interval_ms: u64, timeout_ms: u64) -> Option<JoinHandle<()>> {
    let url = url.map(str::trim).filter(|u| !u.is_empty())?;
    match KeepAlive::new(url, interval_ms, timeout_ms) {
        Ok(keepalive) => {
            info!("keepalive enabled: {url} every {interval_ms}ms");
            Some(tokio::spawn(keepalive.run()))
        }
        Err(err) => {
            warn!("keepalive disabled: {err}");
            None
        }
    }
}
