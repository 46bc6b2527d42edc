//! Configuration resolution.
//!
//! Every knob is settable by CLI flag or environment variable; values
//! are validated and clamped once here so the rest of the code never
//! re-checks them.

use anyhow::{bail, Result};
use clap::Parser;
use tracing::warn;

use crate::keepalive::{MIN_INTERVAL_MS, MIN_TIMEOUT_MS};

#[derive(Parser, Debug, Clone)]
#[command(name = "tunehub-server", about = "TuneHub search and personalization core")]
pub struct CliArgs {
    /// Port to listen on.
    #[clap(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Base URL of the primary catalog provider.
    #[clap(
        long,
        env = "PRIMARY_API_URL",
        default_value = "https://catalog-primary.example.com/api"
    )]
    pub primary_api_url: String,

    /// Base URL of the fallback catalog provider.
    #[clap(
        long,
        env = "FALLBACK_API_URL",
        default_value = "https://catalog-fallback.example.com"
    )]
    pub fallback_api_url: String,

    /// Timeout for primary song searches, in milliseconds.
    #[clap(long, env = "PRIMARY_TIMEOUT_MS", default_value_t = 2200)]
    pub primary_timeout_ms: u64,

    /// Timeout for fallback searches, in milliseconds.
    #[clap(long, env = "FALLBACK_TIMEOUT_MS", default_value_t = 1800)]
    pub fallback_timeout_ms: u64,

    /// Timeout for catalog utility lookups, in milliseconds.
    #[clap(long, env = "LOOKUP_TIMEOUT_MS", default_value_t = 1500)]
    pub lookup_timeout_ms: u64,

    /// Remote key-value tree endpoint. Without it, state lives in the
    /// in-process store and is lost on restart.
    #[clap(long, env = "FIREBASE_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Service-account credential for the remote tree, inline JSON or a
    /// file path.
    #[clap(long, env = "FIREBASE_SERVICE_ACCOUNT")]
    pub service_account: Option<String>,

    /// URL the keepalive task pings; unset disables it.
    #[clap(long, env = "KEEPALIVE_URL")]
    pub keepalive_url: Option<String>,

    #[clap(long, env = "KEEPALIVE_INTERVAL_MS", default_value_t = 240_000)]
    pub keepalive_interval_ms: u64,

    #[clap(long, env = "KEEPALIVE_TIMEOUT_MS", default_value_t = 10_000)]
    pub keepalive_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub primary_api_url: String,
    pub fallback_api_url: String,
    pub primary_timeout_ms: u64,
    pub fallback_timeout_ms: u64,
    pub lookup_timeout_ms: u64,
    pub database_url: Option<String>,
    pub service_account: Option<String>,
    pub keepalive_url: Option<String>,
    pub keepalive_interval_ms: u64,
    pub keepalive_timeout_ms: u64,
}

impl AppConfig {
    pub fn resolve(cli: &CliArgs) -> Result<Self> {
        if cli.primary_api_url.trim().is_empty() {
            bail!("primary_api_url must not be empty");
        }
        if cli.fallback_api_url.trim().is_empty() {
            bail!("fallback_api_url must not be empty");
        }
        if cli.primary_timeout_ms == 0 || cli.fallback_timeout_ms == 0 || cli.lookup_timeout_ms == 0
        {
            bail!("upstream timeouts must be positive");
        }
        if cli.database_url.is_some() != cli.service_account.is_some() {
            bail!("FIREBASE_DATABASE_URL and FIREBASE_SERVICE_ACCOUNT must be provided together");
        }

        let keepalive_interval_ms = if cli.keepalive_interval_ms < MIN_INTERVAL_MS {
            warn!(
                "keepalive interval {}ms below minimum, using {}ms",
                cli.keepalive_interval_ms, MIN_INTERVAL_MS
            );
            MIN_INTERVAL_MS
        } else {
            cli.keepalive_interval_ms
        };
        let keepalive_timeout_ms = if cli.keepalive_timeout_ms < MIN_TIMEOUT_MS {
            warn!(
                "keepalive timeout {}ms below minimum, using {}ms",
                cli.keepalive_timeout_ms, MIN_TIMEOUT_MS
            );
            MIN_TIMEOUT_MS
        } else {
            cli.keepalive_timeout_ms
        };

        Ok(Self {
            port: cli.port,
            primary_api_url: cli.primary_api_url.clone(),
            fallback_api_url: cli.fallback_api_url.clone(),
            primary_timeout_ms: cli.primary_timeout_ms,
            fallback_timeout_ms: cli.fallback_timeout_ms,
            lookup_timeout_ms: cli.lookup_timeout_ms,
            database_url: cli.database_url.clone(),
            service_account: cli.service_account.clone(),
            keepalive_url: cli.keepalive_url.clone().filter(|u| !u.trim().is_empty()),
            keepalive_interval_ms,
            keepalive_timeout_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> CliArgs {
        CliArgs::parse_from(["tunehub-server"])
    }

    #[test]
    fn test_defaults_resolve() {
        let config = AppConfig::resolve(&base_args()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.primary_timeout_ms, 2200);
        assert_eq!(config.fallback_timeout_ms, 1800);
        assert_eq!(config.lookup_timeout_ms, 1500);
        assert_eq!(config.keepalive_interval_ms, 240_000);
        assert!(config.keepalive_url.is_none());
    }

    #[test]
    fn test_keepalive_interval_clamped_to_minimum() {
        let mut args = base_args();
        args.keepalive_interval_ms = 5_000;
        args.keepalive_timeout_ms = 10;
        let config = AppConfig::resolve(&args).unwrap();
        assert_eq!(config.keepalive_interval_ms, MIN_INTERVAL_MS);
        assert_eq!(config.keepalive_timeout_ms, MIN_TIMEOUT_MS);
    }

    #[test]
    fn test_database_url_requires_service_account() {
        let mut args = base_args();
        args.database_url = Some("https://tree.example.com".into());
        assert!(AppConfig::resolve(&args).is_err());

        args.service_account = Some("{\"type\":\"service_account\"}".into());
        assert!(AppConfig::resolve(&args).is_ok());
    }

    #[test]
    fn test_empty_upstream_url_rejected() {
        let mut args = base_args();
        args.primary_api_url = " ".into();
        assert!(AppConfig::resolve(&args).is_err());
    }
}
