//! Startup configuration
//!
//! All environment lookups happen exactly once, here. The rest of the crate
//! (the cache policy in particular) receives resolved values and never reads
//! ambient state.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use thiserror::Error;

use crate::cli::Cli;
use crate::clock::{ClockError, DayClock};

/// Environment variables checked, in order, for the provider credential
pub const API_KEY_ENV_VARS: [&str; 3] = ["OUTPOST_API_KEY", "GEMINI_API_KEY", "API_KEY"];

/// Errors from resolving startup configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    InvalidTimezone(#[from] ClockError),
}

/// Resolved startup configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Provider credential; `None` runs the server in cached-data-only mode
    pub provider_api_key: Option<String>,
    /// Address to bind the cache server to
    pub host: String,
    pub port: u16,
    /// Validated timezone clock anchoring the daily boundary
    pub clock: DayClock,
    /// IANA name of the configured timezone, kept for display
    pub timezone: String,
    /// Directory holding the cache files
    pub cache_dir: PathBuf,
    /// Interval between background freshness re-checks
    pub poll_interval: Duration,
    /// Whether the background scheduler runs
    pub auto_refresh: bool,
}

impl Config {
    /// Resolves configuration from parsed CLI arguments and the environment
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let clock = DayClock::new(&cli.timezone)?;
        Ok(Self {
            provider_api_key: resolve_api_key(),
            host: cli.host.clone(),
            port: cli.port,
            clock,
            timezone: cli.timezone.clone(),
            cache_dir: cli
                .cache_dir
                .clone()
                .unwrap_or_else(default_cache_dir),
            poll_interval: Duration::from_secs(cli.poll_interval_secs),
            auto_refresh: !cli.no_auto_refresh,
        })
    }
}

/// First non-empty credential among the documented fallback names
fn resolve_api_key() -> Option<String> {
    API_KEY_ENV_VARS
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|value| !value.is_empty()))
}

/// Platform cache directory, falling back to ./cache for minimal
/// environments without a home directory
fn default_cache_dir() -> PathBuf {
    ProjectDirs::from("", "", "outpost")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./cache"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_resolve_with_defaults() {
        let cli = Cli::parse_from(["outpost"]);
        let config = Config::resolve(&cli).expect("default config resolves");

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8788);
        assert_eq!(config.timezone, "America/New_York");
        assert_eq!(config.poll_interval, Duration::from_secs(3600));
        assert!(config.auto_refresh);
    }

    #[test]
    fn test_resolve_rejects_bad_timezone() {
        let cli = Cli::parse_from(["outpost", "--timezone", "Not/AZone"]);
        let result = Config::resolve(&cli);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Not/AZone"));
    }

    #[test]
    fn test_resolve_honors_cache_dir_override() {
        let cli = Cli::parse_from(["outpost", "--cache-dir", "/tmp/outpost-test"]);
        let config = Config::resolve(&cli).expect("config resolves");
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/outpost-test"));
    }

    #[test]
    fn test_no_auto_refresh_flag() {
        let cli = Cli::parse_from(["outpost", "--no-auto-refresh"]);
        let config = Config::resolve(&cli).expect("config resolves");
        assert!(!config.auto_refresh);
    }
}
