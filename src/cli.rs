//! Command-line interface parsing for the Outpost cache server
//!
//! Flags cover the bind address, the timezone anchoring the daily refresh
//! boundary, the cache location, and the background scheduler knobs.

use std::path::PathBuf;

use clap::Parser;

use crate::clock::DEFAULT_TIMEZONE;

/// Outpost - daily-refresh cache server for the geopolitical risk dashboard
#[derive(Parser, Debug)]
#[command(name = "outpost")]
#[command(about = "Daily-refresh cache server for the Outpost risk dashboard")]
#[command(version)]
pub struct Cli {
    /// Address to bind the cache server to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port for the cache server
    #[arg(long, default_value_t = 8788)]
    pub port: u16,

    /// IANA timezone anchoring the daily refresh boundary
    #[arg(long, default_value = DEFAULT_TIMEZONE)]
    pub timezone: String,

    /// Directory for cache files (defaults to the platform cache dir)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Seconds between background freshness re-checks
    #[arg(long, default_value_t = 3600)]
    pub poll_interval_secs: u64,

    /// Disable the background refresh scheduler
    #[arg(long)]
    pub no_auto_refresh: bool,

    /// Fetch fresh data on startup even if today's bundle is cached
    #[arg(long)]
    pub force_refresh: bool,
}
