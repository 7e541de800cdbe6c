//! Outpost cache server binary
//!
//! Primes the daily search bundle, starts the background refresh scheduler,
//! and serves the cache endpoint until interrupted.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use outpost::cache::{CacheNamespace, DailyCachePolicy, FileStore};
use outpost::cli::Cli;
use outpost::config::Config;
use outpost::provider::SearchProvider;
use outpost::refresh::{RefreshFn, RefreshScheduler, SchedulerConfig};
use outpost::server::{self, AppState};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("outpost=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Scheduler callback: re-run the bundle decision, forcing at midnight
fn scheduled_refresh(state: Arc<AppState>) -> RefreshFn {
    Arc::new(move |force| {
        let state = state.clone();
        Box::pin(async move {
            let result = server::refresh_search_bundle(&state, force).await;
            info!(freshness = ?result.freshness, force, "scheduled refresh finished");
        })
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::resolve(&cli)?;

    let store = FileStore::with_dir(config.cache_dir.clone());
    let provider = SearchProvider::new(config.provider_api_key.clone());
    if !provider.is_configured() {
        warn!(
            "no provider API key configured; serving cached data only \
             (set OUTPOST_API_KEY, GEMINI_API_KEY, or API_KEY)"
        );
    }

    let state = Arc::new(AppState {
        policy: DailyCachePolicy::new(store.clone(), config.clock),
        scenarios: CacheNamespace::new(store, config.clock, server::SCENARIO_NAMESPACE_KEY),
        provider,
        clock: config.clock,
    });

    // Prime today's bundle before accepting traffic.
    let primed = server::refresh_search_bundle(&state, cli.force_refresh).await;
    info!(
        freshness = ?primed.freshness,
        timezone = %config.timezone,
        cache_dir = %config.cache_dir.display(),
        "cache primed"
    );

    let scheduler = if config.auto_refresh {
        Some(RefreshScheduler::start(
            SchedulerConfig {
                poll_interval: config.poll_interval,
                enabled: true,
            },
            config.clock,
            scheduled_refresh(state.clone()),
        ))
    } else {
        None
    };

    tokio::select! {
        result = server::serve(&config.host, config.port, state.clone()) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    if let Some(scheduler) = scheduler {
        scheduler.stop().await;
    }

    Ok(())
}
