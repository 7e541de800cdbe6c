//! HTTP cache server
//!
//! Read endpoints consumed by the separately-served dashboard front end:
//! each call runs the freshness check, refreshes when needed, and returns
//! the cached payload with refresh-countdown metadata. CORS is permissive by
//! design since the front end lives on another origin. An unconfigured
//! provider still answers 200 with `data: null` so the client can fall back
//! to its own direct-fetch path.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::cache::{
    CacheNamespace, CacheResult, DailyCachePolicy, EntryStore, FileStore, RefreshOptions,
    RefreshStatus,
};
use crate::clock::DayClock;
use crate::data::{default_market_tickers, MarketData, SearchBundle, ShockScenarioData};
use crate::provider::SearchProvider;

/// Store key holding the daily search bundle
pub const SEARCH_BUNDLE_CACHE_KEY: &str = "daily_search_bundle";

/// Store key holding the live ticker board
pub const MARKET_DATA_CACHE_KEY: &str = "market_data";

/// Store key holding the daily whiteboard brief image
pub const WHITEBOARD_CACHE_KEY: &str = "whiteboard";

/// Store key holding the shock-scenario namespace blob
pub const SCENARIO_NAMESPACE_KEY: &str = "scenario_analysis";

/// Shared state behind the cache endpoints
pub struct AppState {
    pub policy: DailyCachePolicy<FileStore>,
    pub scenarios: CacheNamespace<FileStore>,
    pub provider: SearchProvider,
    pub clock: DayClock,
}

/// Wire shape shared by the cache endpoints
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheResponse {
    /// Epoch-ms timestamp of the served data, null when nothing is available
    pub fetched_at: Option<i64>,
    /// Milliseconds until the next daily boundary
    pub next_refresh_ms: i64,
    /// Same countdown rounded to whole minutes
    pub next_refresh_minutes: i64,
    /// The cached payload, null when unavailable
    pub data: Option<Value>,
}

/// Wire shape of the scenario listing
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioListResponse {
    pub cached_keys: Vec<String>,
}

/// Wire shape of the per-domain cache status overview
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatusResponse {
    pub search_bundle: RefreshStatus,
    pub market_data: RefreshStatus,
    pub whiteboard: RefreshStatus,
    /// Same-day-valid scenario keys with their individual statuses
    pub scenarios: BTreeMap<String, RefreshStatus>,
}

#[derive(Debug, Deserialize)]
struct ForceQuery {
    force: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScenarioQuery {
    name: String,
    #[serde(default)]
    description: String,
    force: Option<String>,
}

fn wants_force(force: &Option<String>) -> bool {
    force.as_deref() == Some("1")
}

/// Runs the fetch-or-serve decision for the daily bundle.
///
/// An empty bundle is a disguised failure: the provider answered but grounded
/// nothing, so it is served (if nothing better exists) but never cached.
pub async fn refresh_search_bundle(state: &AppState, force: bool) -> CacheResult<SearchBundle> {
    let usable = |bundle: &SearchBundle| !bundle.is_empty();
    let options = RefreshOptions {
        force_refresh: force,
        is_usable: Some(&usable),
    };
    state
        .policy
        .get_or_refresh(
            SEARCH_BUNDLE_CACHE_KEY,
            || state.provider.fetch_search_bundle(),
            options,
        )
        .await
}

/// Runs the fetch-or-serve decision for the ticker board.
///
/// A reply with no grounding sources means the model answered without
/// corroborating search results; it is treated as a disguised failure.
pub async fn refresh_market_data(state: &AppState, force: bool) -> CacheResult<MarketData> {
    let usable = |market: &MarketData| !market.sources.is_empty();
    let options = RefreshOptions {
        force_refresh: force,
        is_usable: Some(&usable),
    };
    state
        .policy
        .get_or_refresh(
            MARKET_DATA_CACHE_KEY,
            || async {
                let seed = default_market_tickers();
                state.provider.fetch_market_data(&seed).await
            },
            options,
        )
        .await
}

/// Runs the fetch-or-serve decision for the daily whiteboard image.
///
/// The provider reports an imageless reply as `Ok(None)`; the usability
/// predicate rejects it so yesterday's image keeps being served instead. The
/// cached bundle's economic brief, when present, seeds the image topics.
pub async fn refresh_whiteboard(state: &AppState, force: bool) -> CacheResult<Option<String>> {
    let brief = state
        .policy
        .store()
        .read(SEARCH_BUNDLE_CACHE_KEY)
        .and_then(|entry| {
            entry
                .data
                .get("economicBrief")
                .and_then(|value| value.as_str().map(str::to_string))
        });
    let usable = |image: &Option<String>| image.is_some();
    let options = RefreshOptions {
        force_refresh: force,
        is_usable: Some(&usable),
    };
    state
        .policy
        .get_or_refresh(
            WHITEBOARD_CACHE_KEY,
            || state.provider.fetch_daily_brief_image(brief.as_deref()),
            options,
        )
        .await
}

/// Wraps a cache outcome in the shared response envelope
fn envelope<T: Serialize>(state: &AppState, result: CacheResult<T>) -> Json<CacheResponse> {
    let next_refresh_ms = state
        .clock
        .duration_until_next_midnight(Utc::now())
        .num_milliseconds();

    Json(CacheResponse {
        fetched_at: result.fetched_at.map(|t| t.timestamp_millis()),
        next_refresh_ms,
        next_refresh_minutes: round_to_minutes(next_refresh_ms),
        data: result.data.and_then(|data| serde_json::to_value(data).ok()),
    })
}

async fn search_cache(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ForceQuery>,
) -> Json<CacheResponse> {
    let result = refresh_search_bundle(&state, wants_force(&query.force)).await;
    envelope(&state, result)
}

async fn market_data(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ForceQuery>,
) -> Json<CacheResponse> {
    let result = refresh_market_data(&state, wants_force(&query.force)).await;
    envelope(&state, result)
}

async fn scenario_analysis(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScenarioQuery>,
) -> Json<CacheResponse> {
    let usable = |scenario: &ShockScenarioData| scenario.is_populated();
    let options = RefreshOptions {
        force_refresh: wants_force(&query.force),
        is_usable: Some(&usable),
    };
    let result = state
        .scenarios
        .get_or_refresh(
            &query.name,
            || {
                state
                    .provider
                    .fetch_scenario_analysis(&query.name, &query.description)
            },
            options,
        )
        .await;
    envelope(&state, result)
}

async fn whiteboard(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ForceQuery>,
) -> Json<CacheResponse> {
    let result = refresh_whiteboard(&state, wants_force(&query.force)).await;
    envelope(&state, result)
}

async fn cache_status(State(state): State<Arc<AppState>>) -> Json<CacheStatusResponse> {
    let scenarios = state
        .scenarios
        .list_cached_keys()
        .into_iter()
        .map(|key| {
            let status = state.scenarios.status(&key);
            (key, status)
        })
        .collect();

    Json(CacheStatusResponse {
        search_bundle: state.policy.status(SEARCH_BUNDLE_CACHE_KEY),
        market_data: state.policy.status(MARKET_DATA_CACHE_KEY),
        whiteboard: state.policy.status(WHITEBOARD_CACHE_KEY),
        scenarios,
    })
}

async fn scenario_list(State(state): State<Arc<AppState>>) -> Json<ScenarioListResponse> {
    Json(ScenarioListResponse {
        cached_keys: state.scenarios.list_cached_keys(),
    })
}

async fn scenario_clear(State(state): State<Arc<AppState>>) -> StatusCode {
    state.scenarios.clear_all();
    info!("scenario cache cleared");
    StatusCode::NO_CONTENT
}

async fn health_check() -> &'static str {
    "ok"
}

/// Rounds a millisecond countdown to whole minutes
fn round_to_minutes(ms: i64) -> i64 {
    ((ms as f64) / 60_000.0).round() as i64
}

/// Builds the application router with permissive CORS
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/search-cache", get(search_cache))
        .route("/api/market-data", get(market_data))
        .route("/api/whiteboard", get(whiteboard))
        .route("/api/scenario", get(scenario_analysis))
        .route("/api/scenarios", get(scenario_list).delete(scenario_clear))
        .route("/api/cache-status", get(cache_status))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Binds and serves the cache endpoint until the task is aborted
pub async fn serve(host: &str, port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);
    let addr = format!("{}:{}", host, port);
    info!(%addr, "cache server listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
