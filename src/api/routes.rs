use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::alerts::rules::parse_number;
use crate::alerts::{AlertHistoryTracker, AlertRuleStore};
use crate::api::health::HealthState;
use crate::api::latency::TickLatency;
use crate::config::{cluster_thresholds, COMPARE_MAX_GROUPS, COMPARE_SEARCH_LIMIT};
use crate::error::AppError;
use crate::fetcher::PolyrouterClient;
use crate::matcher::cluster;
use crate::types::{AlertRule, AlertType, Market, MarketGroup, WatchlistItem};
use crate::watchlist::WatchlistStore;

#[derive(Clone)]
pub struct ApiState {
    pub rules: Arc<AlertRuleStore>,
    pub history: Arc<AlertHistoryTracker>,
    pub watchlist: Arc<WatchlistStore>,
    pub client: Arc<PolyrouterClient>,
    pub health: Arc<HealthState>,
    pub latency: Arc<TickLatency>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/alerts",
            get(list_alerts).post(create_alert).put(replace_alerts),
        )
        .route("/alerts/:platform/:market_id", delete(remove_alerts))
        .route("/alerts/history", get(list_history))
        .route("/alerts/history/:key", delete(forget_history))
        .route("/watchlist", get(list_watchlist).post(add_to_watchlist))
        .route("/watchlist/toggle", post(toggle_watchlist))
        .route(
            "/watchlist/:platform/:market_id",
            get(is_watched).delete(remove_from_watchlist),
        )
        .route("/compare/:query", get(compare_markets))
        .route("/health", get(get_health))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request structs
// ---------------------------------------------------------------------------

/// Type and threshold arrive loosely typed and are checked here, before
/// anything reaches the store.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlertRequest {
    pub market_id: String,
    pub platform: String,
    #[serde(rename = "type")]
    pub rule_type: String,
    pub threshold: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRequest {
    pub platform: String,
    pub market_id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Deserialize)]
pub struct CompareQuery {
    pub threshold: Option<f64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct GroupResponse {
    pub size: usize,
    /// Title of the group's seed listing.
    pub title: String,
    pub markets: Vec<Market>,
}

#[derive(Serialize)]
pub struct WatchedResponse {
    pub watched: bool,
}

#[derive(Serialize)]
pub struct CompareResponse {
    pub query: String,
    pub threshold: f64,
    pub markets_found: usize,
    pub groups: Vec<GroupResponse>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub last_poll_at_ns: u64,
    pub polls_completed: u64,
    pub polls_failed: u64,
    pub markets_evaluated: u64,
    pub alerts_fired: u64,
    pub tick_samples: u64,
    pub tick_p50_ms: Option<u64>,
    pub tick_p95_ms: Option<u64>,
    pub tick_p99_ms: Option<u64>,
}

impl From<&MarketGroup> for GroupResponse {
    fn from(group: &MarketGroup) -> Self {
        Self {
            size: group.len(),
            title: group.seed().title.clone(),
            markets: group.markets().to_vec(),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_alerts(State(state): State<ApiState>) -> Json<Vec<AlertRule>> {
    Json(state.rules.list().await)
}

async fn create_alert(
    State(state): State<ApiState>,
    Json(req): Json<NewAlertRequest>,
) -> Result<(StatusCode, Json<AlertRule>), AppError> {
    let rule = state.rules.add(validate_rule(&req)?).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

/// Overwrite the whole rule list. Every entry is validated before anything is written.
async fn replace_alerts(
    State(state): State<ApiState>,
    Json(reqs): Json<Vec<NewAlertRequest>>,
) -> Result<Json<Vec<AlertRule>>, AppError> {
    let rules = reqs
        .iter()
        .map(validate_rule)
        .collect::<Result<Vec<_>, _>>()?;
    state.rules.save(&rules).await?;
    Ok(Json(rules))
}

async fn remove_alerts(
    State(state): State<ApiState>,
    Path((platform, market_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state.rules.remove(&market_id, &platform).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_history(State(state): State<ApiState>) -> Json<Vec<String>> {
    let mut keys: Vec<String> = state.history.load().await.into_iter().collect();
    keys.sort();
    Json(keys)
}

async fn forget_history(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> Result<StatusCode, AppError> {
    state.history.forget(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_watchlist(State(state): State<ApiState>) -> Json<Vec<WatchlistItem>> {
    Json(state.watchlist.list().await)
}

async fn add_to_watchlist(
    State(state): State<ApiState>,
    Json(req): Json<WatchRequest>,
) -> Result<StatusCode, AppError> {
    if req.platform.is_empty() || req.market_id.is_empty() {
        return Err(AppError::InvalidRequest(
            "platform and marketId are required".to_string(),
        ));
    }
    let added = state
        .watchlist
        .add(&req.platform, &req.market_id, &req.title)
        .await?;
    Ok(if added { StatusCode::CREATED } else { StatusCode::OK })
}

async fn is_watched(
    State(state): State<ApiState>,
    Path((platform, market_id)): Path<(String, String)>,
) -> Json<WatchedResponse> {
    Json(WatchedResponse {
        watched: state.watchlist.contains(&platform, &market_id).await,
    })
}

async fn toggle_watchlist(
    State(state): State<ApiState>,
    Json(req): Json<WatchRequest>,
) -> Result<Json<WatchedResponse>, AppError> {
    if req.platform.is_empty() || req.market_id.is_empty() {
        return Err(AppError::InvalidRequest(
            "platform and marketId are required".to_string(),
        ));
    }
    let watched = state
        .watchlist
        .toggle(&req.platform, &req.market_id, &req.title)
        .await?;
    Ok(Json(WatchedResponse { watched }))
}

async fn remove_from_watchlist(
    State(state): State<ApiState>,
    Path((platform, market_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state.watchlist.remove(&platform, &market_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Search all platforms and return the groups of listings that look like the
/// same event.
async fn compare_markets(
    State(state): State<ApiState>,
    Path(query): Path<String>,
    Query(params): Query<CompareQuery>,
) -> Result<Json<CompareResponse>, AppError> {
    let threshold = params.threshold.unwrap_or(cluster_thresholds::COMPARE);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(AppError::InvalidRequest(format!(
            "threshold must be within [0, 1], got {threshold}"
        )));
    }

    let query = query.replace('-', " ");
    let markets = state
        .client
        .search_markets(&query, COMPARE_SEARCH_LIMIT)
        .await?;

    Ok(Json(CompareResponse {
        markets_found: markets.len(),
        groups: top_groups(&markets, threshold),
        query,
        threshold,
    }))
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let (p50, p95, p99) = state.latency.percentiles();
    Json(HealthResponse {
        last_poll_at_ns: state.health.last_poll_at_ns(),
        polls_completed: state.health.polls_completed(),
        polls_failed: state.health.polls_failed(),
        markets_evaluated: state.health.markets_evaluated(),
        alerts_fired: state.health.alerts_fired(),
        tick_samples: state.latency.len(),
        tick_p50_ms: p50,
        tick_p95_ms: p95,
        tick_p99_ms: p99,
    })
}

fn validate_rule(req: &NewAlertRequest) -> Result<AlertRule, AppError> {
    let rule_type = AlertType::parse(&req.rule_type)
        .ok_or_else(|| AppError::InvalidRule(format!("unknown alert type `{}`", req.rule_type)))?;
    let threshold = parse_number(&req.threshold)
        .ok_or_else(|| AppError::InvalidRule(format!("threshold must be numeric, got {}", req.threshold)))?;
    if req.market_id.is_empty() || req.platform.is_empty() {
        return Err(AppError::InvalidRule(
            "marketId and platform are required".to_string(),
        ));
    }
    Ok(AlertRule::new(&req.market_id, &req.platform, rule_type, threshold))
}

/// Largest multi-listing groups, at most `COMPARE_MAX_GROUPS`.
fn top_groups(markets: &[Market], threshold: f64) -> Vec<GroupResponse> {
    cluster(markets, threshold)
        .into_iter()
        .filter(|g| g.len() > 1)
        .take(COMPARE_MAX_GROUPS)
        .map(|g| GroupResponse::from(&g))
        .collect()
}
