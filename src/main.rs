mod alerts;
mod api;
mod config;
mod error;
mod fetcher;
mod matcher;
mod poller;
mod store;
mod types;
mod watchlist;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::alerts::{AlertEvaluator, AlertHistoryTracker, AlertRuleStore};
use crate::api::health::HealthState;
use crate::api::latency::TickLatency;
use crate::api::routes::{router, ApiState};
use crate::config::{Config, CHANNEL_CAPACITY};
use crate::error::Result;
use crate::fetcher::PolyrouterClient;
use crate::poller::AlertPoller;
use crate::store::{KeyValueStore, MemoryKvStore, SqliteKvStore};
use crate::types::FiredAlert;
use crate::watchlist::WatchlistStore;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Durable store ---
    let kv: Arc<dyn KeyValueStore> = if cfg.db_path == config::IN_MEMORY_DB_PATH {
        warn!("DB_PATH={}: rules, history and watchlist are not persisted", cfg.db_path);
        Arc::new(MemoryKvStore::new())
    } else {
        let store = SqliteKvStore::connect(&cfg.db_path).await?;
        info!("Database ready at {}", cfg.db_path);
        Arc::new(store)
    };

    let rules = Arc::new(AlertRuleStore::new(Arc::clone(&kv)));
    let history = Arc::new(AlertHistoryTracker::new(Arc::clone(&kv)));
    let watchlist = Arc::new(WatchlistStore::new(Arc::clone(&kv)));
    let rule_count = rules.list().await.len();
    let fired_count = history.load().await.len();
    let watched_count = watchlist.list().await.len();
    info!(
        rules = rule_count,
        fired = fired_count,
        watched = watched_count,
        "Loaded persisted alert state",
    );

    // --- Upstream ---
    if cfg.polyrouter_api_key.is_none() {
        warn!("POLYROUTER_API_KEY not set: polling and /compare will fail until it is configured.");
    }
    let client = Arc::new(PolyrouterClient::new(&cfg)?);

    let health = Arc::new(HealthState::new());
    let latency = Arc::new(TickLatency::new());

    // --- Channels ---
    let (alert_tx, alert_rx) = mpsc::channel(CHANNEL_CAPACITY);

    // --- Spawn tasks ---

    // Alert poller (background, every POLL_INTERVAL_SECS)
    let poller = AlertPoller::new(
        Arc::clone(&client),
        AlertEvaluator::new(Arc::clone(&rules), Arc::clone(&history)),
        Arc::clone(&rules),
        Arc::clone(&watchlist),
        alert_tx,
        Arc::clone(&health),
        Arc::clone(&latency),
        cfg.poll_interval_secs,
        cfg.markets_fetch_limit,
    );
    info!("Alert poller running every {}s", cfg.poll_interval_secs);
    tokio::spawn(async move { poller.run().await });

    // Notifier consumer
    tokio::spawn(async move { alert_consumer(alert_rx).await });

    // HTTP API server
    let api_state = ApiState {
        rules,
        history,
        watchlist,
        client,
        health,
        latency,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Receives fired alerts and logs them. Push delivery is not wired up.
async fn alert_consumer(mut rx: mpsc::Receiver<FiredAlert>) {
    while let Some(alert) = rx.recv().await {
        log_alert(&alert);
    }
}

fn log_alert(alert: &FiredAlert) {
    let title = alert.title();
    let message = alert.message();
    info!(
        event = "ALERT",
        platform = %alert.market.platform,
        market_id = %alert.market.id,
        rule_type = %alert.rule.rule_type,
        threshold = alert.rule.threshold,
        yes_price = alert.market.yes_price_or_zero(),
        price_change_24h = alert.market.price_change_or_zero(),
        "ALERT | {title} | {message}",
    );
}
