use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::alerts::{AlertEvaluator, AlertRuleStore};
use crate::api::health::HealthState;
use crate::api::latency::TickLatency;
use crate::fetcher::PolyrouterClient;
use crate::types::{AlertRule, FiredAlert, Market, MarketKey, WatchlistItem};
use crate::watchlist::WatchlistStore;

/// Fixed-interval driver for the alert evaluator.
///
/// Ticks run one after another on this task; a slow tick delays the next one
/// instead of overlapping it.
pub struct AlertPoller {
    client: Arc<PolyrouterClient>,
    evaluator: AlertEvaluator,
    rules: Arc<AlertRuleStore>,
    watchlist: Arc<WatchlistStore>,
    alert_tx: mpsc::Sender<FiredAlert>,
    health: Arc<HealthState>,
    latency: Arc<TickLatency>,
    interval_secs: u64,
    fetch_limit: usize,
}

impl AlertPoller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<PolyrouterClient>,
        evaluator: AlertEvaluator,
        rules: Arc<AlertRuleStore>,
        watchlist: Arc<WatchlistStore>,
        alert_tx: mpsc::Sender<FiredAlert>,
        health: Arc<HealthState>,
        latency: Arc<TickLatency>,
        interval_secs: u64,
        fetch_limit: usize,
    ) -> Self {
        Self {
            client,
            evaluator,
            rules,
            watchlist,
            alert_tx,
            health,
            latency,
            interval_secs,
            fetch_limit,
        }
    }

    pub async fn run(mut self) {
        let mut ticker = interval(Duration::from_secs(self.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    async fn tick(&mut self) {
        let started = Instant::now();

        let markets = match self.client.fetch_markets(self.fetch_limit).await {
            Ok(m) => m,
            Err(e) => {
                error!("Market fetch failed, skipping tick: {e}");
                self.health.record_failed_poll();
                return;
            }
        };
        let fetched = markets.len();
        let (evaluated, fired) = self.process(markets).await;

        let elapsed = started.elapsed();
        self.latency.record(elapsed);
        self.health.record_poll(now_ns(), evaluated, fired);

        info!(
            fetched,
            evaluated,
            fired,
            tracked = self.evaluator.tracked_markets(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Poll tick complete: {evaluated}/{fetched} markets evaluated, {fired} alert(s) fired",
        );
    }

    /// Evaluate the watched markets of one snapshot and hand fired alerts to
    /// the notifier. Returns `(markets evaluated, alerts fired)`.
    async fn process(&mut self, markets: Vec<Market>) -> (usize, usize) {
        let watchlist = self.watchlist.list().await;
        let rules = self.rules.list().await;
        let watched = select_watched(markets, &watchlist, &rules);

        let fired = self.evaluator.evaluate(&watched).await;
        let fired_count = fired.len();
        for alert in fired {
            if let Err(e) = self.alert_tx.send(alert).await {
                warn!("Notifier channel closed, dropping alert: {e}");
            }
        }

        (watched.len(), fired_count)
    }
}

/// Markets that are on the watchlist or have at least one rule, in snapshot order.
fn select_watched(markets: Vec<Market>, watchlist: &[WatchlistItem], rules: &[AlertRule]) -> Vec<Market> {
    let wanted: HashSet<MarketKey> = watchlist
        .iter()
        .map(|i| MarketKey {
            platform: i.platform.clone(),
            id: i.market_id.clone(),
        })
        .chain(rules.iter().map(|r| MarketKey {
            platform: r.platform.clone(),
            id: r.market_id.clone(),
        }))
        .collect();

    markets
        .into_iter()
        .filter(|m| wanted.contains(&m.key()))
        .collect()
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
