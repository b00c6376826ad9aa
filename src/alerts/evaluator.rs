use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::alerts::history::AlertHistoryTracker;
use crate::alerts::rules::AlertRuleStore;
use crate::types::{AlertRule, AlertType, FiredAlert, Market, MarketKey};

/// Turns successive market snapshots into one-shot alerts.
///
/// A market's rules are only checked once the market has been seen on an
/// earlier tick of this process, so conditions that already held at startup do
/// not fire on the first poll. After a rule fires for a market its history key
/// suppresses it permanently, across restarts.
pub struct AlertEvaluator {
    rules: Arc<AlertRuleStore>,
    history: Arc<AlertHistoryTracker>,
    /// Last observed yes price per market. Lives only as long as the process.
    previous_prices: HashMap<MarketKey, f64>,
    /// History keys that fired here but could not be written to the history
    /// yet. They stay suppressed and the write is retried every tick.
    unrecorded: HashSet<String>,
}

impl AlertEvaluator {
    pub fn new(rules: Arc<AlertRuleStore>, history: Arc<AlertHistoryTracker>) -> Self {
        Self {
            rules,
            history,
            previous_prices: HashMap::new(),
            unrecorded: HashSet::new(),
        }
    }

    /// Run one tick. Returns the (market, rule) pairs that fired for the first time.
    ///
    /// Never fails: persistence errors are logged and the tick carries on.
    pub async fn evaluate(&mut self, markets: &[Market]) -> Vec<FiredAlert> {
        self.retry_unrecorded().await;
        let rules = self.rules.list().await;
        let mut fired = Vec::new();

        for market in markets {
            let previous = self
                .previous_prices
                .insert(market.key(), market.yes_price_or_zero());

            if previous.is_none() {
                debug!(market = %market.key(), "First observation, baseline recorded");
                continue;
            }

            for rule in rules.iter().filter(|r| r.applies_to(market)) {
                let history_key = rule.history_key();
                if self.unrecorded.contains(&history_key) {
                    continue;
                }
                match self.history.has_fired(&history_key).await {
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(key = %history_key, "Alert history unreadable, skipping rule: {e}");
                        continue;
                    }
                }
                if !condition_holds(market, rule) {
                    continue;
                }

                if let Err(e) = self.history.mark_fired(&history_key).await {
                    error!(key = %history_key, "Failed to record alert history: {e}");
                    self.unrecorded.insert(history_key.clone());
                }
                if let Err(e) = self.rules.mark_triggered(rule).await {
                    error!(key = %history_key, "Failed to persist triggered rule: {e}");
                }

                fired.push(FiredAlert {
                    market: market.clone(),
                    rule: AlertRule {
                        triggered: true,
                        ..rule.clone()
                    },
                });
            }
        }

        fired
    }

    async fn retry_unrecorded(&mut self) {
        for key in std::mem::take(&mut self.unrecorded) {
            if let Err(e) = self.history.mark_fired(&key).await {
                warn!(key = %key, "Alert history still not writable: {e}");
                self.unrecorded.insert(key);
            }
        }
    }

    /// Number of markets with a recorded baseline.
    pub fn tracked_markets(&self) -> usize {
        self.previous_prices.len()
    }
}

/// Compare the rule against the market's current values. Bounds are inclusive
/// and absent values count as 0.
fn condition_holds(market: &Market, rule: &AlertRule) -> bool {
    match rule.rule_type {
        AlertType::PriceAbove => market.yes_price_or_zero() >= rule.threshold,
        AlertType::PriceBelow => market.yes_price_or_zero() <= rule.threshold,
        AlertType::ChangeAbove => market.price_change_or_zero() >= rule.threshold,
        AlertType::ChangeBelow => market.price_change_or_zero() <= rule.threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::keys;
    use crate::store::{FlakyKvStore, KeyValueStore, MemoryKvStore};

    struct Fixture {
        kv: Arc<dyn KeyValueStore>,
        rules: Arc<AlertRuleStore>,
        history: Arc<AlertHistoryTracker>,
        evaluator: AlertEvaluator,
    }

    fn fixture() -> Fixture {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let rules = Arc::new(AlertRuleStore::new(Arc::clone(&kv)));
        let history = Arc::new(AlertHistoryTracker::new(Arc::clone(&kv)));
        let evaluator = AlertEvaluator::new(Arc::clone(&rules), Arc::clone(&history));
        Fixture {
            kv,
            rules,
            history,
            evaluator,
        }
    }

    fn market(platform: &str, id: &str, price: Option<f64>, change: Option<f64>) -> Market {
        Market {
            platform: platform.to_string(),
            id: id.to_string(),
            title: format!("Market {id}"),
            description: None,
            yes_price: price,
            price_change_24h: change,
        }
    }

    #[tokio::test]
    async fn fires_once_after_baseline_tick() {
        let mut f = fixture();
        f.rules
            .add(AlertRule::new("M1", "polymarket", AlertType::PriceAbove, 0.75))
            .await
            .unwrap();
        let snapshot = vec![market("polymarket", "M1", Some(0.80), None)];

        // Tick 1: first observation, condition already true but suppressed.
        assert!(f.evaluator.evaluate(&snapshot).await.is_empty());

        // Tick 2: baseline exists, fires exactly once.
        let fired = f.evaluator.evaluate(&snapshot).await;
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].market.id, "M1");
        assert_eq!(fired[0].rule.rule_type, AlertType::PriceAbove);
        assert!(fired[0].rule.triggered);

        // Tick 3: still true, already fired.
        assert!(f.evaluator.evaluate(&snapshot).await.is_empty());

        assert!(f.history.has_fired("polymarket-M1-price_above-0.75").await.unwrap());
        assert!(f.rules.list().await[0].triggered);
    }

    #[tokio::test]
    async fn condition_that_never_holds_does_not_fire() {
        let mut f = fixture();
        f.rules
            .add(AlertRule::new("M1", "polymarket", AlertType::PriceAbove, 0.75))
            .await
            .unwrap();

        for price in [0.5, 0.6, 0.74] {
            let snapshot = vec![market("polymarket", "M1", Some(price), None)];
            assert!(f.evaluator.evaluate(&snapshot).await.is_empty());
        }
        let fired = f
            .evaluator
            .evaluate(&[market("polymarket", "M1", Some(0.75), None)])
            .await;
        assert_eq!(fired.len(), 1, "threshold is inclusive");
    }

    #[tokio::test]
    async fn change_rules_use_current_24h_change() {
        let mut f = fixture();
        f.rules
            .add(AlertRule::new("K1", "kalshi", AlertType::ChangeBelow, -0.05))
            .await
            .unwrap();
        f.rules
            .add(AlertRule::new("K1", "kalshi", AlertType::ChangeAbove, 0.05))
            .await
            .unwrap();

        f.evaluator
            .evaluate(&[market("kalshi", "K1", Some(0.4), Some(-0.10))])
            .await;
        let fired = f
            .evaluator
            .evaluate(&[market("kalshi", "K1", Some(0.4), Some(-0.10))])
            .await;
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].rule.rule_type, AlertType::ChangeBelow);
    }

    #[tokio::test]
    async fn absent_values_count_as_zero() {
        let mut f = fixture();
        f.rules
            .add(AlertRule::new("M1", "polymarket", AlertType::PriceBelow, 0.1))
            .await
            .unwrap();
        let snapshot = vec![market("polymarket", "M1", None, None)];

        assert!(f.evaluator.evaluate(&snapshot).await.is_empty());
        assert_eq!(f.evaluator.evaluate(&snapshot).await.len(), 1);
    }

    #[tokio::test]
    async fn baseline_is_per_market() {
        let mut f = fixture();
        f.rules
            .add(AlertRule::new("M1", "polymarket", AlertType::PriceAbove, 0.5))
            .await
            .unwrap();
        f.rules
            .add(AlertRule::new("M2", "polymarket", AlertType::PriceAbove, 0.5))
            .await
            .unwrap();

        f.evaluator
            .evaluate(&[market("polymarket", "M1", Some(0.9), None)])
            .await;
        let fired = f
            .evaluator
            .evaluate(&[
                market("polymarket", "M1", Some(0.9), None),
                market("polymarket", "M2", Some(0.9), None),
            ])
            .await;
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].market.id, "M1");
        assert_eq!(f.evaluator.tracked_markets(), 2);
    }

    #[tokio::test]
    async fn rules_only_match_their_own_platform() {
        let mut f = fixture();
        f.rules
            .add(AlertRule::new("X1", "kalshi", AlertType::PriceAbove, 0.5))
            .await
            .unwrap();
        let snapshot = vec![market("polymarket", "X1", Some(0.9), None)];

        f.evaluator.evaluate(&snapshot).await;
        assert!(f.evaluator.evaluate(&snapshot).await.is_empty());
    }

    #[tokio::test]
    async fn baseline_is_recorded_even_without_rules() {
        let mut f = fixture();
        let snapshot = vec![market("polymarket", "M1", Some(0.9), None)];
        f.evaluator.evaluate(&snapshot).await;

        f.rules
            .add(AlertRule::new("M1", "polymarket", AlertType::PriceAbove, 0.5))
            .await
            .unwrap();
        assert_eq!(f.evaluator.evaluate(&snapshot).await.len(), 1);
    }

    #[tokio::test]
    async fn suppression_survives_restart_and_rule_deletion() {
        let mut f = fixture();
        let rule = AlertRule::new("M1", "polymarket", AlertType::PriceAbove, 0.75);
        f.rules.add(rule.clone()).await.unwrap();
        let snapshot = vec![market("polymarket", "M1", Some(0.8), None)];
        f.evaluator.evaluate(&snapshot).await;
        assert_eq!(f.evaluator.evaluate(&snapshot).await.len(), 1);

        // Delete and re-add the identical rule: history still suppresses it.
        f.rules.remove("M1", "polymarket").await.unwrap();
        f.rules.add(rule.clone()).await.unwrap();
        assert!(f.history.has_fired(&rule.history_key()).await.unwrap());

        // A new process over the same store starts without baselines.
        let rules = Arc::new(AlertRuleStore::new(Arc::clone(&f.kv)));
        let history = Arc::new(AlertHistoryTracker::new(Arc::clone(&f.kv)));
        let mut restarted = AlertEvaluator::new(rules, Arc::clone(&history));
        assert!(restarted.evaluate(&snapshot).await.is_empty());
        assert!(restarted.evaluate(&snapshot).await.is_empty());

        // Clearing the history key re-arms it.
        history.forget(&rule.history_key()).await.unwrap();
        assert_eq!(restarted.evaluate(&snapshot).await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_rules_fire_once_per_history_key() {
        let mut f = fixture();
        let rule = AlertRule::new("M1", "polymarket", AlertType::PriceAbove, 0.75);
        f.rules.add(rule.clone()).await.unwrap();
        f.rules.add(rule).await.unwrap();
        let snapshot = vec![market("polymarket", "M1", Some(0.8), None)];

        f.evaluator.evaluate(&snapshot).await;
        assert_eq!(f.evaluator.evaluate(&snapshot).await.len(), 1);
        assert!(f.rules.list().await.iter().all(|r| r.triggered));
    }

    fn flaky_fixture() -> (Arc<FlakyKvStore>, Arc<AlertRuleStore>, Arc<AlertHistoryTracker>, AlertEvaluator) {
        let kv = Arc::new(FlakyKvStore::default());
        let rules = Arc::new(AlertRuleStore::new(kv.clone()));
        let history = Arc::new(AlertHistoryTracker::new(kv.clone()));
        let evaluator = AlertEvaluator::new(Arc::clone(&rules), Arc::clone(&history));
        (kv, rules, history, evaluator)
    }

    #[tokio::test]
    async fn failed_history_write_still_fires_only_once() {
        let (kv, rules, history, mut evaluator) = flaky_fixture();
        let rule = AlertRule::new("M1", "polymarket", AlertType::PriceAbove, 0.75);
        rules.add(rule.clone()).await.unwrap();
        let snapshot = vec![market("polymarket", "M1", Some(0.8), None)];
        evaluator.evaluate(&snapshot).await;

        kv.fail_next_writes(keys::ALERT_HISTORY, 1);
        assert_eq!(evaluator.evaluate(&snapshot).await.len(), 1);
        assert!(!history.has_fired(&rule.history_key()).await.unwrap());

        // Next tick: suppressed, and the pending history write lands.
        assert!(evaluator.evaluate(&snapshot).await.is_empty());
        assert!(history.has_fired(&rule.history_key()).await.unwrap());
        assert!(evaluator.evaluate(&snapshot).await.is_empty());
    }

    #[tokio::test]
    async fn unreadable_history_skips_the_rule() {
        let (kv, rules, history, mut evaluator) = flaky_fixture();
        let rule = AlertRule::new("M1", "polymarket", AlertType::PriceAbove, 0.75);
        rules.add(rule.clone()).await.unwrap();
        history.mark_fired(&rule.history_key()).await.unwrap();
        let snapshot = vec![market("polymarket", "M1", Some(0.8), None)];
        evaluator.evaluate(&snapshot).await;

        kv.fail_next_reads(keys::ALERT_HISTORY, 1);
        assert!(evaluator.evaluate(&snapshot).await.is_empty());
        assert!(history.has_fired(&rule.history_key()).await.unwrap());
    }
}
