use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::keys;
use crate::error::{AppError, Result};
use crate::store::{load_json, load_json_or_default, save_json, KeyValueStore};
use crate::types::{AlertRule, AlertType};

/// CRUD over the persisted alert rule list (one JSON array under `alerts:v1`).
///
/// Duplicate rules are allowed and kept as distinct entries. Read-modify-write
/// operations are serialized so the API and the poller cannot drop each
/// other's updates within this process.
pub struct AlertRuleStore {
    kv: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl AlertRuleStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    /// All stored rules. Missing or corrupt data reads as an empty list.
    pub async fn list(&self) -> Vec<AlertRule> {
        let raw: Value = load_json_or_default(self.kv.as_ref(), keys::ALERT_RULES).await;
        decode_rules(raw)
    }

    /// Current list for a read-modify-write. A failed read is returned rather
    /// than treated as an empty list.
    async fn load(&self) -> Result<Vec<AlertRule>> {
        let raw: Value = load_json(self.kv.as_ref(), keys::ALERT_RULES).await?;
        Ok(decode_rules(raw))
    }

    /// Append a rule. It is stored un-triggered whatever the caller passed.
    pub async fn add(&self, rule: AlertRule) -> Result<AlertRule> {
        if !rule.threshold.is_finite() {
            return Err(AppError::InvalidRule(format!(
                "threshold must be a finite number, got {}",
                rule.threshold
            )));
        }
        if rule.market_id.is_empty() || rule.platform.is_empty() {
            return Err(AppError::InvalidRule(
                "marketId and platform are required".to_string(),
            ));
        }

        let rule = AlertRule {
            triggered: false,
            ..rule
        };

        let _guard = self.write_lock.lock().await;
        let mut rules = self.load().await?;
        rules.push(rule.clone());
        self.write(&rules).await?;
        Ok(rule)
    }

    /// Remove every rule on `(market_id, platform)`, whatever its type or
    /// threshold. Returns how many were removed. Alert history is untouched.
    pub async fn remove(&self, market_id: &str, platform: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut rules = self.load().await?;
        let before = rules.len();
        rules.retain(|r| !(r.market_id == market_id && r.platform == platform));
        let removed = before - rules.len();
        self.write(&rules).await?;
        Ok(removed)
    }

    /// Replace the whole stored list.
    pub async fn save(&self, rules: &[AlertRule]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(rules).await
    }

    /// Flag every stored rule sharing `rule`'s identity as triggered.
    pub async fn mark_triggered(&self, rule: &AlertRule) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut rules = self.load().await?;
        for stored in rules.iter_mut().filter(|r| r.same_identity(rule)) {
            stored.triggered = true;
        }
        self.write(&rules).await
    }

    async fn write(&self, rules: &[AlertRule]) -> Result<()> {
        save_json(self.kv.as_ref(), keys::ALERT_RULES, rules).await
    }
}

/// Decode the stored list record by record. Thresholds written as numeric
/// strings are accepted; records with an unknown type or a non-numeric
/// threshold are dropped.
fn decode_rules(raw: Value) -> Vec<AlertRule> {
    let items = match raw {
        Value::Array(items) => items,
        Value::Null => return Vec::new(),
        other => {
            warn!(key = keys::ALERT_RULES, "Stored alert rules are not a list: {other}");
            return Vec::new();
        }
    };

    let total = items.len();
    let rules: Vec<AlertRule> = items.iter().filter_map(decode_rule).collect();
    if rules.len() < total {
        warn!(
            dropped = total - rules.len(),
            "Dropped {} malformed alert rule(s)",
            total - rules.len()
        );
    }
    rules
}

fn decode_rule(item: &Value) -> Option<AlertRule> {
    let market_id = item.get("marketId")?.as_str()?;
    let platform = item.get("platform")?.as_str()?;
    let Some(rule_type) = item.get("type").and_then(Value::as_str).and_then(AlertType::parse) else {
        debug!(market_id, platform, "Alert rule has unknown type: {:?}", item.get("type"));
        return None;
    };
    let threshold = item.get("threshold").and_then(parse_number)?;
    let triggered = item.get("triggered").and_then(Value::as_bool).unwrap_or(false);

    Some(AlertRule {
        market_id: market_id.to_string(),
        platform: platform.to_string(),
        rule_type,
        threshold,
        triggered,
    })
}

/// Finite number from a JSON number or numeric string.
pub(crate) fn parse_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}
