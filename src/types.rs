use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// A market listing as observed on one platform at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub platform: String,
    /// Unique within `platform` only.
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub yes_price: Option<f64>,
    pub price_change_24h: Option<f64>,
}

impl Market {
    pub fn key(&self) -> MarketKey {
        MarketKey {
            platform: self.platform.clone(),
            id: self.id.clone(),
        }
    }

    /// Current yes price, 0 when the upstream omitted it.
    pub fn yes_price_or_zero(&self) -> f64 {
        self.yes_price.unwrap_or(0.0)
    }

    /// 24h price change, 0 when the upstream omitted it.
    pub fn price_change_or_zero(&self) -> f64 {
        self.price_change_24h.unwrap_or(0.0)
    }
}

/// Identity of a market across snapshots: `(platform, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarketKey {
    pub platform: String,
    pub id: String,
}

impl std::fmt::Display for MarketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.platform, self.id)
    }
}

// ---------------------------------------------------------------------------
// MarketGroup
// ---------------------------------------------------------------------------

/// Listings believed to describe the same real-world event.
///
/// Never empty. The first member is the seed the others were matched against;
/// members keep the order in which clustering discovered them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketGroup {
    markets: Vec<Market>,
}

impl MarketGroup {
    pub fn seeded(seed: Market) -> Self {
        Self { markets: vec![seed] }
    }

    pub fn push(&mut self, market: Market) {
        self.markets.push(market);
    }

    pub fn seed(&self) -> &Market {
        &self.markets[0]
    }

    pub fn markets(&self) -> &[Market] {
        &self.markets
    }

    // A group always holds its seed, so there is no `is_empty`.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.markets.len()
    }
}

// ---------------------------------------------------------------------------
// Alert rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// Yes price at or above the threshold.
    PriceAbove,
    /// Yes price at or below the threshold.
    PriceBelow,
    /// 24h change at or above the threshold.
    ChangeAbove,
    /// 24h change at or below the threshold.
    ChangeBelow,
}

impl AlertType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "price_above" => Some(AlertType::PriceAbove),
            "price_below" => Some(AlertType::PriceBelow),
            "change_above" => Some(AlertType::ChangeAbove),
            "change_below" => Some(AlertType::ChangeBelow),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertType::PriceAbove => "price_above",
            AlertType::PriceBelow => "price_below",
            AlertType::ChangeAbove => "change_above",
            AlertType::ChangeBelow => "change_below",
        };
        write!(f, "{s}")
    }
}

/// A user-defined notification condition on one market.
///
/// Serialized with the persisted field names (`marketId`, `type`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub market_id: String,
    pub platform: String,
    #[serde(rename = "type")]
    pub rule_type: AlertType,
    pub threshold: f64,
    /// Best-effort marker. The alert history is what actually suppresses re-firing.
    #[serde(default)]
    pub triggered: bool,
}

impl AlertRule {
    pub fn new(market_id: &str, platform: &str, rule_type: AlertType, threshold: f64) -> Self {
        Self {
            market_id: market_id.to_string(),
            platform: platform.to_string(),
            rule_type,
            threshold,
            triggered: false,
        }
    }

    pub fn applies_to(&self, market: &Market) -> bool {
        self.platform == market.platform && self.market_id == market.id
    }

    /// True when both rules share `(marketId, platform, type, threshold)`.
    pub fn same_identity(&self, other: &AlertRule) -> bool {
        self.market_id == other.market_id
            && self.platform == other.platform
            && self.rule_type == other.rule_type
            && self.threshold == other.threshold
    }

    /// `"{platform}-{marketId}-{type}-{threshold}"`, the permanent alert history key.
    pub fn history_key(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.platform, self.market_id, self.rule_type, self.threshold
        )
    }
}

/// A rule whose condition newly held for a market during an evaluation tick.
#[derive(Debug, Clone, PartialEq)]
pub struct FiredAlert {
    pub market: Market,
    pub rule: AlertRule,
}

// ---------------------------------------------------------------------------
// Watchlist
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistItem {
    pub platform: String,
    pub market_id: String,
    pub title: String,
    pub added_at: DateTime<Utc>,
}

impl WatchlistItem {
    pub fn is_market(&self, platform: &str, market_id: &str) -> bool {
        self.platform == platform && self.market_id == market_id
    }
}
