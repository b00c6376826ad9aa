use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::alerts::rules::parse_number;
use crate::config::{Config, UPSTREAM_RETRIES, UPSTREAM_RETRY_DELAY_MS, UPSTREAM_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::types::Market;

/// Client for the polyrouter aggregation API, the source of market snapshots
/// across platforms.
pub struct PolyrouterClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl PolyrouterClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(UPSTREAM_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: cfg.polyrouter_api_url.trim_end_matches('/').to_string(),
            api_key: cfg.polyrouter_api_key.clone(),
        })
    }

    /// Latest listings across all platforms.
    pub async fn fetch_markets(&self, limit: usize) -> Result<Vec<Market>> {
        let resp = self
            .get_json("/markets-v2", &[("limit", limit.to_string())])
            .await?;
        parse_markets_response(&resp)
    }

    /// Full-text search. Falls back to filtering the latest listings locally
    /// when the search endpoint is unavailable.
    pub async fn search_markets(&self, query: &str, limit: usize) -> Result<Vec<Market>> {
        let search = self
            .get_json("/v2/search-markets", &[("query", query.to_string())])
            .await
            .and_then(|resp| parse_markets_response(&resp));

        match search {
            Ok(markets) => Ok(markets),
            Err(e @ AppError::Config(_)) => Err(e),
            Err(e) => {
                info!("Search endpoint unavailable ({e}), falling back to markets filter");
                let markets = self.fetch_markets(limit).await?;
                Ok(filter_by_query(markets, query))
            }
        }
    }

    async fn get_json(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Config("POLYROUTER_API_KEY is not configured".to_string()))?;
        let url = format!("{}{}", self.base_url, endpoint);

        let mut attempt = 0;
        loop {
            match self.try_get_json(&url, api_key, params).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < UPSTREAM_RETRIES => {
                    attempt += 1;
                    warn!(endpoint, attempt, "Upstream request failed, retrying: {e}");
                    tokio::time::sleep(Duration::from_millis(UPSTREAM_RETRY_DELAY_MS)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_get_json(&self, url: &str, api_key: &str, params: &[(&str, String)]) -> Result<Value> {
        let resp = self
            .client
            .get(url)
            .header("X-API-Key", api_key)
            .query(params)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!("HTTP {status} from {url}")));
        }
        Ok(resp.json().await?)
    }
}

/// Parse `{ "markets": [...] }`. Entries without an id or platform are skipped.
fn parse_markets_response(resp: &Value) -> Result<Vec<Market>> {
    let Some(items) = resp.get("markets").and_then(Value::as_array) else {
        return Err(AppError::Upstream(
            "markets response has no `markets` array".to_string(),
        ));
    };

    let markets: Vec<Market> = items.iter().filter_map(parse_market).collect();
    if markets.len() < items.len() {
        debug!(
            skipped = items.len() - markets.len(),
            "Skipped markets without id or platform"
        );
    }
    Ok(markets)
}

fn parse_market(item: &Value) -> Option<Market> {
    let id = match item.get("id")? {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let platform = item.get("platform").and_then(Value::as_str).filter(|p| !p.is_empty())?;

    Some(Market {
        platform: platform.to_string(),
        id,
        title: item
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        description: item
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        yes_price: item.pointer("/current_prices/yes/price").and_then(parse_number),
        price_change_24h: item.get("price_change_24h").and_then(parse_number),
    })
}

/// Case-insensitive substring match on title or description.
fn filter_by_query(markets: Vec<Market>, query: &str) -> Vec<Market> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return markets;
    }
    markets
        .into_iter()
        .filter(|m| {
            m.title.to_lowercase().contains(&query)
                || m
                    .description
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().contains(&query))
        })
        .collect()
}
