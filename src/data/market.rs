use super::retry::retry_with_backoff;
use super::validation::{validate_price_bar, validate_symbol};
use super::{DataError, DataResult, PriceBar};
use crate::config::MarketConfig;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

const POLYGON_BASE_URL: &str = "https://api.polygon.io";

/// Source of daily price history for a ticker
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Daily bars in chronological order, or `None` when the ticker has no data
    async fn price_history(&self, ticker: &str) -> DataResult<Option<Vec<PriceBar>>>;

    /// Latest close, derived from the price history
    async fn current_price(&self, ticker: &str) -> DataResult<Option<f64>> {
        let history = self.price_history(ticker).await?;
        Ok(history.and_then(|bars| bars.last().and_then(|bar| bar.close)))
    }

    fn name(&self) -> &'static str;
}

/// Polygon.io API response structures
#[derive(Debug, Deserialize)]
struct PolygonAggregatesResponse {
    results: Option<Vec<PolygonAggregate>>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct PolygonAggregate {
    #[serde(rename = "v")]
    volume: Option<f64>, // Polygon sometimes returns volume as float
    #[serde(rename = "o")]
    open: Option<f64>,
    #[serde(rename = "c")]
    close: Option<f64>,
    #[serde(rename = "h")]
    high: Option<f64>,
    #[serde(rename = "l")]
    low: Option<f64>,
    #[serde(rename = "t")]
    timestamp: i64, // Unix milliseconds
}

/// Rate limiter for API calls (token bucket algorithm)
struct RateLimiter {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
    last_refill: DateTime<Utc>,
}

impl RateLimiter {
    fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            tokens: max_tokens,
            max_tokens,
            refill_rate,
            last_refill: Utc::now(),
        }
    }

    fn refill(&mut self) {
        let now = Utc::now();
        let elapsed = (now - self.last_refill).num_milliseconds() as f64 / 1000.0;
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }

    /// Consume a token if one is available, otherwise report the wait in seconds
    fn try_consume(&mut self) -> Result<(), f64> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err((1.0 - self.tokens) / self.refill_rate)
        }
    }
}

type CacheEntry = (Option<Vec<PriceBar>>, DateTime<Utc>);

/// Polygon.io daily aggregates with a per-ticker TTL cache
pub struct PolygonProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    history_days: i64,
    cache_ttl: Duration,
    cache: Mutex<HashMap<String, CacheEntry>>,
    rate_limiter: Mutex<RateLimiter>,
}

impl PolygonProvider {
    pub fn new(config: &MarketConfig) -> DataResult<Self> {
        let api_key = config.polygon_api_key.clone().ok_or_else(|| {
            DataError::Config(
                "POLYGON_API_KEY environment variable must be set. Get your free API key from https://polygon.io"
                    .to_string(),
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("wsb-agent/0.1.0")
            .build()?;

        // Free tier: 5 calls per minute, burst of 5
        let rate_limiter = Mutex::new(RateLimiter::new(5.0, 5.0 / 60.0));

        Ok(Self {
            client,
            api_key,
            base_url: POLYGON_BASE_URL.to_string(),
            history_days: config.history_days,
            cache_ttl: Duration::minutes(config.cache_ttl_minutes),
            cache: Mutex::new(HashMap::new()),
            rate_limiter,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn wait_for_token(&self) {
        loop {
            let wait = {
                let mut limiter = self.rate_limiter.lock().await;
                match limiter.try_consume() {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            tracing::info!("Rate limit: waiting {:.1}s before making API call", wait);
            tokio::time::sleep(std::time::Duration::from_secs_f64(wait.max(0.1))).await;
        }
    }

    fn aggregates_url(&self, ticker: &str) -> DataResult<Url> {
        let end_date = Utc::now().date_naive();
        let start_date = end_date - Duration::days(self.history_days);

        let mut url = Url::parse(&format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            self.base_url.trim_end_matches('/'),
            ticker,
            start_date.format("%Y-%m-%d"),
            end_date.format("%Y-%m-%d"),
        ))
        .map_err(|e| DataError::Config(format!("Invalid Polygon URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("adjusted", "true")
            .append_pair("sort", "asc")
            .append_pair("apiKey", &self.api_key);
        Ok(url)
    }

    async fn fetch_aggregates(&self, ticker: &str) -> DataResult<Option<Vec<PriceBar>>> {
        self.wait_for_token().await;

        let url = self.aggregates_url(ticker)?;
        tracing::debug!("Polygon API request: GET {}", url.as_str().replace(&self.api_key, "***"));

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status_code = response.status().as_u16();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            tracing::error!("Polygon.io API failed ({}): {}", status_code, error_text);
            return Err(DataError::api_error(status_code, format!("Polygon.io: {}", error_text)));
        }

        let polygon_response: PolygonAggregatesResponse = response.json().await?;

        // DELAYED is returned for free/basic tier subscriptions
        match polygon_response.status.as_str() {
            "OK" => {}
            "DELAYED" => tracing::debug!("Polygon.io status: DELAYED for {}", ticker),
            status => {
                return Err(DataError::api_error(
                    502,
                    format!("Polygon.io returned error status: {}", status),
                ))
            }
        }

        let results = match polygon_response.results {
            Some(results) if !results.is_empty() => results,
            _ => {
                tracing::warn!("No price data returned for {}", ticker);
                return Ok(None);
            }
        };

        let mut bars = Vec::with_capacity(results.len());
        for agg in results {
            let datetime = DateTime::from_timestamp_millis(agg.timestamp)
                .ok_or_else(|| DataError::parse_error(format!("Invalid timestamp: {}", agg.timestamp)))?;
            let bar = PriceBar {
                date: datetime.date_naive(),
                open: agg.open,
                high: agg.high,
                low: agg.low,
                close: agg.close,
                volume: agg.volume,
            };
            match validate_price_bar(&bar) {
                Ok(()) => bars.push(bar),
                Err(e) => tracing::warn!("Dropping invalid {} bar for {}: {}", ticker, bar.date, e),
            }
        }

        tracing::info!("Fetched {} daily bars from Polygon.io for {}", bars.len(), ticker);
        Ok(Some(bars))
    }
}

#[async_trait]
impl MarketDataProvider for PolygonProvider {
    async fn price_history(&self, ticker: &str) -> DataResult<Option<Vec<PriceBar>>> {
        validate_symbol(ticker)?;
        {
            let cache = self.cache.lock().await;
            if let Some((bars, cached_at)) = cache.get(ticker) {
                let age = Utc::now() - *cached_at;
                if age < self.cache_ttl {
                    tracing::debug!("Cache hit for {} (age: {}s)", ticker, age.num_seconds());
                    return Ok(bars.clone());
                }
            }
        }

        tracing::info!("Fetching price history for {} (last {} days)", ticker, self.history_days);
        let bars = retry_with_backoff(|| self.fetch_aggregates(ticker), 3).await?;

        self.cache
            .lock()
            .await
            .insert(ticker.to_string(), (bars.clone(), Utc::now()));
        Ok(bars)
    }

    fn name(&self) -> &'static str {
        "polygon"
    }
}

/// Fixed in-memory series, used for dry runs and tests
#[derive(Debug, Clone, Default)]
pub struct StaticMarketData {
    series: HashMap<String, Vec<PriceBar>>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, ticker: &str, bars: Vec<PriceBar>) -> Self {
        self.series.insert(ticker.to_uppercase(), bars);
        self
    }

    /// Load a `{ "TICKER": [PriceBar, ...] }` JSON document
    pub fn from_json_file(path: &Path) -> DataResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let series: HashMap<String, Vec<PriceBar>> = serde_json::from_str(&raw)?;
        Ok(Self { series })
    }
}

#[async_trait]
impl MarketDataProvider for StaticMarketData {
    async fn price_history(&self, ticker: &str) -> DataResult<Option<Vec<PriceBar>>> {
        Ok(self.series.get(ticker).filter(|bars| !bars.is_empty()).cloned())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Build the configured market data provider
pub fn create_market_provider(config: &MarketConfig) -> DataResult<Arc<dyn MarketDataProvider>> {
    match config.provider.as_str() {
        "polygon" => Ok(Arc::new(PolygonProvider::new(config)?)),
        "static" => Ok(Arc::new(StaticMarketData::new())),
        other => Err(DataError::Config(format!(
            "Unknown market data provider: {}. Supported: polygon, static",
            other
        ))),
    }
}
