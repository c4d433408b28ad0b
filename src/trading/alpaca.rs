// Alpaca trading API broker
// Notional DAY market orders against a paper or live account

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::broker::{Broker, OrderSide};
use crate::config::PortfolioConfig;

const PAPER_BASE_URL: &str = "https://paper-api.alpaca.markets";
const LIVE_BASE_URL: &str = "https://api.alpaca.markets";

#[derive(Debug, Deserialize)]
struct AlpacaAccount {
    equity: String,
}

#[derive(Debug, Deserialize)]
struct AlpacaPosition {
    symbol: String,
}

#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    symbol: &'a str,
    /// Dollar amount with cent precision
    notional: String,
    side: OrderSide,
    #[serde(rename = "type")]
    order_type: &'static str,
    time_in_force: &'static str,
}

impl<'a> OrderRequest<'a> {
    fn market_day(symbol: &'a str, notional: f64, side: OrderSide) -> Self {
        Self {
            symbol,
            notional: format!("{:.2}", notional),
            side,
            order_type: "market",
            time_in_force: "day",
        }
    }
}

pub struct AlpacaBroker {
    client: reqwest::Client,
    api_key: String,
    secret_key: String,
    base_url: String,
    paper: bool,
}

impl AlpacaBroker {
    pub fn new(config: &PortfolioConfig) -> Result<Self> {
        let keys = (
            config.alpaca_api_key.as_deref().filter(|k| !k.trim().is_empty()),
            config.alpaca_secret_key.as_deref().filter(|k| !k.trim().is_empty()),
        );
        let (api_key, secret_key) = match keys {
            (Some(key), Some(secret)) => (key.to_string(), secret.to_string()),
            _ => return Err(anyhow!("Missing Alpaca API keys. Set ALPACA_API_KEY and ALPACA_SECRET_KEY")),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("wsb-agent/0.1.0")
            .build()
            .context("Failed to build Alpaca HTTP client")?;

        let base_url = if config.paper_trading { PAPER_BASE_URL } else { LIVE_BASE_URL };
        tracing::info!("Initialized AlpacaBroker (Paper Trading: {})", config.paper_trading);

        Ok(Self {
            client,
            api_key,
            secret_key,
            base_url: base_url.to_string(),
            paper: config.paper_trading,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_paper(&self) -> bool {
        self.paper
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v2/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .with_context(|| format!("Alpaca {} request failed", what))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!("Alpaca {} failed ({}): {}", what, status.as_u16(), body));
        }
        Ok(response)
    }
}

#[async_trait]
impl Broker for AlpacaBroker {
    async fn account_balance(&self) -> Result<f64> {
        let response = self.send(self.client.get(self.endpoint("account")), "account").await?;
        let account: AlpacaAccount = response.json().await.context("Invalid Alpaca account response")?;
        account
            .equity
            .parse::<f64>()
            .with_context(|| format!("Invalid Alpaca equity value: {}", account.equity))
    }

    async fn open_positions(&self) -> Result<Vec<String>> {
        let response = self.send(self.client.get(self.endpoint("positions")), "positions").await?;
        let positions: Vec<AlpacaPosition> = response.json().await.context("Invalid Alpaca positions response")?;
        Ok(positions.into_iter().map(|p| p.symbol).collect())
    }

    async fn submit_order(&self, ticker: &str, notional: f64, side: OrderSide) -> Result<()> {
        let order = OrderRequest::market_day(ticker, notional, side);
        self.send(self.client.post(self.endpoint("orders")).json(&order), "order")
            .await
            .with_context(|| format!("Failed to execute Alpaca order for {}", ticker))?;
        tracing::info!("ALPACA EXECUTED: {} ${:.2} of {}", side.to_string().to_uppercase(), notional, ticker);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "alpaca"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn portfolio(key: Option<&str>, secret: Option<&str>, paper: bool) -> PortfolioConfig {
        PortfolioConfig {
            broker: "alpaca".to_string(),
            alpaca_api_key: key.map(str::to_string),
            alpaca_secret_key: secret.map(str::to_string),
            paper_trading: paper,
            ..Config::default().portfolio
        }
    }

    /// Serve one canned JSON response per connection and hand back the raw requests
    async fn serve(bodies: Vec<&'static str>) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for body in bodies {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 8192];
                let n = stream.read(&mut buf).await.unwrap();
                requests.push(String::from_utf8_lossy(&buf[..n]).to_string());
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.ok();
            }
            requests
        });
        (format!("http://{}", addr), handle)
    }

    #[test]
    fn test_missing_keys_fail_fast() {
        assert!(AlpacaBroker::new(&portfolio(None, Some("secret"), true)).is_err());
        assert!(AlpacaBroker::new(&portfolio(Some("key"), None, true)).is_err());
        assert!(AlpacaBroker::new(&portfolio(Some(""), Some("secret"), true)).is_err());
    }

    #[test]
    fn test_paper_flag_selects_endpoint() {
        let paper = AlpacaBroker::new(&portfolio(Some("key"), Some("secret"), true)).unwrap();
        assert!(paper.is_paper());
        assert_eq!(paper.base_url(), PAPER_BASE_URL);

        let live = AlpacaBroker::new(&portfolio(Some("key"), Some("secret"), false)).unwrap();
        assert_eq!(live.base_url(), LIVE_BASE_URL);
        assert_eq!(live.name(), "alpaca");
    }

    #[test]
    fn test_order_body_is_notional_day_market() {
        let body = serde_json::to_value(OrderRequest::market_day("GME", 1234.567, OrderSide::Sell)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "symbol": "GME",
                "notional": "1234.57",
                "side": "sell",
                "type": "market",
                "time_in_force": "day"
            })
        );
    }

    #[tokio::test]
    async fn test_account_positions_and_order_round_trip() {
        let (url, server) = serve(vec![
            r#"{"equity": "25000.50", "cash": "1000"}"#,
            r#"[{"symbol": "GME", "qty": "3"}, {"symbol": "AMC", "qty": "10"}]"#,
            r#"{"id": "order-1", "status": "accepted"}"#,
        ])
        .await;
        let broker = AlpacaBroker::new(&portfolio(Some("key-id"), Some("shh"), true))
            .unwrap()
            .with_base_url(url);

        assert_eq!(broker.account_balance().await.unwrap(), 25000.5);
        assert_eq!(broker.open_positions().await.unwrap(), vec!["GME", "AMC"]);
        broker.submit_order("TSLA", 500.0, OrderSide::Buy).await.unwrap();

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("GET /v2/account "));
        assert!(requests[1].starts_with("GET /v2/positions "));
        assert!(requests[2].starts_with("POST /v2/orders "));
        let headers = requests[0].to_lowercase();
        assert!(headers.contains("apca-api-key-id: key-id"));
        assert!(headers.contains("apca-api-secret-key: shh"));
    }

    #[tokio::test]
    async fn test_unreachable_api_is_an_error() {
        let broker = AlpacaBroker::new(&portfolio(Some("key"), Some("secret"), true))
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        assert!(broker.account_balance().await.is_err());
        assert!(broker.submit_order("GME", 100.0, OrderSide::Buy).await.is_err());
    }
}
