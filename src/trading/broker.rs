// Broker abstraction
// Orders are notional (dollar amount) market orders; brokers report equity and held symbols

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::alpaca::AlpacaBroker;
use crate::config::{ConfigError, PortfolioConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => f.write_str("buy"),
            OrderSide::Sell => f.write_str("sell"),
        }
    }
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Total equity available to size positions against
    async fn account_balance(&self) -> Result<f64>;

    /// Symbols currently held
    async fn open_positions(&self) -> Result<Vec<String>>;

    async fn submit_order(&self, ticker: &str, notional: f64, side: OrderSide) -> Result<()>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MockOrder {
    pub ticker: String,
    pub notional: f64,
    pub side: OrderSide,
}

#[derive(Debug, Default)]
struct MockState {
    balance: f64,
    positions: BTreeSet<String>,
    orders: Vec<MockOrder>,
}

/// In-memory broker that logs orders instead of routing them anywhere
#[derive(Debug)]
pub struct MockBroker {
    state: Mutex<MockState>,
}

impl MockBroker {
    pub fn new(initial_balance: f64) -> Self {
        tracing::info!("Initialized MockBroker with ${:.2} equity", initial_balance);
        Self {
            state: Mutex::new(MockState {
                balance: initial_balance,
                ..MockState::default()
            }),
        }
    }

    pub fn with_positions<I, S>(initial_balance: f64, positions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            state: Mutex::new(MockState {
                balance: initial_balance,
                positions: positions.into_iter().map(Into::into).collect(),
                orders: Vec::new(),
            }),
        }
    }

    /// Orders submitted so far, oldest first
    pub async fn orders(&self) -> Vec<MockOrder> {
        self.state.lock().await.orders.clone()
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn account_balance(&self) -> Result<f64> {
        Ok(self.state.lock().await.balance)
    }

    async fn open_positions(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().await.positions.iter().cloned().collect())
    }

    async fn submit_order(&self, ticker: &str, notional: f64, side: OrderSide) -> Result<()> {
        let mut state = self.state.lock().await;
        match side {
            OrderSide::Buy => {
                state.positions.insert(ticker.to_string());
                tracing::info!("MOCK BUY EXECUTED: ${:.2} of {}", notional, ticker);
            }
            OrderSide::Sell => {
                state.positions.remove(ticker);
                tracing::info!("MOCK SELL EXECUTED: ${:.2} of {}", notional, ticker);
            }
        }
        state.orders.push(MockOrder {
            ticker: ticker.to_string(),
            notional,
            side,
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Broker named by `portfolio.broker`; Alpaca fails here when its keys are missing
pub fn create_broker(config: &PortfolioConfig) -> Result<Arc<dyn Broker>> {
    match config.broker.as_str() {
        "mock" => Ok(Arc::new(MockBroker::new(config.initial_balance))),
        "alpaca" => Ok(Arc::new(AlpacaBroker::new(config)?)),
        other => Err(ConfigError::UnknownVariant {
            kind: "broker",
            value: other.to_string(),
            supported: "mock, alpaca",
        }
        .into()),
    }
}
