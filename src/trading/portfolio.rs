// Portfolio manager
// Turns actionable signals into sized broker orders, one position per ticker

use super::broker::{Broker, OrderSide};
use super::position_sizing::PositionSizer;
use crate::config::PortfolioConfig;
use crate::signals::{Action, Signal};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeRecord {
    pub ticker: String,
    pub action: Action,
    pub amount: f64,
    pub reason: String,
}

pub struct PortfolioManager {
    sizer: PositionSizer,
    broker: Arc<dyn Broker>,
}

impl PortfolioManager {
    pub fn new(config: &PortfolioConfig, broker: Arc<dyn Broker>) -> Self {
        Self {
            sizer: PositionSizer::from_config(config),
            broker,
        }
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// Execute BUY/SELL signals against the broker and return the trades submitted
    ///
    /// BUY is skipped for tickers already held and SELL for tickers not held.
    /// If the broker cannot report balance or positions, nothing is traded.
    pub async fn execute_signals(&self, signals: &[Signal]) -> Vec<TradeRecord> {
        if signals.is_empty() {
            tracing::info!("No signals provided to portfolio manager.");
            return Vec::new();
        }

        let state = async {
            let balance = self.broker.account_balance().await?;
            let positions = self.broker.open_positions().await?;
            anyhow::Ok((balance, positions))
        };
        let (balance, mut holdings) = match state.await {
            Ok((balance, positions)) => (balance, positions.into_iter().collect::<HashSet<String>>()),
            Err(e) => {
                tracing::error!("Failed to fetch portfolio state from broker: {:#}", e);
                return Vec::new();
            }
        };

        tracing::info!(
            "Portfolio Manager processing {} signals. Current Balance: ${:.2} | Open Positions: {}",
            signals.len(),
            balance,
            holdings.len()
        );

        let mut trades = Vec::new();
        for signal in signals {
            let side = match signal.action {
                Action::Buy => OrderSide::Buy,
                Action::Sell => OrderSide::Sell,
                Action::Hold => continue,
            };
            let ticker = signal.ticker.as_str();
            let conviction = signal.composite_score.abs();

            let amount = match self.sizer.calculate_position_size(balance, conviction) {
                Ok(amount) => amount,
                Err(e) => {
                    tracing::warn!("[{}] Could not size position: {}", ticker, e);
                    continue;
                }
            };
            if !self.sizer.is_tradeable(amount) {
                tracing::info!("[{}] Trade amount (${:.2}) too small. Skipping.", ticker, amount);
                continue;
            }

            match side {
                OrderSide::Buy if holdings.contains(ticker) => {
                    tracing::info!("[{}] BUY signal skipped: Already holding position.", ticker);
                    continue;
                }
                OrderSide::Sell if !holdings.contains(ticker) => {
                    tracing::info!("[{}] SELL signal skipped: Not currently holding position.", ticker);
                    continue;
                }
                _ => {}
            }

            tracing::info!(
                "[{}] Executing {} for ${:.2} (Conviction: {:.2})",
                ticker,
                signal.action,
                amount,
                conviction
            );
            if let Err(e) = self.broker.submit_order(ticker, amount, side).await {
                tracing::error!("Failed to execute {} order for {}: {:#}", self.broker.name(), ticker, e);
                continue;
            }

            match side {
                OrderSide::Buy => holdings.insert(ticker.to_string()),
                OrderSide::Sell => holdings.remove(ticker),
            };
            trades.push(TradeRecord {
                ticker: ticker.to_string(),
                action: signal.action,
                amount,
                reason: signal.reasoning.clone(),
            });
        }

        tracing::info!("Portfolio Manager execution complete. {} trades submitted.", trades.len());
        trades
    }
}
