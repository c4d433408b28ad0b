//! Signal generation: market features and the composite scoring engine

pub mod engine;
pub mod market_features;

pub use engine::SignalEngine;
pub use market_features::{MarketFeatureExtractor, MarketFeatures};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        }
    }

    pub fn is_actionable(&self) -> bool {
        !matches!(self, Action::Hold)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(Action::Buy),
            "SELL" => Ok(Action::Sell),
            "HOLD" => Ok(Action::Hold),
            other => Err(anyhow::anyhow!("Unknown signal action: {}", other)),
        }
    }
}

/// Normalised contributions, each in [-1, 1]
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SignalComponents {
    pub sentiment: f64,
    pub velocity: f64,
    pub volume: f64,
    pub momentum: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub ticker: String,
    pub composite_score: f64,
    pub action: Action,
    pub confidence: f64,
    pub components: SignalComponents,
    pub reasoning: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_round_trips_through_strings() {
        assert_eq!("buy".parse::<Action>().unwrap(), Action::Buy);
        assert_eq!(Action::Sell.to_string(), "SELL");
        assert!("short".parse::<Action>().is_err());
        assert_eq!(serde_json::to_string(&Action::Hold).unwrap(), "\"HOLD\"");
    }

    #[test]
    fn test_actionable() {
        assert!(Action::Buy.is_actionable());
        assert!(Action::Sell.is_actionable());
        assert!(!Action::Hold.is_actionable());
    }
}
