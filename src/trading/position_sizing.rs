// Conviction-based position sizing
// Notional = base amount scaled by |composite score|, capped at a fraction of equity

use crate::config::PortfolioConfig;
use anyhow::{bail, Result};

/// Orders below this notional are not worth routing
pub const MIN_TRADE_AMOUNT: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct PositionSizer {
    /// Dollar amount for a conviction of 1.0
    pub base_trade_amount: f64,

    /// Maximum position size as percentage of account (e.g., 0.05 = 5%)
    pub max_position_size_pct: f64,
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self {
            base_trade_amount: 1000.0,
            max_position_size_pct: 0.05,
        }
    }
}

impl PositionSizer {
    pub fn new(base_trade_amount: f64, max_position_size_pct: f64) -> Self {
        Self {
            base_trade_amount,
            max_position_size_pct,
        }
    }

    pub fn from_config(config: &PortfolioConfig) -> Self {
        Self::new(config.base_trade_amount, config.max_position_size_pct)
    }

    pub fn max_trade_size(&self, account_balance: f64) -> f64 {
        account_balance * self.max_position_size_pct
    }

    /// `min(base × |conviction|, balance × max_pct)`
    pub fn calculate_position_size(&self, account_balance: f64, conviction: f64) -> Result<f64> {
        if !account_balance.is_finite() {
            bail!("Account balance must be finite");
        }
        if !conviction.is_finite() {
            bail!("Conviction must be finite");
        }

        let desired = self.base_trade_amount * conviction.abs();
        Ok(desired.min(self.max_trade_size(account_balance)))
    }

    /// Whether a sized amount clears the minimum trade size
    pub fn is_tradeable(&self, amount: f64) -> bool {
        amount >= MIN_TRADE_AMOUNT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scales_with_conviction() {
        let sizer = PositionSizer::default();
        let position = sizer.calculate_position_size(100_000.0, 0.8).unwrap();
        // 1000 * 0.8 = 800, under the 5000 cap
        assert!((position - 800.0).abs() < 1e-9);

        let short = sizer.calculate_position_size(100_000.0, -0.5).unwrap();
        assert!((short - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_capped_at_max_pct() {
        let sizer = PositionSizer::default();
        // 5% of 10000 = 500 caps 1000 * 0.9
        let position = sizer.calculate_position_size(10_000.0, 0.9).unwrap();
        assert!((position - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_tiny_positions_not_tradeable() {
        let sizer = PositionSizer::default();
        let position = sizer.calculate_position_size(10.0, 1.0).unwrap();
        // 5% of 10 = 0.5
        assert!(!sizer.is_tradeable(position));
        assert!(sizer.is_tradeable(1.0));
    }

    #[test]
    fn test_rejects_non_finite_inputs() {
        let sizer = PositionSizer::default();
        assert!(sizer.calculate_position_size(f64::NAN, 0.5).is_err());
        assert!(sizer.calculate_position_size(1000.0, f64::INFINITY).is_err());
    }
}
