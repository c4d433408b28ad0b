//! Return, volatility and volume features from daily price history

use crate::data::PriceBar;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const VOLATILITY_WINDOW: usize = 20;
const VOLUME_SHORT_WINDOW: usize = 5;
const VOLUME_LONG_WINDOW: usize = 20;

/// Every numeric field is independently optional; `None` means unknown, never zero
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketFeatures {
    pub ticker: String,
    pub current_price: Option<f64>,
    pub return_1d: Option<f64>,
    pub return_5d: Option<f64>,
    pub return_20d: Option<f64>,
    pub volatility_20d: Option<f64>,
    pub volume_change_ratio: Option<f64>,
}

impl MarketFeatures {
    pub fn empty(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MarketFeatureExtractor;

impl MarketFeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn compute_features(&self, ticker: &str, history: Option<&[PriceBar]>) -> MarketFeatures {
        let history = match history {
            Some(history) if !history.is_empty() => history,
            _ => {
                tracing::warn!("No price history available for {} to compute features", ticker);
                return MarketFeatures::empty(ticker);
            }
        };

        // Close and volume are required on every row
        let mut rows: Vec<(chrono::NaiveDate, f64, f64)> = Vec::with_capacity(history.len());
        for bar in history {
            match (bar.close, bar.volume) {
                (Some(close), Some(volume)) => rows.push((bar.date, close, volume)),
                _ => {
                    tracing::error!("Missing required close/volume columns in history for {}", ticker);
                    return MarketFeatures::empty(ticker);
                }
            }
        }
        rows.sort_by_key(|(date, _, _)| *date);

        let closes: Vec<f64> = rows.iter().map(|(_, close, _)| *close).collect();
        let volumes: Vec<f64> = rows.iter().map(|(_, _, volume)| *volume).collect();
        let current_price = closes.last().copied();

        if closes.len() < 2 {
            return MarketFeatures {
                current_price,
                ..MarketFeatures::empty(ticker)
            };
        }

        let features = MarketFeatures {
            ticker: ticker.to_string(),
            current_price,
            return_1d: period_return(&closes, 1),
            return_5d: period_return(&closes, 5),
            return_20d: period_return(&closes, 20),
            volatility_20d: annualized_volatility(&closes, VOLATILITY_WINDOW),
            volume_change_ratio: volume_ratio(&volumes, VOLUME_SHORT_WINDOW, VOLUME_LONG_WINDOW),
        };

        tracing::debug!(
            "Computed market features for {}: 5d_ret={:?}, vol={:?}",
            ticker,
            features.return_5d,
            features.volume_change_ratio
        );
        features
    }

    pub fn compute_batch_features(
        &self,
        histories: &BTreeMap<String, Option<Vec<PriceBar>>>,
    ) -> BTreeMap<String, MarketFeatures> {
        let results: BTreeMap<String, MarketFeatures> = histories
            .iter()
            .map(|(ticker, history)| (ticker.clone(), self.compute_features(ticker, history.as_deref())))
            .collect();

        tracing::info!("Computed market features for {} tickers", results.len());
        results
    }
}

/// `(last - close N periods ago) / close N periods ago`
fn period_return(closes: &[f64], periods: usize) -> Option<f64> {
    if closes.len() <= periods {
        return None;
    }
    let current = closes[closes.len() - 1];
    let historical = closes[closes.len() - 1 - periods];
    if historical == 0.0 {
        return None;
    }
    finite((current - historical) / historical)
}

/// Sample standard deviation (ddof = 1) of the last `window` log returns, times sqrt(252)
fn annualized_volatility(closes: &[f64], window: usize) -> Option<f64> {
    if closes.len() < window + 1 {
        return None;
    }

    let returns: Vec<f64> = closes[closes.len() - window - 1..]
        .windows(2)
        .map(|pair| (pair[1] / pair[0]).ln())
        .filter(|r| !r.is_nan())
        .collect();

    if returns.len() < 2 {
        return None;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    finite(variance.sqrt() * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Mean of the last `short` volumes over the mean of the last `long`
fn volume_ratio(volumes: &[f64], short: usize, long: usize) -> Option<f64> {
    if volumes.len() < long {
        return None;
    }
    let short_avg = mean(&volumes[volumes.len() - short..]);
    let long_avg = mean(&volumes[volumes.len() - long..]);
    if long_avg == 0.0 {
        return None;
    }
    finite(short_avg / long_avg)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
