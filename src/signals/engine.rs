//! Composite signal engine
//!
//! Sentiment, mention velocity, volume change and 5-day momentum are each
//! normalised to [-1, 1], weighted into a composite score and mapped to an
//! action through the configured thresholds. Sentiment sets the direction
//! that velocity and volume amplify.

use super::market_features::MarketFeatures;
use super::{Action, Signal, SignalComponents};
use crate::config::{ConfigError, SignalConfig};
use crate::features::{round_to, AttentionMetrics, SentimentResult};
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Mentions per hour treated as maximum velocity
const MAX_VELOCITY: f64 = 10.0;
/// 5-day return treated as maximum momentum
const MAX_MOMENTUM_RETURN: f64 = 0.10;

const STRONG_SENTIMENT: f64 = 0.4;
const HIGH_VELOCITY: f64 = 2.0;
const UNUSUAL_VOLUME: f64 = 1.5;
const STRONG_MOMENTUM: f64 = 0.05;

pub struct SignalEngine {
    config: SignalConfig,
}

impl SignalEngine {
    pub fn new(config: SignalConfig) -> Result<Self, ConfigError> {
        if config.sell_threshold.partial_cmp(&config.buy_threshold) != Some(Ordering::Less) {
            return Err(ConfigError::ThresholdOrder {
                buy: config.buy_threshold,
                sell: config.sell_threshold,
            });
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Score one ticker; `None` when it fails the confidence or mention gates.
    /// A NaN confidence never passes the gate.
    pub fn generate_signal(
        &self,
        ticker: &str,
        sentiment: Option<&SentimentResult>,
        attention: Option<&AttentionMetrics>,
        market: Option<&MarketFeatures>,
        confidence: f64,
    ) -> Option<Signal> {
        if confidence.is_nan() || confidence < self.config.min_confidence {
            tracing::debug!(
                "Skipping {}: low extraction confidence ({} < {})",
                ticker,
                confidence,
                self.config.min_confidence
            );
            return None;
        }

        let attention = match attention {
            Some(a) if a.mention_count >= self.config.min_mentions => a,
            _ => {
                tracing::debug!(
                    "Skipping {}: not enough mentions ({} < {})",
                    ticker,
                    attention.map(|a| a.mention_count).unwrap_or(0),
                    self.config.min_mentions
                );
                return None;
            }
        };

        let components = self.components(sentiment, attention, market);
        let weights = &self.config.weights;
        let composite = (weights.sentiment * components.sentiment
            + weights.velocity * components.velocity
            + weights.volume * components.volume
            + weights.momentum * components.momentum)
            .clamp(-1.0, 1.0);

        let action = if composite >= self.config.buy_threshold {
            Action::Buy
        } else if composite <= self.config.sell_threshold {
            Action::Sell
        } else {
            Action::Hold
        };

        let reasoning = generate_reasoning(action, composite, &components, attention, market);

        tracing::info!("Signal generated: {} {} (score={:.2})", action, ticker, composite);

        Some(Signal {
            ticker: ticker.to_string(),
            composite_score: round_to(composite, 4),
            action,
            confidence: round_to(confidence.clamp(0.0, 1.0), 4),
            components: SignalComponents {
                sentiment: round_to(components.sentiment, 4),
                velocity: round_to(components.velocity, 4),
                volume: round_to(components.volume, 4),
                momentum: round_to(components.momentum, 4),
            },
            reasoning,
            metadata: sentiment.map(|s| s.metadata.clone()).unwrap_or_default(),
            timestamp: Utc::now(),
        })
    }

    fn components(
        &self,
        sentiment: Option<&SentimentResult>,
        attention: &AttentionMetrics,
        market: Option<&MarketFeatures>,
    ) -> SignalComponents {
        let sentiment_score = sentiment.map(|s| s.score).filter(|s| s.is_finite()).unwrap_or(0.0);
        let direction = if sentiment_score >= 0.0 { 1.0 } else { -1.0 };

        let velocity = (attention.mention_velocity / MAX_VELOCITY).min(1.0) * direction;

        let volume_ratio = market
            .and_then(|m| m.volume_change_ratio)
            .filter(|r| r.is_finite())
            .unwrap_or(1.0);
        let volume = if volume_ratio >= 1.0 {
            ((volume_ratio - 1.0) / 2.0).min(1.0)
        } else {
            (volume_ratio - 1.0).max(-1.0)
        } * direction;

        let return_5d = market.and_then(|m| m.return_5d).filter(|r| r.is_finite()).unwrap_or(0.0);
        let momentum = (return_5d / MAX_MOMENTUM_RETURN).clamp(-1.0, 1.0);

        SignalComponents {
            sentiment: sentiment_score,
            velocity,
            volume,
            momentum,
        }
    }

    /// Signals for every ticker that passes the gates, strongest |composite| first
    pub fn generate_batch_signals(
        &self,
        tickers: &[String],
        sentiment: &BTreeMap<String, SentimentResult>,
        attention: &BTreeMap<String, AttentionMetrics>,
        market: &BTreeMap<String, MarketFeatures>,
        confidence: Option<&HashMap<String, f64>>,
    ) -> Vec<Signal> {
        let mut signals: Vec<Signal> = tickers
            .iter()
            .filter_map(|ticker| {
                self.generate_signal(
                    ticker,
                    sentiment.get(ticker),
                    attention.get(ticker),
                    market.get(ticker),
                    confidence.and_then(|c| c.get(ticker)).copied().unwrap_or(1.0),
                )
            })
            .collect();

        signals.sort_by(|a, b| b.composite_score.abs().total_cmp(&a.composite_score.abs()));

        tracing::info!("Generated {} total signals from {} tickers", signals.len(), tickers.len());
        signals
    }
}

fn generate_reasoning(
    action: Action,
    composite: f64,
    components: &SignalComponents,
    attention: &AttentionMetrics,
    market: Option<&MarketFeatures>,
) -> String {
    if action == Action::Hold {
        return format!("Composite score ({:.2}) not strong enough to trigger action.", composite);
    }

    let mut reasons = Vec::new();

    if components.sentiment.abs() > STRONG_SENTIMENT {
        let kind = if components.sentiment > 0.0 { "Bullish" } else { "Bearish" };
        reasons.push(format!("Strong {} sentiment score ({:.2})", kind, components.sentiment));
    }

    if attention.mention_velocity > HIGH_VELOCITY {
        reasons.push(format!("High mention velocity ({:.1}/hr)", attention.mention_velocity));
    }

    if let Some(ratio) = market.and_then(|m| m.volume_change_ratio).filter(|r| r.is_finite() && *r > UNUSUAL_VOLUME) {
        reasons.push(format!("Unusual trading volume ({:.1}x relative to past 20d)", ratio));
    }

    if let Some(ret) = market.and_then(|m| m.return_5d).filter(|r| r.is_finite() && r.abs() > STRONG_MOMENTUM) {
        let direction = if ret > 0.0 { "up" } else { "down" };
        reasons.push(format!("Strong 5d price momentum ({} {:.1}%)", direction, ret * 100.0));
    }

    if reasons.is_empty() {
        return format!("{} signal based on combined metrics.", action);
    }

    format!("{} triggered. {}.", action, reasons.join("; "))
}
