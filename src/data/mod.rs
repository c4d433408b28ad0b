//! Data pipeline module for Reddit ingestion and market data
//! Holds the raw input entities consumed by the feature extractors

pub mod errors;
pub mod market;
pub mod mock;
pub mod reddit;
pub mod retry;

pub use errors::{DataError, DataResult};
pub use market::{create_market_provider, MarketDataProvider, PolygonProvider, StaticMarketData};
pub use mock::MockIngester;
pub use reddit::{PostSource, RedditIngester};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A Reddit submission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub body: String,
    pub score: i64,
    pub upvote_ratio: f64,
    pub num_comments: u64,
    /// `None` when the source timestamp carried no timezone information
    pub created_utc: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub url: String,
    pub permalink: String,
}

impl Post {
    /// Title and body joined, the text used for ticker extraction
    pub fn full_text(&self) -> String {
        if self.body.is_empty() {
            self.title.clone()
        } else {
            format!("{}\n{}", self.title, self.body)
        }
    }
}

/// A Reddit comment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: String,
    pub body: String,
    pub score: i64,
    pub created_utc: Option<DateTime<Utc>>,
    pub post_id: String,
    pub author: Option<String>,
    pub parent_id: Option<String>,
}

/// Anything the attention tracker can count: a post or a comment
pub trait RedditItem {
    fn item_id(&self) -> &str;
    fn item_score(&self) -> i64;
    fn created_at(&self) -> Option<DateTime<Utc>>;
}

impl RedditItem for Post {
    fn item_id(&self) -> &str {
        &self.id
    }
    fn item_score(&self) -> i64 {
        self.score
    }
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_utc
    }
}

impl RedditItem for Comment {
    fn item_id(&self) -> &str {
        &self.id
    }
    fn item_score(&self) -> i64 {
        self.score
    }
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_utc
    }
}

/// One daily OHLCV row.
///
/// Close and volume are optional so a provider can report a row with a
/// missing column; the feature extractor treats such a series as unusable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl PriceBar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close: Some(close),
            volume: Some(volume),
        }
    }
}

/// Convert a Reddit epoch-seconds timestamp to UTC
pub fn epoch_to_utc(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let secs = seconds.trunc() as i64;
    let nanos = ((seconds - seconds.trunc()) * 1e9) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}

/// Validation helpers
pub mod validation {
    use super::*;

    /// Validate a stock symbol (basic US market symbols)
    pub fn validate_symbol(symbol: &str) -> DataResult<()> {
        if symbol.is_empty() {
            return Err(DataError::validation_error("symbol", "Symbol cannot be empty"));
        }

        if symbol.len() > 5 {
            return Err(DataError::validation_error("symbol", "Symbol too long (max 5 chars)"));
        }

        if !symbol.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(DataError::validation_error(
                "symbol",
                "Symbol must contain only uppercase letters",
            ));
        }

        Ok(())
    }

    /// Validate a price bar before it enters the feature extractor
    pub fn validate_price_bar(bar: &PriceBar) -> DataResult<()> {
        if let Some(close) = bar.close {
            if !close.is_finite() || close < 0.0 {
                return Err(DataError::validation_error("close", "Close price must be a non-negative number"));
            }
        }

        if let Some(volume) = bar.volume {
            if !volume.is_finite() || volume < 0.0 {
                return Err(DataError::validation_error("volume", "Volume cannot be negative"));
            }
        }

        if let (Some(high), Some(low)) = (bar.high, bar.low) {
            if high < low {
                return Err(DataError::validation_error(
                    "high_low",
                    "High price cannot be less than low price",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_text_joins_title_and_body() {
        let post = Post {
            id: "p1".to_string(),
            title: "$GME to the moon".to_string(),
            body: "diamond hands".to_string(),
            score: 10,
            upvote_ratio: 0.9,
            num_comments: 0,
            created_utc: None,
            author: None,
            url: String::new(),
            permalink: String::new(),
        };
        assert_eq!(post.full_text(), "$GME to the moon\ndiamond hands");
    }

    #[test]
    fn test_epoch_to_utc() {
        let ts = epoch_to_utc(1_700_000_000.0).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert!(epoch_to_utc(f64::NAN).is_none());
    }

    #[test]
    fn test_validate_symbol() {
        assert!(validation::validate_symbol("GME").is_ok());
        assert!(validation::validate_symbol("").is_err());
        assert!(validation::validate_symbol("TOOLONG").is_err());
        assert!(validation::validate_symbol("gme").is_err());
    }

    #[test]
    fn test_validate_price_bar() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert!(validation::validate_price_bar(&PriceBar::new(date, 10.0, 11.0, 9.0, 10.5, 1000.0)).is_ok());
        assert!(validation::validate_price_bar(&PriceBar::new(date, 10.0, 9.0, 11.0, 10.5, 1000.0)).is_err());
        assert!(validation::validate_price_bar(&PriceBar::new(date, 10.0, 11.0, 9.0, 10.5, -1.0)).is_err());
    }
}
