use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Invalid setting detected while validating a loaded [`Config`]
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid thresholds: sell ({sell}) must be below buy ({buy})")]
    ThresholdOrder { buy: f64, sell: f64 },

    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },

    #[error("Unknown {kind} '{value}'. Supported: {supported}")]
    UnknownVariant {
        kind: &'static str,
        value: String,
        supported: &'static str,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub reddit: RedditConfig,
    pub tickers: TickerConfig,
    pub sentiment: SentimentConfig,
    pub llm: LlmConfig,
    pub attention: AttentionConfig,
    pub market: MarketConfig,
    pub signals: SignalConfig,
    pub portfolio: PortfolioConfig,
    pub notifications: NotificationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Persistence is disabled when unset
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: String,
    pub subreddit: String,
    pub batch_size: u32,
    pub top_posts_for_comments: usize,
    pub max_comments_per_post: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerConfig {
    pub min_confidence: f64,
    pub blacklist: Vec<String>,
    pub whitelist_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentConfig {
    /// "vader" (lexicon) or "llm" (external model)
    pub method: String,
    pub lexicon_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub ollama_url: String,
    pub model: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionConfig {
    pub window_hours: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// "polygon" or "static"
    pub provider: String,
    pub polygon_api_key: Option<String>,
    pub cache_ttl_minutes: i64,
    pub history_days: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SignalWeights {
    pub sentiment: f64,
    pub velocity: f64,
    pub volume: f64,
    pub momentum: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            sentiment: 0.35,
            velocity: 0.30,
            volume: 0.20,
            momentum: 0.15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    pub weights: SignalWeights,
    pub buy_threshold: f64,
    pub sell_threshold: f64,
    pub min_mentions: usize,
    pub min_confidence: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            weights: SignalWeights::default(),
            buy_threshold: 0.6,
            sell_threshold: -0.4,
            min_mentions: 3,
            min_confidence: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioConfig {
    /// `mock` or `alpaca`
    pub broker: String,
    pub alpaca_api_key: Option<String>,
    pub alpaca_secret_key: Option<String>,
    pub paper_trading: bool,
    pub initial_balance: f64,
    pub base_trade_amount: f64,
    /// Fraction of the account balance, e.g. 0.05 for 5 %
    pub max_position_size_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub discord_webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "json" or "text"
    pub format: String,
}

pub const DEFAULT_BLACKLIST: &[&str] = &[
    "DD", "YOLO", "ALL", "FOR", "CEO", "IMO", "FYI", "USA", "ATH", "EOD", "IPO", "SEC", "FOMO",
    "HODL", "WSB", "LOL", "THE", "AND", "ARE", "NOT", "YOU", "BUY", "SELL", "PUT", "CALL", "ITM",
    "OTM", "GDP", "CPI", "FED", "EPS", "ETF", "USD", "API", "TLDR", "EDIT",
];

fn env_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid {} value", key))
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file - this sets env vars that aren't already set
        dotenv::dotenv().ok();

        let blacklist = match env::var("TICKER_BLACKLIST") {
            Ok(raw) => raw
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect(),
        };

        let config = Config {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
                max_connections: env_or("DB_MAX_CONNECTIONS", "5")?,
                min_connections: env_or("DB_MIN_CONNECTIONS", "1")?,
            },
            reddit: RedditConfig {
                client_id: env::var("REDDIT_CLIENT_ID").ok(),
                client_secret: env::var("REDDIT_CLIENT_SECRET").ok(),
                user_agent: env::var("REDDIT_USER_AGENT").unwrap_or_else(|_| "wsb-agent:v1.0".to_string()),
                subreddit: env::var("REDDIT_SUBREDDIT").unwrap_or_else(|_| "wallstreetbets".to_string()),
                batch_size: env_or("REDDIT_BATCH_SIZE", "25")?,
                top_posts_for_comments: env_or("REDDIT_TOP_POSTS_FOR_COMMENTS", "10")?,
                max_comments_per_post: env_or("REDDIT_MAX_COMMENTS_PER_POST", "50")?,
            },
            tickers: TickerConfig {
                min_confidence: env_or("TICKER_MIN_CONFIDENCE", "0.3")?,
                blacklist,
                whitelist_path: env_or("TICKER_WHITELIST_PATH", "data/ticker_whitelist.csv")?,
            },
            sentiment: SentimentConfig {
                method: env::var("SENTIMENT_METHOD").unwrap_or_else(|_| "vader".to_string()),
                lexicon_path: env_or("SENTIMENT_LEXICON_PATH", "data/wsb_lexicon.yaml")?,
            },
            llm: LlmConfig {
                ollama_url: env::var("OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string()),
                model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3".to_string()),
                timeout_seconds: env_or("LLM_TIMEOUT_SECONDS", "30")?,
            },
            attention: AttentionConfig {
                window_hours: env_or("ATTENTION_WINDOW_HOURS", "6")?,
            },
            market: MarketConfig {
                provider: env::var("MARKET_PROVIDER").unwrap_or_else(|_| "polygon".to_string()),
                polygon_api_key: env::var("POLYGON_API_KEY").ok(),
                cache_ttl_minutes: env_or("MARKET_CACHE_TTL_MINUTES", "30")?,
                history_days: env_or("MARKET_HISTORY_DAYS", "30")?,
            },
            signals: SignalConfig {
                weights: SignalWeights {
                    sentiment: env_or("SIGNAL_WEIGHT_SENTIMENT", "0.35")?,
                    velocity: env_or("SIGNAL_WEIGHT_VELOCITY", "0.30")?,
                    volume: env_or("SIGNAL_WEIGHT_VOLUME", "0.20")?,
                    momentum: env_or("SIGNAL_WEIGHT_MOMENTUM", "0.15")?,
                },
                buy_threshold: env_or("SIGNAL_BUY_THRESHOLD", "0.6")?,
                sell_threshold: env_or("SIGNAL_SELL_THRESHOLD", "-0.4")?,
                min_mentions: env_or("SIGNAL_MIN_MENTIONS", "3")?,
                min_confidence: env_or("SIGNAL_MIN_CONFIDENCE", "0.3")?,
            },
            portfolio: PortfolioConfig {
                broker: env::var("BROKER").unwrap_or_else(|_| "mock".to_string()),
                alpaca_api_key: env::var("ALPACA_API_KEY").ok().filter(|s| !s.is_empty()),
                alpaca_secret_key: env::var("ALPACA_SECRET_KEY").ok().filter(|s| !s.is_empty()),
                paper_trading: env_or("ALPACA_PAPER", "true")?,
                initial_balance: env_or("PORTFOLIO_INITIAL_BALANCE", "100000")?,
                base_trade_amount: env_or("PORTFOLIO_BASE_TRADE_AMOUNT", "1000")?,
                max_position_size_pct: env_or("PORTFOLIO_MAX_POSITION_PCT", "0.05")?,
            },
            notifications: NotificationConfig {
                discord_webhook_url: env::var("DISCORD_WEBHOOK_URL").ok().filter(|s| !s.is_empty()),
            },
            logging: LoggingConfig {
                level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                format: env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that the loaders cannot express through parsing alone
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let s = &self.signals;
        for (field, value) in [
            ("SIGNAL_WEIGHT_SENTIMENT", s.weights.sentiment),
            ("SIGNAL_WEIGHT_VELOCITY", s.weights.velocity),
            ("SIGNAL_WEIGHT_VOLUME", s.weights.volume),
            ("SIGNAL_WEIGHT_MOMENTUM", s.weights.momentum),
            ("SIGNAL_BUY_THRESHOLD", s.buy_threshold),
            ("SIGNAL_SELL_THRESHOLD", s.sell_threshold),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { field });
            }
        }

        if s.sell_threshold >= s.buy_threshold {
            return Err(ConfigError::ThresholdOrder {
                buy: s.buy_threshold,
                sell: s.sell_threshold,
            });
        }

        check_range("SIGNAL_MIN_CONFIDENCE", s.min_confidence, 0.0, 1.0)?;
        check_range("TICKER_MIN_CONFIDENCE", self.tickers.min_confidence, 0.0, 1.0)?;
        check_range("PORTFOLIO_MAX_POSITION_PCT", self.portfolio.max_position_size_pct, 0.0, 1.0)?;

        if self.attention.window_hours == 0 {
            return Err(ConfigError::OutOfRange {
                field: "ATTENTION_WINDOW_HOURS",
                value: 0.0,
                min: 1.0,
                max: f64::from(u32::MAX),
            });
        }

        match self.logging.format.as_str() {
            "json" | "text" => {}
            other => {
                return Err(ConfigError::UnknownVariant {
                    kind: "log format",
                    value: other.to_string(),
                    supported: "json, text",
                })
            }
        }

        Ok(())
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> std::result::Result<(), ConfigError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ConfigError::OutOfRange { field, value, min, max });
    }
    Ok(())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: None,
                max_connections: 5,
                min_connections: 1,
            },
            reddit: RedditConfig {
                client_id: None,
                client_secret: None,
                user_agent: "wsb-agent:v1.0".to_string(),
                subreddit: "wallstreetbets".to_string(),
                batch_size: 25,
                top_posts_for_comments: 10,
                max_comments_per_post: 50,
            },
            tickers: TickerConfig {
                min_confidence: 0.3,
                blacklist: DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect(),
                whitelist_path: PathBuf::from("data/ticker_whitelist.csv"),
            },
            sentiment: SentimentConfig {
                method: "vader".to_string(),
                lexicon_path: PathBuf::from("data/wsb_lexicon.yaml"),
            },
            llm: LlmConfig {
                ollama_url: "http://localhost:11434".to_string(),
                model: "llama3".to_string(),
                timeout_seconds: 30,
            },
            attention: AttentionConfig { window_hours: 6 },
            market: MarketConfig {
                provider: "polygon".to_string(),
                polygon_api_key: None,
                cache_ttl_minutes: 30,
                history_days: 30,
            },
            signals: SignalConfig::default(),
            portfolio: PortfolioConfig {
                broker: "mock".to_string(),
                alpaca_api_key: None,
                alpaca_secret_key: None,
                paper_trading: true,
                initial_balance: 100_000.0,
                base_trade_amount: 1000.0,
                max_position_size_pct: 0.05,
            },
            notifications: NotificationConfig {
                discord_webhook_url: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
            },
        }
    }
}
