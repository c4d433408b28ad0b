//! Feature extraction from Reddit text: tickers, sentiment and attention

pub mod attention;
pub mod lexicon;
pub mod llm_sentiment;
pub mod sentiment;
pub mod tickers;

pub use attention::{AttentionMetrics, AttentionTracker};
pub use lexicon::WsbLexicon;
pub use llm_sentiment::LlmSentimentAnalyzer;
pub use sentiment::{
    build_sentiment_scorer, LexiconSentimentAnalyzer, SentimentLabel, SentimentResult, SentimentScorer,
};
pub use tickers::{MentionContext, TickerExtractor, TickerMention};

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
