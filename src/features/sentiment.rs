//! Sentiment analysis for WallStreetBets text
//!
//! Two strategies share one contract ([`SentimentScorer`]): a lexicon strategy
//! built on VADER plus the curated WSB term table, and a model strategy backed
//! by a local LLM (see [`super::llm_sentiment`]).

use super::lexicon::WsbLexicon;
use super::llm_sentiment::LlmSentimentAnalyzer;
use super::round_to;
use crate::config::{Config, ConfigError};
use crate::llm::LLMClient;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use unicase::UniCase;
use vader_sentiment::SentimentIntensityAnalyzer;

type VaderLexicon = HashMap<UniCase<&'static str>, f64>;

/// VADER's native lexicon range is roughly [-4, 4]
const VADER_SCALE: f64 = 4.0;
/// Weight of each matched phrase or emoji in the adjustment pass
const PHRASE_WEIGHT: f64 = 0.3;
const LEXICON_LABEL_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Bullish,
    Bearish,
    Neutral,
}

impl SentimentLabel {
    /// Label for a score with a symmetric neutral band of `threshold`
    pub fn from_score(score: f64, threshold: f64) -> Self {
        if score > threshold {
            SentimentLabel::Bullish
        } else if score < -threshold {
            SentimentLabel::Bearish
        } else {
            SentimentLabel::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Bullish => "bullish",
            SentimentLabel::Bearish => "bearish",
            SentimentLabel::Neutral => "neutral",
        }
    }
}

/// Aggregate sentiment for one ticker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentimentResult {
    pub ticker: String,
    /// Mean score in [-1, 1], rounded to 4 decimals
    pub score: f64,
    pub label: SentimentLabel,
    pub compound: f64,
    pub mention_count: usize,
    /// Per-text scores
    pub scores: Vec<f64>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl SentimentResult {
    pub fn neutral(ticker: &str, mention_count: usize) -> Self {
        Self {
            ticker: ticker.to_string(),
            score: 0.0,
            label: SentimentLabel::Neutral,
            compound: 0.0,
            mention_count,
            scores: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }
}

/// Maps the texts mentioning one ticker to an aggregate sentiment
#[async_trait]
pub trait SentimentScorer: Send + Sync {
    async fn analyze_for_ticker(&self, ticker: &str, texts: &[String]) -> SentimentResult;

    fn method(&self) -> &'static str;
}

/// Per-text breakdown from the lexicon strategy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextSentiment {
    /// Raw VADER compound with domain words merged in
    pub compound: f64,
    /// Compound plus phrase/emoji adjustment, clamped and rounded
    pub wsb_compound: f64,
}

/// VADER with the WSB term table merged in
pub struct LexiconSentimentAnalyzer {
    /// VADER's table with the single-word WSB terms merged in at VADER scale
    lexicon: VaderLexicon,
    /// Phrases and emoji with their lower-cased form
    phrases: Vec<(String, String, f64)>,
}

impl LexiconSentimentAnalyzer {
    pub fn new(lexicon: &WsbLexicon) -> Self {
        let mut merged: VaderLexicon = vader_sentiment::LEXICON.clone();
        let mut injected = 0usize;
        for (term, score) in lexicon.single_words() {
            merged.insert(UniCase::new(intern(term)), score * VADER_SCALE);
            injected += 1;
        }

        let phrases: Vec<(String, String, f64)> = lexicon
            .phrases()
            .map(|(term, score)| (term.to_string(), term.to_lowercase(), score))
            .collect();

        tracing::info!(
            "Injected {} WSB terms into VADER lexicon, {} phrase/emoji terms",
            injected,
            phrases.len()
        );

        Self {
            lexicon: merged,
            phrases,
        }
    }

    /// VADER score for `word`, if the merged table knows it (case-insensitive)
    pub fn lexicon_score(&self, word: &str) -> Option<f64> {
        self.lexicon.get(&UniCase::new(word)).copied()
    }

    /// Sum of `score × 0.3` for every phrase or emoji found in the text
    fn phrase_adjustment(&self, text: &str) -> f64 {
        let lower = text.to_lowercase();
        let mut adjustment = 0.0;
        let mut matches = 0;

        for (term, term_lower, score) in &self.phrases {
            if lower.contains(term_lower.as_str()) || text.contains(term.as_str()) {
                adjustment += score * PHRASE_WEIGHT;
                matches += 1;
            }
        }

        if matches > 0 {
            tracing::debug!("WSB adjustment: {:.3} from {} phrase/emoji matches", adjustment, matches);
        }
        adjustment
    }

    fn score_text(&self, analyzer: &SentimentIntensityAnalyzer<'_>, text: &str) -> TextSentiment {
        let scores = analyzer.polarity_scores(text);
        let compound = scores.get("compound").copied().unwrap_or(0.0);
        let blended = (compound + self.phrase_adjustment(text)).clamp(-1.0, 1.0);

        TextSentiment {
            compound,
            wsb_compound: round_to(blended, 4),
        }
    }

    /// Score a single text
    pub fn analyze_text(&self, text: &str) -> TextSentiment {
        let analyzer = SentimentIntensityAnalyzer::from_lexicon(&self.lexicon);
        self.score_text(&analyzer, text)
    }
}

#[async_trait]
impl SentimentScorer for LexiconSentimentAnalyzer {
    async fn analyze_for_ticker(&self, ticker: &str, texts: &[String]) -> SentimentResult {
        if texts.is_empty() {
            return SentimentResult::neutral(ticker, 0);
        }

        let analyzer = SentimentIntensityAnalyzer::from_lexicon(&self.lexicon);

        let per_text: Vec<TextSentiment> = texts.iter().map(|text| self.score_text(&analyzer, text)).collect();
        let n = per_text.len() as f64;
        let avg_score = per_text.iter().map(|t| t.wsb_compound).sum::<f64>() / n;
        let avg_compound = per_text.iter().map(|t| t.compound).sum::<f64>() / n;

        SentimentResult {
            ticker: ticker.to_string(),
            score: round_to(avg_score.clamp(-1.0, 1.0), 4),
            label: SentimentLabel::from_score(avg_score, LEXICON_LABEL_THRESHOLD),
            compound: round_to(avg_compound, 4),
            mention_count: texts.len(),
            scores: per_text.iter().map(|t| t.wsb_compound).collect(),
            metadata: serde_json::Map::new(),
        }
    }

    fn method(&self) -> &'static str {
        "vader"
    }
}

/// Domain words live as long as the process; the analyzer is built once at startup
fn intern(word: &str) -> &'static str {
    let needle = UniCase::new(word);
    match vader_sentiment::LEXICON.iter().find(|(key, _)| **key == needle) {
        Some((key, _)) => (*key).into_inner(),
        None => Box::leak(word.to_lowercase().into_boxed_str()),
    }
}

/// Select the configured sentiment strategy
pub fn build_sentiment_scorer(config: &Config) -> Result<Arc<dyn SentimentScorer>> {
    match config.sentiment.method.as_str() {
        "vader" | "lexicon" => {
            let lexicon = WsbLexicon::load(&config.sentiment.lexicon_path);
            Ok(Arc::new(LexiconSentimentAnalyzer::new(&lexicon)))
        }
        "llm" | "ollama" => {
            let client = LLMClient::from_config(&config.llm)?;
            // Reachability is only logged; failed calls degrade to neutral later
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let checker = client.clone();
                handle.spawn(async move {
                    checker.check_connection().await;
                });
            }
            Ok(Arc::new(LlmSentimentAnalyzer::new(Arc::new(client))))
        }
        other => Err(ConfigError::UnknownVariant {
            kind: "sentiment method",
            value: other.to_string(),
            supported: "vader, llm",
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> LexiconSentimentAnalyzer {
        let lexicon = WsbLexicon::from_terms(vec![
            ("to the moon", 0.8),
            ("diamond hands", 0.8),
            ("tendies", 0.7),
            ("guh", -0.9),
            ("paper hands", -0.6),
            ("bag holder", -0.6),
            ("🚀", 0.7),
            ("🐻", -0.5),
        ]);
        LexiconSentimentAnalyzer::new(&lexicon)
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_basic_vader_polarity() {
        let analyzer = analyzer();
        let positive = analyzer.analyze_text("This company has very good earnings and strong growth.");
        assert!(positive.compound > 0.0);
        assert!(positive.wsb_compound > 0.0);

        let negative = analyzer.analyze_text("Terrible quarter, horrible losses, completely awful.");
        assert!(negative.compound < 0.0);
        assert!(negative.wsb_compound < 0.0);
    }

    #[test]
    fn test_domain_words_merged_into_lexicon() {
        let analyzer = analyzer();
        assert!(analyzer.analyze_text("tendies").compound > 0.0);
        assert!(analyzer.analyze_text("guh").compound < 0.0);
        assert!(analyzer.analyze_text("GUH").compound < 0.0);

        assert_eq!(analyzer.lexicon_score("tendies"), Some(0.7 * VADER_SCALE));
        assert_eq!(analyzer.lexicon_score("Guh"), Some(-0.9 * VADER_SCALE));
        // Phrases stay out of the word table
        assert!(analyzer.lexicon_score("diamond hands").is_none());
        // VADER's own entries survive the merge
        assert_eq!(analyzer.lexicon_score("good"), vader_sentiment::LEXICON.get(&UniCase::new("good")).copied());
    }

    #[test]
    fn test_domain_word_overrides_vader_entry() {
        let lexicon = WsbLexicon::from_terms(vec![("good", -0.5)]);
        let analyzer = LexiconSentimentAnalyzer::new(&lexicon);
        assert_eq!(analyzer.lexicon_score("good"), Some(-0.5 * VADER_SCALE));
        assert!(analyzer.analyze_text("good").compound < 0.0);
    }

    #[test]
    fn test_phrase_and_emoji_adjustment() {
        let analyzer = analyzer();
        // Neutral VADER text, the adjustment carries the sign
        assert!((analyzer.phrase_adjustment("Diamond Hands 🚀") - (0.8 + 0.7) * 0.3).abs() < 1e-9);
        assert!(analyzer.analyze_text("bag holder 🐻").wsb_compound < 0.0);
        assert_eq!(analyzer.phrase_adjustment("nothing to see"), 0.0);
    }

    #[tokio::test]
    async fn test_analyze_for_ticker_bullish() {
        let result = analyzer()
            .analyze_for_ticker(
                "GME",
                &texts(&["GME to the moon 🚀", "diamond hands, tendies incoming", "great great great"]),
            )
            .await;

        assert_eq!(result.ticker, "GME");
        assert_eq!(result.mention_count, 3);
        assert_eq!(result.scores.len(), 3);
        assert_eq!(result.label, SentimentLabel::Bullish);
        assert!(result.score > 0.1 && result.score <= 1.0);
    }

    #[tokio::test]
    async fn test_analyze_for_ticker_bearish() {
        let result = analyzer()
            .analyze_for_ticker("AMC", &texts(&["guh, bag holder again", "terrible awful loss 🐻"]))
            .await;

        assert_eq!(result.label, SentimentLabel::Bearish);
        assert!(result.score < -0.1 && result.score >= -1.0);
    }

    #[tokio::test]
    async fn test_analyze_no_texts() {
        let result = analyzer().analyze_for_ticker("TSLA", &[]).await;
        assert_eq!(result.score, 0.0);
        assert_eq!(result.label, SentimentLabel::Neutral);
        assert_eq!(result.mention_count, 0);
        assert!(result.scores.is_empty());
    }

    #[test]
    fn test_clamped_when_adjustment_overflows() {
        let lexicon = WsbLexicon::from_terms(vec![("to the moon", 1.0), ("🚀", 1.0), ("diamond hands", 1.0)]);
        let analyzer = LexiconSentimentAnalyzer::new(&lexicon);
        let result = analyzer.analyze_text("great to the moon 🚀 diamond hands");
        assert_eq!(result.wsb_compound, 1.0);
    }

    #[test]
    fn test_label_thresholds() {
        assert_eq!(SentimentLabel::from_score(0.11, 0.1), SentimentLabel::Bullish);
        assert_eq!(SentimentLabel::from_score(0.1, 0.1), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(-0.06, 0.05), SentimentLabel::Bearish);
    }

    #[test]
    fn test_unknown_method_fails_fast() {
        let mut config = Config::default();
        config.sentiment.method = "magic".to_string();
        assert!(build_sentiment_scorer(&config).is_err());

        config.sentiment.method = "vader".to_string();
        config.sentiment.lexicon_path = "/nonexistent/lexicon.yaml".into();
        assert_eq!(build_sentiment_scorer(&config).unwrap().method(), "vader");
    }

    #[tokio::test]
    async fn test_llm_scorer_builds_without_reachable_server() {
        let mut config = Config::default();
        config.sentiment.method = "llm".to_string();
        config.llm.ollama_url = "http://127.0.0.1:9".to_string();

        let scorer = build_sentiment_scorer(&config).unwrap();
        assert_eq!(scorer.method(), "llm");

        // The background connectivity check only logs
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let client = LLMClient::from_config(&config.llm).unwrap();
        assert!(!client.check_connection().await);
    }
}
