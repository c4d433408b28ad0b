//! Ticker extraction from WallStreetBets text
//!
//! Two detectors run over every text: dollar-sign cashtags (`$GME`) and bare
//! uppercase words (`GME`). Hits are filtered through a blacklist of common
//! acronyms and an optional whitelist, deduplicated per text and scored.

use crate::config::TickerConfig;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

lazy_static! {
    static ref CASHTAG_PATTERN: Regex = Regex::new(r"\$([A-Z]{1,5})\b")
        .expect("Failed to compile CASHTAG_PATTERN regex - this is a bug in the hardcoded pattern");

    static ref UPPERCASE_WORD_PATTERN: Regex = Regex::new(r"\b([A-Z]{2,5})\b")
        .expect("Failed to compile UPPERCASE_WORD_PATTERN regex - this is a bug in the hardcoded pattern");
}

const FINANCIAL_CONTEXT_WORDS: &[&str] = &[
    "stock", "share", "shares", "calls", "puts", "options", "buy", "sell", "long", "short",
    "bullish", "bearish", "earnings", "revenue", "price", "target", "squeeze",
];

/// How a mention was detected
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MentionContext {
    Cashtag,
    UppercaseWord,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickerMention {
    pub ticker: String,
    pub confidence: f64,
    /// The matched substring, e.g. `$GME`
    pub source_text: String,
    pub context: MentionContext,
}

pub struct TickerExtractor {
    min_confidence: f64,
    blacklist: HashSet<String>,
    whitelist: HashSet<String>,
}

impl TickerExtractor {
    pub fn new(config: &TickerConfig) -> Self {
        let whitelist = load_whitelist(&config.whitelist_path);
        Self::with_whitelist(config, whitelist)
    }

    pub fn with_whitelist(config: &TickerConfig, whitelist: HashSet<String>) -> Self {
        let blacklist: HashSet<String> = config.blacklist.iter().map(|s| s.to_uppercase()).collect();

        tracing::info!(
            "TickerExtractor initialized: {} whitelisted tickers, {} blacklisted terms",
            whitelist.len(),
            blacklist.len()
        );

        Self {
            min_confidence: config.min_confidence,
            blacklist,
            whitelist,
        }
    }

    /// Mentions in one text, sorted by confidence descending.
    ///
    /// Ties keep detection order, cashtags before uppercase words.
    pub fn extract(&self, text: &str) -> Vec<TickerMention> {
        let mut mentions: Vec<TickerMention> = Vec::new();
        let context_bonus = context_bonus(text);

        for caps in CASHTAG_PATTERN.captures_iter(text) {
            let ticker = caps[1].to_uppercase();
            if !self.is_valid_ticker(&ticker) {
                continue;
            }
            let mention = TickerMention {
                confidence: self.score_confidence(&ticker, MentionContext::Cashtag, context_bonus),
                source_text: caps[0].to_string(),
                context: MentionContext::Cashtag,
                ticker,
            };
            match mentions.iter_mut().find(|m| m.ticker == mention.ticker) {
                Some(existing) if mention.confidence > existing.confidence => *existing = mention,
                Some(_) => {}
                None => mentions.push(mention),
            }
        }

        for caps in UPPERCASE_WORD_PATTERN.captures_iter(text) {
            let ticker = caps[1].to_uppercase();
            if !self.is_valid_ticker(&ticker) || mentions.iter().any(|m| m.ticker == ticker) {
                continue;
            }
            mentions.push(TickerMention {
                confidence: self.score_confidence(&ticker, MentionContext::UppercaseWord, context_bonus),
                source_text: caps[0].to_string(),
                context: MentionContext::UppercaseWord,
                ticker,
            });
        }

        mentions.retain(|m| m.confidence >= self.min_confidence);
        // sort_by is stable
        mentions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        if !mentions.is_empty() {
            tracing::debug!(
                "Extracted {} tickers: {:?}",
                mentions.len(),
                mentions
                    .iter()
                    .map(|m| format!("{}({:.2})", m.ticker, m.confidence))
                    .collect::<Vec<_>>()
            );
        }

        mentions
    }

    /// Mentions across many texts, grouped by ticker
    pub fn extract_from_texts<S: AsRef<str>>(&self, texts: &[S]) -> BTreeMap<String, Vec<TickerMention>> {
        let mut all_mentions: BTreeMap<String, Vec<TickerMention>> = BTreeMap::new();

        for text in texts {
            for mention in self.extract(text.as_ref()) {
                all_mentions.entry(mention.ticker.clone()).or_default().push(mention);
            }
        }

        tracing::info!(
            "Extracted {} unique tickers from {} texts",
            all_mentions.len(),
            texts.len()
        );
        all_mentions
    }

    pub fn whitelist_len(&self) -> usize {
        self.whitelist.len()
    }

    fn is_valid_ticker(&self, ticker: &str) -> bool {
        if self.blacklist.contains(ticker) {
            return false;
        }
        // An empty whitelist accepts anything not blacklisted
        self.whitelist.is_empty() || self.whitelist.contains(ticker)
    }

    fn score_confidence(&self, ticker: &str, context: MentionContext, context_bonus: f64) -> f64 {
        let mut score = match context {
            MentionContext::Cashtag => 0.9,
            MentionContext::UppercaseWord => 0.5,
        };

        if self.whitelist.contains(ticker) {
            score += 0.1;
        }
        if ticker.len() >= 4 {
            score += 0.05;
        }
        score += context_bonus;
        if context == MentionContext::UppercaseWord && ticker.len() <= 2 {
            score -= 0.2;
        }

        (score.clamp(0.0, 1.0) * 100.0).round() / 100.0
    }
}

/// +0.1 for two or more distinct finance words in the text, +0.05 for one
fn context_bonus(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let matches = FINANCIAL_CONTEXT_WORDS
        .iter()
        .filter(|word| lower.contains(*word))
        .count();
    match matches {
        0 => 0.0,
        1 => 0.05,
        _ => 0.1,
    }
}

#[derive(Debug, Deserialize)]
struct WhitelistRow {
    ticker: String,
}

/// Load the `ticker` column of a whitelist CSV; a missing file yields an empty set
pub fn load_whitelist(path: &Path) -> HashSet<String> {
    let mut tickers = HashSet::new();
    if !path.exists() {
        tracing::warn!("Ticker whitelist not found at {}", path.display());
        return tickers;
    }

    let mut reader = match csv::Reader::from_path(path) {
        Ok(reader) => reader,
        Err(e) => {
            tracing::warn!("Failed to open ticker whitelist {}: {}", path.display(), e);
            return tickers;
        }
    };

    for row in reader.deserialize::<WhitelistRow>() {
        match row {
            Ok(row) => {
                let ticker = row.ticker.trim().to_uppercase();
                if !ticker.is_empty() {
                    tickers.insert(ticker);
                }
            }
            Err(e) => tracing::warn!("Skipping malformed whitelist row: {}", e),
        }
    }

    tracing::info!("Loaded {} tickers from whitelist", tickers.len());
    tickers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config() -> TickerConfig {
        TickerConfig {
            min_confidence: 0.3,
            blacklist: vec!["DD".into(), "YOLO".into(), "ALL".into(), "FOR".into()],
            whitelist_path: "/nonexistent/whitelist.csv".into(),
        }
    }

    fn extractor() -> TickerExtractor {
        let whitelist = ["GME", "AAPL", "TSLA", "NVDA"].iter().map(|s| s.to_string()).collect();
        TickerExtractor::with_whitelist(&config(), whitelist)
    }

    #[test]
    fn test_extract_cashtags() {
        let mentions = extractor().extract("Loading up on $GME and $AAPL options!");
        assert_eq!(mentions.len(), 2);

        let gme = mentions.iter().find(|m| m.ticker == "GME").unwrap();
        assert_eq!(gme.context, MentionContext::Cashtag);
        assert_eq!(gme.source_text, "$GME");
        assert!(gme.confidence >= 0.9);

        let aapl = mentions.iter().find(|m| m.ticker == "AAPL").unwrap();
        assert_eq!(aapl.context, MentionContext::Cashtag);
    }

    #[test]
    fn test_cashtag_with_context_words_scores_one() {
        // 0.9 + 0.1 whitelist + 0.1 context (buy, calls), clamped
        let mentions = extractor().extract("Going to buy $GME calls tomorrow");
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].ticker, "GME");
        assert_eq!(mentions[0].confidence, 1.0);
        assert_eq!(mentions[0].context, MentionContext::Cashtag);
    }

    #[test]
    fn test_extract_uppercase_words() {
        let mentions = extractor().extract("I think TSLA is going to moon.");
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].ticker, "TSLA");
        assert_eq!(mentions[0].context, MentionContext::UppercaseWord);
        // 0.5 + 0.1 whitelist + 0.05 length
        assert_eq!(mentions[0].confidence, 0.65);
    }

    #[test]
    fn test_cashtag_wins_over_uppercase() {
        let mentions = extractor().extract("GME is great. I love $GME. GME to the moon!");
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].ticker, "GME");
        assert_eq!(mentions[0].context, MentionContext::Cashtag);
    }

    #[test]
    fn test_blacklisted_tokens_yield_nothing() {
        let permissive = TickerExtractor::with_whitelist(&config(), HashSet::new());
        assert!(permissive.extract("DD YOLO ALL").is_empty());
        assert!(extractor().extract("DD YOLO ALL").is_empty());
    }

    #[test]
    fn test_whitelist_rejects_unknown_symbols() {
        assert!(extractor().extract("Thinking about $XYZ and AMC").is_empty());
    }

    #[test]
    fn test_empty_whitelist_is_permissive() {
        let permissive = TickerExtractor::with_whitelist(&config(), HashSet::new());
        let mentions = permissive.extract("$XYZ looks good");
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].ticker, "XYZ");
        assert_eq!(mentions[0].confidence, 0.9);
    }

    #[test]
    fn test_short_uppercase_penalty_and_min_confidence() {
        let permissive = TickerExtractor::with_whitelist(&config(), HashSet::new());
        // 0.5 - 0.2 = 0.3, kept at the 0.3 threshold
        let mentions = permissive.extract("AB went nowhere");
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].confidence, 0.3);

        let mut strict = config();
        strict.min_confidence = 0.5;
        let strict = TickerExtractor::with_whitelist(&strict, HashSet::new());
        assert!(strict.extract("AB went nowhere").is_empty());
    }

    #[test]
    fn test_sorted_by_confidence_descending() {
        let mentions = extractor().extract("NVDA is fine but $GME is the play");
        assert_eq!(mentions[0].ticker, "GME");
        assert_eq!(mentions[1].ticker, "NVDA");
        assert!(mentions[0].confidence >= mentions[1].confidence);
    }

    #[test]
    fn test_extract_from_texts_groups_by_ticker() {
        let texts = vec!["$GME to the moon", "GME and TSLA", "nothing here"];
        let grouped = extractor().extract_from_texts(&texts);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["GME"].len(), 2);
        assert_eq!(grouped["TSLA"].len(), 1);
    }

    #[test]
    fn test_load_whitelist_from_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ticker,name,exchange").unwrap();
        writeln!(file, "GME,GameStop,NYSE").unwrap();
        writeln!(file, " aapl ,Apple,NASDAQ").unwrap();
        writeln!(file, ",Blank,NYSE").unwrap();

        let whitelist = load_whitelist(file.path());
        assert_eq!(whitelist.len(), 2);
        assert!(whitelist.contains("GME"));
        assert!(whitelist.contains("AAPL"));
    }

    #[test]
    fn test_missing_whitelist_is_empty() {
        assert!(load_whitelist(Path::new("/nonexistent/whitelist.csv")).is_empty());
    }
}
