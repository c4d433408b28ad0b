//! Curated WallStreetBets term table
//!
//! Loaded from a YAML document with three categories of `term: score`
//! entries, scores in [-1, 1]:
//!
//! ```yaml
//! bullish_terms:
//!   tendies: 0.8
//!   diamond hands: 0.7
//! bearish_terms:
//!   guh: -0.8
//! emoji_sentiment:
//!   "🚀": 0.8
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
struct LexiconFile {
    #[serde(default)]
    bullish_terms: BTreeMap<String, f64>,
    #[serde(default)]
    bearish_terms: BTreeMap<String, f64>,
    #[serde(default)]
    emoji_sentiment: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default)]
pub struct WsbLexicon {
    terms: BTreeMap<String, f64>,
}

impl WsbLexicon {
    pub fn from_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            terms: terms.into_iter().map(|(t, s)| (t.into(), s)).collect(),
        }
    }

    /// Load the lexicon; a missing or malformed file yields an empty lexicon
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            tracing::warn!("WSB lexicon not found at {}", path.display());
            return Self::default();
        }

        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                if raw.trim().is_empty() {
                    return Ok(LexiconFile::default());
                }
                serde_yaml::from_str::<LexiconFile>(&raw).map_err(|e| e.to_string())
            });

        match parsed {
            Ok(file) => {
                let lexicon = Self::from_terms(
                    file.bullish_terms
                        .into_iter()
                        .chain(file.bearish_terms)
                        .chain(file.emoji_sentiment),
                );
                tracing::info!("Loaded {} terms from WSB lexicon", lexicon.len());
                lexicon
            }
            Err(e) => {
                tracing::warn!("Failed to parse WSB lexicon {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Single ASCII words, merged into the base polarity lexicon
    pub fn single_words(&self) -> impl Iterator<Item = (&str, f64)> {
        self.terms
            .iter()
            .filter(|(term, _)| !is_phrase_or_symbol(term))
            .map(|(term, score)| (term.as_str(), *score))
    }

    /// Multi-word phrases and non-ASCII symbols, matched as substrings
    pub fn phrases(&self) -> impl Iterator<Item = (&str, f64)> {
        self.terms
            .iter()
            .filter(|(term, _)| is_phrase_or_symbol(term))
            .map(|(term, score)| (term.as_str(), *score))
    }
}

fn is_phrase_or_symbol(term: &str) -> bool {
    term.contains(' ') || !term.is_ascii()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_categories() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "bullish_terms:\n  tendies: 0.8\n  diamond hands: 0.7\nbearish_terms:\n  guh: -0.8\nemoji_sentiment:\n  \"🚀\": 0.8\n"
        )
        .unwrap();

        let lexicon = WsbLexicon::load(file.path());
        assert_eq!(lexicon.len(), 4);

        let words: Vec<_> = lexicon.single_words().map(|(t, _)| t).collect();
        assert_eq!(words, vec!["guh", "tendies"]);

        let phrases: Vec<_> = lexicon.phrases().map(|(t, _)| t).collect();
        assert!(phrases.contains(&"diamond hands"));
        assert!(phrases.contains(&"🚀"));
    }

    #[test]
    fn test_missing_or_empty_file() {
        assert!(WsbLexicon::load(Path::new("/nonexistent/lexicon.yaml")).is_empty());

        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(WsbLexicon::load(file.path()).is_empty());
    }
}
