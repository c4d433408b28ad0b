//! Attention metrics: how much a ticker is being talked about and how fast

use super::round_to;
use crate::data::{Comment, Post, RedditItem};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttentionMetrics {
    pub ticker: String,
    pub mention_count: usize,
    /// Mentions per hour inside the trailing window
    pub mention_velocity: f64,
    pub engagement_weighted_mentions: f64,
    pub sentiment_weighted_mentions: f64,
    pub window_hours: u32,
}

pub struct AttentionTracker {
    window_hours: u32,
}

impl AttentionTracker {
    pub fn new(window_hours: u32) -> Self {
        Self { window_hours }
    }

    pub fn compute_metrics(
        &self,
        ticker: &str,
        posts: &[Post],
        comments: &[Comment],
        sentiment_scores: Option<&HashMap<String, f64>>,
        now: DateTime<Utc>,
    ) -> AttentionMetrics {
        let mention_count = posts.len() + comments.len();
        let mention_velocity = self.velocity(posts, comments, now);
        let engagement_weighted = engagement_weight(posts) + engagement_weight(comments);
        let sentiment_weighted = match sentiment_scores {
            Some(scores) => sentiment_weight(posts, scores) + sentiment_weight(comments, scores),
            None => 0.0,
        };

        tracing::debug!(
            "Attention for {}: mentions={}, velocity={:.2}/hr, engagement={:.1}",
            ticker,
            mention_count,
            mention_velocity,
            engagement_weighted
        );

        AttentionMetrics {
            ticker: ticker.to_string(),
            mention_count,
            mention_velocity: round_to(mention_velocity, 4),
            engagement_weighted_mentions: round_to(engagement_weighted, 4),
            sentiment_weighted_mentions: round_to(sentiment_weighted, 4),
            window_hours: self.window_hours,
        }
    }

    /// Metrics for every ticker present in either map
    pub fn compute_batch_metrics(
        &self,
        ticker_posts: &BTreeMap<String, Vec<Post>>,
        ticker_comments: &BTreeMap<String, Vec<Comment>>,
        sentiment_scores: Option<&HashMap<String, f64>>,
        now: DateTime<Utc>,
    ) -> BTreeMap<String, AttentionMetrics> {
        let tickers: BTreeSet<&String> = ticker_posts.keys().chain(ticker_comments.keys()).collect();

        let results: BTreeMap<String, AttentionMetrics> = tickers
            .into_iter()
            .map(|ticker| {
                let posts = ticker_posts.get(ticker).map(Vec::as_slice).unwrap_or(&[]);
                let comments = ticker_comments.get(ticker).map(Vec::as_slice).unwrap_or(&[]);
                let metrics = self.compute_metrics(ticker, posts, comments, sentiment_scores, now);
                (ticker.clone(), metrics)
            })
            .collect();

        tracing::info!("Computed attention metrics for {} tickers", results.len());
        results
    }

    /// Timezone-aware items created at or after `now - window`, per hour
    fn velocity(&self, posts: &[Post], comments: &[Comment], now: DateTime<Utc>) -> f64 {
        if self.window_hours == 0 {
            return 0.0;
        }

        let cutoff = now - Duration::hours(i64::from(self.window_hours));
        let recent = count_since(posts, cutoff) + count_since(comments, cutoff);
        recent as f64 / f64::from(self.window_hours)
    }
}

fn count_since<T: RedditItem>(items: &[T], cutoff: DateTime<Utc>) -> usize {
    items
        .iter()
        .filter(|item| item.created_at().is_some_and(|ts| ts >= cutoff))
        .count()
}

/// `log2(max(score, 1) + 1)` per item
fn engagement_weight<T: RedditItem>(items: &[T]) -> f64 {
    items
        .iter()
        .map(|item| (item.item_score().max(1) as f64 + 1.0).log2())
        .sum()
}

fn sentiment_weight<T: RedditItem>(items: &[T], scores: &HashMap<String, f64>) -> f64 {
    items.iter().filter_map(|item| scores.get(item.item_id())).sum()
}
