//! One end-to-end pipeline run
//! ingestion → ticker extraction → sentiment → attention → market features → signals → persistence → alerting

use anyhow::{Context as AnyhowContext, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::context::AppContext;
use crate::{
    data::{create_market_provider, Comment, MarketDataProvider, Post, PostSource, PriceBar},
    db::{RunCounts, RunStatus},
    features::{
        build_sentiment_scorer, AttentionTracker, SentimentResult, SentimentScorer,
        TickerExtractor,
    },
    signals::{MarketFeatureExtractor, Signal, SignalEngine},
    trading::TradeRecord,
};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Posts per listing; falls back to the configured batch size
    pub limit: Option<u32>,
    /// Stop after ingestion and persistence of raw items
    pub dry_run: bool,
    /// Route signals through the portfolio manager
    pub execute: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub dry_run: bool,
    pub posts_processed: usize,
    pub comments_processed: usize,
    pub tickers_found: usize,
    pub tickers_analyzed: usize,
    pub signals: Vec<Signal>,
    pub trades: Vec<TradeRecord>,
}

/// Posts, comments and texts grouped by the tickers they mention
#[derive(Debug, Default)]
pub struct TickerGroups {
    pub texts: BTreeMap<String, Vec<String>>,
    pub posts: BTreeMap<String, Vec<Post>>,
    pub comments: BTreeMap<String, Vec<Comment>>,
    /// Highest mention confidence seen for each ticker
    pub confidence: HashMap<String, f64>,
}

impl TickerGroups {
    pub fn build(extractor: &TickerExtractor, posts: &[Post], comments: &[Comment]) -> Self {
        let mut groups = Self::default();

        for post in posts {
            let text = post.full_text();
            for mention in extractor.extract(&text) {
                groups.record(&mention.ticker, mention.confidence, &text);
                groups.posts.entry(mention.ticker).or_default().push(post.clone());
            }
        }

        for comment in comments {
            for mention in extractor.extract(&comment.body) {
                groups.record(&mention.ticker, mention.confidence, &comment.body);
                groups.comments.entry(mention.ticker).or_default().push(comment.clone());
            }
        }

        groups
    }

    fn record(&mut self, ticker: &str, confidence: f64, text: &str) {
        self.texts.entry(ticker.to_string()).or_default().push(text.to_string());
        let best = self.confidence.entry(ticker.to_string()).or_insert(0.0);
        *best = best.max(confidence);
    }

    pub fn tickers(&self) -> Vec<String> {
        self.texts.keys().cloned().collect()
    }
}

pub struct Pipeline {
    ctx: Arc<AppContext>,
    source: Arc<dyn PostSource>,
    market: Arc<dyn MarketDataProvider>,
    scorer: Arc<dyn SentimentScorer>,
    extractor: TickerExtractor,
    attention: AttentionTracker,
    features: MarketFeatureExtractor,
    engine: SignalEngine,
}

impl Pipeline {
    /// Build every stage from the context's configuration
    pub fn from_config(ctx: Arc<AppContext>, source: Arc<dyn PostSource>) -> Result<Self> {
        let config = ctx.config();
        let market = create_market_provider(&config.market).context("Failed to create market data provider")?;
        let scorer = build_sentiment_scorer(config)?;
        info!("Using {} sentiment and {} market data", scorer.method(), market.name());
        Self::new(ctx, source, market, scorer)
    }

    pub fn new(
        ctx: Arc<AppContext>,
        source: Arc<dyn PostSource>,
        market: Arc<dyn MarketDataProvider>,
        scorer: Arc<dyn SentimentScorer>,
    ) -> Result<Self> {
        let config = ctx.config();
        let extractor = TickerExtractor::new(&config.tickers);
        let attention = AttentionTracker::new(config.attention.window_hours);
        let engine = SignalEngine::new(config.signals.clone())?;

        info!("Ticker extractor ready with {} whitelisted tickers", extractor.whitelist_len());

        Ok(Self {
            ctx,
            source,
            market,
            scorer,
            extractor,
            attention,
            features: MarketFeatureExtractor::new(),
            engine,
        })
    }

    pub fn with_extractor(mut self, extractor: TickerExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.ctx
    }

    /// Run the pipeline once with `now` as the reference time for attention windows
    ///
    /// The run is recorded as started, then completed or failed with the error message.
    pub async fn run_once(&self, now: DateTime<Utc>, options: &RunOptions) -> Result<PipelineReport> {
        let sink = self.ctx.sink();
        let run_id = sink.start_pipeline_run().await?;
        let mut counts = RunCounts::default();

        match self.execute(run_id, now, options, &mut counts).await {
            Ok(report) => {
                sink.complete_pipeline_run(run_id, counts, RunStatus::Completed, None)
                    .await?;
                Ok(report)
            }
            Err(e) => {
                error!("Pipeline failed: {:#}", e);
                let message = format!("{:#}", e);
                if let Err(record_err) = sink
                    .complete_pipeline_run(run_id, counts, RunStatus::Failed, Some(&message))
                    .await
                {
                    warn!("Could not record failed pipeline run {}: {:#}", run_id, record_err);
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        run_id: Uuid,
        now: DateTime<Utc>,
        options: &RunOptions,
        counts: &mut RunCounts,
    ) -> Result<PipelineReport> {
        let config = self.ctx.config();
        let sink = self.ctx.sink();
        let limit = options.limit.unwrap_or(config.reddit.batch_size);
        info!("Starting WSB Agent pipeline run (limit={}, source={})", limit, self.source.name());

        // Stage 1: ingestion
        let (posts, comments) = self
            .source
            .fetch_all(Some(limit))
            .await
            .context("Reddit ingestion failed")?;
        counts.posts_ingested = sink.insert_posts(&posts).await?;
        counts.comments_ingested = sink.insert_comments(&comments).await?;

        let mut report = PipelineReport {
            run_id,
            timestamp: now,
            dry_run: options.dry_run,
            posts_processed: posts.len(),
            comments_processed: comments.len(),
            tickers_found: 0,
            tickers_analyzed: 0,
            signals: Vec::new(),
            trades: Vec::new(),
        };

        if options.dry_run {
            info!(
                "DRY RUN: Fetched {} posts and {} comments. Skipping analysis.",
                posts.len(),
                comments.len()
            );
            return Ok(report);
        }

        // Stage 2: features
        let groups = TickerGroups::build(&self.extractor, &posts, &comments);
        let tickers = groups.tickers();
        counts.tickers_found = tickers.len();
        report.tickers_found = tickers.len();
        info!("Identified {} unique tickers for analysis", tickers.len());

        let sentiment = self.score_sentiment(&groups).await;
        let attention = self
            .attention
            .compute_batch_metrics(&groups.posts, &groups.comments, None, now);

        // Stage 3: market data and signals, only for tickers with enough mentions
        let viable: Vec<String> = tickers
            .into_iter()
            .filter(|t| {
                attention
                    .get(t)
                    .is_some_and(|a| a.mention_count >= config.signals.min_mentions)
            })
            .collect();
        report.tickers_analyzed = viable.len();
        info!("Fetching market data for {} viable tickers", viable.len());

        let histories = self.fetch_histories(&viable).await;
        let market = self.features.compute_batch_features(&histories);

        let signals = self.engine.generate_batch_signals(
            &viable,
            &sentiment,
            &attention,
            &market,
            Some(&groups.confidence),
        );
        sink.insert_signals(&signals).await?;
        counts.signals_generated = signals.len();

        // Stage 4: portfolio and alerting
        if options.execute {
            report.trades = self.ctx.portfolio_manager().execute_signals(&signals).await;
            self.record_portfolio_snapshot().await;
        }

        if self.ctx.notifier().is_enabled() {
            self.ctx.notifier().send_signals(&signals).await;
        }

        report.signals = signals;
        Ok(report)
    }

    async fn score_sentiment(&self, groups: &TickerGroups) -> BTreeMap<String, SentimentResult> {
        let mut results = BTreeMap::new();
        for (ticker, texts) in &groups.texts {
            if texts.is_empty() {
                continue;
            }
            let result = self.scorer.analyze_for_ticker(ticker, texts).await;
            results.insert(ticker.clone(), result);
        }
        results
    }

    async fn fetch_histories(&self, tickers: &[String]) -> BTreeMap<String, Option<Vec<PriceBar>>> {
        let mut histories = BTreeMap::new();
        for ticker in tickers {
            let history = match self.market.price_history(ticker).await {
                Ok(history) => history,
                Err(e) => {
                    warn!("Failed to fetch price history for {}: {}", ticker, e);
                    None
                }
            };
            histories.insert(ticker.clone(), history);
        }
        histories
    }

    async fn record_portfolio_snapshot(&self) {
        let Some(db) = self.ctx.database() else {
            return;
        };
        match self.ctx.broker().account_balance().await {
            Ok(balance) => {
                if let Err(e) = db.insert_portfolio_snapshot(balance, balance).await {
                    warn!("Failed to record portfolio snapshot: {:#}", e);
                }
            }
            Err(e) => warn!("Could not read broker balance for snapshot: {:#}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::collections::HashSet;

    fn post(id: &str, title: &str) -> Post {
        Post {
            id: id.to_string(),
            title: title.to_string(),
            body: String::new(),
            score: 10,
            upvote_ratio: 0.9,
            num_comments: 0,
            created_utc: Some(Utc::now()),
            author: None,
            url: String::new(),
            permalink: String::new(),
        }
    }

    fn comment(id: &str, body: &str) -> Comment {
        Comment {
            id: id.to_string(),
            body: body.to_string(),
            score: 1,
            created_utc: Some(Utc::now()),
            post_id: "p1".to_string(),
            author: None,
            parent_id: None,
        }
    }

    fn extractor() -> TickerExtractor {
        let whitelist: HashSet<String> = ["GME", "AMC", "TSLA"].iter().map(|s| s.to_string()).collect();
        TickerExtractor::with_whitelist(&Config::default().tickers, whitelist)
    }

    #[test]
    fn test_groups_by_ticker_with_max_confidence() {
        let posts = vec![post("p1", "$GME to the moon"), post("p2", "AMC and GME calls")];
        let comments = vec![comment("c1", "GME"), comment("c2", "nothing here")];

        let groups = TickerGroups::build(&extractor(), &posts, &comments);

        assert_eq!(groups.tickers(), vec!["AMC", "GME"]);
        assert_eq!(groups.posts["GME"].len(), 2);
        assert_eq!(groups.comments["GME"].len(), 1);
        assert!(!groups.comments.contains_key("AMC"));
        assert_eq!(groups.texts["GME"].len(), 3);

        // The cashtag mention sets the ticker's confidence
        let gme = groups.confidence["GME"];
        assert!(gme >= groups.confidence["AMC"]);
        assert!(gme >= 0.9);
    }

    #[test]
    fn test_empty_batch_has_no_tickers() {
        let groups = TickerGroups::build(&extractor(), &[], &[]);
        assert!(groups.tickers().is_empty());
        assert!(groups.confidence.is_empty());
    }
}
