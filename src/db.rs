use crate::config::DatabaseConfig;
use crate::data::{Comment, Post};
use crate::signals::{Signal, SignalComponents};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Counters recorded when a pipeline run finishes
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunCounts {
    pub posts_ingested: usize,
    pub comments_ingested: usize,
    pub tickers_found: usize,
    pub signals_generated: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// Where a pipeline run's raw inputs, signals and run log are written
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn insert_posts(&self, posts: &[Post]) -> Result<usize>;

    async fn insert_comments(&self, comments: &[Comment]) -> Result<usize>;

    async fn insert_signals(&self, signals: &[Signal]) -> Result<usize>;

    async fn start_pipeline_run(&self) -> Result<Uuid>;

    async fn complete_pipeline_run(
        &self,
        run_id: Uuid,
        counts: RunCounts,
        status: RunStatus,
        error_message: Option<&str>,
    ) -> Result<()>;
}

pub struct Database {
    pub pool: PgPool,
}

#[derive(Debug, FromRow)]
struct SignalRow {
    ticker: String,
    composite_score: f64,
    action: String,
    confidence: f64,
    components: Json<SignalComponents>,
    reasoning: String,
    metadata: Json<serde_json::Map<String, serde_json::Value>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SignalRow> for Signal {
    type Error = anyhow::Error;

    fn try_from(row: SignalRow) -> Result<Self> {
        Ok(Signal {
            action: row.action.parse()?,
            ticker: row.ticker,
            composite_score: row.composite_score,
            confidence: row.confidence,
            components: row.components.0,
            reasoning: row.reasoning,
            metadata: row.metadata.0,
            timestamp: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub total_equity: f64,
    pub cash: f64,
    pub timestamp: DateTime<Utc>,
}

fn rows_to_signals(rows: Vec<SignalRow>) -> Vec<Signal> {
    rows.into_iter()
        .filter_map(|row| {
            let ticker = row.ticker.clone();
            match Signal::try_from(row) {
                Ok(signal) => Some(signal),
                Err(e) => {
                    tracing::error!("Error parsing signal row for {}: {}", ticker, e);
                    None
                }
            }
        })
        .collect()
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::connect(database_url, 5, 1).await
    }

    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .context("DATABASE_URL is not set")?;
        Self::connect(url, config.max_connections, config.min_connections).await
    }

    async fn connect(database_url: &str, max_connections: u32, min_connections: u32) -> Result<Self> {
        info!("Connecting to PostgreSQL database");

        // Statement caching off so pooled connections behind pgBouncer work
        let connect_options = PgConnectOptions::from_str(database_url)
            .context("Failed to parse DATABASE_URL")?
            .statement_cache_capacity(0);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .idle_timeout(std::time::Duration::from_secs(300))
            .max_lifetime(std::time::Duration::from_secs(1800))
            .connect_with(connect_options)
            .await
            .context("Failed to connect to PostgreSQL database. Check that DATABASE_URL is set correctly.")?;

        info!("Database connection established successfully");
        Ok(Database { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Perform a health check on the database connection
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .persistent(false)
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;

        info!("Database health check passed");
        Ok(())
    }

    /// Insert posts, skipping ids already stored; returns the number of new rows
    pub async fn insert_posts(&self, posts: &[Post]) -> Result<usize> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let mut inserted = 0usize;

        for post in posts {
            let result = sqlx::query(
                r#"
                INSERT INTO posts (id, title, body, score, upvote_ratio, num_comments,
                                   created_utc, author, url, permalink)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .persistent(false)
            .bind(&post.id)
            .bind(&post.title)
            .bind(&post.body)
            .bind(post.score)
            .bind(post.upvote_ratio)
            .bind(i64::try_from(post.num_comments).unwrap_or(i64::MAX))
            .bind(post.created_utc)
            .bind(&post.author)
            .bind(&post.url)
            .bind(&post.permalink)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(done) => inserted += done.rows_affected() as usize,
                Err(e) => warn!("Error inserting post {}: {}", post.id, e),
            }
        }

        tx.commit().await.context("Failed to commit posts")?;
        info!(
            "Inserted {} new posts (skipped {} duplicates)",
            inserted,
            posts.len().saturating_sub(inserted)
        );
        Ok(inserted)
    }

    pub async fn insert_comments(&self, comments: &[Comment]) -> Result<usize> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let mut inserted = 0usize;

        for comment in comments {
            let result = sqlx::query(
                r#"
                INSERT INTO comments (id, body, score, created_utc, post_id, author, parent_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .persistent(false)
            .bind(&comment.id)
            .bind(&comment.body)
            .bind(comment.score)
            .bind(comment.created_utc)
            .bind(&comment.post_id)
            .bind(&comment.author)
            .bind(&comment.parent_id)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(done) => inserted += done.rows_affected() as usize,
                Err(e) => warn!("Error inserting comment {}: {}", comment.id, e),
            }
        }

        tx.commit().await.context("Failed to commit comments")?;
        info!("Inserted {} new comments", inserted);
        Ok(inserted)
    }

    pub async fn insert_signals(&self, signals: &[Signal]) -> Result<usize> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let mut inserted = 0usize;

        for signal in signals {
            let result = sqlx::query(
                r#"
                INSERT INTO signals (ticker, composite_score, action, confidence,
                                     components, reasoning, metadata, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .persistent(false)
            .bind(&signal.ticker)
            .bind(signal.composite_score)
            .bind(signal.action.as_str())
            .bind(signal.confidence)
            .bind(Json(&signal.components))
            .bind(&signal.reasoning)
            .bind(Json(&signal.metadata))
            .bind(signal.timestamp)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) => inserted += 1,
                Err(e) => warn!("Error inserting signal for {}: {}", signal.ticker, e),
            }
        }

        tx.commit().await.context("Failed to commit signals")?;
        info!("Inserted {} signals", inserted);
        Ok(inserted)
    }

    /// Most recent signals, newest first
    pub async fn recent_signals(&self, limit: i64) -> Result<Vec<Signal>> {
        let rows: Vec<SignalRow> = sqlx::query_as(
            r#"
            SELECT ticker, composite_score, action, confidence, components,
                   reasoning, metadata, created_at
            FROM signals
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .persistent(false)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch recent signals")?;

        Ok(rows_to_signals(rows))
    }

    pub async fn ticker_signals(&self, ticker: &str, limit: i64) -> Result<Vec<Signal>> {
        let rows: Vec<SignalRow> = sqlx::query_as(
            r#"
            SELECT ticker, composite_score, action, confidence, components,
                   reasoning, metadata, created_at
            FROM signals
            WHERE ticker = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .persistent(false)
        .bind(ticker.to_uppercase())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to fetch signals for {}", ticker))?;

        Ok(rows_to_signals(rows))
    }

    /// Delete every stored signal; returns the number removed
    pub async fn clear_signals(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM signals")
            .persistent(false)
            .execute(&self.pool)
            .await
            .context("Failed to clear signals table")?;

        info!("Signals table cleared successfully ({} rows)", result.rows_affected());
        Ok(result.rows_affected())
    }

    pub async fn insert_portfolio_snapshot(&self, total_equity: f64, cash: f64) -> Result<()> {
        sqlx::query("INSERT INTO portfolio_history (total_equity, cash, timestamp) VALUES ($1, $2, $3)")
            .persistent(false)
            .bind(total_equity)
            .bind(cash)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .context("Failed to insert portfolio snapshot")?;

        info!("Recorded portfolio snapshot: Equity=${:.2}", total_equity);
        Ok(())
    }

    pub async fn portfolio_history(&self, limit: i64) -> Result<Vec<PortfolioSnapshot>> {
        sqlx::query_as(
            "SELECT total_equity, cash, timestamp FROM portfolio_history ORDER BY timestamp DESC LIMIT $1",
        )
        .persistent(false)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch portfolio history")
    }

    pub async fn start_pipeline_run(&self) -> Result<Uuid> {
        let run_id = Uuid::new_v4();
        sqlx::query("INSERT INTO pipeline_runs (id, started_at, status) VALUES ($1, $2, $3)")
            .persistent(false)
            .bind(run_id)
            .bind(Utc::now())
            .bind(RunStatus::Running.as_str())
            .execute(&self.pool)
            .await
            .context("Failed to record pipeline run start")?;

        info!("Started pipeline run {}", run_id);
        Ok(run_id)
    }

    pub async fn complete_pipeline_run(
        &self,
        run_id: Uuid,
        counts: RunCounts,
        status: RunStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE pipeline_runs SET
                completed_at = $1,
                posts_ingested = $2,
                comments_ingested = $3,
                tickers_found = $4,
                signals_generated = $5,
                status = $6,
                error_message = $7
            WHERE id = $8
            "#,
        )
        .persistent(false)
        .bind(Utc::now())
        .bind(to_i64(counts.posts_ingested))
        .bind(to_i64(counts.comments_ingested))
        .bind(to_i64(counts.tickers_found))
        .bind(to_i64(counts.signals_generated))
        .bind(status.as_str())
        .bind(error_message)
        .bind(run_id)
        .execute(&self.pool)
        .await
        .context("Failed to record pipeline run completion")?;

        info!("Completed pipeline run {} (status: {})", run_id, status.as_str());
        Ok(())
    }

    /// Get database connection pool statistics
    pub fn pool_stats(&self) -> String {
        format!(
            "Pool connections: {}/{}",
            self.pool.size(),
            self.pool.options().get_max_connections()
        )
    }

    /// Close the database connection pool
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }
}

#[async_trait]
impl SignalSink for Database {
    async fn insert_posts(&self, posts: &[Post]) -> Result<usize> {
        Database::insert_posts(self, posts).await
    }

    async fn insert_comments(&self, comments: &[Comment]) -> Result<usize> {
        Database::insert_comments(self, comments).await
    }

    async fn insert_signals(&self, signals: &[Signal]) -> Result<usize> {
        Database::insert_signals(self, signals).await
    }

    async fn start_pipeline_run(&self) -> Result<Uuid> {
        Database::start_pipeline_run(self).await
    }

    async fn complete_pipeline_run(
        &self,
        run_id: Uuid,
        counts: RunCounts,
        status: RunStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        Database::complete_pipeline_run(self, run_id, counts, status, error_message).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub id: Uuid,
    pub status: RunStatus,
    pub counts: RunCounts,
    pub error_message: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    post_ids: std::collections::HashSet<String>,
    comment_ids: std::collections::HashSet<String>,
    signals: Vec<Signal>,
    runs: Vec<RunRecord>,
}

/// In-process sink for dry runs and tests; keeps the same dedup rules as [`Database`]
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn signals(&self) -> Vec<Signal> {
        self.state.lock().await.signals.clone()
    }

    pub async fn runs(&self) -> Vec<RunRecord> {
        self.state.lock().await.runs.clone()
    }

    pub async fn post_count(&self) -> usize {
        self.state.lock().await.post_ids.len()
    }
}

#[async_trait]
impl SignalSink for MemorySink {
    async fn insert_posts(&self, posts: &[Post]) -> Result<usize> {
        let mut state = self.state.lock().await;
        Ok(posts.iter().filter(|p| state.post_ids.insert(p.id.clone())).count())
    }

    async fn insert_comments(&self, comments: &[Comment]) -> Result<usize> {
        let mut state = self.state.lock().await;
        Ok(comments.iter().filter(|c| state.comment_ids.insert(c.id.clone())).count())
    }

    async fn insert_signals(&self, signals: &[Signal]) -> Result<usize> {
        self.state.lock().await.signals.extend_from_slice(signals);
        Ok(signals.len())
    }

    async fn start_pipeline_run(&self) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.state.lock().await.runs.push(RunRecord {
            id,
            status: RunStatus::Running,
            counts: RunCounts::default(),
            error_message: None,
        });
        Ok(id)
    }

    async fn complete_pipeline_run(
        &self,
        run_id: Uuid,
        counts: RunCounts,
        status: RunStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let run = state
            .runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .with_context(|| format!("Unknown pipeline run {}", run_id))?;
        run.status = status;
        run.counts = counts;
        run.error_message = error_message.map(str::to_string);
        Ok(())
    }
}
