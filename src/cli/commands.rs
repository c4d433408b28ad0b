use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::OutputFormat;
use crate::{
    config::Config,
    data::{MockIngester, PostSource, RedditIngester},
    db::Database,
    orchestrator::{run_scheduled, AppContext, Pipeline, PipelineReport, RunOptions},
    signals::Signal,
};

async fn build_source(config: &Config, mock: Option<PathBuf>) -> Result<Arc<dyn PostSource>> {
    match mock {
        Some(path) => {
            info!("Using mock ingester with fixture {}", path.display());
            Ok(Arc::new(MockIngester::new(path, config.reddit.batch_size)))
        }
        None => {
            let ingester = RedditIngester::connect(config.reddit.clone())
                .await
                .context("Failed to connect to Reddit")?;
            Ok(Arc::new(ingester))
        }
    }
}

/// Orders only reach a real broker with `--execute`
fn broker_for_run(mut config: Config, execute: bool) -> Config {
    if !execute && config.portfolio.broker != "mock" {
        info!("No --execute flag, using the mock broker instead of {}", config.portfolio.broker);
        config.portfolio.broker = "mock".to_string();
    }
    config
}

async fn require_database(config: &Config) -> Result<Database> {
    if config.database.url.is_none() {
        return Err(anyhow!("DATABASE_URL must be set for this command"));
    }
    Database::from_config(&config.database).await
}

/// Run the pipeline once and print its report
pub async fn run(
    config: Config,
    limit: Option<u32>,
    mock: Option<PathBuf>,
    dry_run: bool,
    output_format: OutputFormat,
    execute: bool,
) -> Result<()> {
    let source = build_source(&config, mock).await?;
    let ctx = Arc::new(AppContext::connect(broker_for_run(config, execute)).await?);
    let pipeline = Pipeline::from_config(ctx.clone(), source)?;

    let options = RunOptions {
        limit,
        dry_run,
        execute,
    };
    let result = pipeline.run_once(Utc::now(), &options).await;
    ctx.close().await;
    let report = result?;

    match output_format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report).context("Failed to serialize pipeline report")?;
            println!("{}", json);
        }
        OutputFormat::Table => print_report(&report),
    }

    Ok(())
}

/// Re-run the pipeline every `interval_minutes` until Ctrl-C
pub async fn schedule(
    config: Config,
    interval_minutes: u64,
    limit: Option<u32>,
    mock: Option<PathBuf>,
    execute: bool,
) -> Result<()> {
    let source = build_source(&config, mock).await?;
    let ctx = Arc::new(AppContext::connect(broker_for_run(config, execute)).await?);
    let pipeline = Pipeline::from_config(ctx.clone(), source)?;

    let options = RunOptions {
        limit,
        dry_run: false,
        execute,
    };
    let result = run_scheduled(&pipeline, Duration::from_secs(interval_minutes * 60), options).await;
    ctx.close().await;
    result
}

/// Print the most recent stored signals, optionally for one ticker
pub async fn signals(config: Config, ticker: Option<String>, limit: i64) -> Result<()> {
    let db = require_database(&config).await?;
    let signals = match &ticker {
        Some(ticker) => db.ticker_signals(ticker, limit).await?,
        None => db.recent_signals(limit).await?,
    };
    db.close().await;

    if signals.is_empty() {
        println!("No signals stored");
        return Ok(());
    }

    println!("\n📊 {} stored signals", signals.len());
    for signal in &signals {
        println!(
            "{}  {}",
            signal.timestamp.format("%Y-%m-%d %H:%M"),
            format_signal_row(signal)
        );
    }
    Ok(())
}

pub async fn clear_signals(config: Config) -> Result<()> {
    let db = require_database(&config).await?;
    let deleted = db.clear_signals().await?;
    db.close().await;
    println!("🗑️  Deleted {} signals", deleted);
    Ok(())
}

pub async fn migrate(config: Config) -> Result<()> {
    let db = require_database(&config).await?;
    db.run_migrations().await?;
    db.close().await;
    println!("Database migrations completed successfully");
    Ok(())
}

pub fn format_signal_row(signal: &Signal) -> String {
    format!(
        "[{}] {:<6} | Score: {:>6.3} | Confidence: {:.2} | {}",
        signal.action, signal.ticker, signal.composite_score, signal.confidence, signal.reasoning
    )
}

fn print_report(report: &PipelineReport) {
    println!("\n✅ Pipeline run {} completed", report.run_id);
    println!(
        "   Posts: {}, Comments: {}, Tickers found: {}, Analyzed: {}",
        report.posts_processed, report.comments_processed, report.tickers_found, report.tickers_analyzed
    );

    if report.dry_run {
        println!("   Dry run: analysis skipped");
        return;
    }

    if report.signals.is_empty() {
        println!("\nNo signals generated");
    } else {
        println!("\n📊 Signals:");
        for signal in &report.signals {
            println!("   {}", format_signal_row(signal));
        }
    }

    if !report.trades.is_empty() {
        println!("\n💼 Trades:");
        for trade in &report.trades {
            println!("   {} {} ${:.2} ({})", trade.action, trade.ticker, trade.amount, trade.reason);
        }
    }
}
