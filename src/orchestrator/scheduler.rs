//! Fixed-interval pipeline loop
//! A failed iteration is logged and the loop carries on; only the shutdown future ends it

use anyhow::{bail, Result};
use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use super::pipeline::{Pipeline, RunOptions};

/// Re-run the pipeline every `interval` until Ctrl-C
pub async fn run_scheduled(pipeline: &Pipeline, interval: Duration, options: RunOptions) -> Result<()> {
    run_scheduled_until(pipeline, interval, options, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Re-run the pipeline every `interval` until `shutdown` resolves
pub async fn run_scheduled_until<F>(
    pipeline: &Pipeline,
    interval: Duration,
    options: RunOptions,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    if interval.is_zero() {
        bail!("Scheduler interval must be greater than zero");
    }

    info!("Starting scheduled pipeline every {:?}", interval);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut iteration: u64 = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received after {} iterations", iteration);
                break;
            }
            _ = ticker.tick() => {}
        }

        iteration += 1;
        info!("Scheduled pipeline iteration {}", iteration);
        match pipeline.run_once(Utc::now(), &options).await {
            Ok(report) => info!(
                "Iteration {} complete: {} signals from {} posts",
                iteration,
                report.signals.len(),
                report.posts_processed
            ),
            Err(e) => error!("Iteration {} failed: {:#}", iteration, e),
        }
    }

    Ok(())
}
