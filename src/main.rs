use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use wsb_agent::cli::{self, Cli};
use wsb_agent::config::{Config, LoggingConfig};

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    // RUST_LOG wins over LOG_LEVEL; --verbose wins over both
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level))
    };

    let fmt_layer = if logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .json()
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        dotenv::from_path(path).with_context(|| format!("Failed to load env file {}", path.display()))?;
    }

    let config = Config::load()?;
    init_tracing(&config.logging, cli.verbose);

    info!(version = env!("CARGO_PKG_VERSION"), "WSB Agent starting up");

    cli::run(cli, config).await?;

    info!("WSB Agent completed successfully");
    Ok(())
}
