use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use crate::config::Config;

pub mod commands;

#[derive(Parser)]
#[command(
    name = "wsb-agent",
    about = "WallStreetBets attention and sentiment signal agent",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to an env file loaded before the process environment is read
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the signal pipeline once
    Run {
        /// Posts to fetch per listing (defaults to REDDIT_BATCH_SIZE)
        #[arg(short, long)]
        limit: Option<u32>,

        /// Read posts from a JSON fixture instead of Reddit
        #[arg(
            long,
            num_args = 0..=1,
            default_missing_value = crate::data::mock::DEFAULT_FIXTURE_PATH
        )]
        mock: Option<PathBuf>,

        /// Ingest and persist only, skip analysis
        #[arg(long)]
        dry_run: bool,

        /// How to print the run report
        #[arg(short, long, value_enum, default_value = "table")]
        output_format: OutputFormat,

        /// Route actionable signals through the portfolio manager
        #[arg(long)]
        execute: bool,
    },

    /// Re-run the pipeline on a fixed interval until Ctrl-C
    Schedule {
        /// Minutes between runs
        #[arg(short, long, default_value_t = 60)]
        interval_minutes: u64,

        /// Posts to fetch per listing
        #[arg(short, long)]
        limit: Option<u32>,

        /// Read posts from a JSON fixture instead of Reddit
        #[arg(
            long,
            num_args = 0..=1,
            default_missing_value = crate::data::mock::DEFAULT_FIXTURE_PATH
        )]
        mock: Option<PathBuf>,

        /// Route actionable signals through the portfolio manager
        #[arg(long)]
        execute: bool,
    },

    /// Show stored signals
    Signals {
        /// Only signals for this ticker
        #[arg(short, long)]
        ticker: Option<String>,

        /// Maximum number of signals to show
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },

    /// Delete all stored signals
    ClearSignals,

    /// Run database migrations
    Migrate,
}

pub async fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Run {
            limit,
            mock,
            dry_run,
            output_format,
            execute,
        } => {
            info!("Running pipeline once");
            commands::run(config, limit, mock, dry_run, output_format, execute).await?;
        }
        Commands::Schedule {
            interval_minutes,
            limit,
            mock,
            execute,
        } => {
            info!("Scheduling pipeline every {} minutes", interval_minutes);
            commands::schedule(config, interval_minutes, limit, mock, execute).await?;
        }
        Commands::Signals { ticker, limit } => {
            commands::signals(config, ticker, limit).await?;
        }
        Commands::ClearSignals => {
            commands::clear_signals(config).await?;
        }
        Commands::Migrate => {
            commands::migrate(config).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_defaults() {
        let cli = Cli::parse_from(["wsb-agent", "run"]);
        match cli.command {
            Commands::Run {
                limit,
                mock,
                dry_run,
                output_format,
                execute,
            } => {
                assert!(limit.is_none());
                assert!(mock.is_none());
                assert!(!dry_run);
                assert!(!execute);
                assert_eq!(output_format, OutputFormat::Table);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_run_with_bare_mock_flag() {
        let cli = Cli::parse_from(["wsb-agent", "run", "--mock", "--output-format", "json", "--limit", "5"]);
        match cli.command {
            Commands::Run {
                limit,
                mock,
                output_format,
                ..
            } => {
                assert_eq!(limit, Some(5));
                assert_eq!(mock, Some(PathBuf::from(crate::data::mock::DEFAULT_FIXTURE_PATH)));
                assert_eq!(output_format, OutputFormat::Json);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_signals_and_globals() {
        let cli = Cli::parse_from(["wsb-agent", "-v", "signals", "--ticker", "gme", "--limit", "5"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Signals { ticker, limit } => {
                assert_eq!(ticker.as_deref(), Some("gme"));
                assert_eq!(limit, 5);
            }
            _ => panic!("expected signals"),
        }
    }

    #[test]
    fn test_parse_schedule_interval() {
        let cli = Cli::parse_from(["wsb-agent", "schedule", "--interval-minutes", "15"]);
        assert!(matches!(
            cli.command,
            Commands::Schedule {
                interval_minutes: 15,
                ..
            }
        ));
    }
}
