// WSB Agent - attention and sentiment trading signals from r/WallStreetBets.
// Posts are ingested, tickers extracted, sentiment and mention velocity scored,
// and combined with market features into BUY/SELL/HOLD signals.

#![deny(clippy::unwrap_used)]

pub mod cli;
pub mod config;
pub mod data;
pub mod db;
pub mod features;
pub mod llm;
pub mod notify;
pub mod orchestrator;
pub mod signals;
pub mod trading;

// Re-export commonly used items
pub use config::Config;
pub use data::{Comment, Post, PriceBar};
pub use orchestrator::{AppContext, Pipeline, PipelineReport, RunOptions};
pub use signals::{Action, Signal, SignalEngine};
