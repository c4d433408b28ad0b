//! Orchestration: application context, the end-to-end pipeline and its scheduler

pub mod context;
pub mod pipeline;
pub mod scheduler;

pub use context::AppContext;
pub use pipeline::{Pipeline, PipelineReport, RunOptions, TickerGroups};
pub use scheduler::{run_scheduled, run_scheduled_until};
