//! Application context shared by the CLI entry points and the scheduler
//! Opened once at startup and closed by its owner at shutdown

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::{
    config::Config,
    db::{Database, MemorySink, SignalSink},
    notify::DiscordNotifier,
    trading::{create_broker, Broker, PortfolioManager},
};

pub struct AppContext {
    config: Config,
    database: Option<Arc<Database>>,
    sink: Arc<dyn SignalSink>,
    broker: Arc<dyn Broker>,
    notifier: DiscordNotifier,
}

impl AppContext {
    /// Connect to Postgres when `DATABASE_URL` is configured, otherwise keep results in memory
    pub async fn connect(config: Config) -> Result<Self> {
        let database = match config.database.url {
            Some(_) => {
                let db = Database::from_config(&config.database).await?;
                db.health_check().await?;
                info!("Database ready ({})", db.pool_stats());
                Some(Arc::new(db))
            }
            None => {
                info!("No DATABASE_URL configured; pipeline results will not be persisted");
                None
            }
        };
        Self::build(config, database)
    }

    /// Context without a database; results go to an in-process sink
    pub fn in_memory(config: Config) -> Result<Self> {
        Self::build(config, None)
    }

    fn build(config: Config, database: Option<Arc<Database>>) -> Result<Self> {
        let sink: Arc<dyn SignalSink> = match &database {
            Some(db) => db.clone() as Arc<dyn SignalSink>,
            None => Arc::new(MemorySink::new()),
        };
        let broker = create_broker(&config.portfolio)?;
        info!("Using {} broker", broker.name());
        let notifier = DiscordNotifier::new(config.notifications.discord_webhook_url.clone())?;

        Ok(Self {
            config,
            database,
            sink,
            broker,
            notifier,
        })
    }

    /// Replace the sink, e.g. with a [`MemorySink`] the caller keeps a handle to
    pub fn with_sink(mut self, sink: Arc<dyn SignalSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = broker;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> Option<&Arc<Database>> {
        self.database.as_ref()
    }

    pub fn sink(&self) -> &Arc<dyn SignalSink> {
        &self.sink
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    pub fn notifier(&self) -> &DiscordNotifier {
        &self.notifier
    }

    pub fn portfolio_manager(&self) -> PortfolioManager {
        PortfolioManager::new(&self.config.portfolio, self.broker.clone())
    }

    pub async fn close(&self) {
        if let Some(db) = &self.database {
            db.close().await;
        }
        info!("Application context closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_context() {
        let ctx = AppContext::in_memory(Config::default()).unwrap();
        assert!(ctx.database().is_none());
        assert!(!ctx.notifier().is_enabled());
        assert_eq!(ctx.broker().name(), "mock");
        assert_eq!(
            ctx.broker().account_balance().await.unwrap(),
            Config::default().portfolio.initial_balance
        );
        ctx.close().await;
    }

    #[tokio::test]
    async fn test_alpaca_without_keys_fails_at_startup() {
        let mut config = Config::default();
        config.portfolio.broker = "alpaca".to_string();
        let err = AppContext::in_memory(config).err().unwrap();
        assert!(err.to_string().contains("ALPACA_API_KEY"));
    }

    #[tokio::test]
    async fn test_connect_without_database_url() {
        let ctx = AppContext::connect(Config::default()).await.unwrap();
        assert!(ctx.database().is_none());
    }
}
