pub mod alpaca;
pub mod broker;
pub mod portfolio;
pub mod position_sizing;

// Re-export commonly used types
pub use alpaca::AlpacaBroker;
pub use broker::{create_broker, Broker, MockBroker, OrderSide};
pub use portfolio::{PortfolioManager, TradeRecord};
pub use position_sizing::PositionSizer;
