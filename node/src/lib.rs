//! Gateway process for the social credit economy.
//!
//! Chat-platform adapters connect over a websocket and forward commands and button presses.
//! The node runs them against the [socialcredit_execution::Economy] backed by Redis and answers
//! with messages to send or edit.

pub mod command;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod metrics;
pub mod price;
pub mod redis_store;
pub mod render;
pub mod wire;

pub use config::{Config, ConfigError, ValidatedConfig};
pub use dispatch::{Dispatcher, DispatcherConfig};
pub use gateway::Gateway;
pub use redis_store::RedisStore;
