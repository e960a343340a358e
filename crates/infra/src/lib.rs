//! Infrastructure layer: persistence and configuration.

pub mod config;
pub mod store;

pub use config::{AppConfig, ConfigError};
pub use store::{EntityStore, InMemoryEntityStore, PostgresEntityStore, StoreError, StoreResult};
