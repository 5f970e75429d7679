//! Configuration structures shared by the gateway crates.

mod base;
mod broker;
mod connection;
mod gateway;
mod notification;
mod object_store;
mod pipeline;
mod subjects;
mod warehouse;

pub use base::ValidationError;
pub use broker::BrokerConfig;
pub use connection::{PgConnectionConfig, TlsConfig};
pub use gateway::GatewayConfig;
pub use notification::NotificationConfig;
pub use object_store::{ObjectStoreConfig, SessionConfig};
pub use pipeline::PipelineConfig;
pub use subjects::SubjectsConfig;
pub use warehouse::WarehouseConfig;
