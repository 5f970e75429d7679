//! Postgres warehouse holding request and sample rows in the `labsync` schema.

mod migrations;
mod warehouse;

pub use migrations::migrate_warehouse;
pub use warehouse::{PostgresWarehouse, connect_pool};
