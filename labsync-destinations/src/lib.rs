//! Concrete sinks and broker of the lab-data gateway.
//!
//! Each backend sits behind its own feature and implements one of the seams defined in
//! [`labsync`]: the S3 object store, the Postgres warehouse, the Databricks pipeline trigger, the
//! chat webhook notifier and the NATS JetStream broker.

#[cfg(feature = "databricks")]
pub mod databricks;
#[cfg(feature = "nats")]
pub mod nats;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "s3")]
pub mod s3;
#[cfg(feature = "webhook")]
pub mod webhook;
