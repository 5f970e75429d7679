//! In-memory collaborators and fixtures for exercising the gateway without external systems.
//!
//! Every test double records what it did into a shared [`log::EventLog`], so that tests can
//! assert on the relative order of writes, acknowledgements, notifications and broker shutdown,
//! and wait for a condition with [`notify::TimedNotify`].

pub mod broker;
pub mod fixtures;
pub mod log;
pub mod notify;
pub mod sinks;
