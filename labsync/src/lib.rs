pub mod broker;
pub mod codec;
pub mod concurrency;
pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod gateway;
mod macros;
pub mod router;
pub mod session;
pub mod sinks;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
