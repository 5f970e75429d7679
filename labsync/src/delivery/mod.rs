//! Delivery of decoded envelopes to the sinks.
//!
//! A delivery first builds a [`DeliveryPlan`] from the envelope without side effects. The
//! [`Executor`] then applies its effects in order, stopping at the first failure, and only after
//! every effect succeeded acknowledges the message and posts the notification.

mod executor;
mod plan;
mod task;

pub use executor::Executor;
pub use plan::{DeliveryPlan, Effect, Planner};
pub use task::Deliverer;
