//! Seams to the message broker.

mod base;
mod message;

pub use base::{Broker, MessageHandler};
pub use message::{Acknowledger, InboundMessage};
