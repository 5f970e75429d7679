//! Coordination primitives of the dispatch engine.
//!
//! Each message family gets a bounded [`mailbox`] fed by the router and a [`CompletionTracker`]
//! counting its in-flight delivery tasks. A single [`shutdown`] signal stops the dispatch loop,
//! which then waits on every tracker before the broker is closed.

pub mod mailbox;
pub mod shutdown;
pub mod tracker;

pub use mailbox::{Dispatch, Lane, Mailbox, MailboxSender, mailbox, mailbox_with_capacity};
pub use shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
pub use tracker::CompletionTracker;
