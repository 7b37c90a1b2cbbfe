//! The broker: subscriber registry, publish fan-out and delivery statistics.
//!
//! - `engine`: [`Broker`], the concurrent registry and fan-out.
//! - `endpoint`: the [`Endpoint`] capability and the bounded [`Mailbox`].
//! - `stats`: [`Stats`], per-call and per-subscriber outcome counters.

pub mod endpoint;
pub mod engine;
pub mod stats;
mod subscriber;

pub use endpoint::{Delivery, Endpoint, Mailbox, MailboxId, MailboxReceiver, mailbox};
pub use engine::Broker;
pub use stats::{Outcome, Stats};
pub use subscriber::Filter;

#[cfg(test)]
mod tests;
