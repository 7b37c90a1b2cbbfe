//! # fanout
//!
//! `fanout` is an in-process publish/subscribe coordination point. Producers
//! publish typed values; independently filtered subscribers receive a
//! best-effort, non-blocking copy. A slow subscriber loses values rather than
//! stalling the publisher, and every outcome is counted.
//!
//! ## Core Modules
//!
//! - `broker`: the subscriber registry, publish fan-out and delivery stats.
//! - `transport`: a WebSocket server exposing a broker to other processes.
//! - `client`: the remote counterpart of the transport.
//! - `config`: loading server configuration from files and environment.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod transport;
pub mod utils;

pub use broker::{Broker, Delivery, Endpoint, Mailbox, MailboxReceiver, Stats, mailbox};
pub use utils::error::{BrokerError, ClientError, TransportError};
