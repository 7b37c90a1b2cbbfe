//! The `utils` module provides the shared pieces used across `fanout`:
//! error types and logging setup.

pub mod error;
pub mod logging;

pub use error::{BrokerError, ClientError, TransportError};
