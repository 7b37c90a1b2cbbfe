//! The `client` module is the remote counterpart of the broker.
//!
//! [`RemoteBroker`] talks to a server started with
//! [`start_websocket_server`](crate::transport::start_websocket_server) and
//! offers publish and (reconnecting) subscribe.

pub mod remote;

pub use remote::{RemoteBroker, SubscribeOptions};
