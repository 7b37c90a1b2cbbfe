//! The `transport` module exposes a [`Broker`](crate::broker::Broker) over
//! WebSockets.
//!
//! It defines the JSON frame protocol spoken between clients and the server
//! (`message`), the per-connection session (`session`) and the accept loop
//! (`websocket`).

pub mod message;
mod session;
pub mod websocket;

pub use message::{ClientFrame, HeartbeatEvent, ServerFrame};
pub use websocket::{
    FilterFactory, SubscribeRequest, serve, serve_with_filter, start_websocket_server,
};
