//! The `error` module defines the error types used within `fanout`.
//!
//! Broker errors are expected outcomes of caller misuse or races and are
//! returned as values. Transport and client errors are kept separate so a
//! network fault can never be confused with (or corrupt) broker state.

use thiserror::Error;

/// Errors returned by [`Broker`](crate::broker::Broker) operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerError {
    /// The endpoint identity is already registered.
    #[error("already subscribed")]
    AlreadySubscribed,

    /// No subscription exists for the endpoint identity.
    #[error("not subscribed")]
    NotSubscribed,
}

/// Errors raised by the WebSocket server.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors raised by [`RemoteBroker`](crate::client::RemoteBroker).
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("connect: {0}")]
    Connect(#[source] tungstenite::Error),

    #[error("websocket: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("encode frame: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("decode frame: {0}")]
    Decode(#[source] serde_json::Error),

    /// The server answered with an `error` frame.
    #[error("server error: {0}")]
    Server(String),

    #[error("unexpected frame: {0}")]
    UnexpectedFrame(&'static str),

    #[error("connection closed before a response was received")]
    Closed,
}

impl ClientError {
    /// Whether a subscribe loop should reconnect after this error rather than give up.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Connect(_) | ClientError::WebSocket(_) | ClientError::Closed
        )
    }
}
