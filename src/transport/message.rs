use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::broker::Stats;

/// Frames sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame<T> {
    /// Publish one value; answered with [`ServerFrame::Published`].
    Publish { payload: T },

    /// Open the session's subscription stream. Absent fields use the server's
    /// stream defaults. `filter` is handed to the server's filter factory, if
    /// one is installed, and ignored otherwise.
    Subscribe {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        buffer: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        heartbeat_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<String>,
    },

    /// Close the session's subscription; answered with
    /// [`ServerFrame::Unsubscribed`].
    Unsubscribe,
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame<T> {
    Published(Stats),
    Subscribed { buffer: usize, heartbeat_ms: u64 },
    Data { payload: T },
    Heartbeat(HeartbeatEvent),
    Unsubscribed(Stats),
    Error { message: String },
}

impl<T> ServerFrame<T> {
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            message: message.into(),
        }
    }

    /// The wire `type` tag of the frame.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::Published(_) => "published",
            ServerFrame::Subscribed { .. } => "subscribed",
            ServerFrame::Data { .. } => "data",
            ServerFrame::Heartbeat(_) => "heartbeat",
            ServerFrame::Unsubscribed(_) => "unsubscribed",
            ServerFrame::Error { .. } => "error",
        }
    }
}

/// Periodic liveness event of a subscription stream.
///
/// Carries the subscriber's current stats, or the broker error if the
/// subscription has been lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatEvent {
    pub ts: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
