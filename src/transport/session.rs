//! One WebSocket connection.
//!
//! A session decodes client frames into broker calls and, once subscribed,
//! streams mailbox values as `data` frames interleaved with `heartbeat`
//! frames. The heartbeat timer belongs to the session alone.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::{Broker, Mailbox, MailboxReceiver, mailbox};
use crate::config::StreamSettings;
use crate::transport::message::{ClientFrame, HeartbeatEvent, ServerFrame};
use crate::transport::websocket::{FilterFactory, SubscribeRequest};
use crate::utils::error::{BrokerError, TransportError};

/// Active subscription of a session.
struct Subscription<T: Send> {
    endpoint: Mailbox<T>,
    values: MailboxReceiver<T>,
    heartbeat: Interval,
}

enum StreamEvent<T> {
    Value(T),
    Heartbeat,
}

impl<T: Send> Subscription<T> {
    async fn next(&mut self) -> StreamEvent<T> {
        tokio::select! {
            Some(v) = self.values.recv() => StreamEvent::Value(v),
            _ = self.heartbeat.tick() => StreamEvent::Heartbeat,
        }
    }
}

async fn next_event<T: Send>(subscription: &mut Option<Subscription<T>>) -> StreamEvent<T> {
    match subscription {
        Some(s) => s.next().await,
        None => std::future::pending().await,
    }
}

pub(crate) struct Session<T: Send> {
    id: String,
    peer: SocketAddr,
    broker: Arc<Broker<T>>,
    settings: StreamSettings,
    filter: Option<FilterFactory<T>>,
    subscription: Option<Subscription<T>>,
}

impl<T> Session<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        broker: Arc<Broker<T>>,
        settings: StreamSettings,
        filter: Option<FilterFactory<T>>,
        peer: SocketAddr,
    ) -> Self {
        Self {
            id: format!("session-{}", uuid::Uuid::new_v4()),
            peer,
            broker,
            settings,
            filter,
            subscription: None,
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    /// Serves the connection until the client goes away or `cancel` fires.
    /// The subscription, if any, is always removed from the broker on return.
    pub(crate) async fn run<S>(
        mut self,
        ws: S,
        cancel: CancellationToken,
    ) -> Result<(), TransportError>
    where
        S: Stream<Item = Result<WsMessage, tungstenite::Error>>
            + Sink<WsMessage, Error = tungstenite::Error>
            + Unpin,
    {
        debug!(session = %self.id, peer = %self.peer, "session opened");

        let (mut sink, mut stream) = ws.split();
        let result = self.serve(&mut sink, &mut stream, &cancel).await;

        self.close_subscription();
        let _ = sink.close().await;

        debug!(session = %self.id, "session closed");
        result
    }

    async fn serve<W, R>(
        &mut self,
        sink: &mut W,
        stream: &mut R,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError>
    where
        W: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
        R: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
    {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(session = %self.id, "server shutting down");
                    return Ok(());
                }

                incoming = stream.next() => {
                    let msg = match incoming {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => {
                            warn!(session = %self.id, "read failed: {e}");
                            return Ok(());
                        }
                        None => return Ok(()),
                    };

                    let reply = match msg {
                        WsMessage::Text(text) => self.handle_text(text.as_str()),
                        WsMessage::Binary(_) => ServerFrame::error("binary frames are not supported"),
                        WsMessage::Close(_) => return Ok(()),
                        _ => continue,
                    };
                    send_frame(sink, &reply).await?;
                }

                event = next_event(&mut self.subscription) => {
                    let frame = match event {
                        StreamEvent::Value(payload) => ServerFrame::Data { payload },
                        StreamEvent::Heartbeat => ServerFrame::Heartbeat(self.heartbeat()),
                    };
                    send_frame(sink, &frame).await?;
                }
            }
        }
    }

    fn handle_text(&mut self, text: &str) -> ServerFrame<T> {
        match serde_json::from_str::<ClientFrame<T>>(text) {
            Ok(ClientFrame::Publish { payload }) => {
                let stats = self.broker.publish(payload);
                debug!(session = %self.id, %stats, "published");
                ServerFrame::Published(stats)
            }

            Ok(ClientFrame::Subscribe {
                buffer,
                heartbeat_ms,
                filter,
            }) => self.open_subscription(buffer, heartbeat_ms, filter),

            Ok(ClientFrame::Unsubscribe) => match self.subscription.take() {
                Some(sub) => match self.broker.unsubscribe(&sub.endpoint) {
                    Ok(stats) => {
                        info!(session = %self.id, %stats, "unsubscribed");
                        ServerFrame::Unsubscribed(stats)
                    }
                    Err(e) => ServerFrame::error(e.to_string()),
                },
                None => ServerFrame::error(BrokerError::NotSubscribed.to_string()),
            },

            Err(err) => {
                warn!(
                    session = %self.id,
                    "invalid client frame: {err} | {}",
                    text.chars().take(100).collect::<String>()
                );
                ServerFrame::error(format!("decode frame: {err}"))
            }
        }
    }

    fn open_subscription(
        &mut self,
        buffer: Option<usize>,
        heartbeat_ms: Option<u64>,
        filter: Option<String>,
    ) -> ServerFrame<T> {
        if self.subscription.is_some() {
            return ServerFrame::error(BrokerError::AlreadySubscribed.to_string());
        }

        let request = SubscribeRequest {
            peer: self.peer,
            buffer: self.settings.resolve_buffer(buffer),
            heartbeat: self.settings.resolve_heartbeat(heartbeat_ms),
            filter,
        };
        let (endpoint, values) = mailbox(request.buffer);

        let predicate = self.filter.as_ref().and_then(|factory| factory(&request));
        let filtered = predicate.is_some();
        let registered = match predicate {
            Some(predicate) => self.broker.subscribe(endpoint.clone(), predicate),
            None => self.broker.subscribe_all(endpoint.clone()),
        };
        if let Err(e) = registered {
            return ServerFrame::error(format!("subscribe: {e}"));
        }

        let (buffer, period) = (request.buffer, request.heartbeat);

        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            session = %self.id,
            endpoint = %endpoint.id(),
            buffer,
            heartbeat = ?period,
            filtered,
            "subscribed"
        );

        self.subscription = Some(Subscription {
            endpoint,
            values,
            heartbeat,
        });

        ServerFrame::Subscribed {
            buffer,
            heartbeat_ms: period.as_millis() as u64,
        }
    }

    fn heartbeat(&self) -> HeartbeatEvent {
        let mut event = HeartbeatEvent {
            ts: Utc::now(),
            stats: None,
            error: None,
        };

        let status = self
            .subscription
            .as_ref()
            .ok_or(BrokerError::NotSubscribed)
            .and_then(|sub| self.broker.stats(&sub.endpoint));

        match status {
            Ok(stats) => event.stats = Some(stats),
            Err(e) => event.error = Some(e.to_string()),
        }

        trace!(session = %self.id, ?event, "heartbeat");
        event
    }

    fn close_subscription(&mut self) {
        if let Some(sub) = self.subscription.take() {
            match self.broker.unsubscribe(&sub.endpoint) {
                Ok(stats) => info!(session = %self.id, %stats, "unsubscribe on close"),
                Err(e) => warn!(session = %self.id, "unsubscribe on close: {e}"),
            }
        }
    }
}

async fn send_frame<W, T>(sink: &mut W, frame: &ServerFrame<T>) -> Result<(), TransportError>
where
    W: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
    T: Serialize,
{
    let text = serde_json::to_string(frame)?;
    sink.send(WsMessage::text(text)).await?;
    Ok(())
}
