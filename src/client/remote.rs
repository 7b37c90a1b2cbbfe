use std::marker::PhantomData;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use tungstenite::client::IntoClientRequest;
use tungstenite::protocol::Message as WsMessage;

use crate::broker::Stats;
use crate::transport::message::{ClientFrame, ServerFrame};
use crate::utils::error::ClientError;

type Connection = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Options for [`RemoteBroker::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Server-side mailbox capacity; server default when `None`.
    pub buffer: Option<usize>,
    /// Heartbeat interval; server default when `None` or out of range.
    pub heartbeat: Option<Duration>,
    /// Filter argument passed to the server's filter factory.
    pub filter: Option<String>,
    /// Pause between reconnect attempts.
    pub retry: Duration,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            buffer: None,
            heartbeat: None,
            filter: None,
            retry: Duration::from_secs(1),
        }
    }
}

/// A broker served by the WebSocket transport on another process.
///
/// Provides publish and subscribe similar to a local
/// [`Broker`](crate::broker::Broker).
#[derive(Debug, Clone)]
pub struct RemoteBroker<T> {
    url: String,
    _values: PhantomData<fn() -> T>,
}

impl<T> RemoteBroker<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    /// Targets the server at `url`, e.g. `ws://127.0.0.1:8080`.
    pub fn new(url: impl Into<String>) -> Result<Self, ClientError> {
        let url = url.into();
        url.as_str()
            .into_client_request()
            .map_err(|e| ClientError::InvalidUrl(format!("{url}: {e}")))?;

        Ok(Self {
            url,
            _values: PhantomData,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Publishes `value` to the remote broker and returns the outcome.
    pub async fn publish(&self, value: &T) -> Result<Stats, ClientError> {
        let mut ws = self.connect().await?;
        send_frame(&mut ws, &ClientFrame::Publish { payload: value }).await?;

        let result = match read_frame::<T>(&mut ws).await? {
            ServerFrame::Published(stats) => Ok(stats),
            ServerFrame::Error { message } => Err(ClientError::Server(message)),
            other => Err(ClientError::UnexpectedFrame(other.kind())),
        };

        let _ = ws.close(None).await;
        result
    }

    /// Subscribes to values published on the remote broker and forwards them
    /// to `sink`.
    ///
    /// Lost connections are retried every `options.retry`. Heartbeats are
    /// consumed silently. Returns `Ok(())` once `cancel` fires or `sink` is
    /// closed, and an error when a frame can't be decoded or the server
    /// rejects the subscription.
    pub async fn subscribe(
        &self,
        sink: mpsc::Sender<T>,
        options: SubscribeOptions,
        cancel: CancellationToken,
    ) -> Result<(), ClientError> {
        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                outcome = self.stream_into(&sink, &options) => outcome,
            };

            match outcome {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() => {
                    warn!(url = %self.url, "subscription lost, retrying in {:?}: {e}", options.retry);
                }
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(options.retry) => {}
            }
        }
    }

    /// One connection's worth of [`subscribe`](Self::subscribe). `Ok(())`
    /// means the sink was closed.
    async fn stream_into(
        &self,
        sink: &mpsc::Sender<T>,
        options: &SubscribeOptions,
    ) -> Result<(), ClientError> {
        let mut ws = self.connect().await?;

        let request: ClientFrame<T> = ClientFrame::Subscribe {
            buffer: options.buffer,
            heartbeat_ms: options.heartbeat.map(|d| d.as_millis() as u64),
            filter: options.filter.clone(),
        };
        send_frame(&mut ws, &request).await?;

        loop {
            let frame = tokio::select! {
                _ = sink.closed() => {
                    debug!(url = %self.url, "sink closed, ending subscription");
                    let _ = ws.close(None).await;
                    return Ok(());
                }
                frame = read_frame::<T>(&mut ws) => frame?,
            };

            match frame {
                ServerFrame::Data { payload } => {
                    if sink.send(payload).await.is_err() {
                        debug!(url = %self.url, "sink closed, ending subscription");
                        let _ = ws.close(None).await;
                        return Ok(());
                    }
                }
                ServerFrame::Heartbeat(event) => trace!(?event, "heartbeat"),
                ServerFrame::Subscribed {
                    buffer,
                    heartbeat_ms,
                } => debug!(url = %self.url, buffer, heartbeat_ms, "subscribed"),
                ServerFrame::Error { message } => return Err(ClientError::Server(message)),
                other => return Err(ClientError::UnexpectedFrame(other.kind())),
            }
        }
    }

    async fn connect(&self) -> Result<Connection, ClientError> {
        let (ws, _response) = connect_async(self.url.as_str())
            .await
            .map_err(ClientError::Connect)?;
        Ok(ws)
    }
}

async fn send_frame<F: Serialize>(ws: &mut Connection, frame: &F) -> Result<(), ClientError> {
    let text = serde_json::to_string(frame).map_err(ClientError::Encode)?;
    ws.send(WsMessage::text(text)).await?;
    Ok(())
}

/// Reads the next text frame, skipping control frames.
async fn read_frame<T: DeserializeOwned>(
    ws: &mut Connection,
) -> Result<ServerFrame<T>, ClientError> {
    loop {
        match ws.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                return serde_json::from_str(text.as_str()).map_err(ClientError::Decode);
            }
            Some(Ok(WsMessage::Close(_))) | None => return Err(ClientError::Closed),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(ClientError::WebSocket(e)),
        }
    }
}
