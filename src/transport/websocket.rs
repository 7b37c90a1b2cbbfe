//! WebSocket server
//!
//! Accepts TCP connections, performs the WebSocket handshake and hands each
//! connection to its own [`Session`] task. Responsibilities:
//! - translate `publish` / `subscribe` / `unsubscribe` frames into broker calls
//! - stream subscribed values and heartbeats back to the client
//! - on shutdown, stop accepting, cancel every session and wait for them so
//!   each one unsubscribes from the broker before the server returns

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_tungstenite::accept_async;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::{Broker, Filter};
use crate::config::StreamSettings;
use crate::transport::session::Session;
use crate::utils::error::TransportError;

/// What a session knows when it opens a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub peer: SocketAddr,
    /// Resolved mailbox capacity.
    pub buffer: usize,
    /// Resolved heartbeat interval.
    pub heartbeat: Duration,
    /// The client's filter argument, verbatim.
    pub filter: Option<String>,
}

/// Builds the broker filter for a subscription. `None` subscribes to every
/// value.
pub type FilterFactory<T> = Arc<dyn Fn(&SubscribeRequest) -> Option<Filter<T>> + Send + Sync>;

/// Binds `addr` and serves `broker` until `shutdown` resolves.
pub async fn start_websocket_server<T, F>(
    addr: &str,
    broker: Arc<Broker<T>>,
    settings: StreamSettings,
    filter: Option<FilterFactory<T>>,
    shutdown: F,
) -> Result<(), TransportError>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: Future<Output = ()>,
{
    let listener = TcpListener::bind(addr).await?;
    serve_with_filter(listener, broker, settings, filter, shutdown).await
}

/// Serves `broker` on an already-bound listener until `shutdown` resolves.
/// Every subscription receives every value.
pub async fn serve<T, F>(
    listener: TcpListener,
    broker: Arc<Broker<T>>,
    settings: StreamSettings,
    shutdown: F,
) -> Result<(), TransportError>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: Future<Output = ()>,
{
    serve_with_filter(listener, broker, settings, None, shutdown).await
}

/// Like [`serve`], with subscriptions filtered by `filter`.
pub async fn serve_with_filter<T, F>(
    listener: TcpListener,
    broker: Arc<Broker<T>>,
    settings: StreamSettings,
    filter: Option<FilterFactory<T>>,
    shutdown: F,
) -> Result<(), TransportError>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: Future<Output = ()>,
{
    info!("WebSocket server listening on ws://{}", listener.local_addr()?);

    let cancel = CancellationToken::new();
    let mut sessions = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,

            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("accept failed: {e}");
                        continue;
                    }
                };

                let session = Session::new(
                    Arc::clone(&broker),
                    settings.clone(),
                    filter.clone(),
                    peer,
                );
                let cancel = cancel.child_token();

                sessions.spawn(async move {
                    let handshake = tokio::select! {
                        _ = cancel.cancelled() => return,
                        handshake = accept_async(stream) => handshake,
                    };
                    let ws = match handshake {
                        Ok(ws) => ws,
                        Err(e) => {
                            warn!(%peer, "WebSocket handshake error: {e}");
                            return;
                        }
                    };
                    let id = session.id().to_string();
                    if let Err(e) = session.run(ws, cancel).await {
                        warn!(session = %id, "session failed: {e}");
                    }
                });
            }

            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined {
                    warn!("session task aborted: {e}");
                }
            }
        }
    }

    info!(sessions = sessions.len(), "shutting down WebSocket server");
    cancel.cancel();
    while let Some(joined) = sessions.join_next().await {
        if let Err(e) = joined {
            warn!("session task aborted: {e}");
        }
    }
    debug!("all sessions closed");

    Ok(())
}
