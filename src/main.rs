//! CLI for fanout
//!
//! Subcommands:
//! - `serve`: run the WebSocket server over a JSON-valued broker
//! - `publish`: publish one JSON value to a running server
//! - `subscribe`: print every value published on a running server

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fanout::broker::{Broker, Filter};
use fanout::client::{RemoteBroker, SubscribeOptions};
use fanout::config::{Settings, load_config};
use fanout::transport::{FilterFactory, SubscribeRequest, start_websocket_server};
use fanout::utils::logging;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "fanout")]
enum Command {
    /// Start the WebSocket server
    Serve,
    /// Publish a JSON value and print the delivery stats
    Publish {
        /// WebSocket server URL (default: ws://127.0.0.1:8080)
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        url: String,
        /// JSON payload, e.g. '{"temp":25}'
        payload: String,
    },
    /// Subscribe and print every value until interrupted
    Subscribe {
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        url: String,
        /// Server-side buffer size
        #[arg(long)]
        buffer: Option<usize>,
        /// Heartbeat interval in milliseconds
        #[arg(long)]
        heartbeat_ms: Option<u64>,
        /// Only receive values containing this JSON pointer, e.g. /temp
        #[arg(long)]
        filter: Option<String>,
        /// Reconnect interval in milliseconds
        #[arg(long, default_value_t = 1000)]
        retry_ms: u64,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cmd = Command::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            std::process::exit(2);
        }
    };
    logging::init(&settings.log.level);

    let result = match cmd {
        Command::Serve => run_server(settings).await,
        Command::Publish { url, payload } => run_publish(&url, &payload).await,
        Command::Subscribe {
            url,
            buffer,
            heartbeat_ms,
            filter,
            retry_ms,
        } => {
            let options = SubscribeOptions {
                buffer,
                heartbeat: heartbeat_ms.map(Duration::from_millis),
                filter,
                retry: Duration::from_millis(retry_ms),
            };
            run_subscribe(&url, options).await
        }
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let broker: Arc<Broker<Value>> = Arc::new(Broker::new());

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for shutdown signal: {e}");
        }
        info!("Shutdown signal received. Exiting gracefully.");
    };

    start_websocket_server(
        &settings.server.addr(),
        broker,
        settings.stream,
        Some(pointer_filter()),
        shutdown,
    )
    .await?;
    Ok(())
}

/// Subscribers passing a filter receive only values where that JSON pointer
/// resolves. A bare key is treated as a top-level pointer.
fn pointer_filter() -> FilterFactory<Value> {
    Arc::new(|request: &SubscribeRequest| {
        let pointer = request.filter.as_deref().filter(|p| !p.is_empty())?;
        let pointer = if pointer.starts_with('/') {
            pointer.to_string()
        } else {
            format!("/{pointer}")
        };
        let filter: Filter<Value> = Box::new(move |value: &Value| value.pointer(&pointer).is_some());
        Some(filter)
    })
}

async fn run_publish(url: &str, payload: &str) -> Result<(), Box<dyn std::error::Error>> {
    let value: Value = serde_json::from_str(payload)?;
    let remote = RemoteBroker::<Value>::new(url)?;
    let stats = remote.publish(&value).await?;
    println!("{}", serde_json::to_string(&stats)?);
    Ok(())
}

async fn run_subscribe(
    url: &str,
    options: SubscribeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let remote = RemoteBroker::<Value>::new(url)?;
    let (tx, mut rx) = mpsc::channel(options.buffer.unwrap_or(100).max(1));
    let cancel = CancellationToken::new();

    let printer = tokio::spawn(async move {
        while let Some(value) = rx.recv().await {
            println!("{value}");
        }
    });

    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            cancel.cancel();
        })
    };

    let result = remote.subscribe(tx, options, cancel).await;
    interrupt.abort();
    let _ = printer.await;
    result?;
    Ok(())
}
