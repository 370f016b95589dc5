//! CLI for pushrelay
//!
//! Subcommands:
//! - `server`: run the relay (ingest socket plus WebSocket server)
//! - `watch`: subscribe to topics and print every frame (useful for smoke tests)

use std::time::Duration;

use clap::Parser;
use pushrelay::broker::Relay;
use pushrelay::broker::leaderboard::Cohort;
use pushrelay::config::load_config;
use pushrelay::ingest::{IngestAdapter, UpstreamLink, start_ingest_server};
use pushrelay::persistence::open_store;
use pushrelay::transport::start_websocket_server;
use pushrelay::utils::{RelayError, logging};
use tracing::{debug, error, info};

const STATS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "pushrelay")]
enum Command {
    /// Start the relay
    Server,
    /// Subscribe to topics and print incoming frames
    Watch {
        /// WebSocket server URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        url: String,
        /// Topics to subscribe to
        #[arg(long = "topic", required = true)]
        topic: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cmd = Command::parse();

    match cmd {
        Command::Server => {
            if let Err(e) = run_server().await {
                error!("Server failed: {e}");
            }
        }
        Command::Watch { url, topic } => {
            logging::init("info");
            if let Err(e) = run_watch(&url, &topic).await {
                error!("Watch failed: {e}");
            }
        }
    }
}

async fn run_server() -> Result<(), RelayError> {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            return Err(e.into());
        }
    };
    logging::init(&config.logging.level);

    let store = open_store(&config.snapshots)?;
    let adapter = IngestAdapter::new(store);
    let upstream = UpstreamLink::default();

    let (relay, relay_task) = Relay::new(Cohort::from_members(config.leaderboard.cohort.clone()))
        .with_upstream(upstream.clone())
        .spawn(config.relay.command_buffer);

    let stats_relay = relay.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATS_INTERVAL);
        loop {
            ticker.tick().await;
            match stats_relay.stats().await {
                Ok(stats) => debug!("Relay stats: {stats:?}"),
                Err(_) => break,
            }
        }
    });

    let ingest = start_ingest_server(
        config.ingest_addr(),
        relay.clone(),
        &adapter,
        &upstream,
        config.ingest.max_frame_bytes,
    );
    let websocket = start_websocket_server(config.server_addr(), relay, config.server.clone());

    tokio::select! {
        result = websocket => match result {
            Ok(()) => error!("WebSocket server exited unexpectedly."),
            Err(e) => return Err(e),
        },
        result = ingest => match result {
            Ok(()) => error!("Ingest server exited unexpectedly."),
            Err(e) => return Err(e),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    relay_task.abort();
    Ok(())
}

async fn run_watch(url: &str, topics: &[String]) -> Result<(), RelayError> {
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    let (mut ws_stream, _response) = connect_async(url).await?;
    info!("Connected to {url}");

    for topic in topics {
        let subscribe = json!({ "type": "subscribe", "topic": topic });
        ws_stream
            .send(WsMessage::Text(subscribe.to_string().into()))
            .await?;
    }

    while let Some(frame) = ws_stream.next().await {
        match frame? {
            WsMessage::Text(text) => println!("{text}"),
            WsMessage::Close(reason) => {
                info!("Server closed the connection: {reason:?}");
                break;
            }
            _ => {}
        }
    }
    Ok(())
}
