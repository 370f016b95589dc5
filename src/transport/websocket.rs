use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, mpsc};
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::RelayHandle;
use crate::client::Client;
use crate::config::ServerSettings;
use crate::transport::message::{ClientAction, interpret};
use crate::utils::RelayError;

pub async fn start_websocket_server(
    addr: String,
    relay: RelayHandle,
    settings: ServerSettings,
) -> Result<(), RelayError> {
    let listener = TcpListener::bind(&addr).await?;
    info!("WebSocket server listening on ws://{addr}");
    serve(listener, relay, settings.max_connections).await
}

/// Accept connections on `listener` forever. Once `max_connections` are
/// live, further connections are dropped before the handshake.
pub async fn serve(
    listener: TcpListener,
    relay: RelayHandle,
    max_connections: usize,
) -> Result<(), RelayError> {
    let permits = Arc::new(Semaphore::new(max_connections.max(1)));

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("WebSocket accept failed: {e}");
                continue;
            }
        };

        let Ok(permit) = permits.clone().try_acquire_owned() else {
            warn!("Connection limit of {max_connections} reached; refusing {peer}");
            drop(stream);
            continue;
        };

        let relay = relay.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, relay).await {
                warn!("Connection from {peer} ended with error: {e}");
            }
            drop(permit);
        });
    }
}

async fn handle_connection(stream: TcpStream, relay: RelayHandle) -> Result<(), RelayError> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

    // Register client before doing anything else
    let client = Client::new(tx.clone());
    let client_id = client.id.clone();
    relay.connect(client).await?;
    info!("{client_id} connected");

    // Forward queued frames relay -> socket. Stops after a close frame.
    let send_id = client_id.clone();
    let send_loop = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = msg.is_close();
            if let Err(e) = ws_sender.send(msg).await {
                debug!("Failed to send frame to {send_id}: {e}");
                break;
            }
            if closing {
                break;
            }
        }
        debug!("Send loop closed for {send_id}");
    });

    while let Some(frame) = ws_receiver.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Read error from {client_id}: {e}");
                break;
            }
        };

        match interpret(&frame) {
            Some(ClientAction::Subscribe(topic)) => relay.subscribe(&client_id, topic).await?,
            Some(ClientAction::Unsubscribe(topic)) => {
                relay.unsubscribe(&client_id, topic).await?
            }
            Some(ClientAction::Reject(error)) => {
                warn!("Rejected frame from {client_id}: {error:?}");
                // the relay may already have dropped its sender; ignore that
                let _ = tx.send(error.to_frame());
                let _ = tx.send(WsMessage::Close(None));
                break;
            }
            None if frame.is_close() => break,
            None => {}
        }
    }

    relay.disconnect(&client_id).await?;
    drop(tx);
    if let Err(e) = send_loop.await {
        warn!("Send loop for {client_id} panicked: {e}");
    }
    info!("{client_id} disconnected");
    Ok(())
}
