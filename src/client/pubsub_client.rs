use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::mpsc::error::SendError;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

/// Identifies one live connection across relay operations.
pub type ClientId = String;

/// Represents a connected WebSocket client.
///
/// The relay owns every `Client` for the lifetime of its connection; topic
/// subscriber sets refer to clients only by `id`. Frames pushed through
/// `sender` are written to the socket by the transport's send loop.
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique identifier for the client (`client-<uuid>`).
    pub id: ClientId,

    /// Channel to send WebSocket frames to the client.
    sender: UnboundedSender<WsMessage>,
}

impl Client {
    pub fn new(sender: UnboundedSender<WsMessage>) -> Self {
        Self {
            id: format!("client-{}", Uuid::new_v4()),
            sender,
        }
    }

    /// Queue a frame for this client without waiting on the socket.
    ///
    /// Fails only once the send loop has gone away.
    pub fn deliver(&self, frame: WsMessage) -> Result<(), SendError<WsMessage>> {
        self.sender.send(frame)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
