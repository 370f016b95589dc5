//! Client/server frame definitions
//!
//! Frames are JSON text tagged by `type`. Clients may only `subscribe` and
//! `unsubscribe`; the relay is push-only, so every other frame a client
//! sends is answered with an `error` frame and the connection is closed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tungstenite::protocol::Message as WsMessage;

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "subscribe")]
    Subscribe { topic: String },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { topic: String },
    #[serde(rename = "call")]
    Call {
        #[serde(default)]
        call_id: Option<String>,
        #[serde(default)]
        procedure: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    #[serde(rename = "publish")]
    Publish {
        topic: String,
        #[serde(default)]
        payload: Value,
    },
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "event")]
    Event {
        topic: String,
        payload: Value,
        timestamp: i64,
    },
    #[serde(rename = "error")]
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>, call_id: Option<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            call_id,
        }
    }

    pub fn to_frame(&self) -> WsMessage {
        // both variants hold only strings, numbers and JSON values
        let text = serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","message":"internal error"}"#.to_string()
        });
        WsMessage::text(text)
    }
}

pub const CALLS_NOT_ALLOWED: &str = "You are not allowed to make calls";
pub const PUBLISH_NOT_ALLOWED: &str = "You are not allowed to publish";
pub const UNRECOGNIZED_FRAME: &str = "Unrecognized frame";

/// What the transport should do with one inbound frame.
#[derive(Debug, PartialEq)]
pub enum ClientAction {
    Subscribe(String),
    Unsubscribe(String),
    /// Send the error frame, then close the connection.
    Reject(ServerMessage),
}

/// Interpret an inbound WebSocket frame. Control frames (ping, pong, close)
/// yield `None`; tungstenite answers pings itself.
pub fn interpret(frame: &WsMessage) -> Option<ClientAction> {
    match frame {
        WsMessage::Text(text) => Some(interpret_text(text.as_str())),
        WsMessage::Binary(_) => Some(ClientAction::Reject(ServerMessage::error(
            UNRECOGNIZED_FRAME,
            None,
        ))),
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) | WsMessage::Frame(_) => {
            None
        }
    }
}

pub fn interpret_text(text: &str) -> ClientAction {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Subscribe { topic }) => ClientAction::Subscribe(topic),
        Ok(ClientMessage::Unsubscribe { topic }) => ClientAction::Unsubscribe(topic),
        Ok(ClientMessage::Call { call_id, .. }) => {
            ClientAction::Reject(ServerMessage::error(CALLS_NOT_ALLOWED, call_id))
        }
        Ok(ClientMessage::Publish { .. }) => {
            ClientAction::Reject(ServerMessage::error(PUBLISH_NOT_ALLOWED, None))
        }
        Err(_) => ClientAction::Reject(ServerMessage::error(UNRECOGNIZED_FRAME, None)),
    }
}
