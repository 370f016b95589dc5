//! The `transport` module is responsible for network communication with
//! browsers over WebSockets.
//!
//! It defines the frame protocol spoken with clients and implements the
//! WebSocket server itself: accepting connections under a connection limit,
//! turning inbound frames into relay commands, and writing queued frames
//! back out.

pub mod message;
pub mod websocket;

pub use websocket::{serve, start_websocket_server};
