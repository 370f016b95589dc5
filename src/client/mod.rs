//! The `client` module defines the representation of a connected client.
//!
//! A `Client` pairs a unique identifier with the channel used to push frames
//! to that client's socket. It is the only handle the relay needs to reach a
//! connection; the socket itself stays with the transport.

pub mod pubsub_client;
pub use pubsub_client::{Client, ClientId};
