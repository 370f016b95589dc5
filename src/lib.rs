//! # pushrelay
//!
//! `pushrelay` is a one-way real-time relay for a paper-trading platform.
//! A trading backend pushes categorized events over a TCP ingest socket;
//! browsers connect over WebSockets, subscribe to topics, and receive every
//! event published on them. Late subscribers get the last known state of a
//! topic replayed on subscribe, and the relay derives a ranked leaderboard
//! from per-user portfolio summaries.
//!
//! ## Core Modules
//!
//! - `broker`: topics, the last-value cache, the leaderboard and the relay task that owns them.
//! - `client`: a connected WebSocket client as seen by the relay.
//! - `config`: loading settings from file and environment.
//! - `ingest`: decoding and routing the upstream event stream.
//! - `persistence`: snapshot storage for bootstrap data read by the page layer.
//! - `transport`: the WebSocket server and its frame protocol.
//! - `utils`: error type and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod ingest;
pub mod persistence;
pub mod transport;
pub mod utils;
