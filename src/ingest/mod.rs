//! The `ingest` module receives the trading backend's event stream.
//!
//! `adapter` decodes and classifies individual messages; `listener` owns the
//! upstream socket, feeds decoded events to the relay in order, and carries
//! subscription notices back to the backend.

pub mod adapter;
pub mod listener;

pub use adapter::{IngestAdapter, IngestCounts, Routed, route};
pub use listener::{UpstreamLink, serve_upstream, start_ingest_server};

#[cfg(test)]
mod tests;
