//! The `broker` module is the heart of the relay.
//!
//! `message` classifies upstream categories and decodes their payloads,
//! `topic` tracks who is subscribed to what, `cache` remembers the last
//! known state of every topic, `leaderboard` ranks users by their portfolio
//! summaries, and `engine` ties them together behind a single task.

pub mod cache;
pub mod engine;
pub mod leaderboard;
pub mod message;
pub mod topic;

pub use engine::{Command, Relay, RelayHandle, RelayStats};
