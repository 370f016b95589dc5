//! Last-known-value cache
//!
//! Topics that describe current state keep only their latest event; topics
//! that describe a time series keep every event in arrival order. The mode
//! is a property of the topic name, not of any individual entry.
//!
//! Series never shrink. A trading session is finite and the relay restarts
//! between sessions, so there is no eviction.

use std::collections::HashMap;

use tracing::warn;

use crate::broker::message::{CANDLE_PREFIX, Event};
use crate::client::Client;

/// Topic prefixes whose events accumulate instead of overwrite.
pub const APPEND_PREFIXES: &[&str] = &[CANDLE_PREFIX];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Latest,
    Append,
}

impl CacheMode {
    pub fn for_topic(topic: &str) -> Self {
        if APPEND_PREFIXES.iter().any(|prefix| topic.starts_with(prefix)) {
            CacheMode::Append
        } else {
            CacheMode::Latest
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    Latest(Event),
    Series(Vec<Event>),
}

impl CacheEntry {
    pub fn events(&self) -> &[Event] {
        match self {
            CacheEntry::Latest(event) => std::slice::from_ref(event),
            CacheEntry::Series(events) => events,
        }
    }
}

#[derive(Debug, Default)]
pub struct StateCache {
    entries: HashMap<String, CacheEntry>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: Event) {
        match CacheMode::for_topic(&event.topic) {
            CacheMode::Latest => {
                self.entries
                    .insert(event.topic.clone(), CacheEntry::Latest(event));
            }
            CacheMode::Append => match self.entries.get_mut(&event.topic) {
                Some(CacheEntry::Series(events)) => events.push(event),
                _ => {
                    self.entries
                        .insert(event.topic.clone(), CacheEntry::Series(vec![event]));
                }
            },
        }
    }

    /// Cached events for `topic`, oldest first. Empty when nothing is cached.
    pub fn replay(&self, topic: &str) -> &[Event] {
        self.entries.get(topic).map(CacheEntry::events).unwrap_or(&[])
    }

    /// Push the cached state of `topic` to `client` alone. Returns the number
    /// of frames queued.
    pub fn on_subscribe(&self, topic: &str, client: &Client) -> usize {
        let mut sent = 0;
        for event in self.replay(topic) {
            let frame = match event.to_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Failed to render cached event for {topic}: {e}");
                    continue;
                }
            };
            if client.deliver(frame).is_err() {
                break;
            }
            sent += 1;
        }
        sent
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
