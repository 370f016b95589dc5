//! Relay engine
//!
//! `Relay` owns all shared state: the client table, the topic registry, the
//! last-value cache and the leaderboard. Nothing else holds a reference to
//! any of it. `Relay::spawn` moves it into a task that applies `Command`s one
//! at a time, and callers talk to that task through a cloneable
//! `RelayHandle`.
//!
//! Because every command runs to completion before the next starts, "record
//! then broadcast" and "register then replay" are each atomic with respect
//! to one another. A client subscribing while an event is in flight sees it
//! exactly once: either in the replay or in the live broadcast.
//!
//! Nothing in a command waits on a socket. Frames are queued on each
//! client's unbounded channel and written by that client's send loop.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broker::cache::StateCache;
use crate::broker::leaderboard::{Cohort, Leaderboard};
use crate::broker::message::{Event, LEADERBOARD_TOPIC, Payload, SUMMARY_PREFIX};
use crate::broker::topic::TopicRegistry;
use crate::client::{Client, ClientId};
use crate::ingest::UpstreamLink;
use crate::utils::RelayError;

#[derive(Debug)]
pub enum Command {
    Connect(Client),
    Subscribe { client_id: ClientId, topic: String },
    Unsubscribe { client_id: ClientId, topic: String },
    Disconnect { client_id: ClientId },
    Publish(Event),
    Stats(oneshot::Sender<RelayStats>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub connections: usize,
    pub topics: usize,
    pub cached_topics: usize,
    pub leaderboard_entries: usize,
    /// Upstream events rendered and broadcast; derived leaderboard events are not counted.
    pub events_published: u64,
}

#[derive(Debug, Default)]
pub struct Relay {
    pub(crate) clients: HashMap<ClientId, Client>,
    pub(crate) registry: TopicRegistry,
    pub(crate) cache: StateCache,
    pub(crate) leaderboard: Leaderboard,
    upstream: Option<UpstreamLink>,
    events_published: u64,
}

impl Relay {
    pub fn new(cohort: Cohort) -> Self {
        Self {
            leaderboard: Leaderboard::new(cohort),
            ..Self::default()
        }
    }

    /// Tell the upstream backend about every new subscription.
    pub fn with_upstream(mut self, upstream: UpstreamLink) -> Self {
        self.upstream = Some(upstream);
        self
    }

    pub fn register_client(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    /// Subscribe a registered client and replay cached state to it alone.
    pub fn subscribe(&mut self, topic: &str, client_id: &ClientId) {
        let Some(client) = self.clients.get(client_id) else {
            warn!("Subscribe from unknown client {client_id} to {topic}");
            return;
        };

        if self.registry.subscribe(topic, client_id.clone()) {
            let replayed = self.cache.on_subscribe(topic, client);
            debug!("{client_id} subscribed to {topic} ({replayed} cached frames)");
        }

        if let Some(upstream) = &self.upstream {
            upstream.notify(topic);
        }
    }

    pub fn unsubscribe(&mut self, topic: &str, client_id: &ClientId) {
        if self.registry.unsubscribe(topic, client_id) {
            debug!("{client_id} unsubscribed from {topic}");
        }
    }

    /// Forget a closed client and every subscription it held.
    pub fn cleanup_client(&mut self, client_id: &ClientId) {
        self.clients.remove(client_id);
        let dropped = self.registry.remove_connection(client_id);
        info!("Cleaned up client {client_id} ({dropped} subscriptions)");
    }

    /// Apply one upstream event: leaderboard first when it is a summary,
    /// then cache, then broadcast.
    pub fn publish(&mut self, event: Event) {
        if let Payload::Summary(summary) = &event.payload {
            if let Some(username) = event.topic.strip_prefix(SUMMARY_PREFIX) {
                match self.leaderboard.update(username, summary.clone()) {
                    Some(ranking) => {
                        let board = Event {
                            topic: LEADERBOARD_TOPIC.to_string(),
                            payload: Payload::Leaderboard(ranking),
                            timestamp: event.timestamp,
                        };
                        self.record_and_broadcast(board);
                    }
                    None => debug!("{username} is outside the leaderboard cohort"),
                }
            }
        }

        if self.record_and_broadcast(event) {
            self.events_published += 1;
        }
    }

    /// Returns `false` when the event could not be rendered and was dropped.
    fn record_and_broadcast(&mut self, event: Event) -> bool {
        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to render event for {}: {e}", event.topic);
                return false;
            }
        };
        let topic = event.topic.clone();
        self.cache.record(event);
        let delivered = self.registry.broadcast(&topic, &frame, &self.clients);
        debug!("Broadcast {topic} to {delivered} subscribers");
        true
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            connections: self.clients.len(),
            topics: self.registry.topic_count(),
            cached_topics: self.cache.len(),
            leaderboard_entries: self.leaderboard.len(),
            events_published: self.events_published,
        }
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::Connect(client) => self.register_client(client),
            Command::Subscribe { client_id, topic } => self.subscribe(&topic, &client_id),
            Command::Unsubscribe { client_id, topic } => self.unsubscribe(&topic, &client_id),
            Command::Disconnect { client_id } => self.cleanup_client(&client_id),
            Command::Publish(event) => self.publish(event),
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
        }
    }

    /// Apply commands until every handle is dropped.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        while let Some(command) = commands.recv().await {
            self.apply(command);
        }
        info!("Relay task stopped");
    }

    pub fn spawn(self, buffer: usize) -> (RelayHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let task = tokio::spawn(self.run(rx));
        (RelayHandle { tx }, task)
    }
}

/// Cloneable entry point into a running relay.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<Command>,
}

impl RelayHandle {
    async fn send(&self, command: Command) -> Result<(), RelayError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| RelayError::RelayClosed)
    }

    pub async fn connect(&self, client: Client) -> Result<(), RelayError> {
        self.send(Command::Connect(client)).await
    }

    pub async fn subscribe(&self, client_id: &ClientId, topic: String) -> Result<(), RelayError> {
        self.send(Command::Subscribe {
            client_id: client_id.clone(),
            topic,
        })
        .await
    }

    pub async fn unsubscribe(&self, client_id: &ClientId, topic: String) -> Result<(), RelayError> {
        self.send(Command::Unsubscribe {
            client_id: client_id.clone(),
            topic,
        })
        .await
    }

    pub async fn disconnect(&self, client_id: &ClientId) -> Result<(), RelayError> {
        self.send(Command::Disconnect {
            client_id: client_id.clone(),
        })
        .await
    }

    pub async fn publish(&self, event: Event) -> Result<(), RelayError> {
        self.send(Command::Publish(event)).await
    }

    pub async fn stats(&self) -> Result<RelayStats, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stats(reply)).await?;
        rx.await.map_err(|_| RelayError::RelayClosed)
    }
}
