//! Topic management
//!
//! A `Topic` holds the set of subscriber IDs for one topic name, and the
//! `TopicRegistry` maps names to topics. Subscriptions are stored as a
//! `HashSet` so duplicate subscriptions are a no-op. Topics are created on
//! first subscribe and live for the rest of the process.
//!
//! The registry never owns connections. It resolves IDs against the client
//! table handed to `broadcast`, and forgets an ID only when told to.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::client::{Client, ClientId};

pub type SubscriberId = ClientId;

#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    pub subscribers: HashSet<SubscriberId>,
}

impl Topic {
    /// Create a new topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: HashSet::new(),
        }
    }

    /// Add a subscriber to the topic. Duplicate adds are ignored.
    pub fn subscribe(&mut self, id: SubscriberId) -> bool {
        self.subscribers.insert(id)
    }

    /// Remove a subscriber from the topic.
    pub fn unsubscribe(&mut self, id: &SubscriberId) -> bool {
        self.subscribers.remove(id)
    }
}

#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: HashMap<String, Topic>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `id` to `topic`, creating the topic if needed. Returns
    /// `false` when the subscription already existed.
    pub fn subscribe(&mut self, topic: &str, id: SubscriberId) -> bool {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .subscribe(id)
    }

    pub fn unsubscribe(&mut self, topic: &str, id: &SubscriberId) -> bool {
        self.topics
            .get_mut(topic)
            .is_some_and(|t| t.unsubscribe(id))
    }

    /// Drop `id` from every topic. Returns how many subscriptions it held.
    pub fn remove_connection(&mut self, id: &SubscriberId) -> usize {
        let mut removed = 0;
        for topic in self.topics.values_mut() {
            if topic.unsubscribe(id) {
                debug!("Unsubscribed {id} from topic {}", topic.name);
                removed += 1;
            }
        }
        removed
    }

    pub fn is_subscribed(&self, topic: &str, id: &SubscriberId) -> bool {
        self.topics
            .get(topic)
            .is_some_and(|t| t.subscribers.contains(id))
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |t| t.subscribers.len())
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Queue `frame` for every subscriber of `topic`. A subscriber whose send
    /// loop is gone is skipped; the close path evicts it later. Returns the
    /// number of clients the frame was queued for.
    pub fn broadcast(
        &self,
        topic: &str,
        frame: &WsMessage,
        clients: &HashMap<ClientId, Client>,
    ) -> usize {
        let Some(topic) = self.topics.get(topic) else {
            return 0;
        };

        let mut delivered = 0;
        for sub_id in &topic.subscribers {
            match clients.get(sub_id) {
                Some(client) => match client.deliver(frame.clone()) {
                    Ok(()) => delivered += 1,
                    Err(_) => debug!("Send loop for {sub_id} already closed"),
                },
                None => warn!("No client registered with id: {sub_id}"),
            }
        }
        delivered
    }
}
