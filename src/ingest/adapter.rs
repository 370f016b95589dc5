//! Ingest adapter
//!
//! Turns one raw upstream message into a routing decision:
//! - categories carrying the internal marker are dropped,
//! - `leaderboard` is reserved for the relay and dropped,
//! - bootstrap categories become snapshots for the `SnapshotStore`,
//! - position lists lose their empty-symbol placeholder rows,
//! - everything else is published as-is.
//!
//! A message that fails to decode is dropped and counted; it never stops
//! the stream.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::broker::message::{Category, Event, Payload, RawMessage, SnapshotKind};
use crate::persistence::SnapshotStore;
use crate::utils::RelayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    Internal,
    Reserved,
}

#[derive(Debug, PartialEq)]
pub enum Routed {
    Publish(Event),
    Snapshot { kind: SnapshotKind, bytes: Vec<u8> },
    Filtered { category: String, reason: FilterReason },
}

/// Decode and classify one raw message.
pub fn route(raw: &[u8]) -> Result<Routed, RelayError> {
    let RawMessage { category, data } = serde_json::from_slice(raw)?;

    let class = Category::classify(&category);
    match class {
        Category::Internal => Ok(Routed::Filtered {
            category,
            reason: FilterReason::Internal,
        }),
        Category::Reserved => Ok(Routed::Filtered {
            category,
            reason: FilterReason::Reserved,
        }),
        Category::Bootstrap(kind) => Ok(Routed::Snapshot {
            kind,
            bytes: snapshot_bytes(kind, data)?,
        }),
        _ => {
            let mut payload = Payload::decode(&class, data)?;
            if let Payload::Positions(positions) = &mut payload {
                positions.retain_held();
            }
            Ok(Routed::Publish(Event::new(category, payload)))
        }
    }
}

fn snapshot_bytes(kind: SnapshotKind, data: Value) -> Result<Vec<u8>, RelayError> {
    match kind {
        SnapshotKind::LoginCredentials => {
            // the credentials file body arrives either bare or under `data`
            let body = match &data {
                Value::String(body) => Some(body.as_str()),
                Value::Object(map) => map.get("data").and_then(Value::as_str),
                _ => None,
            };
            body.map(|b| b.as_bytes().to_vec())
                .ok_or_else(|| RelayError::Payload {
                    category: kind.category().to_string(),
                    reason: "expected a string body".to_string(),
                })
        }
        SnapshotKind::StockList => {
            let symbols: Vec<String> = serde_json::from_value(data)?;
            Ok(serde_json::to_vec(&symbols)?)
        }
        SnapshotKind::CompanyNames => {
            let names: CompanyNames = serde_json::from_value(data)?;
            Ok(serde_json::to_vec(&names.into_sanitized())?)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CompanyNames {
    List(Vec<BTreeMap<String, String>>),
    Map(BTreeMap<String, String>),
}

impl CompanyNames {
    fn into_sanitized(self) -> BTreeMap<String, String> {
        let pairs: Vec<(String, String)> = match self {
            CompanyNames::List(list) => list.into_iter().flatten().collect(),
            CompanyNames::Map(map) => map.into_iter().collect(),
        };
        pairs
            .into_iter()
            .map(|(symbol, name)| (symbol, sanitize_company_name(&name)))
            .collect()
    }
}

static PARENTHETICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" \(.*?\)").expect("static pattern"));

/// Make a company name safe to embed in the page layer's quoted strings:
/// `'` becomes `?`, `"` becomes `=`, and ` (...)` decorations go away.
pub fn sanitize_company_name(name: &str) -> String {
    let quoted = name.replace('\'', "?").replace('"', "=");
    PARENTHETICAL.replace_all(&quoted, "").into_owned()
}

/// Running totals for the ingest stream.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub published: AtomicU64,
    pub filtered: AtomicU64,
    pub malformed: AtomicU64,
    pub persisted: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestCounts {
    pub published: u64,
    pub filtered: u64,
    pub malformed: u64,
    pub persisted: u64,
}

impl IngestStats {
    pub fn counts(&self) -> IngestCounts {
        IngestCounts {
            published: self.published.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
        }
    }
}

/// `route` plus the side effects: snapshots go to the store, drops are
/// logged and counted.
pub struct IngestAdapter {
    store: Arc<dyn SnapshotStore>,
    stats: IngestStats,
}

impl IngestAdapter {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            store,
            stats: IngestStats::default(),
        }
    }

    /// Returns the event to hand to the relay, if any.
    pub fn handle(&self, raw: &[u8]) -> Option<Event> {
        match route(raw) {
            Ok(Routed::Publish(event)) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                Some(event)
            }
            Ok(Routed::Snapshot { kind, bytes }) => {
                match self.store.persist_snapshot(kind.snapshot_name(), &bytes) {
                    Ok(()) => {
                        self.stats.persisted.fetch_add(1, Ordering::Relaxed);
                        debug!("Persisted {} ({} bytes)", kind.snapshot_name(), bytes.len());
                    }
                    Err(e) => warn!("Failed to persist {}: {e}", kind.snapshot_name()),
                }
                None
            }
            Ok(Routed::Filtered { category, reason }) => {
                self.stats.filtered.fetch_add(1, Ordering::Relaxed);
                debug!("Dropped {category} ({reason:?})");
                None
            }
            Err(e) => {
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Malformed ingest message: {e} | {}",
                    String::from_utf8_lossy(raw).chars().take(100).collect::<String>()
                );
                None
            }
        }
    }

    /// Count a message the framing layer rejected before it reached `handle`.
    pub fn record_malformed(&self) {
        self.stats.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counts(&self) -> IngestCounts {
        self.stats.counts()
    }
}

impl std::fmt::Debug for IngestAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestAdapter")
            .field("stats", &self.stats)
            .finish()
    }
}
