//! Event definitions for the relay
//!
//! Every upstream message carries a `category` (which doubles as the topic
//! name) and a schema-free `data` body. The relay only looks inside the body
//! for a handful of well-known categories; everything else travels as an
//! opaque JSON value so new upstream categories pass through untouched.
//!
//! Numeric fields produced upstream are frequently quoted (`"earnings": "0.1"`),
//! so the typed shapes accept either a JSON number or a numeric string.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tungstenite::protocol::Message as WsMessage;

use crate::transport::message::ServerMessage;
use crate::utils::RelayError;

/// Fixed topic carrying the ranked leaderboard snapshot.
pub const LEADERBOARD_TOPIC: &str = "leaderboard";

/// Any category containing this marker is internal to the backend.
pub const INTERNAL_MARKER: &str = "_web";

pub const SUMMARY_PREFIX: &str = "portfolioSummary_";
pub const POSITIONS_PREFIX: &str = "portfolio_";
pub const CANDLE_PREFIX: &str = "candleData_";

/// One-shot categories persisted for the page layer instead of broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    LoginCredentials,
    StockList,
    CompanyNames,
}

impl SnapshotKind {
    pub const ALL: [SnapshotKind; 3] = [
        SnapshotKind::LoginCredentials,
        SnapshotKind::StockList,
        SnapshotKind::CompanyNames,
    ];

    pub fn category(self) -> &'static str {
        match self {
            SnapshotKind::LoginCredentials => "loginCredentials",
            SnapshotKind::StockList => "stockList",
            SnapshotKind::CompanyNames => "companyNames",
        }
    }

    /// Name under which the snapshot is stored for later retrieval.
    pub fn snapshot_name(self) -> &'static str {
        match self {
            SnapshotKind::LoginCredentials => "loginCredentials.php",
            SnapshotKind::StockList => "stockList.json",
            SnapshotKind::CompanyNames => "symbol_companyName_map.json",
        }
    }
}

/// Routing class of a category string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    /// Backend diagnostic channel; never leaves the relay.
    Internal,
    /// Topics only the relay itself may produce.
    Reserved,
    Bootstrap(SnapshotKind),
    PortfolioSummary { username: String },
    Positions { username: String },
    Candles { symbol: String },
    Other,
}

impl Category {
    pub fn classify(name: &str) -> Self {
        if name.contains(INTERNAL_MARKER) {
            return Category::Internal;
        }
        if name == LEADERBOARD_TOPIC {
            return Category::Reserved;
        }
        if let Some(kind) = SnapshotKind::ALL.into_iter().find(|k| k.category() == name) {
            return Category::Bootstrap(kind);
        }
        if let Some(username) = name.strip_prefix(SUMMARY_PREFIX) {
            return Category::PortfolioSummary {
                username: username.to_string(),
            };
        }
        if let Some(username) = name.strip_prefix(POSITIONS_PREFIX) {
            return Category::Positions {
                username: username.to_string(),
            };
        }
        if let Some(symbol) = name.strip_prefix(CANDLE_PREFIX) {
            return Category::Candles {
                symbol: symbol.to_string(),
            };
        }
        Category::Other
    }
}

/// Raw upstream message before classification.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    pub category: String,
    #[serde(default)]
    pub data: Value,
}

/// A classified event ready for the relay.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub topic: String,
    pub payload: Payload,
    /// Milliseconds since the UNIX epoch, stamped when the relay accepted it.
    pub timestamp: i64,
}

impl Event {
    pub fn new(topic: impl Into<String>, payload: Payload) -> Self {
        Self {
            topic: topic.into(),
            payload,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Render the `event` frame pushed to subscribers.
    pub fn to_frame(&self) -> Result<WsMessage, RelayError> {
        let msg = ServerMessage::Event {
            topic: self.topic.clone(),
            payload: serde_json::to_value(&self.payload)?,
            timestamp: self.timestamp,
        };
        Ok(WsMessage::text(serde_json::to_string(&msg)?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Summary(PortfolioSummary),
    Positions(PositionList),
    Candle(Candle),
    Leaderboard(Vec<LeaderboardEntry>),
    Opaque(Value),
}

impl Payload {
    /// Decode `data` into the shape its category calls for.
    pub fn decode(category: &Category, data: Value) -> Result<Self, serde_json::Error> {
        match category {
            Category::PortfolioSummary { .. } => serde_json::from_value(data).map(Payload::Summary),
            Category::Positions { .. } => serde_json::from_value(data).map(Payload::Positions),
            Category::Candles { .. } => serde_json::from_value(data).map(Payload::Candle),
            _ => Ok(Payload::Opaque(data)),
        }
    }
}

/// Per-user account summary; the input to the leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    #[serde(
        rename = "totalBP",
        alias = "total_bp",
        alias = "totalBuyingPower",
        default,
        deserialize_with = "lenient_f64"
    )]
    pub total_bp: f64,
    #[serde(
        rename = "totalShares",
        alias = "total_shares",
        default,
        deserialize_with = "lenient_f64"
    )]
    pub total_shares: f64,
    #[serde(
        rename = "totalPL",
        alias = "total_pl",
        default,
        deserialize_with = "lenient_f64"
    )]
    pub total_pl: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub earnings: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub username: String,
    #[serde(flatten)]
    pub summary: PortfolioSummary,
}

/// One OHLC point of a symbol's time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    #[serde(default)]
    pub symbol: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub open: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub high: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub low: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub close: f64,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub time: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRow {
    #[serde(default)]
    pub symbol: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Position list as sent upstream: either a bare array of rows or an object
/// holding the rows under `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PositionList {
    Rows(Vec<PositionRow>),
    Wrapped {
        data: Vec<PositionRow>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
}

impl PositionList {
    pub fn rows(&self) -> &[PositionRow] {
        match self {
            PositionList::Rows(rows) => rows,
            PositionList::Wrapped { data, .. } => data,
        }
    }

    /// Drop placeholder rows that carry no symbol.
    pub fn retain_held(&mut self) {
        let rows = match self {
            PositionList::Rows(rows) => rows,
            PositionList::Wrapped { data, .. } => data,
        };
        rows.retain(|row| !row.symbol.is_empty());
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    let n = match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) => n,
        NumberOrText::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("expected a number, got '{s}'")))?,
    };
    // rankings assume finite values
    if n.is_finite() {
        Ok(n)
    } else {
        Err(de::Error::custom(format!("expected a finite number, got {n}")))
    }
}
