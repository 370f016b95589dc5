use serde::Deserialize;

/// Top-level configuration settings for the relay.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub ingest: IngestSettings,
    pub relay: RelaySettings,
    pub snapshots: SnapshotSettings,
    pub leaderboard: LeaderboardSettings,
    pub logging: LoggingSettings,
}

/// WebSocket side: where browsers connect and how many may do so at once.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
}

/// Upstream side: the socket the trading backend pushes events into.
#[derive(Debug, Deserialize, Clone)]
pub struct IngestSettings {
    pub host: String,
    pub port: u16,
    /// Longest accepted ingest line; longer lines are discarded as malformed.
    pub max_frame_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelaySettings {
    /// Capacity of the command queue feeding the relay task.
    pub command_buffer: usize,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotBackend {
    File,
    Sled,
}

/// Where bootstrap snapshots (credentials, stock list, company names) land.
#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotSettings {
    pub backend: SnapshotBackend,
    pub path: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LeaderboardSettings {
    /// Usernames admitted to the leaderboard. Empty admits everyone.
    pub cohort: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values are filled from
/// `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub ingest: Option<PartialIngestSettings>,
    pub relay: Option<PartialRelaySettings>,
    pub snapshots: Option<PartialSnapshotSettings>,
    pub leaderboard: Option<PartialLeaderboardSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub max_connections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialIngestSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub max_frame_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialRelaySettings {
    pub command_buffer: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialSnapshotSettings {
    pub backend: Option<SnapshotBackend>,
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLeaderboardSettings {
    pub cohort: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl PartialSettings {
    /// Overlay whatever was specified on top of `base`.
    pub fn merge_over(self, base: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let ingest = self.ingest.unwrap_or_default();
        let relay = self.relay.unwrap_or_default();
        let snapshots = self.snapshots.unwrap_or_default();
        let leaderboard = self.leaderboard.unwrap_or_default();
        let logging = self.logging.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(base.server.host),
                port: server.port.unwrap_or(base.server.port),
                max_connections: server
                    .max_connections
                    .unwrap_or(base.server.max_connections),
            },
            ingest: IngestSettings {
                host: ingest.host.unwrap_or(base.ingest.host),
                port: ingest.port.unwrap_or(base.ingest.port),
                max_frame_bytes: ingest
                    .max_frame_bytes
                    .unwrap_or(base.ingest.max_frame_bytes),
            },
            relay: RelaySettings {
                command_buffer: relay.command_buffer.unwrap_or(base.relay.command_buffer),
            },
            snapshots: SnapshotSettings {
                backend: snapshots.backend.unwrap_or(base.snapshots.backend),
                path: snapshots.path.unwrap_or(base.snapshots.path),
            },
            leaderboard: LeaderboardSettings {
                cohort: leaderboard.cohort.unwrap_or(base.leaderboard.cohort),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(base.logging.level),
            },
        }
    }
}

impl Settings {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn ingest_addr(&self) -> String {
        format!("{}:{}", self.ingest.host, self.ingest.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                max_connections: 1000,
            },
            ingest: IngestSettings {
                host: "127.0.0.1".to_string(),
                port: 5555,
                max_frame_bytes: 1024 * 1024,
            },
            relay: RelaySettings {
                command_buffer: 1024,
            },
            snapshots: SnapshotSettings {
                backend: SnapshotBackend::File,
                path: "public/data".to_string(),
            },
            leaderboard: LeaderboardSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}
