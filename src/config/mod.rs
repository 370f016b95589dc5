mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    IngestSettings, LeaderboardSettings, LoggingSettings, RelaySettings, ServerSettings,
    Settings, SnapshotBackend, SnapshotSettings,
};

/// Prefix for environment overrides, e.g. `PUSHRELAY_SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "PUSHRELAY";

/// Loads the configuration from `config/default` and the environment.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Loads `file_stem` (any format the `config` crate understands; the file is
/// optional) plus environment overrides, and merges the result over
/// `Settings::default()`.
pub fn load_config_from(file_stem: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(file_stem).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("leaderboard.cohort"),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge_over(Settings::default()))
}
