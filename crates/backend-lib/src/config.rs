// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::logging::{LogDriver, LOG_LEVELS};
use crate::privileges::Privileges;

/// Default configuration file looked up by [`Settings::load`].
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
/// Prefix of environment overrides, e.g. `BANCHO_SERVER__PORT=13381`.
pub const ENV_PREFIX: &str = "BANCHO_";

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub sessions: SessionSettings,
    pub outbox: OutboxSettings,
    pub logging: LoggingSettings,
    /// Persistent channels created at startup.
    pub channels: Vec<ChannelSeed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Idle time after which a session expires. Every poll extends it.
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxSettings {
    /// Queue length past which enqueues are logged as a stalled client.
    pub soft_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub driver: LogDriver,
}

/// A channel seeded at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSeed {
    pub name: String,
    pub topic: String,
    #[serde(default)]
    pub read_privileges: Privileges,
    #[serde(default)]
    pub write_privileges: Privileges,
    #[serde(default)]
    pub auto_join: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            sessions: SessionSettings { ttl_secs: 300 },
            outbox: OutboxSettings { soft_limit: 50 },
            logging: LoggingSettings {
                level: "info".to_string(),
                driver: LogDriver::Pretty,
            },
            channels: vec![
                ChannelSeed {
                    name: "#osu".to_string(),
                    topic: "General discussion.".to_string(),
                    read_privileges: Privileges::empty(),
                    write_privileges: Privileges::empty(),
                    auto_join: true,
                },
                ChannelSeed {
                    name: "#announce".to_string(),
                    topic: "Exemplary performance and public announcements.".to_string(),
                    read_privileges: Privileges::empty(),
                    write_privileges: Privileges::ADMINISTRATOR | Privileges::DEVELOPER,
                    auto_join: true,
                },
                ChannelSeed {
                    name: "#lobby".to_string(),
                    topic: "Multiplayer lobby discussion room.".to_string(),
                    read_privileges: Privileges::empty(),
                    write_privileges: Privileges::empty(),
                    auto_join: false,
                },
            ],
        }
    }
}

impl Settings {
    /// Load settings from `config.toml` (if present) and the environment.
    pub fn load() -> Result<Self, AppError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load settings from defaults, then a TOML file, then `BANCHO_*` variables.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.sessions.ttl_secs == 0 {
            return Err(AppError::Config("sessions.ttl_secs must be positive".to_string()));
        }

        if self.outbox.soft_limit == 0 {
            return Err(AppError::Config("outbox.soft_limit must be positive".to_string()));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(AppError::Config(format!(
                "unknown log level '{}'",
                self.logging.level
            )));
        }

        if let Some(channel) = self.channels.iter().find(|c| !c.name.starts_with('#')) {
            return Err(AppError::Config(format!(
                "channel name '{}' must start with '#'",
                channel.name
            )));
        }

        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid server address: {e}")))
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.sessions.ttl_secs)
    }

    /// Create a builder starting from the defaults
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }
}

/// Builder for [`Settings`], validated on `build`.
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.settings.server.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.settings.server.port = port;
        self
    }

    pub fn session_ttl(mut self, secs: u64) -> Self {
        self.settings.sessions.ttl_secs = secs;
        self
    }

    pub fn outbox_soft_limit(mut self, limit: usize) -> Self {
        self.settings.outbox.soft_limit = limit;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.settings.logging.level = level.into();
        self
    }

    pub fn log_driver(mut self, driver: LogDriver) -> Self {
        self.settings.logging.driver = driver;
        self
    }

    pub fn channels(mut self, channels: Vec<ChannelSeed>) -> Self {
        self.settings.channels = channels;
        self
    }

    pub fn build(self) -> Result<Settings, AppError> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}
