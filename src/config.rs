//! Configuration loading and validation.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server identity.
    pub server: ServerConfig,
    /// Network listen configuration.
    pub listen: ListenConfig,
    /// Timer durations (grace periods, countdowns, sweeper cadence).
    #[serde(default)]
    pub timing: TimingConfig,
    /// Per-connection limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Analytics database. When absent, analytics are counted in memory
    /// and discarded at session end.
    pub database: Option<DatabaseConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check relationships between values that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.timing;
        if t.host_left_countdown_secs == 0 {
            return Err(ConfigError::Invalid(
                "timing.host_left_countdown_secs must be positive".into(),
            ));
        }
        if t.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "timing.sweep_interval_secs must be positive".into(),
            ));
        }
        if let Some(cp) = t
            .host_left_checkpoints_secs
            .iter()
            .find(|cp| **cp >= t.host_left_countdown_secs)
        {
            return Err(ConfigError::Invalid(format!(
                "host-left checkpoint {cp}s is not inside the {}s countdown",
                t.host_left_countdown_secs
            )));
        }
        Ok(())
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Instance name (e.g. "huddle.us-east.chainops.internal").
    pub name: String,
    /// Prometheus metrics HTTP port. 0 disables the endpoint.
    pub metrics_port: Option<u16>,
}

/// Network listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// WebSocket listen address. Port 0 picks an OS-assigned port (tests).
    pub address: SocketAddr,
}

/// Analytics database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite path, or ":memory:".
    pub path: String,
}

/// Timer durations. All in whole seconds to keep the TOML obvious.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// How long a dropped connection may reconnect before its participant
    /// is removed.
    pub disconnect_grace_secs: u64,
    /// How long a hostless session survives before being force-ended.
    pub host_left_countdown_secs: u64,
    /// Seconds-remaining marks at which countdown reminders are sent.
    pub host_left_checkpoints_secs: Vec<u64>,
    /// Sweeper cadence.
    pub sweep_interval_secs: u64,
    /// Hard cap on session age; the sweeper reclaims anything older.
    pub max_session_age_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            disconnect_grace_secs: 20,
            host_left_countdown_secs: 600,
            host_left_checkpoints_secs: vec![300, 120, 60, 30, 10],
            sweep_interval_secs: 60,
            max_session_age_secs: 4 * 3600,
        }
    }
}

impl TimingConfig {
    /// Disconnect grace window.
    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace_secs)
    }

    /// Host-left countdown until force-end.
    pub fn host_left_countdown(&self) -> Duration {
        Duration::from_secs(self.host_left_countdown_secs)
    }

    /// Sweeper tick interval.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Maximum session age before the sweeper reclaims it.
    pub fn max_session_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_session_age_secs as i64)
    }
}

/// Per-connection limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Sustained inbound command rate per connection.
    pub message_rate_per_second: f32,
    /// Burst capacity above the sustained rate.
    pub message_burst: f32,
    /// Outbound event queue depth per connection; events beyond it are
    /// dropped for that recipient.
    pub outbound_queue: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            message_rate_per_second: 20.0,
            message_burst: 60.0,
            outbound_queue: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            name = "huddle.test"

            [listen]
            address = "127.0.0.1:0"
            "#,
        )
        .unwrap();

        assert_eq!(config.timing.disconnect_grace_secs, 20);
        assert_eq!(config.timing.host_left_countdown_secs, 600);
        assert_eq!(config.timing.host_left_checkpoints_secs, vec![300, 120, 60, 30, 10]);
        assert!(config.database.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn checkpoint_outside_countdown_is_rejected() {
        let config: Config = toml::from_str(
            r#"
            [server]
            name = "huddle.test"

            [listen]
            address = "127.0.0.1:0"

            [timing]
            host_left_countdown_secs = 60
            host_left_checkpoints_secs = [300]
            "#,
        )
        .unwrap();

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
