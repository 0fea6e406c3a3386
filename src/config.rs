//! Client configuration loaded from TOML
//!
//! Every field has a default so an empty file (or no file at all) yields a
//! working client pointed at the public EMQX broker. The persisted broker
//! endpoint in the [`crate::store::ConfigStore`] takes precedence over the
//! `[broker]` defaults here once it has been written.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BROKER_HOST: &str = "broker.emqx.io";
pub const DEFAULT_BROKER_PORT: u16 = 1883;
pub const DEFAULT_TOPIC_PREFIX: &str = "mediaplatform";

/// Top-level client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub device: DeviceSection,
}

/// Broker defaults and credentials
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Host used when the store has no persisted endpoint
    #[serde(default = "default_broker_host")]
    pub host: String,
    /// Port used when the store has no persisted endpoint
    #[serde(default = "default_broker_port")]
    pub port: u16,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// Connect over TLS
    #[serde(default)]
    pub tls: bool,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            username_env: None,
            password_env: None,
            tls: false,
        }
    }
}

/// Session timing and namespace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// Linear backoff unit: attempt N waits N times this long
    #[serde(default = "default_reconnect_base_delay")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            topic_prefix: default_topic_prefix(),
            keep_alive_secs: default_keep_alive(),
            connect_timeout_secs: default_connect_timeout(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            reconnect_base_delay_ms: default_reconnect_base_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

impl SessionSection {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }
}

/// Device metadata reported at registration, plus where the identity lives
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// JSON file holding the persisted device id and broker endpoint
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_os_version")]
    pub os_version: String,
    #[serde(default = "default_app_version")]
    pub app_version: String,
    #[serde(default = "default_screen_resolution")]
    pub screen_resolution: String,
    #[serde(default)]
    pub location: String,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            model: default_model(),
            os_version: default_os_version(),
            app_version: default_app_version(),
            screen_resolution: default_screen_resolution(),
            location: String::new(),
        }
    }
}

fn default_broker_host() -> String {
    DEFAULT_BROKER_HOST.to_string()
}

fn default_broker_port() -> u16 {
    DEFAULT_BROKER_PORT
}

fn default_topic_prefix() -> String {
    DEFAULT_TOPIC_PREFIX.to_string()
}

fn default_keep_alive() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_reconnect_base_delay() -> u64 {
    5000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_state_file() -> PathBuf {
    PathBuf::from("display-client-state.json")
}

fn default_model() -> String {
    std::env::consts::ARCH.to_string()
}

fn default_os_version() -> String {
    std::env::consts::OS.to_string()
}

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_screen_resolution() -> String {
    "1920x1080".to_string()
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_topic_prefix(&self.session.topic_prefix)?;

        if self.broker.host.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "broker.host must not be empty".to_string(),
            ));
        }
        if self.broker.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.port must be greater than 0".to_string(),
            ));
        }
        if self.session.heartbeat_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "session.heartbeat_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.session.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "session.connect_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.session.reconnect_base_delay_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "session.reconnect_base_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.session.max_reconnect_attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "session.max_reconnect_attempts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Helper method to get environment variable with consistent error handling
    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }

    /// Broker username from environment variable
    pub fn broker_username(&self) -> Option<String> {
        Self::get_env_var_optional(self.broker.username_env.as_ref())
    }

    /// Broker password from environment variable
    pub fn broker_password(&self) -> Option<String> {
        Self::get_env_var_optional(self.broker.password_env.as_ref())
    }
}

/// The prefix is a plain topic path: no wildcards, no empty levels
fn validate_topic_prefix(prefix: &str) -> Result<(), ConfigError> {
    if prefix.is_empty() {
        return Err(ConfigError::InvalidConfig(
            "session.topic_prefix must not be empty".to_string(),
        ));
    }
    if prefix.contains(['#', '+']) {
        return Err(ConfigError::InvalidConfig(format!(
            "session.topic_prefix '{prefix}' must not contain MQTT wildcards"
        )));
    }
    if prefix.starts_with('/') || prefix.ends_with('/') || prefix.contains("//") {
        return Err(ConfigError::InvalidConfig(format!(
            "session.topic_prefix '{prefix}' must not have empty levels"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config.broker.host, "broker.emqx.io");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.session.topic_prefix, "mediaplatform");
        assert_eq!(config.session.keep_alive_secs, 60);
        assert_eq!(config.session.connect_timeout_secs, 30);
        assert_eq!(config.session.heartbeat_interval_secs, 30);
        assert_eq!(config.session.reconnect_base_delay_ms, 5000);
        assert_eq!(config.session.max_reconnect_attempts, 10);
        assert!(!config.broker.tls);
    }

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[broker]
host = "mqtt.example.com"
port = 8883
username_env = "DISPLAY_MQTT_USER"
password_env = "DISPLAY_MQTT_PASS"
tls = true

[session]
topic_prefix = "signage/eu"
heartbeat_interval_secs = 15
reconnect_base_delay_ms = 1000
max_reconnect_attempts = 4

[device]
state_file = "/var/lib/display/state.json"
model = "RK3399"
location = "Lobby"
"#;

        let config = ClientConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.broker.host, "mqtt.example.com");
        assert_eq!(config.broker.port, 8883);
        assert!(config.broker.tls);
        assert_eq!(config.session.topic_prefix, "signage/eu");
        assert_eq!(config.session.heartbeat_interval(), Duration::from_secs(15));
        assert_eq!(
            config.session.reconnect_base_delay(),
            Duration::from_millis(1000)
        );
        assert_eq!(config.session.max_reconnect_attempts, 4);
        assert_eq!(config.device.model, "RK3399");
        assert_eq!(config.device.location, "Lobby");
        // unspecified fields keep their defaults
        assert_eq!(config.session.keep_alive_secs, 60);
    }

    #[test]
    fn test_rejects_wildcard_prefix() {
        let result = ClientConfig::from_toml_str("[session]\ntopic_prefix = \"media/#\"\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_empty_levels_in_prefix() {
        for prefix in ["/media", "media/", "media//eu", ""] {
            let mut config = ClientConfig::default();
            config.session.topic_prefix = prefix.to_string();
            assert!(config.validate().is_err(), "prefix {prefix:?} should fail");
        }
    }

    #[test]
    fn test_rejects_zero_values() {
        let mut config = ClientConfig::default();
        config.session.max_reconnect_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.session.heartbeat_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.broker.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml() {
        let result = ClientConfig::from_toml_str("[broker\nhost = ");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_missing_credentials_env_resolves_to_none() {
        let mut config = ClientConfig::default();
        config.broker.username_env = Some("DISPLAY_CLIENT_TEST_UNSET_USER".to_string());
        assert_eq!(config.broker_username(), None);
        assert_eq!(config.broker_password(), None);
    }
}
