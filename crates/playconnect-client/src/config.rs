use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

fn default_api_base_url() -> String {
    "http://localhost:8000".to_string()
}

/// Session expiry watcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How often a logged-in session re-checks its token (default: 60)
    #[serde(default = "default_expiry_check_interval")]
    pub expiry_check_interval_secs: u64,
}

fn default_expiry_check_interval() -> u64 {
    60
}

/// Fallback used when a zero expiry check interval reaches the session manager
pub const DEFAULT_EXPIRY_CHECK_INTERVAL: Duration = Duration::from_secs(60);

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiry_check_interval_secs: default_expiry_check_interval(),
        }
    }
}

impl SessionConfig {
    /// Watcher period; zero falls back to the default
    pub fn expiry_check_interval(&self) -> Duration {
        match self.expiry_check_interval_secs {
            0 => DEFAULT_EXPIRY_CHECK_INTERVAL,
            secs => Duration::from_secs(secs),
        }
    }
}

/// Notification poller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Delay between ticks in milliseconds (default: 12000)
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
    /// Max notifications requested per tick (default: 50)
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_poll_interval() -> u64 {
    12_000
}

/// Fallback used when a zero poll interval reaches the poller
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(12_000);
fn default_page_size() -> u32 {
    50
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            page_size: default_page_size(),
        }
    }
}

impl PollerConfig {
    /// Delay between ticks; zero falls back to the default
    pub fn interval(&self) -> Duration {
        match self.interval_ms {
            0 => DEFAULT_POLL_INTERVAL,
            ms => Duration::from_millis(ms),
        }
    }
}

/// Toast surface settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToastConfig {
    /// Lifetime of a toast in milliseconds (default: 6000)
    #[serde(default = "default_toast_ttl")]
    pub ttl_ms: u64,
    /// Toasts rendered at once (default: 2)
    #[serde(default = "default_max_visible")]
    pub max_visible: usize,
}

fn default_toast_ttl() -> u64 {
    6_000
}
fn default_max_visible() -> usize {
    2
}

impl Default for ToastConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_toast_ttl(),
            max_visible: default_max_visible(),
        }
    }
}

impl ToastConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Notification bell settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BellConfig {
    /// Notifications loaded when the dropdown opens (default: 30)
    #[serde(default = "default_recent_limit")]
    pub recent_limit: u32,
}

fn default_recent_limit() -> u32 {
    30
}

impl Default for BellConfig {
    fn default() -> Self {
        Self {
            recent_limit: default_recent_limit(),
        }
    }
}

/// Client configuration - loaded from YAML and `PLAYCONNECT__` env vars
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// JSON file backing the session store; in-memory when absent
    #[serde(default)]
    pub storage_path: Option<String>,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub toasts: ToastConfig,
    #[serde(default)]
    pub bell: BellConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            storage_path: None,
            session: SessionConfig::default(),
            poller: PollerConfig::default(),
            toasts: ToastConfig::default(),
            bell: BellConfig::default(),
        }
    }
}

/// Load client config from an optional YAML file with PLAYCONNECT__ env var overrides.
pub fn load_config(path: Option<&str>) -> Result<ClientConfig> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::new(path, config::FileFormat::Yaml));
    }
    let config: ClientConfig = builder
        .add_source(
            config::Environment::with_prefix("PLAYCONNECT")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?
        .try_deserialize()?;
    config.validate()?;
    Ok(config)
}

impl ClientConfig {
    /// Reject settings that would stall or spin the background tasks
    pub fn validate(&self) -> std::result::Result<(), config::ConfigError> {
        if self.session.expiry_check_interval_secs == 0 {
            return Err(config::ConfigError::Message(
                "session.expiry_check_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.poller.interval_ms == 0 {
            return Err(config::ConfigError::Message(
                "poller.interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config: ClientConfig = serde_yml::from_str("{}").unwrap();
        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert!(config.storage_path.is_none());
        assert_eq!(config.session.expiry_check_interval_secs, 60);
        assert_eq!(config.poller.interval_ms, 12_000);
        assert_eq!(config.poller.page_size, 50);
        assert_eq!(config.toasts.ttl_ms, 6_000);
        assert_eq!(config.toasts.max_visible, 2);
        assert_eq!(config.bell.recent_limit, 30);
    }

    #[test]
    fn test_parse_partial_sections() {
        let yaml = r#"
api_base_url: "https://api.playconnect.test"
storage_path: "/tmp/playconnect/session.json"
poller:
  interval_ms: 5000
toasts:
  max_visible: 3
"#;
        let config: ClientConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.api_base_url, "https://api.playconnect.test");
        assert_eq!(
            config.storage_path.as_deref(),
            Some("/tmp/playconnect/session.json")
        );
        assert_eq!(config.poller.interval(), Duration::from_millis(5000));
        assert_eq!(config.poller.page_size, 50);
        assert_eq!(config.toasts.max_visible, 3);
        assert_eq!(config.toasts.ttl(), Duration::from_millis(6000));
    }

    #[test]
    fn test_load_config_from_file() {
        let yaml = r#"
api_base_url: "http://127.0.0.1:9000"
session:
  expiry_check_interval_secs: 30
bell:
  recent_limit: 10
"#;
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file.flush().unwrap();

        let config = load_config(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(config.api_base_url, "http://127.0.0.1:9000");
        assert_eq!(
            config.session.expiry_check_interval(),
            Duration::from_secs(30)
        );
        assert_eq!(config.bell.recent_limit, 10);
        assert_eq!(config.poller.page_size, 50);
    }

    #[test]
    fn test_load_config_rejects_zero_intervals() {
        for yaml in [
            "session:\n  expiry_check_interval_secs: 0\n",
            "poller:\n  interval_ms: 0\n",
        ] {
            let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
            file.write_all(yaml.as_bytes()).unwrap();
            file.flush().unwrap();

            let err = load_config(Some(file.path().to_str().unwrap())).unwrap_err();
            assert!(
                matches!(err, crate::error::ClientError::Config(_)),
                "unexpected error for {:?}: {}",
                yaml,
                err
            );
        }
    }

    #[test]
    fn test_zero_poll_interval_falls_back_to_default() {
        let config = PollerConfig {
            interval_ms: 0,
            page_size: 50,
        };
        assert_eq!(config.interval(), DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn test_load_config_missing_file_fails() {
        assert!(load_config(Some("/nonexistent/playconnect.yaml")).is_err());
    }
}
