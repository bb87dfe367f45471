//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/wsync/config.toml)
//! 3. Environment variables (WSYNC_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::sync::SchedulerSettings;

/// Environment variable prefix
const ENV_PREFIX: &str = "WSYNC";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for local data (workspace snapshot, template cache)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Server base URL, e.g. `https://ide.example.com`
    #[serde(default)]
    pub server_url: Option<String>,

    /// WebSocket URL for push notifications (optional)
    #[serde(default)]
    pub push_url: Option<String>,

    /// Seconds between sync rounds for regular accounts
    #[serde(default = "default_update_frequency")]
    pub update_frequency_secs: u32,

    /// Seconds between sync rounds for teachers and admins
    #[serde(default = "default_elevated_update_frequency")]
    pub elevated_update_frequency_secs: u32,

    /// Rounds between forced full syncs
    #[serde(default = "default_forced_update_every")]
    pub forced_update_every: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// CSRF token sent with every request
    #[serde(default)]
    pub csrf_token: Option<String>,

    /// Write logs to this file instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server_url: None,
            push_url: None,
            update_frequency_secs: default_update_frequency(),
            elevated_update_frequency_secs: default_elevated_update_frequency(),
            forced_update_every: default_forced_update_every(),
            request_timeout_secs: default_request_timeout(),
            csrf_token: None,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (WSYNC_DATA_DIR, WSYNC_SERVER_URL, ...)
    /// 2. Config file (~/.config/wsync/config.toml or WSYNC_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring an explicit path from the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        // Empty string clears optional URLs
        if let Ok(val) = std::env::var(format!("{}_SERVER_URL", ENV_PREFIX)) {
            self.server_url = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = std::env::var(format!("{}_PUSH_URL", ENV_PREFIX)) {
            self.push_url = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = std::env::var(format!("{}_CSRF_TOKEN", ENV_PREFIX)) {
            self.csrf_token = if val.is_empty() { None } else { Some(val) };
        }

        // Unparseable numbers are ignored
        if let Some(val) = env_number(&format!("{}_UPDATE_FREQUENCY_SECS", ENV_PREFIX)) {
            self.update_frequency_secs = val;
        }

        if let Some(val) = env_number(&format!("{}_ELEVATED_UPDATE_FREQUENCY_SECS", ENV_PREFIX)) {
            self.elevated_update_frequency_secs = val;
        }

        if let Some(val) = env_number(&format!("{}_FORCED_UPDATE_EVERY", ENV_PREFIX)) {
            self.forced_update_every = val;
        }

        if let Some(val) = env_number(&format!("{}_REQUEST_TIMEOUT_SECS", ENV_PREFIX)) {
            self.request_timeout_secs = val;
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default config file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &PathBuf) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Set a single key from its string form (used by `wsync config set`)
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let optional = |v: &str| {
            if v.is_empty() {
                None
            } else {
                Some(v.to_string())
            }
        };

        match key {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "server_url" => self.server_url = optional(value),
            "push_url" => self.push_url = optional(value),
            "csrf_token" => self.csrf_token = optional(value),
            "log_file" => self.log_file = optional(value).map(PathBuf::from),
            "update_frequency_secs" => {
                self.update_frequency_secs = value
                    .parse()
                    .with_context(|| format!("Invalid number: {}", value))?
            }
            "elevated_update_frequency_secs" => {
                self.elevated_update_frequency_secs = value
                    .parse()
                    .with_context(|| format!("Invalid number: {}", value))?
            }
            "forced_update_every" => {
                self.forced_update_every = value
                    .parse()
                    .with_context(|| format!("Invalid number: {}", value))?
            }
            "request_timeout_secs" => {
                self.request_timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid number: {}", value))?
            }
            _ => anyhow::bail!("Unknown configuration key: {}", key),
        }
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with WSYNC_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wsync")
            .join("config.toml")
    }

    /// Get the path to the local workspace snapshot
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("workspaces.json")
    }

    /// Get the directory of the template blob cache
    pub fn template_cache_dir(&self) -> PathBuf {
        self.data_dir.join("templates")
    }

    /// Per-request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Scheduler cadence derived from this configuration
    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            update_frequency_secs: self.update_frequency_secs,
            elevated_update_frequency_secs: self.elevated_update_frequency_secs,
            forced_update_every: self.forced_update_every,
        }
    }
}

fn env_number<N: std::str::FromStr>(name: &str) -> Option<N> {
    std::env::var(name).ok()?.parse().ok()
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wsync")
}

fn default_update_frequency() -> u32 {
    25
}

fn default_elevated_update_frequency() -> u32 {
    5
}

fn default_forced_update_every() -> u32 {
    25
}

fn default_request_timeout() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "WSYNC_DATA_DIR",
        "WSYNC_SERVER_URL",
        "WSYNC_PUSH_URL",
        "WSYNC_CSRF_TOKEN",
        "WSYNC_UPDATE_FREQUENCY_SECS",
        "WSYNC_ELEVATED_UPDATE_FREQUENCY_SECS",
        "WSYNC_FORCED_UPDATE_EVERY",
        "WSYNC_REQUEST_TIMEOUT_SECS",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.server_url.is_none());
        assert_eq!(config.update_frequency_secs, 25);
        assert_eq!(config.elevated_update_frequency_secs, 5);
        assert_eq!(config.forced_update_every, 25);
        assert!(config.data_dir.ends_with("wsync"));
    }

    #[test]
    fn test_file_paths() {
        let config = Config::default();
        assert!(config.snapshot_path().ends_with("workspaces.json"));
        assert!(config.template_cache_dir().ends_with("templates"));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("WSYNC_DATA_DIR", "/tmp/wsync-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/wsync-test"));
    }

    #[test]
    fn test_env_override_server_url() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("WSYNC_SERVER_URL", "https://ide.example.com");
        config.apply_env_overrides();
        assert_eq!(config.server_url.as_deref(), Some("https://ide.example.com"));

        // Empty string clears it
        env::set_var("WSYNC_SERVER_URL", "");
        config.apply_env_overrides();
        assert!(config.server_url.is_none());
    }

    #[test]
    fn test_env_override_numbers() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("WSYNC_UPDATE_FREQUENCY_SECS", "10");
        env::set_var("WSYNC_ELEVATED_UPDATE_FREQUENCY_SECS", "2");
        env::set_var("WSYNC_FORCED_UPDATE_EVERY", "not-a-number");
        env::set_var("WSYNC_REQUEST_TIMEOUT_SECS", "30");
        config.apply_env_overrides();

        assert_eq!(config.update_frequency_secs, 10);
        assert_eq!(config.elevated_update_frequency_secs, 2);
        assert_eq!(config.forced_update_every, 25);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            data_dir: PathBuf::from("/data/wsync"),
            server_url: Some("https://ide.example.com".to_string()),
            forced_update_every: 30,
            ..Config::default()
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("server_url"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.server_url, config.server_url);
        assert_eq!(parsed.forced_update_every, 30);
    }

    #[test]
    fn test_load_from_str_fills_defaults() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            server_url = "https://ide.example.com"
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.update_frequency_secs, 25);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        env::set_var("WSYNC_DATA_DIR", temp_dir.path());

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert!(config.server_url.is_none());
        assert_eq!(config.data_dir, temp_dir.path());
    }

    #[test]
    fn test_set_value() {
        let mut config = Config::default();
        config.set_value("server_url", "http://localhost:5500").unwrap();
        config.set_value("forced_update_every", "40").unwrap();
        config.set_value("push_url", "").unwrap();

        assert_eq!(config.server_url.as_deref(), Some("http://localhost:5500"));
        assert_eq!(config.forced_update_every, 40);
        assert!(config.push_url.is_none());

        assert!(config.set_value("forced_update_every", "x").is_err());
        assert!(config.set_value("sync_interval", "30").is_err());
    }

    #[test]
    fn test_scheduler_settings() {
        let config = Config {
            update_frequency_secs: 12,
            ..Config::default()
        };
        let settings = config.scheduler_settings();
        assert_eq!(settings.update_frequency_secs, 12);
        assert_eq!(settings.elevated_update_frequency_secs, 5);
    }
}
