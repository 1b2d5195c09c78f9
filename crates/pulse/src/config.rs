//! Configuration management for pulse.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Command-line flags
//! 2. Environment variables (PULSE_*)
//! 3. Config file (`<config dir>/config.toml`)
//! 4. Default values

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use pulse_core::session::DEFAULT_SESSION_TIMEOUT_MS;
use pulse_sdk::{DEFAULT_INSTANCE_NAME, PulseConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::ClientArgs;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API key; also the source of the storage key
    pub api_key: Option<String>,

    /// Instance name
    pub instance_name: String,

    /// Session timeout in milliseconds
    pub session_timeout_ms: i64,

    /// Emit session_start / session_end events
    pub tracking_session_events: bool,

    /// Directory holding session state files
    pub state_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "pulse", "pulse") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pulse")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            instance_name: DEFAULT_INSTANCE_NAME.to_string(),
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            tracking_session_events: false,
            state_dir: default_data_dir().join("state"),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load() -> Result<Self> {
        let mut config = Self::from_file(&Self::config_path())?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Read a config file, falling back to defaults when it does not exist.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Apply `PULSE_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(api_key) = lookup("PULSE_API_KEY") {
            self.api_key = Some(api_key);
        }
        if let Some(timeout) = lookup("PULSE_SESSION_TIMEOUT_MS") {
            self.session_timeout_ms = timeout
                .trim()
                .parse()
                .with_context(|| format!("Invalid PULSE_SESSION_TIMEOUT_MS: {}", timeout))?;
        }
        if let Some(dir) = lookup("PULSE_STATE_DIR") {
            self.state_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("PULSE_CONFIG") {
            PathBuf::from(path)
        } else if let Some(proj_dirs) = ProjectDirs::from("dev", "pulse", "pulse") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            default_data_dir().join("config.toml")
        }
    }

    /// Apply command-line overrides.
    pub fn with_args(mut self, args: &ClientArgs) -> Self {
        if let Some(dir) = &args.state {
            self.state_dir = dir.clone();
        }
        if let Some(api_key) = &args.api_key {
            self.api_key = Some(api_key.clone());
        }
        if let Some(instance) = &args.instance {
            self.instance_name = instance.clone();
        }
        self
    }

    /// Build the SDK configuration.
    pub fn pulse_config(&self) -> Result<PulseConfig> {
        let Some(api_key) = self.api_key.as_deref().filter(|key| !key.is_empty()) else {
            bail!("API key required (set PULSE_API_KEY or pass --api-key)");
        };

        let config = PulseConfig::new(api_key)
            .with_instance_name(&self.instance_name)
            .with_session_timeout_ms(self.session_timeout_ms)
            .with_session_events(self.tracking_session_events);
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_key, None);
        assert_eq!(config.instance_name, DEFAULT_INSTANCE_NAME);
        assert_eq!(config.session_timeout_ms, DEFAULT_SESSION_TIMEOUT_MS);
        assert!(!config.tracking_session_events);
        assert!(config.state_dir.ends_with("state"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::from_file(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_file_then_env_precedence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            api_key = "from-file"
            session_timeout_ms = 1000
            tracking_session_events = true
            "#,
        )
        .unwrap();

        let mut config = Config::from_file(&path).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
        assert!(config.tracking_session_events);

        let env: HashMap<&str, &str> = [
            ("PULSE_API_KEY", "from-env"),
            ("PULSE_SESSION_TIMEOUT_MS", "2000"),
            ("PULSE_STATE_DIR", "/tmp/pulse-state"),
        ]
        .into();
        config
            .apply_env(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.session_timeout_ms, 2000);
        assert_eq!(config.state_dir, PathBuf::from("/tmp/pulse-state"));

        let args = ClientArgs {
            api_key: Some("from-flag".into()),
            ..Default::default()
        };
        let config = config.with_args(&args);
        assert_eq!(config.api_key.as_deref(), Some("from-flag"));
    }

    #[test]
    fn test_invalid_env_timeout() {
        let mut config = Config::default();
        let result = config.apply_env(|name| {
            (name == "PULSE_SESSION_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_pulse_config_requires_api_key() {
        assert!(Config::default().pulse_config().is_err());

        let config = Config {
            api_key: Some("abcdefghijklmnop".into()),
            session_timeout_ms: 100,
            ..Default::default()
        };
        let pulse = config.pulse_config().unwrap();
        assert_eq!(pulse.session_timeout_ms, 100);
        assert_eq!(pulse.storage_key(), "PULSE_abcdefghij_$default_instance");

        let invalid = Config {
            session_timeout_ms: 0,
            ..config
        };
        assert!(invalid.pulse_config().is_err());
    }
}
