//! SDK Configuration
//!
//! Defines configuration options for the Pulse SDK.

use pulse_core::session::DEFAULT_SESSION_TIMEOUT_MS;
use serde::{Deserialize, Serialize};

/// Instance name used when none is configured.
pub const DEFAULT_INSTANCE_NAME: &str = "$default_instance";

/// SDK configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    /// Project API key
    pub api_key: String,

    /// Name distinguishing several clients in one process
    pub instance_name: String,

    /// Inactivity threshold in milliseconds (default: 300000 = 5 minutes)
    pub session_timeout_ms: i64,

    /// Emit `session_start` / `session_end` events (default: false)
    pub tracking_session_events: bool,

    /// Start opted out of tracking (default: false)
    pub opt_out: bool,

    /// Evaluate the session once during `init` (default: true)
    pub start_session_on_init: bool,

    /// Initial user ID (optional)
    pub user_id: Option<String>,

    /// Device ID to use instead of a stored or generated one (optional)
    pub device_id: Option<String>,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            instance_name: DEFAULT_INSTANCE_NAME.into(),
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            tracking_session_events: false,
            opt_out: false,
            start_session_on_init: true,
            user_id: None,
            device_id: None,
        }
    }
}

impl PulseConfig {
    /// Create a new config for the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Parse a TOML document; missing keys take their default values
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigValidationError> {
        toml::from_str(raw).map_err(|e| ConfigValidationError::Parse(e.to_string()))
    }

    /// Set the instance name
    pub fn with_instance_name(mut self, instance_name: impl Into<String>) -> Self {
        self.instance_name = instance_name.into();
        self
    }

    /// Set the session timeout
    pub fn with_session_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.session_timeout_ms = timeout_ms;
        self
    }

    /// Enable or disable boundary events
    pub fn with_session_events(mut self, enabled: bool) -> Self {
        self.tracking_session_events = enabled;
        self
    }

    /// Start opted out
    pub fn with_opt_out(mut self, opt_out: bool) -> Self {
        self.opt_out = opt_out;
        self
    }

    /// Control the session check performed by `init`
    pub fn with_start_session_on_init(mut self, enabled: bool) -> Self {
        self.start_session_on_init = enabled;
        self
    }

    /// Set the initial user ID
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the device ID
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Key under which session state is stored
    pub fn storage_key(&self) -> String {
        let prefix: String = self.api_key.chars().take(10).collect();
        format!("PULSE_{}_{}", prefix, self.instance_name)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigValidationError::MissingApiKey);
        }

        if self.instance_name.is_empty() {
            return Err(ConfigValidationError::InvalidValue {
                field: "instance_name".into(),
                message: "must not be empty".into(),
            });
        }

        if self.session_timeout_ms <= 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "session_timeout_ms".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.device_id.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigValidationError::InvalidValue {
                field: "device_id".into(),
                message: "must not be empty when set".into(),
            });
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("api_key is required")]
    MissingApiKey,

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PulseConfig::default();
        assert_eq!(config.session_timeout_ms, 300_000);
        assert_eq!(config.instance_name, DEFAULT_INSTANCE_NAME);
        assert!(!config.tracking_session_events);
        assert!(config.start_session_on_init);
    }

    #[test]
    fn test_config_builder() {
        let config = PulseConfig::new("key-123")
            .with_instance_name("secondary")
            .with_session_timeout_ms(100)
            .with_session_events(true)
            .with_user_id("user-1");

        assert_eq!(config.api_key, "key-123");
        assert_eq!(config.instance_name, "secondary");
        assert_eq!(config.session_timeout_ms, 100);
        assert!(config.tracking_session_events);
        assert_eq!(config.user_id, Some("user-1".into()));
    }

    #[test]
    fn test_config_validation() {
        let mut config = PulseConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::MissingApiKey)
        ));

        config.api_key = "key-123".into();
        assert!(config.validate().is_ok());

        config.session_timeout_ms = 0;
        assert!(config.validate().is_err());

        config.session_timeout_ms = 1;
        config.device_id = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_storage_key_truncates_api_key() {
        let config = PulseConfig::new("0123456789abcdef");
        assert_eq!(config.storage_key(), "PULSE_0123456789_$default_instance");
    }

    #[test]
    fn test_from_toml() {
        let config = PulseConfig::from_toml_str(
            r#"
            api_key = "abc"
            session_timeout_ms = 1000
            tracking_session_events = true
            "#,
        )
        .unwrap();

        assert_eq!(config.api_key, "abc");
        assert_eq!(config.session_timeout_ms, 1000);
        assert!(config.tracking_session_events);
        assert_eq!(config.instance_name, DEFAULT_INSTANCE_NAME);

        assert!(PulseConfig::from_toml_str("session_timeout_ms = \"soon\"").is_err());
    }
}
