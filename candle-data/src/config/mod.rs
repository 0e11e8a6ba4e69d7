mod loader;
pub mod value;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub use value::{ConfigValue, FromConfigValue};

/// Error type for configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested key was not found in the configuration.
    #[error("Config key not found: {0}")]
    NotFound(String),
    /// The value could not be converted to the requested type.
    #[error("Config type mismatch for '{key}': expected {expected}")]
    TypeMismatch { key: String, expected: &'static str },
    /// An I/O or YAML parsing error occurred while loading config files.
    #[error("Config load error: {0}")]
    Load(String),
}

/// Configuration loaded from YAML files, `.env` files, and environment variables.
///
/// Resolution order (lowest to highest priority):
/// 1. `candle.yaml` (base)
/// 2. `candle-{profile}.yaml` (profile override)
/// 3. `.env` file (loaded into process environment)
/// 4. `.env.{profile}` file (loaded into process environment)
/// 5. Environment variables (`CANDLE_DATABASE_URL` overrides `candle.database.url`)
///
/// `.env` files never overwrite already-set environment variables.
///
/// Profile is determined by: `CANDLE_PROFILE` env var > argument > default `"dev"`.
#[derive(Debug, Clone)]
pub struct CandleConfig {
    values: HashMap<String, ConfigValue>,
    profile: String,
}

impl CandleConfig {
    /// Load configuration for the given profile from the current working directory.
    pub fn load(profile: &str) -> Result<Self, ConfigError> {
        Self::load_from(Path::new("."), profile)
    }

    /// Load configuration for the given profile from `dir`.
    pub fn load_from(dir: &Path, profile: &str) -> Result<Self, ConfigError> {
        let active_profile =
            std::env::var("CANDLE_PROFILE").unwrap_or_else(|_| profile.to_string());

        let mut values = HashMap::new();

        loader::load_yaml_file(&dir.join("candle.yaml"), &mut values)?;
        loader::load_yaml_file(&dir.join(format!("candle-{active_profile}.yaml")), &mut values)?;

        // Does NOT overwrite existing env vars
        let _ = dotenvy::from_path(dir.join(".env"));
        let _ = dotenvy::from_path(dir.join(format!(".env.{active_profile}")));

        for (env_key, env_val) in std::env::vars() {
            if let Some(config_key) = loader::env_key(&env_key) {
                values.insert(config_key, ConfigValue::String(env_val));
            }
        }

        Ok(CandleConfig {
            values,
            profile: active_profile,
        })
    }

    /// Create a config from a YAML string (useful for testing).
    pub fn from_yaml_str(yaml: &str, profile: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        loader::load_yaml_str(yaml, &mut values)?;
        Ok(CandleConfig {
            values,
            profile: profile.to_string(),
        })
    }

    /// Create an empty config (useful for testing).
    pub fn empty() -> Self {
        CandleConfig {
            values: HashMap::new(),
            profile: "test".to_string(),
        }
    }

    /// Set a value programmatically.
    pub fn set(&mut self, key: &str, value: ConfigValue) {
        self.values.insert(key.to_string(), value);
    }

    /// Get a typed value for the given dot-separated key.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if the key does not exist, or
    /// `ConfigError::TypeMismatch` if the value cannot be converted.
    pub fn get<V: FromConfigValue>(&self, key: &str) -> Result<V, ConfigError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))?;
        V::from_config_value(value, key)
    }

    /// Get a typed value, `None` when the key is missing.
    ///
    /// Unlike `get_or`, a present but malformed value is still an error.
    pub fn get_opt<V: FromConfigValue>(&self, key: &str) -> Result<Option<V>, ConfigError> {
        match self.values.get(key) {
            Some(value) => Option::<V>::from_config_value(value, key),
            None => Ok(None),
        }
    }

    /// Get a typed value, returning a default if the key is missing.
    pub fn get_or<V: FromConfigValue>(&self, key: &str, default: V) -> V {
        self.get(key).unwrap_or(default)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// The active profile name.
    pub fn profile(&self) -> &str {
        &self.profile
    }
}

/// Settings applied by a [`Session`](crate::Session) and handed to the
/// backend when it connects.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deferred connection string, used lazily on first cursor.
    pub url: Option<String>,
    /// Server-side `statement_timeout`; `None` keeps the server default.
    pub statement_timeout: Option<Duration>,
    pub application_name: Option<String>,
    /// When false, a second `set_connection`/`set_connection_string` fails
    /// with `AlreadyConfigured`.
    pub allow_reconfigure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: None,
            statement_timeout: None,
            application_name: None,
            allow_reconfigure: true,
        }
    }
}

impl SessionConfig {
    pub const URL_KEY: &'static str = "candle.database.url";
    pub const TIMEOUT_KEY: &'static str = "candle.database.timeout";
    pub const APPLICATION_KEY: &'static str = "candle.database.application";
    pub const RECONFIGURE_KEY: &'static str = "candle.session.reconfigure";

    /// Read session settings from a loaded config.
    ///
    /// `candle.database.timeout` is in milliseconds.
    pub fn from_config(config: &CandleConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            url: config.get_opt(Self::URL_KEY)?,
            statement_timeout: config
                .get_opt::<u64>(Self::TIMEOUT_KEY)?
                .map(Duration::from_millis),
            application_name: config.get_opt(Self::APPLICATION_KEY)?,
            allow_reconfigure: config.get_opt(Self::RECONFIGURE_KEY)?.unwrap_or(true),
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    pub fn single_configuration(mut self) -> Self {
        self.allow_reconfigure = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_session_config_from_yaml() {
        let config = CandleConfig::from_yaml_str(
            r#"
candle:
  database:
    url: postgres://app@localhost/shop
    timeout: 2500
    application: inventory
  session:
    reconfigure: false
"#,
            "test",
        )
        .unwrap();

        let session = SessionConfig::from_config(&config).unwrap();
        assert_eq!(session.url.as_deref(), Some("postgres://app@localhost/shop"));
        assert_eq!(session.statement_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(session.application_name.as_deref(), Some("inventory"));
        assert!(!session.allow_reconfigure);
    }

    #[test]
    fn test_session_config_defaults() {
        let session = SessionConfig::from_config(&CandleConfig::empty()).unwrap();
        assert!(session.url.is_none());
        assert!(session.statement_timeout.is_none());
        assert!(session.allow_reconfigure);
    }

    #[test]
    fn test_malformed_timeout_is_an_error() {
        let config =
            CandleConfig::from_yaml_str("candle:\n  database:\n    timeout: soon\n", "test")
                .unwrap();
        let err = SessionConfig::from_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { .. }));
    }

    #[test]
    fn test_get_missing_key() {
        let config = CandleConfig::empty();
        let err = config.get::<String>("candle.database.url").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
        assert_eq!(config.get_or("candle.database.url", "fallback".to_string()), "fallback");
    }

    #[test]
    #[serial]
    fn test_load_from_dir_with_profile_and_env() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("candle.yaml"),
            "candle:\n  database:\n    url: postgres://base/db\n    timeout: 100\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("candle-staging.yaml"),
            "candle:\n  database:\n    timeout: 900\n",
        )
        .unwrap();

        std::env::set_var("CANDLE_DATABASE_APPLICATION", "from-env");
        let config = CandleConfig::load_from(dir.path(), "staging").unwrap();
        std::env::remove_var("CANDLE_DATABASE_APPLICATION");

        assert_eq!(config.profile(), "staging");
        assert_eq!(
            config.get::<String>("candle.database.url").unwrap(),
            "postgres://base/db"
        );
        assert_eq!(config.get::<i64>("candle.database.timeout").unwrap(), 900);
        assert_eq!(
            config.get::<String>("candle.database.application").unwrap(),
            "from-env"
        );
    }
}
