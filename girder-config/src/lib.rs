// Configuration management for the Girder framework
//
// Settings are layered: files first, then environment variables, so the
// environment always wins. Keys are lowercase; nested tables are reached
// with dotted keys (`logging.level`).

pub mod config_service;
pub mod env;
pub mod error;
pub mod loader;
pub mod server;
pub mod validation;

pub use config_service::{ConfigService, ConfigServiceBuilder};
pub use env::{DEFAULT_PREFIX, EnvLoader};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use server::ServerConfig;
pub use validation::{ConfigValidator, Validate};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Main configuration manager
#[derive(Clone, Debug, Default)]
pub struct ConfigManager {
    config: Arc<RwLock<BTreeMap<String, Value>>>,
    env_prefix: Option<String>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with environment variable prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            config: Arc::default(),
            env_prefix: Some(prefix.into()),
        }
    }

    /// Load configuration from environment variables
    pub fn load_env(&self) -> Result<()> {
        let env_vars = EnvLoader::new(self.env_prefix.clone()).load();
        debug!(count = env_vars.len(), prefix = ?self.env_prefix, "Loaded environment settings");

        let mut config = self.config.write();
        for (key, value) in env_vars {
            config.insert(key, Value::String(value));
        }

        Ok(())
    }

    /// Load a `.env` file into the process environment, then read the
    /// environment. Without a path a missing `.env` is not an error.
    pub fn load_dotenv(&self, path: Option<&Path>) -> Result<()> {
        match path {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
            }
            None => {
                if let Err(err) = dotenvy::dotenv() {
                    if !err.not_found() {
                        return Err(ConfigError::LoadError(err.to_string()));
                    }
                }
            }
        }
        self.load_env()
    }

    /// Load configuration from file, format detected from the extension
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = ConfigLoader::auto(path)?.load_file(path)?;
        debug!(path = %path.display(), "Loaded configuration file");
        self.merge_value(data);
        Ok(())
    }

    /// Merge the top-level entries of a JSON object
    pub fn merge_value(&self, data: Value) {
        if let Value::Object(map) = data {
            let mut config = self.config.write();
            for (key, value) in map {
                config.insert(key.to_lowercase(), value);
            }
        }
    }

    /// Set a configuration value
    pub fn set<T: serde::Serialize>(&self, key: &str, value: T) -> Result<()> {
        let json_value = serde_json::to_value(value)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;

        self.config.write().insert(key.to_lowercase(), json_value);
        Ok(())
    }

    /// Raw value for `key`. An exact key wins over a dotted path.
    pub fn value(&self, key: &str) -> Option<Value> {
        let key = key.to_lowercase();
        let config = self.config.read();

        if let Some(value) = config.get(&key) {
            return Some(value.clone());
        }

        let mut parts = key.split('.');
        let mut current = config.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current.clone())
    }

    /// Get a configuration value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .value(key)
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        serde_json::from_value(value).map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }

    /// Get a value that may arrive as a string (environment variables
    /// always do) or as a typed value (JSON, TOML).
    pub fn get_parsed<T>(&self, key: &str) -> Result<T>
    where
        T: DeserializeOwned + FromStr,
        T::Err: std::fmt::Display,
    {
        match self.value(key) {
            None => Err(ConfigError::KeyNotFound(key.to_string())),
            Some(Value::String(raw)) => raw.trim().parse().map_err(|e: T::Err| {
                ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                }
            }),
            Some(value) => serde_json::from_value(value).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// Get a configuration value with default
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        self.get(key)
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        self.get_parsed(key)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.get_parsed(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.value(key).is_some()
    }

    /// All top-level keys, sorted
    pub fn keys(&self) -> Vec<String> {
        self.config.read().keys().cloned().collect()
    }

    /// Merge configuration from another manager; `other` wins on conflicts
    pub fn merge(&self, other: &ConfigManager) {
        let other_config = other.config.read().clone();
        let mut config = self.config.write();
        config.extend(other_config);
    }

    /// Deserialize the whole configuration and validate it
    pub fn load_validated<T: DeserializeOwned + Validate>(&self) -> Result<T> {
        let json_value = Value::Object(self.config.read().clone().into_iter().collect());

        let validated: T = serde_json::from_value(json_value)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;
        validated.validate()?;

        Ok(validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let manager = ConfigManager::new();
        manager.set("Test_Key", "test_value").unwrap();

        let value: String = manager.get("test_key").unwrap();
        assert_eq!(value, "test_value");
    }

    #[test]
    fn test_get_or_default() {
        let manager = ConfigManager::new();
        let value: String = manager.get_or("missing_key", "default_value".to_string());
        assert_eq!(value, "default_value");
    }

    #[test]
    fn test_dotted_keys() {
        let manager = ConfigManager::new();
        manager.merge_value(serde_json::json!({"logging": {"level": "debug"}}));

        assert!(manager.has("logging.level"));
        assert_eq!(manager.get_string("logging.level").unwrap(), "debug");
        assert!(!manager.has("logging.format"));
    }

    #[test]
    fn test_parsed_values() {
        let manager = ConfigManager::new();
        manager.set("port", "8081").unwrap();
        manager.set("workers", 4).unwrap();
        manager.set("debug", "true").unwrap();
        manager.set("bad_port", "eighty").unwrap();

        assert_eq!(manager.get_parsed::<u16>("port").unwrap(), 8081);
        assert_eq!(manager.get_int("workers").unwrap(), 4);
        assert!(manager.get_bool("debug").unwrap());

        let err = manager.get_parsed::<u16>("bad_port").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "bad_port"));
    }

    #[test]
    fn test_merge_overrides() {
        let base = ConfigManager::new();
        base.set("port", 8080).unwrap();
        base.set("hostname", "0.0.0.0").unwrap();

        let overrides = ConfigManager::new();
        overrides.set("port", 9090).unwrap();

        base.merge(&overrides);
        assert_eq!(base.get_int("port").unwrap(), 9090);
        assert_eq!(base.keys(), vec!["hostname", "port"]);
    }
}
