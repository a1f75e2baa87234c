// Server settings: driver, logging and listen address

use crate::{ConfigError, ConfigManager, ConfigValidator, DEFAULT_PREFIX, Result, Validate};
use girder_core::logging::{LogFormat, LogLevel};
use girder_core::{ApplicationOptions, DriverKind, ListenOptions};
use std::path::Path;

/// Everything an application needs to start.
///
/// Recognised keys (`GIRDER_`-prefixed in the environment):
/// `driver`, `log_level`, `log_format`, `hostname`, `port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub driver: Option<String>,
    pub log_level: Option<LogLevel>,
    pub log_format: Option<LogFormat>,
    pub hostname: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let listen = ListenOptions::default();
        Self {
            driver: None,
            log_level: None,
            log_format: None,
            hostname: listen.hostname,
            port: listen.port,
        }
    }
}

impl ServerConfig {
    /// Layer an optional settings file under `GIRDER_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let manager = ConfigManager::with_prefix(DEFAULT_PREFIX);
        if let Some(path) = path {
            manager.load_file(path)?;
        }
        manager.load_env()?;
        Self::from_manager(&manager)
    }

    /// Read the server keys out of `manager`; absent keys keep their defaults.
    pub fn from_manager(manager: &ConfigManager) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            driver: optional(manager.get_string("driver"))?,
            log_level: optional(manager.get_parsed("log_level"))?,
            log_format: optional(manager.get_parsed("log_format"))?,
            hostname: optional(manager.get_string("hostname"))?.unwrap_or(defaults.hostname),
            port: optional(manager.get_parsed("port"))?.unwrap_or(defaults.port),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn application_options(&self) -> ApplicationOptions {
        ApplicationOptions {
            driver: self.driver.clone(),
            log_level: self.log_level,
            log_format: self.log_format,
        }
    }

    pub fn listen_options(&self) -> ListenOptions {
        ListenOptions::new()
            .hostname(self.hostname.clone())
            .port(self.port)
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> Result<()> {
        ConfigValidator::not_empty(&self.hostname, "hostname")?;
        if let Some(driver) = &self.driver {
            driver
                .parse::<DriverKind>()
                .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        }
        Ok(())
    }
}

fn optional<T>(value: Result<T>) -> Result<Option<T>> {
    match value {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::KeyNotFound(_)) => Ok(None),
        Err(err) => Err(err),
    }
}
