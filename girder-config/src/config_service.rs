// ConfigService - injectable configuration

use crate::{ConfigManager, DEFAULT_PREFIX, Result, ServerConfig};
use async_trait::async_trait;
use girder_core::{Dependencies, Dependency, Injectable};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use tracing::debug;

/// Environment variable naming an optional settings file.
pub const CONFIG_FILE_VAR: &str = "GIRDER_CONFIG_FILE";

/// Configuration available to controllers and services through the container.
///
/// As an injectable it is built from `.env`, the file named by
/// `GIRDER_CONFIG_FILE` (if any) and `GIRDER_*` environment variables.
#[derive(Clone, Debug)]
pub struct ConfigService {
    manager: ConfigManager,
}

impl ConfigService {
    pub fn from_manager(manager: ConfigManager) -> Self {
        Self { manager }
    }

    pub fn builder() -> ConfigServiceBuilder {
        ConfigServiceBuilder::new()
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.manager.get(key)
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.manager.get_or(key, default)
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        self.manager.get_string(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.manager.has(key)
    }

    pub fn server(&self) -> Result<ServerConfig> {
        ServerConfig::from_manager(&self.manager)
    }

    pub fn manager(&self) -> &ConfigManager {
        &self.manager
    }

    fn config_file() -> Option<PathBuf> {
        std::env::var_os(CONFIG_FILE_VAR).map(PathBuf::from)
    }
}

#[async_trait]
impl Injectable for ConfigService {
    /// Checks the settings file is readable before any class is constructed,
    /// so a bad path aborts startup.
    async fn register() -> girder_core::Result<Vec<Dependency>> {
        if let Some(path) = Self::config_file() {
            let metadata = tokio::fs::metadata(&path).await?;
            if !metadata.is_file() {
                return Err(girder_core::Error::internal(format!(
                    "{CONFIG_FILE_VAR} does not name a file: {}",
                    path.display()
                )));
            }
            debug!(path = %path.display(), "Configuration file found");
        }
        Ok(vec![])
    }

    fn construct(_deps: &mut Dependencies) -> girder_core::Result<Self> {
        let mut builder = ConfigService::builder().load_dotenv(None);
        if let Some(path) = Self::config_file() {
            builder = builder.add_file(path);
        }
        Ok(builder.load_env().build()?)
    }
}

/// Builder for ConfigService
#[derive(Debug)]
pub struct ConfigServiceBuilder {
    manager: ConfigManager,
    load_env: bool,
    load_dotenv: bool,
    dotenv_path: Option<PathBuf>,
    config_files: Vec<PathBuf>,
}

impl ConfigServiceBuilder {
    pub fn new() -> Self {
        Self {
            manager: ConfigManager::with_prefix(DEFAULT_PREFIX),
            load_env: false,
            load_dotenv: false,
            dotenv_path: None,
            config_files: Vec::new(),
        }
    }

    /// Replace the `GIRDER` environment prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.manager = ConfigManager::with_prefix(prefix);
        self
    }

    /// Read prefixed environment variables after every file
    pub fn load_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Load a `.env` file into the process environment first
    pub fn load_dotenv(mut self, path: Option<PathBuf>) -> Self {
        self.load_dotenv = true;
        self.dotenv_path = path;
        self
    }

    pub fn add_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_files.push(path.into());
        self
    }

    /// Files load in the order added; environment variables override them.
    pub fn build(self) -> Result<ConfigService> {
        if self.load_dotenv {
            match self.dotenv_path.as_deref() {
                Some(path) => {
                    dotenvy::from_path(path)
                        .map_err(|e| crate::ConfigError::LoadError(e.to_string()))?;
                }
                None => {
                    dotenvy::dotenv().ok();
                }
            }
        }

        for path in &self.config_files {
            self.manager.load_file(path)?;
        }

        if self.load_env {
            self.manager.load_env()?;
        }

        Ok(ConfigService::from_manager(self.manager))
    }
}

impl Default for ConfigServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
