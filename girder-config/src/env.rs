// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;

/// Default prefix for Girder settings: `GIRDER_PORT`, `GIRDER_LOG_LEVEL`, ...
pub const DEFAULT_PREFIX: &str = "GIRDER";

/// Environment variable loader
///
/// With a prefix, only `PREFIX_*` variables are read and the prefix is
/// stripped; keys are lowercased either way.
#[derive(Debug, Clone)]
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Load all matching environment variables
    pub fn load(&self) -> HashMap<String, String> {
        env::vars()
            .filter_map(|(key, value)| self.strip(&key).map(|key| (key.to_lowercase(), value)))
            .collect()
    }

    fn strip<'k>(&self, key: &'k str) -> Option<&'k str> {
        match &self.prefix {
            Some(prefix) => key
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('_'))
                .filter(|rest| !rest.is_empty()),
            None => Some(key),
        }
    }

    /// Load a specific environment variable
    pub fn load_var(&self, key: &str) -> Result<String> {
        let full_key = match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, key.to_uppercase()),
            None => key.to_uppercase(),
        };

        env::var(&full_key).map_err(ConfigError::EnvError)
    }

    /// Load with default value
    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(Some(DEFAULT_PREFIX.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // `std::env::set_var` is unsafe in edition 2024; the tests that mutate
    // the environment live in tests/integration_test.rs.

    #[test]
    fn test_load_var_or_default() {
        let loader = EnvLoader::new(None);
        assert_eq!(loader.load_var_or("GIRDER_NONEXISTENT_12345", "default"), "default");
    }

    #[test]
    fn test_missing_var() {
        let loader = EnvLoader::default();
        assert_eq!(loader.prefix(), Some("GIRDER"));
        assert!(loader.load_var("MISSING_VAR_67890").is_err());
    }

    #[test]
    fn test_prefix_stripping() {
        let loader = EnvLoader::new(Some("APP".to_string()));
        assert_eq!(loader.strip("APP_PORT"), Some("PORT"));
        assert_eq!(loader.strip("APPLICATION_PORT"), None);
        assert_eq!(loader.strip("APP_"), None);
        assert_eq!(EnvLoader::new(None).strip("PATH"), Some("PATH"));
    }
}
