// Configuration file loaders

use crate::{ConfigError, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
    Env,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            "env" => Some(FileFormat::Env),
            _ => None,
        }
    }

    /// Detect the format of `path`. A bare `.env` file counts as `Env`.
    pub fn detect(path: &Path) -> Result<Self> {
        if path.file_name().and_then(|n| n.to_str()) == Some(".env") {
            return Ok(FileFormat::Env);
        }

        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                ConfigError::LoadError(format!("No file extension found: {}", path.display()))
            })?;

        FileFormat::from_extension(ext)
            .ok_or_else(|| ConfigError::LoadError(format!("Unsupported format: {ext}")))
    }
}

/// Configuration file loader
pub struct ConfigLoader {
    format: FileFormat,
}

impl ConfigLoader {
    pub fn new(format: FileFormat) -> Self {
        Self { format }
    }

    /// Auto-detect format from file extension
    pub fn auto(path: impl AsRef<Path>) -> Result<Self> {
        FileFormat::detect(path.as_ref()).map(Self::new)
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// Load configuration from file
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::LoadError(format!("Failed to read {}: {e}", path.display()))
        })?;

        self.parse(&content)
    }

    /// Parse configuration from a string. The result is always a JSON object.
    pub fn parse(&self, content: &str) -> Result<Value> {
        let value = match self.format {
            FileFormat::Json => parse_json(content)?,
            FileFormat::Toml => parse_toml(content)?,
            FileFormat::Env => parse_env(content)?,
        };

        match value {
            Value::Object(_) => Ok(value),
            other => Err(ConfigError::ParseError(format!(
                "expected a table of settings at the top level, found {}",
                kind_of(&other)
            ))),
        }
    }
}

fn parse_json(content: &str) -> Result<Value> {
    serde_json::from_str(content).map_err(|e| ConfigError::ParseError(format!("JSON parse error: {e}")))
}

fn parse_toml(content: &str) -> Result<Value> {
    let table: toml::Table = toml::from_str(content)
        .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {e}")))?;

    serde_json::to_value(table).map_err(|e| ConfigError::SerializationError(e.to_string()))
}

/// `KEY=value` lines; keys are lowercased to match environment loading.
fn parse_env(content: &str) -> Result<Value> {
    let mut map = serde_json::Map::new();

    for item in dotenvy::from_read_iter(content.as_bytes()) {
        let (key, value) =
            item.map_err(|e| ConfigError::ParseError(format!(".env parse error: {e}")))?;
        map.insert(key.to_lowercase(), Value::String(value));
    }

    Ok(Value::Object(map))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
