//! Configuration loader and validator for the petition store.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::identity::UrlSettings;
use crate::phase::{FixedPhase, Phase, PhaseFile, PhaseRegistry};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub phase: Phase,
    pub urls: Urls,
    pub documents: Documents,
    pub relational: Relational,
    pub shortener: Shortener,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// When set, the migration phase is read from this YAML file on every
    /// call instead of from the `phase` section.
    #[serde(default)]
    pub phase_file: Option<String>,
}

/// Canonical URL settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Urls {
    pub base_url: String,
    pub legacy_prefix: String,
    pub entity_prefix: String,
}

/// Document store API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Documents {
    pub base_url: String,
    pub token: String,
    pub collection: String,
}

/// Relational store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Relational {
    pub database_url: String,
    #[serde(default)]
    pub replica_url: Option<String>,
}

/// URL-shortening service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Shortener {
    pub endpoint: String,
    pub token: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    pub fn url_settings(&self) -> UrlSettings {
        UrlSettings {
            base_url: self.urls.base_url.trim_end_matches('/').to_string(),
            legacy_prefix: self.urls.legacy_prefix.trim_matches('/').to_string(),
            entity_prefix: self.urls.entity_prefix.trim_matches('/').to_string(),
        }
    }

    pub fn phase_registry(&self) -> PhaseRegistry {
        match self.app.phase_file.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(path) => PhaseRegistry::new(Arc::new(PhaseFile::new(path))),
            None => PhaseRegistry::new(Arc::new(FixedPhase(self.phase))),
        }
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn is_http_url(s: &str) -> bool {
    let s = s.trim();
    s.starts_with("http://") || s.starts_with("https://")
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    if !is_http_url(&cfg.urls.base_url) {
        return Err(ConfigError::Invalid("urls.base_url must be an http(s) URL"));
    }
    if cfg.urls.legacy_prefix.trim_matches('/').is_empty() {
        return Err(ConfigError::Invalid("urls.legacy_prefix must be non-empty"));
    }
    if cfg.urls.entity_prefix.trim_matches('/').is_empty() {
        return Err(ConfigError::Invalid("urls.entity_prefix must be non-empty"));
    }

    if !is_http_url(&cfg.documents.base_url) {
        return Err(ConfigError::Invalid("documents.base_url must be an http(s) URL"));
    }
    if cfg.documents.token.trim().is_empty() {
        return Err(ConfigError::Invalid("documents.token must be non-empty"));
    }
    if cfg.documents.collection.trim().is_empty() {
        return Err(ConfigError::Invalid("documents.collection must be non-empty"));
    }

    if cfg.relational.database_url.trim().is_empty() {
        return Err(ConfigError::Invalid("relational.database_url must be non-empty"));
    }
    if let Some(replica) = &cfg.relational.replica_url {
        if replica.trim().is_empty() {
            return Err(ConfigError::Invalid("relational.replica_url must be non-empty when set"));
        }
    }

    if !is_http_url(&cfg.shortener.endpoint) {
        return Err(ConfigError::Invalid("shortener.endpoint must be an http(s) URL"));
    }
    if cfg.shortener.token.trim().is_empty() {
        return Err(ConfigError::Invalid("shortener.token must be non-empty"));
    }

    Ok(())
}

/// Example configuration, also used by `petition-store --help` docs and tests.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  # phase_file: "./data/phase.yaml"

phase:
  mongo_read: true
  mongo_write: true
  mysql_read: false
  mysql_write: true

urls:
  base_url: "https://petitions.example.gov"
  legacy_prefix: "petition"
  entity_prefix: "petitions"

documents:
  base_url: "https://documents.example.internal/"
  token: "YOUR_DOCUMENT_API_TOKEN"
  collection: "petitions"

relational:
  database_url: "sqlite://./data/petitions.db"

shortener:
  endpoint: "https://short.example.gov/v1/shorten"
  token: "YOUR_SHORTENER_TOKEN"
"#
}
