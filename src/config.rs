//! Configuration loader and validator for the catalog client and pager.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::paging::PagingConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub catalog: Catalog,
    #[serde(default)]
    pub paging: PagingConfig,
    #[serde(default)]
    pub refresh: Refresh,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Remote catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Catalog {
    pub base_url: String,
    pub api_key: String,
    pub language: String,
}

/// One-shot refresh job settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Refresh {
    pub max_attempts: u32,
    pub max_backoff_seconds: u64,
}

impl Default for Refresh {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_backoff_seconds: 60,
        }
    }
}

impl App {
    /// Data directory with a leading `~/` expanded against `HOME`.
    pub fn resolved_data_dir(&self) -> String {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => match std::env::var("HOME") {
                Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
                Err(_) => self.data_dir.clone(),
            },
            None => self.data_dir.clone(),
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.app.resolved_data_dir())
    }

    /// Database URL, honouring a `DATABASE_URL` override.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/movies.db", self.app.resolved_data_dir()))
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

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    if cfg.catalog.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("catalog.base_url must be non-empty"));
    }
    if reqwest::Url::parse(&cfg.catalog.base_url).is_err() {
        return Err(ConfigError::Invalid("catalog.base_url must be a valid URL"));
    }
    if cfg.catalog.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("catalog.api_key must be non-empty"));
    }
    if cfg.catalog.language.trim().is_empty() {
        return Err(ConfigError::Invalid("catalog.language must be non-empty"));
    }

    if cfg.paging.page_size == 0 {
        return Err(ConfigError::Invalid("paging.page_size must be > 0"));
    }
    if cfg.paging.initial_load_size < cfg.paging.page_size {
        return Err(ConfigError::Invalid(
            "paging.initial_load_size must be >= paging.page_size",
        ));
    }

    if cfg.refresh.max_attempts == 0 {
        return Err(ConfigError::Invalid("refresh.max_attempts must be > 0"));
    }

    Ok(())
}

/// Returns a complete sample configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

catalog:
  base_url: "https://api.themoviedb.org/3/"
  api_key: "YOUR_TMDB_API_KEY"
  language: "en-US"

paging:
  page_size: 20
  prefetch_distance: 5
  initial_load_size: 40
  launch_initial_refresh: true

refresh:
  max_attempts: 3
  max_backoff_seconds: 60
"#
}
