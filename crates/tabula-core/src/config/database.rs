//! Database connection configuration.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::dialect::Dialect;

/// Connection pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL (`postgres://`, `mysql://`, `sqlite:`).
    #[serde(default)]
    pub url: Option<String>,

    /// Explicit dialect. Inferred from the URL scheme when absent.
    #[serde(default, rename = "dialect")]
    pub dialect_override: Option<Dialect>,

    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            dialect_override: None,
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

impl DatabaseConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Connection URL, required for anything that connects.
    pub fn url(&self) -> Result<&str, ConfigError> {
        self.url
            .as_deref()
            .ok_or_else(|| ConfigError::Config("database.url is not set".to_string()))
    }

    /// Effective dialect: the configured one, else inferred from the URL.
    pub fn dialect(&self) -> Result<Dialect, ConfigError> {
        if let Some(dialect) = self.dialect_override {
            return Ok(dialect);
        }
        let url = self.url()?;
        Dialect::from_url(url).ok_or_else(|| {
            ConfigError::Config(format!("cannot infer SQL dialect from url '{}'", url))
        })
    }
}
