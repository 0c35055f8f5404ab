use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

pub const API_URL_ENV: &str = "FORMFLOW_API_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FormflowConfig {
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub forms: FormsConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "/api".to_string(),
            timeout_ms: 30_000,
            retry_attempts: 3,
            retry_delay_ms: 1_000,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// Key under which the bearer token is kept in persistent storage.
    pub token_key: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_key: "auth_token".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct FormsConfig {
    pub max_file_size: u64,
    pub max_files: usize,
    pub allowed_file_types: Vec<String>,
    pub autosave_interval_ms: u64,
}

impl Default for FormsConfig {
    fn default() -> Self {
        Self {
            max_file_size: 5 * 1024 * 1024,
            max_files: 5,
            allowed_file_types: [
                "image/jpeg",
                "image/png",
                "image/gif",
                "application/pdf",
                "application/msword",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            autosave_interval_ms: 30_000,
        }
    }
}

impl FormsConfig {
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms)
    }
}

impl FormflowConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(base_url) = std::env::var(API_URL_ENV) {
            let base_url = base_url.trim();
            if !base_url.is_empty() {
                tracing::debug!(base_url, "api base url overridden from environment");
                self.api.base_url = base_url.to_string();
            }
        }
        self
    }
}
