//! Application configuration.
//!
//! Resolution order (highest priority first):
//! 1. Command-line flags (applied by the binary)
//! 2. Environment variables (`EMOTIONAID_*`)
//! 3. `<data_dir>/config.toml`
//! 4. Compiled defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CompanionError, CompanionResult};
use crate::gateway::ChatParams;
use crate::queue::DEFAULT_MAX_ATTEMPTS;

/// Config file name inside the data directory
pub const CONFIG_FILE: &str = "config.toml";

/// Directory name under the platform data directory
pub const APP_DIR_NAME: &str = "EmotionAid";

pub const ENV_API_BASE_URL: &str = "EMOTIONAID_API_BASE_URL";
pub const ENV_API_TOKEN: &str = "EMOTIONAID_API_TOKEN";
pub const ENV_MODEL: &str = "EMOTIONAID_MODEL";

/// Default data directory: `<platform data dir>/EmotionAid`.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Connection settings for the companion server.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Retries of a transient failure within one call
    pub max_retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/".to_string(),
            api_token: None,
            timeout_secs: 30,
            max_retries: crate::gateway::retry::DEFAULT_MAX_RETRIES,
        }
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Background synchronization settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between connectivity checks
    pub interval_secs: u64,
    /// Failed deliveries after which a queued item is dropped
    pub max_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where every local file lives; not read from the config file
    #[serde(skip)]
    pub data_dir: PathBuf,
    pub api: ApiConfig,
    pub chat: ChatParams,
    pub sync: SyncConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            api: ApiConfig::default(),
            chat: ChatParams::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load the configuration for `data_dir`: the config file if present,
    /// then environment overrides.
    pub fn load(data_dir: impl Into<PathBuf>) -> CompanionResult<Self> {
        let data_dir = data_dir.into();
        let path = data_dir.join(CONFIG_FILE);

        let mut config = match std::fs::read_to_string(&path) {
            Ok(content) => {
                debug!(path = %path.display(), "Loaded config file");
                Self::from_toml(&content)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(e.into()),
        };
        config.data_dir = data_dir;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> CompanionResult<Self> {
        toml::from_str(content)
            .map_err(|e| CompanionError::Config(format!("invalid {}: {}", CONFIG_FILE, e)))
    }

    /// Write the config file into the data directory.
    pub fn save(&self) -> CompanionResult<PathBuf> {
        self.validate()?;
        let content = toml::to_string_pretty(self)
            .map_err(|e| CompanionError::Serialization(e.to_string()))?;
        std::fs::create_dir_all(&self.data_dir)?;
        let path = self.data_dir.join(CONFIG_FILE);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Apply `EMOTIONAID_*` overrides; `lookup` reads a variable.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(url) = present(ENV_API_BASE_URL) {
            self.api.base_url = url;
        }
        if let Some(token) = present(ENV_API_TOKEN) {
            self.api.api_token = Some(token);
        }
        if let Some(model) = present(ENV_MODEL) {
            self.chat.model = model;
        }
    }

    pub fn validate(&self) -> CompanionResult<()> {
        let invalid = |field: &str, message: &str| {
            Err(CompanionError::Config(format!("{}: {}", field, message)))
        };
        if self.api.base_url.trim().is_empty() {
            return invalid("api.base_url", "must not be empty");
        }
        if self.api.timeout_secs == 0 {
            return invalid("api.timeout_secs", "must be greater than 0");
        }
        if self.sync.interval_secs == 0 {
            return invalid("sync.interval_secs", "must be greater than 0");
        }
        if self.sync.max_attempts == 0 {
            return invalid("sync.max_attempts", "must be greater than 0");
        }
        if !(0.0..=2.0).contains(&self.chat.temperature) {
            return invalid("chat.temperature", "must be between 0.0 and 2.0");
        }
        if !(0.0..=1.0).contains(&self.chat.top_p) {
            return invalid("chat.top_p", "must be between 0.0 and 1.0");
        }
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
