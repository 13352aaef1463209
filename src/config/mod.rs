use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub object_store: ObjectStoreConfig,
    pub transcription: TranscriptionConfig,
    pub server: ServerConfig,
}

/// Credentials for the chat-completion summarization endpoint.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

/// Credentials for the remote object store.
///
/// Environment variables take precedence over the stored document:
/// `OSS_REGION`, `OSS_ACCESS_KEY_ID`, `OSS_ACCESS_KEY_SECRET`,
/// `OSS_BUCKET`. The user can therefore deploy with env-only secrets
/// and leave this section empty.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStoreConfig {
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub access_key_secret: Option<String>,
    pub bucket: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    /// Overridden by `DASHSCOPE_API_KEY` when set.
    pub api_key: Option<String>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            base_url: Some("https://dashscope.aliyuncs.com/api/v1".to_string()),
            model: Some("paraformer-v2".to_string()),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3990 }
    }
}

impl ObjectStoreConfig {
    /// Resolve the effective credentials, field by field, with the
    /// process environment taking precedence over the stored document.
    pub fn resolved(&self) -> Self {
        self.resolved_with(|name| std::env::var(name).ok())
    }

    pub fn resolved_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let pick = |env_name: &str, stored: &Option<String>| {
            lookup(env_name)
                .filter(|v| !v.is_empty())
                .or_else(|| stored.clone().filter(|v| !v.is_empty()))
        };

        Self {
            region: pick("OSS_REGION", &self.region),
            access_key_id: pick("OSS_ACCESS_KEY_ID", &self.access_key_id),
            access_key_secret: pick("OSS_ACCESS_KEY_SECRET", &self.access_key_secret),
            bucket: pick("OSS_BUCKET", &self.bucket),
        }
    }
}

impl TranscriptionConfig {
    pub fn effective_api_key(&self) -> Option<String> {
        std::env::var("DASHSCOPE_API_KEY")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.api_key.clone().filter(|v| !v.is_empty()))
    }
}

/// Loads and saves the config document at a fixed path.
///
/// Clients re-read through this store rather than holding a `Config`,
/// so credential edits made over the API are picked up without a
/// restart.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn at_default_location() -> Result<Self> {
        Ok(Self::new(crate::global::config_file()?))
    }

    pub fn load(&self) -> Result<Config> {
        if !self.path.exists() {
            info!("Config file not found, creating default at {:?}", self.path);
            let config = Config::default();
            self.save(&config)?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&self.path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
        std::fs::write(&self.path, content).context("Failed to write config file")?;

        Ok(())
    }
}
