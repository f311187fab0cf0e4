use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::pipeline::{EmptyLabelPolicy, DEFAULT_MAX_TEXTS};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct EmbedvizConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub providers: ProvidersConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    pub delimiter: char,
    pub empty_labels: EmptyLabelPolicy,
    pub max_texts: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: OpenAiConfig,
    pub gemini: GeminiConfig,
    pub cloudflare: CloudflareConfig,
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_batch_size: usize,
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_concurrency: usize,
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct CloudflareConfig {
    pub api_key: Option<String>,
    pub account_id: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_concurrency: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            log_level: "info".into(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            empty_labels: EmptyLabelPolicy::Drop,
            max_texts: DEFAULT_MAX_TEXTS,
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://api.openai.com/v1/embeddings".into(),
            model: "text-embedding-ada-002".into(),
            timeout_secs: 30,
            max_batch_size: 512,
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            model: "embedding-001".into(),
            timeout_secs: 30,
            max_concurrency: 4,
        }
    }
}

impl Default for CloudflareConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            account_id: None,
            base_url: "https://api.cloudflare.com/client/v4".into(),
            model: "@cf/baai/bge-large-en-v1.5".into(),
            timeout_secs: 30,
            max_concurrency: 4,
        }
    }
}

/// Stand-in printed for credentials in `Debug` output.
fn redacted(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "<redacted>")
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &redacted(&self.api_key))
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_batch_size", &self.max_batch_size)
            .finish()
    }
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &redacted(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

// The account id is part of every request URL, so it is treated as a secret too.
impl std::fmt::Debug for CloudflareConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareConfig")
            .field("api_key", &redacted(&self.api_key))
            .field("account_id", &redacted(&self.account_id))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

/// Returns `~/.embedviz/`
pub fn default_embedviz_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".embedviz"))
}

/// Returns the default config file path: `~/.embedviz/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    default_embedviz_dir().map(|dir| dir.join("config.toml"))
}

impl EmbedvizConfig {
    /// Load config from the default TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        match default_config_path() {
            Some(path) => Self::load_from(path),
            None => {
                info!("no home directory, using default config");
                let mut config = EmbedvizConfig::default();
                config.apply_env_overrides();
                Ok(config)
            }
        }
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            EmbedvizConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Provider credentials use the variable names the providers document
    /// (`OPENAI_API_KEY`, `GOOGLE_API_KEY`, `CLOUDFLARE_API_KEY`,
    /// `CLOUDFLARE_ACCOUNT_ID`); server settings use the `EMBEDVIZ_` prefix.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            self.providers.openai.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("GOOGLE_API_KEY") {
            self.providers.gemini.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("CLOUDFLARE_API_KEY") {
            self.providers.cloudflare.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("CLOUDFLARE_ACCOUNT_ID") {
            self.providers.cloudflare.account_id = Some(val);
        }
        if let Ok(val) = std::env::var("EMBEDVIZ_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("EMBEDVIZ_PORT") {
            match val.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid EMBEDVIZ_PORT"),
            }
        }
        if let Ok(val) = std::env::var("EMBEDVIZ_LOG_LEVEL") {
            self.server.log_level = val;
        }
    }

    /// `host:port` for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
