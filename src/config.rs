//! YAML configuration for the analyzer stage.
//!
//! Every section is optional and falls back to its defaults, so an empty
//! file with just a version is a valid in-memory, stub-embedding setup.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! name: "echo-analyzer"
//!
//! storage:
//!   backend: "redb"
//!   path: "/data/echo.redb"
//!
//! embedding:
//!   mode: "api"
//!   api_url: "https://router.huggingface.co/hf-inference/models/BAAI/bge-small-en-v1.5/pipeline/feature-extraction"
//!   api_provider: "hf"
//!   model_name: "bge-small-en-v1.5"
//!
//! clustering:
//!   similarity_threshold: 0.8
//!   ema_alpha: 0.1
//!   max_topics: 20
//!   max_attempts: 3
//!   dimension: 384
//!
//! stage:
//!   embed_timeout_ms: 5000
//!   store_timeout_ms: 3000
//!   publish_timeout_ms: 3000
//!   forward_topic: "analyzed"
//!
//! queue:
//!   backend: "http"
//!   push_envelope: true
//!   endpoints:
//!     analyzed: "https://summarizer.internal/summarize"
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use cluster::ClusterConfig;
use embed::EmbedConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::queue::TOPIC_ANALYZED;
use crate::store::StorageConfig;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level configuration of the analyzer stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EchoConfig {
    /// Configuration format version
    pub version: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub storage: StorageYamlConfig,

    #[serde(default)]
    pub embedding: EmbedConfig,

    #[serde(default)]
    pub clustering: ClusterConfig,

    #[serde(default)]
    pub stage: StageYamlConfig,

    #[serde(default)]
    pub queue: QueueYamlConfig,
}

impl EchoConfig {
    /// Load a YAML file, then apply environment overrides and validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: EchoConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// `ECHO_EMBED_API_URL` / `ECHO_EMBED_API_TOKEN`.
    pub fn apply_env_overrides(&mut self) {
        self.embedding.apply_env_overrides();
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.storage.validate()?;
        self.embedding
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("embedding: {e}")))?;
        self.clustering
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("clustering: {e}")))?;
        if let Some(dimension) = self.clustering.dimension {
            if self.embedding.mode == "stub" && self.embedding.dimension != dimension {
                return Err(ConfigLoadError::Validation(format!(
                    "clustering.dimension ({dimension}) differs from embedding.dimension ({})",
                    self.embedding.dimension
                )));
            }
        }
        self.stage.validate()?;
        self.queue.validate(&self.stage.forward_topic)?;
        Ok(())
    }
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            storage: StorageYamlConfig::default(),
            embedding: EmbedConfig::default(),
            clustering: ClusterConfig::default(),
            stage: StageYamlConfig::default(),
            queue: QueueYamlConfig::default(),
        }
    }
}

/// Where documents, analyses and centroids live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageYamlConfig {
    /// `"in_memory"` or `"redb"`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Database file for the redb backend.
    #[serde(default)]
    pub path: Option<String>,
}

impl StorageYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.backend.as_str() {
            "in_memory" | "memory" => Ok(()),
            "redb" => match self.path.as_deref().map(str::trim) {
                Some(path) if !path.is_empty() => Ok(()),
                _ => Err(ConfigLoadError::Validation(
                    "storage.path is required for the redb backend".into(),
                )),
            },
            other => Err(ConfigLoadError::Validation(format!(
                "storage.backend must be 'in_memory' or 'redb', got '{other}'"
            ))),
        }
    }

    pub fn to_storage_config(&self) -> StorageConfig {
        match (self.backend.as_str(), &self.path) {
            ("redb", Some(path)) => StorageConfig::redb(path.clone()),
            _ => StorageConfig::in_memory(),
        }
    }
}

impl Default for StorageYamlConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: None,
        }
    }
}

/// Per-step timeouts and routing of the stage runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageYamlConfig {
    #[serde(default = "default_embed_timeout")]
    pub embed_timeout_ms: u64,

    /// Bound on document and analysis store calls.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,

    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_ms: u64,

    /// Topic the continuation `{doc_id}` is published to.
    #[serde(default = "default_forward_topic")]
    pub forward_topic: String,
}

impl StageYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        for (name, value) in [
            ("embed_timeout_ms", self.embed_timeout_ms),
            ("store_timeout_ms", self.store_timeout_ms),
            ("publish_timeout_ms", self.publish_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigLoadError::Validation(format!(
                    "stage.{name} must be > 0"
                )));
            }
        }
        if self.forward_topic.trim().is_empty() {
            return Err(ConfigLoadError::Validation(
                "stage.forward_topic must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

impl Default for StageYamlConfig {
    fn default() -> Self {
        Self {
            embed_timeout_ms: default_embed_timeout(),
            store_timeout_ms: default_store_timeout(),
            publish_timeout_ms: default_publish_timeout(),
            forward_topic: default_forward_topic(),
        }
    }
}

/// Outbound message queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueYamlConfig {
    /// `"in_memory"` or `"http"`.
    #[serde(default = "default_queue_backend")]
    pub backend: String,

    /// Topic name -> push endpoint, for the http backend.
    #[serde(default)]
    pub endpoints: HashMap<String, String>,

    /// Wrap outbound messages in a base64 push envelope.
    #[serde(default)]
    pub push_envelope: bool,
}

impl QueueYamlConfig {
    fn validate(&self, forward_topic: &str) -> Result<(), ConfigLoadError> {
        match self.backend.as_str() {
            "in_memory" | "memory" => Ok(()),
            "http" => {
                if self.endpoints.contains_key(forward_topic) {
                    Ok(())
                } else {
                    Err(ConfigLoadError::Validation(format!(
                        "queue.endpoints has no entry for forward topic '{forward_topic}'"
                    )))
                }
            }
            other => Err(ConfigLoadError::Validation(format!(
                "queue.backend must be 'in_memory' or 'http', got '{other}'"
            ))),
        }
    }
}

impl Default for QueueYamlConfig {
    fn default() -> Self {
        Self {
            backend: default_queue_backend(),
            endpoints: HashMap::new(),
            push_envelope: false,
        }
    }
}

fn default_storage_backend() -> String {
    "in_memory".to_string()
}
fn default_queue_backend() -> String {
    "in_memory".to_string()
}
fn default_embed_timeout() -> u64 {
    5_000
}
fn default_store_timeout() -> u64 {
    3_000
}
fn default_publish_timeout() -> u64 {
    3_000
}
fn default_forward_topic() -> String {
    TOPIC_ANALYZED.to_string()
}
