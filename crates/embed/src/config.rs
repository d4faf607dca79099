use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::EmbedError;

/// Overrides `api_url` (and switches `mode` to `"api"`) when set.
pub const ENV_API_URL: &str = "ECHO_EMBED_API_URL";
/// Bearer token sent as the `Authorization` header.
pub const ENV_API_TOKEN: &str = "ECHO_EMBED_API_TOKEN";

/// Runtime configuration describing which provider to use and how to
/// post-process vectors.
///
/// # Example
/// ```
/// use embed::EmbedConfig;
///
/// let cfg = EmbedConfig {
///     mode: "api".into(),
///     api_url: Some("https://router.huggingface.co/hf-inference/models/BAAI/bge-small-en-v1.5/pipeline/feature-extraction".into()),
///     api_auth_header: Some("Bearer hf_xxx".into()),
///     api_provider: Some("hf".into()),
///     ..Default::default()
/// };
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbedConfig {
    /// `"stub"` (default, offline) or `"api"` (remote HTTP).
    pub mode: String,
    /// Label surfaced on every [`Embedding`](crate::Embedding). Defaults to
    /// `hashed-bow-<dimension>` for the stub and `custom` for the API.
    pub model_name: Option<String>,
    /// Output dimension of the stub provider. API providers return whatever
    /// the model produces.
    pub dimension: usize,
    /// Inference endpoint when [`mode`](Self::mode) is `"api"`.
    pub api_url: Option<String>,
    /// Authorization header (e.g. `"Bearer hf_xxx"`).
    pub api_auth_header: Option<String>,
    /// Remote provider hint: `"hf"`, `"openai"`, or `"custom"` (default).
    pub api_provider: Option<String>,
    /// Per-request HTTP timeout.
    pub api_timeout_ms: u64,
    /// Normalize the resulting vector to unit length.
    pub normalize: bool,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            mode: "stub".into(),
            model_name: None,
            dimension: 384,
            api_url: None,
            api_auth_header: None,
            api_provider: None,
            api_timeout_ms: 5_000,
            normalize: true,
        }
    }
}

impl EmbedConfig {
    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }

    /// Effective model label for the configured mode.
    pub fn resolved_model_name(&self) -> String {
        match (&self.model_name, self.mode.as_str()) {
            (Some(name), _) => name.clone(),
            (None, "api") => "custom".into(),
            (None, _) => format!("hashed-bow-{}", self.dimension),
        }
    }

    pub fn validate(&self) -> Result<(), EmbedError> {
        match self.mode.as_str() {
            "stub" => {
                if self.dimension == 0 {
                    return Err(EmbedError::InvalidConfig(
                        "dimension must be greater than 0".into(),
                    ));
                }
            }
            "api" => {
                let url = self.api_url.as_deref().unwrap_or_default();
                if url.trim().is_empty() {
                    return Err(EmbedError::InvalidConfig(
                        "api_url is required for api mode".into(),
                    ));
                }
                if self.api_timeout_ms == 0 {
                    return Err(EmbedError::InvalidConfig(
                        "api_timeout_ms must be greater than 0".into(),
                    ));
                }
            }
            other => {
                return Err(EmbedError::InvalidConfig(format!(
                    "unknown embed mode '{other}' (expected 'stub' or 'api')"
                )))
            }
        }
        Ok(())
    }

    /// Apply [`ENV_API_URL`] and [`ENV_API_TOKEN`] from the process
    /// environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Same as [`apply_env_overrides`](Self::apply_env_overrides) with an
    /// explicit lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.mode = "api".into();
            self.api_url = Some(url);
        }
        if let Some(token) = lookup(ENV_API_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.api_auth_header = Some(format!("Bearer {}", token.trim()));
        }
    }
}
