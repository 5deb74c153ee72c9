use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::agent::OverwritePolicy;
use crate::constants::{agents, defaults, endpoints, keys, models};
use crate::credential::ApiKey;
use crate::error::MeshError;
use crate::llm::{GeminiClient, LlmClient, OpenAIClient};
use crate::orchestrator::KeywordPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub llm: LlmSettings,
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    #[serde(default = "default_selection")]
    pub selection: KeywordPolicy,
}

/// Keyword routing for the standard roster: general questions nobody
/// matches go to the answer synthesiser.
fn default_selection() -> KeywordPolicy {
    KeywordPolicy::default().with_fallback(agents::ANSWER_SYNTHESISER)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    /// HTTP timeout per LLM call; 0 means no limit.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl LlmSettings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

fn default_llm_timeout() -> u64 {
    defaults::LLM_TIMEOUT_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Gemini,
    /// Any OpenAI-compatible chat completions endpoint.
    OpenAI,
}

impl LlmProvider {
    pub fn default_model(&self) -> &str {
        match self {
            LlmProvider::Gemini => models::DEFAULT_GEMINI_MODEL,
            LlmProvider::OpenAI => models::DEFAULT_OPENAI_MODEL,
        }
    }

    pub fn default_base_url(&self) -> &str {
        match self {
            LlmProvider::Gemini => endpoints::GEMINI_BASE_URL,
            LlmProvider::OpenAI => endpoints::OPENAI_BASE_URL,
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(LlmProvider::Gemini),
            "openai" => Ok(LlmProvider::OpenAI),
            other => Err(MeshError::Config(format!("Unknown LLM provider: {other}"))),
        }
    }
}

/// Dispatch limits and aggregation behaviour. Timeouts of 0 mean "no limit".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub agent_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub cancel_grace_ms: u64,
    /// Request key under which pipeline stages see earlier stages' data.
    /// `Orchestrator::with_credential` points the synthesiser at it.
    pub pipeline_key: String,
    pub follow_handoffs: bool,
    pub max_handoffs: usize,
    pub history_limit: usize,
    pub overwrite_policy: OverwritePolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            agent_timeout_ms: defaults::AGENT_TIMEOUT_SECS * 1000,
            request_timeout_ms: defaults::REQUEST_TIMEOUT_SECS * 1000,
            cancel_grace_ms: defaults::CANCEL_GRACE_MS,
            pipeline_key: keys::CONTEXT.to_string(),
            follow_handoffs: true,
            max_handoffs: defaults::MAX_HANDOFFS,
            history_limit: defaults::HISTORY_LIMIT,
            overwrite_policy: OverwritePolicy::Warn,
        }
    }
}

impl OrchestratorSettings {
    pub fn agent_timeout(&self) -> Option<Duration> {
        (self.agent_timeout_ms > 0).then(|| Duration::from_millis(self.agent_timeout_ms))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm: LlmSettings {
                provider: LlmProvider::Gemini,
                model: models::DEFAULT_GEMINI_MODEL.to_string(),
                api_key_env: defaults::API_KEY_ENV.to_string(),
                base_url: None,
                max_tokens: defaults::MAX_TOKENS,
                timeout_secs: defaults::LLM_TIMEOUT_SECS,
            },
            orchestrator: OrchestratorSettings::default(),
            selection: default_selection(),
        }
    }
}

impl Settings {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("agentmesh")
            .join("config.toml")
    }

    /// Load from the default location, falling back to defaults when the
    /// file is missing or unreadable.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(settings) => return settings,
                Err(e) => tracing::warn!("Ignoring {}: {}", config_path.display(), e),
            }
        }
        Self::default()
    }

    pub fn load_from(path: &Path) -> Result<Self, MeshError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| MeshError::Config(e.to_string()))
    }

    pub fn save(&self) -> Result<(), MeshError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), MeshError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| MeshError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Read the API key from the environment variable named in settings.
    pub fn api_key(&self) -> Option<ApiKey> {
        std::env::var(&self.llm.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .map(ApiKey::new)
    }

    /// Build the generative-service client the LLM-backed agents share.
    pub fn build_llm_client(&self, api_key: ApiKey) -> Result<Arc<dyn LlmClient>, MeshError> {
        let base_url = self
            .llm
            .base_url
            .clone()
            .unwrap_or_else(|| self.llm.provider.default_base_url().to_string());
        let timeout = self.llm.timeout().unwrap_or(Duration::ZERO);

        match self.llm.provider {
            LlmProvider::Gemini => {
                if api_key.is_empty() {
                    return Err(MeshError::Config(format!(
                        "Gemini needs an API key (set {})",
                        self.llm.api_key_env
                    )));
                }
                Ok(Arc::new(
                    GeminiClient::new(api_key)
                        .with_model(self.llm.model.clone())
                        .with_base_url(base_url)
                        .with_max_tokens(self.llm.max_tokens)
                        .with_timeout(timeout),
                ))
            }
            LlmProvider::OpenAI => Ok(Arc::new(
                OpenAIClient::new(api_key)
                    .with_model(self.llm.model.clone())
                    .with_base_url(base_url)
                    .with_max_tokens(self.llm.max_tokens)
                    .with_timeout(timeout),
            )),
        }
    }
}
