use crate::error::MeshError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub message: Message,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// The generative-service client used by LLM-backed agents.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a chat request and get the full response.
    async fn chat(&self, messages: &[Message]) -> Result<LlmResponse, MeshError>;

    /// Single-prompt convenience. An empty completion is an error.
    async fn generate(&self, prompt: &str) -> Result<String, MeshError> {
        let response = self.chat(&[Message::user(prompt)]).await?;
        let text = response.message.content;
        if text.trim().is_empty() {
            return Err(MeshError::Llm("Empty response from model".into()));
        }
        Ok(text)
    }
}
