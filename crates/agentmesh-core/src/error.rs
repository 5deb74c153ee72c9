use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// An agent broke its contract by returning an error instead of a result.
    #[error("Agent error: {agent}: {message}")]
    Agent { agent: String, message: String },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Request cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl MeshError {
    pub fn agent(agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Agent {
            agent: agent.into(),
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Short machine-readable tag, stored in failed result metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownAgent(_) => "unknown_agent",
            Self::DuplicateAgent(_) => "duplicate_agent",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Agent { .. } => "agent",
            Self::Llm(_) => "llm",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Http(_) => "http",
            Self::Json(_) => "json",
            Self::Cancelled => "cancelled",
            Self::Other(_) => "other",
        }
    }
}

pub type Result<T> = std::result::Result<T, MeshError>;
