pub mod agent;
pub mod agents;
pub mod config;
pub mod constants;
pub mod credential;
pub mod error;
pub mod llm;
pub mod orchestrator;

// Re-export key types
pub use agent::{AgentInfo, AgentRegistry, AgentResult, BaseAgent, OverwritePolicy, Request};
pub use config::Settings;
pub use credential::ApiKey;
pub use error::MeshError;
pub use llm::{LlmClient, LlmResponse, Message, Role};
pub use orchestrator::{
    DispatchMode, Orchestrator, OrchestratorEvent, OrchestratorResponse, RouteState, Selection,
    SelectionPolicy,
};
