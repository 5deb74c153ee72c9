use crate::agent::{AgentResult, Request};
use crate::error::MeshError;
use serde::{Deserialize, Serialize};

/// Name and capability list of a registered agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    pub capabilities: Vec<String>,
}

/// The contract every agent implements.
///
/// `process` reports task failures (missing input, downstream errors,
/// timeouts) as `Ok(AgentResult::failure(..))`. Returning `Err` is a contract
/// violation: the orchestrator still converts it into a failed result, but
/// logs it as a defect.
#[async_trait::async_trait]
pub trait BaseAgent: Send + Sync {
    /// Registry key. Must not change over the agent's lifetime.
    fn name(&self) -> &str;

    /// Static, ordered description of what the agent handles.
    fn capabilities(&self) -> Vec<String>;

    async fn process(&self, input: &Request) -> Result<AgentResult, MeshError>;

    fn info(&self) -> AgentInfo {
        AgentInfo {
            name: self.name().to_string(),
            capabilities: self.capabilities(),
        }
    }
}
