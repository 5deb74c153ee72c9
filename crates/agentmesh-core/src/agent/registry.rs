use crate::agent::{AgentInfo, BaseAgent};
use crate::error::{MeshError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// What `register` does when the name is already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwritePolicy {
    /// Replace the existing agent and log a warning.
    #[default]
    Warn,
    /// Refuse with `DuplicateAgent`.
    Strict,
}

/// Named collection of live agents. Registration needs `&mut self`, lookups
/// only `&self`, so a registry shared behind an `Arc` is frozen.
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn BaseAgent>>,
    order: Vec<String>,
    policy: OverwritePolicy,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::with_policy(OverwritePolicy::default())
    }

    pub fn with_policy(policy: OverwritePolicy) -> Self {
        Self {
            agents: HashMap::new(),
            order: Vec::new(),
            policy,
        }
    }

    pub fn policy(&self) -> OverwritePolicy {
        self.policy
    }

    pub fn register(&mut self, name: impl Into<String>, agent: Arc<dyn BaseAgent>) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(MeshError::invalid("agent name must not be empty"));
        }
        if agent.name() != name {
            return Err(MeshError::invalid(format!(
                "agent '{}' cannot be registered under the name '{}'",
                agent.name(),
                name
            )));
        }

        if self.agents.contains_key(&name) {
            match self.policy {
                OverwritePolicy::Strict => return Err(MeshError::DuplicateAgent(name)),
                OverwritePolicy::Warn => {
                    tracing::warn!("Replacing registered agent '{}'", name);
                }
            }
        } else {
            self.order.push(name.clone());
        }

        tracing::debug!("Registered agent '{}'", name);
        self.agents.insert(name, agent);
        Ok(())
    }

    /// Register under the agent's own name.
    pub fn register_agent(&mut self, agent: Arc<dyn BaseAgent>) -> Result<()> {
        let name = agent.name().to_string();
        self.register(name, agent)
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn BaseAgent>> {
        let removed = self.agents.remove(name);
        if removed.is_some() {
            self.order.retain(|n| n != name);
        }
        removed
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn BaseAgent>> {
        self.agents
            .get(name)
            .cloned()
            .ok_or_else(|| MeshError::UnknownAgent(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn list_names(&self) -> BTreeSet<String> {
        self.agents.keys().cloned().collect()
    }

    /// Name and capabilities of every agent, in registration order.
    pub fn descriptors(&self) -> Vec<AgentInfo> {
        self.order
            .iter()
            .filter_map(|name| self.agents.get(name))
            .map(|agent| agent.info())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.order)
            .field("policy", &self.policy)
            .finish()
    }
}
