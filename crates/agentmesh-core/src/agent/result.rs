use crate::error::MeshError;
use serde::Serialize;
use serde_json::{Map, Value};

/// Outcome of a single agent invocation.
///
/// Only constructible through [`AgentResult::ok`] and [`AgentResult::failure`]
/// (plus the consuming `with_*` builders), so a failed result never carries a
/// payload and every result names the agent that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentResult {
    success: bool,
    data: Map<String, Value>,
    message: String,
    agent_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_agent: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    metadata: Map<String, Value>,
}

impl AgentResult {
    /// Successful result. An object `data` becomes the payload as-is, `null`
    /// becomes an empty payload, any other value is stored under `"result"`.
    pub fn ok(agent_name: impl Into<String>, data: Value, message: impl Into<String>) -> Self {
        let data = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };
        Self {
            success: true,
            data,
            message: message.into(),
            agent_name: agent_name.into(),
            next_agent: None,
            metadata: Map::new(),
        }
    }

    pub fn failure(agent_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Map::new(),
            message: message.into(),
            agent_name: agent_name.into(),
            next_agent: None,
            metadata: Map::new(),
        }
    }

    /// Failed result describing `error`, tagged with its kind in metadata.
    pub fn from_error(agent_name: impl Into<String>, error: &MeshError) -> Self {
        Self::failure(agent_name, error.to_string())
            .with_metadata("error_kind", Value::String(error.kind().to_string()))
    }

    pub fn with_next_agent(mut self, next: impl Into<String>) -> Self {
        self.next_agent = Some(next.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn next_agent(&self) -> Option<&str> {
        self.next_agent.as_deref()
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }
}
