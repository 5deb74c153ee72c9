use crate::constants::keys;
use crate::error::MeshError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An incoming request: a flat JSON object such as
/// `{"query": "add 2 and 3", "agent": "Calculator"}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Request {
    fields: Map<String, Value>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(query: impl Into<String>) -> Self {
        Self::new().with(keys::QUERY, Value::String(query.into()))
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn query_text(&self) -> Option<&str> {
        self.get_str(keys::QUERY)
    }

    /// The `"context"` object handed down by earlier pipeline stages.
    pub fn context(&self) -> Option<&Map<String, Value>> {
        self.context_at(keys::CONTEXT)
    }

    /// Stage outputs stored under a configured pipeline key.
    pub fn context_at(&self, key: &str) -> Option<&Map<String, Value>> {
        self.fields.get(key).and_then(Value::as_object)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Copy of this request with `data` merged into the object under `key`,
    /// keyed as `<agent>_data` (lower-cased agent name).
    pub fn with_stage_output(&self, key: &str, agent: &str, data: &Map<String, Value>) -> Self {
        let mut next = self.clone();
        let slot = next
            .fields
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(context) = slot {
            context.insert(
                format!("{}_data", agent.to_lowercase()),
                Value::Object(data.clone()),
            );
        }
        next
    }
}

impl From<Map<String, Value>> for Request {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl TryFrom<Value> for Request {
    type Error = MeshError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(MeshError::invalid(format!(
                "request must be a JSON object, got {}",
                type_name(&other)
            ))),
        }
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
