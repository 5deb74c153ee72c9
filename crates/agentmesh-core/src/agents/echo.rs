use crate::agent::{AgentResult, BaseAgent, Request};
use crate::constants::agents::ECHO;
use crate::error::MeshError;
use serde_json::json;

/// Returns the query unchanged. Handy as a smoke test for routing.
pub struct EchoAgent;

#[async_trait::async_trait]
impl BaseAgent for EchoAgent {
    fn name(&self) -> &str {
        ECHO
    }

    fn capabilities(&self) -> Vec<String> {
        vec![
            "Echo the query back".to_string(),
            "Repeat text verbatim".to_string(),
        ]
    }

    async fn process(&self, input: &Request) -> Result<AgentResult, MeshError> {
        match input.query_text() {
            Some(query) => Ok(AgentResult::ok(ECHO, json!({ "result": query }), "Done!")),
            None => Ok(AgentResult::failure(ECHO, "Missing required field 'query'")),
        }
    }
}
