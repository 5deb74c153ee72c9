use crate::agent::{AgentResult, BaseAgent, Request};
use crate::constants::agents::ANSWER_SYNTHESISER;
use crate::constants::keys;
use crate::error::MeshError;
use crate::llm::LlmClient;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Produces the final user-facing answer, folding in whatever earlier
/// pipeline stages left in the request context.
pub struct AnswerSynthesiserAgent {
    llm: Arc<dyn LlmClient>,
    context_key: String,
}

impl AnswerSynthesiserAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            context_key: keys::CONTEXT.to_string(),
        }
    }

    /// Read stage outputs from `key`; must match the orchestrator's
    /// `pipeline_key`.
    pub fn with_context_key(mut self, key: impl Into<String>) -> Self {
        self.context_key = key.into();
        self
    }

    fn build_prompt(query: &str, context: Option<&Map<String, Value>>) -> String {
        let findings: Vec<(&str, &Value)> = context
            .map(|ctx| {
                ctx.iter()
                    .filter_map(|(key, value)| {
                        key.strip_suffix("_data").map(|agent| (agent, value))
                    })
                    .collect()
            })
            .unwrap_or_default();

        if findings.is_empty() {
            return format!(
                "You are a helpful AI assistant. Answer the user's question clearly.\n\n\
                 User Query: {query}\n\n\
                 Instructions:\n\
                 1. Provide a clear, accurate answer\n\
                 2. Use markdown formatting\n\
                 3. Be conversational but professional\n\n\
                 Provide your answer:\n"
            );
        }

        let mut prompt = format!(
            "You are an AI assistant. Based on the results below, provide a clear answer.\n\n\
             User Query: {query}\n\nResults:\n"
        );
        for (agent, value) in findings {
            let rendered =
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            prompt.push_str(&format!("### {agent}\n{rendered}\n\n"));
        }
        prompt.push_str(
            "Instructions:\n\
             1. Provide a clear, user-friendly answer\n\
             2. Use markdown formatting\n\
             3. Focus on insights, not technical details\n\n\
             Provide your answer:\n",
        );
        prompt
    }
}

#[async_trait::async_trait]
impl BaseAgent for AnswerSynthesiserAgent {
    fn name(&self) -> &str {
        ANSWER_SYNTHESISER
    }

    fn capabilities(&self) -> Vec<String> {
        vec![
            "Answer general questions".to_string(),
            "Synthesize final answers from analysis".to_string(),
            "Format responses with markdown".to_string(),
            "Handle conversational queries".to_string(),
        ]
    }

    async fn process(&self, input: &Request) -> Result<AgentResult, MeshError> {
        let Some(query) = input.query_text() else {
            return Ok(AgentResult::failure(ANSWER_SYNTHESISER, "Missing required field 'query'"));
        };

        let prompt = Self::build_prompt(query, input.context_at(&self.context_key));

        match self.llm.generate(&prompt).await {
            Ok(answer) => Ok(AgentResult::ok(
                ANSWER_SYNTHESISER,
                json!({ "answer": answer, "formatted_answer": answer }),
                "Answer synthesized successfully",
            )),
            Err(e) => {
                tracing::warn!("Answer synthesis failed: {}", e);
                Ok(AgentResult::from_error(ANSWER_SYNTHESISER, &e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_without_context_is_plain_question() {
        let prompt = AnswerSynthesiserAgent::build_prompt("what is rust?", None);
        assert!(prompt.contains("User Query: what is rust?"));
        assert!(!prompt.contains("Results:"));
    }

    #[test]
    fn prompt_includes_stage_outputs() {
        let mut ctx = Map::new();
        ctx.insert("calculator_data".into(), json!({ "result": 5 }));
        ctx.insert("unrelated".into(), json!("ignored"));

        let prompt = AnswerSynthesiserAgent::build_prompt("add 2 and 3", Some(&ctx));
        assert!(prompt.contains("### calculator"));
        assert!(prompt.contains("\"result\": 5"));
        assert!(!prompt.contains("ignored"));
    }
}
