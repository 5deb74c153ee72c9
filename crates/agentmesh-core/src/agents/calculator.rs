use crate::agent::{AgentResult, BaseAgent, Request};
use crate::constants::agents::{ANSWER_SYNTHESISER, CALCULATOR};
use crate::error::MeshError;
use serde_json::json;

/// Adds the integers found in an "add ..." / "a + b" query and hands the
/// number to the answer synthesiser for phrasing.
pub struct CalculatorAgent {
    handoff: Option<String>,
}

impl CalculatorAgent {
    pub fn new() -> Self {
        Self {
            handoff: Some(ANSWER_SYNTHESISER.to_string()),
        }
    }

    /// Disable (or redirect) the handoff attached to successful results.
    pub fn with_handoff(mut self, next: Option<String>) -> Self {
        self.handoff = next;
        self
    }
}

impl Default for CalculatorAgent {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole-word integers in `query`. `None` if any word is a decimal number,
/// which this agent cannot add exactly.
fn extract_integers(query: &str) -> Option<Vec<i64>> {
    let mut numbers = Vec::new();
    let words = query
        .split(|c: char| c.is_whitespace() || (c.is_ascii_punctuation() && c != '.' && c != '-'))
        .map(|word| word.trim_end_matches('.'))
        .filter(|word| !word.is_empty());

    for word in words {
        if let Ok(n) = word.parse::<i64>() {
            numbers.push(n);
        } else if word.contains('.') && word.parse::<f64>().is_ok() {
            return None;
        }
    }
    Some(numbers)
}

#[async_trait::async_trait]
impl BaseAgent for CalculatorAgent {
    fn name(&self) -> &str {
        CALCULATOR
    }

    fn capabilities(&self) -> Vec<String> {
        vec![
            "Perform basic calculations".to_string(),
            "Add numbers together".to_string(),
        ]
    }

    async fn process(&self, input: &Request) -> Result<AgentResult, MeshError> {
        let Some(query) = input.query_text() else {
            return Ok(AgentResult::failure(CALCULATOR, "Missing required field 'query'"));
        };

        let lower = query.to_lowercase();
        if lower.contains("add") || lower.contains("sum") || query.contains('+') {
            let numbers = extract_integers(query).unwrap_or_default();
            if numbers.len() >= 2 {
                let Some(total) = numbers.iter().try_fold(0i64, |acc, n| acc.checked_add(*n))
                else {
                    return Ok(AgentResult::failure(CALCULATOR, "Calculation overflowed"));
                };
                let result = AgentResult::ok(
                    CALCULATOR,
                    json!({ "result": total, "operation": "addition", "operands": numbers }),
                    format!("Calculated: {}", total),
                );
                return Ok(match &self.handoff {
                    Some(next) => result.with_next_agent(next.clone()),
                    None => result,
                });
            }
        }

        Ok(AgentResult::failure(CALCULATOR, "Could not perform calculation"))
    }
}
