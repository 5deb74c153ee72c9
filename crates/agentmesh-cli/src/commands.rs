use agentmesh_core::constants::keys;
use agentmesh_core::{AgentResult, OrchestratorResponse, Request};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Build the request for `agentmesh ask`. With no `--agent` flags the
/// orchestrator picks agents by keyword.
pub fn build_request(query: &str, agents: &[String], pipeline: bool) -> Request {
    let request = Request::query(query);
    match agents {
        [] => request,
        _ if pipeline => request.with(keys::PIPELINE, json!(agents)),
        [single] => request.with(keys::AGENT, json!(single)),
        many => request.with(keys::AGENTS, json!(many)),
    }
}

pub fn render_agents(agents: &BTreeMap<String, Vec<String>>) -> String {
    if agents.is_empty() {
        return "No agents registered.".to_string();
    }

    let mut out = String::new();
    for (name, capabilities) in agents {
        out.push_str(name);
        out.push('\n');
        for capability in capabilities {
            out.push_str(&format!("  - {capability}\n"));
        }
    }
    out
}

pub fn render_response(response: &OrchestratorResponse) -> String {
    match response {
        OrchestratorResponse::Single(result) => render_result(result),
        OrchestratorResponse::Composite {
            mode,
            overall_success,
            results,
        } => {
            let status = if *overall_success { "ok" } else { "failed" };
            let mut out = format!("{} agents ({:?}): {}\n", results.len(), mode, status);
            for result in results {
                out.push('\n');
                out.push_str(&render_result(result));
            }
            out
        }
        OrchestratorResponse::NoMatch { query, available } => {
            let mut out = match query {
                Some(q) => format!("No agent can handle: {q}\n"),
                None => "No agent can handle this request\n".to_string(),
            };
            if !available.is_empty() {
                out.push_str(&format!("Available agents: {}\n", available.join(", ")));
            }
            out
        }
    }
}

/// One agent's outcome: a status line, then the answer (or data) if any.
pub fn render_result(result: &AgentResult) -> String {
    let marker = if result.success() { "✓" } else { "✗" };
    let mut out = format!("{} {}: {}\n", marker, result.agent_name(), result.message());

    let data = result.data();
    if let Some(answer) = data.get("formatted_answer").or_else(|| data.get("answer")) {
        out.push_str(&format!("{}\n", display_value(answer)));
    } else if let Some(value) = data.get("result") {
        out.push_str(&format!("{}\n", display_value(value)));
    } else if !data.is_empty() {
        let rendered = serde_json::to_string_pretty(data).unwrap_or_default();
        out.push_str(&format!("{rendered}\n"));
    }

    if let Some(next) = result.next_agent() {
        out.push_str(&format!("→ {next}\n"));
    }
    out
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
