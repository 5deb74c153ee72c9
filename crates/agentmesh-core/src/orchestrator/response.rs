use crate::agent::AgentResult;
use crate::orchestrator::selection::DispatchMode;
use serde::Serialize;

/// What `route` hands back to the front end.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OrchestratorResponse {
    /// Exactly one agent ran; its result, untouched.
    Single(AgentResult),
    /// Several agents ran. `results` follows selection order.
    Composite {
        mode: DispatchMode,
        overall_success: bool,
        results: Vec<AgentResult>,
    },
    /// No agent matched the request. Not an error: the caller may ask the
    /// user to clarify or retry with an explicit agent.
    NoMatch {
        query: Option<String>,
        available: Vec<String>,
    },
}

impl OrchestratorResponse {
    /// Composite response; successful iff any constituent succeeded.
    pub fn composite(mode: DispatchMode, results: Vec<AgentResult>) -> Self {
        let overall_success = results.iter().any(AgentResult::success);
        Self::Composite {
            mode,
            overall_success,
            results,
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            Self::Single(result) => result.success(),
            Self::Composite {
                overall_success, ..
            } => *overall_success,
            Self::NoMatch { .. } => false,
        }
    }

    pub fn is_no_match(&self) -> bool {
        matches!(self, Self::NoMatch { .. })
    }

    pub fn results(&self) -> Vec<&AgentResult> {
        match self {
            Self::Single(result) => vec![result],
            Self::Composite { results, .. } => results.iter().collect(),
            Self::NoMatch { .. } => Vec::new(),
        }
    }

    pub fn as_single(&self) -> Option<&AgentResult> {
        match self {
            Self::Single(result) => Some(result),
            _ => None,
        }
    }
}

/// Per-request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    Received,
    Selecting,
    Invoking,
    Aggregating,
    Completed,
    Failed,
}

/// Events emitted while a request is routed.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    StateChanged(RouteState),
    Selected {
        agents: Vec<String>,
        mode: DispatchMode,
    },
    AgentStarted(String),
    AgentFinished(AgentResult),
    Complete {
        overall_success: bool,
    },
    Error(String),
}
