use crate::orchestrator::response::RouteState;
use crate::orchestrator::selection::DispatchMode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use uuid::Uuid;

/// One routed request, as kept in the orchestrator's history.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub query: Option<String>,
    pub agents: Vec<String>,
    pub mode: Option<DispatchMode>,
    pub state: RouteState,
    pub overall_success: bool,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Bounded, oldest-first log of execution records.
pub struct ExecutionHistory {
    records: VecDeque<ExecutionRecord>,
    limit: usize,
}

impl ExecutionHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            records: VecDeque::new(),
            limit,
        }
    }

    pub fn push(&mut self, record: ExecutionRecord) {
        if self.limit == 0 {
            return;
        }
        while self.records.len() >= self.limit {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn snapshot(&self) -> Vec<ExecutionRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
