//! Fan-out / fan-in over agent calls.
//!
//! Every agent runs in its own tokio task. Tasks are joined in spawn order,
//! so results follow selection order whatever order they finish in. A
//! [`TaskGroup`] aborts whatever is still running when it is dropped.

use crate::agent::{AgentResult, BaseAgent, Request};
use crate::error::MeshError;
use futures::future::join_all;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

/// Why a group stopped waiting before every task finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupt {
    TimedOut,
    Cancelled,
}

impl Interrupt {
    fn describe(self) -> &'static str {
        match self {
            Interrupt::TimedOut => "request timed out",
            Interrupt::Cancelled => "request cancelled",
        }
    }

    fn kind(self) -> &'static str {
        match self {
            Interrupt::TimedOut => "timeout",
            Interrupt::Cancelled => "cancelled",
        }
    }

    pub(crate) fn skipped(self, agent: &str) -> AgentResult {
        AgentResult::failure(agent, format!("Not started: {}", self.describe()))
            .with_metadata("error_kind", Value::String(self.kind().to_string()))
    }
}

/// Run one agent call under the per-agent timeout, converting every way it
/// can go wrong into a failed result carrying the agent's name.
pub(crate) async fn invoke(
    agent: Arc<dyn BaseAgent>,
    input: Request,
    timeout: Option<Duration>,
) -> AgentResult {
    let name = agent.name().to_string();

    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, agent.process(&input)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!("Agent '{}' timed out after {:?}", name, limit);
                return AgentResult::failure(
                    &name,
                    format!("Agent timed out after {}ms", limit.as_millis()),
                )
                .with_metadata("error_kind", Value::String("timeout".into()));
            }
        },
        None => agent.process(&input).await,
    };

    match outcome {
        Ok(result) if result.agent_name() == name => result,
        Ok(result) => {
            tracing::error!(
                "Agent '{}' returned a result named '{}'",
                name,
                result.agent_name()
            );
            contract_violation(
                &name,
                &MeshError::agent(
                    &name,
                    format!("result attributed to '{}'", result.agent_name()),
                ),
            )
        }
        Err(e) => {
            tracing::error!("Agent '{}' raised instead of returning a result: {}", name, e);
            contract_violation(&name, &e)
        }
    }
}

fn contract_violation(agent: &str, error: &MeshError) -> AgentResult {
    AgentResult::from_error(agent, error).with_metadata("contract_violation", Value::Bool(true))
}

fn settle(
    agent: &str,
    joined: Result<AgentResult, JoinError>,
    interrupt: Option<Interrupt>,
) -> AgentResult {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            tracing::error!("Agent '{}' panicked", agent);
            AgentResult::failure(agent, "Agent panicked while processing the request")
                .with_metadata("error_kind", Value::String("panic".into()))
                .with_metadata("contract_violation", Value::Bool(true))
        }
        Err(_) => {
            let interrupt = interrupt.unwrap_or(Interrupt::Cancelled);
            AgentResult::failure(agent, format!("Agent stopped: {}", interrupt.describe()))
                .with_metadata("error_kind", Value::String(interrupt.kind().to_string()))
        }
    }
}

/// Spawned agent calls, joined in spawn order.
pub(crate) struct TaskGroup {
    tasks: Vec<(String, JoinHandle<AgentResult>)>,
}

impl TaskGroup {
    pub(crate) fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    pub(crate) fn spawn(
        &mut self,
        agent: Arc<dyn BaseAgent>,
        input: Request,
        timeout: Option<Duration>,
    ) {
        let name = agent.name().to_string();
        let handle = tokio::spawn(invoke(agent, input, timeout));
        self.tasks.push((name, handle));
    }

    /// Wait for every task, or until `deadline` passes or `cancel` resolves.
    /// On interruption the stragglers are aborted and given `grace` to stop;
    /// whatever has not finished by then is reported as failed.
    pub(crate) async fn join<C>(
        mut self,
        deadline: Option<Instant>,
        cancel: &mut C,
        grace: Duration,
    ) -> (Vec<AgentResult>, Option<Interrupt>)
    where
        C: Future<Output = ()> + Unpin,
    {
        let mut slots: Vec<Option<AgentResult>> = self.tasks.iter().map(|_| None).collect();

        let interrupt = {
            let collect = async {
                for (slot, (name, handle)) in slots.iter_mut().zip(self.tasks.iter_mut()) {
                    *slot = Some(settle(name, handle.await, None));
                }
            };
            let expired = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::pin!(collect);
            tokio::pin!(expired);

            tokio::select! {
                _ = &mut collect => None,
                _ = &mut expired => Some(Interrupt::TimedOut),
                _ = &mut *cancel => Some(Interrupt::Cancelled),
            }
        };

        if let Some(reason) = interrupt {
            tracing::warn!("Stopping outstanding agents: {}", reason.describe());

            let outstanding: Vec<usize> = slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.is_none())
                .map(|(i, _)| i)
                .collect();

            for &i in &outstanding {
                self.tasks[i].1.abort();
            }

            let stopping = self
                .tasks
                .iter_mut()
                .enumerate()
                .filter(|(i, _)| outstanding.contains(i))
                .map(|(i, (name, handle))| async move {
                    let result = match tokio::time::timeout(grace, handle).await {
                        Ok(joined) => settle(name, joined, Some(reason)),
                        Err(_) => {
                            tracing::warn!("Agent '{}' ignored cancellation", name);
                            AgentResult::failure(
                                name.as_str(),
                                format!(
                                    "Agent did not stop within {}ms after the {}",
                                    grace.as_millis(),
                                    reason.describe()
                                ),
                            )
                            .with_metadata("error_kind", Value::String(reason.kind().to_string()))
                        }
                    };
                    (i, result)
                });

            for (i, result) in join_all(stopping).await {
                slots[i] = Some(result);
            }
        }

        let results = slots
            .into_iter()
            .zip(self.tasks.iter())
            .map(|(slot, (name, _))| {
                slot.unwrap_or_else(|| AgentResult::failure(name.as_str(), "Agent result lost"))
            })
            .collect();

        (results, interrupt)
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        for (_, handle) in &self.tasks {
            handle.abort();
        }
    }
}
