mod dispatch;
mod history;
mod response;
mod selection;

pub use history::{ExecutionHistory, ExecutionRecord};
pub use response::{OrchestratorEvent, OrchestratorResponse, RouteState};
pub use selection::{
    DispatchMode, ExplicitPolicy, KeywordPolicy, RoutingPolicy, Selection, SelectionPolicy,
};

use crate::agent::{type_name, AgentInfo, AgentRegistry, AgentResult, BaseAgent, Request};
use crate::agents::{AnswerSynthesiserAgent, CalculatorAgent};
use crate::config::{OrchestratorSettings, Settings};
use crate::constants::keys;
use crate::credential::ApiKey;
use crate::error::{MeshError, Result};
use dispatch::{Interrupt, TaskGroup};
use futures::future::{Fuse, FutureExt};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use uuid::Uuid;

type EventTx = Option<UnboundedSender<OrchestratorEvent>>;
type CancelSignal<'a> = Fuse<Pin<Box<dyn Future<Output = ()> + Send + 'a>>>;

/// Routes requests to registered agents and aggregates their results.
///
/// The registry is only mutable through `&mut self`, so registration can
/// never overlap a `route` call.
pub struct Orchestrator {
    registry: AgentRegistry,
    policy: Box<dyn SelectionPolicy>,
    settings: OrchestratorSettings,
    history: Mutex<ExecutionHistory>,
}

/// Bookkeeping for one `route` call.
struct RouteRun {
    id: Uuid,
    started_at: chrono::DateTime<chrono::Utc>,
    started: Instant,
    query: Option<String>,
    agents: Vec<String>,
    mode: Option<DispatchMode>,
}

impl Orchestrator {
    pub fn new(registry: AgentRegistry) -> Self {
        let settings = OrchestratorSettings::default();
        Self {
            registry,
            policy: Box::new(RoutingPolicy::default()),
            history: Mutex::new(ExecutionHistory::new(settings.history_limit)),
            settings,
        }
    }

    /// The standard roster (calculator + answer synthesiser), with the
    /// credential forwarded to the LLM-backed agents.
    pub fn with_credential(api_key: ApiKey, settings: &Settings) -> Result<Self> {
        let llm = settings.build_llm_client(api_key)?;

        let mut registry = AgentRegistry::with_policy(settings.orchestrator.overwrite_policy);
        registry.register_agent(Arc::new(CalculatorAgent::new()))?;
        registry.register_agent(Arc::new(
            AnswerSynthesiserAgent::new(llm)
                .with_context_key(settings.orchestrator.pipeline_key.clone()),
        ))?;

        Ok(Self::new(registry)
            .with_settings(settings.orchestrator.clone())
            .with_policy(Box::new(RoutingPolicy::new(settings.selection.clone()))))
    }

    pub fn with_policy(mut self, policy: Box<dyn SelectionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.history = Mutex::new(ExecutionHistory::new(settings.history_limit));
        self.settings = settings;
        self
    }

    pub fn register(&mut self, agent: Arc<dyn BaseAgent>) -> Result<()> {
        self.registry.register_agent(agent)
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Agent name → capabilities.
    pub fn list_agents(&self) -> BTreeMap<String, Vec<String>> {
        self.registry
            .descriptors()
            .into_iter()
            .map(|info| (info.name, info.capabilities))
            .collect()
    }

    pub fn history(&self) -> Vec<ExecutionRecord> {
        self.lock_history().snapshot()
    }

    pub fn clear_history(&self) {
        self.lock_history().clear();
    }

    pub async fn route(&self, request: &Request) -> Result<OrchestratorResponse> {
        self.route_with_cancel(request, std::future::pending(), None).await
    }

    pub async fn route_with_events(
        &self,
        request: &Request,
        event_tx: UnboundedSender<OrchestratorEvent>,
    ) -> Result<OrchestratorResponse> {
        self.route_with_cancel(request, std::future::pending(), Some(event_tx)).await
    }

    /// Route `request`; when `cancel` resolves, in-flight agents are stopped
    /// and reported as cancelled. Dropping the returned future aborts them too.
    pub async fn route_with_cancel<'c, C>(
        &self,
        request: &Request,
        cancel: C,
        event_tx: EventTx,
    ) -> Result<OrchestratorResponse>
    where
        C: Future<Output = ()> + Send + 'c,
    {
        let cancel: Pin<Box<dyn Future<Output = ()> + Send + 'c>> = Box::pin(cancel);
        let mut cancel: CancelSignal<'c> = cancel.fuse();

        let mut run = RouteRun {
            id: Uuid::new_v4(),
            started_at: chrono::Utc::now(),
            started: Instant::now(),
            query: request.query_text().map(str::to_string),
            agents: Vec::new(),
            mode: None,
        };
        tracing::info!(
            "Routing request {} (query: {:?})",
            run.id,
            run.query.as_deref().unwrap_or("")
        );
        self.transition(&event_tx, RouteState::Received);

        match self.dispatch(request, &mut run, &mut cancel, &event_tx).await {
            Ok(response) => {
                self.transition(&event_tx, RouteState::Completed);
                Self::emit(
                    &event_tx,
                    OrchestratorEvent::Complete {
                        overall_success: response.is_success(),
                    },
                );
                self.record(&run, RouteState::Completed, response.is_success(), None);
                Ok(response)
            }
            Err(e) => {
                tracing::warn!("Request {} failed: {}", run.id, e);
                self.transition(&event_tx, RouteState::Failed);
                Self::emit(&event_tx, OrchestratorEvent::Error(e.to_string()));
                self.record(&run, RouteState::Failed, false, Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn dispatch(
        &self,
        request: &Request,
        run: &mut RouteRun,
        cancel: &mut CancelSignal<'_>,
        event_tx: &EventTx,
    ) -> Result<OrchestratorResponse> {
        self.transition(event_tx, RouteState::Selecting);

        if let Some(query) = request.get(keys::QUERY) {
            if !query.is_string() {
                return Err(MeshError::invalid(format!(
                    "'{}' must be a string, got {}",
                    keys::QUERY,
                    type_name(query)
                )));
            }
        }

        let descriptors: Vec<AgentInfo> = self.registry.descriptors();
        let selection = self.policy.select(request, &descriptors)?;

        if selection.is_empty() {
            tracing::info!("No agent matched request {}", run.id);
            return Ok(OrchestratorResponse::NoMatch {
                query: run.query.clone(),
                available: descriptors.into_iter().map(|d| d.name).collect(),
            });
        }

        // Resolve every name up front: an unknown explicit target fails the
        // request before any agent starts.
        let agents = selection
            .names()
            .iter()
            .map(|name| self.registry.get(name))
            .collect::<Result<Vec<_>>>()?;

        run.agents = selection.names().to_vec();
        run.mode = Some(selection.mode());
        tracing::debug!(
            "Request {} selected {:?} ({:?})",
            run.id,
            run.agents,
            selection.mode()
        );
        Self::emit(
            event_tx,
            OrchestratorEvent::Selected {
                agents: run.agents.clone(),
                mode: selection.mode(),
            },
        );

        if (&mut *cancel).now_or_never().is_some() {
            return Err(MeshError::Cancelled);
        }

        self.transition(event_tx, RouteState::Invoking);
        let deadline = self.settings.request_timeout().map(|t| run.started + t);

        let results = match selection.mode() {
            DispatchMode::Concurrent => {
                self.invoke_concurrent(agents, request, deadline, cancel, event_tx)
                    .await
            }
            DispatchMode::Single | DispatchMode::Pipeline => {
                self.invoke_sequential(agents, request, deadline, cancel, event_tx, run)
                    .await
            }
        };

        self.transition(event_tx, RouteState::Aggregating);

        let response = if results.len() == 1 {
            results
                .into_iter()
                .next()
                .map(OrchestratorResponse::Single)
                .ok_or_else(|| MeshError::Other("no result collected".into()))?
        } else {
            let mode = match selection.mode() {
                DispatchMode::Concurrent => DispatchMode::Concurrent,
                // a single dispatch that followed handoffs became a pipeline
                DispatchMode::Single | DispatchMode::Pipeline => DispatchMode::Pipeline,
            };
            OrchestratorResponse::composite(mode, results)
        };

        if let Some(DispatchMode::Single) = run.mode {
            if !matches!(response, OrchestratorResponse::Single(_)) {
                run.mode = Some(DispatchMode::Pipeline);
            }
        }

        Ok(response)
    }

    /// Fan out to every agent at once; join in selection order.
    async fn invoke_concurrent(
        &self,
        agents: Vec<Arc<dyn BaseAgent>>,
        request: &Request,
        deadline: Option<Instant>,
        cancel: &mut CancelSignal<'_>,
        event_tx: &EventTx,
    ) -> Vec<AgentResult> {
        let mut group = TaskGroup::new();
        for agent in agents {
            Self::emit(
                event_tx,
                OrchestratorEvent::AgentStarted(agent.name().to_string()),
            );
            group.spawn(agent, request.clone(), self.settings.agent_timeout());
        }

        let (results, _) = group
            .join(deadline, cancel, self.settings.cancel_grace())
            .await;

        for result in &results {
            Self::emit(event_tx, OrchestratorEvent::AgentFinished(result.clone()));
        }
        results
    }

    /// Run agents one after another, feeding each stage's data forward and
    /// following `next_agent` handoffs when enabled.
    async fn invoke_sequential(
        &self,
        agents: Vec<Arc<dyn BaseAgent>>,
        request: &Request,
        deadline: Option<Instant>,
        cancel: &mut CancelSignal<'_>,
        event_tx: &EventTx,
        run: &mut RouteRun,
    ) -> Vec<AgentResult> {
        let mut queue: std::collections::VecDeque<Arc<dyn BaseAgent>> = agents.into();
        let mut results: Vec<AgentResult> = Vec::new();
        let mut input = request.clone();
        let mut handoffs = 0usize;
        let mut interrupted: Option<Interrupt> = None;

        while let Some(agent) = queue.pop_front() {
            let name = agent.name().to_string();

            if let Some(reason) = interrupted {
                results.push(reason.skipped(&name));
                continue;
            }

            Self::emit(event_tx, OrchestratorEvent::AgentStarted(name.clone()));
            let mut group = TaskGroup::new();
            group.spawn(agent, input.clone(), self.settings.agent_timeout());
            let (mut stage, interrupt) = group
                .join(deadline, cancel, self.settings.cancel_grace())
                .await;
            interrupted = interrupt;

            let Some(result) = stage.pop() else {
                continue;
            };
            Self::emit(event_tx, OrchestratorEvent::AgentFinished(result.clone()));

            if result.success() && !result.data().is_empty() {
                input =
                    input.with_stage_output(&self.settings.pipeline_key, &name, result.data());
            }

            let handoff = result.next_agent().map(str::to_string);
            results.push(result);

            if interrupted.is_some() || !queue.is_empty() || !self.settings.follow_handoffs {
                continue;
            }
            let Some(next) = handoff else {
                continue;
            };
            if handoffs >= self.settings.max_handoffs {
                tracing::warn!(
                    "Request {} reached the handoff limit ({}), not following '{}'",
                    run.id,
                    self.settings.max_handoffs,
                    next
                );
                continue;
            }
            handoffs += 1;

            match self.registry.get(&next) {
                Ok(agent) => {
                    tracing::debug!("Request {}: {} hands off to {}", run.id, name, next);
                    run.agents.push(next);
                    queue.push_back(agent);
                }
                Err(e) => {
                    tracing::warn!("Request {}: handoff from {} failed: {}", run.id, name, e);
                    run.agents.push(next.clone());
                    results.push(AgentResult::from_error(next, &e));
                }
            }
        }

        results
    }

    fn transition(&self, event_tx: &EventTx, state: RouteState) {
        tracing::debug!("Route state -> {:?}", state);
        Self::emit(event_tx, OrchestratorEvent::StateChanged(state));
    }

    fn emit(tx: &EventTx, event: OrchestratorEvent) {
        if let Some(ref tx) = tx {
            let _ = tx.send(event);
        }
    }

    fn record(
        &self,
        run: &RouteRun,
        state: RouteState,
        overall_success: bool,
        error: Option<String>,
    ) {
        let record = ExecutionRecord {
            id: run.id,
            started_at: run.started_at,
            query: run.query.clone(),
            agents: run.agents.clone(),
            mode: run.mode,
            state,
            overall_success,
            elapsed_ms: run.started.elapsed().as_millis() as u64,
            error,
        };
        self.lock_history().push(record);
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, ExecutionHistory> {
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
