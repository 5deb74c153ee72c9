use agentmesh_core::agents::EchoAgent;
use agentmesh_core::config::OrchestratorSettings;
use agentmesh_core::orchestrator::KeywordPolicy;
use agentmesh_core::orchestrator::RoutingPolicy;
use agentmesh_core::{
    AgentRegistry, AgentResult, BaseAgent, DispatchMode, MeshError, Orchestrator,
    OrchestratorEvent, OrchestratorResponse, Request, RouteState,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;

#[derive(Clone, Copy)]
enum Behaviour {
    Succeed,
    Fail,
    /// Returns `Err` instead of a result.
    Raise,
    Panic,
    /// Returns a result attributed to another agent.
    Misattribute,
    /// Blocks its worker thread, so abort cannot reach it.
    Block(Duration),
}

/// Test agent with scripted behaviour, an optional async delay, and a log
/// of the inputs it received.
struct ScriptedAgent {
    name: String,
    capabilities: Vec<String>,
    behaviour: Behaviour,
    delay: Duration,
    next: Option<String>,
    inputs: Arc<Mutex<Vec<Request>>>,
    finished: Arc<AtomicBool>,
}

impl ScriptedAgent {
    fn new(name: &str, behaviour: Behaviour) -> Self {
        Self {
            name: name.to_string(),
            capabilities: vec![format!("Handle {} tasks", name.to_lowercase())],
            behaviour,
            delay: Duration::ZERO,
            next: None,
            inputs: Arc::new(Mutex::new(Vec::new())),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    fn with_capabilities(mut self, caps: &[&str]) -> Self {
        self.capabilities = caps.iter().map(|c| c.to_string()).collect();
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn handing_off_to(mut self, next: &str) -> Self {
        self.next = Some(next.to_string());
        self
    }
}

#[async_trait::async_trait]
impl BaseAgent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }

    async fn process(&self, input: &Request) -> Result<AgentResult, MeshError> {
        self.inputs.lock().unwrap().push(input.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = match self.behaviour {
            Behaviour::Succeed => {
                let result = AgentResult::ok(
                    &self.name,
                    json!({ "handled_by": self.name }),
                    "handled",
                );
                match &self.next {
                    Some(next) => result.with_next_agent(next.clone()),
                    None => result,
                }
            }
            Behaviour::Fail => AgentResult::failure(&self.name, "could not handle"),
            Behaviour::Raise => return Err(MeshError::Other("boom".into())),
            Behaviour::Panic => panic!("agent bug"),
            Behaviour::Misattribute => AgentResult::ok("Impostor", Value::Null, "handled"),
            Behaviour::Block(d) => {
                std::thread::sleep(d);
                AgentResult::ok(&self.name, Value::Null, "handled")
            }
        };
        self.finished.store(true, Ordering::SeqCst);
        Ok(result)
    }
}

fn orchestrator(agents: Vec<Arc<dyn BaseAgent>>) -> Orchestrator {
    let mut registry = AgentRegistry::new();
    for agent in agents {
        registry.register_agent(agent).unwrap();
    }
    Orchestrator::new(registry)
}

fn names(response: &OrchestratorResponse) -> Vec<String> {
    response
        .results()
        .iter()
        .map(|r| r.agent_name().to_string())
        .collect()
}

// ========================================================================
// Single dispatch
// ========================================================================

#[tokio::test]
async fn test_echo_passthrough() {
    let orch = orchestrator(vec![Arc::new(EchoAgent)]);
    let request = Request::query("hi").with("agent", json!("Echo"));

    let response = orch.route(&request).await.unwrap();

    let expected = AgentResult::ok("Echo", json!({ "result": "hi" }), "Done!");
    assert_eq!(response, OrchestratorResponse::Single(expected));
}

#[tokio::test]
async fn test_single_failure_is_passed_through() {
    let orch = orchestrator(vec![Arc::new(ScriptedAgent::new("Worker", Behaviour::Fail))]);
    let request = Request::query("anything").with("agent", json!("Worker"));

    let response = orch.route(&request).await.unwrap();

    assert_eq!(
        response,
        OrchestratorResponse::Single(AgentResult::failure("Worker", "could not handle"))
    );
    assert!(!response.is_success());
}

#[tokio::test]
async fn test_unknown_explicit_agent_is_routing_error() {
    let orch = orchestrator(vec![Arc::new(EchoAgent)]);
    let request = Request::new().with("agent", json!("Missing"));

    match orch.route(&request).await {
        Err(MeshError::UnknownAgent(name)) => assert_eq!(name, "Missing"),
        other => panic!("Expected UnknownAgent, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_agent_in_list_starts_nothing() {
    let worker = ScriptedAgent::new("Worker", Behaviour::Succeed);
    let inputs = worker.inputs.clone();
    let orch = orchestrator(vec![Arc::new(worker)]);
    let request = Request::query("x").with("agents", json!(["Worker", "Missing"]));

    assert!(matches!(
        orch.route(&request).await,
        Err(MeshError::UnknownAgent(_))
    ));
    assert!(inputs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_non_string_query_is_invalid() {
    let orch = orchestrator(vec![Arc::new(EchoAgent)]);
    let request = Request::new().with("query", json!(42));

    assert!(matches!(
        orch.route(&request).await,
        Err(MeshError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_no_match_is_not_an_error() {
    let orch = orchestrator(vec![Arc::new(EchoAgent)]);
    let request = Request::query("translate this poem into french");

    let response = orch.route(&request).await.unwrap();

    match response {
        OrchestratorResponse::NoMatch { query, available } => {
            assert_eq!(query.as_deref(), Some("translate this poem into french"));
            assert_eq!(available, vec!["Echo"]);
        }
        other => panic!("Expected NoMatch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_no_match_on_empty_registry() {
    let orch = orchestrator(vec![]);
    let response = orch.route(&Request::query("hello")).await.unwrap();
    assert!(response.is_no_match());
    assert!(response.results().is_empty());
}

#[tokio::test]
async fn test_keyword_selection_routes_to_capable_agent() {
    let weather = ScriptedAgent::new("Weather", Behaviour::Succeed)
        .with_capabilities(&["Report the weather forecast"]);
    let orch = orchestrator(vec![Arc::new(EchoAgent), Arc::new(weather)]);

    let response = orch
        .route(&Request::query("forecast for tomorrow"))
        .await
        .unwrap();

    assert_eq!(response.as_single().unwrap().agent_name(), "Weather");
}

#[tokio::test]
async fn test_keyword_fallback_agent() {
    let orch = orchestrator(vec![Arc::new(EchoAgent)]).with_policy(Box::new(
        RoutingPolicy::new(KeywordPolicy::default().with_fallback("Echo")),
    ));

    let response = orch.route(&Request::query("translate poetry")).await.unwrap();

    let result = response.as_single().unwrap();
    assert_eq!(result.data()["result"], "translate poetry");
}

// ========================================================================
// Concurrent aggregation
// ========================================================================

#[tokio::test]
async fn test_partial_success_is_overall_success() {
    let orch = orchestrator(vec![
        Arc::new(ScriptedAgent::new("Good", Behaviour::Succeed)),
        Arc::new(ScriptedAgent::new("Bad", Behaviour::Fail)),
    ]);
    let request = Request::query("x").with("agents", json!(["Good", "Bad"]));

    let response = orch.route(&request).await.unwrap();

    match &response {
        OrchestratorResponse::Composite {
            mode,
            overall_success,
            results,
        } => {
            assert_eq!(*mode, DispatchMode::Concurrent);
            assert!(*overall_success);
            assert_eq!(results.len(), 2);
            assert!(results[0].success());
            assert!(!results[1].success());
        }
        other => panic!("Expected Composite, got {other:?}"),
    }
    assert_eq!(names(&response), vec!["Good", "Bad"]);
}

#[tokio::test]
async fn test_all_failed_is_overall_failure() {
    let orch = orchestrator(vec![
        Arc::new(ScriptedAgent::new("A", Behaviour::Fail)),
        Arc::new(ScriptedAgent::new("B", Behaviour::Fail)),
    ]);
    let request = Request::query("x").with("agent", json!(["A", "B"]));

    let response = orch.route(&request).await.unwrap();

    assert!(!response.is_success());
    assert_eq!(response.results().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_results_keep_selection_order() {
    let slow =
        ScriptedAgent::new("Slow", Behaviour::Succeed).with_delay(Duration::from_millis(200));
    let fast = ScriptedAgent::new("Fast", Behaviour::Succeed);
    let orch = orchestrator(vec![Arc::new(fast), Arc::new(slow)]);
    let request = Request::query("x").with("agents", json!(["Slow", "Fast"]));

    let response = orch.route(&request).await.unwrap();

    assert_eq!(names(&response), vec!["Slow", "Fast"]);
}

#[tokio::test(start_paused = true)]
async fn test_agents_run_concurrently() {
    let a = ScriptedAgent::new("A", Behaviour::Succeed).with_delay(Duration::from_secs(1));
    let b = ScriptedAgent::new("B", Behaviour::Succeed).with_delay(Duration::from_secs(1));
    let orch = orchestrator(vec![Arc::new(a), Arc::new(b)]);
    let request = Request::query("x").with("agents", json!(["A", "B"]));

    let started = tokio::time::Instant::now();
    let response = orch.route(&request).await.unwrap();

    assert!(response.is_success());
    assert!(started.elapsed() < Duration::from_millis(1500));
}

#[tokio::test]
async fn test_raising_agent_becomes_synthetic_failure() {
    let orch = orchestrator(vec![
        Arc::new(ScriptedAgent::new("Faulty", Behaviour::Raise)),
        Arc::new(ScriptedAgent::new("Sibling", Behaviour::Succeed)),
    ]);
    let request = Request::query("x").with("agents", json!(["Faulty", "Sibling"]));

    let response = orch.route(&request).await.unwrap();
    let results = response.results();

    assert_eq!(results[0].agent_name(), "Faulty");
    assert!(!results[0].success());
    assert!(results[0].data().is_empty());
    assert!(results[0].message().contains("boom"));
    assert_eq!(results[0].metadata()["contract_violation"], json!(true));

    assert_eq!(
        *results[1],
        AgentResult::ok("Sibling", json!({ "handled_by": "Sibling" }), "handled")
    );
    assert!(response.is_success());
}

#[tokio::test]
async fn test_panicking_agent_becomes_synthetic_failure() {
    let orch = orchestrator(vec![
        Arc::new(ScriptedAgent::new("Sibling", Behaviour::Succeed)),
        Arc::new(ScriptedAgent::new("Crashy", Behaviour::Panic)),
    ]);
    let request = Request::query("x").with("agents", json!(["Sibling", "Crashy"]));

    let response = orch.route(&request).await.unwrap();
    let results = response.results();

    assert!(results[0].success());
    assert_eq!(results[1].agent_name(), "Crashy");
    assert!(!results[1].success());
    assert_eq!(results[1].metadata()["error_kind"], json!("panic"));
}

#[tokio::test]
async fn test_single_raising_agent_still_answers() {
    let orch = orchestrator(vec![Arc::new(ScriptedAgent::new("Faulty", Behaviour::Raise))]);
    let request = Request::query("x").with("agent", json!("Faulty"));

    let response = orch.route(&request).await.unwrap();

    let result = response.as_single().unwrap();
    assert_eq!(result.agent_name(), "Faulty");
    assert!(!result.success());
}

#[tokio::test]
async fn test_misattributed_result_is_rejected() {
    let orch = orchestrator(vec![Arc::new(ScriptedAgent::new(
        "Honest",
        Behaviour::Misattribute,
    ))]);
    let request = Request::query("x").with("agent", json!("Honest"));

    let response = orch.route(&request).await.unwrap();

    let result = response.as_single().unwrap();
    assert_eq!(result.agent_name(), "Honest");
    assert!(!result.success());
    assert!(result.message().contains("Impostor"));
}

// ========================================================================
// Timeouts and cancellation
// ========================================================================

fn fast_limits() -> OrchestratorSettings {
    OrchestratorSettings {
        agent_timeout_ms: 100,
        request_timeout_ms: 0,
        cancel_grace_ms: 50,
        ..OrchestratorSettings::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_agent_times_out_without_blocking_siblings() {
    let slow = ScriptedAgent::new("Slow", Behaviour::Succeed).with_delay(Duration::from_secs(10));
    let fast = ScriptedAgent::new("Fast", Behaviour::Succeed);
    let orch = orchestrator(vec![Arc::new(slow), Arc::new(fast)]).with_settings(fast_limits());
    let request = Request::query("x").with("agents", json!(["Slow", "Fast"]));

    let response = orch.route(&request).await.unwrap();
    let results = response.results();

    assert!(!results[0].success());
    assert_eq!(results[0].metadata()["error_kind"], json!("timeout"));
    assert!(results[1].success());
    assert!(response.is_success());
}

#[tokio::test(start_paused = true)]
async fn test_request_timeout_stops_outstanding_agents() {
    let slow = ScriptedAgent::new("Slow", Behaviour::Succeed).with_delay(Duration::from_secs(10));
    let finished = slow.finished.clone();
    let fast = ScriptedAgent::new("Fast", Behaviour::Succeed);
    let settings = OrchestratorSettings {
        agent_timeout_ms: 0,
        request_timeout_ms: 200,
        ..fast_limits()
    };
    let orch = orchestrator(vec![Arc::new(slow), Arc::new(fast)]).with_settings(settings);
    let request = Request::query("x").with("agents", json!(["Fast", "Slow"]));

    let response = orch.route(&request).await.unwrap();
    let results = response.results();

    assert!(results[0].success());
    assert!(!results[1].success());
    assert!(results[1].message().contains("timed out"));

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(!finished.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_caller_cancellation_marks_in_flight_agents() {
    let slow = ScriptedAgent::new("Slow", Behaviour::Succeed).with_delay(Duration::from_secs(10));
    let orch = orchestrator(vec![Arc::new(slow)]).with_settings(OrchestratorSettings {
        agent_timeout_ms: 0,
        ..fast_limits()
    });
    let request = Request::query("x").with("agent", json!("Slow"));

    let cancel = tokio::time::sleep(Duration::from_millis(100));
    let response = orch.route_with_cancel(&request, cancel, None).await.unwrap();

    let result = response.as_single().unwrap();
    assert!(!result.success());
    assert_eq!(result.metadata()["error_kind"], json!("cancelled"));
}

#[tokio::test]
async fn test_cancelled_before_invoking_is_error() {
    let orch = orchestrator(vec![Arc::new(EchoAgent)]);
    let request = Request::query("hi").with("agent", json!("Echo"));

    let outcome = orch
        .route_with_cancel(&request, std::future::ready(()), None)
        .await;

    assert!(matches!(outcome, Err(MeshError::Cancelled)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_agent_ignoring_cancellation_is_bounded_by_grace() {
    let stuck = ScriptedAgent::new("Stuck", Behaviour::Block(Duration::from_millis(800)));
    let settings = OrchestratorSettings {
        agent_timeout_ms: 0,
        request_timeout_ms: 50,
        cancel_grace_ms: 50,
        ..OrchestratorSettings::default()
    };
    let orch = orchestrator(vec![Arc::new(stuck)]).with_settings(settings);
    let request = Request::query("x").with("agent", json!("Stuck"));

    let started = std::time::Instant::now();
    let response = orch.route(&request).await.unwrap();

    assert!(started.elapsed() < Duration::from_millis(700));
    let result = response.as_single().unwrap();
    assert!(!result.success());
    assert!(result.message().contains("did not stop"));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_route_aborts_agents() {
    let slow = ScriptedAgent::new("Slow", Behaviour::Succeed).with_delay(Duration::from_secs(5));
    let finished = slow.finished.clone();
    let orch = orchestrator(vec![Arc::new(slow)]).with_settings(OrchestratorSettings {
        agent_timeout_ms: 0,
        request_timeout_ms: 0,
        ..OrchestratorSettings::default()
    });
    let request = Request::query("x").with("agent", json!("Slow"));

    let outcome = tokio::time::timeout(Duration::from_millis(100), orch.route(&request)).await;
    assert!(outcome.is_err());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!finished.load(Ordering::SeqCst));
}

// ========================================================================
// Pipelines and handoffs
// ========================================================================

#[tokio::test]
async fn test_pipeline_feeds_data_forward() {
    let first = ScriptedAgent::new("First", Behaviour::Succeed);
    let second = ScriptedAgent::new("Second", Behaviour::Succeed);
    let seen = second.inputs.clone();
    let orch = orchestrator(vec![Arc::new(first), Arc::new(second)]);
    let request = Request::query("x").with("pipeline", json!(["First", "Second"]));

    let response = orch.route(&request).await.unwrap();

    match &response {
        OrchestratorResponse::Composite { mode, .. } => assert_eq!(*mode, DispatchMode::Pipeline),
        other => panic!("Expected Composite, got {other:?}"),
    }
    assert_eq!(names(&response), vec!["First", "Second"]);

    let inputs = seen.lock().unwrap();
    let context = inputs[0].context().unwrap();
    assert_eq!(context["first_data"], json!({ "handled_by": "First" }));
    assert_eq!(inputs[0].query_text(), Some("x"));
}

#[tokio::test]
async fn test_pipeline_continues_after_failed_stage() {
    let first = ScriptedAgent::new("First", Behaviour::Raise);
    let second = ScriptedAgent::new("Second", Behaviour::Succeed);
    let seen = second.inputs.clone();
    let orch = orchestrator(vec![Arc::new(first), Arc::new(second)]);
    let request = Request::query("x").with("pipeline", json!(["First", "Second"]));

    let response = orch.route(&request).await.unwrap();

    assert!(response.is_success());
    assert!(!response.results()[0].success());
    assert!(seen.lock().unwrap()[0].context().is_none());
}

#[tokio::test]
async fn test_handoff_is_followed() {
    let first = ScriptedAgent::new("First", Behaviour::Succeed).handing_off_to("Second");
    let second = ScriptedAgent::new("Second", Behaviour::Succeed);
    let orch = orchestrator(vec![Arc::new(first), Arc::new(second)]);
    let request = Request::query("x").with("agent", json!("First"));

    let response = orch.route(&request).await.unwrap();

    assert_eq!(names(&response), vec!["First", "Second"]);
    let history = orch.history();
    assert_eq!(history[0].agents, vec!["First", "Second"]);
    assert_eq!(history[0].mode, Some(DispatchMode::Pipeline));
}

#[tokio::test]
async fn test_handoffs_disabled_keeps_single() {
    let first = ScriptedAgent::new("First", Behaviour::Succeed).handing_off_to("Second");
    let orch = orchestrator(vec![
        Arc::new(first),
        Arc::new(ScriptedAgent::new("Second", Behaviour::Succeed)),
    ])
    .with_settings(OrchestratorSettings {
        follow_handoffs: false,
        ..OrchestratorSettings::default()
    });
    let request = Request::query("x").with("agent", json!("First"));

    let response = orch.route(&request).await.unwrap();

    let result = response.as_single().unwrap();
    assert_eq!(result.next_agent(), Some("Second"));
}

#[tokio::test]
async fn test_handoff_loop_is_bounded() {
    let ping = ScriptedAgent::new("Ping", Behaviour::Succeed).handing_off_to("Pong");
    let pong = ScriptedAgent::new("Pong", Behaviour::Succeed).handing_off_to("Ping");
    let orch = orchestrator(vec![Arc::new(ping), Arc::new(pong)]).with_settings(
        OrchestratorSettings {
            max_handoffs: 2,
            ..OrchestratorSettings::default()
        },
    );
    let request = Request::query("x").with("agent", json!("Ping"));

    let response = orch.route(&request).await.unwrap();

    assert_eq!(names(&response), vec!["Ping", "Pong", "Ping"]);
}

#[tokio::test]
async fn test_handoff_to_unknown_agent_is_failed_hop() {
    let first = ScriptedAgent::new("First", Behaviour::Succeed).handing_off_to("Ghost");
    let orch = orchestrator(vec![Arc::new(first)]);
    let request = Request::query("x").with("agent", json!("First"));

    let response = orch.route(&request).await.unwrap();
    let results = response.results();

    assert_eq!(results.len(), 2);
    assert_eq!(results[1].agent_name(), "Ghost");
    assert_eq!(results[1].metadata()["error_kind"], json!("unknown_agent"));
    assert!(response.is_success());
}

// ========================================================================
// History and events
// ========================================================================

#[tokio::test]
async fn test_history_records_outcomes() {
    let orch = orchestrator(vec![Arc::new(EchoAgent)]);

    orch.route(&Request::query("hi").with("agent", json!("Echo")))
        .await
        .unwrap();
    let _ = orch.route(&Request::new().with("agent", json!("Missing"))).await;

    let history = orch.history();
    assert_eq!(history.len(), 2);

    assert_eq!(history[0].state, RouteState::Completed);
    assert!(history[0].overall_success);
    assert_eq!(history[0].agents, vec!["Echo"]);
    assert_eq!(history[0].query.as_deref(), Some("hi"));

    assert_eq!(history[1].state, RouteState::Failed);
    assert!(history[1].error.as_deref().unwrap().contains("Missing"));

    orch.clear_history();
    assert!(orch.history().is_empty());
}

#[tokio::test]
async fn test_history_is_bounded() {
    let orch = orchestrator(vec![Arc::new(EchoAgent)]).with_settings(OrchestratorSettings {
        history_limit: 2,
        ..OrchestratorSettings::default()
    });

    for q in ["one", "two", "three"] {
        orch.route(&Request::query(q).with("agent", json!("Echo")))
            .await
            .unwrap();
    }

    let queries: Vec<String> = orch
        .history()
        .into_iter()
        .filter_map(|r| r.query)
        .collect();
    assert_eq!(queries, vec!["two", "three"]);
}

#[tokio::test]
async fn test_event_stream_follows_state_machine() {
    let orch = orchestrator(vec![Arc::new(EchoAgent)]);
    let (tx, mut rx) = unbounded_channel();

    orch.route_with_events(&Request::query("hi").with("agent", json!("Echo")), tx)
        .await
        .unwrap();

    let mut states = Vec::new();
    let mut finished = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            OrchestratorEvent::StateChanged(state) => states.push(state),
            OrchestratorEvent::AgentFinished(result) => finished.push(result),
            _ => {}
        }
    }

    assert_eq!(
        states,
        vec![
            RouteState::Received,
            RouteState::Selecting,
            RouteState::Invoking,
            RouteState::Aggregating,
            RouteState::Completed,
        ]
    );
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].agent_name(), "Echo");
}

#[tokio::test]
async fn test_list_agents_reports_capabilities() {
    let orch = orchestrator(vec![Arc::new(EchoAgent)]);
    let agents = orch.list_agents();
    assert_eq!(agents["Echo"], vec!["Echo the query back", "Repeat text verbatim"]);
}

#[tokio::test]
async fn test_response_serializes_with_outcome_tag() {
    let orch = orchestrator(vec![Arc::new(EchoAgent)]);
    let response = orch
        .route(&Request::query("hi").with("agent", json!("Echo")))
        .await
        .unwrap();

    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["outcome"], "single");
    assert_eq!(value["agent_name"], "Echo");
    assert_eq!(value["data"]["result"], "hi");
    assert_eq!(value["success"], true);
}
