//! End-to-end execution scenarios against scripted tools
//!
//! Every run records all snapshots in a `MemorySink`; the ordering and
//! concurrency invariants are checked over each of them.

use std::sync::Arc;
use std::time::Duration;

use planex::dag::StepGraph;
use planex::{
    Engine, EventKind, EventLog, Execution, ExecutionConfig, ExecutionStatus, FailureKind,
    MemorySink, Mutation, Plan, ScriptedTool, Step, StepStatus, ToolRegistry,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::Barrier;

fn fast() -> ExecutionConfig {
    ExecutionConfig::default().with_retry_delay_ms(1)
}

struct Harness {
    registry: Arc<ToolRegistry>,
    sink: Arc<MemorySink>,
    events: EventLog,
}

impl Harness {
    fn new() -> Self {
        Self {
            registry: Arc::new(ToolRegistry::new()),
            sink: Arc::new(MemorySink::new()),
            events: EventLog::new(),
        }
    }

    fn tool(&self, name: &str, tool: ScriptedTool) -> Arc<ScriptedTool> {
        let tool = Arc::new(tool);
        self.registry.register(name, tool.clone());
        tool
    }

    fn engine(&self) -> Engine {
        Engine::new(self.registry.clone())
            .with_sink(self.sink.clone())
            .with_event_log(self.events.clone())
    }

    async fn run(&self, plan: Plan, config: ExecutionConfig) -> Execution {
        let limit = config.parallel_execution_limit;
        let graph = StepGraph::from_plan(&plan);
        let exec = tokio::time::timeout(Duration::from_secs(10), self.engine().execute(plan, config))
            .await
            .expect("execution hung")
            .expect("plan rejected");
        assert_snapshot_invariants(&self.sink.snapshots(), &graph, limit);
        assert_eq!(self.sink.last().as_ref(), Some(&exec));
        exec
    }
}

/// RUNNING ≤ limit, and nothing runs or completes before its dependencies completed
fn assert_snapshot_invariants(snapshots: &[Execution], graph: &StepGraph, limit: usize) {
    for snap in snapshots {
        assert!(
            snap.running_steps() <= limit,
            "{} steps RUNNING with limit {}",
            snap.running_steps(),
            limit
        );
        for result in &snap.results {
            if matches!(result.status, StepStatus::Running | StepStatus::Completed) {
                for &dep in graph.dependencies(result.step_index) {
                    assert_eq!(
                        snap.results[dep].status,
                        StepStatus::Completed,
                        "step {} {} before dependency {} completed",
                        result.step_index,
                        result.status,
                        dep
                    );
                }
            }
        }
        assert_eq!(
            snap.completed_steps + snap.failed_steps + snap.skipped_steps
                + snap.count(StepStatus::Running)
                + snap.count(StepStatus::Pending),
            snap.total_steps
        );
    }
}

#[tokio::test]
async fn linear_plan_completes_with_resolved_params() {
    let h = Harness::new();
    h.tool(
        "list_users",
        ScriptedTool::ok(json!([{"id": 42, "name": "ada"}, {"id": 7, "name": "bob"}])),
    );
    let get_user = h.tool("get_user", ScriptedTool::ok(json!({"id": 42, "email": "ada@x.io"})));
    let notify = h.tool("notify", ScriptedTool::ok(json!({"sent": true})));

    let plan = Plan::new(vec![
        Step::new("list_users"),
        Step::new("get_user")
            .depends_on([0])
            .with_params(json!({"id": "${step_0.result[0].id}"})),
        Step::new("notify")
            .depends_on([0, 1])
            .with_params(json!({"to": "${step_1.result.email}", "msg": "hi ${step_0.result[1].name}"})),
    ]);

    let exec = h.run(plan, fast()).await;

    assert_eq!(exec.status, ExecutionStatus::Completed);
    assert_eq!(exec.completed_steps, 3);
    assert_eq!(exec.failed_steps, 0);
    assert_eq!(exec.results[1].params["id"], json!(42));
    assert_eq!(get_user.seen_params()[0]["id"], json!(42));
    assert_eq!(notify.seen_params()[0]["to"], json!("ada@x.io"));
    assert_eq!(notify.seen_params()[0]["msg"], json!("hi bob"));
    assert_eq!(
        exec.results[2].result.as_deref(),
        Some(&json!({"sent": true}))
    );
    assert!(exec.completed_at.is_some());
}

#[tokio::test]
async fn fatal_failure_skips_dependents() {
    let h = Harness::new();
    let fetch = h.tool("fetch", ScriptedTool::failing("503 upstream"));
    let left = h.tool("left", ScriptedTool::ok(1));
    let right = h.tool("right", ScriptedTool::ok(2));

    let plan = Plan::new(vec![
        Step::new("fetch"),
        Step::new("left").depends_on([0]),
        Step::new("right").depends_on([0]),
    ]);

    let exec = h.run(plan, fast().with_max_retries(2)).await;

    assert_eq!(exec.status, ExecutionStatus::Failed);
    assert_eq!(exec.results[0].status, StepStatus::Failed);
    assert_eq!(exec.results[0].retry_count, 2);
    assert_eq!(exec.results[0].failure_kind, Some(FailureKind::Tool));
    assert!(exec.results[0]
        .error
        .as_deref()
        .is_some_and(|e| e.contains("PLX-043") && e.contains("503 upstream")));
    assert_eq!(fetch.calls(), 3);

    for index in [1, 2] {
        assert_eq!(exec.results[index].status, StepStatus::Skipped);
        assert_eq!(
            exec.results[index].failure_kind,
            Some(FailureKind::DependencyFailed)
        );
    }
    assert_eq!(left.calls(), 0);
    assert_eq!(right.calls(), 0);
    assert_eq!(exec.skipped_steps, 2);
}

#[tokio::test]
async fn independent_parallel_steps_overlap() {
    let h = Harness::new();
    let barrier = Arc::new(Barrier::new(2));
    h.tool(
        "search_web",
        ScriptedTool::ok(json!(["a"])).with_barrier(barrier.clone()),
    );
    h.tool(
        "search_docs",
        ScriptedTool::ok(json!(["b"])).with_barrier(barrier),
    );

    let plan = Plan::new(vec![
        Step::new("search_web").parallel(),
        Step::new("search_docs").parallel(),
    ]);

    // Each call blocks until the other one is in flight
    let exec = h.run(plan, fast().with_parallel_limit(2)).await;

    assert_eq!(exec.status, ExecutionStatus::Completed);
    assert!(h
        .sink
        .snapshots()
        .iter()
        .any(|snap| snap.running_steps() == 2));
}

#[tokio::test]
async fn parallel_steps_finish_independently_of_each_other() {
    let h = Harness::new();
    h.tool("flaky_api", ScriptedTool::failing("boom"));
    let slow = h.tool(
        "slow_api",
        ScriptedTool::ok("done").with_latency(Duration::from_millis(50)),
    );

    let plan = Plan::new(vec![
        Step::new("flaky_api").parallel(),
        Step::new("slow_api").parallel(),
    ]);

    let exec = h
        .run(plan, fast().with_max_retries(0).with_parallel_limit(2))
        .await;

    assert_eq!(exec.results[0].status, StepStatus::Failed);
    assert_eq!(exec.results[1].status, StepStatus::Completed);
    assert_eq!(slow.calls(), 1);
    assert_eq!(exec.status, ExecutionStatus::Failed);
}

#[tokio::test]
async fn parallel_limit_one_serializes_steps() {
    let h = Harness::new();
    for name in ["a", "b", "c"] {
        h.tool(
            name,
            ScriptedTool::ok(name).with_latency(Duration::from_millis(5)),
        );
    }

    let plan = Plan::new(vec![
        Step::new("a").parallel(),
        Step::new("b").parallel(),
        Step::new("c").parallel(),
    ]);

    let exec = h.run(plan, fast().with_parallel_limit(1)).await;

    assert_eq!(exec.status, ExecutionStatus::Completed);
    assert!(h.sink.snapshots().iter().all(|s| s.running_steps() <= 1));
    assert_eq!(exec.reverse_completion_order(), vec![2, 1, 0]);
}

#[tokio::test]
async fn rollback_compensates_completed_mutation_once() {
    let h = Harness::new();
    h.tool(
        "create_user",
        ScriptedTool::ok(json!({"id": 7}))
            .with_mutation(Mutation::Create)
            .compensated_by("delete_user"),
    );
    let delete_user = h.tool("delete_user", ScriptedTool::ok(json!({"deleted": true})));
    h.tool("charge_card", ScriptedTool::failing("card declined"));

    let plan = Plan::new(vec![
        Step::new("create_user").with_params(json!({"name": "ada"})),
        Step::new("charge_card")
            .depends_on([0])
            .with_params(json!({"user": "${step_0.result.id}"})),
    ]);

    let exec = h
        .run(plan, fast().with_max_retries(1).with_rollback(true))
        .await;

    assert_eq!(exec.status, ExecutionStatus::Failed);
    assert_eq!(exec.results[0].status, StepStatus::Completed);
    assert_eq!(exec.results[1].status, StepStatus::Failed);

    assert_eq!(delete_user.calls(), 1);
    let undo = &delete_user.seen_params()[0];
    assert_eq!(undo["stepIndex"], json!(0));
    assert_eq!(undo["result"], json!({"id": 7}));
    assert_eq!(undo["original"], json!({"name": "ada"}));

    assert_eq!(exec.compensations.len(), 1);
    assert!(exec.compensations[0].success);
    assert_eq!(
        exec.compensations[0].compensating_tool.as_deref(),
        Some("delete_user")
    );
    assert!(exec.rollback_errors.is_empty());

    // Compensation only after step 1's failure is final
    let events = h.events.events();
    let failed_at = events
        .iter()
        .position(|e| matches!(e.kind, EventKind::StepFailed { step: 1, .. }))
        .expect("step 1 failure event");
    let issued: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e.kind, EventKind::CompensationIssued { .. }))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(issued.len(), 1);
    assert!(issued[0] > failed_at);
    assert!(matches!(
        events.last().map(|e| &e.kind),
        Some(EventKind::ExecutionFailed { .. })
    ));
}

#[tokio::test]
async fn rollback_walks_most_recent_completion_first() {
    let h = Harness::new();
    h.tool(
        "create_account",
        ScriptedTool::ok(json!({"id": 1})).compensated_by("undo"),
    );
    h.tool(
        "add_member",
        ScriptedTool::ok(json!({"id": 2})).compensated_by("undo"),
    );
    h.tool("get_quota", ScriptedTool::ok(json!({"left": 0})));
    h.tool("provision", ScriptedTool::failing("quota exceeded"));
    let undo = h.tool("undo", ScriptedTool::ok(true));

    let plan = Plan::new(vec![
        Step::new("create_account"),
        Step::new("add_member").depends_on([0]),
        Step::new("get_quota").depends_on([1]),
        Step::new("provision").depends_on([2]),
    ]);

    let exec = h
        .run(plan, fast().with_max_retries(0).with_rollback(true))
        .await;

    // Read-only get_quota is not compensated
    let undone: Vec<usize> = exec.compensations.iter().map(|c| c.step_index).collect();
    assert_eq!(undone, vec![1, 0]);
    assert_eq!(undo.calls(), 2);
}

#[tokio::test]
async fn missing_compensation_is_recorded_not_fatal() {
    let h = Harness::new();
    h.tool("create_file", ScriptedTool::ok(json!({"path": "/tmp/x"})));
    h.tool("upload", ScriptedTool::failing("network down"));

    let plan = Plan::new(vec![
        Step::new("create_file"),
        Step::new("upload").depends_on([0]),
    ]);

    let exec = h
        .run(plan, fast().with_max_retries(0).with_rollback(true))
        .await;

    assert_eq!(exec.status, ExecutionStatus::Failed);
    assert_eq!(exec.compensations.len(), 1);
    assert!(!exec.compensations[0].success);
    assert_eq!(exec.rollback_errors.len(), 1);
    assert!(exec.rollback_errors[0].contains("create_file"));
}

#[tokio::test]
async fn rollback_of_an_update_restores_prior_state() {
    let h = Harness::new();
    let update = h.tool(
        "update_profile",
        ScriptedTool::ok(json!({"name": "new"}))
            .with_prior(json!({"name": "old"}))
            .compensated_by("restore_profile"),
    );
    let restore = h.tool("restore_profile", ScriptedTool::ok(true));
    h.tool("send_email", ScriptedTool::failing("smtp down"));

    let plan = Plan::new(vec![
        Step::new("update_profile").with_params(json!({"name": "new"})),
        Step::new("send_email").depends_on([0]),
    ]);

    let exec = h
        .run(plan, fast().with_max_retries(0).with_rollback(true))
        .await;

    assert_eq!(exec.status, ExecutionStatus::Failed);
    assert_eq!(update.calls(), 1);
    assert_eq!(exec.results[0].prior_state, Some(json!({"name": "old"})));

    assert_eq!(restore.calls(), 1);
    let undo = &restore.seen_params()[0];
    assert_eq!(undo["priorState"], json!({"name": "old"}));
    assert_eq!(undo["result"], json!({"name": "new"}));
    assert_eq!(exec.compensations.len(), 1);
    assert!(exec.compensations[0].success);
}

#[tokio::test]
async fn prior_state_is_only_captured_for_updates() {
    let h = Harness::new();
    h.tool(
        "create_user",
        ScriptedTool::ok(json!({"id": 7})).with_prior(json!({"unused": true})),
    );

    let exec = h.run(Plan::new(vec![Step::new("create_user")]), fast()).await;

    assert_eq!(exec.status, ExecutionStatus::Completed);
    assert_eq!(exec.results[0].prior_state, None);
}

#[tokio::test]
async fn rollback_disabled_leaves_completed_steps() {
    let h = Harness::new();
    h.tool(
        "create_user",
        ScriptedTool::ok(json!({"id": 7})).compensated_by("delete_user"),
    );
    let delete_user = h.tool("delete_user", ScriptedTool::ok(true));
    h.tool("charge_card", ScriptedTool::failing("declined"));

    let plan = Plan::new(vec![
        Step::new("create_user"),
        Step::new("charge_card").depends_on([0]),
    ]);

    let exec = h.run(plan, fast().with_max_retries(0)).await;

    assert_eq!(exec.status, ExecutionStatus::Failed);
    assert!(exec.compensations.is_empty());
    assert_eq!(delete_user.calls(), 0);
}

#[tokio::test]
async fn retry_budget_is_max_retries_plus_one() {
    let h = Harness::new();
    let recovering = h.tool("recovering", ScriptedTool::flaky(2, json!("ok")));
    let broken = h.tool("broken", ScriptedTool::failing("nope"));

    let plan = Plan::new(vec![
        Step::new("recovering").parallel(),
        Step::new("broken").parallel(),
    ]);

    let exec = h
        .run(
            plan,
            fast().with_max_retries(3).with_continue_on_error(true),
        )
        .await;

    assert_eq!(recovering.calls(), 3);
    assert_eq!(exec.results[0].status, StepStatus::Completed);
    assert_eq!(exec.results[0].retry_count, 2);

    assert_eq!(broken.calls(), 4);
    assert_eq!(exec.results[1].retry_count, 3);
    assert_eq!(
        h.events
            .count_where(|k| matches!(k, EventKind::StepRetrying { step: 1, .. })),
        3
    );
}

#[tokio::test]
async fn single_attempt_failure_is_a_tool_error() {
    let h = Harness::new();
    h.tool("broken", ScriptedTool::failing("nope"));

    let exec = h
        .run(Plan::new(vec![Step::new("broken")]), fast().with_max_retries(0))
        .await;

    let error = exec.results[0].error.as_deref().unwrap_or_default();
    assert!(error.contains("PLX-040"), "{}", error);
    assert_eq!(exec.results[0].retry_count, 0);
}

#[tokio::test]
async fn resolution_failure_is_not_retried_or_invoked() {
    let h = Harness::new();
    h.tool("list_users", ScriptedTool::ok(json!([])));
    let get_user = h.tool("get_user", ScriptedTool::ok(json!({})));
    let audit = h.tool("audit", ScriptedTool::ok(true));

    let plan = Plan::new(vec![
        Step::new("list_users"),
        Step::new("get_user")
            .depends_on([0])
            .with_params(json!({"id": "${step_0.result[0].id}"})),
        Step::new("audit"),
    ]);

    let exec = h.run(plan, fast().with_max_retries(5)).await;

    let step = &exec.results[1];
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(step.failure_kind, Some(FailureKind::Resolution));
    assert_eq!(step.retry_count, 0);
    assert!(step.error.as_deref().is_some_and(|e| e.contains("PLX-033")));
    assert_eq!(get_user.calls(), 0);

    // Independent work still ran
    assert_eq!(audit.calls(), 1);
    assert_eq!(exec.results[2].status, StepStatus::Completed);
    assert_eq!(exec.status, ExecutionStatus::Failed);
}

#[tokio::test]
async fn halt_skips_undispatched_independent_steps() {
    let h = Harness::new();
    h.tool("first", ScriptedTool::failing("bad"));
    let later = h.tool("later", ScriptedTool::ok(1));

    let plan = Plan::new(vec![Step::new("first"), Step::new("later")]);

    let exec = h
        .run(plan, fast().with_max_retries(0).with_parallel_limit(1))
        .await;

    assert_eq!(exec.results[1].status, StepStatus::Skipped);
    assert_eq!(exec.results[1].failure_kind, Some(FailureKind::Halted));
    assert_eq!(later.calls(), 0);
}

#[tokio::test]
async fn continue_on_error_runs_independent_steps() {
    let h = Harness::new();
    h.tool("first", ScriptedTool::failing("bad"));
    let child = h.tool("child", ScriptedTool::ok(1));
    let other = h.tool("other", ScriptedTool::ok(2));

    let plan = Plan::new(vec![
        Step::new("first"),
        Step::new("child").depends_on([0]),
        Step::new("other"),
    ]);

    let exec = h
        .run(
            plan,
            fast()
                .with_max_retries(0)
                .with_parallel_limit(1)
                .with_continue_on_error(true),
        )
        .await;

    assert_eq!(exec.results[0].status, StepStatus::Failed);
    assert_eq!(exec.results[1].status, StepStatus::Skipped);
    assert_eq!(exec.results[2].status, StepStatus::Completed);
    assert_eq!(child.calls(), 0);
    assert_eq!(other.calls(), 1);
    assert_eq!(exec.status, ExecutionStatus::Failed);
}

#[tokio::test]
async fn tool_panic_becomes_step_failure() {
    let h = Harness::new();
    let bomb = h.tool("bomb", ScriptedTool::panicking("kaboom"));
    h.tool("after", ScriptedTool::ok(1));

    let plan = Plan::new(vec![Step::new("bomb"), Step::new("after").depends_on([0])]);

    let exec = h.run(plan, fast().with_max_retries(1)).await;

    assert_eq!(bomb.calls(), 2);
    assert_eq!(exec.results[0].status, StepStatus::Failed);
    assert!(exec.results[0]
        .error
        .as_deref()
        .is_some_and(|e| e.contains("kaboom")));
    assert_eq!(exec.results[1].status, StepStatus::Skipped);
}

#[tokio::test]
async fn unknown_tool_fails_the_step() {
    let h = Harness::new();

    let exec = h
        .run(
            Plan::new(vec![Step::new("does_not_exist")]),
            fast().with_max_retries(0),
        )
        .await;

    assert!(exec.results[0]
        .error
        .as_deref()
        .is_some_and(|e| e.contains("PLX-041")));
}

#[tokio::test]
async fn cancellation_drains_in_flight_and_skips_the_rest() {
    let h = Harness::new();
    let slow = h.tool(
        "slow",
        ScriptedTool::ok(1).with_latency(Duration::from_millis(200)),
    );
    let next = h.tool("next", ScriptedTool::ok(2));

    let plan = Plan::new(vec![Step::new("slow"), Step::new("next").depends_on([0])]);
    let handle = h.engine().spawn(plan, fast()).unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(handle.snapshot().status, ExecutionStatus::Running);
    handle.cancel();

    let exec = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(exec.status, ExecutionStatus::Failed);
    assert!(exec.error.as_deref().is_some_and(|e| e.contains("PLX-050")));
    // In-flight step was allowed to finish
    assert_eq!(exec.results[0].status, StepStatus::Completed);
    assert_eq!(slow.calls(), 1);
    assert_eq!(exec.results[1].status, StepStatus::Skipped);
    assert_eq!(exec.results[1].failure_kind, Some(FailureKind::Cancelled));
    assert_eq!(next.calls(), 0);
}

#[tokio::test]
async fn timeout_fails_the_execution() {
    let h = Harness::new();
    h.tool(
        "slow",
        ScriptedTool::ok(1).with_latency(Duration::from_millis(300)),
    );
    let next = h.tool("next", ScriptedTool::ok(2));

    let plan = Plan::new(vec![Step::new("slow"), Step::new("next").depends_on([0])]);

    let exec = h.run(plan, fast().with_timeout_ms(Some(50))).await;

    assert_eq!(exec.status, ExecutionStatus::Failed);
    assert!(exec.error.as_deref().is_some_and(|e| e.contains("PLX-051")));
    assert_eq!(exec.results[1].status, StepStatus::Skipped);
    assert_eq!(next.calls(), 0);
}

#[tokio::test]
async fn diamond_respects_dependencies_under_concurrency() {
    let h = Harness::new();
    for (name, ms) in [("root", 5), ("left", 20), ("right", 5), ("join", 1), ("solo", 10)] {
        h.tool(
            name,
            ScriptedTool::ok(json!({"from": name})).with_latency(Duration::from_millis(ms)),
        );
    }

    let plan = Plan::new(vec![
        Step::new("root"),
        Step::new("left").depends_on([0]).parallel(),
        Step::new("right").depends_on([0]).parallel(),
        Step::new("join")
            .depends_on([1, 2])
            .with_params(json!({"pair": ["${step_1.result.from}", "${step_2.result.from}"]})),
        Step::new("solo"),
    ]);

    let exec = h.run(plan, fast().with_parallel_limit(2)).await;

    assert_eq!(exec.status, ExecutionStatus::Completed);
    assert_eq!(exec.results[3].params["pair"], json!(["left", "right"]));
    assert_eq!(
        h.events
            .count_where(|k| matches!(k, EventKind::StepCompleted { .. })),
        5
    );
}

#[tokio::test]
async fn events_bracket_the_execution() {
    let h = Harness::new();
    h.tool("a", ScriptedTool::ok(1));

    h.run(Plan::new(vec![Step::new("a")]), fast()).await;

    let kinds: Vec<EventKind> = h.events.events().into_iter().map(|e| e.kind).collect();
    assert!(matches!(kinds.first(), Some(EventKind::ExecutionStarted { step_count: 1, .. })));
    assert!(matches!(
        kinds.last(),
        Some(EventKind::ExecutionCompleted {
            completed_steps: 1,
            ..
        })
    ));
    assert!(kinds
        .iter()
        .any(|k| matches!(k, EventKind::StepStarted { step: 0, .. })));
}

#[tokio::test]
async fn engine_without_event_log_still_runs() {
    let registry = Arc::new(ToolRegistry::new());
    registry.register("ping", Arc::new(ScriptedTool::ok("pong")));

    let exec = Engine::new(registry)
        .execute(Plan::new(vec![Step::new("ping")]), fast())
        .await
        .unwrap();

    assert_eq!(exec.status, ExecutionStatus::Completed);
    assert_eq!(exec.results[0].result.as_deref(), Some(&json!("pong")));
}

#[tokio::test]
async fn invalid_plans_are_rejected_before_running() {
    let h = Harness::new();
    let tool = h.tool("a", ScriptedTool::ok(1));

    let forward = Plan::new(vec![Step::new("a").depends_on([1]), Step::new("a")]);
    let err = h.engine().execute(forward, fast()).await.unwrap_err();
    assert_eq!(err.code(), "PLX-010");

    let undeclared = Plan::new(vec![
        Step::new("a"),
        Step::new("a").with_params(json!({"x": "${step_0.result}"})),
    ]);
    let err = h.engine().execute(undeclared, fast()).await.unwrap_err();
    assert_eq!(err.code(), "PLX-010");

    let err = h
        .engine()
        .execute(Plan::new(vec![Step::new("a")]), fast().with_parallel_limit(0))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PLX-020");

    assert_eq!(tool.calls(), 0);
    assert!(h.sink.is_empty());
}
