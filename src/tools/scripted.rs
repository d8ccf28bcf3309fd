//! Scripted tools - deterministic tool doubles
//!
//! Used by the CLI (`--tools fixtures.yaml`) and by tests:
//! - canned outcomes consumed in order, the last one repeating
//! - optional latency and a shared barrier (to prove overlap)
//! - call counter + recorded params
//! - optional compensation tool for rollback, and a prior state to hand it

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Barrier;

use crate::ast::Params;
use crate::error::{PlanexError, Result};

use super::registry::{Compensation, CompensationContext, Mutation, Tool, ToolOutcome, ToolRegistry};

/// A tool that replays a fixed script
pub struct ScriptedTool {
    outcomes: Vec<ToolOutcome>,
    latency: Option<Duration>,
    barrier: Option<Arc<Barrier>>,
    mutation: Option<Mutation>,
    compensating_tool: Option<String>,
    prior_state: Option<Value>,
    panic_message: Option<String>,
    calls: AtomicU32,
    seen: Mutex<Vec<Params>>,
}

impl ScriptedTool {
    /// Replays `outcomes` in order; the last one repeats (empty → success with null)
    pub fn new(outcomes: Vec<ToolOutcome>) -> Self {
        Self {
            outcomes,
            latency: None,
            barrier: None,
            mutation: None,
            compensating_tool: None,
            prior_state: None,
            panic_message: None,
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Always succeeds with `data`
    pub fn ok(data: impl Into<Value>) -> Self {
        Self::new(vec![ToolOutcome::success(data)])
    }

    /// Always fails with `error`
    pub fn failing(error: impl Into<String>) -> Self {
        Self::new(vec![ToolOutcome::failure(error)])
    }

    /// Fails `failures` times, then succeeds with `data`
    pub fn flaky(failures: usize, data: impl Into<Value>) -> Self {
        let mut outcomes: Vec<ToolOutcome> = (1..=failures)
            .map(|n| ToolOutcome::failure(format!("transient failure #{}", n)))
            .collect();
        outcomes.push(ToolOutcome::success(data));
        Self::new(outcomes)
    }

    /// Panics on every call
    pub fn panicking(message: impl Into<String>) -> Self {
        let mut tool = Self::new(Vec::new());
        tool.panic_message = Some(message.into());
        tool
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Every call waits on `barrier` before returning
    pub fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    pub fn with_mutation(mut self, mutation: Mutation) -> Self {
        self.mutation = Some(mutation);
        self
    }

    /// Rollback calls `tool` with the undone step's params, result and prior state
    pub fn compensated_by(mut self, tool: impl Into<String>) -> Self {
        self.compensating_tool = Some(tool.into());
        self
    }

    /// State reported by `capture_prior` before each update
    pub fn with_prior(mut self, prior: impl Into<Value>) -> Self {
        self.prior_state = Some(prior.into());
        self
    }

    /// Number of times the tool has been invoked
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Params of every invocation, in call order
    pub fn seen_params(&self) -> Vec<Params> {
        self.seen.lock().clone()
    }

    fn outcome_for(&self, call: usize) -> ToolOutcome {
        match self.outcomes.len() {
            0 => ToolOutcome::success(Value::Null),
            len => self.outcomes[call.min(len - 1)].clone(),
        }
    }
}

#[async_trait]
impl Tool for ScriptedTool {
    async fn call(&self, params: &Params) -> ToolOutcome {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        self.seen.lock().push(params.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if let Some(message) = &self.panic_message {
            panic!("{}", message);
        }

        self.outcome_for(call)
    }

    fn mutation(&self) -> Option<Mutation> {
        self.mutation
    }

    async fn capture_prior(&self, _params: &Params) -> Option<Value> {
        self.prior_state.clone()
    }

    fn compensation(&self, ctx: &CompensationContext<'_>) -> Option<Compensation> {
        let tool = self.compensating_tool.clone()?;
        let mut params = Params::new();
        params.insert("stepIndex".to_string(), json!(ctx.step_index));
        params.insert("original".to_string(), Value::Object(ctx.params.clone()));
        params.insert("result".to_string(), ctx.result.cloned().unwrap_or(Value::Null));
        if let Some(prior) = ctx.prior_state {
            params.insert("priorState".to_string(), prior.clone());
        }
        Some(Compensation { tool, params })
    }
}

/// Fixture entry for one scripted tool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ToolFixture {
    #[serde(default)]
    pub outcomes: Vec<ToolOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation: Option<Mutation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_state: Option<Value>,
}

/// Fixture file: `tools: { name: ToolFixture }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolFixtures {
    #[serde(default)]
    pub tools: BTreeMap<String, ToolFixture>,
}

impl ToolFixtures {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load fixtures, choosing the format from the extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PlanexError::ConfigError {
            reason: format!("cannot read tool fixtures {}: {}", path.display(), e),
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Build a registry of scripted tools
    pub fn into_registry(self) -> ToolRegistry {
        let registry = ToolRegistry::new();
        for (name, fixture) in self.tools {
            let mut tool = ScriptedTool::new(fixture.outcomes);
            if let Some(ms) = fixture.latency_ms {
                tool = tool.with_latency(Duration::from_millis(ms));
            }
            if let Some(mutation) = fixture.mutation {
                tool = tool.with_mutation(mutation);
            }
            if let Some(compensation) = fixture.compensation {
                tool = tool.compensated_by(compensation);
            }
            if let Some(prior) = fixture.prior_state {
                tool = tool.with_prior(prior);
            }
            registry.register(name, Arc::new(tool));
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolInvoker;

    #[tokio::test]
    async fn replays_script_then_repeats_last() {
        let tool = ScriptedTool::flaky(2, json!("done"));
        let params = Params::new();

        assert!(!tool.call(&params).await.success);
        assert!(!tool.call(&params).await.success);
        assert_eq!(tool.call(&params).await.data, Some(json!("done")));
        assert_eq!(tool.call(&params).await.data, Some(json!("done")));
        assert_eq!(tool.calls(), 4);
    }

    #[tokio::test]
    async fn empty_script_succeeds_with_null() {
        let tool = ScriptedTool::new(vec![]);
        let outcome = tool.call(&Params::new()).await;
        assert!(outcome.success);
        assert_eq!(outcome.data, Some(Value::Null));
    }

    #[tokio::test]
    async fn records_params() {
        let tool = ScriptedTool::ok(1);
        let mut params = Params::new();
        params.insert("id".to_string(), json!(42));
        tool.call(&params).await;
        assert_eq!(tool.seen_params(), vec![params]);
    }

    #[test]
    fn compensation_carries_context() {
        let tool = ScriptedTool::ok(json!({"id": 1})).compensated_by("delete_user");
        let params = Params::new();
        let result = json!({"id": 1});
        let ctx = CompensationContext {
            step_index: 3,
            tool: "create_user",
            mutation: Mutation::Create,
            params: &params,
            result: Some(&result),
            prior_state: None,
        };
        let compensation = tool.compensation(&ctx).unwrap();
        assert_eq!(compensation.tool, "delete_user");
        assert_eq!(compensation.params["stepIndex"], json!(3));
        assert_eq!(compensation.params["result"], result);
        assert!(!compensation.params.contains_key("priorState"));
    }

    #[tokio::test]
    async fn prior_state_is_captured_through_the_registry() {
        let registry = ToolRegistry::new().with_tool(
            "update_profile",
            Arc::new(ScriptedTool::ok(json!({"name": "new"})).with_prior(json!({"name": "old"}))),
        );
        let prior = registry.capture_prior("update_profile", &Params::new()).await;
        assert_eq!(prior, Some(json!({"name": "old"})));
        assert_eq!(registry.capture_prior("missing", &Params::new()).await, None);
    }

    #[tokio::test]
    async fn fixtures_build_a_registry() {
        let fixtures = ToolFixtures::from_yaml(
            r#"
tools:
  list_users:
    outcomes:
      - success: true
        data: [{id: 1}]
  create_user:
    mutation: create
    compensation: delete_user
  set_plan:
    priorState: {tier: free}
  flaky:
    latencyMs: 1
    outcomes:
      - {success: false, error: "503"}
      - {success: true, data: ok}
"#,
        )
        .unwrap();
        let registry = fixtures.into_registry();

        assert_eq!(registry.len(), 4);
        let outcome = registry.invoke("list_users", &Params::new()).await;
        assert_eq!(outcome.data, Some(json!([{"id": 1}])));
        assert_eq!(registry.mutation("create_user"), Mutation::Create);
        assert_eq!(registry.mutation("set_plan"), Mutation::Update);
        assert_eq!(
            registry.capture_prior("set_plan", &Params::new()).await,
            Some(json!({"tier": "free"}))
        );
        assert!(!registry.invoke("flaky", &Params::new()).await.success);
        assert!(registry.invoke("flaky", &Params::new()).await.success);
    }

    #[test]
    fn fixtures_reject_unknown_keys() {
        assert!(ToolFixtures::from_yaml("tools:\n  a:\n    outcome: []\n").is_err());
    }
}
