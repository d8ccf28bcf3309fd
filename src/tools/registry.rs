//! Tool capability interface
//!
//! The engine knows tools only by name. Everything tool-specific (what it does,
//! whether it mutates, how to undo it) comes from the invoker.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ast::Params;
use crate::error::PlanexError;

/// Result of one tool invocation: `{success, data?, error?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn success(data: impl Into<Value>) -> Self {
        Self {
            success: true,
            data: Some(data.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Error text of a failed outcome (placeholder when the tool gave none)
    pub fn error_text(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "tool reported failure without an error message".to_string())
    }
}

/// Side-effect class of a tool, drives rollback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutation {
    ReadOnly,
    Create,
    Update,
    Delete,
}

impl Mutation {
    pub fn is_mutating(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }

    /// Name heuristic on the leading verb: `create_user`, `updateRecord`, `delete-item`
    pub fn classify(tool: &str) -> Self {
        let mut verb = String::new();
        let mut prev_lower = false;
        for c in tool.chars() {
            // Stop at a separator or a camelCase hump
            if !c.is_ascii_alphanumeric() || (prev_lower && c.is_ascii_uppercase()) {
                break;
            }
            prev_lower = c.is_ascii_lowercase();
            verb.push(c.to_ascii_lowercase());
        }

        match verb.as_str() {
            "create" | "add" | "insert" | "new" | "post" => Self::Create,
            "update" | "set" | "patch" | "put" | "modify" | "edit" => Self::Update,
            "delete" | "remove" | "destroy" | "drop" => Self::Delete,
            _ => Self::ReadOnly,
        }
    }
}

/// An inverse operation for a completed mutating step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compensation {
    pub tool: String,
    #[serde(default)]
    pub params: Params,
}

/// What rollback knows about the step being undone
#[derive(Debug, Clone, Copy)]
pub struct CompensationContext<'a> {
    pub step_index: usize,
    pub tool: &'a str,
    pub mutation: Mutation,
    /// Params the step actually ran with (post-resolution)
    pub params: &'a Params,
    pub result: Option<&'a Value>,
    /// Captured before an update ran, when the tool supports it
    pub prior_state: Option<&'a Value>,
}

/// External tool registry as seen by the engine
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Invoke `tool`; transport errors must be reported as a failed outcome
    async fn invoke(&self, tool: &str, params: &Params) -> ToolOutcome;

    fn mutation(&self, tool: &str) -> Mutation {
        Mutation::classify(tool)
    }

    /// Snapshot the state an update is about to overwrite
    async fn capture_prior(&self, _tool: &str, _params: &Params) -> Option<Value> {
        None
    }

    /// Tool-specific compensation; `None` means the step cannot be undone
    fn compensation(&self, _ctx: &CompensationContext<'_>) -> Option<Compensation> {
        None
    }
}

/// One named tool inside a `ToolRegistry`
#[async_trait]
pub trait Tool: Send + Sync {
    async fn call(&self, params: &Params) -> ToolOutcome;

    /// Explicit side-effect class; `None` falls back to the name heuristic
    fn mutation(&self) -> Option<Mutation> {
        None
    }

    async fn capture_prior(&self, _params: &Params) -> Option<Value> {
        None
    }

    fn compensation(&self, _ctx: &CompensationContext<'_>) -> Option<Compensation> {
        None
    }
}

/// Name → tool lookup, safe to share across concurrent steps
#[derive(Default)]
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a tool under `name`
    pub fn register(&self, name: impl Into<String>, tool: Arc<dyn Tool>) {
        self.tools.insert(name.into(), tool);
    }

    pub fn with_tool(self, name: impl Into<String>, tool: Arc<dyn Tool>) -> Self {
        self.register(name, tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        // Clone the Arc out so no map guard is held across an await
        self.tools.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolInvoker for ToolRegistry {
    async fn invoke(&self, tool: &str, params: &Params) -> ToolOutcome {
        match self.get(tool) {
            Some(handler) => handler.call(params).await,
            None => ToolOutcome::failure(
                PlanexError::UnknownTool {
                    tool: tool.to_string(),
                }
                .to_string(),
            ),
        }
    }

    fn mutation(&self, tool: &str) -> Mutation {
        self.get(tool)
            .and_then(|handler| handler.mutation())
            .unwrap_or_else(|| Mutation::classify(tool))
    }

    async fn capture_prior(&self, tool: &str, params: &Params) -> Option<Value> {
        let handler = self.get(tool)?;
        handler.capture_prior(params).await
    }

    fn compensation(&self, ctx: &CompensationContext<'_>) -> Option<Compensation> {
        self.get(ctx.tool)?.compensation(ctx)
    }
}
