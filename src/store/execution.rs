//! Execution - aggregate root of one plan run
//!
//! Field names are camelCase and statuses UPPERCASE on the wire, so snapshots
//! can be handed to analysis/summarization consumers as-is.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ast::{ExecutionConfig, Params, Plan};

/// Per-step state machine: PENDING → RUNNING → {COMPLETED, FAILED}, or PENDING → SKIPPED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution-level state: RUNNING → {COMPLETED, FAILED}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        })
    }
}

/// Why a step did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A template reference could not be satisfied (never retried)
    Resolution,
    /// The tool kept failing after the retry budget
    Tool,
    /// Skipped: a dependency did not complete
    DependencyFailed,
    /// Skipped: dispatch stopped after a fatal failure
    Halted,
    /// Skipped: the execution was cancelled or timed out
    Cancelled,
}

/// Outcome of one step, indexed identically to `Plan.steps`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStepResult {
    pub step_index: usize,
    pub tool: String,
    /// Raw params until resolution, then the resolved params handed to the tool
    pub params: Params,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Arc<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Order in which COMPLETED steps finished (1-based)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_seq: Option<u64>,
    /// State captured before an update-style tool ran, for rollback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_state: Option<Value>,
}

impl ExecutionStepResult {
    pub fn pending(step_index: usize, tool: impl Into<String>, params: Params) -> Self {
        Self {
            step_index,
            tool: tool.into(),
            params,
            status: StepStatus::Pending,
            result: None,
            error: None,
            failure_kind: None,
            retry_count: 0,
            started_at: None,
            completed_at: None,
            completion_seq: None,
            prior_state: None,
        }
    }
}

/// One compensating action issued during rollback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationRecord {
    pub step_index: usize,
    pub tool: String,
    /// None when no compensation was registered for the tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensating_tool: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One run of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub execution_id: String,
    /// Back-reference to the originating plan request (lookup only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_request_id: Option<String>,
    pub status: ExecutionStatus,
    pub results: Vec<ExecutionStepResult>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub skipped_steps: usize,
    /// Failure not attributable to a single step (cancellation, timeout)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compensations: Vec<CompensationRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rollback_errors: Vec<String>,
    pub config: ExecutionConfig,
}

impl Execution {
    /// Fresh RUNNING execution with every step PENDING
    pub fn new(plan: &Plan, config: ExecutionConfig) -> Self {
        let results = plan
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| ExecutionStepResult::pending(i, step.tool.clone(), step.params.clone()))
            .collect();

        Self {
            execution_id: uuid::Uuid::new_v4().to_string(),
            plan_request_id: plan.metadata.plan_id.clone(),
            status: ExecutionStatus::Running,
            results,
            started_at: Utc::now(),
            completed_at: None,
            total_steps: plan.len(),
            completed_steps: 0,
            failed_steps: 0,
            skipped_steps: 0,
            error: None,
            compensations: Vec::new(),
            rollback_errors: Vec::new(),
            config,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn step(&self, index: usize) -> Option<&ExecutionStepResult> {
        self.results.get(index)
    }

    pub fn status_of(&self, index: usize) -> Option<StepStatus> {
        self.results.get(index).map(|r| r.status)
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn running_steps(&self) -> usize {
        self.count(StepStatus::Running)
    }

    /// Every step reached COMPLETED, FAILED or SKIPPED
    pub fn all_steps_terminal(&self) -> bool {
        self.results.iter().all(|r| r.status.is_terminal())
    }

    /// Recompute the summary counters from `results`
    pub fn refresh_counts(&mut self) {
        self.total_steps = self.results.len();
        self.completed_steps = self.count(StepStatus::Completed);
        self.failed_steps = self.count(StepStatus::Failed);
        self.skipped_steps = self.count(StepStatus::Skipped);
    }

    /// COMPLETED step indices, most recently completed first
    pub fn reverse_completion_order(&self) -> Vec<usize> {
        let mut done: Vec<(u64, usize)> = self
            .results
            .iter()
            .filter(|r| r.status == StepStatus::Completed)
            .map(|r| (r.completion_seq.unwrap_or(0), r.step_index))
            .collect();
        done.sort_unstable_by(|a, b| b.cmp(a));
        done.into_iter().map(|(_, index)| index).collect()
    }
}
