//! Execution Record Manager
//!
//! Owns the mutable state of one in-flight execution:
//! - one arena of step results, indexed by step, behind a single mutex
//! - per-step `StepSlot` handles: a runner can only write its own entry
//! - every step or execution status change is pushed to the sink as a full snapshot
//!
//! Once the execution is terminal, every mutation is refused.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

use crate::ast::Params;
use crate::binding::DependencyResults;

use super::execution::{
    CompensationRecord, Execution, ExecutionStatus, ExecutionStepResult, FailureKind, StepStatus,
};
use super::sink::ExecutionSink;

/// Shared handle to one execution's state (cheap to clone)
#[derive(Clone)]
pub struct ExecutionRecord {
    inner: Arc<Mutex<Execution>>,
    sink: Option<Arc<dyn ExecutionSink>>,
    completions: Arc<AtomicU64>,
}

impl ExecutionRecord {
    /// Wrap a fresh execution and persist its initial snapshot
    pub fn new(execution: Execution, sink: Option<Arc<dyn ExecutionSink>>) -> Self {
        let record = Self {
            inner: Arc::new(Mutex::new(execution)),
            sink,
            completions: Arc::new(AtomicU64::new(0)),
        };
        {
            let exec = record.inner.lock();
            record.persist(&exec);
        }
        record
    }

    pub fn execution_id(&self) -> String {
        self.inner.lock().execution_id.clone()
    }

    /// Immutable copy of the current state
    pub fn snapshot(&self) -> Execution {
        self.inner.lock().clone()
    }

    /// Read under the lock without cloning the whole execution
    pub fn read<R>(&self, f: impl FnOnce(&Execution) -> R) -> R {
        f(&self.inner.lock())
    }

    pub fn is_terminal(&self) -> bool {
        self.inner.lock().is_terminal()
    }

    /// Write handle for one step
    pub fn slot(&self, index: usize) -> StepSlot {
        StepSlot {
            record: self.clone(),
            index,
        }
    }

    /// Results of the given COMPLETED steps
    pub fn dependency_results(&self, deps: &[usize]) -> DependencyResults {
        let exec = self.inner.lock();
        deps.iter()
            .filter_map(|&dep| {
                let result = exec.step(dep)?;
                if result.status != StepStatus::Completed {
                    return None;
                }
                result.result.clone().map(|value| (dep, value))
            })
            .collect()
    }

    /// PENDING → SKIPPED; no-op for steps already past PENDING
    pub fn skip(&self, index: usize, kind: FailureKind, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.update_step(index, |r| {
            if r.status != StepStatus::Pending {
                return false;
            }
            r.status = StepStatus::Skipped;
            r.failure_kind = Some(kind);
            r.error = Some(reason);
            r.completed_at = Some(Utc::now());
            true
        })
    }

    /// Append a compensation outcome (rollback bookkeeping)
    pub fn record_compensation(&self, record: CompensationRecord) {
        let mut exec = self.inner.lock();
        if exec.is_terminal() {
            warn!(step = record.step_index, "Compensation recorded after execution finished, ignored");
            return;
        }
        if let Some(error) = &record.error {
            exec.rollback_errors
                .push(format!("step {} ({}): {}", record.step_index, record.tool, error));
        }
        exec.compensations.push(record);
    }

    /// Persist the current state without changing it (e.g. after rollback)
    pub fn checkpoint(&self) {
        let exec = self.inner.lock();
        self.persist(&exec);
    }

    /// Transition to a terminal status; returns the final immutable snapshot
    pub fn finish(&self, status: ExecutionStatus, error: Option<String>) -> Execution {
        let mut exec = self.inner.lock();
        if exec.is_terminal() {
            return exec.clone();
        }
        exec.status = status;
        exec.error = error;
        exec.completed_at = Some(Utc::now());
        exec.refresh_counts();
        self.persist(&exec);
        exec.clone()
    }

    /// Apply `f` to one step's entry; persists when `f` reports a status change
    fn update_step(&self, index: usize, f: impl FnOnce(&mut ExecutionStepResult) -> bool) -> bool {
        let mut exec = self.inner.lock();
        if exec.is_terminal() {
            warn!(step = index, "Update after execution finished, ignored");
            return false;
        }
        let Some(entry) = exec.results.get_mut(index) else {
            warn!(step = index, "Update for unknown step, ignored");
            return false;
        };
        let changed = f(entry);
        if changed {
            exec.refresh_counts();
            self.persist(&exec);
        }
        changed
    }

    fn persist(&self, exec: &Execution) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.persist(exec) {
                warn!(execution_id = %exec.execution_id, error = %e, "Failed to persist snapshot");
            }
        }
    }
}

/// Write access to exactly one step's result
///
/// Handed to the step runner that owns the step; there is no way to reach a
/// sibling entry through it.
#[derive(Clone)]
pub struct StepSlot {
    record: ExecutionRecord,
    index: usize,
}

impl StepSlot {
    pub fn index(&self) -> usize {
        self.index
    }

    /// PENDING → RUNNING
    pub fn start(&self) -> bool {
        self.record.update_step(self.index, |r| {
            if r.status != StepStatus::Pending {
                return false;
            }
            r.status = StepStatus::Running;
            r.started_at = Some(Utc::now());
            true
        })
    }

    /// Record the concrete params the tool will see
    pub fn set_resolved_params(&self, params: Params) {
        self.record.update_step(self.index, |r| {
            r.params = params;
            false
        });
    }

    pub fn set_prior_state(&self, prior: Value) {
        self.record.update_step(self.index, |r| {
            r.prior_state = Some(prior);
            false
        });
    }

    /// Bump `retryCount` before a retry attempt
    pub fn record_retry(&self) -> u32 {
        let mut count = 0;
        self.record.update_step(self.index, |r| {
            r.retry_count += 1;
            count = r.retry_count;
            false
        });
        count
    }

    /// RUNNING → COMPLETED
    pub fn complete(&self, result: Value) -> bool {
        let completions = &self.record.completions;
        self.record.update_step(self.index, |r| {
            if r.status != StepStatus::Running {
                return false;
            }
            r.status = StepStatus::Completed;
            r.result = Some(Arc::new(result));
            r.error = None;
            r.completed_at = Some(Utc::now());
            // Runs under the record lock, so the sequence follows completion order
            r.completion_seq = Some(completions.fetch_add(1, Ordering::SeqCst) + 1);
            true
        })
    }

    /// RUNNING → FAILED
    pub fn fail(&self, kind: FailureKind, error: impl Into<String>) -> bool {
        let error = error.into();
        self.record.update_step(self.index, |r| {
            if r.status != StepStatus::Running {
                return false;
            }
            r.status = StepStatus::Failed;
            r.failure_kind = Some(kind);
            r.error = Some(error);
            r.completed_at = Some(Utc::now());
            true
        })
    }
}
