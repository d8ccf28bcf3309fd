//! DAG Scheduler - readiness tracking and bounded dispatch
//!
//! Loop:
//! 1. ready = PENDING steps whose dependencies are all COMPLETED (parallel-flagged first)
//! 2. dispatch while in-flight < parallelExecutionLimit
//! 3. wait for the next runner to finish (or cancellation / timeout)
//! 4. a FAILED step skips its transitive dependents; a tool failure without
//!    continueOnError stops dispatch and lets in-flight steps drain
//!
//! Runners mark themselves RUNNING, so RUNNING ⊆ in-flight ≤ limit.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use rustc_hash::FxHashSet;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::ast::{ExecutionConfig, Plan};
use crate::dag::StepGraph;
use crate::error::PlanexError;
use crate::event::{EventEmitter, EventKind};
use crate::resilience::{RetryConfig, RetryPolicy};
use crate::store::{Execution, ExecutionRecord, ExecutionStatus, FailureKind, StepStatus};
use crate::tools::ToolInvoker;

use super::rollback::roll_back;
use super::step::{StepReport, StepRunner};

/// Why dispatch stopped early
#[derive(Debug, Clone, PartialEq, Eq)]
enum Halt {
    /// A step exhausted its retries and continueOnError is off
    StepFailed(usize),
    Cancelled,
    TimedOut(u64),
}

impl Halt {
    fn skip_kind(&self) -> FailureKind {
        match self {
            Self::StepFailed(_) => FailureKind::Halted,
            Self::Cancelled | Self::TimedOut(_) => FailureKind::Cancelled,
        }
    }

    fn skip_reason(&self) -> String {
        match self {
            Self::StepFailed(step) => format!("execution halted after step_{} failed", step),
            Self::Cancelled => "execution cancelled before dispatch".to_string(),
            Self::TimedOut(ms) => format!("execution timed out after {}ms before dispatch", ms),
        }
    }

    /// Top-level error for failures not attributable to one step
    fn execution_error(&self) -> Option<PlanexError> {
        match self {
            Self::StepFailed(_) => None,
            Self::Cancelled => Some(PlanexError::ExecutionCancelled),
            Self::TimedOut(timeout_ms) => Some(PlanexError::ExecutionTimeout {
                timeout_ms: *timeout_ms,
            }),
        }
    }
}

/// One coordinating scheduler per execution
pub(crate) struct Scheduler {
    pub plan: Arc<Plan>,
    pub graph: StepGraph,
    pub config: ExecutionConfig,
    pub record: ExecutionRecord,
    pub invoker: Arc<dyn ToolInvoker>,
    pub emitter: Arc<dyn EventEmitter>,
    pub cancel: CancellationToken,
}

impl Scheduler {
    /// Drive the execution to a terminal snapshot
    #[instrument(
        name = "execution",
        skip(self),
        fields(execution_id = %self.record.execution_id(), steps = self.plan.len())
    )]
    pub async fn run(self) -> Execution {
        let started = Instant::now();
        let limit = self.config.parallel_execution_limit.max(1);
        let policy = RetryPolicy::new(RetryConfig::from(&self.config));
        let deadline = self
            .config
            .timeout()
            .map(|timeout| tokio::time::Instant::now() + timeout);

        info!(limit, "Starting execution");
        self.emitter.emit(EventKind::ExecutionStarted {
            execution_id: self.record.execution_id(),
            step_count: self.plan.len(),
            parallel_limit: limit,
        });

        let mut join_set: JoinSet<StepReport> = JoinSet::new();
        let mut in_flight: FxHashSet<usize> = FxHashSet::default();
        let mut halt: Option<Halt> = None;
        let mut fault: Option<String> = None;

        loop {
            if halt.is_none() {
                if self.cancel.is_cancelled() {
                    halt = Some(Halt::Cancelled);
                } else if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                    halt = Some(Halt::TimedOut(self.config.timeout_ms.unwrap_or_default()));
                }
            }

            if halt.is_none() {
                for index in self.ready_steps(&in_flight) {
                    if in_flight.len() >= limit {
                        break;
                    }
                    self.dispatch(index, &policy, &mut join_set, &mut in_flight);
                }
            }

            if join_set.is_empty() {
                break;
            }

            let can_stop = halt.is_none();
            let joined = tokio::select! {
                biased;
                _ = self.cancel.cancelled(), if can_stop => {
                    info!(in_flight = in_flight.len(), "Cancellation requested, draining");
                    halt = Some(Halt::Cancelled);
                    continue;
                }
                _ = sleep_until(deadline), if can_stop && deadline.is_some() => {
                    warn!(in_flight = in_flight.len(), "Execution timed out, draining");
                    halt = Some(Halt::TimedOut(self.config.timeout_ms.unwrap_or_default()));
                    continue;
                }
                joined = join_set.join_next() => joined,
            };

            match joined {
                Some(Ok(report)) => {
                    in_flight.remove(&report.index);
                    self.on_step_finished(&report, &mut halt);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Step task aborted");
                    fault.get_or_insert_with(|| e.to_string());
                }
                None => break,
            }
        }

        self.finalize(halt, fault, started).await
    }

    /// PENDING steps with every dependency COMPLETED, parallel-flagged first then by index
    fn ready_steps(&self, in_flight: &FxHashSet<usize>) -> Vec<usize> {
        let mut ready: Vec<usize> = self.record.read(|exec| {
            (0..self.graph.len())
                .filter(|i| !in_flight.contains(i))
                .filter(|&i| exec.status_of(i) == Some(StepStatus::Pending))
                .filter(|&i| {
                    self.graph
                        .dependencies(i)
                        .iter()
                        .all(|&dep| exec.status_of(dep) == Some(StepStatus::Completed))
                })
                .collect()
        });
        ready.sort_by_key(|&i| (!self.plan.steps[i].parallel, i));
        ready
    }

    fn dispatch(
        &self,
        index: usize,
        policy: &RetryPolicy,
        join_set: &mut JoinSet<StepReport>,
        in_flight: &mut FxHashSet<usize>,
    ) {
        let step = self.plan.steps[index].clone();
        in_flight.insert(index);
        debug!(step = index, tool = %step.tool, in_flight = in_flight.len(), "Dispatching step");
        self.emitter.emit(EventKind::StepDispatched {
            step: index,
            tool: step.tool.clone(),
            in_flight: in_flight.len(),
        });

        let runner = StepRunner {
            deps: self.record.dependency_results(self.graph.dependencies(index)),
            step,
            slot: self.record.slot(index),
            invoker: Arc::clone(&self.invoker),
            policy: policy.clone(),
            emitter: Arc::clone(&self.emitter),
        };

        join_set.spawn(async move {
            AssertUnwindSafe(runner.run())
                .catch_unwind()
                .await
                .unwrap_or_else(|_| StepReport::crashed(index))
        });
    }

    fn on_step_finished(&self, report: &StepReport, halt: &mut Option<Halt>) {
        if report.status != StepStatus::Failed {
            return;
        }

        // Runner crashed before finalizing its slot
        let finalized = self
            .record
            .read(|exec| exec.status_of(report.index) == Some(StepStatus::Failed));
        if !finalized {
            self.record
                .slot(report.index)
                .fail(FailureKind::Tool, "step runner panicked");
        }

        let reason = format!("dependency step_{} failed", report.index);
        for dependent in self.graph.transitive_dependents(report.index) {
            if self.record.skip(dependent, FailureKind::DependencyFailed, reason.clone()) {
                debug!(step = dependent, %reason, "Skipping step");
                self.emitter.emit(EventKind::StepSkipped {
                    step: dependent,
                    reason: reason.clone(),
                });
            }
        }

        if report.failure == Some(FailureKind::Tool)
            && !self.config.continue_on_error
            && halt.is_none()
        {
            warn!(step = report.index, "Fatal step failure, halting dispatch");
            *halt = Some(Halt::StepFailed(report.index));
        }
    }

    async fn finalize(
        &self,
        halt: Option<Halt>,
        fault: Option<String>,
        started: Instant,
    ) -> Execution {
        // Whatever never got dispatched
        let leftover: Vec<usize> = self.record.read(|exec| {
            exec.results
                .iter()
                .filter(|r| !r.status.is_terminal())
                .map(|r| r.step_index)
                .collect()
        });
        let mut fault = fault;
        for index in leftover {
            let (kind, reason) = match &halt {
                Some(halt) => (halt.skip_kind(), halt.skip_reason()),
                None => {
                    fault.get_or_insert_with(|| format!("step_{} was never dispatched", index));
                    (FailureKind::Halted, "never dispatched".to_string())
                }
            };
            if self.record.skip(index, kind, reason.clone()) {
                self.emitter.emit(EventKind::StepSkipped {
                    step: index,
                    reason,
                });
            } else {
                // Still RUNNING: its task was aborted
                self.record
                    .slot(index)
                    .fail(FailureKind::Tool, "step task aborted");
            }
        }

        let top_error = halt
            .as_ref()
            .and_then(Halt::execution_error)
            .or_else(|| fault.map(|reason| PlanexError::SchedulerFault { reason }))
            .map(|e| e.to_string());

        let failed = top_error.is_some() || self.record.read(|exec| exec.count(StepStatus::Failed) > 0);

        if !failed {
            let exec = self.record.finish(ExecutionStatus::Completed, None);
            info!(
                completed = exec.completed_steps,
                duration_ms = started.elapsed().as_millis() as u64,
                "Execution completed"
            );
            self.emitter.emit(EventKind::ExecutionCompleted {
                completed_steps: exec.completed_steps,
                total_duration_ms: started.elapsed().as_millis() as u64,
            });
            return exec;
        }

        if self.config.enable_rollback {
            let summary =
                roll_back(&self.record, self.invoker.as_ref(), self.emitter.as_ref()).await;
            info!(
                attempted = summary.attempted,
                failed = summary.failed,
                "Rollback finished"
            );
        }

        let exec = self.record.finish(ExecutionStatus::Failed, top_error);
        let error = exec
            .error
            .clone()
            .unwrap_or_else(|| format!("{} step(s) failed", exec.failed_steps));
        warn!(
            failed = exec.failed_steps,
            skipped = exec.skipped_steps,
            %error,
            "Execution failed"
        );
        self.emitter.emit(EventKind::ExecutionFailed {
            error,
            failed_steps: exec.failed_steps,
            skipped_steps: exec.skipped_steps,
        });
        exec
    }
}

/// Sleep until `deadline`, or forever when there is none
async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
