//! Step Runner - one step from PENDING to a terminal outcome
//!
//! resolve (once) → [capture prior state] → invoke → retry with backoff → COMPLETED | FAILED
//!
//! The runner writes only through its own `StepSlot`. Dependency results are
//! collected by the scheduler at dispatch time.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::ast::{Params, Step};
use crate::binding::{resolve_params, DependencyResults};
use crate::error::PlanexError;
use crate::event::{EventEmitter, EventKind};
use crate::resilience::{Exhausted, RetryPolicy};
use crate::store::{FailureKind, StepSlot, StepStatus};
use crate::tools::{Mutation, ToolInvoker};

/// What the scheduler learns when a runner finishes
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StepReport {
    pub index: usize,
    pub status: StepStatus,
    pub failure: Option<FailureKind>,
    pub attempts: u32,
}

impl StepReport {
    fn completed(index: usize, attempts: u32) -> Self {
        Self {
            index,
            status: StepStatus::Completed,
            failure: None,
            attempts,
        }
    }

    fn failed(index: usize, kind: FailureKind, attempts: u32) -> Self {
        Self {
            index,
            status: StepStatus::Failed,
            failure: Some(kind),
            attempts,
        }
    }

    /// The runner itself panicked; the scheduler finalizes the slot
    pub fn crashed(index: usize) -> Self {
        Self::failed(index, FailureKind::Tool, 0)
    }
}

pub(crate) struct StepRunner {
    pub step: Step,
    pub slot: StepSlot,
    pub deps: DependencyResults,
    pub invoker: Arc<dyn ToolInvoker>,
    pub policy: RetryPolicy,
    pub emitter: Arc<dyn EventEmitter>,
}

impl StepRunner {
    #[instrument(name = "step", skip(self), fields(step = self.slot.index(), tool = %self.step.tool))]
    pub async fn run(self) -> StepReport {
        let index = self.slot.index();
        let start = Instant::now();

        if !self.slot.start() {
            warn!("Step was not PENDING at dispatch");
            return StepReport::failed(index, FailureKind::Tool, 0);
        }

        // (1) Resolution: deterministic, never retried
        let params = match resolve_params(&self.step.params, &self.deps) {
            Ok(params) => params,
            Err(e) => {
                debug!(error = %e, "Parameter resolution failed");
                self.slot.fail(FailureKind::Resolution, e.to_string());
                self.emitter.emit(EventKind::StepFailed {
                    step: index,
                    error: e.to_string(),
                    attempts: 0,
                });
                return StepReport::failed(index, FailureKind::Resolution, 0);
            }
        };
        self.slot.set_resolved_params(params.clone());
        self.emitter.emit(EventKind::StepStarted {
            step: index,
            params: Value::Object(params.clone()),
        });

        if self.invoker.mutation(&self.step.tool) == Mutation::Update {
            if let Some(prior) = self.capture_prior(&params).await {
                self.slot.set_prior_state(prior);
            }
        }

        // (2)-(3) Invoke with retry
        let invoker = self.invoker.as_ref();
        let tool = self.step.tool.as_str();
        let resolved = &params;
        let outcome = self
            .policy
            .execute(
                move |attempt| async move {
                    invoke_once(invoker, tool, resolved)
                        .await
                        .map(|data| (data, attempt + 1))
                },
                |retry| {
                    let retry_count = self.slot.record_retry();
                    warn!(
                        retry = retry_count,
                        delay_ms = retry.delay.as_millis() as u64,
                        error = %retry.error,
                        "Tool failed, retrying"
                    );
                    self.emitter.emit(EventKind::StepRetrying {
                        step: index,
                        retry: retry.retry,
                        delay_ms: retry.delay.as_millis() as u64,
                        error: retry.error.clone(),
                    });
                },
            )
            .await;

        // (4) Terminal outcome
        match outcome {
            Ok((data, attempts)) => {
                let result = Arc::new(data);
                self.slot.complete(Value::clone(&result));
                self.emitter.emit(EventKind::StepCompleted {
                    step: index,
                    result,
                    duration_ms: start.elapsed().as_millis() as u64,
                });
                StepReport::completed(index, attempts)
            }
            Err(Exhausted {
                attempts,
                last_error,
            }) => {
                let error = if attempts > 1 {
                    PlanexError::RetryExhausted {
                        attempts,
                        last_error,
                    }
                } else {
                    PlanexError::ToolFailed {
                        tool: tool.to_string(),
                        reason: last_error,
                    }
                };
                self.slot.fail(FailureKind::Tool, error.to_string());
                self.emitter.emit(EventKind::StepFailed {
                    step: index,
                    error: error.to_string(),
                    attempts,
                });
                StepReport::failed(index, FailureKind::Tool, attempts)
            }
        }
    }

    async fn capture_prior(&self, params: &Params) -> Option<Value> {
        AssertUnwindSafe(self.invoker.capture_prior(&self.step.tool, params))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                warn!(panic = %panic_message(payload.as_ref()), "Prior-state capture panicked");
                None
            })
    }
}

/// One attempt: any non-success (including a panic) is a retryable error
async fn invoke_once(invoker: &dyn ToolInvoker, tool: &str, params: &Params) -> Result<Value, String> {
    match AssertUnwindSafe(invoker.invoke(tool, params))
        .catch_unwind()
        .await
    {
        Ok(outcome) if outcome.success => Ok(outcome.data.unwrap_or(Value::Null)),
        Ok(outcome) => Err(outcome.error_text()),
        Err(payload) => Err(PlanexError::ToolPanicked {
            tool: tool.to_string(),
            message: panic_message(payload.as_ref()),
        }
        .to_string()),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
