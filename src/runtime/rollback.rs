//! Rollback Coordinator
//!
//! Runs at most once, right before an execution with `enableRollback` becomes FAILED.
//! Undoes COMPLETED mutating steps, most recently completed first. Best effort:
//! a failed compensation is recorded and the walk continues, no retries.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{info, instrument, warn};

use crate::event::{EventEmitter, EventKind};
use crate::store::{CompensationRecord, ExecutionRecord};
use crate::tools::{CompensationContext, ToolInvoker};

use super::step::panic_message;

/// Outcome counts of one rollback pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RollbackSummary {
    pub attempted: usize,
    pub failed: usize,
}

#[instrument(skip_all, fields(execution_id = %record.execution_id()))]
pub(crate) async fn roll_back(
    record: &ExecutionRecord,
    invoker: &dyn ToolInvoker,
    emitter: &dyn EventEmitter,
) -> RollbackSummary {
    let snapshot = record.snapshot();
    let targets: Vec<usize> = snapshot
        .reverse_completion_order()
        .into_iter()
        .filter(|&i| invoker.mutation(&snapshot.results[i].tool).is_mutating())
        .collect();

    info!(steps = ?targets, "Rolling back completed mutating steps");
    emitter.emit(EventKind::RollbackStarted {
        steps: targets.clone(),
    });

    let mut summary = RollbackSummary::default();
    for index in targets {
        let step = &snapshot.results[index];
        let ctx = CompensationContext {
            step_index: index,
            tool: &step.tool,
            mutation: invoker.mutation(&step.tool),
            params: &step.params,
            result: step.result.as_deref(),
            prior_state: step.prior_state.as_ref(),
        };
        summary.attempted += 1;

        let Some(compensation) = invoker.compensation(&ctx) else {
            let error = format!("no compensating action registered for '{}'", step.tool);
            warn!(step = index, %error, "Cannot compensate step");
            summary.failed += 1;
            emitter.emit(EventKind::CompensationFailed {
                step: index,
                error: error.clone(),
            });
            record.record_compensation(CompensationRecord {
                step_index: index,
                tool: step.tool.clone(),
                compensating_tool: None,
                success: false,
                error: Some(error),
            });
            continue;
        };

        emitter.emit(EventKind::CompensationIssued {
            step: index,
            tool: compensation.tool.clone(),
        });

        let error = match AssertUnwindSafe(invoker.invoke(&compensation.tool, &compensation.params))
            .catch_unwind()
            .await
        {
            Ok(outcome) if outcome.success => None,
            Ok(outcome) => Some(outcome.error_text()),
            Err(payload) => Some(format!(
                "compensation panicked: {}",
                panic_message(payload.as_ref())
            )),
        };

        if let Some(error) = &error {
            warn!(step = index, tool = %compensation.tool, %error, "Compensation failed");
            summary.failed += 1;
            emitter.emit(EventKind::CompensationFailed {
                step: index,
                error: error.clone(),
            });
        }

        record.record_compensation(CompensationRecord {
            step_index: index,
            tool: step.tool.clone(),
            compensating_tool: Some(compensation.tool),
            success: error.is_none(),
            error,
        });
    }

    record.checkpoint();
    summary
}
