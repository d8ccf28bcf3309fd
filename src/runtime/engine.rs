//! Engine - plan submission and execution handles
//!
//! ```rust,ignore
//! let engine = Engine::new(Arc::new(registry)).with_sink(Arc::new(MemorySink::new()));
//! let execution = engine.execute(plan, ExecutionConfig::default()).await?;
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ast::{ExecutionConfig, Plan};
use crate::dag::{validate_plan, StepGraph};
use crate::error::{PlanexError, Result};
use crate::event::{EventEmitter, EventLog, NoopEmitter};
use crate::store::{Execution, ExecutionRecord, ExecutionSink};
use crate::tools::ToolInvoker;

use super::scheduler::Scheduler;

/// Accepts validated plans and runs them against a tool invoker
#[derive(Clone)]
pub struct Engine {
    invoker: Arc<dyn ToolInvoker>,
    sink: Option<Arc<dyn ExecutionSink>>,
    emitter: Arc<dyn EventEmitter>,
}

impl Engine {
    pub fn new(invoker: Arc<dyn ToolInvoker>) -> Self {
        Self {
            invoker,
            sink: None,
            emitter: Arc::new(NoopEmitter::new()),
        }
    }

    /// Persist a snapshot on every status change
    pub fn with_sink(mut self, sink: Arc<dyn ExecutionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Record events into a shared log (default: events are dropped)
    pub fn with_event_log(mut self, event_log: EventLog) -> Self {
        self.emitter = Arc::new(event_log);
        self
    }

    /// Validate, run to completion and return the terminal snapshot
    pub async fn execute(&self, plan: Plan, config: ExecutionConfig) -> Result<Execution> {
        self.spawn(plan, config)?.wait().await
    }

    /// Validate and start an execution in the background
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(&self, plan: Plan, config: ExecutionConfig) -> Result<ExecutionHandle> {
        config.validate()?;
        let report = validate_plan(&plan)?;
        for warning in &report.warnings {
            warn!(%warning, "Plan warning");
        }

        let execution = Execution::new(&plan, config.clone());
        info!(
            execution_id = %execution.execution_id,
            plan_request_id = ?execution.plan_request_id,
            steps = plan.len(),
            "Plan accepted"
        );

        let record = ExecutionRecord::new(execution, self.sink.clone());
        let cancel = CancellationToken::new();

        let scheduler = Scheduler {
            graph: StepGraph::from_plan(&plan),
            plan: Arc::new(plan),
            config,
            record: record.clone(),
            invoker: Arc::clone(&self.invoker),
            emitter: Arc::clone(&self.emitter),
            cancel: cancel.clone(),
        };
        let join = tokio::spawn(scheduler.run());

        Ok(ExecutionHandle {
            record,
            cancel,
            join,
        })
    }
}

/// A running (or finished) execution
pub struct ExecutionHandle {
    record: ExecutionRecord,
    cancel: CancellationToken,
    join: JoinHandle<Execution>,
}

impl ExecutionHandle {
    pub fn execution_id(&self) -> String {
        self.record.execution_id()
    }

    /// Current committed state (poll)
    pub fn snapshot(&self) -> Execution {
        self.record.snapshot()
    }

    /// Plan-level cancellation: no new dispatch, in-flight steps drain, then FAILED
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the terminal snapshot
    pub async fn wait(self) -> Result<Execution> {
        self.join.await.map_err(|e| PlanexError::SchedulerFault {
            reason: e.to_string(),
        })
    }
}
