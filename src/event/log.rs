//! EventLog - append-only audit trail of one execution
//!
//! - Event: envelope with id + timestamp + kind
//! - EventKind: execution, step and rollback level variants
//! - EventLog: thread-safe, append-only log

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Single event in the execution log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since the log was created (ms)
    pub timestamp_ms: u64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // EXECUTION LEVEL
    // ═══════════════════════════════════════════
    ExecutionStarted {
        execution_id: String,
        step_count: usize,
        parallel_limit: usize,
    },
    ExecutionCompleted {
        completed_steps: usize,
        total_duration_ms: u64,
    },
    ExecutionFailed {
        error: String,
        failed_steps: usize,
        skipped_steps: usize,
    },

    // ═══════════════════════════════════════════
    // STEP LEVEL
    // ═══════════════════════════════════════════
    StepDispatched {
        step: usize,
        tool: String,
        /// Steps in flight right after this dispatch
        in_flight: usize,
    },
    StepStarted {
        step: usize,
        params: Value,
    },
    StepRetrying {
        step: usize,
        retry: u32,
        delay_ms: u64,
        error: String,
    },
    StepCompleted {
        step: usize,
        result: Arc<Value>,
        duration_ms: u64,
    },
    StepFailed {
        step: usize,
        error: String,
        attempts: u32,
    },
    StepSkipped {
        step: usize,
        reason: String,
    },

    // ═══════════════════════════════════════════
    // ROLLBACK
    // ═══════════════════════════════════════════
    RollbackStarted {
        steps: Vec<usize>,
    },
    CompensationIssued {
        step: usize,
        tool: String,
    },
    CompensationFailed {
        step: usize,
        error: String,
    },
}

impl EventKind {
    /// Step index if the event is step-related
    pub fn step(&self) -> Option<usize> {
        match self {
            Self::StepDispatched { step, .. }
            | Self::StepStarted { step, .. }
            | Self::StepRetrying { step, .. }
            | Self::StepCompleted { step, .. }
            | Self::StepFailed { step, .. }
            | Self::StepSkipped { step, .. }
            | Self::CompensationIssued { step, .. }
            | Self::CompensationFailed { step, .. } => Some(*step),
            Self::ExecutionStarted { .. }
            | Self::ExecutionCompleted { .. }
            | Self::ExecutionFailed { .. }
            | Self::RollbackStarted { .. } => None,
        }
    }

    pub fn is_execution_event(&self) -> bool {
        matches!(
            self,
            Self::ExecutionStarted { .. }
                | Self::ExecutionCompleted { .. }
                | Self::ExecutionFailed { .. }
        )
    }
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event (thread-safe, returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };

        self.events.write().push(event);
        id
    }

    /// Get all events (cloned - use `with_events` for zero-copy access)
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Zero-copy access to events via callback
    ///
    /// Holds the read lock for the duration of the callback.
    pub fn with_events<T>(&self, f: impl FnOnce(&[Event]) -> T) -> T {
        f(&self.events.read())
    }

    pub fn filter_step(&self, step: usize) -> Vec<Event> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.step() == Some(step))
                .cloned()
                .collect()
        })
    }

    pub fn execution_events(&self) -> Vec<Event> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.is_execution_event())
                .cloned()
                .collect()
        })
    }

    /// Count events matching `pred` (no allocation)
    pub fn count_where(&self, pred: impl Fn(&EventKind) -> bool) -> usize {
        self.with_events(|events| events.iter().filter(|e| pred(&e.kind)).count())
    }

    /// Serialize to JSON for persistence/debugging
    pub fn to_json(&self) -> Value {
        self.with_events(|events| serde_json::to_value(events).unwrap_or(Value::Null))
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .finish()
    }
}
