//! Store Module - execution state
//!
//! Key types:
//! - `Execution` / `ExecutionStepResult`: the aggregate and its per-step arena
//! - `ExecutionRecord`: single mutation point, hands out per-step `StepSlot`s
//! - `ExecutionSink`: durable snapshot store (`MemorySink`, `JsonlSink`)

mod execution;
mod record;
mod sink;

pub use execution::{
    CompensationRecord, Execution, ExecutionStatus, ExecutionStepResult, FailureKind, StepStatus,
};
pub use record::{ExecutionRecord, StepSlot};
pub use sink::{ExecutionSink, JsonlSink, MemorySink};
