//! Planex - plan execution engine for tool-call DAGs
//!
//! ## Module Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        DOMAIN MODEL                          │
//! │  ast/       JSON/YAML → Plan, Step, ExecutionConfig          │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      APPLICATION LAYER                       │
//! │  dag/       StepGraph + Plan Validator                       │
//! │  binding/   ${step_N.result...} references + resolver        │
//! │  runtime/   Engine, scheduler, step runner, rollback         │
//! │  resilience/ Retry with exponential backoff                  │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    INFRASTRUCTURE LAYER                      │
//! │  store/     Execution record + snapshot sinks                │
//! │  tools/     Tool capability interface + registry             │
//! │  event/     Event sourcing (EventLog, EventKind)             │
//! │  util/      JSON path walking                                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`ast`] | Plan parsing with an embedded JSON Schema, execution config |
//! | [`dag`] | Dependency graph, structural validation |
//! | [`binding`] | Template references and the Variable Resolver |
//! | [`runtime`] | Bounded-concurrency execution, retries, rollback |
//! | [`resilience`] | Backoff policy |
//! | [`store`] | Execution state, single mutation point, persistence |
//! | [`tools`] | Name → tool dispatch, mutation classes, compensations |
//! | [`event`] | Audit trail of each execution |
//! | [`util`] | JSON path helpers |
//! | [`config`] | Config file + environment overrides |
//! | [`error`] | Error types with codes and fix suggestions |

// ═══════════════════════════════════════════════════════════════
// DOMAIN MODEL
// ═══════════════════════════════════════════════════════════════
pub mod ast;

// ═══════════════════════════════════════════════════════════════
// APPLICATION LAYER
// ═══════════════════════════════════════════════════════════════
pub mod binding;
pub mod dag;
pub mod resilience;
pub mod runtime;

// ═══════════════════════════════════════════════════════════════
// INFRASTRUCTURE LAYER
// ═══════════════════════════════════════════════════════════════
pub mod event;
pub mod store;
pub mod tools;
pub mod util;

// ═══════════════════════════════════════════════════════════════
// CROSS-CUTTING
// ═══════════════════════════════════════════════════════════════
pub mod config;
pub mod error;

// ═══════════════════════════════════════════════════════════════
// PUBLIC API RE-EXPORTS
// ═══════════════════════════════════════════════════════════════

pub use error::{FixSuggestion, PlanexError, Result};

pub use config::PlanexConfig;

pub use ast::{ExecutionConfig, Params, Plan, PlanMetadata, Step};

pub use dag::{validate_plan, StepGraph, ValidationIssue, ValidationReport, ValidationWarning};

pub use binding::{resolve_params, DependencyResults};

pub use runtime::{Engine, ExecutionHandle};

pub use store::{
    CompensationRecord, Execution, ExecutionSink, ExecutionStatus, ExecutionStepResult,
    FailureKind, JsonlSink, MemorySink, StepStatus,
};

pub use tools::{
    Compensation, CompensationContext, Mutation, ScriptedTool, Tool, ToolFixtures, ToolInvoker,
    ToolOutcome, ToolRegistry,
};

pub use event::{Event, EventEmitter, EventKind, EventLog, NoopEmitter};
