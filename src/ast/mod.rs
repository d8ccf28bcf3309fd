//! AST Module - plan documents as Rust types
//!
//! Contains the parsed, immutable input of an execution:
//! - `plan`: Plan, Step, PlanMetadata, Params
//! - `config`: ExecutionConfig (per-execution knobs)
//! - `schema`: embedded JSON Schema check run before serde parsing
//!
//! These types represent the "what" - static structure handed over by the planner.
//! For runtime execution, see the `runtime` module.

mod config;
mod plan;
mod schema;

// Re-export all public types
pub use config::ExecutionConfig;
pub use plan::{Params, Plan, PlanMetadata, Step};
pub use schema::{PlanSchemaValidator, SchemaError};
