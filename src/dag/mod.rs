//! DAG Module - plan structure and validation
//!
//! - `graph`: StepGraph (dependencies, successors, transitive dependents)
//! - `validate`: Plan Validator (dense indices, backward-only deps, declared references)

mod graph;
mod validate;

pub use graph::{EdgeVec, StepGraph};
pub use validate::{
    check_plan, validate_plan, ValidationIssue, ValidationReport, ValidationWarning,
};
