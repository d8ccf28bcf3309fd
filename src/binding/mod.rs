//! Binding Module - data flow between steps
//!
//! - `template`: step reference syntax (`${step_N.result[0].field}`)
//! - `resolve`: Variable Resolver over completed dependency results
//!
//! Data flow:
//! ```text
//! Step.params (raw, may hold references)
//!        ↓
//!   parse_refs (template)
//!        ↓
//!   DependencyResults (completed deps only)
//!        ↓
//!   resolve_params → concrete params handed to the tool
//! ```

mod resolve;
mod template;

pub use resolve::{resolve_params, resolve_value, DependencyResults};
pub use template::{collect_refs, has_refs, parse_refs, whole_ref, StepRef};
