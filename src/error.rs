// The #[error] attribute from thiserror uses struct fields via string interpolation,
// but Rust's unused_assignments lint doesn't recognize this.
#![allow(unused_assignments)]

//! Planex Error Types with Error Codes
//!
//! Error code ranges:
//! - PLX-001-009: Plan document errors (parse, schema)
//! - PLX-010-019: Plan validation errors
//! - PLX-020-029: Configuration errors
//! - PLX-030-039: Template / resolution errors
//! - PLX-040-049: Tool invocation errors
//! - PLX-050-059: Execution errors
//! - PLX-060-069: Persistence errors
//! - PLX-090-099: IO / serialization errors

use miette::Diagnostic;
use thiserror::Error;

use crate::ast::SchemaError;
use crate::dag::ValidationIssue;

pub type Result<T> = std::result::Result<T, PlanexError>;

/// Format schema validation errors for display
fn format_schema_errors(errors: &[SchemaError]) -> String {
    if errors.is_empty() {
        return "no errors".to_string();
    }
    if errors.len() == 1 {
        return errors[0].to_string();
    }
    format!(
        "{} errors: {}",
        errors.len(),
        errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    )
}

/// Format structural validation issues for display
fn format_issues(issues: &[ValidationIssue]) -> String {
    match issues.len() {
        0 => "no issues".to_string(),
        1 => issues[0].to_string(),
        n => format!(
            "{} issues: {}",
            n,
            issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        ),
    }
}

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
///
/// Implements both `thiserror::Error` for std error compatibility
/// and `miette::Diagnostic` for fancy terminal error display.
#[derive(Error, Debug, Diagnostic)]
pub enum PlanexError {
    // ═══════════════════════════════════════════
    // PLAN DOCUMENT ERRORS (001-009)
    // ═══════════════════════════════════════════
    #[error("[PLX-001] Failed to parse plan: {details}")]
    #[diagnostic(code(planex::parse_error), help("Check the JSON/YAML syntax of the plan"))]
    ParseError { details: String },

    #[error("[PLX-002] Plan schema validation failed: {}", format_schema_errors(.errors))]
    #[diagnostic(
        code(planex::schema_validation_failed),
        help("Plans need a `steps` array; every step needs a `tool` string")
    )]
    SchemaValidationFailed { errors: Vec<SchemaError> },

    #[error("[PLX-003] Plan file not found: {path}")]
    #[diagnostic(code(planex::plan_not_found), help("Check the file path exists"))]
    PlanNotFound { path: String },

    // ═══════════════════════════════════════════
    // VALIDATION ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[PLX-010] Plan is structurally invalid: {}", format_issues(.issues))]
    #[diagnostic(
        code(planex::invalid_plan),
        help("Dependencies must point to earlier steps and cover every referenced step")
    )]
    InvalidPlan { issues: Vec<ValidationIssue> },

    #[error("[PLX-011] Plan has no steps")]
    #[diagnostic(code(planex::empty_plan))]
    EmptyPlan,

    // ═══════════════════════════════════════════
    // CONFIG ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[PLX-020] Invalid execution config: {reason}")]
    #[diagnostic(code(planex::invalid_config))]
    InvalidConfig { reason: String },

    #[error("[PLX-021] Configuration error: {reason}")]
    #[diagnostic(code(planex::config_error))]
    ConfigError { reason: String },

    // ═══════════════════════════════════════════
    // TEMPLATE / RESOLUTION ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[PLX-030] Malformed template reference in '{template}': {reason}")]
    #[diagnostic(code(planex::template_syntax))]
    TemplateSyntax { template: String, reason: String },

    #[error("[PLX-031] Reference '{reference}' points at step {step}, which has no completed result")]
    #[diagnostic(code(planex::unresolved_reference))]
    UnresolvedReference { reference: String, step: usize },

    #[error("[PLX-032] Reference '{reference}': field '{segment}' not found in step result")]
    #[diagnostic(code(planex::path_not_found))]
    PathNotFound { reference: String, segment: String },

    #[error("[PLX-033] Reference '{reference}': index {index} out of range (length {len})")]
    #[diagnostic(code(planex::index_out_of_range))]
    IndexOutOfRange {
        reference: String,
        index: usize,
        len: usize,
    },

    // ═══════════════════════════════════════════
    // TOOL ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[PLX-040] Tool '{tool}' failed: {reason}")]
    #[diagnostic(code(planex::tool_failed))]
    ToolFailed { tool: String, reason: String },

    #[error("[PLX-041] Unknown tool '{tool}'")]
    #[diagnostic(code(planex::unknown_tool))]
    UnknownTool { tool: String },

    #[error("[PLX-042] Tool '{tool}' panicked: {message}")]
    #[diagnostic(code(planex::tool_panicked))]
    ToolPanicked { tool: String, message: String },

    #[error("[PLX-043] Gave up after {attempts} attempts: {last_error}")]
    #[diagnostic(code(planex::retry_exhausted))]
    RetryExhausted { attempts: u32, last_error: String },

    // ═══════════════════════════════════════════
    // EXECUTION ERRORS (050-059)
    // ═══════════════════════════════════════════
    #[error("[PLX-050] Execution cancelled before all steps ran")]
    #[diagnostic(code(planex::execution_cancelled))]
    ExecutionCancelled,

    #[error("[PLX-051] Execution timed out after {timeout_ms}ms")]
    #[diagnostic(code(planex::execution_timeout))]
    ExecutionTimeout { timeout_ms: u64 },

    #[error("[PLX-052] Scheduler fault: {reason}")]
    #[diagnostic(code(planex::scheduler_fault))]
    SchedulerFault { reason: String },

    // ═══════════════════════════════════════════
    // PERSISTENCE ERRORS (060-069)
    // ═══════════════════════════════════════════
    #[error("[PLX-060] Failed to persist execution snapshot: {reason}")]
    #[diagnostic(code(planex::persistence_error))]
    PersistenceError { reason: String },

    // ═══════════════════════════════════════════
    // IO / SERIALIZATION (090-099)
    // ═══════════════════════════════════════════
    #[error("[PLX-090] IO error: {0}")]
    #[diagnostic(code(planex::io_error))]
    Io(#[from] std::io::Error),

    #[error("[PLX-091] JSON error: {0}")]
    #[diagnostic(code(planex::json_error))]
    Json(#[from] serde_json::Error),

    #[error("[PLX-092] YAML error: {0}")]
    #[diagnostic(code(planex::yaml_error))]
    Yaml(#[from] serde_yaml::Error),
}

impl PlanexError {
    /// Stable error code (e.g. "PLX-010")
    pub fn code(&self) -> &'static str {
        match self {
            Self::ParseError { .. } => "PLX-001",
            Self::SchemaValidationFailed { .. } => "PLX-002",
            Self::PlanNotFound { .. } => "PLX-003",
            Self::InvalidPlan { .. } => "PLX-010",
            Self::EmptyPlan => "PLX-011",
            Self::InvalidConfig { .. } => "PLX-020",
            Self::ConfigError { .. } => "PLX-021",
            Self::TemplateSyntax { .. } => "PLX-030",
            Self::UnresolvedReference { .. } => "PLX-031",
            Self::PathNotFound { .. } => "PLX-032",
            Self::IndexOutOfRange { .. } => "PLX-033",
            Self::ToolFailed { .. } => "PLX-040",
            Self::UnknownTool { .. } => "PLX-041",
            Self::ToolPanicked { .. } => "PLX-042",
            Self::RetryExhausted { .. } => "PLX-043",
            Self::ExecutionCancelled => "PLX-050",
            Self::ExecutionTimeout { .. } => "PLX-051",
            Self::SchedulerFault { .. } => "PLX-052",
            Self::PersistenceError { .. } => "PLX-060",
            Self::Io(_) => "PLX-090",
            Self::Json(_) => "PLX-091",
            Self::Yaml(_) => "PLX-092",
        }
    }

    /// Resolution errors are deterministic: retrying cannot change the inputs
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Self::TemplateSyntax { .. }
                | Self::UnresolvedReference { .. }
                | Self::PathNotFound { .. }
                | Self::IndexOutOfRange { .. }
        )
    }
}

impl FixSuggestion for PlanexError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            Self::ParseError { .. } => Some("Check the JSON/YAML syntax of the plan"),
            Self::SchemaValidationFailed { .. } => {
                Some("Remove unknown fields and give every step a non-empty `tool`")
            }
            Self::PlanNotFound { .. } => Some("Check the file path exists"),
            Self::InvalidPlan { .. } => {
                Some("List every step you read from in `dependsOn`, and only earlier steps")
            }
            Self::EmptyPlan => Some("A plan needs at least one step"),
            Self::InvalidConfig { .. } => {
                Some("parallelExecutionLimit must be >= 1 and maxRetryDelayMs >= retryDelayMs")
            }
            Self::ConfigError { .. } => Some("Check ~/.config/planex/config.toml"),
            Self::TemplateSyntax { .. } => {
                Some("Use ${step_N.result} or ${step_N.result[0].field}")
            }
            Self::UnresolvedReference { .. } => {
                Some("Add the referenced step to this step's dependsOn")
            }
            Self::PathNotFound { .. } | Self::IndexOutOfRange { .. } => {
                Some("Check the shape of the referenced step's result")
            }
            Self::UnknownTool { .. } => Some("Register the tool before running the plan"),
            Self::ExecutionTimeout { .. } => Some("Raise timeoutMs or reduce plan size"),
            Self::ToolFailed { .. }
            | Self::ToolPanicked { .. }
            | Self::RetryExhausted { .. }
            | Self::ExecutionCancelled
            | Self::SchedulerFault { .. }
            | Self::PersistenceError { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Yaml(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_codes() {
        let err = PlanexError::UnknownTool {
            tool: "create_user".to_string(),
        };
        assert!(err.to_string().starts_with("[PLX-041]"));
        assert_eq!(err.code(), "PLX-041");
    }

    #[test]
    fn resolution_errors_are_classified() {
        let err = PlanexError::IndexOutOfRange {
            reference: "${step_0.result[3]}".to_string(),
            index: 3,
            len: 1,
        };
        assert!(err.is_resolution_error());
        assert!(!PlanexError::ExecutionCancelled.is_resolution_error());
    }

    #[test]
    fn invalid_plan_lists_every_issue() {
        let err = PlanexError::InvalidPlan {
            issues: vec![
                ValidationIssue::empty_tool(0),
                ValidationIssue::empty_tool(2),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 issues"), "{msg}");
        assert!(msg.contains("step 2"), "{msg}");
    }

    #[test]
    fn fix_suggestion_present_for_validation() {
        assert!(PlanexError::EmptyPlan.fix_suggestion().is_some());
        assert!(PlanexError::ExecutionCancelled.fix_suggestion().is_none());
    }
}
