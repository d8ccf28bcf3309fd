//! Plan Validator - structural checks before a plan becomes an execution
//!
//! Validates:
//! - step indices are dense (`steps[i].index`, when given, equals `i`)
//! - every `dependsOn` entry is strictly smaller than the step's own index
//! - every template reference names a step listed in `dependsOn`
//! - `tool` is non-empty
//!
//! All issues are collected, not just the first. Metadata counts that disagree
//! with the plan are warnings only.

use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::ast::Plan;
use crate::binding;
use crate::error::{PlanexError, Result};

/// One structural defect, tied to the step that has it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationIssue {
    #[error("step {step}: declared index {declared} does not match its position")]
    IndexMismatch { step: usize, declared: usize },

    #[error("step {step}: depends on itself")]
    SelfDependency { step: usize },

    #[error("step {step}: depends on step {dep}, which does not come before it")]
    ForwardDependency { step: usize, dep: usize },

    #[error("step {step}: references step_{referenced} without listing it in dependsOn")]
    UndeclaredReference { step: usize, referenced: usize },

    #[error("step {step}: {reason}")]
    MalformedReference { step: usize, reason: String },

    #[error("step {step}: tool name is empty")]
    EmptyTool { step: usize },
}

impl ValidationIssue {
    pub fn empty_tool(step: usize) -> Self {
        Self::EmptyTool { step }
    }

    /// Index of the offending step
    pub fn step(&self) -> usize {
        match self {
            Self::IndexMismatch { step, .. }
            | Self::SelfDependency { step }
            | Self::ForwardDependency { step, .. }
            | Self::UndeclaredReference { step, .. }
            | Self::MalformedReference { step, .. }
            | Self::EmptyTool { step } => *step,
        }
    }
}

/// Non-fatal observation about a plan
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationWarning {
    #[error("metadata declares {declared} steps, plan has {actual}")]
    DeclaredTotalMismatch { declared: usize, actual: usize },

    #[error("metadata declares {declared} parallel steps, plan flags {actual}")]
    DeclaredParallelMismatch { declared: usize, actual: usize },

    #[error("step {step}: dependsOn lists step {dep} more than once")]
    DuplicateDependency { step: usize, dep: usize },
}

/// Outcome of validating one plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Turn collected errors into `PlanexError::InvalidPlan`
    pub fn into_result(self) -> Result<Self> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(PlanexError::InvalidPlan {
                issues: self.errors,
            })
        }
    }
}

/// Collect every issue in a plan without failing fast
pub fn check_plan(plan: &Plan) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (position, step) in plan.steps.iter().enumerate() {
        if let Some(declared) = step.index {
            if declared != position {
                report.errors.push(ValidationIssue::IndexMismatch {
                    step: position,
                    declared,
                });
            }
        }

        if step.tool.trim().is_empty() {
            report.errors.push(ValidationIssue::empty_tool(position));
        }

        let mut seen: FxHashSet<usize> = FxHashSet::default();
        for &dep in &step.depends_on {
            if !seen.insert(dep) {
                report
                    .warnings
                    .push(ValidationWarning::DuplicateDependency { step: position, dep });
                continue;
            }
            if dep == position {
                report
                    .errors
                    .push(ValidationIssue::SelfDependency { step: position });
            } else if dep > position {
                report
                    .errors
                    .push(ValidationIssue::ForwardDependency { step: position, dep });
            }
        }

        match binding::collect_refs(&step.params) {
            Ok(refs) => {
                let mut reported: FxHashSet<usize> = FxHashSet::default();
                for step_ref in refs {
                    if !seen.contains(&step_ref.step) && reported.insert(step_ref.step) {
                        report.errors.push(ValidationIssue::UndeclaredReference {
                            step: position,
                            referenced: step_ref.step,
                        });
                    }
                }
            }
            Err(e) => report.errors.push(ValidationIssue::MalformedReference {
                step: position,
                reason: e.to_string(),
            }),
        }
    }

    if let Some(declared) = plan.metadata.declared_total_steps {
        if declared != plan.len() {
            report.warnings.push(ValidationWarning::DeclaredTotalMismatch {
                declared,
                actual: plan.len(),
            });
        }
    }
    if let Some(declared) = plan.metadata.declared_parallel_steps {
        let actual = plan.steps.iter().filter(|s| s.parallel).count();
        if declared != actual {
            report
                .warnings
                .push(ValidationWarning::DeclaredParallelMismatch { declared, actual });
        }
    }

    report
}

/// Validate a plan for execution: empty plans and structural errors are rejected
pub fn validate_plan(plan: &Plan) -> Result<ValidationReport> {
    if plan.is_empty() {
        return Err(PlanexError::EmptyPlan);
    }
    check_plan(plan).into_result()
}
