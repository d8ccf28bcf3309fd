//! Step references - `${step_N.result...}` parsing
//!
//! Syntax (public contract with the plan generator):
//! - `${step_3.result}` whole result of step 3
//! - `${step_3.result[0].id}` dotted / indexed path into it
//!
//! Anything that opens like a step reference (`${step_` followed by a digit)
//! but does not parse is a syntax error, never passed through as literal
//! text. Other `${...}` text such as `${step_count}` is left alone.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::ast::Params;
use crate::error::PlanexError;
use crate::util::jsonpath::{self, Segment};

/// Well-formed reference: step index + path tail after `result`
static STEP_REF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{\s*step_(\d+)\.result((?:\.[^.\[\]\s{}]+|\[\s*\d+\s*\])*)\s*\}").unwrap()
});

/// Anything that opens like a step reference
static STEP_REF_OPEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{\s*step_\d").unwrap());

/// One parsed reference inside a string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRef {
    /// Referenced step index
    pub step: usize,
    /// Path into that step's result
    pub path: Vec<Segment>,
    /// Byte range of the reference in its template
    pub span: Range<usize>,
}

impl StepRef {
    /// Canonical text form, used in error messages
    pub fn display(&self) -> String {
        format!("${{step_{}.result{}}}", self.step, jsonpath::render(&self.path))
    }
}

/// Cheap pre-check before running the regex
pub fn has_refs(template: &str) -> bool {
    template.contains("${")
}

/// Parse every step reference in a template string
pub fn parse_refs(template: &str) -> Result<Vec<StepRef>, PlanexError> {
    if !has_refs(template) {
        return Ok(Vec::new());
    }

    let mut refs = Vec::new();
    for cap in STEP_REF_RE.captures_iter(template) {
        let Some(m) = cap.get(0) else { continue };
        let step = cap[1]
            .parse::<usize>()
            .map_err(|e| PlanexError::TemplateSyntax {
                template: template.to_string(),
                reason: format!("step index: {}", e),
            })?;
        let path = jsonpath::parse(&cap[2]).map_err(|reason| PlanexError::TemplateSyntax {
            template: template.to_string(),
            reason,
        })?;
        refs.push(StepRef {
            step,
            path,
            span: m.range(),
        });
    }

    let opened = STEP_REF_OPEN_RE.find_iter(template).count();
    if opened != refs.len() {
        return Err(PlanexError::TemplateSyntax {
            template: template.to_string(),
            reason: format!(
                "{} reference(s) opened, {} well-formed",
                opened,
                refs.len()
            ),
        });
    }

    Ok(refs)
}

/// The single reference covering the whole template, if that is all it holds
pub fn whole_ref<'r>(template: &str, refs: &'r [StepRef]) -> Option<&'r StepRef> {
    match refs {
        [only] if only.span == (0..template.len()) => Some(only),
        _ => None,
    }
}

/// Collect references from every string nested anywhere in a value
pub fn collect_value_refs(value: &Value, refs: &mut Vec<StepRef>) -> Result<(), PlanexError> {
    match value {
        Value::String(s) => refs.extend(parse_refs(s)?),
        Value::Array(items) => {
            for item in items {
                collect_value_refs(item, refs)?;
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                collect_value_refs(v, refs)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Collect references from a step's params
pub fn collect_refs(params: &Params) -> Result<Vec<StepRef>, PlanexError> {
    let mut refs = Vec::new();
    for value in params.values() {
        collect_value_refs(value, &mut refs)?;
    }
    Ok(refs)
}
