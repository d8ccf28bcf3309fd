//! Variable Resolver - substitute completed step results into params
//!
//! - A string that is exactly one reference takes the referenced value's native type
//! - References embedded in a larger string are substituted as text
//! - Any reference that cannot be satisfied fails the whole resolution

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::ast::Params;
use crate::error::{PlanexError, Result};
use crate::util::jsonpath::{self, Miss};

use super::template::{self, StepRef};

/// Completed results visible to one step (step index -> result payload)
#[derive(Debug, Clone, Default)]
pub struct DependencyResults {
    results: FxHashMap<usize, Arc<Value>>,
}

impl DependencyResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, step: usize, result: Arc<Value>) {
        self.results.insert(step, result);
    }

    pub fn get(&self, step: usize) -> Option<&Value> {
        self.results.get(&step).map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl FromIterator<(usize, Arc<Value>)> for DependencyResults {
    fn from_iter<I: IntoIterator<Item = (usize, Arc<Value>)>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

/// Resolve every reference in a step's params
pub fn resolve_params(params: &Params, deps: &DependencyResults) -> Result<Params> {
    params
        .iter()
        .map(|(key, value)| Ok((key.clone(), resolve_value(value, deps)?)))
        .collect()
}

/// Resolve references anywhere inside one value
pub fn resolve_value(value: &Value, deps: &DependencyResults) -> Result<Value> {
    match value {
        Value::String(s) => resolve_str(s, deps),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, deps))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), resolve_value(v, deps)?)))
            .collect::<Result<serde_json::Map<_, _>>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

fn resolve_str(s: &str, deps: &DependencyResults) -> Result<Value> {
    let refs = template::parse_refs(s)?;
    if refs.is_empty() {
        return Ok(Value::String(s.to_string()));
    }

    // Whole-string reference keeps its native type
    if let Some(only) = template::whole_ref(s, &refs) {
        return lookup(only, deps).cloned();
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for step_ref in &refs {
        out.push_str(&s[last..step_ref.span.start]);
        out.push_str(&value_to_text(lookup(step_ref, deps)?));
        last = step_ref.span.end;
    }
    out.push_str(&s[last..]);
    Ok(Value::String(out))
}

fn lookup<'d>(step_ref: &StepRef, deps: &'d DependencyResults) -> Result<&'d Value> {
    let root = deps
        .get(step_ref.step)
        .ok_or_else(|| PlanexError::UnresolvedReference {
            reference: step_ref.display(),
            step: step_ref.step,
        })?;

    jsonpath::walk(root, &step_ref.path).map_err(|miss| match miss {
        Miss::Field(segment) => PlanexError::PathNotFound {
            reference: step_ref.display(),
            segment,
        },
        Miss::OutOfRange { index, len } => PlanexError::IndexOutOfRange {
            reference: step_ref.display(),
            index,
            len,
        },
        Miss::NotArray { index } => PlanexError::PathNotFound {
            reference: step_ref.display(),
            segment: format!("[{}]", index),
        },
    })
}

/// Text form used for embedded substitution (strings unquoted, everything else as JSON)
fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
