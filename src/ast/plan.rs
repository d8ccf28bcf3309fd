//! Plan parsing structures
//!
//! A plan is immutable once submitted. Steps are addressed by position:
//! `steps[i]` is step `i` everywhere else in the crate.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PlanexError, Result};

use super::schema::PlanSchemaValidator;

/// Invocation parameters of a step (name -> value, values may hold templates)
pub type Params = Map<String, Value>;

/// A plan: ordered steps plus advisory metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Plan {
    pub steps: Vec<Step>,
    #[serde(default)]
    pub metadata: PlanMetadata,
}

/// Planner-supplied metadata. Counts are advisory, never authoritative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanMetadata {
    /// Originating natural-language query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_total_steps: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_parallel_steps: Option<usize>,
}

/// One tool invocation with declared dependencies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Step {
    /// Optional explicit index; must match the step's position when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    /// Tool name, resolved by the external registry
    pub tool: String,
    #[serde(default)]
    pub params: Params,
    /// Indices of steps this one waits for (all strictly smaller)
    #[serde(default)]
    pub depends_on: Vec<usize>,
    /// Dispatch hint only; `depends_on` is always honored
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub description: String,
}

impl Step {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            index: None,
            tool: tool.into(),
            params: Params::new(),
            depends_on: Vec::new(),
            parallel: false,
            description: String::new(),
        }
    }

    /// Set params from a JSON object (non-objects are ignored)
    pub fn with_params(mut self, params: Value) -> Self {
        if let Value::Object(map) = params {
            self.params = map;
        }
        self
    }

    pub fn depends_on(mut self, deps: impl IntoIterator<Item = usize>) -> Self {
        self.depends_on = deps.into_iter().collect();
        self
    }

    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Plan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            metadata: PlanMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: PlanMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Parse a JSON plan document (schema-checked before deserializing)
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(json).map_err(|e| PlanexError::ParseError {
            details: format!("JSON parse error: {}", e),
        })?;
        Self::from_value(raw)
    }

    /// Parse a YAML plan document (schema-checked before deserializing)
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: Value = serde_yaml::from_str(yaml).map_err(|e| PlanexError::ParseError {
            details: format!("YAML parse error: {}", e),
        })?;
        Self::from_value(raw)
    }

    /// Strict boundary: malformed input is rejected outright, never repaired
    pub fn from_value(raw: Value) -> Result<Self> {
        PlanSchemaValidator::new()?.validate_value(&raw)?;
        serde_json::from_value(raw).map_err(|e| PlanexError::ParseError {
            details: e.to_string(),
        })
    }

    /// Load a plan file, choosing the format from its extension
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PlanexError::PlanNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Self::from_json(&content),
        }
    }
}
