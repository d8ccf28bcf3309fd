//! Plan Schema Validator
//!
//! Validates raw plan documents against the embedded JSON Schema before serde parsing.
//! Upstream planners sometimes emit almost-valid JSON; it is rejected here with every
//! offending path instead of being patched up.

use std::fmt;
use std::sync::OnceLock;

use jsonschema::Validator;
use serde_json::Value;

use crate::error::PlanexError;

/// Embedded schema JSON (compiled at build time)
const SCHEMA_JSON: &str = include_str!("../../schemas/plan.schema.json");

/// Global schema validator instance (lazy initialization)
static VALIDATOR: OnceLock<Result<Validator, String>> = OnceLock::new();

/// Schema validation error details
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaError {
    /// JSON pointer path to the error (e.g., "/steps/1/dependsOn")
    pub path: String,
    /// Human-readable error message
    pub message: String,
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "[{}] {}", path, self.message)
    }
}

/// Plan schema validator
pub struct PlanSchemaValidator {
    validator: &'static Validator,
}

impl PlanSchemaValidator {
    /// Uses a cached global validator.
    pub fn new() -> Result<Self, PlanexError> {
        let validator_result = VALIDATOR.get_or_init(|| {
            let schema: Value = serde_json::from_str(SCHEMA_JSON)
                .map_err(|e| format!("Failed to parse schema JSON: {}", e))?;
            Validator::new(&schema).map_err(|e| format!("Failed to compile schema: {}", e))
        });

        match validator_result {
            Ok(validator) => Ok(Self { validator }),
            Err(e) => Err(PlanexError::ParseError { details: e.clone() }),
        }
    }

    pub fn validate_value(&self, value: &Value) -> Result<(), PlanexError> {
        let errors: Vec<SchemaError> = self
            .validator
            .iter_errors(value)
            .map(|e| SchemaError {
                path: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PlanexError::SchemaValidationFailed { errors })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_minimal_plan() {
        let validator = PlanSchemaValidator::new().unwrap();
        assert!(validator
            .validate_value(&json!({"steps": [{"tool": "ping"}]}))
            .is_ok());
    }

    #[test]
    fn missing_steps_rejected() {
        let validator = PlanSchemaValidator::new().unwrap();
        let err = validator.validate_value(&json!({"metadata": {}})).unwrap_err();
        assert!(matches!(err, PlanexError::SchemaValidationFailed { .. }));
    }

    #[test]
    fn reports_every_offending_path() {
        let validator = PlanSchemaValidator::new().unwrap();
        let err = validator
            .validate_value(&json!({
                "steps": [
                    {"tool": 42},
                    {"tool": "ok", "dependsOn": ["zero"]}
                ]
            }))
            .unwrap_err();

        let PlanexError::SchemaValidationFailed { errors } = err else {
            panic!("expected schema failure");
        };
        assert!(errors.len() >= 2, "{errors:?}");
        assert!(errors.iter().any(|e| e.path.starts_with("/steps/0")));
        assert!(errors.iter().any(|e| e.path.starts_with("/steps/1")));
    }

    #[test]
    fn negative_dependency_rejected() {
        let validator = PlanSchemaValidator::new().unwrap();
        assert!(validator
            .validate_value(&json!({"steps": [{"tool": "a", "dependsOn": [-1]}]}))
            .is_err());
    }
}
