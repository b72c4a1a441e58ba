//! Tool parameter validation against JSON Schema (Draft 7).
//!
//! Validators return `None` when parameters are acceptable and a
//! human-readable message otherwise. They never fail.

use jsonschema::Draft;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

pub trait ParamValidator: Send + Sync {
    fn validate(&self, schema: &Value, params: &Value) -> Option<String>;
}

/// Full Draft 7 validation. Violations are joined with `"; "`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictValidator;

impl StrictValidator {
    /// Compile and run; `Err` carries the compile failure text.
    fn check(schema: &Value, params: &Value) -> Result<Option<String>, String> {
        let compiled = jsonschema::options()
            .with_draft(Draft::Draft7)
            .build(schema)
            .map_err(|err| err.to_string())?;
        let messages: Vec<String> = compiled
            .iter_errors(params)
            .map(|err| err.to_string())
            .collect();
        if messages.is_empty() {
            Ok(None)
        } else {
            Ok(Some(messages.join("; ")))
        }
    }
}

impl ParamValidator for StrictValidator {
    fn validate(&self, schema: &Value, params: &Value) -> Option<String> {
        match Self::check(schema, params) {
            Ok(None) => {
                debug!("schema validation passed");
                None
            }
            Ok(Some(message)) => {
                warn!(%message, "schema validation failed");
                Some(message)
            }
            Err(err) => Some(format!("schema validation err: {err}")),
        }
    }
}

/// Top-level type check plus required-field presence. Nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveValidator;

impl ParamValidator for PermissiveValidator {
    fn validate(&self, schema: &Value, params: &Value) -> Option<String> {
        if schema.is_null() || params.is_null() {
            return None;
        }
        let expected = schema.get("type").and_then(Value::as_str)?;
        let actual = json_type(params);
        if !type_compatible(expected, actual) {
            return Some(format!("Expected type {expected} but got {actual}"));
        }
        if expected != "object" {
            return None;
        }
        let required = schema.get("required").and_then(Value::as_array)?;
        let Some(object) = params.as_object() else {
            return Some("Expected object type for required field validation".to_string());
        };
        required
            .iter()
            .filter_map(Value::as_str)
            .find(|field| object.get(*field).is_none_or(Value::is_null))
            .map(|field| format!("Missing Required field {field}"))
    }
}

/// Strict first; permissive only when the schema itself cannot be compiled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TieredValidator;

impl ParamValidator for TieredValidator {
    fn validate(&self, schema: &Value, params: &Value) -> Option<String> {
        match StrictValidator::check(schema, params) {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "schema did not compile, using permissive checks");
                PermissiveValidator.validate(schema, params)
            }
        }
    }
}

/// Configurable validator selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    #[default]
    Strict,
    Permissive,
    Tiered,
}

impl ValidationMode {
    pub fn validator(self) -> Box<dyn ParamValidator> {
        match self {
            Self::Strict => Box::new(StrictValidator),
            Self::Permissive => Box::new(PermissiveValidator),
            Self::Tiered => Box::new(TieredValidator),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_compatible(expected: &str, actual: &str) -> bool {
    expected == actual || (expected == "number" && actual == "integer")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn edit_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "project_path": { "type": "string" },
                "edit_description": { "type": "string" },
                "dry_run": { "type": "boolean" }
            },
            "required": ["project_path", "edit_description"]
        })
    }

    #[test]
    fn strict_accepts_valid_params() {
        let params = json!({ "project_path": "demo", "edit_description": "add a route" });
        assert_eq!(StrictValidator.validate(&edit_schema(), &params), None);
    }

    #[test]
    fn strict_reports_missing_required_field() {
        let params = json!({ "edit_description": "add a route" });
        let message = StrictValidator
            .validate(&edit_schema(), &params)
            .expect("missing field must be reported");
        assert!(message.contains("project_path"), "{message}");
    }

    #[test]
    fn strict_joins_multiple_violations() {
        let params = json!({ "dry_run": "yes" });
        let message = StrictValidator
            .validate(&edit_schema(), &params)
            .expect("violations expected");
        assert!(message.contains("; "), "{message}");
    }

    #[test]
    fn strict_reports_uncompilable_schema() {
        let schema = json!({ "type": 12 });
        let message = StrictValidator
            .validate(&schema, &json!({}))
            .expect("compile failure must be reported");
        assert!(message.starts_with("schema validation err: "), "{message}");
    }

    /// Verifies the permissive message for a missing required field.
    #[test]
    fn permissive_reports_missing_required_field() {
        let params = json!({ "edit_description": "x" });
        assert_eq!(
            PermissiveValidator.validate(&edit_schema(), &params).as_deref(),
            Some("Missing Required field project_path")
        );
    }

    #[test]
    fn permissive_treats_null_field_as_missing() {
        let params = json!({ "project_path": null, "edit_description": "x" });
        assert_eq!(
            PermissiveValidator.validate(&edit_schema(), &params).as_deref(),
            Some("Missing Required field project_path")
        );
    }

    #[test]
    fn permissive_reports_type_mismatch() {
        assert_eq!(
            PermissiveValidator
                .validate(&edit_schema(), &json!(["a"]))
                .as_deref(),
            Some("Expected type object but got array")
        );
    }

    #[test]
    fn permissive_integer_satisfies_number() {
        let schema = json!({ "type": "number" });
        assert_eq!(PermissiveValidator.validate(&schema, &json!(3)), None);
        assert_eq!(PermissiveValidator.validate(&schema, &json!(3.5)), None);
        assert!(
            PermissiveValidator
                .validate(&json!({ "type": "integer" }), &json!(3.5))
                .is_some()
        );
    }

    #[test]
    fn permissive_passes_null_inputs() {
        assert_eq!(PermissiveValidator.validate(&Value::Null, &json!({})), None);
        assert_eq!(PermissiveValidator.validate(&edit_schema(), &Value::Null), None);
    }

    #[test]
    fn tiered_falls_back_when_schema_does_not_compile() {
        let schema = json!({ "type": "object", "required": ["a"], "minProperties": "two" });
        assert_eq!(
            TieredValidator.validate(&schema, &json!({})).as_deref(),
            Some("Missing Required field a")
        );
    }

    #[test]
    fn tiered_uses_strict_for_valid_schema() {
        let params = json!({ "edit_description": "x" });
        let strict = StrictValidator.validate(&edit_schema(), &params);
        assert_eq!(TieredValidator.validate(&edit_schema(), &params), strict);
    }

    #[test]
    fn mode_selects_validator() {
        let params = json!({ "edit_description": "x" });
        let message = ValidationMode::Permissive
            .validator()
            .validate(&edit_schema(), &params);
        assert_eq!(message.as_deref(), Some("Missing Required field project_path"));
    }
}
