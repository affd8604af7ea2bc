//! JSON Schema input validation (`spec.md` §4.E: `execute` validates
//! inputs against the flow's declared schema; each step validates inputs
//! against its own declared schema before running).

use llmflow_core::ExecutionError;
use serde_json::Value;

/// Validates `instance` against `schema`, if one was declared. A flow or
/// step with no `input_schema` accepts any input, matching `spec.md`'s
/// treatment of the schema as optional per-definition metadata rather than
/// a mandatory contract.
pub fn validate_inputs(schema: Option<&Value>, instance: &Value) -> Result<(), ExecutionError> {
    let Some(schema) = schema else {
        return Ok(());
    };

    let validator = jsonschema::validator_for(schema).map_err(|e| ExecutionError::ValidationError(format!("invalid input schema: {e}")))?;

    if let Err(error) = validator.validate(instance) {
        return Err(ExecutionError::ValidationError(error.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn no_schema_accepts_anything() {
        assert!(validate_inputs(None, &json!({"whatever": 1})).is_ok());
    }

    #[test]
    fn matching_input_passes() {
        let schema = json!({
            "type": "object",
            "required": ["name"],
            "properties": { "name": { "type": "string" } }
        });
        assert!(validate_inputs(Some(&schema), &json!({"name": "ada"})).is_ok());
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let schema = json!({
            "type": "object",
            "required": ["name"],
            "properties": { "name": { "type": "string" } }
        });
        let err = validate_inputs(Some(&schema), &json!({})).unwrap_err();
        assert!(matches!(err, ExecutionError::ValidationError(_)));
    }
}
