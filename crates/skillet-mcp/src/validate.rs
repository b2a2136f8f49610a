//! Argument validation against tool parameter schemas.
//!
//! Covers the subset of JSON Schema that MCP tool servers actually
//! advertise: `required`, `type`, `enum`, numeric bounds and
//! `additionalProperties: false`. Unknown keywords are ignored rather
//! than rejected. Purely structural; performs no I/O.

use serde_json::{Map, Value};

use crate::error::McpError;

/// Validate call arguments against a tool's input schema.
pub fn validate_arguments(
    tool: &str,
    schema: &Value,
    arguments: &Map<String, Value>,
) -> Result<(), McpError> {
    let Some(schema_obj) = schema.as_object() else {
        // A tool without a usable schema accepts anything.
        return Ok(());
    };

    if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !arguments.contains_key(field) {
                return Err(McpError::validation(format!(
                    "tool '{}': missing required argument '{}'",
                    tool, field
                )));
            }
        }
    }

    let properties = schema_obj.get("properties").and_then(Value::as_object);

    if matches!(
        schema_obj.get("additionalProperties"),
        Some(Value::Bool(false))
    ) {
        for key in arguments.keys() {
            if properties.map_or(true, |p| !p.contains_key(key)) {
                return Err(McpError::validation(format!(
                    "tool '{}': unexpected argument '{}'",
                    tool, key
                )));
            }
        }
    }

    if let Some(properties) = properties {
        for (key, value) in arguments {
            if let Some(prop) = properties.get(key) {
                validate_value(tool, key, prop, value)?;
            }
        }
    }

    Ok(())
}

fn validate_value(tool: &str, name: &str, schema: &Value, value: &Value) -> Result<(), McpError> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(expected, value) {
            return Err(McpError::validation(format!(
                "tool '{}': argument '{}' should be {}, got {}",
                tool,
                name,
                expected,
                type_name(value)
            )));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(McpError::validation(format!(
                "tool '{}': argument '{}' is not one of the allowed values",
                tool, name
            )));
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
            if n < min {
                return Err(McpError::validation(format!(
                    "tool '{}': argument '{}' is below the minimum of {}",
                    tool, name, min
                )));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
            if n > max {
                return Err(McpError::validation(format!(
                    "tool '{}': argument '{}' is above the maximum of {}",
                    tool, name, max
                )));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        // Unknown type keyword: let the server decide.
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn weather_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "city": {"type": "string"},
                "days": {"type": "integer", "minimum": 1, "maximum": 7}
            },
            "required": ["city"]
        })
    }

    #[test]
    fn test_valid_arguments_pass() {
        let schema = weather_schema();
        validate_arguments("maps_weather", &schema, &args(json!({"city": "北京"}))).unwrap();
        validate_arguments(
            "maps_weather",
            &schema,
            &args(json!({"city": "上海", "days": 3})),
        )
        .unwrap();
    }

    #[test]
    fn test_missing_required_field() {
        let schema = weather_schema();
        let result = validate_arguments("maps_weather", &schema, &args(json!({"days": 3})));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("city"), "got: {}", err);
    }

    #[test]
    fn test_wrong_type() {
        let schema = weather_schema();
        let result = validate_arguments("maps_weather", &schema, &args(json!({"city": 42})));
        assert!(result.is_err());

        let result =
            validate_arguments("maps_weather", &schema, &args(json!({"city": "北京", "days": "three"})));
        assert!(result.is_err());
    }

    #[test]
    fn test_integer_rejects_float() {
        let schema = weather_schema();
        let result = validate_arguments(
            "maps_weather",
            &schema,
            &args(json!({"city": "北京", "days": 2.5})),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_range_bounds() {
        let schema = weather_schema();
        assert!(validate_arguments(
            "maps_weather",
            &schema,
            &args(json!({"city": "北京", "days": 0}))
        )
        .is_err());
        assert!(validate_arguments(
            "maps_weather",
            &schema,
            &args(json!({"city": "北京", "days": 8}))
        )
        .is_err());
    }

    #[test]
    fn test_enum_membership() {
        let schema = json!({
            "type": "object",
            "properties": {
                "units": {"type": "string", "enum": ["metric", "imperial"]}
            }
        });

        validate_arguments("t", &schema, &args(json!({"units": "metric"}))).unwrap();
        assert!(validate_arguments("t", &schema, &args(json!({"units": "kelvin"}))).is_err());
    }

    #[test]
    fn test_additional_properties_false() {
        let schema = json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "additionalProperties": false
        });

        validate_arguments("t", &schema, &args(json!({"city": "北京"}))).unwrap();
        assert!(
            validate_arguments("t", &schema, &args(json!({"city": "北京", "zip": "100000"})))
                .is_err()
        );
    }

    #[test]
    fn test_extra_fields_allowed_by_default() {
        let schema = weather_schema();
        validate_arguments(
            "maps_weather",
            &schema,
            &args(json!({"city": "北京", "note": "anything"})),
        )
        .unwrap();
    }

    #[test]
    fn test_degenerate_schemas_accept_anything() {
        validate_arguments("t", &json!(true), &args(json!({"x": 1}))).unwrap();
        validate_arguments("t", &json!({}), &args(json!({"x": 1}))).unwrap();
        validate_arguments("t", &Value::Null, &Map::new()).unwrap();
    }
}
