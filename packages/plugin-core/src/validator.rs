use std::collections::BTreeMap;

use serde_json::Value;

use crate::schema::{ConfigField, ConfigMap, ConfigSchema, FieldType};

/// Field name mapped to a human-readable error message. Empty means valid.
pub type ValidationErrors = BTreeMap<String, String>;

/// Validate a candidate configuration against a schema.
///
/// Required fields must be present; optional absent fields are skipped;
/// present values are checked according to their declared type. Errors
/// accumulate per field and are never raised as failures of the call itself.
pub fn validate(schema: &ConfigSchema, candidate: &ConfigMap) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    for field in schema.fields() {
        let Some(value) = candidate.get(&field.key) else {
            if field.required {
                errors.insert(field.key.clone(), format!("{} is required.", field.label));
            }
            continue;
        };

        if let Some(message) = validate_value(field, value) {
            errors.insert(field.key.clone(), message);
        }
    }

    errors
}

fn validate_value(field: &ConfigField, value: &Value) -> Option<String> {
    match field.field_type {
        FieldType::Text => None,
        FieldType::Select => validate_select(field, value),
        FieldType::Multiselect => validate_multiselect(field, value),
        FieldType::Number | FieldType::Integer => validate_number(field, value),
        FieldType::Time => validate_time(field, value),
        FieldType::Boolean => validate_boolean(field, value),
    }
}

fn validate_select(field: &ConfigField, value: &Value) -> Option<String> {
    if field.options.is_empty() {
        return None;
    }

    if scalar_text(value).is_some_and(|v| field.options.iter().any(|o| *o == v)) {
        None
    } else {
        Some(format!(
            "{} must be one of: {}.",
            field.label,
            field.options.join(", ")
        ))
    }
}

fn validate_multiselect(field: &ConfigField, value: &Value) -> Option<String> {
    let Some(items) = value.as_array() else {
        return Some(format!("{} must be an array.", field.label));
    };

    if field.options.is_empty() {
        return None;
    }

    let invalid: Vec<String> = items
        .iter()
        .filter(|item| {
            !scalar_text(item).is_some_and(|v| field.options.iter().any(|o| *o == v))
        })
        .map(display_value)
        .collect();

    if invalid.is_empty() {
        None
    } else {
        Some(format!(
            "{} contains invalid values: {}.",
            field.label,
            invalid.join(", ")
        ))
    }
}

fn validate_number(field: &ConfigField, value: &Value) -> Option<String> {
    let Some(number) = numeric_value(value) else {
        return Some(format!("{} must be a number.", field.label));
    };

    if let Some(min) = field.min
        && number < min
    {
        return Some(format!("{} must be at least {}.", field.label, min));
    }
    if let Some(max) = field.max
        && number > max
    {
        return Some(format!("{} must be at most {}.", field.label, max));
    }

    None
}

fn validate_time(field: &ConfigField, value: &Value) -> Option<String> {
    let valid = value
        .as_str()
        .is_some_and(|s| !s.is_empty() && s.split(',').all(is_hh_mm));

    if valid {
        None
    } else {
        Some(format!("{} must be in HH:MM format.", field.label))
    }
}

fn validate_boolean(field: &ConfigField, value: &Value) -> Option<String> {
    let valid = match value {
        Value::Bool(_) => true,
        // Boolean-ish literals accepted from form input.
        Value::Number(n) => n.as_i64() == Some(0) || n.as_i64() == Some(1),
        Value::String(s) => s == "0" || s == "1",
        _ => false,
    };

    if valid {
        None
    } else {
        Some(format!("{} must be a boolean.", field.label))
    }
}

/// `HH:MM`, both parts exactly two digits, within clock range.
fn is_hh_mm(token: &str) -> bool {
    let Some((hour, minute)) = token.split_once(':') else {
        return false;
    };

    let two_digits = |s: &str| s.len() == 2 && s.bytes().all(|b| b.is_ascii_digit());
    if !two_digits(hour) || !two_digits(minute) {
        return false;
    }

    let h: u32 = hour.parse().unwrap_or(99);
    let m: u32 = minute.parse().unwrap_or(99);
    h < 24 && m < 60
}

/// Textual form of a scalar for option-membership checks. Options are stored
/// as strings, but numeric candidates like `60` should match option `"60"`.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
