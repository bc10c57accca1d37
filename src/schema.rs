//! Structural contract for task records.
//!
//! `validate` runs against raw JSON so that a line which deserializes
//! loosely (or not at all) still gets field-level diagnostics. It is used
//! before every write and while streaming a log on load.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::task::{RELATION_TYPES, STATUSES, TASK_TYPES};

/// One failing field, addressed with dot/bracket notation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.reason)
        } else {
            write!(f, "{}: {}", self.path, self.reason)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.0.iter().any(|error| error.path == path)
    }
}

impl From<Vec<FieldError>> for ValidationErrors {
    fn from(errors: Vec<FieldError>) -> Self {
        Self(errors)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&joined)
    }
}

impl std::error::Error for ValidationErrors {}

/// Validate a candidate task record.
pub fn validate(record: &Value) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    let Some(object) = record.as_object() else {
        errors.push(FieldError::new("", format!("expected object, got {}", kind(record))));
        return Err(errors.into());
    };

    match object.get("id") {
        None => errors.push(missing("id")),
        Some(value) => match value.as_u64() {
            Some(id) if id > 0 => {}
            Some(_) => errors.push(FieldError::new("id", "must be a positive integer")),
            None => errors.push(wrong_type("id", "positive integer", value)),
        },
    }

    if let Some(value) = object.get("parent-id") {
        if !value.is_null() && !value.is_u64() {
            errors.push(wrong_type("parent-id", "integer or null", value));
        }
    }

    check_enum(object, "status", &STATUSES, &mut errors);

    match object.get("title") {
        None => errors.push(missing("title")),
        Some(Value::String(title)) if title.trim().is_empty() => {
            errors.push(FieldError::new("title", "must not be blank"));
        }
        Some(Value::String(_)) => {}
        Some(value) => errors.push(wrong_type("title", "string", value)),
    }

    for field in ["description", "design", "category"] {
        if let Some(value) = object.get(field) {
            if !value.is_string() {
                errors.push(wrong_type(field, "string", value));
            }
        }
    }

    check_enum(object, "type", &TASK_TYPES, &mut errors);

    if let Some(value) = object.get("meta") {
        match value.as_object() {
            Some(meta) => {
                for (key, entry) in meta {
                    if !entry.is_string() {
                        errors.push(wrong_type(&format!("meta.{key}"), "string", entry));
                    }
                }
            }
            None => errors.push(wrong_type("meta", "object", value)),
        }
    }

    if let Some(value) = object.get("relations") {
        match value.as_array() {
            Some(relations) => {
                let mut seen = HashSet::new();
                for (index, relation) in relations.iter().enumerate() {
                    validate_relation(index, relation, &mut errors);
                    let id = relation.get("id").and_then(Value::as_u64);
                    if let Some(id) = id {
                        if !seen.insert(id) {
                            errors.push(FieldError::new(
                                format!("relations[{index}].id"),
                                format!("duplicate relation id {id}"),
                            ));
                        }
                    }
                }
            }
            None => errors.push(wrong_type("relations", "array", value)),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.into())
    }
}

fn validate_relation(index: usize, relation: &Value, errors: &mut Vec<FieldError>) {
    let prefix = format!("relations[{index}]");
    let Some(object) = relation.as_object() else {
        errors.push(wrong_type(&prefix, "object", relation));
        return;
    };

    for field in ["id", "relates-to"] {
        let path = format!("{prefix}.{field}");
        match object.get(field) {
            None => errors.push(missing(&path)),
            Some(value) if !value.is_u64() => errors.push(wrong_type(&path, "integer", value)),
            Some(_) => {}
        }
    }

    let path = format!("{prefix}.as-type");
    match object.get("as-type") {
        None => errors.push(missing(&path)),
        Some(Value::String(value)) if !RELATION_TYPES.contains(&value.as_str()) => {
            errors.push(not_in_set(&path, value, &RELATION_TYPES));
        }
        Some(Value::String(_)) => {}
        Some(value) => errors.push(wrong_type(&path, "string", value)),
    }
}

fn check_enum(
    object: &Map<String, Value>,
    field: &str,
    allowed: &[&str],
    errors: &mut Vec<FieldError>,
) {
    match object.get(field) {
        None => errors.push(missing(field)),
        Some(Value::String(value)) if !allowed.contains(&value.as_str()) => {
            errors.push(not_in_set(field, value, allowed));
        }
        Some(Value::String(_)) => {}
        Some(value) => errors.push(wrong_type(field, "string", value)),
    }
}

fn missing(path: &str) -> FieldError {
    FieldError::new(path, "required field is missing")
}

fn wrong_type(path: &str, expected: &str, value: &Value) -> FieldError {
    FieldError::new(path, format!("expected {expected}, got {}", kind(value)))
}

fn not_in_set(path: &str, value: &str, allowed: &[&str]) -> FieldError {
    FieldError::new(
        path,
        format!("'{value}' is not one of {}", allowed.join("|")),
    )
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
