//! Lightweight object schemas for node input/output boundaries.
//!
//! Every agent node declares the fields it consumes or produces as an
//! [`ObjectSchema`]. Validation is by field name with an explicit policy for
//! fields outside the declaration, so a violation always names the field that
//! caused it.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// How a validator treats fields that are not part of the declared schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ExtraFieldsPolicy {
    /// Unknown fields fail validation.
    Reject,
    /// Unknown fields are dropped from the validated payload.
    #[default]
    Ignore,
    /// Unknown fields pass through untouched.
    Allow,
}

/// Declared shape of a JSON object boundary.
#[derive(Clone, Copy, Debug)]
pub struct ObjectSchema {
    /// Stable name, referenced by interrupt payloads and error messages.
    pub name: &'static str,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

/// A single named problem found during validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub problem: ViolationKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Missing,
    Unexpected,
    Invalid,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.problem {
            ViolationKind::Missing => write!(f, "missing required field `{}`", self.field),
            ViolationKind::Unexpected => write!(f, "unexpected field `{}`", self.field),
            ViolationKind::Invalid => write!(f, "invalid value for field `{}`", self.field),
        }
    }
}

/// Render a violation list for error messages, in stable order.
#[must_use]
pub fn render_violations(violations: &[FieldViolation]) -> String {
    let mut parts: Vec<String> = violations.iter().map(ToString::to_string).collect();
    parts.sort();
    parts.join(", ")
}

impl ObjectSchema {
    #[must_use]
    pub fn declares(&self, field: &str) -> bool {
        self.required.contains(&field) || self.optional.contains(&field)
    }

    /// Validate an object against this schema.
    ///
    /// On success returns the payload filtered per `policy` (`Ignore` drops
    /// undeclared fields, `Allow` keeps them). On failure returns every
    /// violation found, not just the first.
    pub fn validate(
        &self,
        object: &FxHashMap<String, Value>,
        policy: ExtraFieldsPolicy,
    ) -> Result<FxHashMap<String, Value>, Vec<FieldViolation>> {
        let mut violations = Vec::new();
        for field in self.required {
            match object.get(*field) {
                None | Some(Value::Null) => violations.push(FieldViolation {
                    field: (*field).to_string(),
                    problem: ViolationKind::Missing,
                }),
                Some(_) => {}
            }
        }

        let mut validated = FxHashMap::default();
        for (key, value) in object {
            if self.declares(key) {
                validated.insert(key.clone(), value.clone());
                continue;
            }
            match policy {
                ExtraFieldsPolicy::Reject => violations.push(FieldViolation {
                    field: key.clone(),
                    problem: ViolationKind::Unexpected,
                }),
                ExtraFieldsPolicy::Ignore => {}
                ExtraFieldsPolicy::Allow => {
                    validated.insert(key.clone(), value.clone());
                }
            }
        }

        if violations.is_empty() {
            Ok(validated)
        } else {
            Err(violations)
        }
    }

    /// Project the declared fields out of a larger object, skipping absences.
    #[must_use]
    pub fn project(&self, object: &FxHashMap<String, Value>) -> FxHashMap<String, Value> {
        let mut out = FxHashMap::default();
        for field in self.required.iter().chain(self.optional.iter()) {
            if let Some(value) = object.get(*field) {
                out.insert((*field).to_string(), value.clone());
            }
        }
        out
    }
}

/// Parse a JSON object out of model output, tolerating markdown code fences.
pub fn parse_json_object(content: &str) -> Result<FxHashMap<String, Value>, serde_json::Error> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end_matches("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim())
}

/// Convert a JSON value into a field map, failing on non-objects.
pub fn value_to_fields(value: &Value) -> Result<FxHashMap<String, Value>, Vec<FieldViolation>> {
    match value {
        Value::Object(map) => Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()),
        _ => Err(vec![FieldViolation {
            field: "$".to_string(),
            problem: ViolationKind::Invalid,
        }]),
    }
}
