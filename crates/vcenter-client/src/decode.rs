//! Typed decoding of untyped vSphere JSON payloads.
//!
//! Records are built in two steps: every declared field is checked for
//! presence and JSON type in declaration order, then values are read out and
//! enumeration labels are mapped through explicit `(label, variant)` tables.
//! Nothing is coerced; a required field that is missing or mistyped fails the
//! whole record.

use crate::error::{VcenterError, VcenterResult};

use serde_json::{Map, Value};

/// Expected JSON type of a payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    /// Non-negative integer
    Integer,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    pub fn name(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "non-negative integer",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
        }
    }

    pub fn matches(self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_u64(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
        }
    }
}

/// Whether a missing field fails the record or reads as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
}

/// Read-only view over a JSON object payload.
#[derive(Debug, Clone, Copy)]
pub struct Payload<'a> {
    record: &'static str,
    fields: &'a Map<String, Value>,
}

impl<'a> Payload<'a> {
    /// Wrap `value`, which must be a JSON object.
    pub fn new(record: &'static str, value: &'a Value) -> VcenterResult<Self> {
        value
            .as_object()
            .map(|fields| Self { record, fields })
            .ok_or_else(|| VcenterError::invalid_type(record, FieldType::Object.name()))
    }

    /// Name of the record being decoded.
    pub fn record(&self) -> &'static str {
        self.record
    }

    /// Validate `fields` in order, stopping at the first failure.
    pub fn validate(&self, fields: &[(&str, FieldType)], presence: Presence) -> VcenterResult<()> {
        for &(field, expected) in fields {
            self.check(field, expected, presence)?;
        }
        Ok(())
    }

    fn check(
        &self,
        field: &str,
        expected: FieldType,
        presence: Presence,
    ) -> VcenterResult<Option<&'a Value>> {
        match self.fields.get(field) {
            None => match presence {
                Presence::Required => Err(VcenterError::missing_field(field)),
                Presence::Optional => Ok(None),
            },
            Some(value) if expected.matches(value) => Ok(Some(value)),
            Some(_) => Err(VcenterError::invalid_type(field, expected.name())),
        }
    }

    /// Required string field.
    pub fn str(&self, field: &str) -> VcenterResult<&'a str> {
        match self.check(field, FieldType::String, Presence::Required)? {
            Some(Value::String(s)) => Ok(s.as_str()),
            _ => Err(VcenterError::missing_field(field)),
        }
    }

    /// Optional string field.
    pub fn opt_str(&self, field: &str) -> VcenterResult<Option<&'a str>> {
        Ok(self
            .check(field, FieldType::String, Presence::Optional)?
            .and_then(Value::as_str))
    }

    /// Optional non-negative integer field.
    pub fn opt_u64(&self, field: &str) -> VcenterResult<Option<u64>> {
        Ok(self
            .check(field, FieldType::Integer, Presence::Optional)?
            .and_then(Value::as_u64))
    }

    /// Optional boolean field.
    pub fn opt_bool(&self, field: &str) -> VcenterResult<Option<bool>> {
        Ok(self
            .check(field, FieldType::Boolean, Presence::Optional)?
            .and_then(Value::as_bool))
    }

    /// Required nested object, viewed as its own record.
    pub fn object(&self, field: &str, record: &'static str) -> VcenterResult<Payload<'a>> {
        match self.check(field, FieldType::Object, Presence::Required)? {
            Some(value) => Payload::new(record, value),
            None => Err(VcenterError::missing_field(field)),
        }
    }

    /// Required string field mapped through a label table.
    pub fn label<T: Copy>(&self, field: &str, table: &[(&'static str, T)]) -> VcenterResult<T> {
        decode_label(field, self.str(field)?, table)
    }
}

/// Map `raw` to its variant; exact, case-sensitive match only.
pub fn decode_label<T: Copy>(
    field: &str,
    raw: &str,
    table: &[(&'static str, T)],
) -> VcenterResult<T> {
    table
        .iter()
        .find(|(label, _)| *label == raw)
        .map(|&(_, variant)| variant)
        .ok_or_else(|| VcenterError::invalid_value(field, raw))
}
