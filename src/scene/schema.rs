use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declared type of a schema field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Int,
    Float,
    Bool,
    String,
    List,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::String => "string",
            FieldType::List => "list",
        };
        write!(f, "{}", name)
    }
}

/// Schema-typed value stored on actors, globals and role records.
///
/// Untagged on the wire: `true`, `3`, `3.5`, `"x"`, `[..]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<FieldValue>),
}

/// Ordered field map (ordering keeps snapshots byte-stable)
pub type Fields = BTreeMap<String, FieldValue>;

/// Field schema for one actor type
pub type Schema = BTreeMap<String, FieldType>;

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Bool(_) => FieldType::Bool,
            FieldValue::Int(_) => FieldType::Int,
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::Str(_) => FieldType::String,
            FieldValue::List(_) => FieldType::List,
        }
    }

    /// Zero value used for declared fields that were not supplied
    pub fn zero(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Int => FieldValue::Int(0),
            FieldType::Float => FieldValue::Float(0.0),
            FieldType::Bool => FieldValue::Bool(false),
            FieldType::String => FieldValue::Str(String::new()),
            FieldType::List => FieldValue::List(Vec::new()),
        }
    }

    /// Coerce into `field_type`, widening int to float. Returns None on mismatch.
    pub fn conform(&self, field_type: FieldType) -> Option<FieldValue> {
        match (self, field_type) {
            (FieldValue::Int(i), FieldType::Float) => Some(FieldValue::Float(*i as f64)),
            (value, expected) if value.field_type() == expected => Some(value.clone()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

/// Schema validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// Field is not declared in the type's schema
    UnknownField { field: String },
    /// Value does not match the declared type
    TypeMismatch {
        field: String,
        expected: FieldType,
        found: FieldType,
    },
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaError::UnknownField { field } => write!(f, "unknown field '{}'", field),
            SchemaError::TypeMismatch {
                field,
                expected,
                found,
            } => write!(
                f,
                "field '{}' expects {} but got {}",
                field, expected, found
            ),
        }
    }
}

impl std::error::Error for SchemaError {}

/// Build a validated field map from template defaults and instance overrides.
///
/// Without a schema the maps are merged as-is. With a schema every declared
/// field is present afterwards (zero-filled when not supplied).
pub fn build_fields(
    schema: Option<&Schema>,
    defaults: &Fields,
    overrides: &Fields,
) -> Result<Fields, SchemaError> {
    let Some(schema) = schema else {
        let mut fields = defaults.clone();
        fields.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        return Ok(fields);
    };

    let mut fields: Fields = schema
        .iter()
        .map(|(name, ty)| (name.clone(), FieldValue::zero(*ty)))
        .collect();

    for (name, value) in defaults.iter().chain(overrides.iter()) {
        fields.insert(name.clone(), check_field(schema, name, value)?);
    }

    Ok(fields)
}

/// Check a single assignment against a schema
pub fn check_field(schema: &Schema, name: &str, value: &FieldValue) -> Result<FieldValue, SchemaError> {
    let expected = schema.get(name).ok_or_else(|| SchemaError::UnknownField {
        field: name.to_string(),
    })?;
    value
        .conform(*expected)
        .ok_or_else(|| SchemaError::TypeMismatch {
            field: name.to_string(),
            expected: *expected,
            found: value.field_type(),
        })
}
