//! Structured Scene Values
//!
//! JSON-like tree used for page content and for the partial diffs clients send.
//! A value is either a scalar leaf, a mapping of string keys, or a sequence.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// A node in a scene tree
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum SceneValue {
    /// Leaf value (null, bool, number or string)
    Scalar(Scalar),
    /// Field map keyed by string
    Mapping(BTreeMap<String, SceneValue>),
    /// Ordered list of values
    Sequence(Vec<SceneValue>),
}

/// Leaf of a scene tree
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl SceneValue {
    /// The explicit null scalar
    pub fn null() -> Self {
        SceneValue::Scalar(Scalar::Null)
    }

    /// An empty mapping, the content of a freshly created page
    pub fn empty() -> Self {
        SceneValue::Mapping(BTreeMap::new())
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, SceneValue::Scalar(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SceneValue::Scalar(Scalar::Null))
    }

    /// True for mappings and sequences without entries
    pub fn is_empty_container(&self) -> bool {
        match self {
            SceneValue::Mapping(fields) => fields.is_empty(),
            SceneValue::Sequence(items) => items.is_empty(),
            SceneValue::Scalar(_) => false,
        }
    }

    /// Look up a field of a mapping
    pub fn get(&self, key: &str) -> Option<&SceneValue> {
        match self {
            SceneValue::Mapping(fields) => fields.get(key),
            _ => None,
        }
    }
}

impl Default for SceneValue {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Value> for SceneValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => SceneValue::Scalar(Scalar::Null),
            Value::Bool(b) => SceneValue::Scalar(Scalar::Bool(b)),
            Value::Number(n) => SceneValue::Scalar(Scalar::Number(n)),
            Value::String(s) => SceneValue::Scalar(Scalar::String(s)),
            Value::Array(items) => {
                SceneValue::Sequence(items.into_iter().map(SceneValue::from).collect())
            }
            Value::Object(fields) => SceneValue::Mapping(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, SceneValue::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<SceneValue> for Value {
    fn from(value: SceneValue) -> Self {
        match value {
            SceneValue::Scalar(Scalar::Null) => Value::Null,
            SceneValue::Scalar(Scalar::Bool(b)) => Value::Bool(b),
            SceneValue::Scalar(Scalar::Number(n)) => Value::Number(n),
            SceneValue::Scalar(Scalar::String(s)) => Value::String(s),
            SceneValue::Sequence(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            SceneValue::Mapping(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

// Serialized directly so broadcasting a diff never round-trips through `Value`.
impl Serialize for SceneValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SceneValue::Scalar(scalar) => scalar.serialize(serializer),
            SceneValue::Mapping(fields) => fields.serialize(serializer),
            SceneValue::Sequence(items) => items.serialize(serializer),
        }
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Null => serializer.serialize_unit(),
            Scalar::Bool(b) => serializer.serialize_bool(*b),
            Scalar::Number(n) => n.serialize(serializer),
            Scalar::String(s) => serializer.serialize_str(s),
        }
    }
}
