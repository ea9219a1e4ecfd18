//! Bind values and statement parameters.
//!
//! `SqlValue` is the typed value that flows through parameter binding,
//! entity fields and dirty-field diffing. Bind types follow the inference
//! rules of the layer: integers and booleans bind natively, everything else
//! binds as a string. There is no implicit float binding; floats are bound
//! as their decimal rendering.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A single typed value bound to a statement or held by an entity field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value (bound as its string rendering)
    Float(f64),
    /// String value
    Text(String),
}

impl SqlValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The inferred bind type name, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
        }
    }

    /// Convert a decoded row value into a bindable value.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(0.0)),
            },
            JsonValue::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }

    /// Render as a JSON value (cache serialization, observer payloads).
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(i) => JsonValue::Number((*i).into()),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(f.to_string())),
            Self::Text(s) => JsonValue::String(s.clone()),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

/// Parameters for one statement execution: none, an ordered sequence, or a
/// name-keyed mapping bound to `:name` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub enum Params {
    #[default]
    None,
    Positional(Vec<SqlValue>),
    Named(Vec<(String, SqlValue)>),
}

impl Params {
    /// No parameters.
    pub fn none() -> Self {
        Self::None
    }

    /// Ordered positional parameters bound to `?` placeholders.
    pub fn positional<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<SqlValue>,
    {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }

    /// Name-keyed parameters bound to `:name` placeholders.
    pub fn named<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SqlValue>,
    {
        Self::Named(
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Number of bound values.
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Positional(v) => v.len(),
            Self::Named(v) => v.len(),
        }
    }

    /// True when no values are bound.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical serialization used for cache-key derivation. Named
    /// parameters are sorted by name so binding order does not change the
    /// key; positional parameters keep their order.
    pub fn canonical_json(&self) -> String {
        match self {
            Self::None => "[]".to_string(),
            Self::Positional(values) => {
                let arr: Vec<JsonValue> = values.iter().map(SqlValue::to_json).collect();
                JsonValue::Array(arr).to_string()
            }
            Self::Named(values) => {
                let mut sorted: Vec<&(String, SqlValue)> = values.iter().collect();
                sorted.sort_by(|a, b| a.0.cmp(&b.0));
                let mut map = serde_json::Map::new();
                for (name, value) in sorted {
                    map.insert(name.clone(), value.to_json());
                }
                JsonValue::Object(map).to_string()
            }
        }
    }
}
