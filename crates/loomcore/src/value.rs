use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Dynamic value carried by workflow tokens
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
    /// A failed result travelling as data in place of a real value
    Error(ErrorDocument),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(j) => Some(j),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&ErrorDocument> {
        match self {
            Value::Error(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// True when this value or any nested collection element is an error document.
    pub fn contains_error(&self) -> bool {
        match self {
            Value::Error(_) => true,
            Value::Array(items) => items.iter().any(Value::contains_error),
            _ => false,
        }
    }

    /// Collection nesting level inferred from the value itself.
    ///
    /// An empty list reports depth 1; callers that know the declared depth of a
    /// stream should carry it alongside the value instead (see [`crate::Datum`]).
    pub fn inferred_depth(&self) -> usize {
        match self {
            Value::Array(items) => 1 + items.first().map(Value::inferred_depth).unwrap_or(0),
            _ => 0,
        }
    }

    /// Short name of the variant, used in type mismatch messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Json(_) => "json",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Error(_) => "error",
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<serde_json::Value> for Value {
    fn from(j: serde_json::Value) -> Self {
        Value::Json(j)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<ErrorDocument> for Value {
    fn from(doc: ErrorDocument) -> Self {
        Value::Error(doc)
    }
}

/// Convert plain JSON into a [`Value`], mapping arrays to collections.
pub fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(arr) => Value::Array(arr.into_iter().map(json_to_value).collect()),
        serde_json::Value::Object(obj) => {
            Value::Object(obj.into_iter().map(|(k, v)| (k, json_to_value(v))).collect())
        }
    }
}

/// Plain JSON rendering of a [`Value`]. Bytes become arrays of numbers and
/// error documents become objects with an `error` key.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(bytes) => serde_json::Value::Array(bytes.iter().map(|b| (*b).into()).collect()),
        Value::Json(json) => json.clone(),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Object(map) => serde_json::Value::Object(
            map.iter().map(|(k, v)| (k.clone(), value_to_json(v))).collect(),
        ),
        Value::Error(doc) => serde_json::json!({
            "error": doc.message,
            "processor": doc.processor,
            "causes": doc.causes,
        }),
    }
}

/// Describes why a value could not be produced.
///
/// Error documents replace outputs of failed jobs so that downstream
/// processors keep running; they are reflected rather than invoked on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDocument {
    pub message: String,
    pub processor: Option<String>,
    pub causes: Vec<String>,
}

impl ErrorDocument {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            processor: None,
            causes: Vec::new(),
        }
    }

    pub fn with_processor(mut self, processor: impl Into<String>) -> Self {
        self.processor = Some(processor.into());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }
}

impl fmt::Display for ErrorDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.processor {
            Some(p) => write!(f, "[{}] {}", p, self.message)?,
            None => write!(f, "{}", self.message)?,
        }
        for cause in &self.causes {
            write!(f, "; caused by: {}", cause)?;
        }
        Ok(())
    }
}
