//! Typed comparison operands decoded from configuration
//!
//! A [`Value`] is the right-hand side of a [`crate::criteria::Criterion`].
//! It is decoded once when the configuration is loaded and never touched
//! again; message data is never decoded into a `Value`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{CriteriaError, JsonObject};

/// Kind tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    Text,
    Boolean,
    Object,
    List,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Number => "number",
            ValueKind::Text => "text",
            ValueKind::Boolean => "boolean",
            ValueKind::Object => "object",
            ValueKind::List => "list",
        };
        f.write_str(name)
    }
}

/// Configured operand of a comparison.
///
/// Objects are stored untyped; only list elements are recursively decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Boolean(bool),
    Object(JsonObject),
    List(Vec<Value>),
}

impl Value {
    /// Decode a value from a JSON scalar, array or object.
    ///
    /// # Errors
    ///
    /// Returns `CriteriaError::UnsupportedValue` naming the raw input when
    /// the JSON is `null` (or a number that has no `f64` representation).
    ///
    /// # Examples
    ///
    /// ```
    /// use queuerator::criteria::Value;
    /// use serde_json::json;
    ///
    /// assert_eq!(Value::from_json(&json!(3)).unwrap(), Value::Number(3.0));
    /// assert_eq!(
    ///     Value::from_json(&json!(["a", true])).unwrap(),
    ///     Value::List(vec![Value::Text("a".into()), Value::Boolean(true)])
    /// );
    /// assert!(Value::from_json(&json!(null)).is_err());
    /// ```
    pub fn from_json(raw: &serde_json::Value) -> Result<Self, CriteriaError> {
        match raw {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(Value::Number)
                .ok_or_else(|| CriteriaError::UnsupportedValue(raw.to_string())),
            serde_json::Value::String(s) => Ok(Value::Text(s.clone())),
            serde_json::Value::Bool(b) => Ok(Value::Boolean(*b)),
            serde_json::Value::Object(o) => Ok(Value::Object(o.clone())),
            serde_json::Value::Array(items) => items
                .iter()
                .map(Value::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            serde_json::Value::Null => Err(CriteriaError::UnsupportedValue(raw.to_string())),
        }
    }

    /// Kind tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Number(_) => ValueKind::Number,
            Value::Text(_) => ValueKind::Text,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Object(_) => ValueKind::Object,
            Value::List(_) => ValueKind::List,
        }
    }

    /// Convert back into untyped JSON.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Object(o) => serde_json::Value::Object(o.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Object(o) => o.serialize(serializer),
            Value::List(items) => items.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Value::from_json(&raw).map_err(serde::de::Error::custom)
    }
}

/// Comparison operator of a criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operand {
    /// Symbol used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operand::Eq => "==",
            Operand::Ne => "!=",
            Operand::Lt => "<",
            Operand::Le => "<=",
            Operand::Gt => ">",
            Operand::Ge => ">=",
        }
    }
}

impl FromStr for Operand {
    type Err = CriteriaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(Operand::Eq),
            "!=" => Ok(Operand::Ne),
            "<" => Ok(Operand::Lt),
            "<=" => Ok(Operand::Le),
            ">" => Ok(Operand::Gt),
            ">=" => Ok(Operand::Ge),
            other => Err(CriteriaError::UnknownOperand(other.to_string())),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Operand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Operand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let symbol = String::deserialize(deserializer)?;
        symbol.parse().map_err(serde::de::Error::custom)
    }
}
