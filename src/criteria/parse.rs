//! JSON decoding of criteria trees
//!
//! A node is a group exactly when its object carries a `children` key;
//! every other object is a leaf. The decoder peeks at that key first and
//! then decodes the node as the selected variant, so an explicit
//! discriminant can be added later without breaking existing files.
//!
//! Leaf shape:
//!
//! ```json
//! { "path": "a.b", "operand": ">=", "value": 3 }
//! ```
//!
//! Group shape (both flags default to `false`):
//!
//! ```json
//! { "isDisjunctive": true, "isNegated": false, "children": [ ... ] }
//! ```

use serde::{Deserialize, Deserializer};

use super::{CriteriaError, CriteriaGroup, CriteriaNode, Criterion, JsonObject, Value};

const CHILDREN_KEY: &str = "children";

/// Which variant a raw node decodes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeShape {
    Leaf,
    Group,
}

fn peek_shape(raw: &JsonObject) -> NodeShape {
    if raw.contains_key(CHILDREN_KEY) {
        NodeShape::Group
    } else {
        NodeShape::Leaf
    }
}

fn as_object(raw: &serde_json::Value) -> Result<&JsonObject, CriteriaError> {
    raw.as_object()
        .ok_or_else(|| CriteriaError::NotAnObject(raw.to_string()))
}

/// Read an optional boolean flag; absent and `null` both mean `false`.
fn flag(raw: &JsonObject, field: &'static str) -> Result<bool, CriteriaError> {
    match raw.get(field) {
        None | Some(serde_json::Value::Null) => Ok(false),
        Some(serde_json::Value::Bool(b)) => Ok(*b),
        Some(other) => Err(CriteriaError::InvalidField {
            field,
            expected: "a boolean",
            found: other.to_string(),
        }),
    }
}

fn required<'a>(
    raw: &'a JsonObject,
    field: &'static str,
) -> Result<&'a serde_json::Value, CriteriaError> {
    raw.get(field).ok_or_else(|| CriteriaError::MissingField {
        field,
        node: serde_json::Value::Object(raw.clone()).to_string(),
    })
}

fn required_str<'a>(raw: &'a JsonObject, field: &'static str) -> Result<&'a str, CriteriaError> {
    let value = required(raw, field)?;
    value.as_str().ok_or_else(|| CriteriaError::InvalidField {
        field,
        expected: "a string",
        found: value.to_string(),
    })
}

impl CriteriaNode {
    /// Decode a leaf or group node.
    ///
    /// # Errors
    ///
    /// Returns a [`CriteriaError`] when the node is not an object, a field is
    /// missing or mistyped, the operand is unknown, or the value is `null`.
    pub fn from_json(raw: &serde_json::Value) -> Result<Self, CriteriaError> {
        let obj = as_object(raw)?;
        match peek_shape(obj) {
            NodeShape::Group => CriteriaGroup::from_object(obj).map(CriteriaNode::Group),
            NodeShape::Leaf => Criterion::from_object(obj).map(CriteriaNode::Criterion),
        }
    }
}

impl Criterion {
    /// Decode a leaf criterion.
    pub fn from_json(raw: &serde_json::Value) -> Result<Self, CriteriaError> {
        Self::from_object(as_object(raw)?)
    }

    fn from_object(raw: &JsonObject) -> Result<Self, CriteriaError> {
        let path = required_str(raw, "path")?;
        if path.is_empty() {
            return Err(CriteriaError::EmptyPath);
        }

        let operand = required_str(raw, "operand")?.parse()?;
        let value = Value::from_json(required(raw, "value")?)?;

        Ok(Criterion::new(path, operand, value))
    }
}

impl CriteriaGroup {
    /// Decode a group node, typically the `criteria` block of a source.
    ///
    /// A missing or `null` `children` key yields an empty group.
    ///
    /// # Examples
    ///
    /// ```
    /// use queuerator::criteria::CriteriaGroup;
    /// use serde_json::json;
    ///
    /// let group = CriteriaGroup::from_json(&json!({
    ///     "isDisjunctive": true,
    ///     "children": [{ "path": "kind", "operand": "==", "value": "alert" }]
    /// }))
    /// .unwrap();
    /// assert!(group.is_disjunctive);
    /// assert_eq!(group.children.len(), 1);
    /// ```
    pub fn from_json(raw: &serde_json::Value) -> Result<Self, CriteriaError> {
        Self::from_object(as_object(raw)?)
    }

    fn from_object(raw: &JsonObject) -> Result<Self, CriteriaError> {
        let is_disjunctive = flag(raw, "isDisjunctive")?;
        let is_negated = flag(raw, "isNegated")?;

        let children = match raw.get(CHILDREN_KEY) {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(CriteriaNode::from_json)
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(CriteriaError::InvalidField {
                    field: CHILDREN_KEY,
                    expected: "an array",
                    found: other.to_string(),
                })
            }
        };

        Ok(CriteriaGroup {
            is_disjunctive,
            is_negated,
            children,
        })
    }
}

impl<'de> Deserialize<'de> for CriteriaGroup {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        CriteriaGroup::from_json(&raw).map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for CriteriaNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        CriteriaNode::from_json(&raw).map_err(serde::de::Error::custom)
    }
}
