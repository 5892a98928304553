//! Declarative criteria filtering for JSON message bodies
//!
//! This module turns the `criteria` block of a source descriptor into an
//! immutable boolean expression tree and evaluates that tree against each
//! decoded message.
//!
//! # Overview
//!
//! A criteria tree is made of two node kinds:
//!
//! 1. [`Criterion`]: a leaf that resolves a dotted path inside the message
//!    and compares the value found there against a configured [`Value`]
//! 2. [`CriteriaGroup`]: a conjunction or disjunction over child nodes,
//!    optionally negated
//!
//! # Modules
//!
//! - [`value`]: typed right-hand operands decoded from configuration
//! - [`path`]: dotted path resolution against JSON objects
//! - [`compare`]: per-kind comparison semantics
//! - [`node`]: the AST and its evaluator
//! - [`parse`]: JSON decoding of criteria trees
//!
//! # Example
//!
//! ```
//! use queuerator::criteria::CriteriaGroup;
//! use serde_json::json;
//!
//! let criteria = CriteriaGroup::from_json(&json!({
//!     "children": [
//!         { "path": "device.temperature", "operand": ">", "value": 40 },
//!         { "path": "device.kind", "operand": "==", "value": "sensor" }
//!     ]
//! }))
//! .unwrap();
//!
//! let message = json!({ "device": { "temperature": 42.5, "kind": "sensor" } });
//! assert!(criteria.evaluate(message.as_object().unwrap()));
//! ```

pub mod compare;
pub mod node;
pub mod parse;
pub mod path;
pub mod value;

use thiserror::Error;

pub use node::{CriteriaGroup, CriteriaNode, Criterion};
pub use path::{resolve, PathNotFound};
pub use value::{Operand, Value, ValueKind};

/// Untyped JSON object a criteria tree is evaluated against.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Errors raised while decoding a criteria tree from configuration.
///
/// All of these are fatal at startup: a source whose criteria cannot be
/// decoded is never connected.
#[derive(Error, Debug)]
pub enum CriteriaError {
    /// Value has a JSON type that cannot be used as a comparison operand
    #[error("could not infer value type from {0}")]
    UnsupportedValue(String),

    /// Operand symbol is not one of the six comparison operators
    #[error("unknown operand value {0}")]
    UnknownOperand(String),

    /// Node is not a JSON object
    #[error("criteria node must be a JSON object, got {0}")]
    NotAnObject(String),

    /// Required field is absent from a node
    #[error("missing field `{field}` in criteria node {node}")]
    MissingField {
        /// Name of the missing field
        field: &'static str,
        /// Raw JSON of the offending node
        node: String,
    },

    /// Field is present but has the wrong JSON type
    #[error("field `{field}` must be {expected}, got {found}")]
    InvalidField {
        /// Name of the offending field
        field: &'static str,
        /// Human-readable description of the accepted type
        expected: &'static str,
        /// Raw JSON of the value that was found
        found: String,
    },

    /// Leaf criterion has an empty path
    #[error("criterion path must not be empty")]
    EmptyPath,
}
