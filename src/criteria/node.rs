//! Criteria AST and evaluator
//!
//! The tree is built once from configuration and only read afterwards, so
//! evaluation needs no synchronization.

use std::fmt;

use serde::Serialize;

use super::compare::compare;
use super::path::resolve;
use super::{JsonObject, Operand, Value};

/// Leaf comparison of one resolved field against a configured value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Criterion {
    /// Dotted path into the message body
    pub path: String,
    /// Comparison operator
    pub operand: Operand,
    /// Configured right-hand side
    pub value: Value,
}

impl Criterion {
    /// Create a criterion.
    pub fn new(path: impl Into<String>, operand: Operand, value: Value) -> Self {
        Self {
            path: path.into(),
            operand,
            value,
        }
    }

    /// Evaluate this criterion against a message.
    ///
    /// A path that does not resolve evaluates to `false`.
    pub fn evaluate(&self, obj: &JsonObject) -> bool {
        match resolve(&self.path, obj) {
            Ok(actual) => compare(actual, self.operand, &self.value),
            Err(_) => false,
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.path, self.operand, self.value)
    }
}

/// Boolean combinator over child nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaGroup {
    /// OR mode when set, AND mode otherwise
    pub is_disjunctive: bool,
    /// Invert the group result
    pub is_negated: bool,
    /// Child nodes, evaluated in order
    pub children: Vec<CriteriaNode>,
}

/// A node of the criteria tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CriteriaNode {
    Criterion(Criterion),
    Group(CriteriaGroup),
}

impl CriteriaNode {
    /// Evaluate this node against a message.
    pub fn evaluate(&self, obj: &JsonObject) -> bool {
        self.evaluate_with(obj, &mut |criterion, obj| criterion.evaluate(obj))
    }

    fn evaluate_with(
        &self,
        obj: &JsonObject,
        leaf: &mut dyn FnMut(&Criterion, &JsonObject) -> bool,
    ) -> bool {
        match self {
            CriteriaNode::Criterion(criterion) => leaf(criterion, obj),
            CriteriaNode::Group(group) => group.evaluate_with(obj, leaf),
        }
    }
}

impl From<Criterion> for CriteriaNode {
    fn from(criterion: Criterion) -> Self {
        CriteriaNode::Criterion(criterion)
    }
}

impl From<CriteriaGroup> for CriteriaNode {
    fn from(group: CriteriaGroup) -> Self {
        CriteriaNode::Group(group)
    }
}

impl CriteriaGroup {
    /// Conjunctive, non-negated group.
    pub fn all(children: Vec<CriteriaNode>) -> Self {
        Self {
            is_disjunctive: false,
            is_negated: false,
            children,
        }
    }

    /// Disjunctive, non-negated group.
    pub fn any(children: Vec<CriteriaNode>) -> Self {
        Self {
            is_disjunctive: true,
            is_negated: false,
            children,
        }
    }

    /// Invert the result of this group.
    pub fn negated(mut self) -> Self {
        self.is_negated = !self.is_negated;
        self
    }

    /// Evaluate the group against a message.
    ///
    /// Children are evaluated in order and evaluation stops at the first
    /// decisive child:
    ///
    /// - an empty group returns `is_negated`
    /// - a true child of a disjunctive group returns `!is_negated`
    /// - a false child returns `is_negated`, in both modes
    /// - a conjunctive group whose children all hold returns `!is_negated`
    ///
    /// A disjunctive group therefore only matches when its first child does.
    ///
    /// # Examples
    ///
    /// ```
    /// use queuerator::criteria::{CriteriaGroup, Criterion, Operand, Value};
    /// use serde_json::json;
    ///
    /// let group = CriteriaGroup::all(vec![
    ///     Criterion::new("level", Operand::Ge, Value::Number(3.0)).into(),
    /// ]);
    /// let message = json!({"level": 4});
    /// assert!(group.evaluate(message.as_object().unwrap()));
    /// assert!(!group.clone().negated().evaluate(message.as_object().unwrap()));
    /// ```
    pub fn evaluate(&self, obj: &JsonObject) -> bool {
        self.evaluate_with(obj, &mut |criterion, obj| criterion.evaluate(obj))
    }

    fn evaluate_with(
        &self,
        obj: &JsonObject,
        leaf: &mut dyn FnMut(&Criterion, &JsonObject) -> bool,
    ) -> bool {
        if self.children.is_empty() {
            return self.is_negated;
        }

        for child in &self.children {
            let res = child.evaluate_with(obj, leaf);
            if res && self.is_disjunctive {
                return !self.is_negated;
            } else if !res {
                return self.is_negated;
            }
        }

        !self.is_negated
    }

    /// Number of leaf criteria in the whole tree.
    pub fn criteria_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                CriteriaNode::Criterion(_) => 1,
                CriteriaNode::Group(group) => group.criteria_count(),
            })
            .sum()
    }

    /// Single-line, human-readable rendering for logs.
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CriteriaGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negated {
            f.write_str("NOT ")?;
        }
        if self.children.is_empty() {
            return f.write_str("()");
        }

        let joiner = if self.is_disjunctive { " OR " } else { " AND " };
        f.write_str("(")?;
        for (i, child) in self.children.iter().enumerate() {
            if i > 0 {
                f.write_str(joiner)?;
            }
            match child {
                CriteriaNode::Criterion(c) => write!(f, "{c}")?,
                CriteriaNode::Group(g) => write!(f, "{g}")?,
            }
        }
        f.write_str(")")
    }
}
