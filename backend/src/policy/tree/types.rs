//! JSON decision-tree type definitions (§4.4).
//!
//! A policy tree is a binary tree of `Condition`/`Action` nodes, evaluated
//! against a payment/agent/clock context to produce a `ReleaseDecision`. All
//! arithmetic is integer (cents or counts); there is no floating point
//! anywhere in this module, matching §4.1's prohibition on money touching
//! floats.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root object deserialized from a policy's JSON file (§6.2 `FromJson`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeDef {
    pub version: String,
    pub policy_id: String,
    #[serde(default)]
    pub description: Option<String>,
    pub root: TreeNode,
    #[serde(default)]
    pub parameters: HashMap<String, i64>,
}

/// A node in the decision tree: either a branch or a terminal decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    Condition {
        node_id: String,
        #[serde(default)]
        description: String,
        condition: Expression,
        on_true: Box<TreeNode>,
        on_false: Box<TreeNode>,
    },
    Action {
        node_id: String,
        action: ActionSpec,
    },
}

impl TreeNode {
    pub fn node_id(&self) -> &str {
        match self {
            TreeNode::Condition { node_id, .. } => node_id,
            TreeNode::Action { node_id, .. } => node_id,
        }
    }
}

/// Terminal decision produced by an `Action` node. Maps 1:1 onto
/// `ReleaseDecision` (§4.4's closed set `{Release, Hold, Split(n), Reprioritize(p)}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionSpec {
    Release,
    Hold {
        #[serde(default)]
        reason: Option<String>,
    },
    /// `n` is evaluated against the context; must be >= 2 and the payment
    /// must be divisible (validation catches the static cases; the dynamic
    /// `is_divisible` check happens at evaluation time).
    Split { n: Value },
    Reprioritize { priority: Value },
}

/// Boolean expression evaluated against an [`crate::policy::tree::context::EvalContext`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Expression {
    #[serde(rename = "==")]
    Equal { left: Value, right: Value },
    #[serde(rename = "!=")]
    NotEqual { left: Value, right: Value },
    #[serde(rename = "<")]
    LessThan { left: Value, right: Value },
    #[serde(rename = "<=")]
    LessOrEqual { left: Value, right: Value },
    #[serde(rename = ">")]
    GreaterThan { left: Value, right: Value },
    #[serde(rename = ">=")]
    GreaterOrEqual { left: Value, right: Value },
    #[serde(rename = "and")]
    And { conditions: Vec<Expression> },
    #[serde(rename = "or")]
    Or { conditions: Vec<Expression> },
    #[serde(rename = "not")]
    Not { condition: Box<Expression> },
}

/// A value in an expression: a context field, a named parameter, a literal,
/// or a nested computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Field { field: String },
    Param { param: String },
    Literal { value: i64 },
    Compute { compute: Box<Computation> },
}

/// Integer arithmetic over two (or more) [`Value`]s. Division truncates
/// towards zero; division by a literal zero is rejected at validation time
/// (§4.4 "no `compute{/}` with a literal zero right operand").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Computation {
    #[serde(rename = "+")]
    Add { left: Value, right: Value },
    #[serde(rename = "-")]
    Subtract { left: Value, right: Value },
    #[serde(rename = "*")]
    Multiply { left: Value, right: Value },
    #[serde(rename = "/")]
    Divide { left: Value, right: Value },
    #[serde(rename = "max")]
    Max { values: Vec<Value> },
    #[serde(rename = "min")]
    Min { values: Vec<Value> },
    #[serde(rename = "abs")]
    Abs { value: Value },
    #[serde(rename = "clamp")]
    Clamp { value: Value, min: Value, max: Value },
}
