//! Static safety checks run once, when a tree is loaded, before it is ever
//! evaluated (§4.4 "Validation"): unique node ids, only known field/param
//! references, no literal-zero divisor, and only the closed action set.

use crate::policy::tree::context::EvalContext;
use crate::policy::tree::types::{ActionSpec, Computation, DecisionTreeDef, Expression, TreeNode, Value};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ValidationError {
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),
    #[error("unknown field reference: {0}")]
    UnknownField(String),
    #[error("unknown parameter reference: {0}")]
    UnknownParameter(String),
    #[error("division by a literal zero at node {0}")]
    DivisionByLiteralZero(String),
    #[error("split action requires n >= 2, found literal {0}")]
    SplitBelowMinimum(i64),
}

/// Validates `tree` in full, collecting every violation rather than
/// stopping at the first one.
pub fn validate_tree(tree: &DecisionTreeDef) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen_ids = HashSet::new();

    check_node(&tree.root, tree, &mut seen_ids, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_node(
    node: &TreeNode,
    tree: &DecisionTreeDef,
    seen_ids: &mut HashSet<String>,
    errors: &mut Vec<ValidationError>,
) {
    if !seen_ids.insert(node.node_id().to_string()) {
        errors.push(ValidationError::DuplicateNodeId(node.node_id().to_string()));
    }

    match node {
        TreeNode::Condition {
            condition,
            on_true,
            on_false,
            ..
        } => {
            check_expression(condition, tree, node.node_id(), errors);
            check_node(on_true, tree, seen_ids, errors);
            check_node(on_false, tree, seen_ids, errors);
        }
        TreeNode::Action { node_id, action } => check_action(action, tree, node_id, errors),
    }
}

fn check_expression(
    expr: &Expression,
    tree: &DecisionTreeDef,
    node_id: &str,
    errors: &mut Vec<ValidationError>,
) {
    match expr {
        Expression::Equal { left, right }
        | Expression::NotEqual { left, right }
        | Expression::LessThan { left, right }
        | Expression::LessOrEqual { left, right }
        | Expression::GreaterThan { left, right }
        | Expression::GreaterOrEqual { left, right } => {
            check_value(left, tree, node_id, errors);
            check_value(right, tree, node_id, errors);
        }
        Expression::And { conditions } | Expression::Or { conditions } => {
            for c in conditions {
                check_expression(c, tree, node_id, errors);
            }
        }
        Expression::Not { condition } => check_expression(condition, tree, node_id, errors),
    }
}

fn check_value(value: &Value, tree: &DecisionTreeDef, node_id: &str, errors: &mut Vec<ValidationError>) {
    match value {
        Value::Field { field } => {
            if !EvalContext::FIELD_NAMES.contains(&field.as_str()) {
                errors.push(ValidationError::UnknownField(field.clone()));
            }
        }
        Value::Param { param } => {
            if !tree.parameters.contains_key(param) {
                errors.push(ValidationError::UnknownParameter(param.clone()));
            }
        }
        Value::Literal { .. } => {}
        Value::Compute { compute } => check_computation(compute, tree, node_id, errors),
    }
}

fn check_computation(
    computation: &Computation,
    tree: &DecisionTreeDef,
    node_id: &str,
    errors: &mut Vec<ValidationError>,
) {
    match computation {
        Computation::Add { left, right }
        | Computation::Subtract { left, right }
        | Computation::Multiply { left, right } => {
            check_value(left, tree, node_id, errors);
            check_value(right, tree, node_id, errors);
        }
        Computation::Divide { left, right } => {
            check_value(left, tree, node_id, errors);
            check_value(right, tree, node_id, errors);
            if let Value::Literal { value: 0 } = right {
                errors.push(ValidationError::DivisionByLiteralZero(node_id.to_string()));
            }
        }
        Computation::Max { values } | Computation::Min { values } => {
            for v in values {
                check_value(v, tree, node_id, errors);
            }
        }
        Computation::Abs { value } => check_value(value, tree, node_id, errors),
        Computation::Clamp { value, min, max } => {
            check_value(value, tree, node_id, errors);
            check_value(min, tree, node_id, errors);
            check_value(max, tree, node_id, errors);
        }
    }
}

fn check_action(action: &ActionSpec, tree: &DecisionTreeDef, node_id: &str, errors: &mut Vec<ValidationError>) {
    match action {
        ActionSpec::Release | ActionSpec::Hold { .. } => {}
        ActionSpec::Split { n } => {
            check_value(n, tree, node_id, errors);
            if let Value::Literal { value } = n {
                if *value < 2 {
                    errors.push(ValidationError::SplitBelowMinimum(*value));
                }
            }
        }
        ActionSpec::Reprioritize { priority } => check_value(priority, tree, node_id, errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn action(node_id: &str, action: ActionSpec) -> TreeNode {
        TreeNode::Action {
            node_id: node_id.to_string(),
            action,
        }
    }

    #[test]
    fn rejects_duplicate_node_ids() {
        let tree = DecisionTreeDef {
            version: "1.0".into(),
            policy_id: "dup".into(),
            description: None,
            root: TreeNode::Condition {
                node_id: "N1".into(),
                description: String::new(),
                condition: Expression::Equal {
                    left: Value::Literal { value: 1 },
                    right: Value::Literal { value: 1 },
                },
                on_true: Box::new(action("N1", ActionSpec::Release)),
                on_false: Box::new(action("N2", ActionSpec::Release)),
            },
            parameters: HashMap::new(),
        };
        let errors = validate_tree(&tree).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateNodeId("N1".into())));
    }

    #[test]
    fn rejects_unknown_field_and_param() {
        let tree = DecisionTreeDef {
            version: "1.0".into(),
            policy_id: "bad_refs".into(),
            description: None,
            root: TreeNode::Condition {
                node_id: "N1".into(),
                description: String::new(),
                condition: Expression::GreaterThan {
                    left: Value::Field {
                        field: "not_a_field".into(),
                    },
                    right: Value::Param {
                        param: "missing_param".into(),
                    },
                },
                on_true: Box::new(action("A1", ActionSpec::Release)),
                on_false: Box::new(action("A2", ActionSpec::Hold { reason: None })),
            },
            parameters: HashMap::new(),
        };
        let errors = validate_tree(&tree).unwrap_err();
        assert!(errors.contains(&ValidationError::UnknownField("not_a_field".into())));
        assert!(errors.contains(&ValidationError::UnknownParameter("missing_param".into())));
    }

    #[test]
    fn rejects_division_by_literal_zero() {
        let tree = DecisionTreeDef {
            version: "1.0".into(),
            policy_id: "div_zero".into(),
            description: None,
            root: action(
                "A1",
                ActionSpec::Split {
                    n: Value::Compute {
                        compute: Box::new(Computation::Divide {
                            left: Value::Field { field: "amount".into() },
                            right: Value::Literal { value: 0 },
                        }),
                    },
                },
            ),
            parameters: HashMap::new(),
        };
        let errors = validate_tree(&tree).unwrap_err();
        assert!(errors.contains(&ValidationError::DivisionByLiteralZero("A1".into())));
    }

    #[test]
    fn rejects_split_below_minimum() {
        let tree = DecisionTreeDef {
            version: "1.0".into(),
            policy_id: "split_min".into(),
            description: None,
            root: action(
                "A1",
                ActionSpec::Split {
                    n: Value::Literal { value: 1 },
                },
            ),
            parameters: HashMap::new(),
        };
        let errors = validate_tree(&tree).unwrap_err();
        assert!(errors.contains(&ValidationError::SplitBelowMinimum(1)));
    }

    #[test]
    fn accepts_well_formed_tree() {
        let mut parameters = HashMap::new();
        parameters.insert("threshold".to_string(), 1_000);
        let tree = DecisionTreeDef {
            version: "1.0".into(),
            policy_id: "ok".into(),
            description: None,
            root: TreeNode::Condition {
                node_id: "N1".into(),
                description: String::new(),
                condition: Expression::GreaterOrEqual {
                    left: Value::Field { field: "balance".into() },
                    right: Value::Param { param: "threshold".into() },
                },
                on_true: Box::new(action("A1", ActionSpec::Release)),
                on_false: Box::new(action("A2", ActionSpec::Hold { reason: None })),
            },
            parameters,
        };
        assert!(validate_tree(&tree).is_ok());
    }
}
