//! Pure evaluation of a validated decision tree against an [`EvalContext`]
//! (§4.4). All arithmetic is integer; division truncates towards zero.

use crate::policy::tree::context::{ContextError, EvalContext};
use crate::policy::tree::types::{ActionSpec, Computation, DecisionTreeDef, Expression, TreeNode, Value};
use crate::policy::ReleaseDecision;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum EvalError {
    #[error("parameter not found: {0}")]
    ParameterNotFound(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("empty value list for min/max computation")]
    EmptyValueList,
    #[error("split action evaluated n < 2: {0}")]
    SplitBelowMinimum(i64),
    #[error("reprioritize action evaluated priority out of range 0-10: {0}")]
    PriorityOutOfRange(i64),
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Evaluates `value` to an integer, resolving fields, parameters, literals,
/// and nested computations.
pub fn evaluate_value(
    value: &Value,
    context: &EvalContext,
    params: &HashMap<String, i64>,
) -> Result<i64, EvalError> {
    match value {
        Value::Field { field } => Ok(context.field(field)?),
        Value::Param { param } => params
            .get(param)
            .copied()
            .ok_or_else(|| EvalError::ParameterNotFound(param.clone())),
        Value::Literal { value } => Ok(*value),
        Value::Compute { compute } => evaluate_computation(compute, context, params),
    }
}

/// Evaluates a nested arithmetic computation. Division truncates towards
/// zero (Rust's native integer division); a literal-zero divisor is
/// rejected ahead of time by validation, but a computed zero at runtime is
/// still reported as [`EvalError::DivisionByZero`] rather than panicking.
pub fn evaluate_computation(
    computation: &Computation,
    context: &EvalContext,
    params: &HashMap<String, i64>,
) -> Result<i64, EvalError> {
    Ok(match computation {
        Computation::Add { left, right } => {
            evaluate_value(left, context, params)? + evaluate_value(right, context, params)?
        }
        Computation::Subtract { left, right } => {
            evaluate_value(left, context, params)? - evaluate_value(right, context, params)?
        }
        Computation::Multiply { left, right } => {
            evaluate_value(left, context, params)? * evaluate_value(right, context, params)?
        }
        Computation::Divide { left, right } => {
            let l = evaluate_value(left, context, params)?;
            let r = evaluate_value(right, context, params)?;
            if r == 0 {
                return Err(EvalError::DivisionByZero);
            }
            l / r
        }
        Computation::Max { values } => {
            let mut vals = values.iter().map(|v| evaluate_value(v, context, params));
            let mut best = vals.next().ok_or(EvalError::EmptyValueList)??;
            for v in vals {
                best = best.max(v?);
            }
            best
        }
        Computation::Min { values } => {
            let mut vals = values.iter().map(|v| evaluate_value(v, context, params));
            let mut best = vals.next().ok_or(EvalError::EmptyValueList)??;
            for v in vals {
                best = best.min(v?);
            }
            best
        }
        Computation::Abs { value } => evaluate_value(value, context, params)?.abs(),
        Computation::Clamp { value, min, max } => {
            let v = evaluate_value(value, context, params)?;
            let lo = evaluate_value(min, context, params)?;
            let hi = evaluate_value(max, context, params)?;
            v.clamp(lo, hi)
        }
    })
}

/// Evaluates a boolean expression.
pub fn evaluate_expression(
    expr: &Expression,
    context: &EvalContext,
    params: &HashMap<String, i64>,
) -> Result<bool, EvalError> {
    Ok(match expr {
        Expression::Equal { left, right } => {
            evaluate_value(left, context, params)? == evaluate_value(right, context, params)?
        }
        Expression::NotEqual { left, right } => {
            evaluate_value(left, context, params)? != evaluate_value(right, context, params)?
        }
        Expression::LessThan { left, right } => {
            evaluate_value(left, context, params)? < evaluate_value(right, context, params)?
        }
        Expression::LessOrEqual { left, right } => {
            evaluate_value(left, context, params)? <= evaluate_value(right, context, params)?
        }
        Expression::GreaterThan { left, right } => {
            evaluate_value(left, context, params)? > evaluate_value(right, context, params)?
        }
        Expression::GreaterOrEqual { left, right } => {
            evaluate_value(left, context, params)? >= evaluate_value(right, context, params)?
        }
        Expression::And { conditions } => {
            for c in conditions {
                if !evaluate_expression(c, context, params)? {
                    return Ok(false);
                }
            }
            true
        }
        Expression::Or { conditions } => {
            for c in conditions {
                if evaluate_expression(c, context, params)? {
                    return Ok(true);
                }
            }
            false
        }
        Expression::Not { condition } => !evaluate_expression(condition, context, params)?,
    })
}

/// Walks `tree` from the root to a terminal `Action` node for `context`.
fn traverse_tree<'a>(
    tree: &'a DecisionTreeDef,
    context: &EvalContext,
) -> Result<&'a ActionSpec, EvalError> {
    let mut node = &tree.root;
    loop {
        match node {
            TreeNode::Action { action, .. } => return Ok(action),
            TreeNode::Condition {
                condition,
                on_true,
                on_false,
                ..
            } => {
                node = if evaluate_expression(condition, context, &tree.parameters)? {
                    on_true
                } else {
                    on_false
                };
            }
        }
    }
}

/// Evaluates `tree` for `tx_id` under `context`, producing the
/// [`ReleaseDecision`] its reached action node specifies.
pub fn build_decision(
    tree: &DecisionTreeDef,
    tx_id: &str,
    context: &EvalContext,
) -> Result<ReleaseDecision, EvalError> {
    let action = traverse_tree(tree, context)?;
    Ok(match action {
        ActionSpec::Release => ReleaseDecision::Release {
            tx_id: tx_id.to_string(),
        },
        ActionSpec::Hold { reason } => ReleaseDecision::Hold {
            tx_id: tx_id.to_string(),
            reason: reason.clone(),
        },
        ActionSpec::Split { n } => {
            let n = evaluate_value(n, context, &tree.parameters)?;
            if n < 2 {
                return Err(EvalError::SplitBelowMinimum(n));
            }
            ReleaseDecision::Split {
                tx_id: tx_id.to_string(),
                n: n as usize,
            }
        }
        ActionSpec::Reprioritize { priority } => {
            let priority = evaluate_value(priority, context, &tree.parameters)?;
            if !(0..=10).contains(&priority) {
                return Err(EvalError::PriorityOutOfRange(priority));
            }
            ReleaseDecision::Reprioritize {
                tx_id: tx_id.to_string(),
                new_priority: priority as u8,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Agent, SimulationState, Transaction};

    fn context() -> EvalContext {
        let agent = Agent::new("A".into(), 5_000, 1_000);
        let tx = Transaction::new("tx_1".into(), "A".into(), "B".into(), 2_000, 0, 20);
        let state = SimulationState::new(vec![Agent::new("A".into(), 5_000, 1_000)]);
        EvalContext::build(&tx, &agent, &state, 0, 10)
    }

    #[test]
    fn evaluates_literal_and_field_values() {
        let ctx = context();
        let params = HashMap::new();
        assert_eq!(
            evaluate_value(&Value::Literal { value: 42 }, &ctx, &params).unwrap(),
            42
        );
        assert_eq!(
            evaluate_value(&Value::Field { field: "balance".into() }, &ctx, &params).unwrap(),
            5_000
        );
    }

    #[test]
    fn division_truncates_towards_zero() {
        let ctx = context();
        let params = HashMap::new();
        let computation = Computation::Divide {
            left: Value::Literal { value: 7 },
            right: Value::Literal { value: 2 },
        };
        assert_eq!(evaluate_computation(&computation, &ctx, &params).unwrap(), 3);
    }

    #[test]
    fn runtime_division_by_zero_is_reported() {
        let ctx = context();
        let params = HashMap::new();
        let computation = Computation::Divide {
            left: Value::Literal { value: 7 },
            right: Value::Literal { value: 0 },
        };
        assert_eq!(
            evaluate_computation(&computation, &ctx, &params),
            Err(EvalError::DivisionByZero)
        );
    }

    #[test]
    fn builds_release_decision_from_condition() {
        let tree = DecisionTreeDef {
            version: "1.0".into(),
            policy_id: "test".into(),
            description: None,
            root: TreeNode::Condition {
                node_id: "N1".into(),
                description: String::new(),
                condition: Expression::GreaterThan {
                    left: Value::Field { field: "balance".into() },
                    right: Value::Field { field: "amount".into() },
                },
                on_true: Box::new(TreeNode::Action {
                    node_id: "A1".into(),
                    action: ActionSpec::Release,
                }),
                on_false: Box::new(TreeNode::Action {
                    node_id: "A2".into(),
                    action: ActionSpec::Hold { reason: Some("insufficient".into()) },
                }),
            },
            parameters: HashMap::new(),
        };
        let ctx = context();
        let decision = build_decision(&tree, "tx_1", &ctx).unwrap();
        assert_eq!(
            decision,
            ReleaseDecision::Release { tx_id: "tx_1".into() }
        );
    }

    #[test]
    fn split_action_rejects_n_below_two() {
        let tree = DecisionTreeDef {
            version: "1.0".into(),
            policy_id: "test".into(),
            description: None,
            root: TreeNode::Action {
                node_id: "A1".into(),
                action: ActionSpec::Split { n: Value::Literal { value: 1 } },
            },
            parameters: HashMap::new(),
        };
        let ctx = context();
        assert_eq!(
            build_decision(&tree, "tx_1", &ctx),
            Err(EvalError::SplitBelowMinimum(1))
        );
    }
}
