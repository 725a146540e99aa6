//! Wraps a validated [`DecisionTreeDef`] as a [`CashManagerPolicy`],
//! evaluating it against every payment in an agent's Queue 1 each tick.

use crate::policy::tree::{build_decision, validate_tree, DecisionTreeDef, EvalContext, EvalError, ValidationError};
use crate::policy::{CashManagerPolicy, ReleaseDecision};
use crate::{Agent, SimulationState};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreePolicyError {
    #[error("failed to read tree file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse tree JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("tree failed validation: {0:?}")]
    Validation(Vec<ValidationError>),
}

/// A JSON decision tree policy (§6.2 `FromJson`). Validated once, at
/// construction, then evaluated fresh per payment per tick.
pub struct TreePolicy {
    tree: DecisionTreeDef,
}

impl TreePolicy {
    pub fn new(tree: DecisionTreeDef) -> Result<Self, TreePolicyError> {
        validate_tree(&tree).map_err(TreePolicyError::Validation)?;
        Ok(Self { tree })
    }

    pub fn from_json(json: &str) -> Result<Self, TreePolicyError> {
        let tree: DecisionTreeDef = serde_json::from_str(json)?;
        Self::new(tree)
    }

    pub fn from_file(path: &Path) -> Result<Self, TreePolicyError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn policy_id(&self) -> &str {
        &self.tree.policy_id
    }
}

impl CashManagerPolicy for TreePolicy {
    fn evaluate_queue(
        &mut self,
        agent: &Agent,
        state: &SimulationState,
        tick: usize,
        ticks_per_day: usize,
    ) -> Vec<ReleaseDecision> {
        let mut decisions = Vec::with_capacity(agent.queue1_size());
        for tx_id in agent.outgoing_queue() {
            let Some(tx) = state.get_transaction(tx_id) else {
                continue;
            };
            let context = EvalContext::build(tx, agent, state, tick, ticks_per_day);
            match build_decision(&self.tree, tx_id, &context) {
                Ok(decision) => decisions.push(decision),
                Err(err) => {
                    tracing::warn!(
                        policy_id = %self.tree.policy_id,
                        tx_id = %tx_id,
                        error = %err,
                        "policy tree evaluation failed; holding payment"
                    );
                    decisions.push(ReleaseDecision::Hold {
                        tx_id: tx_id.clone(),
                        reason: Some(format!("evaluation error: {err}")),
                    });
                }
            }
        }
        decisions
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
