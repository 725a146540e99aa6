//! Evaluation context: the field values a policy tree's expressions read
//! from (§4.4 "Fields available to expressions").

use crate::{Agent, SimulationState, Transaction};
use thiserror::Error;

/// Errors that can occur during context field lookup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("field '{0}' not found in evaluation context")]
    FieldNotFound(String),
}

/// Snapshot of every field a policy expression may reference, built fresh
/// for each `(payment, agent, tick)` evaluated (§4.4: evaluation is pure and
/// side-effect free). All arithmetic is integer — no floats touch money.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext {
    pub amount: i64,
    pub remaining_amount: i64,
    pub priority: i64,
    pub ticks_to_deadline: i64,
    pub is_divisible: i64,
    pub is_incoming: i64,
    pub is_outgoing: i64,

    pub balance: i64,
    pub credit_limit: i64,
    pub available_credit: i64,
    pub posted_collateral: i64,
    pub queue1_size: i64,
    pub queue2_size: i64,

    pub tick: i64,
    pub tick_of_day: i64,
    /// `day_progress` scaled to basis points (`0..=10_000`) so it fits the
    /// same integer expression language as the money fields.
    pub day_progress_bps: i64,
}

impl EvalContext {
    /// Builds the context for `tx`, owned by `agent`, at `tick`. Queue 1
    /// only ever holds an agent's own outgoing payments, so `is_outgoing`
    /// is always 1 and `is_incoming` always 0 here.
    pub fn build(
        tx: &Transaction,
        agent: &Agent,
        state: &SimulationState,
        tick: usize,
        ticks_per_day: usize,
    ) -> Self {
        let tick_of_day = if ticks_per_day == 0 { 0 } else { tick % ticks_per_day };
        let day_progress_bps = if ticks_per_day == 0 {
            0
        } else {
            (tick_of_day as i64) * 10_000 / ticks_per_day as i64
        };

        Self {
            amount: tx.amount(),
            remaining_amount: tx.remaining_amount(),
            priority: tx.priority() as i64,
            ticks_to_deadline: tx.ticks_to_deadline(tick),
            is_divisible: tx.is_divisible() as i64,
            is_incoming: 0,
            is_outgoing: 1,

            balance: agent.balance(),
            credit_limit: agent.credit_limit(),
            available_credit: agent.available_liquidity(),
            posted_collateral: agent.collateral_posted(),
            queue1_size: agent.queue1_size() as i64,
            queue2_size: state.queue2_index().get_agent_transactions(agent.id()).len() as i64,

            tick: tick as i64,
            tick_of_day: tick_of_day as i64,
            day_progress_bps,
        }
    }

    pub fn field(&self, name: &str) -> Result<i64, ContextError> {
        Ok(match name {
            "amount" => self.amount,
            "remaining_amount" => self.remaining_amount,
            "priority" => self.priority,
            "ticks_to_deadline" => self.ticks_to_deadline,
            "is_divisible" => self.is_divisible,
            "is_incoming" => self.is_incoming,
            "is_outgoing" => self.is_outgoing,
            "balance" => self.balance,
            "credit_limit" => self.credit_limit,
            "available_credit" => self.available_credit,
            "posted_collateral" => self.posted_collateral,
            "queue1_size" => self.queue1_size,
            "queue2_size" => self.queue2_size,
            "tick" => self.tick,
            "tick_of_day" => self.tick_of_day,
            "day_progress_bps" => self.day_progress_bps,
            other => return Err(ContextError::FieldNotFound(other.to_string())),
        })
    }

    /// All field names this context recognizes. Validation uses this to
    /// reject `field(name)` references that could never resolve.
    pub const FIELD_NAMES: &'static [&'static str] = &[
        "amount",
        "remaining_amount",
        "priority",
        "ticks_to_deadline",
        "is_divisible",
        "is_incoming",
        "is_outgoing",
        "balance",
        "credit_limit",
        "available_credit",
        "posted_collateral",
        "queue1_size",
        "queue2_size",
        "tick",
        "tick_of_day",
        "day_progress_bps",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_context_from_transaction_and_agent() {
        let agent = Agent::new("A".into(), 1_000, 200);
        let tx = Transaction::new("tx_1".into(), "A".into(), "B".into(), 500, 0, 20)
            .with_priority(7)
            .divisible(true);
        let state = SimulationState::new(vec![Agent::new("A".into(), 1_000, 200)]);

        let ctx = EvalContext::build(&tx, &agent, &state, 5, 10);
        assert_eq!(ctx.amount, 500);
        assert_eq!(ctx.priority, 7);
        assert_eq!(ctx.ticks_to_deadline, 15);
        assert_eq!(ctx.is_divisible, 1);
        assert_eq!(ctx.is_outgoing, 1);
        assert_eq!(ctx.balance, 1_000);
        assert_eq!(ctx.tick_of_day, 5);
        assert_eq!(ctx.day_progress_bps, 5_000);
    }

    #[test]
    fn field_lookup_rejects_unknown_names() {
        let agent = Agent::new("A".into(), 0, 0);
        let tx = Transaction::new("tx_1".into(), "A".into(), "B".into(), 500, 0, 20);
        let state = SimulationState::new(vec![Agent::new("A".into(), 0, 0)]);
        let ctx = EvalContext::build(&tx, &agent, &state, 0, 10);
        assert!(ctx.field("nonexistent").is_err());
        assert!(ctx.field("balance").is_ok());
    }
}
