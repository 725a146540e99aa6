//! Agent (bank) model
//!
//! Represents a participant in the payment system: its settlement balance,
//! credit line, posted collateral, arrival configuration, and Queue 1 (the
//! agent's own internal holding queue). All money values are `i64` cents.

use crate::costs::CostAccumulator;
use crate::models::transaction::TxId;
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("insufficient liquidity: required {required}, available {available}")]
    InsufficientLiquidity { required: i64, available: i64 },
}

/// A bank participating in the simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    id: String,
    balance: i64,
    credit_limit: i64,
    collateral_posted: i64,
    collateral_capacity: i64,
    arrival_rate: f64,
    counterparty_weights: HashMap<String, f64>,
    /// Queue 1: this agent's own pending transactions, in arrival order.
    outgoing_queue: VecDeque<TxId>,
    costs: CostAccumulator,
}

impl Agent {
    /// Create a new agent with zero collateral, zero arrival rate, and an
    /// empty Queue 1. `credit_limit` must be non-negative.
    pub fn new(id: String, balance: i64, credit_limit: i64) -> Self {
        assert!(credit_limit >= 0, "credit_limit must be non-negative");
        Self {
            id,
            balance,
            credit_limit,
            collateral_posted: 0,
            collateral_capacity: 0,
            arrival_rate: 0.0,
            counterparty_weights: HashMap::new(),
            outgoing_queue: VecDeque::new(),
            costs: CostAccumulator::default(),
        }
    }

    pub fn with_collateral_capacity(mut self, capacity: i64) -> Self {
        assert!(capacity >= 0, "collateral_capacity must be non-negative");
        self.collateral_capacity = capacity;
        self
    }

    pub fn with_arrival_rate(mut self, rate: f64) -> Self {
        assert!(rate >= 0.0, "arrival_rate must be non-negative");
        self.arrival_rate = rate;
        self
    }

    pub fn with_counterparty_weights(mut self, weights: HashMap<String, f64>) -> Self {
        self.counterparty_weights = weights;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn balance(&self) -> i64 {
        self.balance
    }
    pub fn credit_limit(&self) -> i64 {
        self.credit_limit
    }
    pub fn collateral_posted(&self) -> i64 {
        self.collateral_posted
    }
    pub fn collateral_capacity(&self) -> i64 {
        self.collateral_capacity
    }
    pub fn arrival_rate(&self) -> f64 {
        self.arrival_rate
    }
    pub fn counterparty_weights(&self) -> &HashMap<String, f64> {
        &self.counterparty_weights
    }
    pub fn costs(&self) -> &CostAccumulator {
        &self.costs
    }
    pub fn costs_mut(&mut self) -> &mut CostAccumulator {
        &mut self.costs
    }

    /// `credit_limit + collateral_posted` (§4.7).
    pub fn effective_credit(&self) -> i64 {
        self.credit_limit + self.collateral_posted
    }

    /// `balance + effective_credit` — the most this agent could pay out
    /// without breaching its liquidity floor.
    pub fn available_liquidity(&self) -> i64 {
        self.balance + self.effective_credit()
    }

    pub fn can_pay(&self, amount: i64) -> bool {
        self.available_liquidity() >= amount
    }

    pub fn is_using_credit(&self) -> bool {
        self.balance < 0
    }

    pub fn credit_used(&self) -> i64 {
        if self.balance < 0 {
            -self.balance
        } else {
            0
        }
    }

    /// Atomically debit this agent's balance. Fails if the resulting balance
    /// would breach `-effective_credit` (§4.7 "balance exceeding effective_credit
    /// is forbidden").
    pub fn debit(&mut self, amount: i64) -> Result<(), AgentError> {
        if !self.can_pay(amount) {
            return Err(AgentError::InsufficientLiquidity {
                required: amount,
                available: self.available_liquidity(),
            });
        }
        self.balance -= amount;
        Ok(())
    }

    pub fn credit(&mut self, amount: i64) {
        self.balance += amount;
    }

    /// Move balance by a signed delta, bypassing liquidity checks. Used only
    /// by scenario-event direct transfers, which are permitted to push a
    /// balance negative beyond `effective_credit` (spec treats this as an
    /// externally-injected adjustment, not a settlement).
    pub fn adjust_balance(&mut self, delta: i64) {
        self.balance += delta;
    }

    pub fn set_credit_limit(&mut self, new_limit: i64) {
        self.credit_limit = new_limit.max(0);
    }

    pub fn set_arrival_rate(&mut self, rate: f64) {
        self.arrival_rate = rate.max(0.0);
    }

    pub fn set_counterparty_weight(&mut self, counterparty: &str, weight: f64) {
        self.counterparty_weights
            .insert(counterparty.to_string(), weight);
    }

    /// Post `amount` of collateral, converting it 1:1 into additional
    /// `credit_limit` headroom. Posting/withdrawing collateral never changes
    /// `balance` (§3 invariant).
    pub fn post_collateral(&mut self, amount: i64) {
        assert!(amount >= 0, "collateral amount must be non-negative");
        self.collateral_posted += amount;
    }

    /// Withdraw up to `amount` of posted collateral, clamped at zero.
    pub fn withdraw_collateral(&mut self, amount: i64) -> i64 {
        let withdrawn = amount.min(self.collateral_posted);
        self.collateral_posted -= withdrawn;
        withdrawn
    }

    // -- Queue 1 ----------------------------------------------------------

    pub fn queue_outgoing(&mut self, tx_id: TxId) {
        self.outgoing_queue.push_back(tx_id);
    }

    /// Remove and return the front of Queue 1 if it matches `tx_id`. Used by
    /// in-order release/hold/split processing (§4.5: Queue 1 is scanned in
    /// arrival order and decisions applied in place).
    pub fn remove_from_outgoing(&mut self, tx_id: &str) -> bool {
        if let Some(pos) = self.outgoing_queue.iter().position(|id| id == tx_id) {
            self.outgoing_queue.remove(pos);
            true
        } else {
            false
        }
    }

    /// Replace `tx_id` in place with `children`, preserving Queue 1 position
    /// (§4.4 `Split(n)`: "replace with children at the same position").
    pub fn replace_in_outgoing(&mut self, tx_id: &str, children: &[TxId]) -> bool {
        if let Some(pos) = self.outgoing_queue.iter().position(|id| id == tx_id) {
            self.outgoing_queue.remove(pos);
            for (offset, child) in children.iter().enumerate() {
                self.outgoing_queue.insert(pos + offset, child.clone());
            }
            true
        } else {
            false
        }
    }

    pub fn outgoing_queue(&self) -> &VecDeque<TxId> {
        &self.outgoing_queue
    }

    pub fn queue1_size(&self) -> usize {
        self.outgoing_queue.len()
    }

    /// Empty Queue 1 outright. Used by end-of-day handling (§4.9), after
    /// every remaining transaction has already been marked `Dropped`.
    pub fn clear_outgoing(&mut self) {
        self.outgoing_queue.clear();
    }
}
