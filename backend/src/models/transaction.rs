//! Transaction model
//!
//! A `Transaction` represents a single payment obligation from a sender agent
//! to a receiver agent. Transactions are created by the arrival generator,
//! scenario events, or as split children of another transaction, and flow
//! through Queue 1 → Queue 2 → settlement (or drop) over their lifetime.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable transaction identifier. Assigned by the caller (arrival generator,
/// scenario applier, or split operation) rather than generated internally, so
/// that identical `(config, seed)` runs produce byte-identical ids (INV-REPLAY).
pub type TxId = String;

/// Current lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Awaiting release, still fully unsettled.
    Pending,
    /// Part of the amount has settled; `remaining_amount` continues to accrue costs.
    PartiallySettled { first_settlement_tick: usize },
    /// Fully settled; no further mutation is permitted (INV-TX-STATUS).
    Settled { tick: usize },
    /// Unresolved at end-of-day and written off.
    Dropped { tick: usize },
}

/// Errors produced while mutating a transaction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("transaction {tx_id} is not divisible and cannot be partially settled")]
    IndivisibleTransaction { tx_id: TxId },

    #[error("settlement amount {amount} exceeds remaining amount {remaining} for {tx_id}")]
    AmountExceedsRemaining {
        tx_id: TxId,
        amount: i64,
        remaining: i64,
    },

    #[error("transaction {tx_id} is already settled")]
    AlreadySettled { tx_id: TxId },

    #[error("transaction {tx_id} has been dropped and cannot settle")]
    TransactionDropped { tx_id: TxId },

    #[error("invalid settlement amount {amount} for {tx_id}")]
    InvalidAmount { tx_id: TxId, amount: i64 },
}

/// A single payment obligation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    id: TxId,
    sender_id: String,
    receiver_id: String,
    amount: i64,
    remaining_amount: i64,
    arrival_tick: usize,
    deadline_tick: usize,
    priority: u8,
    is_divisible: bool,
    status: TransactionStatus,
    /// Present when this transaction was produced by a `Split` action.
    parent_tx_id: Option<TxId>,
    split_index: Option<usize>,
}

impl Transaction {
    /// Create a new pending transaction.
    ///
    /// `priority` is capped at 10; defaults to 5 and `is_divisible` to `false`
    /// unless overridden via [`Transaction::with_priority`] / [`Transaction::divisible`].
    pub fn new(
        id: TxId,
        sender_id: String,
        receiver_id: String,
        amount: i64,
        arrival_tick: usize,
        deadline_tick: usize,
    ) -> Self {
        assert!(amount > 0, "transaction amount must be positive");
        assert!(
            deadline_tick >= arrival_tick,
            "deadline_tick must be >= arrival_tick"
        );
        Self {
            id,
            sender_id,
            receiver_id,
            amount,
            remaining_amount: amount,
            arrival_tick,
            deadline_tick,
            priority: 5,
            is_divisible: false,
            status: TransactionStatus::Pending,
            parent_tx_id: None,
            split_index: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(10);
        self
    }

    pub fn divisible(mut self, is_divisible: bool) -> Self {
        self.is_divisible = is_divisible;
        self
    }

    pub fn with_parent(mut self, parent_tx_id: TxId, split_index: usize) -> Self {
        self.parent_tx_id = Some(parent_tx_id);
        self.split_index = Some(split_index);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }
    pub fn receiver_id(&self) -> &str {
        &self.receiver_id
    }
    pub fn amount(&self) -> i64 {
        self.amount
    }
    pub fn remaining_amount(&self) -> i64 {
        self.remaining_amount
    }
    pub fn amount_settled(&self) -> i64 {
        self.amount - self.remaining_amount
    }
    pub fn arrival_tick(&self) -> usize {
        self.arrival_tick
    }
    pub fn deadline_tick(&self) -> usize {
        self.deadline_tick
    }
    pub fn priority(&self) -> u8 {
        self.priority
    }
    pub fn is_divisible(&self) -> bool {
        self.is_divisible
    }
    pub fn status(&self) -> TransactionStatus {
        self.status
    }
    pub fn parent_tx_id(&self) -> Option<&str> {
        self.parent_tx_id.as_deref()
    }
    pub fn split_index(&self) -> Option<usize> {
        self.split_index
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.status, TransactionStatus::Settled { .. })
    }
    pub fn is_dropped(&self) -> bool {
        matches!(self.status, TransactionStatus::Dropped { .. })
    }
    pub fn is_overdue(&self, current_tick: usize) -> bool {
        current_tick > self.deadline_tick && !self.is_settled() && !self.is_dropped()
    }
    pub fn ticks_to_deadline(&self, current_tick: usize) -> i64 {
        self.deadline_tick as i64 - current_tick as i64
    }

    /// Reprioritize in place (§4.4 `Reprioritize(p)`); clamps to `[0, 10]`.
    pub fn set_priority(&mut self, new_priority: u8) {
        self.priority = new_priority.min(10);
    }

    /// Settle `amount` cents of this transaction at `tick`.
    ///
    /// A full settlement (amount == remaining_amount) transitions to `Settled`.
    /// A partial settlement requires `is_divisible` and transitions to
    /// `PartiallySettled`, recording the tick of the *first* partial settlement.
    pub fn settle(&mut self, amount: i64, tick: usize) -> Result<(), TransactionError> {
        if self.is_settled() {
            return Err(TransactionError::AlreadySettled {
                tx_id: self.id.clone(),
            });
        }
        if self.is_dropped() {
            return Err(TransactionError::TransactionDropped {
                tx_id: self.id.clone(),
            });
        }
        if amount <= 0 {
            return Err(TransactionError::InvalidAmount {
                tx_id: self.id.clone(),
                amount,
            });
        }
        if amount > self.remaining_amount {
            return Err(TransactionError::AmountExceedsRemaining {
                tx_id: self.id.clone(),
                amount,
                remaining: self.remaining_amount,
            });
        }
        if amount < self.remaining_amount && !self.is_divisible {
            return Err(TransactionError::IndivisibleTransaction {
                tx_id: self.id.clone(),
            });
        }

        self.remaining_amount -= amount;

        if self.remaining_amount == 0 {
            self.status = TransactionStatus::Settled { tick };
        } else {
            let first_settlement_tick = match self.status {
                TransactionStatus::PartiallySettled {
                    first_settlement_tick,
                } => first_settlement_tick,
                _ => tick,
            };
            self.status = TransactionStatus::PartiallySettled {
                first_settlement_tick,
            };
        }
        Ok(())
    }

    /// Write this transaction off as unresolved (§4.9 end-of-day handling).
    pub fn drop_transaction(&mut self, tick: usize) {
        if !self.is_settled() {
            self.status = TransactionStatus::Dropped { tick };
        }
    }

    /// Split `remaining_amount` into `num_splits` children that sum exactly to
    /// it (§4.4 `Split(n)`): amounts are distributed evenly with any leftover
    /// cent(s) added to the first child. Caller supplies ids (deterministic,
    /// derived from this transaction's id + split index) and the current tick
    /// for `deadline_tick`/`arrival_tick` inheritance.
    pub fn split<F>(&self, num_splits: usize, tick: usize, mut make_id: F) -> Vec<Transaction>
    where
        F: FnMut(usize) -> TxId,
    {
        assert!(self.is_divisible, "cannot split an indivisible transaction");
        assert!(num_splits >= 2, "split requires at least 2 children");

        let base = self.remaining_amount / num_splits as i64;
        let remainder = self.remaining_amount % num_splits as i64;

        (0..num_splits)
            .map(|i| {
                let amount = if i == 0 { base + remainder } else { base };
                Transaction::new(
                    make_id(i),
                    self.sender_id.clone(),
                    self.receiver_id.clone(),
                    amount,
                    tick,
                    self.deadline_tick,
                )
                .with_priority(self.priority)
                .divisible(self.is_divisible)
                .with_parent(self.id.clone(), i)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx() -> Transaction {
        Transaction::new("tx_0001".into(), "A".into(), "B".into(), 1000, 0, 10)
    }

    #[test]
    fn new_transaction_is_pending() {
        let t = tx();
        assert_eq!(t.status(), TransactionStatus::Pending);
        assert_eq!(t.remaining_amount(), 1000);
        assert_eq!(t.amount_settled(), 0);
    }

    #[test]
    fn full_settlement_transitions_to_settled() {
        let mut t = tx();
        t.settle(1000, 5).unwrap();
        assert_eq!(t.status(), TransactionStatus::Settled { tick: 5 });
        assert!(t.is_settled());
    }

    #[test]
    fn partial_settlement_requires_divisible() {
        let mut t = tx();
        let err = t.settle(400, 5).unwrap_err();
        assert_eq!(
            err,
            TransactionError::IndivisibleTransaction {
                tx_id: "tx_0001".into()
            }
        );
    }

    #[test]
    fn partial_settlement_tracks_first_tick() {
        let mut t = tx().divisible(true);
        t.settle(400, 5).unwrap();
        assert_eq!(
            t.status(),
            TransactionStatus::PartiallySettled {
                first_settlement_tick: 5
            }
        );
        t.settle(600, 9).unwrap();
        assert_eq!(t.status(), TransactionStatus::Settled { tick: 9 });
    }

    #[test]
    fn settled_transaction_rejects_further_settlement() {
        let mut t = tx();
        t.settle(1000, 1).unwrap();
        let err = t.settle(1, 2).unwrap_err();
        assert_eq!(
            err,
            TransactionError::AlreadySettled {
                tx_id: "tx_0001".into()
            }
        );
    }

    #[test]
    fn split_amounts_sum_exactly_with_remainder_on_first() {
        let t = tx().divisible(true);
        let children = t.split(3, 1, |i| format!("tx_0001#{i}"));
        assert_eq!(children.len(), 3);
        let sum: i64 = children.iter().map(|c| c.amount()).sum();
        assert_eq!(sum, 1000);
        // 1000 / 3 = 333 remainder 1 -> first child gets 334
        assert_eq!(children[0].amount(), 334);
        assert_eq!(children[1].amount(), 333);
        assert_eq!(children[2].amount(), 333);
        assert_eq!(children[0].parent_tx_id(), Some("tx_0001"));
        assert_eq!(children[1].split_index(), Some(1));
    }

    #[test]
    fn priority_is_capped_at_ten() {
        let t = tx().with_priority(15);
        assert_eq!(t.priority(), 10);
    }

    #[test]
    fn overdue_detection() {
        let t = tx();
        assert!(!t.is_overdue(10));
        assert!(t.is_overdue(11));
    }
}
