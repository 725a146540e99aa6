//! RTGS (Real-Time Gross Settlement) engine (§4.7).
//!
//! ```text
//! Queue 1 (bank-internal) -> released -> Queue 2 (central RTGS queue)
//!                                                |
//!                                    try_settle / try_settle_partial
//!                                                |
//!                                  debit sender, credit receiver (atomic)
//! ```
//!
//! Settlement happens at the central bank: `effective_credit = credit_limit
//! + posted_collateral` bounds how far a sender's balance may go negative.
//! Indivisible transactions settle all-or-nothing; divisible transactions
//! may settle the amount the sender can currently afford, leaving the rest
//! queued.

use crate::models::agent::{Agent, AgentError};
use crate::models::state::SimulationState;
use crate::models::transaction::{Transaction, TransactionError};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum SettlementError {
    #[error("insufficient liquidity: required {required}, available {available}")]
    InsufficientLiquidity { required: i64, available: i64 },
    #[error("transaction already settled")]
    AlreadySettled,
    #[error("transaction has been dropped")]
    Dropped,
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// Attempts to settle the full remaining amount of `transaction` in one
/// atomic debit/credit. No state changes on failure.
pub fn try_settle(
    sender: &mut Agent,
    receiver: &mut Agent,
    transaction: &mut Transaction,
    tick: usize,
) -> Result<(), SettlementError> {
    if transaction.is_settled() {
        return Err(SettlementError::AlreadySettled);
    }
    if transaction.is_dropped() {
        return Err(SettlementError::Dropped);
    }

    let amount = transaction.remaining_amount();
    if !sender.can_pay(amount) {
        return Err(SettlementError::InsufficientLiquidity {
            required: amount,
            available: sender.available_liquidity(),
        });
    }

    sender.debit(amount)?;
    receiver.credit(amount);
    transaction.settle(amount, tick)?;
    Ok(())
}

/// Attempts partial settlement for a divisible transaction: settles
/// `min(remaining_amount, sender.available_liquidity())`. Indivisible
/// transactions fall back to [`try_settle`]'s all-or-nothing behavior.
/// Returns the amount actually settled; `0` means nothing happened and the
/// transaction should stay queued.
pub fn try_settle_partial(
    sender: &mut Agent,
    receiver: &mut Agent,
    transaction: &mut Transaction,
    tick: usize,
) -> Result<i64, SettlementError> {
    if transaction.is_settled() {
        return Err(SettlementError::AlreadySettled);
    }
    if transaction.is_dropped() {
        return Err(SettlementError::Dropped);
    }

    let remaining = transaction.remaining_amount();
    let available = sender.available_liquidity();

    if available <= 0 {
        return Ok(0);
    }

    let amount = if transaction.is_divisible() {
        remaining.min(available)
    } else if available >= remaining {
        remaining
    } else {
        return Ok(0);
    };

    if amount <= 0 {
        return Ok(0);
    }

    sender.debit(amount)?;
    receiver.credit(amount);
    transaction.settle(amount, tick)?;
    Ok(amount)
}

/// Statistics from one pass over the Queue 2 retry queue (§4.10 phase 6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueProcessingResult {
    pub settled_count: usize,
    pub settled_value: i64,
    pub remaining_queue_size: usize,
    pub dropped_count: usize,
}

/// Retries every transaction sitting in Queue 2 in FIFO order: settles
/// (fully or partially, depending on divisibility) whatever current
/// liquidity allows, drops anything past its deadline, and re-queues the
/// rest.
pub fn process_queue(state: &mut SimulationState, tick: usize) -> QueueProcessingResult {
    let mut settled_count = 0;
    let mut settled_value = 0i64;
    let mut dropped_count = 0;
    let mut still_pending = Vec::new();

    let tx_ids: Vec<String> = state.rtgs_queue_mut().drain(..).collect();

    for tx_id in tx_ids {
        let transaction = state.get_transaction_mut(&tx_id).expect("queued transaction must exist");

        if transaction.is_settled() {
            continue;
        }
        if transaction.is_overdue(tick) {
            transaction.drop_transaction(tick);
            dropped_count += 1;
            continue;
        }

        let sender_id = transaction.sender_id().to_string();
        let receiver_id = transaction.receiver_id().to_string();
        let remaining = transaction.remaining_amount();
        let is_divisible = transaction.is_divisible();

        let available = state.get_agent(&sender_id).expect("sender must exist").available_liquidity();
        let amount = if is_divisible {
            remaining.min(available)
        } else if available >= remaining {
            remaining
        } else {
            0
        };

        if amount > 0 {
            state
                .get_agent_mut(&sender_id)
                .expect("sender must exist")
                .debit(amount)
                .expect("amount was bounded by available_liquidity");
            state.get_agent_mut(&receiver_id).expect("receiver must exist").credit(amount);
            state
                .get_transaction_mut(&tx_id)
                .expect("transaction must exist")
                .settle(amount, tick)
                .expect("amount was bounded by remaining_amount");

            settled_count += 1;
            settled_value += amount;
        }

        let transaction = state.get_transaction(&tx_id).expect("transaction must exist");
        if !transaction.is_settled() {
            still_pending.push(tx_id);
        }
    }

    *state.rtgs_queue_mut() = still_pending;

    QueueProcessingResult {
        settled_count,
        settled_value,
        remaining_queue_size: state.queue_size(),
        dropped_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str, balance: i64, credit_limit: i64) -> Agent {
        Agent::new(id.to_string(), balance, credit_limit)
    }

    fn tx(sender: &str, receiver: &str, amount: i64, deadline: usize) -> Transaction {
        Transaction::new("tx_1".into(), sender.to_string(), receiver.to_string(), amount, 0, deadline)
    }

    #[test]
    fn settles_when_liquidity_sufficient() {
        let mut sender = agent("A", 1_000_000, 0);
        let mut receiver = agent("B", 0, 0);
        let mut transaction = tx("A", "B", 500_000, 100);

        try_settle(&mut sender, &mut receiver, &mut transaction, 5).unwrap();
        assert_eq!(sender.balance(), 500_000);
        assert_eq!(receiver.balance(), 500_000);
        assert!(transaction.is_settled());
    }

    #[test]
    fn settles_within_credit_limit() {
        let mut sender = agent("A", 300_000, 500_000);
        let mut receiver = agent("B", 0, 0);
        let mut transaction = tx("A", "B", 600_000, 100);

        try_settle(&mut sender, &mut receiver, &mut transaction, 5).unwrap();
        assert_eq!(sender.balance(), -300_000);
        assert!(sender.is_using_credit());
        assert_eq!(receiver.balance(), 600_000);
    }

    #[test]
    fn rejects_settlement_beyond_effective_credit() {
        let mut sender = agent("A", 300_000, 500_000);
        let mut receiver = agent("B", 0, 0);
        let mut transaction = tx("A", "B", 900_000, 100);

        let result = try_settle(&mut sender, &mut receiver, &mut transaction, 5);
        assert!(result.is_err());
        assert_eq!(sender.balance(), 300_000);
        assert_eq!(receiver.balance(), 0);
    }

    #[test]
    fn partial_settlement_settles_only_what_is_divisible_and_affordable() {
        let mut sender = agent("A", 400_000, 0);
        let mut receiver = agent("B", 0, 0);
        let mut transaction = tx("A", "B", 1_000_000, 100).divisible(true);

        let settled = try_settle_partial(&mut sender, &mut receiver, &mut transaction, 5).unwrap();
        assert_eq!(settled, 400_000);
        assert_eq!(sender.balance(), 0);
        assert_eq!(receiver.balance(), 400_000);
        assert_eq!(transaction.remaining_amount(), 600_000);
        assert!(!transaction.is_settled());
    }

    #[test]
    fn partial_settlement_on_indivisible_falls_back_to_all_or_nothing() {
        let mut sender = agent("A", 400_000, 0);
        let mut receiver = agent("B", 0, 0);
        let mut transaction = tx("A", "B", 1_000_000, 100);

        let settled = try_settle_partial(&mut sender, &mut receiver, &mut transaction, 5).unwrap();
        assert_eq!(settled, 0);
        assert_eq!(sender.balance(), 400_000);
        assert!(!transaction.is_settled());
    }
}
