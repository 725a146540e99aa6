//! Event logging for simulation replay and auditing.
//!
//! `Event` is a closed, exhaustively-matched enum covering every transition
//! named in spec §3/§4.10. The event stream is the **replay source of
//! truth** (INV-REPLAY): no derived state may exist that cannot be
//! reconstructed from `(config, events)`.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Which cost bucket a generic `CostAccrual` event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostBucket {
    Liquidity,
    Delay,
    Collateral,
    SplitFriction,
    Eod,
}

/// Reason a transaction was held in Queue 1, mirrored into the event log so
/// replay can reproduce the same policy narrative (kept in sync with
/// `crate::policy::HoldReason`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HoldReasonEvent {
    InsufficientLiquidity,
    AwaitingInflows,
    LowPriority,
    NearDeadline { ticks_remaining: usize },
    Custom(String),
}

/// A single, immutable state-transition record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum Event {
    Arrival {
        tick: usize,
        tx_id: String,
        sender_id: String,
        receiver_id: String,
        amount: i64,
        deadline_tick: usize,
        priority: u8,
        is_divisible: bool,
    },
    PolicySubmit {
        tick: usize,
        agent_id: String,
        tx_id: String,
    },
    PolicyHold {
        tick: usize,
        agent_id: String,
        tx_id: String,
        reason: HoldReasonEvent,
    },
    PolicySplit {
        tick: usize,
        agent_id: String,
        tx_id: String,
        num_splits: usize,
        child_ids: Vec<String>,
    },
    PolicyReprioritize {
        tick: usize,
        agent_id: String,
        tx_id: String,
        old_priority: u8,
        new_priority: u8,
    },
    RtgsImmediateSettlement {
        tick: usize,
        tx_id: String,
        sender_id: String,
        receiver_id: String,
        amount: i64,
    },
    Queue2LiquidityRelease {
        tick: usize,
        tx_id: String,
        sender_id: String,
        receiver_id: String,
        amount: i64,
    },
    LsmBilateralOffset {
        tick: usize,
        agent_a: String,
        agent_b: String,
        amount_a_to_b: i64,
        amount_b_to_a: i64,
        tx_ids_a_to_b: Vec<String>,
        tx_ids_b_to_a: Vec<String>,
    },
    LsmCycleSettlement {
        tick: usize,
        participants: Vec<String>,
        total_value: i64,
        tx_ids: Vec<String>,
    },
    CostAccrual {
        tick: usize,
        agent_id: String,
        bucket: CostBucket,
        amount: i64,
    },
    DeadlinePenalty {
        tick: usize,
        tx_id: String,
        agent_id: String,
        amount: i64,
        ticks_overdue: i64,
    },
    CollateralPost {
        tick: usize,
        agent_id: String,
        amount: i64,
        reason: String,
        new_total: i64,
    },
    CollateralWithdraw {
        tick: usize,
        agent_id: String,
        amount: i64,
        reason: String,
        new_total: i64,
    },
    PriorityEscalated {
        tick: usize,
        tx_id: String,
        agent_id: String,
        original_priority: u8,
        escalated_priority: u8,
        boost_applied: u8,
        ticks_until_deadline: i64,
    },
    TransactionWentOverdue {
        tick: usize,
        tx_id: String,
        agent_id: String,
        deadline_tick: usize,
    },
    TransactionDropped {
        tick: usize,
        tx_id: String,
        agent_id: String,
        remaining_amount: i64,
    },
    ScenarioEventExecuted {
        tick: usize,
        event_type: String,
        details: Json,
    },
}

impl Event {
    pub fn tick(&self) -> usize {
        match self {
            Event::Arrival { tick, .. }
            | Event::PolicySubmit { tick, .. }
            | Event::PolicyHold { tick, .. }
            | Event::PolicySplit { tick, .. }
            | Event::PolicyReprioritize { tick, .. }
            | Event::RtgsImmediateSettlement { tick, .. }
            | Event::Queue2LiquidityRelease { tick, .. }
            | Event::LsmBilateralOffset { tick, .. }
            | Event::LsmCycleSettlement { tick, .. }
            | Event::CostAccrual { tick, .. }
            | Event::DeadlinePenalty { tick, .. }
            | Event::CollateralPost { tick, .. }
            | Event::CollateralWithdraw { tick, .. }
            | Event::PriorityEscalated { tick, .. }
            | Event::TransactionWentOverdue { tick, .. }
            | Event::TransactionDropped { tick, .. }
            | Event::ScenarioEventExecuted { tick, .. } => *tick,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Arrival { .. } => "arrival",
            Event::PolicySubmit { .. } => "policy_submit",
            Event::PolicyHold { .. } => "policy_hold",
            Event::PolicySplit { .. } => "policy_split",
            Event::PolicyReprioritize { .. } => "policy_reprioritize",
            Event::RtgsImmediateSettlement { .. } => "rtgs_immediate_settlement",
            Event::Queue2LiquidityRelease { .. } => "queue2_liquidity_release",
            Event::LsmBilateralOffset { .. } => "lsm_bilateral_offset",
            Event::LsmCycleSettlement { .. } => "lsm_cycle_settlement",
            Event::CostAccrual { .. } => "cost_accrual",
            Event::DeadlinePenalty { .. } => "deadline_penalty",
            Event::CollateralPost { .. } => "collateral_post",
            Event::CollateralWithdraw { .. } => "collateral_withdraw",
            Event::PriorityEscalated { .. } => "priority_escalated",
            Event::TransactionWentOverdue { .. } => "transaction_went_overdue",
            Event::TransactionDropped { .. } => "transaction_dropped",
            Event::ScenarioEventExecuted { .. } => "scenario_event_executed",
        }
    }

    /// The transaction this event concerns, if any.
    pub fn tx_id(&self) -> Option<&str> {
        match self {
            Event::Arrival { tx_id, .. }
            | Event::PolicySubmit { tx_id, .. }
            | Event::PolicyHold { tx_id, .. }
            | Event::PolicySplit { tx_id, .. }
            | Event::PolicyReprioritize { tx_id, .. }
            | Event::RtgsImmediateSettlement { tx_id, .. }
            | Event::Queue2LiquidityRelease { tx_id, .. }
            | Event::DeadlinePenalty { tx_id, .. }
            | Event::PriorityEscalated { tx_id, .. }
            | Event::TransactionWentOverdue { tx_id, .. }
            | Event::TransactionDropped { tx_id, .. } => Some(tx_id),
            _ => None,
        }
    }

    /// The single agent this event concerns, if unambiguous. Bilateral/cycle
    /// LSM events and arrivals involve two agents and return `None` here;
    /// callers needing per-agent filtering use [`Event::participants`].
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Event::PolicySubmit { agent_id, .. }
            | Event::PolicyHold { agent_id, .. }
            | Event::PolicySplit { agent_id, .. }
            | Event::PolicyReprioritize { agent_id, .. }
            | Event::CostAccrual { agent_id, .. }
            | Event::DeadlinePenalty { agent_id, .. }
            | Event::CollateralPost { agent_id, .. }
            | Event::CollateralWithdraw { agent_id, .. }
            | Event::PriorityEscalated { agent_id, .. }
            | Event::TransactionWentOverdue { agent_id, .. }
            | Event::TransactionDropped { agent_id, .. } => Some(agent_id),
            _ => None,
        }
    }

    /// All agent ids this event references, in a stable order. This is the
    /// basis for information-isolation filtering (§4.15.1): an event is
    /// visible to agent `a` iff `a` is among its participants.
    pub fn participants(&self) -> Vec<&str> {
        match self {
            Event::Arrival {
                sender_id,
                receiver_id,
                ..
            }
            | Event::RtgsImmediateSettlement {
                sender_id,
                receiver_id,
                ..
            }
            | Event::Queue2LiquidityRelease {
                sender_id,
                receiver_id,
                ..
            } => vec![sender_id, receiver_id],
            Event::LsmBilateralOffset {
                agent_a, agent_b, ..
            } => vec![agent_a, agent_b],
            Event::LsmCycleSettlement { participants, .. } => {
                participants.iter().map(String::as_str).collect()
            }
            other => other.agent_id().into_iter().collect(),
        }
    }
}

/// Append-only chronological event log. Ordering within a tick follows the
/// fixed pipeline phases (§4.10); append order equals logical order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_at_tick(&self, tick: usize) -> Vec<&Event> {
        self.events.iter().filter(|e| e.tick() == tick).collect()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn events_for_tx(&self, tx_id: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.tx_id() == Some(tx_id))
            .collect()
    }

    pub fn events_for_agent(&self, agent_id: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.participants().contains(&agent_id))
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
