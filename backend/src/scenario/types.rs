//! Scenario event types for simulation configuration
//!
//! Scenario events allow modifying simulation state at specific ticks.
//! Examples: direct transfers, collateral adjustments, arrival rate changes.
//!
//! # Design Principles
//!
//! 1. **Determinism**: All events are deterministically scheduled and executed
//! 2. **Money is i64**: All monetary values are integer cents
//! 3. **Self-contained**: Events include all data needed for execution
//! 4. **Logged**: All executions are logged for replay identity

use serde::{Deserialize, Serialize};

/// A scenario event that modifies simulation state.
///
/// All events are logged to enable replay identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioEvent {
    /// Direct transfer of funds between agents, bypassing normal settlement.
    DirectTransfer {
        from_agent: String,
        to_agent: String,
        amount: i64,
    },

    /// Adjust an agent's credit limit. Positive delta increases credit,
    /// negative decreases; the result is floored at zero.
    CollateralAdjustment { agent: String, delta: i64 },

    /// Multiply every agent's arrival rate relative to its base rate.
    GlobalArrivalRateChange { multiplier: f64 },

    /// Multiply one agent's arrival rate relative to its base rate.
    AgentArrivalRateChange { agent: String, multiplier: f64 },

    /// Change one counterparty weight for an agent. When
    /// `auto_balance_others` is set, remaining weights are rescaled so the
    /// total stays constant.
    CounterpartyWeightChange {
        agent: String,
        counterparty: String,
        new_weight: f64,
        auto_balance_others: bool,
    },

    /// Replace the deadline window bounds (absolute tick offsets from
    /// arrival) used for all future arrivals of `agent`.
    DeadlineWindowChange {
        agent: String,
        new_min: usize,
        new_max: usize,
    },

    /// Inject a fully-specified transaction directly, bypassing the
    /// stochastic arrival generator. Used by the bootstrap sandbox (§4.13)
    /// to replay a resampled history deterministically.
    CustomTransactionArrival {
        tx_id: String,
        sender_id: String,
        receiver_id: String,
        amount: i64,
        deadline_tick: usize,
        priority: u8,
        is_divisible: bool,
    },
}

/// When to execute a scenario event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventSchedule {
    OneTime { tick: usize },
    Repeating { start_tick: usize, interval: usize },
}

impl EventSchedule {
    pub fn should_execute(&self, tick: usize) -> bool {
        match self {
            EventSchedule::OneTime { tick: event_tick } => tick == *event_tick,
            EventSchedule::Repeating {
                start_tick,
                interval,
            } => tick >= *start_tick && (tick - start_tick) % interval == 0,
        }
    }
}

/// A scenario event paired with its schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub event: ScenarioEvent,
    pub schedule: EventSchedule,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_time_schedule_fires_once() {
        let schedule = EventSchedule::OneTime { tick: 10 };
        assert!(!schedule.should_execute(9));
        assert!(schedule.should_execute(10));
        assert!(!schedule.should_execute(11));
    }

    #[test]
    fn repeating_schedule_fires_at_interval() {
        let schedule = EventSchedule::Repeating {
            start_tick: 10,
            interval: 5,
        };
        assert!(!schedule.should_execute(9));
        assert!(schedule.should_execute(10));
        assert!(!schedule.should_execute(11));
        assert!(schedule.should_execute(15));
        assert!(schedule.should_execute(20));
        assert!(!schedule.should_execute(22));
    }

    #[test]
    fn repeating_schedule_start_at_zero() {
        let schedule = EventSchedule::Repeating {
            start_tick: 0,
            interval: 10,
        };
        assert!(schedule.should_execute(0));
        assert!(schedule.should_execute(10));
        assert!(!schedule.should_execute(15));
    }
}
