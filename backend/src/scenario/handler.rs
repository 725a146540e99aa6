//! Scenario event execution and scheduling.
//!
//! Handles scheduling events by tick, executing them against simulation
//! state and the arrival generator, and logging each execution for replay.

use crate::arrivals::ArrivalGenerator;
use crate::models::{state::SimulationState, Event};
use crate::scenario::types::{EventSchedule, ScenarioEvent, ScheduledEvent};
use serde_json::json;

/// Handles scenario event scheduling and execution.
pub struct ScenarioEventHandler {
    events: Vec<ScheduledEvent>,
}

impl ScenarioEventHandler {
    pub fn new(events: Vec<ScheduledEvent>) -> Self {
        Self { events }
    }

    /// Get all events scheduled for a specific tick.
    pub fn get_events_for_tick(&self, tick: usize) -> Vec<&ScenarioEvent> {
        self.events
            .iter()
            .filter(|scheduled| scheduled.schedule.should_execute(tick))
            .map(|scheduled| &scheduled.event)
            .collect()
    }

    /// Execute all events scheduled for the given tick (phase 1 of §4.10).
    ///
    /// Returns the number of events executed, or the first error encountered.
    pub fn execute_tick_events(
        &self,
        state: &mut SimulationState,
        arrivals: &mut ArrivalGenerator,
        tick: usize,
    ) -> Result<usize, String> {
        let events = self.get_events_for_tick(tick);
        let count = events.len();

        for event in events {
            event.execute(state, arrivals, tick)?;
        }

        Ok(count)
    }
}

impl ScenarioEvent {
    pub fn execute(
        &self,
        state: &mut SimulationState,
        arrivals: &mut ArrivalGenerator,
        tick: usize,
    ) -> Result<(), String> {
        match self {
            ScenarioEvent::DirectTransfer {
                from_agent,
                to_agent,
                amount,
            } => execute_direct_transfer(state, tick, from_agent, to_agent, *amount),

            ScenarioEvent::CollateralAdjustment { agent, delta } => {
                execute_collateral_adjustment(state, tick, agent, *delta)
            }

            ScenarioEvent::GlobalArrivalRateChange { multiplier } => {
                execute_global_rate_change(state, arrivals, tick, *multiplier)
            }

            ScenarioEvent::AgentArrivalRateChange { agent, multiplier } => {
                execute_agent_rate_change(state, arrivals, tick, agent, *multiplier)
            }

            ScenarioEvent::CounterpartyWeightChange {
                agent,
                counterparty,
                new_weight,
                auto_balance_others,
            } => execute_counterparty_weight_change(
                state,
                arrivals,
                tick,
                agent,
                counterparty,
                *new_weight,
                *auto_balance_others,
            ),

            ScenarioEvent::DeadlineWindowChange {
                agent,
                new_min,
                new_max,
            } => execute_deadline_window_change(state, arrivals, tick, agent, *new_min, *new_max),

            ScenarioEvent::CustomTransactionArrival {
                tx_id,
                sender_id,
                receiver_id,
                amount,
                deadline_tick,
                priority,
                is_divisible,
            } => execute_custom_transaction_arrival(
                state,
                tick,
                tx_id,
                sender_id,
                receiver_id,
                *amount,
                *deadline_tick,
                *priority,
                *is_divisible,
            ),
        }
    }
}

fn execute_direct_transfer(
    state: &mut SimulationState,
    tick: usize,
    from_agent: &str,
    to_agent: &str,
    amount: i64,
) -> Result<(), String> {
    if state.get_agent(from_agent).is_none() {
        return Err(format!("Agent not found: {from_agent}"));
    }
    if state.get_agent(to_agent).is_none() {
        return Err(format!("Agent not found: {to_agent}"));
    }

    // Bypasses liquidity checks by design: scenario-level transfers model
    // external injections/withdrawals, not RTGS-governed payments.
    state.get_agent_mut(from_agent).unwrap().adjust_balance(-amount);
    state.get_agent_mut(to_agent).unwrap().adjust_balance(amount);

    log_scenario_event(
        state,
        tick,
        "direct_transfer",
        &json!({ "from_agent": from_agent, "to_agent": to_agent, "amount": amount }),
    );
    Ok(())
}

fn execute_collateral_adjustment(
    state: &mut SimulationState,
    tick: usize,
    agent: &str,
    delta: i64,
) -> Result<(), String> {
    let agent_obj = state
        .get_agent(agent)
        .ok_or_else(|| format!("Agent not found: {agent}"))?;

    let old_limit = agent_obj.credit_limit();
    let new_limit = old_limit + delta;

    state.set_credit_limit(agent, new_limit);
    let applied_limit = state.get_agent(agent).unwrap().credit_limit();

    log_scenario_event(
        state,
        tick,
        "collateral_adjustment",
        &json!({
            "agent": agent,
            "delta": delta,
            "old_limit": old_limit,
            "new_limit": applied_limit,
        }),
    );
    Ok(())
}

fn execute_global_rate_change(
    state: &mut SimulationState,
    arrivals: &mut ArrivalGenerator,
    tick: usize,
    multiplier: f64,
) -> Result<(), String> {
    arrivals.multiply_all_rates(multiplier);
    log_scenario_event(
        state,
        tick,
        "global_arrival_rate_change",
        &json!({ "multiplier": multiplier }),
    );
    Ok(())
}

fn execute_agent_rate_change(
    state: &mut SimulationState,
    arrivals: &mut ArrivalGenerator,
    tick: usize,
    agent: &str,
    multiplier: f64,
) -> Result<(), String> {
    let base_rate = arrivals
        .get_rate(agent)
        .ok_or_else(|| format!("Agent not found in arrival config: {agent}"))?;
    arrivals.set_rate(agent, base_rate * multiplier);

    log_scenario_event(
        state,
        tick,
        "agent_arrival_rate_change",
        &json!({ "agent": agent, "multiplier": multiplier }),
    );
    Ok(())
}

fn execute_counterparty_weight_change(
    state: &mut SimulationState,
    arrivals: &mut ArrivalGenerator,
    tick: usize,
    agent: &str,
    counterparty: &str,
    new_weight: f64,
    auto_balance_others: bool,
) -> Result<(), String> {
    if arrivals.get_rate(agent).is_none() {
        return Err(format!("Agent not found in arrival config: {agent}"));
    }

    if auto_balance_others {
        arrivals.rebalance_counterparty_weight(agent, counterparty, new_weight);
    } else {
        arrivals.set_counterparty_weight(agent, counterparty, new_weight);
    }

    log_scenario_event(
        state,
        tick,
        "counterparty_weight_change",
        &json!({
            "agent": agent,
            "counterparty": counterparty,
            "new_weight": new_weight,
            "auto_balance_others": auto_balance_others,
        }),
    );
    Ok(())
}

fn execute_deadline_window_change(
    state: &mut SimulationState,
    arrivals: &mut ArrivalGenerator,
    tick: usize,
    agent: &str,
    new_min: usize,
    new_max: usize,
) -> Result<(), String> {
    if new_min > new_max {
        return Err(format!(
            "new_min ({new_min}) must be <= new_max ({new_max})"
        ));
    }
    if arrivals.get_rate(agent).is_none() {
        return Err(format!("Agent not found in arrival config: {agent}"));
    }
    arrivals.set_deadline_range(agent, (new_min, new_max));

    log_scenario_event(
        state,
        tick,
        "deadline_window_change",
        &json!({ "agent": agent, "new_min": new_min, "new_max": new_max }),
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn execute_custom_transaction_arrival(
    state: &mut SimulationState,
    tick: usize,
    tx_id: &str,
    sender_id: &str,
    receiver_id: &str,
    amount: i64,
    deadline_tick: usize,
    priority: u8,
    is_divisible: bool,
) -> Result<(), String> {
    if state.get_agent(sender_id).is_none() {
        return Err(format!("Agent not found: {sender_id}"));
    }
    if state.get_agent(receiver_id).is_none() {
        return Err(format!("Agent not found: {receiver_id}"));
    }

    let mut tx = crate::models::Transaction::new(
        tx_id.to_string(),
        sender_id.to_string(),
        receiver_id.to_string(),
        amount,
        tick,
        deadline_tick,
    )
    .with_priority(priority);
    if is_divisible {
        tx = tx.divisible(true);
    }

    state.add_transaction(tx);
    state
        .get_agent_mut(sender_id)
        .unwrap()
        .queue_outgoing(tx_id.to_string());

    state.log_event(Event::Arrival {
        tick,
        tx_id: tx_id.to_string(),
        sender_id: sender_id.to_string(),
        receiver_id: receiver_id.to_string(),
        amount,
        deadline_tick,
        priority,
        is_divisible,
    });
    Ok(())
}

fn log_scenario_event(
    state: &mut SimulationState,
    tick: usize,
    event_type: &str,
    details: &serde_json::Value,
) {
    state.log_event(Event::ScenarioEventExecuted {
        tick,
        event_type: event_type.to_string(),
        details: details.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrivals::{AmountDistribution, ArrivalConfig, PriorityDistribution};
    use crate::models::Agent;
    use std::collections::HashMap;

    fn handler_with(event: ScenarioEvent, tick: usize) -> ScenarioEventHandler {
        ScenarioEventHandler::new(vec![ScheduledEvent {
            event,
            schedule: EventSchedule::OneTime { tick },
        }])
    }

    fn arrival_config(rate: f64) -> ArrivalConfig {
        ArrivalConfig {
            rate_per_tick: rate,
            amount_distribution: AmountDistribution::Uniform {
                min: 1_000,
                max: 10_000,
            },
            counterparty_weights: HashMap::new(),
            deadline_range: (5, 15),
            priority_distribution: PriorityDistribution::Fixed { value: 5 },
            divisible: false,
        }
    }

    #[test]
    fn get_events_for_tick_filters_by_schedule() {
        let handler = handler_with(
            ScenarioEvent::DirectTransfer {
                from_agent: "A".into(),
                to_agent: "B".into(),
                amount: 100,
            },
            10,
        );
        assert_eq!(handler.get_events_for_tick(10).len(), 1);
        assert_eq!(handler.get_events_for_tick(11).len(), 0);
    }

    #[test]
    fn direct_transfer_moves_balance_and_logs() {
        let mut state = SimulationState::new(vec![
            Agent::new("A".into(), 1_000_000, 0),
            Agent::new("B".into(), 0, 0),
        ]);
        let mut arrivals = ArrivalGenerator::new(HashMap::new(), vec!["A".into(), "B".into()], 1000);
        let handler = handler_with(
            ScenarioEvent::DirectTransfer {
                from_agent: "A".into(),
                to_agent: "B".into(),
                amount: 250_000,
            },
            5,
        );
        handler.execute_tick_events(&mut state, &mut arrivals, 5).unwrap();

        assert_eq!(state.get_agent("A").unwrap().balance(), 750_000);
        assert_eq!(state.get_agent("B").unwrap().balance(), 250_000);
        assert_eq!(state.event_log().len(), 1);
    }

    #[test]
    fn collateral_adjustment_floors_at_zero() {
        let mut state = SimulationState::new(vec![Agent::new("A".into(), 0, 100)]);
        let mut arrivals = ArrivalGenerator::new(HashMap::new(), vec!["A".into()], 1000);
        let handler = handler_with(
            ScenarioEvent::CollateralAdjustment {
                agent: "A".into(),
                delta: -500,
            },
            1,
        );
        handler.execute_tick_events(&mut state, &mut arrivals, 1).unwrap();
        assert_eq!(state.get_agent("A").unwrap().credit_limit(), 0);
    }

    #[test]
    fn global_rate_change_scales_from_base() {
        let mut state = SimulationState::new(vec![Agent::new("A".into(), 0, 0)]);
        let mut configs = HashMap::new();
        configs.insert("A".to_string(), arrival_config(2.0));
        let mut arrivals = ArrivalGenerator::new(configs, vec!["A".into()], 1000);

        let handler = handler_with(ScenarioEvent::GlobalArrivalRateChange { multiplier: 1.5 }, 1);
        handler.execute_tick_events(&mut state, &mut arrivals, 1).unwrap();
        assert_eq!(arrivals.get_rate("A"), Some(3.0));
    }

    #[test]
    fn deadline_window_change_rejects_inverted_bounds() {
        let mut state = SimulationState::new(vec![Agent::new("A".into(), 0, 0)]);
        let mut configs = HashMap::new();
        configs.insert("A".to_string(), arrival_config(1.0));
        let mut arrivals = ArrivalGenerator::new(configs, vec!["A".into()], 1000);

        let handler = handler_with(
            ScenarioEvent::DeadlineWindowChange {
                agent: "A".into(),
                new_min: 20,
                new_max: 10,
            },
            1,
        );
        assert!(handler.execute_tick_events(&mut state, &mut arrivals, 1).is_err());
    }
}
