//! Per-agent event trace isolation for policy-optimizer prompts (§4.15.1,
//! INV-ISOLATION). An agent being optimized must never see a counterparty's
//! side of a transaction it isn't party to — `EventLog::events_for_agent`
//! already restricts the trace to events the agent participates in; this
//! module additionally strips counterparty-only detail out of the events
//! that remain (a bilateral offset's *other* leg, for instance).

use crate::models::event::Event;
use crate::models::EventLog;

/// How informative an event type is when building an LLM-facing trace.
/// Higher sorts first when a trace is truncated to `max_events`.
fn event_priority(event: &Event) -> i32 {
    match event {
        Event::PolicySplit { .. } | Event::PolicyHold { .. } | Event::PolicyReprioritize { .. } => 100,
        Event::DeadlinePenalty { .. } => 90,
        Event::CostAccrual { .. } => 80,
        Event::RtgsImmediateSettlement { .. }
        | Event::Queue2LiquidityRelease { .. }
        | Event::LsmBilateralOffset { .. }
        | Event::LsmCycleSettlement { .. } => 50,
        Event::Arrival { .. } => 30,
        _ => 10,
    }
}

/// Build the event trace an agent's policy-optimization prompt may see:
/// filtered to events the agent participates in, counterparty detail
/// stripped from the ones that remain, prioritized, truncated, and replayed
/// back in chronological order.
pub fn format_event_trace_for_agent(log: &EventLog, agent_id: &str, max_events: usize) -> String {
    let mut events: Vec<&Event> = log.events_for_agent(agent_id);
    if events.is_empty() {
        return format!("(No events for {agent_id})");
    }

    events.sort_by_key(|e| std::cmp::Reverse(event_priority(e)));
    events.truncate(max_events);
    events.sort_by_key(|e| e.tick());

    events
        .iter()
        .map(|e| format!("[tick {}] {}", e.tick(), format_event(e, agent_id)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a single event's detail line from `agent_id`'s point of view,
/// hiding whatever belongs to a counterparty.
fn format_event(event: &Event, agent_id: &str) -> String {
    match event {
        Event::LsmBilateralOffset {
            agent_a,
            agent_b,
            amount_a_to_b,
            amount_b_to_a,
            ..
        } => {
            let (own_amount, counterparty) = if agent_id == agent_a {
                (*amount_a_to_b, agent_b)
            } else {
                (*amount_b_to_a, agent_a)
            };
            format!(
                "{}: bilateral offset with {counterparty}, your payment ${:.2} settled",
                event.event_type(),
                own_amount as f64 / 100.0
            )
        }
        Event::LsmCycleSettlement {
            participants,
            total_value,
            ..
        } => format!(
            "{}: {} participants, total ${:.2}",
            event.event_type(),
            participants.len(),
            *total_value as f64 / 100.0
        ),
        Event::RtgsImmediateSettlement { tx_id, amount, .. }
        | Event::Queue2LiquidityRelease { tx_id, amount, .. } => {
            format!("{}: tx_id={tx_id}, amount=${:.2}", event.event_type(), *amount as f64 / 100.0)
        }
        Event::CostAccrual { bucket, amount, .. } => {
            format!("{}: bucket={bucket:?}, amount=${:.2}", event.event_type(), *amount as f64 / 100.0)
        }
        Event::DeadlinePenalty {
            tx_id,
            amount,
            ticks_overdue,
            ..
        } => format!(
            "{}: tx_id={tx_id}, amount=${:.2}, ticks_overdue={ticks_overdue}",
            event.event_type(),
            *amount as f64 / 100.0
        ),
        other => format!("{}", other.event_type()),
    }
}

/// Per-agent cost summary and representative trace handed to a policy
/// oracle. `sample_seed`/`sample_cost` are taken from the cheapest sample for
/// this agent; `mean_cost`/`cost_std` summarize the full sample set.
#[derive(Debug, Clone)]
pub struct AgentSimulationContext {
    pub agent_id: String,
    pub sample_seed: u64,
    pub sample_cost: i64,
    pub simulation_trace: String,
    pub mean_cost: i64,
    pub cost_std: i64,
}

/// One bootstrap-sample evaluation result feeding [`build_agent_context`].
pub struct SampleResult<'a> {
    pub seed: u64,
    pub cost: i64,
    pub log: &'a EventLog,
}

/// Build the per-agent context for an oracle prompt from a set of bootstrap
/// sample evaluations, using the cheapest sample's trace as the
/// representative example shown to the oracle.
///
/// # Panics
/// Panics if `results` is empty — callers must have at least one sample.
pub fn build_agent_context(
    agent_id: &str,
    results: &[SampleResult<'_>],
    max_trace_events: usize,
) -> AgentSimulationContext {
    assert!(!results.is_empty(), "results list cannot be empty");

    let costs: Vec<i64> = results.iter().map(|r| r.cost).collect();
    let mean_cost = costs.iter().sum::<i64>() / costs.len() as i64;
    let cost_std = if costs.len() > 1 {
        let mean_f = mean_cost as f64;
        let variance = costs.iter().map(|&c| (c as f64 - mean_f).powi(2)).sum::<f64>()
            / (costs.len() - 1) as f64;
        variance.sqrt() as i64
    } else {
        0
    };

    let best = results.iter().min_by_key(|r| r.cost).expect("non-empty checked above");

    AgentSimulationContext {
        agent_id: agent_id.to_string(),
        sample_seed: best.seed,
        sample_cost: best.cost,
        simulation_trace: format_event_trace_for_agent(best.log, agent_id, max_trace_events),
        mean_cost,
        cost_std,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with_bilateral() -> EventLog {
        let mut log = EventLog::new();
        log.log(Event::LsmBilateralOffset {
            tick: 3,
            agent_a: "BANK_A".into(),
            agent_b: "BANK_B".into(),
            amount_a_to_b: 10_000,
            amount_b_to_a: 7_000,
            tx_ids_a_to_b: vec!["tx1".into()],
            tx_ids_b_to_a: vec!["tx2".into()],
        });
        log
    }

    #[test]
    fn bilateral_offset_hides_counterparty_amount() {
        let log = log_with_bilateral();
        let trace_a = format_event_trace_for_agent(&log, "BANK_A", 50);
        assert!(trace_a.contains("100.00"));
        assert!(!trace_a.contains("70.00"));

        let trace_b = format_event_trace_for_agent(&log, "BANK_B", 50);
        assert!(trace_b.contains("70.00"));
        assert!(!trace_b.contains("100.00"));
    }

    #[test]
    fn unrelated_agent_sees_no_events() {
        let log = log_with_bilateral();
        let trace = format_event_trace_for_agent(&log, "BANK_C", 50);
        assert_eq!(trace, "(No events for BANK_C)");
    }

    #[test]
    fn truncation_keeps_highest_priority_events_in_chronological_order() {
        let mut log = EventLog::new();
        log.log(Event::Arrival {
            tick: 1,
            tx_id: "tx1".into(),
            sender_id: "BANK_A".into(),
            receiver_id: "BANK_B".into(),
            amount: 1_000,
            deadline_tick: 10,
            priority: 5,
            is_divisible: false,
        });
        log.log(Event::DeadlinePenalty {
            tick: 5,
            tx_id: "tx1".into(),
            agent_id: "BANK_A".into(),
            amount: 500,
            ticks_overdue: 2,
        });
        let trace = format_event_trace_for_agent(&log, "BANK_A", 1);
        assert!(trace.contains("DeadlinePenalty") || trace.contains("deadline_penalty"));
        assert_eq!(trace.lines().count(), 1);
    }

    #[test]
    fn build_agent_context_uses_cheapest_sample() {
        let cheap_log = EventLog::new();
        let expensive_log = EventLog::new();
        let results = vec![
            SampleResult { seed: 1, cost: 500, log: &cheap_log },
            SampleResult { seed: 2, cost: 900, log: &expensive_log },
        ];
        let ctx = build_agent_context("BANK_A", &results, 50);
        assert_eq!(ctx.sample_seed, 1);
        assert_eq!(ctx.sample_cost, 500);
        assert_eq!(ctx.mean_cost, 700);
    }
}
