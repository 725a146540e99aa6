//! Collects per-agent transaction history from a completed simulation's
//! event journal, in the shape the bootstrap sampler (§4.12) resamples from.

use crate::models::{Event, EventLog};

/// One transaction as seen from a single agent's perspective, with offsets
/// relative to its own arrival tick so it can be remapped onto a new
/// timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub tx_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub amount: i64,
    pub priority: u8,
    pub original_arrival_tick: usize,
    pub deadline_offset: usize,
    /// Ticks from arrival to settlement, or `None` if never settled.
    pub settlement_offset: Option<usize>,
}

/// Outgoing and incoming transaction history for one agent.
#[derive(Debug, Clone, Default)]
pub struct AgentHistory {
    pub outgoing: Vec<TransactionRecord>,
    pub incoming: Vec<TransactionRecord>,
}

/// Build `agent_id`'s history from a completed simulation's event log.
///
/// Arrivals establish each record's base fields; settlement events
/// (`RtgsImmediateSettlement`, `Queue2LiquidityRelease`, `LsmBilateralOffset`,
/// `LsmCycleSettlement`) populate `settlement_offset` for any `tx_id` they
/// mention as the earliest settlement tick seen for it.
pub fn collect_agent_history(log: &EventLog, agent_id: &str) -> AgentHistory {
    let mut records: std::collections::HashMap<String, TransactionRecord> =
        std::collections::HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for event in log.events() {
        if let Event::Arrival {
            tick,
            tx_id,
            sender_id,
            receiver_id,
            amount,
            deadline_tick,
            priority,
            ..
        } = event
        {
            if sender_id != agent_id && receiver_id != agent_id {
                continue;
            }
            let record = TransactionRecord {
                tx_id: tx_id.clone(),
                sender_id: sender_id.clone(),
                receiver_id: receiver_id.clone(),
                amount: *amount,
                priority: *priority,
                original_arrival_tick: *tick,
                deadline_offset: deadline_tick.saturating_sub(*tick),
                settlement_offset: None,
            };
            order.push(tx_id.clone());
            records.insert(tx_id.clone(), record);
        }
    }

    for event in log.events() {
        let (settlement_tick, tx_ids): (usize, Vec<&str>) = match event {
            Event::RtgsImmediateSettlement { tick, tx_id, .. } => (*tick, vec![tx_id.as_str()]),
            Event::Queue2LiquidityRelease { tick, tx_id, .. } => (*tick, vec![tx_id.as_str()]),
            Event::LsmBilateralOffset {
                tick,
                tx_ids_a_to_b,
                tx_ids_b_to_a,
                ..
            } => {
                let mut ids: Vec<&str> = tx_ids_a_to_b.iter().map(String::as_str).collect();
                ids.extend(tx_ids_b_to_a.iter().map(String::as_str));
                (*tick, ids)
            }
            Event::LsmCycleSettlement { tick, tx_ids, .. } => {
                (*tick, tx_ids.iter().map(String::as_str).collect())
            }
            _ => continue,
        };

        for tx_id in tx_ids {
            if let Some(record) = records.get_mut(tx_id) {
                let offset = settlement_tick.saturating_sub(record.original_arrival_tick);
                record.settlement_offset = Some(match record.settlement_offset {
                    Some(existing) => existing.min(offset),
                    None => offset,
                });
            }
        }
    }

    let mut history = AgentHistory::default();
    for tx_id in order {
        let record = records.remove(&tx_id).expect("record just inserted");
        if record.sender_id == agent_id {
            history.outgoing.push(record);
        } else {
            history.incoming.push(record);
        }
    }
    history
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrival(tick: usize, tx_id: &str, sender: &str, receiver: &str, amount: i64) -> Event {
        Event::Arrival {
            tick,
            tx_id: tx_id.to_string(),
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            amount,
            deadline_tick: tick + 10,
            priority: 5,
            is_divisible: false,
        }
    }

    #[test]
    fn splits_outgoing_and_incoming() {
        let mut log = EventLog::new();
        log.log(arrival(0, "tx_1", "A", "B", 1000));
        log.log(arrival(1, "tx_2", "B", "A", 2000));

        let history = collect_agent_history(&log, "A");
        assert_eq!(history.outgoing.len(), 1);
        assert_eq!(history.outgoing[0].tx_id, "tx_1");
        assert_eq!(history.incoming.len(), 1);
        assert_eq!(history.incoming[0].tx_id, "tx_2");
    }

    #[test]
    fn settlement_offset_populated_from_earliest_event() {
        let mut log = EventLog::new();
        log.log(arrival(0, "tx_1", "A", "B", 1000));
        log.log(Event::RtgsImmediateSettlement {
            tick: 3,
            tx_id: "tx_1".into(),
            sender_id: "A".into(),
            receiver_id: "B".into(),
            amount: 1000,
        });

        let history = collect_agent_history(&log, "A");
        assert_eq!(history.outgoing[0].settlement_offset, Some(3));
    }

    #[test]
    fn unsettled_record_has_no_offset() {
        let mut log = EventLog::new();
        log.log(arrival(0, "tx_1", "A", "B", 1000));
        let history = collect_agent_history(&log, "A");
        assert_eq!(history.outgoing[0].settlement_offset, None);
    }
}
