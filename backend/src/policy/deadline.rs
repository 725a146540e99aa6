//! Deadline-aware cash manager policy: release payments once they are
//! within `urgency_threshold` ticks of their deadline (or past it), hold
//! everything else. There is no "drop" action in the closed decision set
//! (§4.4) — an overdue payment is released anyway so it can settle and
//! stop accruing delay cost; the deadline-penalty bucket (§4.9) still
//! applies once it crosses the line.

use super::{CashManagerPolicy, ReleaseDecision};
use crate::{Agent, SimulationState};

pub struct DeadlinePolicy {
    urgency_threshold: usize,
}

impl DeadlinePolicy {
    pub fn new(urgency_threshold: usize) -> Self {
        Self { urgency_threshold }
    }
}

impl Default for DeadlinePolicy {
    fn default() -> Self {
        Self::new(5)
    }
}

impl CashManagerPolicy for DeadlinePolicy {
    fn evaluate_queue(
        &mut self,
        agent: &Agent,
        state: &SimulationState,
        tick: usize,
        _ticks_per_day: usize,
    ) -> Vec<ReleaseDecision> {
        let mut decisions = Vec::new();

        for tx_id in agent.outgoing_queue() {
            let Some(tx) = state.get_transaction(tx_id) else {
                continue;
            };
            let deadline = tx.deadline_tick();
            if deadline <= tick || deadline - tick <= self.urgency_threshold {
                decisions.push(ReleaseDecision::Release { tx_id: tx_id.clone() });
            } else {
                decisions.push(ReleaseDecision::Hold {
                    tx_id: tx_id.clone(),
                    reason: Some(format!("{} ticks to deadline", deadline - tick)),
                });
            }
        }

        decisions
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Transaction;

    fn queue_tx(state: &mut SimulationState, agent_id: &str, tx: Transaction) {
        let tx_id = tx.id().to_string();
        state.add_transaction(tx);
        state.get_agent_mut(agent_id).unwrap().queue_outgoing(tx_id);
    }

    #[test]
    fn releases_urgent_transaction() {
        let mut policy = DeadlinePolicy::new(5);
        let agent = Agent::new("BANK_A".to_string(), 1_000_000, 0);
        let mut state = SimulationState::new(vec![agent.clone()]);

        queue_tx(
            &mut state,
            "BANK_A",
            Transaction::new("tx_1".into(), "BANK_A".into(), "BANK_B".into(), 100_000, 0, 10),
        );

        let agent = state.get_agent("BANK_A").unwrap();
        let decisions = policy.evaluate_queue(agent, &state, 8, 10);

        assert_eq!(decisions.len(), 1);
        assert!(matches!(decisions[0], ReleaseDecision::Release { .. }));
    }

    #[test]
    fn holds_non_urgent_transaction() {
        let mut policy = DeadlinePolicy::new(5);
        let agent = Agent::new("BANK_A".to_string(), 1_000_000, 0);
        let mut state = SimulationState::new(vec![agent.clone()]);

        queue_tx(
            &mut state,
            "BANK_A",
            Transaction::new("tx_1".into(), "BANK_A".into(), "BANK_B".into(), 100_000, 0, 50),
        );

        let agent = state.get_agent("BANK_A").unwrap();
        let decisions = policy.evaluate_queue(agent, &state, 8, 10);

        assert_eq!(decisions.len(), 1);
        assert!(matches!(decisions[0], ReleaseDecision::Hold { .. }));
    }

    #[test]
    fn releases_transaction_past_deadline() {
        let mut policy = DeadlinePolicy::new(5);
        let agent = Agent::new("BANK_A".to_string(), 1_000_000, 0);
        let mut state = SimulationState::new(vec![agent.clone()]);

        queue_tx(
            &mut state,
            "BANK_A",
            Transaction::new("tx_1".into(), "BANK_A".into(), "BANK_B".into(), 100_000, 0, 5),
        );

        let agent = state.get_agent("BANK_A").unwrap();
        let decisions = policy.evaluate_queue(agent, &state, 10, 10);

        assert_eq!(decisions.len(), 1);
        assert!(matches!(decisions[0], ReleaseDecision::Release { .. }));
    }

    #[test]
    fn mixed_urgencies_split_between_release_and_hold() {
        let mut policy = DeadlinePolicy::new(5);
        let agent = Agent::new("BANK_A".to_string(), 1_000_000, 0);
        let mut state = SimulationState::new(vec![agent.clone()]);

        queue_tx(
            &mut state,
            "BANK_A",
            Transaction::new("tx_urgent".into(), "BANK_A".into(), "BANK_B".into(), 100_000, 0, 10),
        );
        queue_tx(
            &mut state,
            "BANK_A",
            Transaction::new("tx_later".into(), "BANK_A".into(), "BANK_B".into(), 200_000, 0, 50),
        );
        queue_tx(
            &mut state,
            "BANK_A",
            Transaction::new("tx_expired".into(), "BANK_A".into(), "BANK_B".into(), 300_000, 0, 5),
        );

        let agent = state.get_agent("BANK_A").unwrap();
        let decisions = policy.evaluate_queue(agent, &state, 8, 10);

        assert_eq!(decisions.len(), 3);
        let releases = decisions
            .iter()
            .filter(|d| matches!(d, ReleaseDecision::Release { .. }))
            .count();
        let holds = decisions
            .iter()
            .filter(|d| matches!(d, ReleaseDecision::Hold { .. }))
            .count();
        assert_eq!(releases, 2);
        assert_eq!(holds, 1);
    }
}
