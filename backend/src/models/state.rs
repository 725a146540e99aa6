//! Simulation State
//!
//! Holds everything the Orchestrator owns exclusively (§3 "Ownership"): the
//! agent map, both queues, the event journal, and the Queue 2 performance
//! index. Transactions live in a single owned map; queues hold only `TxId`
//! keys, never transaction clones (no back-pointers, no cyclic references).
//!
//! # Critical invariants
//!
//! 1. Balance conservation: sum of agent balances changes only via settlement
//!    or scenario-event direct transfers (INV-CONSERVATION).
//! 2. Transaction uniqueness: each transaction ID appears exactly once.
//! 3. Queue validity: every transaction ID in `rtgs_queue` and every agent's
//!    Queue 1 exists in `transactions`.

use crate::models::agent::Agent;
use crate::models::collateral_event::CollateralEvent;
use crate::models::event::{Event, EventLog};
use crate::models::queue_index::AgentQueueIndex;
use crate::models::transaction::Transaction;
use std::collections::BTreeMap;

/// Complete simulation state.
#[derive(Debug, Clone)]
pub struct SimulationState {
    agents: BTreeMap<String, Agent>,
    transactions: BTreeMap<String, Transaction>,
    /// Queue 2: central RTGS queue, transaction IDs awaiting settlement.
    rtgs_queue: Vec<String>,
    event_log: EventLog,
    pub collateral_events: Vec<CollateralEvent>,
    queue2_index: AgentQueueIndex,
}

impl SimulationState {
    pub fn new(agents: Vec<Agent>) -> Self {
        let agents_map = agents
            .into_iter()
            .map(|agent| (agent.id().to_string(), agent))
            .collect();

        Self {
            agents: agents_map,
            transactions: BTreeMap::new(),
            rtgs_queue: Vec::new(),
            event_log: EventLog::new(),
            collateral_events: Vec::new(),
            queue2_index: AgentQueueIndex::new(),
        }
    }

    /// Reconstruct state from its parts (checkpoint restoration). Validates
    /// that every queue reference points at a real transaction.
    pub fn from_parts(
        agents: BTreeMap<String, Agent>,
        transactions: BTreeMap<String, Transaction>,
        rtgs_queue: Vec<String>,
    ) -> Result<Self, String> {
        for tx_id in &rtgs_queue {
            if !transactions.contains_key(tx_id) {
                return Err(format!(
                    "RTGS queue contains invalid transaction ID: {tx_id}"
                ));
            }
        }
        for (agent_id, agent) in &agents {
            for tx_id in agent.outgoing_queue() {
                if !transactions.contains_key(tx_id) {
                    return Err(format!(
                        "Agent {agent_id} queue contains invalid transaction ID: {tx_id}"
                    ));
                }
            }
        }

        Ok(Self {
            agents,
            transactions,
            rtgs_queue,
            event_log: EventLog::new(),
            collateral_events: Vec::new(),
            queue2_index: AgentQueueIndex::new(),
        })
    }

    pub fn get_agent(&self, id: &str) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn get_agent_mut(&mut self, id: &str) -> Option<&mut Agent> {
        self.agents.get_mut(id)
    }

    /// All agent IDs, sorted for deterministic iteration (§4.5).
    pub fn get_all_agent_ids(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn get_transaction(&self, id: &str) -> Option<&Transaction> {
        self.transactions.get(id)
    }

    pub fn get_transaction_mut(&mut self, id: &str) -> Option<&mut Transaction> {
        self.transactions.get_mut(id)
    }

    /// Panics if `transaction`'s id already exists (duplicate transaction ids
    /// would break replay identity).
    pub fn add_transaction(&mut self, transaction: Transaction) {
        let id = transaction.id().to_string();
        assert!(
            !self.transactions.contains_key(&id),
            "Transaction ID {id} already exists"
        );
        self.transactions.insert(id, transaction);
    }

    pub fn queue_transaction(&mut self, transaction_id: String) {
        assert!(
            self.transactions.contains_key(&transaction_id),
            "Cannot queue non-existent transaction {transaction_id}"
        );
        self.rtgs_queue.push(transaction_id);
    }

    pub fn queue_size(&self) -> usize {
        self.rtgs_queue.len()
    }

    pub fn rtgs_queue(&self) -> &Vec<String> {
        &self.rtgs_queue
    }

    pub fn rtgs_queue_mut(&mut self) -> &mut Vec<String> {
        &mut self.rtgs_queue
    }

    pub fn agents(&self) -> &BTreeMap<String, Agent> {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut BTreeMap<String, Agent> {
        &mut self.agents
    }

    pub fn transactions(&self) -> &BTreeMap<String, Transaction> {
        &self.transactions
    }

    pub fn transactions_mut(&mut self) -> &mut BTreeMap<String, Transaction> {
        &mut self.transactions
    }

    pub fn num_agents(&self) -> usize {
        self.agents.len()
    }

    pub fn num_transactions(&self) -> usize {
        self.transactions.len()
    }

    /// Sum of all agent balances (for INV-CONSERVATION checks).
    pub fn total_balance(&self) -> i64 {
        self.agents.values().map(|agent| agent.balance()).sum()
    }

    pub fn queue_value(&self) -> i64 {
        self.rtgs_queue
            .iter()
            .filter_map(|tx_id| self.transactions.get(tx_id))
            .map(|tx| tx.remaining_amount())
            .sum()
    }

    // -- Queue 1 aggregate views -------------------------------------------

    pub fn total_internal_queue_size(&self) -> usize {
        self.agents.values().map(|agent| agent.queue1_size()).sum()
    }

    pub fn total_internal_queue_value(&self) -> i64 {
        self.agents
            .values()
            .flat_map(|agent| agent.outgoing_queue())
            .filter_map(|tx_id| self.transactions.get(tx_id))
            .map(|tx| tx.remaining_amount())
            .sum()
    }

    /// `(agent_id, tx_id)` pairs whose Queue 1 transaction is within
    /// `urgency_threshold` ticks of its deadline.
    pub fn get_urgent_transactions(
        &self,
        current_tick: usize,
        urgency_threshold: usize,
    ) -> Vec<(String, String)> {
        let mut urgent = Vec::new();
        for (agent_id, agent) in &self.agents {
            for tx_id in agent.outgoing_queue() {
                if let Some(tx) = self.transactions.get(tx_id) {
                    let ticks_to_deadline = tx.deadline_tick().saturating_sub(current_tick);
                    if ticks_to_deadline <= urgency_threshold {
                        urgent.push((agent_id.clone(), tx_id.clone()));
                    }
                }
            }
        }
        urgent
    }

    pub fn agents_with_queued_transactions(&self) -> Vec<String> {
        self.agents
            .iter()
            .filter(|(_, agent)| agent.queue1_size() > 0)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn agent_queue_value(&self, agent_id: &str) -> i64 {
        self.agents
            .get(agent_id)
            .map(|agent| {
                agent
                    .outgoing_queue()
                    .iter()
                    .filter_map(|tx_id| self.transactions.get(tx_id))
                    .map(|tx| tx.remaining_amount())
                    .sum()
            })
            .unwrap_or(0)
    }

    // -- Event log -----------------------------------------------------------

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn event_log_mut(&mut self) -> &mut EventLog {
        &mut self.event_log
    }

    pub fn log_event(&mut self, event: Event) {
        self.event_log.log(event);
    }

    // -- Scenario event support ----------------------------------------------

    /// Panics if `agent_id` is unknown; `new_limit` is floored at 0 by the
    /// agent itself (§4.11 `CollateralAdjustment`).
    pub fn set_credit_limit(&mut self, agent_id: &str, new_limit: i64) {
        match self.agents.get_mut(agent_id) {
            Some(agent) => agent.set_credit_limit(new_limit),
            None => panic!("Agent not found: {agent_id}"),
        }
    }

    // -- Queue 2 index ---------------------------------------------------------

    /// Must be called after any mutation of `rtgs_queue`.
    pub fn rebuild_queue2_index(&mut self) {
        self.queue2_index.rebuild(&self.rtgs_queue, &self.transactions);
    }

    pub fn queue2_index(&self) -> &AgentQueueIndex {
        &self.queue2_index
    }
}
