//! Agent Queue Index - Performance Optimization
//!
//! Provides O(1) lookup of Queue 2 (RTGS) transactions by agent ID.
//!
//! Without an index, finding all Queue 2 transactions for a specific agent
//! requires scanning the entire queue: O(Queue2_Size). Maintaining a
//! `HashMap<AgentID, Vec<TxID>>`, rebuilt once per tick after queue
//! modifications, turns per-agent lookups into O(1) hash lookups at the cost
//! of a single O(Queue2_Size) rebuild pass.

use std::collections::HashMap;

/// Cached metrics for an agent's Queue 2 transactions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentQueue2Metrics {
    pub count: usize,
    pub nearest_deadline: usize,
    pub total_value: i64,
}

/// Agent-indexed view of Queue 2 for fast per-agent lookups.
#[derive(Debug, Clone)]
pub struct AgentQueueIndex {
    by_agent: HashMap<String, Vec<String>>,
    cached_metrics: HashMap<String, AgentQueue2Metrics>,
}

impl AgentQueueIndex {
    pub fn new() -> Self {
        Self {
            by_agent: HashMap::new(),
            cached_metrics: HashMap::new(),
        }
    }

    /// Rebuild the index from the current Queue 2 contents: O(Queue2_Size).
    pub fn rebuild(
        &mut self,
        rtgs_queue: &[String],
        transactions: &std::collections::BTreeMap<String, crate::models::transaction::Transaction>,
    ) {
        self.by_agent.clear();
        self.cached_metrics.clear();

        for tx_id in rtgs_queue {
            if let Some(tx) = transactions.get(tx_id) {
                let agent_id = tx.sender_id().to_string();

                self.by_agent
                    .entry(agent_id.clone())
                    .or_insert_with(Vec::new)
                    .push(tx_id.clone());

                let metrics = self
                    .cached_metrics
                    .entry(agent_id)
                    .or_insert_with(|| AgentQueue2Metrics {
                        nearest_deadline: usize::MAX,
                        ..Default::default()
                    });

                metrics.count += 1;
                metrics.total_value += tx.remaining_amount();
                metrics.nearest_deadline = metrics.nearest_deadline.min(tx.deadline_tick());
            }
        }
    }

    pub fn get_agent_transactions(&self, agent_id: &str) -> &[String] {
        self.by_agent
            .get(agent_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn get_metrics(&self, agent_id: &str) -> AgentQueue2Metrics {
        self.cached_metrics
            .get(agent_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_agent.is_empty()
    }

    pub fn num_agents(&self) -> usize {
        self.by_agent.len()
    }
}

impl Default for AgentQueueIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::transaction::Transaction;
    use std::collections::BTreeMap;

    fn txns(entries: &[(&str, &str, &str, i64, usize)]) -> BTreeMap<String, Transaction> {
        entries
            .iter()
            .map(|(id, sender, receiver, amount, deadline)| {
                let tx = Transaction::new(
                    id.to_string(),
                    sender.to_string(),
                    receiver.to_string(),
                    *amount,
                    0,
                    *deadline,
                );
                (id.to_string(), tx)
            })
            .collect()
    }

    #[test]
    fn new_index_is_empty() {
        let index = AgentQueueIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.num_agents(), 0);
        assert_eq!(index.get_agent_transactions("BANK_A").len(), 0);
    }

    #[test]
    fn rebuild_with_empty_queue_stays_empty() {
        let mut index = AgentQueueIndex::new();
        index.rebuild(&[], &BTreeMap::new());
        assert!(index.is_empty());
    }

    #[test]
    fn rebuild_indexes_multiple_transactions_same_agent() {
        let transactions = txns(&[
            ("tx_1", "BANK_A", "BANK_B", 100_000, 50),
            ("tx_2", "BANK_A", "BANK_B", 200_000, 100),
            ("tx_3", "BANK_A", "BANK_B", 150_000, 75),
        ]);
        let queue = vec!["tx_1".to_string(), "tx_2".to_string(), "tx_3".to_string()];

        let mut index = AgentQueueIndex::new();
        index.rebuild(&queue, &transactions);

        let bank_a = index.get_agent_transactions("BANK_A");
        assert_eq!(bank_a.len(), 3);

        let metrics = index.get_metrics("BANK_A");
        assert_eq!(metrics.count, 3);
        assert_eq!(metrics.total_value, 450_000);
        assert_eq!(metrics.nearest_deadline, 50);
    }

    #[test]
    fn rebuild_separates_multiple_agents() {
        let transactions = txns(&[
            ("tx_1", "BANK_A", "BANK_B", 100_000, 100),
            ("tx_2", "BANK_B", "BANK_A", 200_000, 100),
            ("tx_3", "BANK_A", "BANK_B", 150_000, 100),
        ]);
        let queue = vec!["tx_1".to_string(), "tx_2".to_string(), "tx_3".to_string()];

        let mut index = AgentQueueIndex::new();
        index.rebuild(&queue, &transactions);

        assert_eq!(index.get_agent_transactions("BANK_A").len(), 2);
        assert_eq!(index.get_agent_transactions("BANK_B").len(), 1);
        assert_eq!(index.num_agents(), 2);
    }

    #[test]
    fn rebuild_clears_previous_index() {
        let transactions = txns(&[("tx_1", "BANK_A", "BANK_B", 100_000, 100)]);
        let mut index = AgentQueueIndex::new();
        index.rebuild(&["tx_1".to_string()], &transactions);
        assert_eq!(index.get_agent_transactions("BANK_A").len(), 1);

        index.rebuild(&[], &transactions);
        assert!(index.is_empty());
    }
}
