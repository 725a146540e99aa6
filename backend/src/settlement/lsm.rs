//! Liquidity-Saving Mechanism passes (§4.8): bilateral offsetting and
//! multilateral cycle settlement over Queue 2. Both passes only ever
//! settle transactions that are already sitting in the central queue;
//! neither touches Queue 1.
//!
//! Both passes net to a liquidity-free settlement: the agents on a netted
//! pair or cycle see their balance move by the settled amounts on each
//! edge, and by construction those deltas sum to zero across the
//! pair/cycle, so no agent needs spare liquidity to participate.

use crate::models::event::Event;
use crate::models::state::SimulationState;
use crate::models::transaction::TxId;
use std::collections::BTreeMap;

/// Toggles for the two LSM passes and a cap on cycle search effort.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct LsmConfig {
    pub enable_bilateral: bool,
    pub enable_cycles: bool,
    /// Longest cycle (in participating agents) the DFS search will follow.
    pub max_cycle_length: usize,
    /// Stop searching for further cycles once this many have settled this tick.
    pub max_cycles_per_tick: usize,
}

impl Default for LsmConfig {
    fn default() -> Self {
        Self {
            enable_bilateral: true,
            enable_cycles: true,
            max_cycle_length: 4,
            max_cycles_per_tick: 10,
        }
    }
}

/// One candidate (tx_id, settleable amount) taken off the front of a
/// FIFO-ordered edge, used while assembling a netted amount.
fn select_fifo_up_to(
    state: &SimulationState,
    tx_ids: &[TxId],
    target: i64,
) -> (Vec<(TxId, i64)>, i64) {
    let mut selected = Vec::new();
    let mut achieved = 0i64;

    for tx_id in tx_ids {
        if achieved >= target {
            break;
        }
        let Some(tx) = state.get_transaction(tx_id) else { continue };
        let remaining = tx.remaining_amount();
        let room = target - achieved;

        if remaining <= room {
            selected.push((tx_id.clone(), remaining));
            achieved += remaining;
        } else if tx.is_divisible() {
            selected.push((tx_id.clone(), room));
            achieved += room;
        }
        // Indivisible transaction that would overshoot: skip, leave queued.
    }

    (selected, achieved)
}

/// Trims an already-selected FIFO batch down to `desired`, dropping or
/// shrinking entries from the tail. Used to bring both sides of a
/// bilateral offset to the same settled amount.
fn trim_to(state: &SimulationState, mut selected: Vec<(TxId, i64)>, desired: i64) -> Vec<(TxId, i64)> {
    let mut total: i64 = selected.iter().map(|(_, amt)| amt).sum();
    while total > desired {
        let Some((tx_id, amt)) = selected.pop() else { break };
        let overshoot = total - desired;
        if amt > overshoot {
            let is_divisible = state.get_transaction(&tx_id).map(|t| t.is_divisible()).unwrap_or(false);
            if is_divisible {
                selected.push((tx_id, amt - overshoot));
                total -= overshoot;
            } else {
                total -= amt;
            }
        } else {
            total -= amt;
        }
    }
    selected
}

/// Applies a netted batch of settlements with zero net balance impact:
/// each tx's sender is debited and its receiver credited directly,
/// bypassing the liquidity check (the whole point of netting is that no
/// spare liquidity is required, since the batch's deltas cancel out).
fn apply_settlements(state: &mut SimulationState, tick: usize, batch: &[(TxId, i64)]) {
    for (tx_id, amount) in batch {
        let tx = state.get_transaction(tx_id).expect("selected transaction must exist");
        let sender_id = tx.sender_id().to_string();
        let receiver_id = tx.receiver_id().to_string();

        state.get_agent_mut(&sender_id).expect("sender must exist").adjust_balance(-amount);
        state.get_agent_mut(&receiver_id).expect("receiver must exist").adjust_balance(*amount);
        state
            .get_transaction_mut(tx_id)
            .expect("transaction must exist")
            .settle(*amount, tick)
            .expect("amount was bounded by remaining_amount");
    }
}

fn remove_settled_from_queue(state: &mut SimulationState) {
    let settled_ids: Vec<String> = state
        .transactions()
        .iter()
        .filter(|(_, tx)| tx.is_settled())
        .map(|(id, _)| id.clone())
        .collect();
    state.rtgs_queue_mut().retain(|id| !settled_ids.contains(id));
}

/// Groups Queue 2 by directed `(sender, receiver)` edge, preserving the
/// queue's existing order within each edge (arrival order, per §4.6).
fn group_by_edge(state: &SimulationState) -> BTreeMap<(String, String), Vec<TxId>> {
    let mut edges: BTreeMap<(String, String), Vec<TxId>> = BTreeMap::new();
    for tx_id in state.rtgs_queue() {
        if let Some(tx) = state.get_transaction(tx_id) {
            edges
                .entry((tx.sender_id().to_string(), tx.receiver_id().to_string()))
                .or_default()
                .push(tx_id.clone());
        }
    }
    edges
}

/// Bilateral offsetting pass (§4.8 pass 1): for every lexicographically
/// ordered pair `(A, B)` with outstanding flow in both directions, nets
/// `min(sum A->B, sum B->A)` and settles that amount FIFO on each side,
/// emitting one [`Event::LsmBilateralOffset`] per netted pair.
pub fn run_bilateral_pass(state: &mut SimulationState, tick: usize) -> Vec<Event> {
    let edges = group_by_edge(state);
    let mut agent_pairs: Vec<(String, String)> = Vec::new();
    for (a, b) in edges.keys() {
        if a < b && edges.contains_key(&(b.clone(), a.clone())) {
            agent_pairs.push((a.clone(), b.clone()));
        }
    }

    let mut events = Vec::new();
    for (agent_a, agent_b) in agent_pairs {
        let a_to_b = &edges[&(agent_a.clone(), agent_b.clone())];
        let b_to_a = &edges[&(agent_b.clone(), agent_a.clone())];

        let sum_a_to_b: i64 = a_to_b.iter().filter_map(|id| state.get_transaction(id)).map(|t| t.remaining_amount()).sum();
        let sum_b_to_a: i64 = b_to_a.iter().filter_map(|id| state.get_transaction(id)).map(|t| t.remaining_amount()).sum();
        let net_amount = sum_a_to_b.min(sum_b_to_a);
        if net_amount <= 0 {
            continue;
        }

        let (sel_a_to_b, achieved_a) = select_fifo_up_to(state, a_to_b, net_amount);
        let (sel_b_to_a, achieved_b) = select_fifo_up_to(state, b_to_a, net_amount);
        let final_amount = achieved_a.min(achieved_b);
        if final_amount <= 0 {
            continue;
        }
        let sel_a_to_b = trim_to(state, sel_a_to_b, final_amount);
        let sel_b_to_a = trim_to(state, sel_b_to_a, final_amount);

        let tx_ids_a_to_b: Vec<String> = sel_a_to_b.iter().map(|(id, _)| id.clone()).collect();
        let tx_ids_b_to_a: Vec<String> = sel_b_to_a.iter().map(|(id, _)| id.clone()).collect();

        apply_settlements(state, tick, &sel_a_to_b);
        apply_settlements(state, tick, &sel_b_to_a);

        events.push(Event::LsmBilateralOffset {
            tick,
            agent_a: agent_a.clone(),
            agent_b: agent_b.clone(),
            amount_a_to_b: final_amount,
            amount_b_to_a: final_amount,
            tx_ids_a_to_b,
            tx_ids_b_to_a,
        });
    }

    remove_settled_from_queue(state);
    events
}

/// Finds the lexicographically smallest simple cycle (by agent id
/// sequence) up to `max_len` participants via depth-first search over the
/// directed edge graph, visiting neighbours in sorted order so the first
/// cycle found is the lexicographically smallest.
fn find_lexicographic_cycle(
    edges: &BTreeMap<(String, String), Vec<TxId>>,
    max_len: usize,
) -> Option<Vec<String>> {
    let mut out_neighbors: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (a, b) in edges.keys() {
        out_neighbors.entry(a.as_str()).or_default().push(b.as_str());
    }
    for neighbors in out_neighbors.values_mut() {
        neighbors.sort();
    }

    let mut starts: Vec<&str> = edges.keys().map(|(a, _)| a.as_str()).collect();
    starts.sort();
    starts.dedup();

    for start in starts {
        let mut path = vec![start];
        if let Some(cycle) = dfs_cycle(start, start, &out_neighbors, &mut path, max_len) {
            return Some(cycle.into_iter().map(String::from).collect());
        }
    }
    None
}

fn dfs_cycle<'a>(
    start: &'a str,
    current: &'a str,
    out_neighbors: &BTreeMap<&'a str, Vec<&'a str>>,
    path: &mut Vec<&'a str>,
    max_len: usize,
) -> Option<Vec<&'a str>> {
    if path.len() > max_len {
        return None;
    }
    for &next in out_neighbors.get(current).map(|v| v.as_slice()).unwrap_or(&[]) {
        if next == start && path.len() >= 2 {
            return Some(path.clone());
        }
        if path.len() < max_len && !path.contains(&next) {
            path.push(next);
            if let Some(cycle) = dfs_cycle(start, next, out_neighbors, path, max_len) {
                return Some(cycle);
            }
            path.pop();
        }
    }
    None
}

/// Multilateral cycle pass (§4.8 pass 2): repeatedly finds the
/// lexicographically smallest remaining cycle, settles the minimum edge
/// flow around it FIFO on each edge, and emits one
/// [`Event::LsmCycleSettlement`] per cycle, until no cycle remains or
/// `max_cycles_per_tick` is hit.
pub fn run_cycle_pass(state: &mut SimulationState, tick: usize, config: &LsmConfig) -> Vec<Event> {
    let mut events = Vec::new();

    for _ in 0..config.max_cycles_per_tick {
        let edges = group_by_edge(state);
        let Some(cycle_agents) = find_lexicographic_cycle(&edges, config.max_cycle_length) else {
            break;
        };

        let mut closed = cycle_agents.clone();
        closed.push(cycle_agents[0].clone());
        let mut cycle_edges = Vec::new();
        for window in closed.windows(2) {
            cycle_edges.push((window[0].clone(), window[1].clone()));
        }

        let min_flow = cycle_edges
            .iter()
            .filter_map(|(a, b)| edges.get(&(a.clone(), b.clone())))
            .map(|ids| ids.iter().filter_map(|id| state.get_transaction(id)).map(|t| t.remaining_amount()).sum::<i64>())
            .min()
            .unwrap_or(0);

        if min_flow <= 0 {
            break;
        }

        let mut all_tx_ids = Vec::new();
        let mut total_value = 0i64;
        for (a, b) in &cycle_edges {
            let tx_ids = edges.get(&(a.clone(), b.clone())).cloned().unwrap_or_default();
            let (selected, achieved) = select_fifo_up_to(state, &tx_ids, min_flow);
            let selected = trim_to(state, selected, min_flow.min(achieved));
            total_value += selected.iter().map(|(_, amt)| amt).sum::<i64>();
            all_tx_ids.extend(selected.iter().map(|(id, _)| id.clone()));
            apply_settlements(state, tick, &selected);
        }

        events.push(Event::LsmCycleSettlement {
            tick,
            participants: cycle_agents.clone(),
            total_value,
            tx_ids: all_tx_ids,
        });
    }

    remove_settled_from_queue(state);
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Agent, Transaction};

    fn setup(agents: &[(&str, i64, i64)]) -> SimulationState {
        SimulationState::new(
            agents
                .iter()
                .map(|(id, balance, credit)| Agent::new(id.to_string(), *balance, *credit))
                .collect(),
        )
    }

    fn queue(state: &mut SimulationState, tx: Transaction) {
        state.add_transaction(tx.clone());
        state.queue_transaction(tx.id().to_string());
    }

    #[test]
    fn bilateral_pass_nets_unequal_flows() {
        let mut state = setup(&[("A", 0, 0), ("B", 0, 0)]);
        queue(
            &mut state,
            Transaction::new("tx_ab".into(), "A".into(), "B".into(), 500_000, 0, 100).divisible(true),
        );
        queue(&mut state, Transaction::new("tx_ba".into(), "B".into(), "A".into(), 300_000, 0, 100));

        let events = run_bilateral_pass(&mut state, 5);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::LsmBilateralOffset { amount_a_to_b: 300_000, .. }));

        assert!(state.get_transaction("tx_ba").unwrap().is_settled());
        assert_eq!(state.get_transaction("tx_ab").unwrap().remaining_amount(), 200_000);
        // Netting is liquidity-free: both agents end back where they started.
        assert_eq!(state.get_agent("A").unwrap().balance(), 0);
        assert_eq!(state.get_agent("B").unwrap().balance(), 0);
    }

    #[test]
    fn bilateral_pass_skips_pairs_with_one_way_flow() {
        let mut state = setup(&[("A", 0, 0), ("B", 0, 0)]);
        queue(&mut state, Transaction::new("tx_ab".into(), "A".into(), "B".into(), 500_000, 0, 100));

        let events = run_bilateral_pass(&mut state, 5);
        assert!(events.is_empty());
        assert_eq!(state.rtgs_queue().len(), 1);
    }

    #[test]
    fn cycle_pass_settles_three_way_cycle() {
        let mut state = setup(&[("A", 0, 0), ("B", 0, 0), ("C", 0, 0)]);
        queue(&mut state, Transaction::new("tx_ab".into(), "A".into(), "B".into(), 500_000, 0, 100));
        queue(&mut state, Transaction::new("tx_bc".into(), "B".into(), "C".into(), 500_000, 0, 100));
        queue(&mut state, Transaction::new("tx_ca".into(), "C".into(), "A".into(), 500_000, 0, 100));

        let config = LsmConfig::default();
        let events = run_cycle_pass(&mut state, 5, &config);

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::LsmCycleSettlement { total_value: 1_500_000, .. }));
        assert!(state.get_transaction("tx_ab").unwrap().is_settled());
        assert!(state.get_transaction("tx_bc").unwrap().is_settled());
        assert!(state.get_transaction("tx_ca").unwrap().is_settled());
        assert_eq!(state.get_agent("A").unwrap().balance(), 0);
    }

    #[test]
    fn cycle_pass_finds_nothing_without_a_cycle() {
        let mut state = setup(&[("A", 0, 0), ("B", 0, 0)]);
        queue(&mut state, Transaction::new("tx_ab".into(), "A".into(), "B".into(), 500_000, 0, 100));

        let config = LsmConfig::default();
        let events = run_cycle_pass(&mut state, 5, &config);
        assert!(events.is_empty());
    }
}
