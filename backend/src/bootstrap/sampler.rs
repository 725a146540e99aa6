//! Bootstrap resampling of an agent's transaction history onto a fresh
//! timeline, for out-of-sample policy evaluation (§4.12).

use crate::bootstrap::history::{AgentHistory, TransactionRecord};
use crate::rng::RngManager;

/// A single resampled record, ready to be replayed as a
/// `CustomTransactionArrival` / `DirectTransfer` scenario event.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledTransaction {
    pub tx_id: String,
    pub source_tx_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub amount: i64,
    pub priority: u8,
    pub arrival_tick: usize,
    pub deadline_tick: usize,
    pub settlement_tick: Option<usize>,
}

/// One bootstrap sample: a resampled outgoing and incoming history for the
/// target agent, remapped onto `[0, total_ticks)`.
#[derive(Debug, Clone)]
pub struct BootstrapSample {
    pub agent_id: String,
    pub sample_idx: usize,
    pub seed: u64,
    pub total_ticks: usize,
    pub outgoing: Vec<ResampledTransaction>,
    /// Only settled incoming records are resampled (§4.12.2).
    pub incoming: Vec<ResampledTransaction>,
}

/// Draws `num_samples` independent bootstrap samples for `agent_id` from
/// `history`. Same `master_seed` + same `history` ⇒ byte-identical samples.
pub fn generate_samples(
    master_seed: u64,
    agent_id: &str,
    history: &AgentHistory,
    total_ticks: usize,
    num_samples: usize,
) -> Vec<BootstrapSample> {
    (0..num_samples)
        .map(|sample_idx| {
            generate_one_sample(master_seed, agent_id, history, total_ticks, sample_idx)
        })
        .collect()
}

fn generate_one_sample(
    master_seed: u64,
    agent_id: &str,
    history: &AgentHistory,
    total_ticks: usize,
    sample_idx: usize,
) -> BootstrapSample {
    let stream_name = format!("bootstrap:{agent_id}:{sample_idx}");
    let mut rng = RngManager::from_master(master_seed, &stream_name);

    let settled_incoming: Vec<&TransactionRecord> = history
        .incoming
        .iter()
        .filter(|r| r.settlement_offset.is_some())
        .collect();

    let outgoing = resample_records(
        &history.outgoing,
        total_ticks,
        &mut rng,
        sample_idx,
        "out",
    );
    let incoming = resample_records_ref(
        &settled_incoming,
        total_ticks,
        &mut rng,
        sample_idx,
        "in",
    );

    BootstrapSample {
        agent_id: agent_id.to_string(),
        sample_idx,
        seed: rng.get_state(),
        total_ticks,
        outgoing,
        incoming,
    }
}

fn resample_records(
    source: &[TransactionRecord],
    total_ticks: usize,
    rng: &mut RngManager,
    sample_idx: usize,
    suffix: &str,
) -> Vec<ResampledTransaction> {
    if source.is_empty() || total_ticks == 0 {
        return Vec::new();
    }
    (0..source.len())
        .map(|draw_idx| {
            let source_idx = rng.range(0, source.len() as i64) as usize;
            remap(&source[source_idx], total_ticks, rng, sample_idx, suffix, draw_idx)
        })
        .collect()
}

fn resample_records_ref(
    source: &[&TransactionRecord],
    total_ticks: usize,
    rng: &mut RngManager,
    sample_idx: usize,
    suffix: &str,
) -> Vec<ResampledTransaction> {
    if source.is_empty() || total_ticks == 0 {
        return Vec::new();
    }
    (0..source.len())
        .map(|draw_idx| {
            let source_idx = rng.range(0, source.len() as i64) as usize;
            remap(source[source_idx], total_ticks, rng, sample_idx, suffix, draw_idx)
        })
        .collect()
}

fn remap(
    record: &TransactionRecord,
    total_ticks: usize,
    rng: &mut RngManager,
    sample_idx: usize,
    suffix: &str,
    draw_idx: usize,
) -> ResampledTransaction {
    let new_arrival = rng.range(0, total_ticks as i64) as usize;
    let deadline_tick = (new_arrival + record.deadline_offset).min(total_ticks);
    let settlement_tick = record
        .settlement_offset
        .map(|offset| (new_arrival + offset).min(total_ticks));

    ResampledTransaction {
        tx_id: format!("{}_s{sample_idx}_{suffix}{draw_idx}", record.tx_id),
        source_tx_id: record.tx_id.clone(),
        sender_id: record.sender_id.clone(),
        receiver_id: record.receiver_id.clone(),
        amount: record.amount,
        priority: record.priority,
        arrival_tick: new_arrival,
        deadline_tick,
        settlement_tick,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tx_id: &str, sender: &str, receiver: &str, amount: i64) -> TransactionRecord {
        TransactionRecord {
            tx_id: tx_id.to_string(),
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            amount,
            priority: 5,
            original_arrival_tick: 0,
            deadline_offset: 10,
            settlement_offset: Some(2),
        }
    }

    #[test]
    fn same_seed_and_history_produce_identical_samples() {
        let history = AgentHistory {
            outgoing: vec![record("tx_1", "A", "B", 1000), record("tx_2", "A", "C", 2000)],
            incoming: vec![],
        };

        let s1 = generate_samples(42, "A", &history, 100, 3);
        let s2 = generate_samples(42, "A", &history, 100, 3);

        for (a, b) in s1.iter().zip(s2.iter()) {
            assert_eq!(a.outgoing, b.outgoing);
            assert_eq!(a.incoming, b.incoming);
        }
    }

    #[test]
    fn resampled_count_matches_source_count() {
        let history = AgentHistory {
            outgoing: vec![
                record("tx_1", "A", "B", 1000),
                record("tx_2", "A", "C", 2000),
                record("tx_3", "A", "B", 500),
            ],
            incoming: vec![],
        };
        let samples = generate_samples(1, "A", &history, 50, 1);
        assert_eq!(samples[0].outgoing.len(), 3);
    }

    #[test]
    fn deadlines_capped_at_total_ticks() {
        let mut rec = record("tx_1", "A", "B", 1000);
        rec.deadline_offset = 1000;
        let history = AgentHistory {
            outgoing: vec![rec],
            incoming: vec![],
        };
        let samples = generate_samples(7, "A", &history, 20, 5);
        for sample in &samples {
            for tx in &sample.outgoing {
                assert!(tx.deadline_tick <= 20);
            }
        }
    }

    #[test]
    fn unsettled_incoming_excluded() {
        let mut unsettled = record("tx_9", "B", "A", 5000);
        unsettled.settlement_offset = None;
        let history = AgentHistory {
            outgoing: vec![],
            incoming: vec![unsettled],
        };
        let samples = generate_samples(3, "A", &history, 30, 1);
        assert!(samples[0].incoming.is_empty());
    }
}
