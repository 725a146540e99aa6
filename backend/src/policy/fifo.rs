//! FIFO cash manager policy: release every queued payment in arrival order,
//! with no regard to liquidity, deadlines, or urgency. Used as the baseline
//! `Fifo` member of `PolicyConfig` and in tests.

use super::{CashManagerPolicy, ReleaseDecision};
use crate::{Agent, SimulationState};

pub struct FifoPolicy;

impl FifoPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FifoPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl CashManagerPolicy for FifoPolicy {
    fn evaluate_queue(
        &mut self,
        agent: &Agent,
        _state: &SimulationState,
        _tick: usize,
        _ticks_per_day: usize,
    ) -> Vec<ReleaseDecision> {
        agent
            .outgoing_queue()
            .iter()
            .map(|tx_id| ReleaseDecision::Release { tx_id: tx_id.clone() })
            .collect()
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
