//! Cash Manager Policy module.
//!
//! Each agent's Queue 1 is only ever moved into Queue 2 by its cash manager
//! policy (§4.4): the policy tree evaluator decides, per queued payment,
//! whether to release, hold, split, or reprioritize it. Evaluation is pure
//! and stateless — a policy's `evaluate_queue` must not mutate anything.
//!
//! The only policy implementation shipped is the JSON decision tree
//! (`tree` module); `fifo`/`deadline` exist as small native baselines used
//! in tests and as the `Fifo`/`Deadline` members of `PolicyConfig`.

use crate::{Agent, SimulationState};

pub mod deadline;
pub mod fifo;
pub mod tree;

pub use deadline::DeadlinePolicy;
pub use fifo::FifoPolicy;

/// Decision about a single Queue 1 payment (§4.4's closed set).
#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseDecision {
    /// Move the payment from Queue 1 into Queue 2 as-is.
    Release { tx_id: String },
    /// Leave the payment in Queue 1 for this tick.
    Hold {
        tx_id: String,
        reason: Option<String>,
    },
    /// Split the payment into `n` children before release; only valid for
    /// divisible payments with `n >= 2`.
    Split { tx_id: String, n: usize },
    /// Change the payment's stored priority without releasing it.
    Reprioritize { tx_id: String, new_priority: u8 },
}

/// A cash manager policy: decides, each tick, what to do with every payment
/// currently sitting in one agent's Queue 1.
pub trait CashManagerPolicy {
    fn evaluate_queue(
        &mut self,
        agent: &Agent,
        state: &SimulationState,
        tick: usize,
        ticks_per_day: usize,
    ) -> Vec<ReleaseDecision>;

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_decision_variants_carry_tx_id() {
        let d = ReleaseDecision::Release {
            tx_id: "tx_1".into(),
        };
        assert!(matches!(d, ReleaseDecision::Release { tx_id } if tx_id == "tx_1"));

        let d = ReleaseDecision::Reprioritize {
            tx_id: "tx_2".into(),
            new_priority: 9,
        };
        assert!(matches!(
            d,
            ReleaseDecision::Reprioritize { new_priority: 9, .. }
        ));
    }
}
