//! Cost accrual (C9)
//!
//! Five integer-cent cost buckets per agent, each computed with truncating
//! integer division against a basis-points rate (out of 10_000). No floating
//! point is used anywhere in this module — rates are fixed-point basis
//! points rather than `f64` multipliers, so cost accrual stays exact.

use serde::{Deserialize, Serialize};

/// Basis-point denominator used by every rate in [`CostRates`].
pub const BPS_DENOMINATOR: i64 = 10_000;

/// Per-simulation cost configuration (§6.2 `costs` config block).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostRates {
    /// Charged each tick an agent's balance is negative.
    pub overdraft_bps_per_tick: i64,
    /// Charged each tick collateral is posted, against the posted amount.
    pub collateral_bps_per_tick: i64,
    /// Charged each tick a payment waits in Queue 1 or Queue 2, against its remaining amount.
    pub delay_per_tick_per_cent: i64,
    /// Flat component of the deadline penalty, charged once the deadline passes.
    pub deadline_base_penalty: i64,
    /// Per-tick component of the deadline penalty, charged every tick the transaction stays overdue.
    pub deadline_penalty_per_tick: i64,
    /// Charged once per `Split` action, per additional child produced.
    pub split_fee: i64,
    /// Flat charge applied to every transaction still pending at end-of-day, before it is dropped.
    pub eod_penalty: i64,
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            overdraft_bps_per_tick: 10,
            collateral_bps_per_tick: 2,
            delay_per_tick_per_cent: 1,
            deadline_base_penalty: 5_000,
            deadline_penalty_per_tick: 500,
            split_fee: 1_000,
            eod_penalty: 10_000,
        }
    }
}

impl CostRates {
    /// `|balance| * overdraft_bps_per_tick / 10_000`, truncating.
    pub fn overdraft_cost(&self, balance: i64) -> i64 {
        if balance >= 0 {
            return 0;
        }
        balance.unsigned_abs() as i64 * self.overdraft_bps_per_tick / BPS_DENOMINATOR
    }

    /// `collateral_posted * collateral_bps_per_tick / 10_000`, truncating.
    pub fn collateral_cost(&self, collateral_posted: i64) -> i64 {
        collateral_posted * self.collateral_bps_per_tick / BPS_DENOMINATOR
    }

    /// `remaining_amount * delay_per_tick_per_cent / 10_000`, truncating.
    pub fn delay_cost(&self, remaining_amount: i64) -> i64 {
        remaining_amount * self.delay_per_tick_per_cent / BPS_DENOMINATOR
    }

    /// `base_penalty + per_tick * ticks_overdue`.
    pub fn deadline_penalty(&self, ticks_overdue: i64) -> i64 {
        self.deadline_base_penalty + self.deadline_penalty_per_tick * ticks_overdue
    }

    /// `split_fee * (num_splits - 1)`, charged once per split node.
    pub fn split_friction_cost(&self, num_splits: usize) -> i64 {
        self.split_fee * (num_splits as i64 - 1)
    }
}

/// Accumulated per-agent cost totals, split into the five buckets named in
/// spec §4.9 plus the flat end-of-day penalty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostAccumulator {
    pub liquidity: i64,
    pub delay: i64,
    pub collateral: i64,
    pub deadline_penalty: i64,
    pub split_friction: i64,
    pub eod_penalty: i64,
}

impl CostAccumulator {
    pub fn total(&self) -> i64 {
        self.liquidity
            + self.delay
            + self.collateral
            + self.deadline_penalty
            + self.split_friction
            + self.eod_penalty
    }

    pub fn add_liquidity(&mut self, amount: i64) {
        self.liquidity += amount;
    }
    pub fn add_delay(&mut self, amount: i64) {
        self.delay += amount;
    }
    pub fn add_collateral(&mut self, amount: i64) {
        self.collateral += amount;
    }
    pub fn add_deadline_penalty(&mut self, amount: i64) {
        self.deadline_penalty += amount;
    }
    pub fn add_split_friction(&mut self, amount: i64) {
        self.split_friction += amount;
    }
    pub fn add_eod_penalty(&mut self, amount: i64) {
        self.eod_penalty += amount;
    }
}

/// Breakdown used by the bootstrap evaluator's `EvaluationResult` (§3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub delay: i64,
    pub overdraft: i64,
    pub deadline_penalty: i64,
    pub eod_penalty: i64,
}

impl From<CostAccumulator> for CostBreakdown {
    fn from(acc: CostAccumulator) -> Self {
        Self {
            delay: acc.delay,
            overdraft: acc.liquidity,
            deadline_penalty: acc.deadline_penalty,
            eod_penalty: acc.eod_penalty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overdraft_only_applies_to_negative_balance() {
        let rates = CostRates::default();
        assert_eq!(rates.overdraft_cost(1_000_000), 0);
        assert_eq!(rates.overdraft_cost(-1_000_000), 1_000_000 * 10 / 10_000);
    }

    #[test]
    fn split_friction_is_zero_for_single_child() {
        let rates = CostRates::default();
        assert_eq!(rates.split_friction_cost(1), 0);
        assert_eq!(rates.split_friction_cost(3), rates.split_fee * 2);
    }

    #[test]
    fn accumulator_total_sums_all_buckets() {
        let mut acc = CostAccumulator::default();
        acc.add_liquidity(10);
        acc.add_delay(20);
        acc.add_collateral(5);
        acc.add_deadline_penalty(100);
        acc.add_split_friction(1000);
        acc.add_eod_penalty(50);
        assert_eq!(acc.total(), 10 + 20 + 5 + 100 + 1000 + 50);
    }

    #[test]
    fn truncating_division_matches_spec_formula() {
        let rates = CostRates {
            overdraft_bps_per_tick: 1,
            ..CostRates::default()
        };
        // 999 * 1 / 10_000 truncates to 0
        assert_eq!(rates.overdraft_cost(-999), 0);
    }
}
