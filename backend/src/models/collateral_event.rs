//! Collateral posting/withdrawal records
//!
//! Kept as a denormalized side-log of collateral actions (in addition to the
//! `CollateralPost`/`CollateralWithdraw` journal events) so callers that only
//! care about collateral history don't have to filter the full event log.

use serde::{Deserialize, Serialize};

/// Which side of a collateral adjustment this record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollateralAction {
    Post,
    Withdraw,
}

/// A single collateral posting or withdrawal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralEvent {
    pub agent_id: String,
    pub tick: usize,
    pub day: usize,
    pub action: CollateralAction,
    pub amount: i64,
    pub reason: String,
    pub balance_before: i64,
    pub posted_collateral_before: i64,
    pub posted_collateral_after: i64,
}
