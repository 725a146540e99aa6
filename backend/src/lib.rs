//! RTGS payment simulation kernel.
//!
//! A deterministic, discrete-tick real-time gross settlement simulator:
//! per-agent liquidity policies queue transactions, a central RTGS queue
//! settles on a priority/FIFO basis, and a liquidity-saving mechanism nets
//! bilateral and multilateral exposures before they ever need full cash
//! cover. A bootstrap-driven policy optimizer closes the loop by replaying
//! historical scenarios to tune each agent's policy tree.
//!
//! # Architecture
//!
//! - **core**: Time management and initialization
//! - **models**: Domain types (Agent, Transaction, State, Event)
//! - **arrivals**: Deterministic transaction arrival generation
//! - **scenario**: Scheduled scenario events (liquidity shocks, rate changes)
//! - **policy**: Cash management policy trees and evaluation
//! - **settlement**: Settlement engines (RTGS Queue 2, LSM)
//! - **costs**: Integer-cents cost accrual
//! - **orchestrator**: Main simulation tick loop
//! - **bootstrap**: Historical replay sampling and sandbox construction
//! - **optimization**: Convergence detection and the policy optimizer loop
//! - **rng**: Deterministic random number generation
//!
//! # Critical invariants
//!
//! 1. All money values are i64 cents; no floating point reaches a balance.
//! 2. All randomness is deterministic (seeded RNG, named sub-streams).
//! 3. Every tick's behavior is a pure function of state and seed (replay).

pub mod arrivals;
pub mod bootstrap;
pub mod core;
pub mod costs;
pub mod models;
pub mod optimization;
pub mod orchestrator;
pub mod policy;
pub mod rng;
pub mod scenario;
pub mod settlement;

pub use core::time::TimeManager;
pub use costs::{CostAccumulator, CostBreakdown, CostRates};
pub use models::{
    agent::{Agent, AgentError},
    state::SimulationState,
    transaction::{Transaction, TransactionError, TransactionStatus, TxId},
    Event, EventLog,
};
pub use orchestrator::Orchestrator;
pub use rng::RngManager;
pub use settlement::{try_settle, try_settle_partial, SettlementError};
