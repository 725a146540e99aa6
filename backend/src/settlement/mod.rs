//! Settlement module (§4.7, §4.8): the RTGS engine that turns a released
//! Queue 2 payment into an atomic balance transfer, and the LSM passes
//! that net down Queue 2's outstanding gross flows before they're retried.
//!
//! # Critical invariants
//!
//! - **Atomicity**: debit and credit happen together, or neither does.
//! - **Balance conservation**: total system balance never changes.
//! - **Central settlement**: transfers happen at the central bank model,
//!   never bank-to-bank directly.

pub mod lsm;
pub mod rtgs;

pub use lsm::{run_bilateral_pass, run_cycle_pass, LsmConfig};
pub use rtgs::{process_queue, try_settle, try_settle_partial, QueueProcessingResult, SettlementError};
