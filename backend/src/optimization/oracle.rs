//! Pluggable policy proposal source for the optimizer loop (§4.16).
//!
//! `PolicyOracle` is the seam between the optimizer and whatever actually
//! proposes new decision trees — a scripted sequence in tests, an LLM in
//! production. The optimizer never depends on a concrete oracle; it only
//! ever calls [`PolicyOracle::propose`].

use std::time::Duration;

use thiserror::Error;

/// Context handed to an oracle describing the optimization run's rules.
/// Analogous to an LLM "system prompt", but the field is a plain string so
/// non-LLM oracles can match on it too.
#[derive(Debug, Clone)]
pub struct SystemPrompt(pub String);

/// Per-call context: the agent being optimized and its current cost
/// evidence, pre-rendered (e.g. via [`crate::optimization::isolation`]).
#[derive(Debug, Clone)]
pub struct UserPrompt(pub String);

/// Decision-tree JSON text as returned by an oracle, not yet parsed or
/// validated — validation is the optimizer's job, not the oracle's.
#[derive(Debug, Clone)]
pub struct PolicyTreeJson(pub String);

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle declined to propose a policy: {0}")]
    Declined(String),
    #[error("oracle timed out after {0:?}")]
    Timeout(Duration),
    #[error("oracle transport error: {0}")]
    Transport(String),
}

/// Proposes a new candidate policy given the current optimization context.
/// Implementations are expected to block until a proposal (or a definitive
/// error) is available; the optimizer treats every call as synchronous.
pub trait PolicyOracle {
    fn propose(&mut self, system: &SystemPrompt, user: &UserPrompt) -> Result<PolicyTreeJson, OracleError>;
}

/// Deterministic test double: replays a fixed sequence of JSON proposals,
/// one per call, then errors once the sequence is exhausted.
#[derive(Debug, Clone)]
pub struct ScriptedOracle {
    proposals: Vec<String>,
    next: usize,
}

impl ScriptedOracle {
    pub fn new(proposals: Vec<String>) -> Self {
        Self { proposals, next: 0 }
    }
}

impl PolicyOracle for ScriptedOracle {
    fn propose(&mut self, _system: &SystemPrompt, _user: &UserPrompt) -> Result<PolicyTreeJson, OracleError> {
        let Some(json) = self.proposals.get(self.next) else {
            return Err(OracleError::Declined("scripted oracle exhausted".to_string()));
        };
        self.next += 1;
        Ok(PolicyTreeJson(json.clone()))
    }
}

/// Always declines. Exercises the optimizer's failure-tolerance path
/// (a stuck oracle must not prevent the loop from terminating).
#[derive(Debug, Clone, Default)]
pub struct NoOpOracle;

impl PolicyOracle for NoOpOracle {
    fn propose(&mut self, _system: &SystemPrompt, _user: &UserPrompt) -> Result<PolicyTreeJson, OracleError> {
        Err(OracleError::Declined("no-op oracle never proposes".to_string()))
    }
}
