//! Orchestrator / tick loop (C10, §4.10): the only component that mutates
//! `SimulationState` directly, driving the fixed ten-phase pipeline across
//! every other subsystem each tick. See `engine.rs` for the full
//! implementation.

pub mod engine;

pub use engine::{
    AgentConfig, EscalationCurve, Orchestrator, OrchestratorConfig, PolicyConfig,
    PriorityEscalationConfig, SimulationError, SubmitError, TickResult,
};
