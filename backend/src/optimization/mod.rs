//! Policy optimizer: convergence detection, agent-isolated context building,
//! the pluggable oracle seam, and the loop that ties them together (§4.14,
//! §4.15, §4.16).

pub mod convergence;
pub mod isolation;
pub mod optimizer;
pub mod oracle;

pub use convergence::{
    mann_kendall_test, BootstrapConvergenceDetector, ConvergenceDiagnostics, MannKendallResult,
    SimpleConvergenceDetector,
};
pub use isolation::{build_agent_context, format_event_trace_for_agent, AgentSimulationContext, SampleResult};
pub use optimizer::{AgentOptimizationResult, OptimizerConfig, PolicyOptimizer};
pub use oracle::{NoOpOracle, OracleError, PolicyOracle, PolicyTreeJson, ScriptedOracle, SystemPrompt, UserPrompt};
