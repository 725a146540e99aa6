//! Per-agent policy optimization loop (§4.15, §4.16).
//!
//! For one agent at a time: evaluate the current policy's bootstrap cost,
//! ask an oracle for a candidate replacement, validate and evaluate it the
//! same way, accept it if it's a real improvement, and feed every cost
//! observation into a [`BootstrapConvergenceDetector`] until it declares
//! convergence or the oracle budget runs out. Candidate evaluation runs the
//! sandbox simulation for every bootstrap sample in parallel via `rayon` —
//! each sample's `Orchestrator` is independent, so the reduction to a mean
//! cost is order-independent by construction.

use rayon::prelude::*;

use crate::bootstrap::{generate_samples, AgentHistory, BootstrapSample, SandboxConfigBuilder};
use crate::costs::CostRates;
use crate::models::EventLog;
use crate::optimization::convergence::BootstrapConvergenceDetector;
use crate::optimization::isolation::{build_agent_context, SampleResult};
use crate::optimization::oracle::{PolicyOracle, PolicyTreeJson, SystemPrompt, UserPrompt};
use crate::orchestrator::{Orchestrator, PolicyConfig, SimulationError};
use crate::policy::tree::TreePolicy;

/// Parameters shared across every agent's optimization run.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    pub num_bootstrap_samples: usize,
    pub opening_balance: i64,
    pub credit_limit: i64,
    pub costs: Option<CostRates>,
    /// Upper bound on oracle calls per agent; bounds the loop even if the
    /// oracle never runs out of proposals and convergence never triggers.
    pub max_oracle_attempts: usize,
    /// Events shown per sample trace in the oracle's user prompt.
    pub max_trace_events: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            num_bootstrap_samples: 20,
            opening_balance: 1_000_000,
            credit_limit: 500_000,
            costs: None,
            max_oracle_attempts: 25,
            max_trace_events: 50,
        }
    }
}

/// One evaluated bootstrap sample: the agent's accrued cost and the event
/// trace from that sandbox run.
struct SampleEval {
    seed: u64,
    cost: i64,
    log: EventLog,
}

/// Outcome of optimizing a single agent.
#[derive(Debug, Clone)]
pub struct AgentOptimizationResult {
    pub agent_id: String,
    /// The best policy found, if any candidate ever beat the baseline.
    /// `None` means the starting policy was never improved on.
    pub accepted_policy: Option<PolicyConfig>,
    pub baseline_cost: f64,
    pub final_cost: f64,
    pub oracle_calls: usize,
    pub converged: bool,
    pub convergence_reason: String,
}

/// Drives the oracle-in-the-loop optimization process for one agent.
pub struct PolicyOptimizer<O: PolicyOracle> {
    oracle: O,
    config: OptimizerConfig,
}

impl<O: PolicyOracle> PolicyOptimizer<O> {
    pub fn new(oracle: O, config: OptimizerConfig) -> Self {
        Self { oracle, config }
    }

    /// Run the optimization loop for one agent, starting from
    /// `current_policy` and using `history` (collected from a prior full
    /// simulation run) to generate bootstrap samples.
    pub fn optimize_agent(
        &mut self,
        agent_id: &str,
        history: &AgentHistory,
        total_ticks: usize,
        master_seed: u64,
        current_policy: PolicyConfig,
    ) -> AgentOptimizationResult {
        let samples = generate_samples(
            master_seed,
            agent_id,
            history,
            total_ticks,
            self.config.num_bootstrap_samples,
        );

        let mut detector = BootstrapConvergenceDetector::with_defaults();

        let baseline_evals = self.evaluate_policy(&samples, &current_policy);
        let baseline_cost = mean_cost(&baseline_evals);
        detector.record_metric(baseline_cost);

        let mut best_cost = baseline_cost;
        let mut accepted: Option<PolicyConfig> = None;
        let mut oracle_calls = 0;

        while !baseline_evals.is_empty() && !detector.is_converged() && oracle_calls < self.config.max_oracle_attempts {
            oracle_calls += 1;

            let system = SystemPrompt(format!(
                "Propose an improved cash management policy for agent {agent_id}."
            ));
            let context = build_agent_context(agent_id, &as_sample_results(&baseline_evals), self.config.max_trace_events);
            let user = UserPrompt(format!(
                "Current best cost: {:.2}. Sample seed {}: cost {:.2}.\n{}",
                best_cost, context.sample_seed, context.sample_cost, context.simulation_trace
            ));

            let candidate = match self.oracle.propose(&system, &user) {
                Ok(candidate) => candidate,
                Err(e) => {
                    tracing::warn!(agent_id = %agent_id, attempt = oracle_calls, error = %e, "oracle declined to propose");
                    continue;
                }
            };

            let Some(candidate_policy) = validate_candidate(&candidate) else {
                tracing::warn!(agent_id = %agent_id, attempt = oracle_calls, "oracle proposal failed decision-tree validation");
                continue;
            };

            let candidate_evals = self.evaluate_policy(&samples, &candidate_policy);
            if candidate_evals.is_empty() {
                continue;
            }
            let candidate_cost = mean_cost(&candidate_evals);

            if detector.should_accept_improvement(candidate_cost) {
                best_cost = candidate_cost;
                accepted = Some(candidate_policy);
            }

            detector.record_metric(candidate_cost);
        }

        AgentOptimizationResult {
            agent_id: agent_id.to_string(),
            accepted_policy: accepted,
            baseline_cost,
            final_cost: best_cost,
            oracle_calls,
            converged: detector.is_converged(),
            convergence_reason: detector.convergence_reason(),
        }
    }

    fn evaluate_policy(&self, samples: &[BootstrapSample], policy: &PolicyConfig) -> Vec<SampleEval> {
        samples
            .par_iter()
            .filter_map(|sample| run_sandbox(sample, policy, &self.config).ok())
            .collect()
    }
}

fn mean_cost(evals: &[SampleEval]) -> f64 {
    if evals.is_empty() {
        return f64::INFINITY;
    }
    evals.iter().map(|e| e.cost as f64).sum::<f64>() / evals.len() as f64
}

fn as_sample_results(evals: &[SampleEval]) -> Vec<SampleResult<'_>> {
    evals
        .iter()
        .map(|e| SampleResult {
            seed: e.seed,
            cost: e.cost,
            log: &e.log,
        })
        .collect()
}

/// Parse and validate an oracle's proposal against the decision-tree schema
/// (§6.4). Invalid proposals are silently rejected — the loop just tries
/// again with the next oracle call, it never aborts the optimization.
fn validate_candidate(candidate: &PolicyTreeJson) -> Option<PolicyConfig> {
    TreePolicy::from_json(&candidate.0).ok()?;
    Some(PolicyConfig::FromJson { json: candidate.0.clone() })
}

fn run_sandbox(
    sample: &BootstrapSample,
    policy: &PolicyConfig,
    opts: &OptimizerConfig,
) -> Result<SampleEval, SimulationError> {
    let config = SandboxConfigBuilder::new().build_config(
        sample,
        policy.clone(),
        opts.opening_balance,
        opts.credit_limit,
        opts.costs.clone(),
    );
    let total_ticks = config.ticks_per_day * config.num_days;
    let mut orchestrator = Orchestrator::new(config)?;
    for _ in 0..total_ticks {
        orchestrator.tick();
    }
    let cost = orchestrator
        .state()
        .get_agent(&sample.agent_id)
        .map(|a| a.costs().total())
        .unwrap_or(0);
    Ok(SampleEval {
        seed: sample.seed,
        cost,
        log: orchestrator.state().event_log().clone(),
    })
}
