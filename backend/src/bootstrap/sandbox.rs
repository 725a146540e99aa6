//! Builds a 3-agent sandbox configuration from a [`BootstrapSample`] for
//! out-of-sample policy evaluation (§4.13).
//!
//! The sandbox isolates the target agent from the rest of the network:
//! `SOURCE` supplies whatever liquidity the resampled history says arrived,
//! `SINK` absorbs every outgoing payment, and both carry effectively
//! unlimited capacity so the target agent's own policy is the only thing
//! under test.

use crate::arrivals::ArrivalConfig;
use crate::bootstrap::sampler::BootstrapSample;
use crate::costs::CostRates;
use crate::orchestrator::{AgentConfig, OrchestratorConfig, PolicyConfig};
use crate::scenario::{EventSchedule, ScenarioEvent, ScheduledEvent};
use crate::settlement::LsmConfig;

/// Balance/credit-limit floor used for the two synthetic counterparties —
/// large enough that neither ever becomes a binding constraint.
pub const INFINITE_LIQUIDITY: i64 = 10_000_000_000;

pub const SOURCE_AGENT_ID: &str = "SOURCE";
pub const SINK_AGENT_ID: &str = "SINK";

/// Builds sandbox [`OrchestratorConfig`]s from bootstrap samples.
#[derive(Debug, Clone, Default)]
pub struct SandboxConfigBuilder;

impl SandboxConfigBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build a single-day sandbox config: `SOURCE`, the target agent
    /// (running `target_policy`), and `SINK`. The target's outgoing history
    /// replays as `CustomTransactionArrival` events against `SINK`; its
    /// settled incoming history replays as `DirectTransfer`s from `SOURCE`,
    /// scheduled at the remapped settlement tick.
    pub fn build_config(
        &self,
        sample: &BootstrapSample,
        target_policy: PolicyConfig,
        opening_balance: i64,
        credit_limit: i64,
        costs: Option<CostRates>,
    ) -> OrchestratorConfig {
        let mut scenario_events = Vec::with_capacity(sample.outgoing.len() + sample.incoming.len());

        for tx in &sample.outgoing {
            scenario_events.push(ScheduledEvent {
                event: ScenarioEvent::CustomTransactionArrival {
                    tx_id: tx.tx_id.clone(),
                    sender_id: sample.agent_id.clone(),
                    receiver_id: SINK_AGENT_ID.to_string(),
                    amount: tx.amount,
                    deadline_tick: tx.deadline_tick,
                    priority: tx.priority,
                    is_divisible: false,
                },
                schedule: EventSchedule::OneTime { tick: tx.arrival_tick },
            });
        }

        for tx in &sample.incoming {
            let Some(settlement_tick) = tx.settlement_tick else {
                continue;
            };
            scenario_events.push(ScheduledEvent {
                event: ScenarioEvent::DirectTransfer {
                    from_agent: SOURCE_AGENT_ID.to_string(),
                    to_agent: sample.agent_id.clone(),
                    amount: tx.amount,
                },
                schedule: EventSchedule::OneTime { tick: settlement_tick },
            });
        }

        let agents = vec![
            synthetic_agent(SOURCE_AGENT_ID, INFINITE_LIQUIDITY, 0),
            AgentConfig {
                id: sample.agent_id.clone(),
                opening_balance,
                credit_limit,
                collateral_capacity: 0,
                policy: target_policy,
                arrival_config: None,
            },
            synthetic_agent(SINK_AGENT_ID, 0, INFINITE_LIQUIDITY),
        ];

        OrchestratorConfig {
            ticks_per_day: sample.total_ticks.max(1),
            num_days: 1,
            rng_seed: sample.seed,
            agents,
            costs: costs.unwrap_or_default(),
            priority_escalation: None,
            lsm: LsmConfig::default(),
            lsm_interval_ticks: 1,
            scenario_events,
        }
    }
}

fn synthetic_agent(id: &str, opening_balance: i64, credit_limit: i64) -> AgentConfig {
    AgentConfig {
        id: id.to_string(),
        opening_balance,
        credit_limit,
        collateral_capacity: 0,
        policy: PolicyConfig::Fifo,
        arrival_config: None::<ArrivalConfig>,
    }
}
