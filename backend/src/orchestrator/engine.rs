//! Main simulation tick loop (C10, §4.10).
//!
//! `Orchestrator` owns every piece of mutable state (agents, transactions,
//! both queues, the event log, the RNG, the clock) and is the only thing
//! that mutates `SimulationState` directly — every other module is a pure
//! function of `(state, tick)` or smaller. Each call to [`Orchestrator::tick`]
//! runs the fixed ten-phase pipeline:
//!
//! 1. scenario events
//! 2. arrival generation
//! 3. Queue 1 policy evaluation
//! 4. immediate settlement of released payments
//! 5. priority escalation (Queue 2 re-sort)
//! 6. Queue 2 scan
//! 7. LSM pass (bilateral + cycle netting)
//! 8. deadline checks
//! 9. cost accrual
//! 10. end-of-day handling
//!
//! The phase order is fixed and never reordered or made configurable —
//! replay identity (INV-REPLAY) depends on it.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::arrivals::{ArrivalConfig, ArrivalGenerator};
use crate::core::time::TimeManager;
use crate::costs::CostRates;
use crate::models::{CostBucket, Event, HoldReasonEvent};
use crate::policy::tree::TreePolicy;
use crate::policy::{CashManagerPolicy, DeadlinePolicy, FifoPolicy, ReleaseDecision};
use crate::rng::RngManager;
use crate::scenario::{ScenarioEventHandler, ScheduledEvent};
use crate::settlement::{run_bilateral_pass, run_cycle_pass, LsmConfig};
use crate::{Agent, SimulationState, Transaction};

/// Per-agent configuration (§6.2 `AgentConfig`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub opening_balance: i64,
    pub credit_limit: i64,
    pub collateral_capacity: i64,
    pub policy: PolicyConfig,
    pub arrival_config: Option<ArrivalConfig>,
}

/// Closed set of native cash manager policies, plus an escape hatch to a
/// JSON decision tree (§6.2 `PolicySpec`). There is no native liquidity-aware
/// or splitting policy distinct from the tree evaluator — see `DESIGN.md`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PolicyConfig {
    Fifo,
    Deadline { urgency_threshold: usize },
    FromJson { json: String },
}

impl PolicyConfig {
    fn build(&self) -> Result<Box<dyn CashManagerPolicy + Send>, SimulationError> {
        match self {
            PolicyConfig::Fifo => Ok(Box::new(FifoPolicy::new())),
            PolicyConfig::Deadline { urgency_threshold } => {
                Ok(Box::new(DeadlinePolicy::new(*urgency_threshold)))
            }
            PolicyConfig::FromJson { json } => TreePolicy::from_json(json)
                .map(|p| Box::new(p) as Box<dyn CashManagerPolicy + Send>)
                .map_err(|e| SimulationError::InvalidConfig(format!("policy tree: {e}"))),
        }
    }
}

/// Shape of the priority-escalation curve (§4.6, §6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationCurve {
    Linear,
    Exponential,
}

/// Reversible, per-tick priority boost for payments nearing their deadline
/// (§4.6). Never mutates `Transaction::priority` — only used to compute an
/// `effective_priority` for Queue 2 ordering, and to emit `PriorityEscalated`
/// whenever that effective priority changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityEscalationConfig {
    pub enabled: bool,
    pub curve: EscalationCurve,
    pub start_escalating_at_ticks: usize,
    pub max_boost: u8,
}

impl PriorityEscalationConfig {
    /// Boost in `[0, max_boost]`, ramping up as `ticks_to_deadline` falls
    /// below `start_escalating_at_ticks`. The exact curve shape was an open
    /// question (spec §9); see `DESIGN.md` for the choice made here.
    fn boost_for(&self, ticks_to_deadline: i64) -> u8 {
        if !self.enabled || self.start_escalating_at_ticks == 0 {
            return 0;
        }
        if ticks_to_deadline >= self.start_escalating_at_ticks as i64 {
            return 0;
        }
        let urgency = (self.start_escalating_at_ticks as i64 - ticks_to_deadline).max(0) as f64;
        let progress = (urgency / self.start_escalating_at_ticks as f64).clamp(0.0, 1.0);
        let boost = match self.curve {
            EscalationCurve::Linear => self.max_boost as f64 * progress,
            EscalationCurve::Exponential => self.max_boost as f64 * (2f64.powf(progress) - 1.0),
        };
        boost.round().clamp(0.0, self.max_boost as f64) as u8
    }
}

/// Top-level simulation configuration (§6.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub ticks_per_day: usize,
    pub num_days: usize,
    pub rng_seed: u64,
    pub agents: Vec<AgentConfig>,
    pub costs: CostRates,
    pub priority_escalation: Option<PriorityEscalationConfig>,
    pub lsm: LsmConfig,
    /// Run the LSM pass every `lsm_interval_ticks` ticks (§4.8: "a
    /// configurable schedule, e.g. every k ticks"). `1` runs it every tick.
    pub lsm_interval_ticks: usize,
    pub scenario_events: Vec<ScheduledEvent>,
}

/// Configuration errors, rejected at [`Orchestrator::new`] (§7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimulationError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors from [`Orchestrator::submit_transaction`] (§7 "submission errors").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("unknown agent: {0}")]
    UnknownAgent(String),
    #[error("amount must be positive")]
    NonPositiveAmount,
    #[error("deadline_tick {deadline_tick} is before current tick {current_tick}")]
    DeadlineInPast { deadline_tick: usize, current_tick: usize },
}

/// Summary of one `tick()` call (§6.1 `TickSummary`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickResult {
    pub tick: usize,
    pub day: usize,
    pub new_arrivals: usize,
    pub settlements: usize,
    pub lsm_releases: usize,
    pub dropped: usize,
    pub tick_cost_total: i64,
}

/// Owns and drives the whole simulation (§3 "Ownership", §9 "orchestrator-
/// owned state" — no process-wide singletons).
pub struct Orchestrator {
    state: SimulationState,
    time: TimeManager,
    arrivals: ArrivalGenerator,
    arrival_rngs: HashMap<String, RngManager>,
    policies: HashMap<String, Box<dyn CashManagerPolicy + Send>>,
    scenario_handler: ScenarioEventHandler,
    costs: CostRates,
    priority_escalation: Option<PriorityEscalationConfig>,
    lsm_config: LsmConfig,
    lsm_interval_ticks: usize,
    next_submit_id: usize,
    overdue_seen: HashSet<String>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Result<Self, SimulationError> {
        validate_config(&config)?;

        let agents: Vec<Agent> = config
            .agents
            .iter()
            .map(|c| {
                Agent::new(c.id.clone(), c.opening_balance, c.credit_limit)
                    .with_collateral_capacity(c.collateral_capacity)
            })
            .collect();
        let all_agent_ids: Vec<String> = agents.iter().map(|a| a.id().to_string()).collect();

        let mut policies = HashMap::new();
        let mut arrival_configs = HashMap::new();
        for agent_cfg in &config.agents {
            policies.insert(agent_cfg.id.clone(), agent_cfg.policy.build()?);
            if let Some(ac) = &agent_cfg.arrival_config {
                arrival_configs.insert(agent_cfg.id.clone(), ac.clone());
            }
        }

        let episode_end_tick = config.ticks_per_day * config.num_days;
        let arrivals = ArrivalGenerator::new(arrival_configs, all_agent_ids.clone(), episode_end_tick);

        let arrival_rngs = all_agent_ids
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    RngManager::from_master(config.rng_seed, &format!("arrivals:{id}")),
                )
            })
            .collect();

        let scenario_handler = ScenarioEventHandler::new(config.scenario_events.clone());

        Ok(Self {
            state: SimulationState::new(agents),
            time: TimeManager::new(config.ticks_per_day),
            arrivals,
            arrival_rngs,
            policies,
            scenario_handler,
            costs: config.costs,
            priority_escalation: config.priority_escalation,
            lsm_config: config.lsm,
            lsm_interval_ticks: config.lsm_interval_ticks.max(1),
            next_submit_id: 0,
            overdue_seen: HashSet::new(),
        })
    }

    // -- Accessors (§6.1 Simulator API) ------------------------------------

    pub fn current_tick(&self) -> usize {
        self.time.current_tick()
    }

    pub fn current_day(&self) -> usize {
        self.time.current_day()
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn get_agent_ids(&self) -> Vec<String> {
        self.state.get_all_agent_ids()
    }

    pub fn get_agent_balance(&self, agent_id: &str) -> Option<i64> {
        self.state.get_agent(agent_id).map(|a| a.balance())
    }

    pub fn get_transaction(&self, tx_id: &str) -> Option<&Transaction> {
        self.state.get_transaction(tx_id)
    }

    pub fn get_queue1_size(&self, agent_id: &str) -> Option<usize> {
        self.state.get_agent(agent_id).map(|a| a.queue1_size())
    }

    pub fn get_queue2_size(&self) -> usize {
        self.state.queue_size()
    }

    pub fn events_at_tick(&self, tick: usize) -> Vec<&Event> {
        self.state.event_log().events_at_tick(tick)
    }

    pub fn all_events(&self) -> &[Event] {
        self.state.event_log().events()
    }

    /// Submit a payment directly (bypassing arrival generation), e.g. for
    /// interactive use or bootstrap replay (§6.1 `submit_transaction`).
    pub fn submit_transaction(
        &mut self,
        sender_id: &str,
        receiver_id: &str,
        amount: i64,
        deadline_tick: usize,
        priority: u8,
        divisible: bool,
    ) -> Result<String, SubmitError> {
        if self.state.get_agent(sender_id).is_none() {
            return Err(SubmitError::UnknownAgent(sender_id.to_string()));
        }
        if self.state.get_agent(receiver_id).is_none() {
            return Err(SubmitError::UnknownAgent(receiver_id.to_string()));
        }
        if amount <= 0 {
            return Err(SubmitError::NonPositiveAmount);
        }
        let tick = self.time.current_tick();
        if deadline_tick < tick {
            return Err(SubmitError::DeadlineInPast { deadline_tick, current_tick: tick });
        }

        let tx_id = format!("submit_{:08}", self.next_submit_id);
        self.next_submit_id += 1;

        let mut tx = Transaction::new(
            tx_id.clone(),
            sender_id.to_string(),
            receiver_id.to_string(),
            amount,
            tick,
            deadline_tick,
        )
        .with_priority(priority);
        if divisible {
            tx = tx.divisible(true);
        }

        self.state.add_transaction(tx);
        self.state
            .get_agent_mut(sender_id)
            .expect("checked above")
            .queue_outgoing(tx_id.clone());
        self.state.log_event(Event::Arrival {
            tick,
            tx_id: tx_id.clone(),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            amount,
            deadline_tick,
            priority,
            is_divisible: divisible,
        });

        Ok(tx_id)
    }

    /// Run the fixed ten-phase pipeline for the current tick, then advance
    /// the clock.
    pub fn tick(&mut self) -> TickResult {
        let tick = self.time.current_tick();
        let day = self.time.current_day();
        let mut result = TickResult { tick, day, ..Default::default() };

        // Phase 1: scenario events.
        self.scenario_handler
            .execute_tick_events(&mut self.state, &mut self.arrivals, tick)
            .expect("scenario events are validated at schedule time");

        // Phase 2: arrival generation.
        result.new_arrivals = self.generate_arrivals(tick);

        // Phase 3: Queue 1 policy evaluation.
        let released = self.evaluate_policies(tick);

        // Phase 4: immediate settlement of released payments.
        result.settlements += self.immediate_settlement(tick, released);

        // Phase 5: priority escalation + Queue 2 re-sort.
        self.escalate_priorities(tick);

        // Phase 6: Queue 2 scan.
        let (scan_settled, scan_dropped) = self.scan_queue2(tick);
        result.settlements += scan_settled;
        result.dropped += scan_dropped;
        self.state.rebuild_queue2_index();

        // Phase 7: LSM pass, on its configured schedule.
        if tick % self.lsm_interval_ticks == 0 {
            result.lsm_releases += self.run_lsm(tick);
        }

        // Phase 8: deadline checks.
        self.check_deadlines(tick);

        // Phase 9: cost accrual.
        result.tick_cost_total = self.accrue_costs(tick);

        // Phase 10: end-of-day handling.
        if self.time.is_end_of_day() {
            result.dropped += self.handle_end_of_day(tick);
        }

        self.time.advance_tick();
        result
    }

    // -- Phase implementations ---------------------------------------------

    fn generate_arrivals(&mut self, tick: usize) -> usize {
        let agent_ids = self.state.get_all_agent_ids();
        let mut count = 0;

        for agent_id in &agent_ids {
            let Some(rng) = self.arrival_rngs.get_mut(agent_id) else {
                continue;
            };
            let new_txs = self.arrivals.generate_for_agent(agent_id, tick, rng);

            for tx in new_txs {
                let tx_id = tx.id().to_string();
                let sender_id = tx.sender_id().to_string();
                let receiver_id = tx.receiver_id().to_string();
                let amount = tx.amount();
                let deadline_tick = tx.deadline_tick();
                let priority = tx.priority();
                let is_divisible = tx.is_divisible();

                self.state.add_transaction(tx);
                self.state
                    .get_agent_mut(&sender_id)
                    .expect("arrival generator only emits known senders")
                    .queue_outgoing(tx_id.clone());
                self.state.log_event(Event::Arrival {
                    tick,
                    tx_id,
                    sender_id,
                    receiver_id,
                    amount,
                    deadline_tick,
                    priority,
                    is_divisible,
                });
                count += 1;
            }
        }

        count
    }

    /// Evaluate every agent's Queue 1 in fixed (sorted) agent order,
    /// applying each decision as it's produced, and collect the tx IDs this
    /// tick released for immediate settlement.
    fn evaluate_policies(&mut self, tick: usize) -> Vec<String> {
        let mut released = Vec::new();
        let agent_ids = self.state.get_all_agent_ids();
        let ticks_per_day = self.time.ticks_per_day();

        for agent_id in agent_ids {
            if !self.policies.contains_key(&agent_id) {
                continue;
            }
            let has_queued = self
                .state
                .get_agent(&agent_id)
                .map(|a| a.queue1_size() > 0)
                .unwrap_or(false);
            if !has_queued {
                continue;
            }

            let decisions = {
                let policy = self.policies.get_mut(&agent_id).expect("checked above");
                let agent = self.state.get_agent(&agent_id).expect("checked above");
                policy.evaluate_queue(agent, &self.state, tick, ticks_per_day)
            };

            for decision in decisions {
                self.apply_decision(&agent_id, decision, tick, &mut released);
            }
        }

        released
    }

    fn apply_decision(
        &mut self,
        agent_id: &str,
        decision: ReleaseDecision,
        tick: usize,
        released: &mut Vec<String>,
    ) {
        match decision {
            ReleaseDecision::Release { tx_id } => {
                if let Some(agent) = self.state.get_agent_mut(agent_id) {
                    agent.remove_from_outgoing(&tx_id);
                }
                self.state.log_event(Event::PolicySubmit {
                    tick,
                    agent_id: agent_id.to_string(),
                    tx_id: tx_id.clone(),
                });
                released.push(tx_id);
            }
            ReleaseDecision::Hold { tx_id, reason } => {
                self.state.log_event(Event::PolicyHold {
                    tick,
                    agent_id: agent_id.to_string(),
                    tx_id,
                    reason: map_hold_reason(reason),
                });
            }
            ReleaseDecision::Split { tx_id, n } => {
                self.apply_split(agent_id, &tx_id, n, tick);
            }
            ReleaseDecision::Reprioritize { tx_id, new_priority } => {
                let old_priority = self
                    .state
                    .get_transaction(&tx_id)
                    .map(|t| t.priority())
                    .unwrap_or(new_priority);
                if let Some(tx) = self.state.get_transaction_mut(&tx_id) {
                    tx.set_priority(new_priority);
                }
                self.state.log_event(Event::PolicyReprioritize {
                    tick,
                    agent_id: agent_id.to_string(),
                    tx_id,
                    old_priority,
                    new_priority,
                });
            }
        }
    }

    /// Split a divisible Queue 1 payment into `n` children, replacing it in
    /// place (§4.4 `Split`). Children re-enter Queue 1 and are evaluated
    /// fresh on the next tick — splitting never releases directly.
    fn apply_split(&mut self, agent_id: &str, tx_id: &str, n: usize, tick: usize) {
        let Some(parent) = self.state.get_transaction(tx_id).cloned() else {
            return;
        };
        if !parent.is_divisible() || n < 2 {
            return;
        }

        let children = parent.split(n, tick, |i| format!("{tx_id}#{i}"));
        let child_ids: Vec<String> = children.iter().map(|c| c.id().to_string()).collect();

        for child in children {
            self.state.add_transaction(child);
        }
        if let Some(agent) = self.state.get_agent_mut(agent_id) {
            agent.replace_in_outgoing(tx_id, &child_ids);
        }
        self.state.log_event(Event::PolicySplit {
            tick,
            agent_id: agent_id.to_string(),
            tx_id: tx_id.to_string(),
            num_splits: n,
            child_ids,
        });

        let split_cost = self.costs.split_friction_cost(n);
        if split_cost > 0 {
            if let Some(agent) = self.state.get_agent_mut(agent_id) {
                agent.costs_mut().add_split_friction(split_cost);
            }
            self.state.log_event(Event::CostAccrual {
                tick,
                agent_id: agent_id.to_string(),
                bucket: CostBucket::SplitFriction,
                amount: split_cost,
            });
        }
    }

    /// Phase 4 (§4.7): attempt to settle every payment released this tick.
    /// Uses the same liquidity-bounded, divisibility-aware logic as the
    /// Queue 2 scan (`settlement::process_queue`); failures fall through to
    /// Queue 2. `BTreeMap::get_many_mut` is unstable on stable Rust, so
    /// sender/receiver are borrowed sequentially rather than simultaneously.
    fn immediate_settlement(&mut self, tick: usize, released: Vec<String>) -> usize {
        let mut settled = 0;

        for tx_id in released {
            let Some(tx) = self.state.get_transaction(&tx_id) else {
                continue;
            };
            if tx.is_settled() || tx.is_dropped() {
                continue;
            }

            let sender_id = tx.sender_id().to_string();
            let receiver_id = tx.receiver_id().to_string();
            let remaining = tx.remaining_amount();
            let is_divisible = tx.is_divisible();

            let available = self
                .state
                .get_agent(&sender_id)
                .expect("sender must exist")
                .available_liquidity();
            let amount = if is_divisible {
                remaining.min(available)
            } else if available >= remaining {
                remaining
            } else {
                0
            };

            if amount > 0 {
                self.state
                    .get_agent_mut(&sender_id)
                    .expect("sender must exist")
                    .debit(amount)
                    .expect("amount bounded by available_liquidity");
                self.state
                    .get_agent_mut(&receiver_id)
                    .expect("receiver must exist")
                    .credit(amount);
                self.state
                    .get_transaction_mut(&tx_id)
                    .expect("transaction must exist")
                    .settle(amount, tick)
                    .expect("amount bounded by remaining_amount");

                self.state.log_event(Event::RtgsImmediateSettlement {
                    tick,
                    tx_id: tx_id.clone(),
                    sender_id,
                    receiver_id,
                    amount,
                });
                settled += 1;
            }

            let still_pending = self
                .state
                .get_transaction(&tx_id)
                .map(|t| !t.is_settled())
                .unwrap_or(false);
            if still_pending {
                self.state.queue_transaction(tx_id);
            }
        }

        self.resort_queue2(tick);
        settled
    }

    /// Phase 6 (§4.10): retry every transaction sitting in Queue 2 in FIFO
    /// order. Mirrors `settlement::process_queue`'s settlement logic, but
    /// inline so each settlement and drop can be logged individually —
    /// `process_queue` itself only returns aggregate counts, with no event
    /// sink to report per-transaction detail through.
    fn scan_queue2(&mut self, tick: usize) -> (usize, usize) {
        let mut settled_count = 0;
        let mut dropped_count = 0;
        let mut still_pending = Vec::new();

        let tx_ids: Vec<String> = self.state.rtgs_queue_mut().drain(..).collect();

        for tx_id in tx_ids {
            let Some(transaction) = self.state.get_transaction(&tx_id) else {
                continue;
            };
            if transaction.is_settled() {
                continue;
            }
            if transaction.is_overdue(tick) {
                let agent_id = transaction.sender_id().to_string();
                let remaining_amount = transaction.remaining_amount();
                self.state.get_transaction_mut(&tx_id).unwrap().drop_transaction(tick);
                self.state.log_event(Event::TransactionDropped {
                    tick,
                    tx_id: tx_id.clone(),
                    agent_id,
                    remaining_amount,
                });
                dropped_count += 1;
                continue;
            }

            let sender_id = transaction.sender_id().to_string();
            let receiver_id = transaction.receiver_id().to_string();
            let remaining = transaction.remaining_amount();
            let is_divisible = transaction.is_divisible();

            let available = self
                .state
                .get_agent(&sender_id)
                .expect("sender must exist")
                .available_liquidity();
            let amount = if is_divisible {
                remaining.min(available)
            } else if available >= remaining {
                remaining
            } else {
                0
            };

            if amount > 0 {
                self.state
                    .get_agent_mut(&sender_id)
                    .expect("sender must exist")
                    .debit(amount)
                    .expect("amount was bounded by available_liquidity");
                self.state
                    .get_agent_mut(&receiver_id)
                    .expect("receiver must exist")
                    .credit(amount);
                self.state
                    .get_transaction_mut(&tx_id)
                    .expect("transaction must exist")
                    .settle(amount, tick)
                    .expect("amount was bounded by remaining_amount");

                self.state.log_event(Event::Queue2LiquidityRelease {
                    tick,
                    tx_id: tx_id.clone(),
                    sender_id,
                    receiver_id,
                    amount,
                });
                settled_count += 1;
            }

            let still_settled = self
                .state
                .get_transaction(&tx_id)
                .map(|t| t.is_settled())
                .unwrap_or(true);
            if !still_settled {
                still_pending.push(tx_id);
            }
        }

        *self.state.rtgs_queue_mut() = still_pending;
        (settled_count, dropped_count)
    }

    /// `effective_priority` for Queue 2 ordering (§4.6): stored priority plus
    /// whatever escalation boost currently applies. Never written back to
    /// the transaction.
    fn effective_priority(&self, tx: &Transaction, tick: usize) -> u8 {
        match &self.priority_escalation {
            Some(cfg) => tx
                .priority()
                .saturating_add(cfg.boost_for(tx.ticks_to_deadline(tick)))
                .min(10),
            None => tx.priority(),
        }
    }

    /// Phase 5: emit `PriorityEscalated` for every Queue 2 payment whose
    /// effective priority changed, then re-sort Queue 2 by
    /// `(priority DESC, arrival_tick ASC, tx_id ASC)` (INV-QUEUE-ORDER) using
    /// effective rather than stored priority.
    fn escalate_priorities(&mut self, tick: usize) {
        if let Some(cfg) = self.priority_escalation.clone() {
            let queue_ids = self.state.rtgs_queue().clone();
            let mut events = Vec::with_capacity(queue_ids.len());

            for tx_id in &queue_ids {
                let Some(tx) = self.state.get_transaction(tx_id) else {
                    continue;
                };
                let original = tx.priority();
                let ticks_until_deadline = tx.ticks_to_deadline(tick);
                let boost = cfg.boost_for(ticks_until_deadline);
                if boost == 0 {
                    continue;
                }
                let escalated = original.saturating_add(boost).min(10);
                if escalated == original {
                    continue;
                }
                events.push(Event::PriorityEscalated {
                    tick,
                    tx_id: tx_id.clone(),
                    agent_id: tx.sender_id().to_string(),
                    original_priority: original,
                    escalated_priority: escalated,
                    boost_applied: escalated - original,
                    ticks_until_deadline,
                });
            }

            for event in events {
                self.state.log_event(event);
            }
        }

        self.resort_queue2(tick);
    }

    fn resort_queue2(&mut self, tick: usize) {
        let mut queue = self.state.rtgs_queue().clone();
        let mut keys: HashMap<String, (u8, usize)> = HashMap::with_capacity(queue.len());
        for tx_id in &queue {
            if let Some(tx) = self.state.get_transaction(tx_id) {
                let priority = self.effective_priority(tx, tick);
                keys.insert(tx_id.clone(), (priority, tx.arrival_tick()));
            }
        }

        queue.sort_by(|a, b| {
            let (pa, aa) = keys.get(a).copied().unwrap_or((0, 0));
            let (pb, ab) = keys.get(b).copied().unwrap_or((0, 0));
            pb.cmp(&pa).then(aa.cmp(&ab)).then(a.cmp(b))
        });

        *self.state.rtgs_queue_mut() = queue;
        self.state.rebuild_queue2_index();
    }

    fn run_lsm(&mut self, tick: usize) -> usize {
        let mut count = 0;

        if self.lsm_config.enable_bilateral {
            let events = run_bilateral_pass(&mut self.state, tick);
            count += events.len();
            for event in events {
                self.state.log_event(event);
            }
        }
        if self.lsm_config.enable_cycles {
            let events = run_cycle_pass(&mut self.state, tick, &self.lsm_config);
            count += events.len();
            for event in events {
                self.state.log_event(event);
            }
        }

        self.state.rebuild_queue2_index();
        count
    }

    /// Phase 8 (§4.9): flag newly-overdue payments once, and charge every
    /// still-overdue payment its per-tick deadline penalty.
    fn check_deadlines(&mut self, tick: usize) {
        let mut pending_ids = self.state.rtgs_queue().clone();
        for agent_id in self.state.get_all_agent_ids() {
            if let Some(agent) = self.state.get_agent(&agent_id) {
                pending_ids.extend(agent.outgoing_queue().iter().cloned());
            }
        }

        for tx_id in pending_ids {
            let Some(tx) = self.state.get_transaction(&tx_id) else {
                continue;
            };
            if !tx.is_overdue(tick) {
                continue;
            }

            let agent_id = tx.sender_id().to_string();
            let deadline_tick = tx.deadline_tick();
            let ticks_overdue = (tick - deadline_tick) as i64;

            if self.overdue_seen.insert(tx_id.clone()) {
                self.state.log_event(Event::TransactionWentOverdue {
                    tick,
                    tx_id: tx_id.clone(),
                    agent_id: agent_id.clone(),
                    deadline_tick,
                });
            }

            let penalty = self.costs.deadline_penalty(ticks_overdue);
            if let Some(agent) = self.state.get_agent_mut(&agent_id) {
                agent.costs_mut().add_deadline_penalty(penalty);
            }
            self.state.log_event(Event::DeadlinePenalty {
                tick,
                tx_id,
                agent_id,
                amount: penalty,
                ticks_overdue,
            });
        }
    }

    /// Phase 9 (§4.9): overdraft and collateral cost accrue once per agent
    /// per tick; delay cost accrues per pending transaction (truncating
    /// division does not distribute over a sum, so this cannot be computed
    /// from an aggregate queue value).
    fn accrue_costs(&mut self, tick: usize) -> i64 {
        let mut tick_total = 0i64;

        for agent_id in self.state.get_all_agent_ids() {
            let Some(agent) = self.state.get_agent(&agent_id) else {
                continue;
            };
            let overdraft = self.costs.overdraft_cost(agent.balance());
            let collateral_cost = self.costs.collateral_cost(agent.collateral_posted());

            if overdraft > 0 {
                self.state.get_agent_mut(&agent_id).unwrap().costs_mut().add_liquidity(overdraft);
                self.state.log_event(Event::CostAccrual {
                    tick,
                    agent_id: agent_id.clone(),
                    bucket: CostBucket::Liquidity,
                    amount: overdraft,
                });
                tick_total += overdraft;
            }
            if collateral_cost > 0 {
                self.state
                    .get_agent_mut(&agent_id)
                    .unwrap()
                    .costs_mut()
                    .add_collateral(collateral_cost);
                self.state.log_event(Event::CostAccrual {
                    tick,
                    agent_id,
                    bucket: CostBucket::Collateral,
                    amount: collateral_cost,
                });
                tick_total += collateral_cost;
            }
        }

        let mut delay_by_agent: HashMap<String, i64> = HashMap::new();
        for tx in self.state.transactions().values() {
            if tx.is_settled() || tx.is_dropped() {
                continue;
            }
            let cost = self.costs.delay_cost(tx.remaining_amount());
            if cost > 0 {
                *delay_by_agent.entry(tx.sender_id().to_string()).or_insert(0) += cost;
            }
        }
        for (agent_id, amount) in delay_by_agent {
            if let Some(agent) = self.state.get_agent_mut(&agent_id) {
                agent.costs_mut().add_delay(amount);
            }
            self.state.log_event(Event::CostAccrual {
                tick,
                agent_id,
                bucket: CostBucket::Delay,
                amount,
            });
            tick_total += amount;
        }

        tick_total
    }

    /// Phase 10 (§4.9): drop every payment still pending at end-of-day,
    /// charging the flat `eod_penalty`, then empty both queues — nothing
    /// pending survives past day end.
    fn handle_end_of_day(&mut self, tick: usize) -> usize {
        let pending_ids: Vec<String> = self
            .state
            .transactions()
            .iter()
            .filter(|(_, tx)| !tx.is_settled() && !tx.is_dropped())
            .map(|(id, _)| id.clone())
            .collect();

        for tx_id in &pending_ids {
            let Some(tx) = self.state.get_transaction(tx_id) else {
                continue;
            };
            let agent_id = tx.sender_id().to_string();
            let remaining = tx.remaining_amount();

            self.state.get_transaction_mut(tx_id).unwrap().drop_transaction(tick);
            self.state.log_event(Event::TransactionDropped {
                tick,
                tx_id: tx_id.clone(),
                agent_id: agent_id.clone(),
                remaining_amount: remaining,
            });

            let penalty = self.costs.eod_penalty;
            if penalty > 0 {
                if let Some(agent) = self.state.get_agent_mut(&agent_id) {
                    agent.costs_mut().add_eod_penalty(penalty);
                }
                self.state.log_event(Event::CostAccrual {
                    tick,
                    agent_id,
                    bucket: CostBucket::Eod,
                    amount: penalty,
                });
            }

            self.overdue_seen.remove(tx_id);
        }

        self.state.rtgs_queue_mut().clear();
        for agent_id in self.state.get_all_agent_ids() {
            if let Some(agent) = self.state.get_agent_mut(&agent_id) {
                agent.clear_outgoing();
            }
        }
        self.state.rebuild_queue2_index();

        pending_ids.len()
    }
}

fn map_hold_reason(reason: Option<String>) -> HoldReasonEvent {
    match reason {
        Some(text) => HoldReasonEvent::Custom(text),
        None => HoldReasonEvent::InsufficientLiquidity,
    }
}

fn validate_config(config: &OrchestratorConfig) -> Result<(), SimulationError> {
    if config.ticks_per_day == 0 {
        return Err(SimulationError::InvalidConfig("ticks_per_day must be > 0".into()));
    }
    if config.num_days == 0 {
        return Err(SimulationError::InvalidConfig("num_days must be > 0".into()));
    }
    if config.agents.is_empty() {
        return Err(SimulationError::InvalidConfig("at least one agent is required".into()));
    }

    let mut seen = HashSet::new();
    for agent in &config.agents {
        if agent.credit_limit < 0 {
            return Err(SimulationError::InvalidConfig(format!(
                "agent {}: credit_limit must be non-negative",
                agent.id
            )));
        }
        if agent.collateral_capacity < 0 {
            return Err(SimulationError::InvalidConfig(format!(
                "agent {}: collateral_capacity must be non-negative",
                agent.id
            )));
        }
        if !seen.insert(agent.id.clone()) {
            return Err(SimulationError::InvalidConfig(format!("duplicate agent id: {}", agent.id)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_config(id: &str, balance: i64, credit_limit: i64, policy: PolicyConfig) -> AgentConfig {
        AgentConfig {
            id: id.to_string(),
            opening_balance: balance,
            credit_limit,
            collateral_capacity: 0,
            policy,
            arrival_config: None,
        }
    }

    fn base_config(agents: Vec<AgentConfig>) -> OrchestratorConfig {
        OrchestratorConfig {
            ticks_per_day: 10,
            num_days: 1,
            rng_seed: 42,
            agents,
            costs: CostRates::default(),
            priority_escalation: None,
            lsm: LsmConfig::default(),
            lsm_interval_ticks: 1,
            scenario_events: Vec::new(),
        }
    }

    #[test]
    fn rejects_empty_agent_list() {
        let err = Orchestrator::new(base_config(Vec::new())).unwrap_err();
        assert!(matches!(err, SimulationError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_duplicate_agent_ids() {
        let agents = vec![
            agent_config("A", 0, 0, PolicyConfig::Fifo),
            agent_config("A", 0, 0, PolicyConfig::Fifo),
        ];
        let err = Orchestrator::new(base_config(agents)).unwrap_err();
        assert!(matches!(err, SimulationError::InvalidConfig(_)));
    }

    #[test]
    fn submit_then_tick_settles_with_fifo_policy() {
        let agents = vec![
            agent_config("A", 1_000_000, 0, PolicyConfig::Fifo),
            agent_config("B", 0, 0, PolicyConfig::Fifo),
        ];
        let mut orch = Orchestrator::new(base_config(agents)).unwrap();

        let tx_id = orch.submit_transaction("A", "B", 500_000, 5, 5, false).unwrap();
        let result = orch.tick();

        assert_eq!(result.new_arrivals, 0); // no arrival_config configured
        assert_eq!(result.settlements, 1);
        assert_eq!(orch.get_agent_balance("A"), Some(500_000));
        assert_eq!(orch.get_agent_balance("B"), Some(500_000));
        assert!(orch.get_transaction(&tx_id).unwrap().is_settled());
    }

    #[test]
    fn insufficient_liquidity_queues_into_queue2() {
        let agents = vec![
            agent_config("A", 0, 0, PolicyConfig::Fifo),
            agent_config("B", 0, 0, PolicyConfig::Fifo),
        ];
        let mut orch = Orchestrator::new(base_config(agents)).unwrap();

        orch.submit_transaction("A", "B", 500_000, 5, 5, false).unwrap();
        let result = orch.tick();

        assert_eq!(result.settlements, 0);
        assert_eq!(orch.get_queue2_size(), 1);
    }

    #[test]
    fn overdue_payment_emits_went_overdue_once_then_penalty_every_tick() {
        let agents = vec![
            agent_config("A", 0, 0, PolicyConfig::Fifo),
            agent_config("B", 0, 0, PolicyConfig::Fifo),
        ];
        let mut orch = Orchestrator::new(base_config(agents)).unwrap();
        orch.submit_transaction("A", "B", 500_000, 1, 5, false).unwrap();

        for _ in 0..4 {
            orch.tick();
        }

        let went_overdue = orch
            .all_events()
            .iter()
            .filter(|e| matches!(e, Event::TransactionWentOverdue { .. }))
            .count();
        let penalties = orch
            .all_events()
            .iter()
            .filter(|e| matches!(e, Event::DeadlinePenalty { .. }))
            .count();

        assert_eq!(went_overdue, 1);
        assert!(penalties >= 2);
    }

    #[test]
    fn end_of_day_drops_stragglers_and_charges_eod_penalty() {
        let agents = vec![
            agent_config("A", 0, 0, PolicyConfig::Fifo),
            agent_config("B", 0, 0, PolicyConfig::Fifo),
        ];
        let mut orch = Orchestrator::new(base_config(agents)).unwrap();
        let tx_id = orch.submit_transaction("A", "B", 500_000, 100, 5, false).unwrap();

        for _ in 0..10 {
            orch.tick();
        }

        assert!(orch.get_transaction(&tx_id).unwrap().is_dropped());
        assert_eq!(orch.get_queue2_size(), 0);
        assert!(orch
            .all_events()
            .iter()
            .any(|e| matches!(e, Event::TransactionDropped { .. })));
    }

    #[test]
    fn priority_escalation_reorders_queue2_without_mutating_stored_priority() {
        let agents = vec![
            agent_config("A", 0, 0, PolicyConfig::Fifo),
            agent_config("B", 0, 0, PolicyConfig::Fifo),
        ];
        let mut config = base_config(agents);
        config.priority_escalation = Some(PriorityEscalationConfig {
            enabled: true,
            curve: EscalationCurve::Linear,
            start_escalating_at_ticks: 5,
            max_boost: 5,
        });
        let mut orch = Orchestrator::new(config).unwrap();

        // Low-priority payment close to its deadline...
        orch.submit_transaction("A", "B", 100_000, 2, 1, false).unwrap();
        // ...vs a high-priority payment with plenty of time.
        orch.submit_transaction("A", "B", 100_000, 50, 9, false).unwrap();

        orch.tick();

        let escalated = orch
            .all_events()
            .iter()
            .any(|e| matches!(e, Event::PriorityEscalated { .. }));
        assert!(escalated);

        let stored_priorities: Vec<u8> = orch
            .state()
            .transactions()
            .values()
            .map(|t| t.priority())
            .collect();
        assert!(stored_priorities.contains(&1));
        assert!(stored_priorities.contains(&9));
    }

    #[test]
    fn split_produces_children_and_charges_friction() {
        let agents = vec![
            agent_config(
                "A",
                0,
                0,
                PolicyConfig::FromJson {
                    json: r#"{
                        "version": "1.0",
                        "policy_id": "split_once",
                        "root": {
                            "node_id": "N1",
                            "type": "action",
                            "action": { "action": "split", "n": { "value": 2 } }
                        }
                    }"#
                    .to_string(),
                },
            ),
            agent_config("B", 0, 0, PolicyConfig::Fifo),
        ];
        let mut orch = Orchestrator::new(base_config(agents)).unwrap();
        orch.submit_transaction("A", "B", 1_000_000, 20, 5, true).unwrap();

        orch.tick();

        let split_events: Vec<_> = orch
            .all_events()
            .iter()
            .filter(|e| matches!(e, Event::PolicySplit { .. }))
            .collect();
        assert_eq!(split_events.len(), 1);

        let friction: Vec<_> = orch
            .all_events()
            .iter()
            .filter(|e| matches!(e, Event::CostAccrual { bucket: CostBucket::SplitFriction, .. }))
            .collect();
        assert_eq!(friction.len(), 1);
    }
}
