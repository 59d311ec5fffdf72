//! The periodic policy engine.
//!
//! One tick: harvest finished background dispatches, list processes, run the rule
//! evaluator (dispatches are not awaited), then throttling, ProBalance and the
//! smart trim gate.

mod monitor;
mod pro_balance;
pub mod rules;
pub mod smart_trim;
mod state;
pub mod throttle;

pub use monitor::{MonitorHandle, spawn_monitor};
pub use pro_balance::BalanceOutcome;
pub use rules::{Decision, RuleEvaluator, RuleSource, SkipReason};
pub use smart_trim::SmartTrimGate;
pub use state::{DispatchOutcome, HANDLED_SET_CAP, HandledSet, Harvest, PolicyEngineState};
pub use throttle::ThrottleOutcome;

use crate::affinity::SideEffect;
use crate::error::{PolicyError, PolicyResult};
use crate::models::{CpuTopology, EngineConfig};
use crate::os_cmd::{ProcessControl, ProcessSource};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};

/// Runs a blocking OS call on the blocking pool and waits for it.
pub(crate) async fn blocking<T, F>(call: F) -> PolicyResult<T>
where
    F: FnOnce() -> PolicyResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| PolicyError::SideEffectFailed {
            action: "blocking OS call",
            reason: e.to_string(),
        })?
}

/// Summary of one tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// The previous tick was still running.
    pub skipped: bool,
    pub enumeration_failed: bool,
    pub processes: usize,
    /// Dispatches started this tick.
    pub dispatched: usize,
    /// Finished dispatches collected at the start of this tick.
    pub harvest: Harvest,
    pub rejected: usize,
    pub game_running: bool,
    pub throttle: ThrottleOutcome,
    pub balance: BalanceOutcome,
    pub trim_requested: bool,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

pub struct PolicyEngine {
    config: Arc<RwLock<EngineConfig>>,
    topology: Arc<CpuTopology>,
    source: Arc<dyn ProcessSource>,
    control: Arc<dyn ProcessControl>,
    state: Mutex<PolicyEngineState>,
}

impl PolicyEngine {
    pub fn new(
        config: Arc<RwLock<EngineConfig>>,
        topology: Arc<CpuTopology>,
        source: Arc<dyn ProcessSource>,
        control: Arc<dyn ProcessControl>,
    ) -> Self {
        Self {
            config,
            topology,
            source,
            control,
            state: Mutex::new(PolicyEngineState::new()),
        }
    }

    pub fn config(&self) -> &Arc<RwLock<EngineConfig>> {
        &self.config
    }

    pub fn topology(&self) -> &CpuTopology {
        &self.topology
    }

    pub async fn tick(&self) -> TickReport {
        self.tick_at(Instant::now()).await
    }

    /// One scan cycle at `now`. Returns immediately with `skipped` set when
    /// another tick holds the state.
    pub async fn tick_at(&self, now: Instant) -> TickReport {
        let Ok(mut state) = self.state.try_lock() else {
            tracing::debug!("Previous tick still running; skipping");
            return TickReport::skipped();
        };

        // Edits made while the tick runs apply from the next one.
        let config = self.config.read().await.clone();
        let mut report = TickReport {
            harvest: state.harvest(),
            ..TickReport::default()
        };

        let source = self.source.clone();
        let snapshot = match blocking(move || source.list_processes()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Process enumeration failed; skipping this tick: {}", e);
                report.enumeration_failed = true;
                return report;
            }
        };
        report.processes = snapshot.len();

        let evaluator = RuleEvaluator::new(&config, &self.topology);
        for process in &snapshot {
            match evaluator.decide(process, &state) {
                Ok(Decision::Apply { plan, source }) => {
                    tracing::debug!(
                        "{:?} rule for {} (pid {}): mask {} priority {:?}",
                        source,
                        process.name,
                        process.pid,
                        plan.mask,
                        plan.priority
                    );

                    let pid = process.pid;
                    let side_effect = plan.side_effect;
                    let control = self.control.clone();
                    state.spawn_dispatch(pid, process.name.clone(), move || {
                        control.apply_affinity_and_priority(pid, &plan.mask, plan.priority, plan.primary_thread)
                    });
                    report.dispatched += 1;

                    if let Some(SideEffect::SwitchPowerPlan(power_plan)) = side_effect {
                        let control = self.control.clone();
                        state.spawn_side_effect("power plan switch", move || {
                            control.switch_power_plan(power_plan)
                        });
                    }
                }
                Ok(Decision::Skip(_)) | Ok(Decision::NoRule) => {}
                Err(e) => {
                    tracing::warn!("Rejected policy for {} (pid {}): {}", process.name, process.pid, e);
                    report.rejected += 1;
                }
            }
        }

        let live: HashSet<u32> = snapshot.iter().map(|p| p.pid).collect();
        let evicted = state.handled.evict_stale(&live);
        if evicted > 0 {
            tracing::debug!("Evicted {} stale pids from the handled set", evicted);
        }

        let game_names = evaluator.game_names();
        report.game_running = throttle::is_game_running(&snapshot, game_names);

        // A dispatch still running may carry a priority of its own; those pids
        // wait for the next tick.
        let in_flight = state.in_flight_pids().clone();
        let PolicyEngineState {
            throttled,
            restrained,
            ..
        } = &mut *state;
        report.throttle = throttle::run(
            &config.throttle_list,
            report.game_running,
            &snapshot,
            &in_flight,
            throttled,
            &self.source,
            &self.control,
        )
        .await;

        report.balance = pro_balance::run(
            &config,
            game_names,
            report.game_running,
            &snapshot,
            &in_flight,
            throttled,
            restrained,
            &self.source,
            &self.control,
        )
        .await;

        if config.smart_trim.enabled {
            let source = self.source.clone();
            match blocking(move || source.memory_usage_percent()).await {
                Ok(used) => {
                    if state.trim_gate.evaluate(&config.smart_trim, used, now) {
                        let mode = config.smart_trim.mode;
                        tracing::info!("Memory at {:.1}%; requesting {:?} trim", used, mode);
                        let control = self.control.clone();
                        state.spawn_side_effect("memory trim", move || control.request_trim(mode));
                        report.trim_requested = true;
                    }
                }
                Err(e) => tracing::warn!("Reading memory usage failed: {}", e),
            }
        }

        report
    }

    /// Waits for every dispatch still in flight and records the outcomes.
    pub async fn flush_dispatches(&self) -> Harvest {
        let mut state = self.state.lock().await;
        state.drain().await
    }

    /// Restores throttled and restrained processes, then forgets all state.
    /// Dispatches still in flight are abandoned.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        let PolicyEngineState {
            throttled,
            restrained,
            ..
        } = &mut *state;
        throttle::restore_priorities(throttled, &self.control, "throttled").await;
        throttle::restore_priorities(restrained, &self.control, "restrained").await;
        state.teardown();
        tracing::info!("Policy engine stopped");
    }

    /// Pids that already received their policy.
    pub async fn handled_count(&self) -> usize {
        self.state.lock().await.handled.len()
    }

    pub async fn is_handled(&self, pid: u32) -> bool {
        self.state.lock().await.handled.contains(pid)
    }

    pub async fn throttled(&self) -> Vec<(u32, os_api::PriorityClass)> {
        let state = self.state.lock().await;
        let mut entries: Vec<_> = state.throttled.iter().map(|(&p, &c)| (p, c)).collect();
        entries.sort_unstable();
        entries
    }

    pub async fn restrained(&self) -> Vec<(u32, os_api::PriorityClass)> {
        let state = self.state.lock().await;
        let mut entries: Vec<_> = state.restrained.iter().map(|(&p, &c)| (p, c)).collect();
        entries.sort_unstable();
        entries
    }
}
