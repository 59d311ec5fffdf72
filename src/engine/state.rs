use crate::error::PolicyError;
use crate::engine::smart_trim::SmartTrimGate;
use os_api::PriorityClass;
use std::collections::{HashMap, HashSet};
use tokio::task::{Id, JoinError, JoinSet};

/// Above this size, pids missing from the current snapshot are evicted.
pub const HANDLED_SET_CAP: usize = 2000;

/// Pids that already received a successful dispatch.
#[derive(Debug, Default)]
pub struct HandledSet {
    pids: HashSet<u32>,
}

impl HandledSet {
    pub fn contains(&self, pid: u32) -> bool {
        self.pids.contains(&pid)
    }

    pub fn insert(&mut self, pid: u32) -> bool {
        self.pids.insert(pid)
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    /// Drops pids that are not alive any more, but only once the set has outgrown
    /// [`HANDLED_SET_CAP`]. A reused pid would otherwise never be evaluated again.
    pub fn evict_stale(&mut self, live: &HashSet<u32>) -> usize {
        if self.pids.len() <= HANDLED_SET_CAP {
            return 0;
        }
        let before = self.pids.len();
        self.pids.retain(|pid| live.contains(pid));
        before - self.pids.len()
    }

    fn clear(&mut self) {
        self.pids.clear();
    }
}

/// Result of a background OS call, collected on a later tick.
#[derive(Debug)]
pub enum DispatchOutcome {
    Affinity {
        pid: u32,
        name: String,
        result: Result<(), PolicyError>,
    },
    SideEffect {
        action: &'static str,
        result: Result<(), PolicyError>,
    },
}

/// What harvesting finished background work produced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Harvest {
    pub applied: usize,
    pub failed: usize,
}

/// Everything the engine remembers between ticks.
pub struct PolicyEngineState {
    pub handled: HandledSet,
    /// Throttled pid -> priority to restore.
    pub throttled: HashMap<u32, PriorityClass>,
    /// Restrained pid -> priority to restore.
    pub restrained: HashMap<u32, PriorityClass>,
    pub trim_gate: SmartTrimGate,
    pending: JoinSet<DispatchOutcome>,
    in_flight_tasks: HashMap<Id, u32>,
    in_flight_pids: HashSet<u32>,
}

impl PolicyEngineState {
    pub fn new() -> Self {
        Self {
            handled: HandledSet::default(),
            throttled: HashMap::new(),
            restrained: HashMap::new(),
            trim_gate: SmartTrimGate::default(),
            pending: JoinSet::new(),
            in_flight_tasks: HashMap::new(),
            in_flight_pids: HashSet::new(),
        }
    }

    /// Forgets everything. Background work still running is detached, not cancelled.
    pub fn teardown(&mut self) {
        self.pending.detach_all();
        self.in_flight_tasks.clear();
        self.in_flight_pids.clear();
        self.handled.clear();
        self.throttled.clear();
        self.restrained.clear();
        self.trim_gate = SmartTrimGate::default();
    }

    pub fn is_in_flight(&self, pid: u32) -> bool {
        self.in_flight_pids.contains(&pid)
    }

    /// Pids whose affinity dispatch has not been harvested yet.
    pub fn in_flight_pids(&self) -> &HashSet<u32> {
        &self.in_flight_pids
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Starts an affinity dispatch for `pid` without waiting for it.
    pub fn spawn_dispatch<F>(&mut self, pid: u32, name: String, call: F)
    where
        F: FnOnce() -> Result<(), PolicyError> + Send + 'static,
    {
        let handle = self.pending.spawn_blocking(move || DispatchOutcome::Affinity {
            pid,
            name,
            result: call(),
        });
        self.in_flight_tasks.insert(handle.id(), pid);
        self.in_flight_pids.insert(pid);
    }

    /// Starts a best-effort side effect without waiting for it.
    pub fn spawn_side_effect<F>(&mut self, action: &'static str, call: F)
    where
        F: FnOnce() -> Result<(), PolicyError> + Send + 'static,
    {
        self.pending.spawn_blocking(move || DispatchOutcome::SideEffect {
            action,
            result: call(),
        });
    }

    /// Collects whatever background work has finished, without waiting.
    pub fn harvest(&mut self) -> Harvest {
        let mut harvest = Harvest::default();
        while let Some(joined) = self.pending.try_join_next_with_id() {
            self.record(joined, &mut harvest);
        }
        harvest
    }

    /// Waits for every background call still in flight.
    pub async fn drain(&mut self) -> Harvest {
        let mut harvest = Harvest::default();
        while let Some(joined) = self.pending.join_next_with_id().await {
            self.record(joined, &mut harvest);
        }
        harvest
    }

    fn record(&mut self, joined: Result<(Id, DispatchOutcome), JoinError>, harvest: &mut Harvest) {
        let (id, outcome) = match joined {
            Ok(done) => done,
            Err(e) => {
                if let Some(pid) = self.in_flight_tasks.remove(&e.id()) {
                    self.in_flight_pids.remove(&pid);
                    harvest.failed += 1;
                }
                tracing::warn!("Background OS call did not complete: {}", e);
                return;
            }
        };
        self.in_flight_tasks.remove(&id);

        match outcome {
            DispatchOutcome::Affinity { pid, name, result } => {
                self.in_flight_pids.remove(&pid);
                match result {
                    Ok(()) => {
                        self.handled.insert(pid);
                        harvest.applied += 1;
                    }
                    Err(e) => {
                        tracing::warn!("Applying policy to {} (pid {}) failed: {}", name, pid, e);
                        harvest.failed += 1;
                    }
                }
            }
            DispatchOutcome::SideEffect { action, result } => {
                if let Err(e) = result {
                    tracing::warn!("{} failed: {}", action, e);
                }
            }
        }
    }
}

impl Default for PolicyEngineState {
    fn default() -> Self {
        Self::new()
    }
}
