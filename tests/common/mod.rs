#![allow(dead_code)]

use core_governor::models::{
    CoreMask, CpuTopology, EngineConfig, PowerPlan, ProcessSnapshot, TrimMode,
};
use core_governor::os_cmd::{ProcessControl, ProcessSource};
use core_governor::{PolicyEngine, PolicyError, PolicyResult, PriorityClass};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Apply {
        pid: u32,
        mask: CoreMask,
        priority: Option<PriorityClass>,
        primary_thread: Option<CoreMask>,
    },
    SetPriority {
        pid: u32,
        priority: PriorityClass,
    },
    Trim(TrimMode),
    PowerPlan(PowerPlan),
}

#[derive(Default)]
struct FakeState {
    processes: Vec<ProcessSnapshot>,
    priorities: HashMap<u32, PriorityClass>,
    memory_percent: f32,
    failing_pids: HashSet<u32>,
    enumeration_fails: bool,
    foreground: Option<u32>,
    apply_delay: Option<Duration>,
    calls: Vec<Call>,
}

/// In-memory machine that records every request it receives.
#[derive(Default)]
pub struct FakeOs {
    state: Mutex<FakeState>,
}

impl FakeOs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_processes(&self, processes: Vec<ProcessSnapshot>) {
        self.state.lock().unwrap().processes = processes;
    }

    pub fn set_priority_of(&self, pid: u32, priority: PriorityClass) {
        self.state.lock().unwrap().priorities.insert(pid, priority);
    }

    pub fn set_memory_percent(&self, percent: f32) {
        self.state.lock().unwrap().memory_percent = percent;
    }

    pub fn fail_pid(&self, pid: u32, fail: bool) {
        let mut state = self.state.lock().unwrap();
        if fail {
            state.failing_pids.insert(pid);
        } else {
            state.failing_pids.remove(&pid);
        }
    }

    pub fn set_foreground(&self, pid: Option<u32>) {
        self.state.lock().unwrap().foreground = pid;
    }

    /// Makes every affinity dispatch take `delay` before it lands.
    pub fn slow_applies(&self, delay: Duration) {
        self.state.lock().unwrap().apply_delay = Some(delay);
    }

    pub fn priority_of(&self, pid: u32) -> Option<PriorityClass> {
        self.state.lock().unwrap().priorities.get(&pid).copied()
    }

    pub fn fail_enumeration(&self, fail: bool) {
        self.state.lock().unwrap().enumeration_fails = fail;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut self.state.lock().unwrap().calls)
    }

    pub fn applies_to(&self, pid: u32) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Apply { pid: p, .. } if *p == pid))
            .collect()
    }

    pub fn priority_requests(&self) -> Vec<(u32, PriorityClass)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SetPriority { pid, priority } => Some((pid, priority)),
                _ => None,
            })
            .collect()
    }

    fn check(state: &FakeState, pid: u32) -> PolicyResult<()> {
        if state.failing_pids.contains(&pid) {
            return Err(PolicyError::DispatchFailed {
                pid,
                reason: "access denied".into(),
            });
        }
        Ok(())
    }
}

impl ProcessSource for FakeOs {
    fn list_processes(&self) -> PolicyResult<Vec<ProcessSnapshot>> {
        let state = self.state.lock().unwrap();
        if state.enumeration_fails {
            return Err(PolicyError::EnumerationFailed("snapshot unavailable".into()));
        }
        Ok(state.processes.clone())
    }

    fn memory_usage_percent(&self) -> PolicyResult<f32> {
        Ok(self.state.lock().unwrap().memory_percent)
    }

    fn process_priority(&self, pid: u32) -> PolicyResult<PriorityClass> {
        let state = self.state.lock().unwrap();
        Self::check(&state, pid)?;
        Ok(state.priorities.get(&pid).copied().unwrap_or(PriorityClass::Normal))
    }

    fn foreground_pid(&self) -> Option<u32> {
        self.state.lock().unwrap().foreground
    }
}

impl ProcessControl for FakeOs {
    fn apply_affinity_and_priority(
        &self,
        pid: u32,
        mask: &CoreMask,
        priority: Option<PriorityClass>,
        primary_thread: Option<CoreMask>,
    ) -> PolicyResult<()> {
        let delay = self.state.lock().unwrap().apply_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Apply {
            pid,
            mask: *mask,
            priority,
            primary_thread,
        });
        Self::check(&state, pid)?;
        if let Some(priority) = priority {
            state.priorities.insert(pid, priority);
        }
        Ok(())
    }

    fn set_priority(&self, pid: u32, priority: PriorityClass) -> PolicyResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::SetPriority { pid, priority });
        Self::check(&state, pid)?;
        state.priorities.insert(pid, priority);
        Ok(())
    }

    fn request_trim(&self, mode: TrimMode) -> PolicyResult<()> {
        self.state.lock().unwrap().calls.push(Call::Trim(mode));
        Ok(())
    }

    fn switch_power_plan(&self, plan: PowerPlan) -> PolicyResult<()> {
        self.state.lock().unwrap().calls.push(Call::PowerPlan(plan));
        Ok(())
    }
}

pub fn engine_with(config: EngineConfig, cores: usize, os: &Arc<FakeOs>) -> PolicyEngine {
    let topology = CpuTopology::flat("Test CPU", cores).unwrap();
    let source: Arc<dyn ProcessSource> = os.clone();
    let control: Arc<dyn ProcessControl> = os.clone();
    PolicyEngine::new(
        Arc::new(RwLock::new(config)),
        Arc::new(topology),
        source,
        control,
    )
}

pub fn process(pid: u32, name: &str) -> ProcessSnapshot {
    ProcessSnapshot::new(pid, name)
}
