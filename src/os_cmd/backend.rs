use super::{ProcessControl, ProcessSource, validate_dispatch};
use crate::error::{PolicyError, PolicyResult};
use crate::models::{CoreMask, PowerPlan, ProcessSnapshot, TrimMode};
use os_api::{OS, PriorityClass, SystemProbe, TrimScope};

/// The real machine.
#[derive(Default)]
pub struct OsBackend {
    probe: SystemProbe,
}

impl OsBackend {
    pub fn new() -> Self {
        Self {
            probe: SystemProbe::new(),
        }
    }
}

fn dispatch_failed(pid: u32) -> impl FnOnce(String) -> PolicyError {
    move |reason| PolicyError::DispatchFailed { pid, reason }
}

impl ProcessSource for OsBackend {
    fn list_processes(&self) -> PolicyResult<Vec<ProcessSnapshot>> {
        self.probe
            .processes()
            .map(|entries| entries.into_iter().map(ProcessSnapshot::from).collect())
            .map_err(PolicyError::EnumerationFailed)
    }

    fn memory_usage_percent(&self) -> PolicyResult<f32> {
        self.probe
            .memory_usage_percent()
            .map_err(PolicyError::EnumerationFailed)
    }

    fn process_priority(&self, pid: u32) -> PolicyResult<PriorityClass> {
        OS::get_process_priority(pid).map_err(dispatch_failed(pid))
    }

    fn foreground_pid(&self) -> Option<u32> {
        OS::get_foreground_pid()
    }
}

impl ProcessControl for OsBackend {
    fn apply_affinity_and_priority(
        &self,
        pid: u32,
        mask: &CoreMask,
        priority: Option<PriorityClass>,
        primary_thread: Option<CoreMask>,
    ) -> PolicyResult<()> {
        validate_dispatch(pid, mask)?;

        OS::set_process_affinity_by_cores(pid, &mask.cores()).map_err(dispatch_failed(pid))?;
        if let Some(priority) = priority {
            OS::set_process_priority_by_pid(pid, priority).map_err(dispatch_failed(pid))?;
        }
        if let Some(thread_mask) = primary_thread {
            // The process mask is already in place; a missing main thread is not fatal.
            if let Err(e) = OS::set_main_thread_affinity(pid, &thread_mask.cores()) {
                tracing::warn!("Main thread pinning for pid {} failed: {}", pid, e);
            }
        }
        Ok(())
    }

    fn set_priority(&self, pid: u32, priority: PriorityClass) -> PolicyResult<()> {
        if pid == 0 {
            return Err(PolicyError::InvalidPid(pid));
        }
        OS::set_process_priority_by_pid(pid, priority).map_err(dispatch_failed(pid))
    }

    fn request_trim(&self, mode: TrimMode) -> PolicyResult<()> {
        let scope = match mode {
            TrimMode::StandbyOnly => TrimScope::StandbyOnly,
            TrimMode::WorkingSet => TrimScope::WorkingSet,
        };
        OS::trim_memory(scope).map_err(|reason| PolicyError::SideEffectFailed {
            action: "memory trim",
            reason,
        })
    }

    fn switch_power_plan(&self, plan: PowerPlan) -> PolicyResult<()> {
        OS::switch_power_plan(plan.guid()).map_err(|reason| PolicyError::SideEffectFailed {
            action: "power plan switch",
            reason,
        })
    }
}
