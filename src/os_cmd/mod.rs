//! Seams between the policy engine and the operating system.
//!
//! The engine only talks to [`ProcessSource`] and [`ProcessControl`]. [`OsBackend`]
//! implements both on top of `os_api`; tests substitute mocks or recording fakes.

use crate::error::{PolicyError, PolicyResult};
use crate::models::{CoreMask, PowerPlan, ProcessSnapshot, TrimMode};
use os_api::PriorityClass;

mod backend;
pub use backend::OsBackend;

/// Read side: what is running and how loaded the machine is.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessSource: Send + Sync {
    fn list_processes(&self) -> PolicyResult<Vec<ProcessSnapshot>>;
    fn memory_usage_percent(&self) -> PolicyResult<f32>;
    fn process_priority(&self, pid: u32) -> PolicyResult<PriorityClass>;
    /// Owner of the focused window, if the platform has one.
    fn foreground_pid(&self) -> Option<u32>;
}

/// Write side. Calls may block on the OS; the engine runs them off the async threads.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessControl: Send + Sync {
    /// Applies `mask` to the whole process, then `priority` when given, then pins the
    /// main thread to `primary_thread` when given.
    fn apply_affinity_and_priority(
        &self,
        pid: u32,
        mask: &CoreMask,
        priority: Option<PriorityClass>,
        primary_thread: Option<CoreMask>,
    ) -> PolicyResult<()>;
    fn set_priority(&self, pid: u32, priority: PriorityClass) -> PolicyResult<()>;
    fn request_trim(&self, mode: TrimMode) -> PolicyResult<()>;
    fn switch_power_plan(&self, plan: PowerPlan) -> PolicyResult<()>;
}

/// Rejects dispatches that must never reach the OS.
pub fn validate_dispatch(pid: u32, mask: &CoreMask) -> PolicyResult<()> {
    if pid == 0 {
        return Err(PolicyError::InvalidPid(pid));
    }
    if mask.is_empty() {
        return Err(PolicyError::EmptyMask);
    }
    Ok(())
}
