mod probe;
mod process;
pub use probe::SystemProbe;
pub use process::{PriorityClass, ProcessEntry};

#[cfg(target_os = "windows")]
mod windows;
#[cfg(target_os = "linux")]
mod linux;

// Platform implementation behind one name
#[cfg(target_os = "windows")]
pub use windows::OS;
#[cfg(target_os = "linux")]
pub use linux::OS;

/// GUID of the "Ultimate Performance" Windows power scheme.
pub const ULTIMATE_PERFORMANCE_PLAN: &str = "e9a42b02-d5df-448d-aa00-03f14749eb61";

/// What a memory trim is allowed to release.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrimScope {
    /// Cached/standby pages only.
    StandbyOnly,
    /// Working sets of every process we can open.
    WorkingSet,
}
