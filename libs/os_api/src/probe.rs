//! sysinfo-backed process listing and memory statistics.

use std::sync::Mutex;
use sysinfo::{ProcessesToUpdate, System};

use crate::ProcessEntry;

/// Long-lived view of the machine. CPU usage per process is a delta between
/// two refreshes, so the first listing reports 0% for everything.
pub struct SystemProbe {
    system: Mutex<System>,
}

impl SystemProbe {
    pub fn new() -> Self {
        let mut system = System::new_all();
        system.refresh_all();
        Self {
            system: Mutex::new(system),
        }
    }

    /// Returns all running processes with their executable names.
    pub fn processes(&self) -> Result<Vec<ProcessEntry>, String> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| "system probe lock poisoned".to_string())?;

        system.refresh_processes(ProcessesToUpdate::All, true);

        let core_count = system.cpus().len().max(1) as f32;
        let entries = system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().to_string(),
                cpu_usage: process.cpu_usage() / core_count,
            })
            .collect();

        Ok(entries)
    }

    /// Used physical memory as a percentage of the total.
    pub fn memory_usage_percent(&self) -> Result<f32, String> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| "system probe lock poisoned".to_string())?;

        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return Err("total memory reported as zero".into());
        }
        Ok((system.used_memory() as f64 / total as f64 * 100.0) as f32)
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}
