use std::fs;
use std::io;
use std::str::FromStr;

use libc::{
    PRIO_PROCESS, SCHED_FIFO, SCHED_OTHER, SCHED_RR, getpriority, pid_t, sched_getscheduler, sched_param,
    sched_setscheduler, setpriority,
};
use nix::sched::{CpuSet, sched_setaffinity};
use nix::unistd::Pid;

use crate::{PriorityClass, TrimScope};

pub struct OS;

impl OS {
    // ---- helpers to reduce duplication ----
    fn cpuset_from_cores(cores: &[usize]) -> Result<CpuSet, String> {
        if cores.is_empty() {
            return Err("affinity mask is empty".into());
        }
        let mut cpu_set = CpuSet::new();
        for &i in cores {
            cpu_set
                .set(i)
                .map_err(|e| format!("core index {} out of range for affinity mask: {}", i, e))?;
        }
        Ok(cpu_set)
    }

    fn set_priority_for_pid(pid: pid_t, p: PriorityClass) -> Result<(), String> {
        match p {
            PriorityClass::RealTime => {
                let param = sched_param { sched_priority: 50 };
                let ret = unsafe { sched_setscheduler(pid, SCHED_FIFO, &param) };
                if ret == 0 {
                    Ok(())
                } else {
                    Err(io::Error::last_os_error().to_string())
                }
            }
            _ => {
                // Nice values are ignored under a realtime policy.
                let policy = unsafe { sched_getscheduler(pid) };
                if policy == SCHED_FIFO || policy == SCHED_RR {
                    let param = sched_param { sched_priority: 0 };
                    if unsafe { sched_setscheduler(pid, SCHED_OTHER, &param) } != 0 {
                        return Err(io::Error::last_os_error().to_string());
                    }
                }
                let nice = Self::to_nice(p);
                let ret = unsafe { setpriority(PRIO_PROCESS, pid as libc::id_t, nice) };
                if ret == 0 {
                    Ok(())
                } else {
                    Err(io::Error::last_os_error().to_string())
                }
            }
        }
    }

    fn to_nice(p: PriorityClass) -> i32 {
        match p {
            PriorityClass::Idle => 19,
            PriorityClass::BelowNormal => 10,
            PriorityClass::Normal => 0,
            PriorityClass::AboveNormal => -5,
            PriorityClass::High => -10,
            PriorityClass::RealTime => -20,
        }
    }

    /// Thread ids of a process, read from `/proc/{pid}/task`.
    fn thread_ids(pid: u32) -> Result<Vec<pid_t>, String> {
        let entries = fs::read_dir(format!("/proc/{}/task", pid))
            .map_err(|e| format!("process {} not found: {}", pid, e))?;

        let mut tids: Vec<pid_t> = entries
            .flatten()
            .filter_map(|entry| pid_t::from_str(&entry.file_name().to_string_lossy()).ok())
            .collect();
        tids.sort_unstable();
        Ok(tids)
    }

    /// Gets the current priority class for a process.
    pub fn get_process_priority(pid: u32) -> Result<PriorityClass, String> {
        let pid_t = pid as pid_t;
        // Realtime if scheduled with FIFO or RR
        let policy = unsafe { sched_getscheduler(pid_t) };
        if policy == SCHED_FIFO || policy == SCHED_RR {
            return Ok(PriorityClass::RealTime);
        }

        // getpriority returns -20..19; -1 is also an error marker, so errno must be checked.
        errno::set_errno(errno::Errno(0));
        let prio = unsafe { getpriority(PRIO_PROCESS, pid as libc::id_t) };
        let err = errno::errno().0;
        if prio == -1 && err != 0 {
            return Err(io::Error::last_os_error().to_string());
        }
        let p = match prio {
            n if n >= 15 => PriorityClass::Idle,
            n if n >= 5 => PriorityClass::BelowNormal,
            n if n >= -4 => PriorityClass::Normal,
            n if n >= -9 => PriorityClass::AboveNormal,
            _ /* <= -10 */ => PriorityClass::High,
        };
        Ok(p)
    }

    /// Restricts every thread of the process to `cores`.
    ///
    /// Linux affinity is per thread, so the whole `/proc/{pid}/task` list is walked.
    /// Threads that exit mid-walk are ignored; the call fails only if no thread took the mask.
    pub fn set_process_affinity_by_cores(pid: u32, cores: &[usize]) -> Result<(), String> {
        let cpu_set = Self::cpuset_from_cores(cores)?;
        let tids = Self::thread_ids(pid)?;

        let mut applied = 0usize;
        let mut last_error = None;
        for tid in tids {
            match sched_setaffinity(Pid::from_raw(tid), &cpu_set) {
                Ok(()) => applied += 1,
                Err(e) => last_error = Some(e.to_string()),
            }
        }

        if applied == 0 {
            return Err(format!(
                "Failed to set affinity for process {}: {}",
                pid,
                last_error.unwrap_or_else(|| "no threads".into())
            ));
        }
        Ok(())
    }

    /// Pins only the main thread (tid == pid) to `cores`.
    pub fn set_main_thread_affinity(pid: u32, cores: &[usize]) -> Result<(), String> {
        let cpu_set = Self::cpuset_from_cores(cores)?;
        sched_setaffinity(Pid::from_raw(pid as pid_t), &cpu_set)
            .map_err(|e| format!("Failed to pin main thread of process {}: {}", pid, e))
    }

    /// Sets the priority class for a process by PID.
    pub fn set_process_priority_by_pid(pid: u32, priority: PriorityClass) -> Result<(), String> {
        Self::set_priority_for_pid(pid as pid_t, priority)
            .map_err(|e| format!("Failed to set priority for process {}: {}", pid, e))
    }

    /// Releases cached memory. Needs root; working-set trimming has no Linux equivalent.
    pub fn trim_memory(scope: TrimScope) -> Result<(), String> {
        match scope {
            TrimScope::StandbyOnly => {
                unsafe { libc::sync() };
                fs::write("/proc/sys/vm/drop_caches", "1")
                    .map_err(|e| format!("Failed to drop page cache: {}", e))
            }
            TrimScope::WorkingSet => Err("working set trimming is not supported on Linux".into()),
        }
    }

    /// No compositor-independent notion of a focused window.
    pub fn get_foreground_pid() -> Option<u32> {
        None
    }

    pub fn switch_power_plan(guid: &str) -> Result<(), String> {
        Err(format!("power plan {} is not available on Linux", guid))
    }

    pub fn get_cpu_model() -> String {
        std::fs::read_to_string("/proc/cpuinfo")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|line| line.starts_with("model name"))
                    .and_then(|line| line.split(':').nth(1))
                    .map(|s| s.trim().to_string())
            })
            .unwrap_or_else(|| "Unknown CPU".to_string())
    }
}
