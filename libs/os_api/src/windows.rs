use std::mem::size_of;
use std::process::Command;

use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, TH32CS_SNAPTHREAD, THREADENTRY32, Thread32First, Thread32Next,
};
use windows::Win32::System::ProcessStatus::{K32EmptyWorkingSet, K32EnumProcesses};
use windows::Win32::System::Threading::{
    ABOVE_NORMAL_PRIORITY_CLASS, BELOW_NORMAL_PRIORITY_CLASS, GetPriorityClass,
    HIGH_PRIORITY_CLASS, IDLE_PRIORITY_CLASS, NORMAL_PRIORITY_CLASS, OpenProcess, OpenThread,
    PROCESS_ACCESS_RIGHTS, PROCESS_CREATION_FLAGS, PROCESS_QUERY_INFORMATION,
    PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_SET_INFORMATION, PROCESS_SET_QUOTA,
    REALTIME_PRIORITY_CLASS, SetPriorityClass, SetProcessAffinityMask, SetThreadAffinityMask,
    THREAD_QUERY_INFORMATION, THREAD_SET_INFORMATION,
};
use windows::Win32::UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowThreadProcessId};

use winreg::RegKey;
use winreg::enums::*;

use crate::{PriorityClass, TrimScope};

// ---- internal error type (public API still returns String) ----
#[derive(Debug)]
enum OsError {
    Win(windows::core::Error),
    Msg(String),
}

impl std::fmt::Display for OsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsError::Win(e) => write!(f, "{e}"),
            OsError::Msg(s) => write!(f, "{s}"),
        }
    }
}

impl From<windows::core::Error> for OsError {
    fn from(e: windows::core::Error) -> Self {
        Self::Win(e)
    }
}

// ---- tiny RAII helper ----
struct HandleGuard(HANDLE);
impl Drop for HandleGuard {
    fn drop(&mut self) {
        unsafe {
            if !self.0.is_invalid() {
                let _ = CloseHandle(self.0);
            }
        }
    }
}

pub struct OS;

impl OS {
    // ---- helpers ----

    fn open_process(pid: u32, access: PROCESS_ACCESS_RIGHTS) -> Result<HANDLE, OsError> {
        unsafe { Ok(OpenProcess(access, false, pid)?) }
    }

    // Affinity masks on Windows cover one processor group (64 logical cores).
    fn compose_mask_from_cores(cores: &[usize]) -> Result<usize, OsError> {
        let mut mask = 0usize;
        for &i in cores {
            let bit = 1usize.checked_shl(i as u32).ok_or_else(|| {
                OsError::Msg(format!("core index {} out of range for affinity mask", i))
            })?;
            mask |= bit;
        }
        if mask == 0 {
            return Err(OsError::Msg("affinity mask is empty".into()));
        }
        Ok(mask)
    }

    // helper: map our PriorityClass to WinAPI constant
    fn transform_to_win_priority(p: PriorityClass) -> PROCESS_CREATION_FLAGS {
        match p {
            PriorityClass::Idle => IDLE_PRIORITY_CLASS,
            PriorityClass::BelowNormal => BELOW_NORMAL_PRIORITY_CLASS,
            PriorityClass::Normal => NORMAL_PRIORITY_CLASS,
            PriorityClass::AboveNormal => ABOVE_NORMAL_PRIORITY_CLASS,
            PriorityClass::High => HIGH_PRIORITY_CLASS,
            PriorityClass::RealTime => REALTIME_PRIORITY_CLASS,
        }
    }

    // helper: map WinAPI priority constant to our PriorityClass
    fn from_win_priority(p: u32) -> PriorityClass {
        match p {
            x if x == IDLE_PRIORITY_CLASS.0 => PriorityClass::Idle,
            x if x == BELOW_NORMAL_PRIORITY_CLASS.0 => PriorityClass::BelowNormal,
            x if x == ABOVE_NORMAL_PRIORITY_CLASS.0 => PriorityClass::AboveNormal,
            x if x == HIGH_PRIORITY_CLASS.0 => PriorityClass::High,
            x if x == REALTIME_PRIORITY_CLASS.0 => PriorityClass::RealTime,
            _ => PriorityClass::Normal,
        }
    }

    // The first thread listed for a process in a toolhelp snapshot is its main thread.
    fn main_thread_id(pid: u32) -> Result<u32, OsError> {
        unsafe {
            let snap = CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0)?;
            let _hg = HandleGuard(snap);

            let mut te: THREADENTRY32 = std::mem::zeroed();
            te.dwSize = size_of::<THREADENTRY32>() as u32;

            Thread32First(snap, &mut te)?;
            loop {
                if te.th32OwnerProcessID == pid {
                    return Ok(te.th32ThreadID);
                }
                if Thread32Next(snap, &mut te).is_err() {
                    break;
                }
            }
        }
        Err(OsError::Msg(format!("no threads found for process {}", pid)))
    }

    fn enum_processes() -> Vec<u32> {
        // K32EnumProcesses needs retry with growing buffer.
        let mut cap = 1024usize;
        loop {
            let mut buf = vec![0u32; cap];
            let mut needed = 0u32;
            let ok =
                unsafe { K32EnumProcesses(buf.as_mut_ptr(), (buf.len() * 4) as u32, &mut needed) }
                    .as_bool();
            if !ok {
                return Vec::new();
            }

            let count = needed as usize / 4;
            if count < buf.len() {
                buf.truncate(count);
                return buf;
            }

            cap *= 2;
            if cap > 1_048_576 {
                buf.truncate(count);
                return buf;
            }
        }
    }

    // ---- public API ----

    /// Gets the current priority class for a process.
    pub fn get_process_priority(pid: u32) -> Result<PriorityClass, String> {
        (|| unsafe {
            let handle = Self::open_process(pid, PROCESS_QUERY_LIMITED_INFORMATION)
                .or_else(|_| Self::open_process(pid, PROCESS_QUERY_INFORMATION))?;
            let _hg = HandleGuard(handle);

            let priority = GetPriorityClass(handle);
            if priority == 0 {
                return Err(OsError::Msg("GetPriorityClass returned 0".into()));
            }
            Ok(Self::from_win_priority(priority))
        })()
        .map_err(|e: OsError| format!("Failed to get priority for process {}: {}", pid, e))
    }

    /// Sets the CPU affinity mask for a process by PID.
    ///
    /// **Note:** On systems with more than 64 logical CPUs (Processor Groups),
    /// this function only sets the affinity for the current processor group.
    pub fn set_process_affinity_by_cores(pid: u32, cores: &[usize]) -> Result<(), String> {
        (|| unsafe {
            let mask = Self::compose_mask_from_cores(cores)?;
            let handle = Self::open_process(pid, PROCESS_SET_INFORMATION)?;
            let _hg = HandleGuard(handle);

            SetProcessAffinityMask(handle, mask)?;
            Ok(())
        })()
        .map_err(|e: OsError| format!("Failed to set affinity mask for process {}: {}", pid, e))
    }

    /// Pins only the main thread of the process to `cores`.
    pub fn set_main_thread_affinity(pid: u32, cores: &[usize]) -> Result<(), String> {
        (|| unsafe {
            let mask = Self::compose_mask_from_cores(cores)?;
            let tid = Self::main_thread_id(pid)?;
            let handle = OpenThread(THREAD_SET_INFORMATION | THREAD_QUERY_INFORMATION, false, tid)?;
            let _hg = HandleGuard(handle);

            if SetThreadAffinityMask(handle, mask) == 0 {
                return Err(OsError::Win(windows::core::Error::from_thread()));
            }
            Ok(())
        })()
        .map_err(|e: OsError| format!("Failed to pin main thread of process {}: {}", pid, e))
    }

    /// Sets the priority class for a process by PID.
    pub fn set_process_priority_by_pid(pid: u32, priority: PriorityClass) -> Result<(), String> {
        (|| unsafe {
            let handle = Self::open_process(pid, PROCESS_SET_INFORMATION)?;
            let _hg = HandleGuard(handle);

            SetPriorityClass(handle, Self::transform_to_win_priority(priority))?;
            Ok(())
        })()
        .map_err(|e: OsError| format!("Failed to set priority for process {}: {}", pid, e))
    }

    /// Releases memory either from the standby list or from process working sets.
    pub fn trim_memory(scope: TrimScope) -> Result<(), String> {
        match scope {
            TrimScope::StandbyOnly => Self::purge_standby_list(),
            TrimScope::WorkingSet => {
                let current = std::process::id();
                let mut trimmed = 0usize;
                for pid in Self::enum_processes() {
                    if pid == 0 || pid == current {
                        continue;
                    }
                    let Ok(handle) = Self::open_process(
                        pid,
                        PROCESS_SET_QUOTA | PROCESS_QUERY_LIMITED_INFORMATION,
                    ) else {
                        continue;
                    };
                    let _hg = HandleGuard(handle);
                    if unsafe { K32EmptyWorkingSet(handle) }.as_bool() {
                        trimmed += 1;
                    }
                }
                if trimmed == 0 {
                    return Err("no working set could be trimmed".into());
                }
                Ok(())
            }
        }
    }

    // Requires SeProfileSingleProcessPrivilege; the NTSTATUS is surfaced as-is.
    fn purge_standby_list() -> Result<(), String> {
        use ntapi::ntexapi::{NtSetSystemInformation, SystemMemoryListInformation};

        const MEMORY_PURGE_STANDBY_LIST: u32 = 4;
        let mut command = MEMORY_PURGE_STANDBY_LIST;
        let status = unsafe {
            NtSetSystemInformation(
                SystemMemoryListInformation,
                &mut command as *mut u32 as *mut _,
                size_of::<u32>() as u32,
            )
        };
        if status < 0 {
            return Err(format!("NtSetSystemInformation failed: {:#x}", status));
        }
        Ok(())
    }

    /// Pid owning the window the user is currently working in.
    pub fn get_foreground_pid() -> Option<u32> {
        unsafe {
            let hwnd = GetForegroundWindow();
            if hwnd.is_invalid() {
                return None;
            }
            let mut pid = 0u32;
            GetWindowThreadProcessId(hwnd, Some(&mut pid));
            (pid != 0).then_some(pid)
        }
    }

    pub fn switch_power_plan(guid: &str) -> Result<(), String> {
        let output = Command::new("powercfg")
            .args(["/setactive", guid])
            .output()
            .map_err(|e| format!("Failed to execute powercfg: {}", e))?;

        if !output.status.success() {
            return Err(format!(
                "powercfg /setactive {} failed: {}",
                guid,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }

    pub fn get_cpu_model() -> String {
        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        hklm.open_subkey(r"HARDWARE\DESCRIPTION\System\CentralProcessor\0")
            .and_then(|key| {
                let s: String = key.get_value("ProcessorNameString")?;
                Ok(s.trim_matches(|c: char| c.is_whitespace() || c == '\0')
                    .to_string())
            })
            .unwrap_or_else(|_| "Unknown CPU".to_string())
    }
}
