use crate::engine::blocking;
use crate::engine::rules::MIN_MANAGED_PID;
use crate::engine::throttle::restore_priorities;
use crate::models::{EngineConfig, ProcessSnapshot};
use crate::os_cmd::{ProcessControl, ProcessSource};
use os_api::PriorityClass;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Processes under this share of the machine are left alone.
const MIN_RESTRAIN_CPU: f32 = 1.0;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BalanceOutcome {
    pub restrained: usize,
    pub released: usize,
}

fn restrainable_priority(priority: PriorityClass) -> bool {
    matches!(
        priority,
        PriorityClass::Normal | PriorityClass::AboveNormal | PriorityClass::High
    )
}

/// Lowers busy background processes while a game runs and the machine is loaded.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    config: &EngineConfig,
    game_names: &HashSet<String>,
    game_running: bool,
    snapshot: &[ProcessSnapshot],
    in_flight: &HashSet<u32>,
    throttled: &HashMap<u32, PriorityClass>,
    restrained: &mut HashMap<u32, PriorityClass>,
    source: &Arc<dyn ProcessSource>,
    control: &Arc<dyn ProcessControl>,
) -> BalanceOutcome {
    let settings = &config.pro_balance;
    let total_cpu: f32 = snapshot.iter().map(|p| p.cpu_usage).sum();

    if !settings.enabled || !game_running || total_cpu <= settings.cpu_threshold {
        let released = if restrained.is_empty() {
            0
        } else {
            restore_priorities(restrained, control, "restrained").await
        };
        return BalanceOutcome {
            restrained: 0,
            released,
        };
    }

    // The window the user is working in is never restrained.
    let src = source.clone();
    let foreground = blocking(move || Ok(src.foreground_pid())).await.ok().flatten();

    let mut outcome = BalanceOutcome::default();
    for process in snapshot {
        let pid = process.pid;
        let name = process.key();
        if pid < MIN_MANAGED_PID
            || Some(pid) == foreground
            || process.cpu_usage < MIN_RESTRAIN_CPU
            || restrained.contains_key(&pid)
            || throttled.contains_key(&pid)
            || in_flight.contains(&pid)
            || game_names.contains(&name)
            || config.is_excluded(&name)
            || config.throttle_list.contains(&name)
            || settings.excluded_processes.contains(&name)
        {
            continue;
        }

        let src = source.clone();
        let Ok(current) = blocking(move || src.process_priority(pid)).await else {
            continue;
        };
        if !restrainable_priority(current) {
            continue;
        }

        let ctl = control.clone();
        let target = settings.restrain_priority;
        match blocking(move || ctl.set_priority(pid, target)).await {
            Ok(()) => {
                tracing::info!(
                    "Restrained {} (pid {}, {:.1}% CPU) from {} to {}",
                    process.name,
                    pid,
                    process.cpu_usage,
                    current,
                    target
                );
                restrained.insert(pid, current);
                outcome.restrained += 1;
            }
            Err(e) => tracing::debug!("Restraining {} (pid {}) failed: {}", process.name, pid, e),
        }
    }
    outcome
}
