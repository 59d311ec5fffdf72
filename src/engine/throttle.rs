use crate::engine::blocking;
use crate::models::ProcessSnapshot;
use crate::os_cmd::{ProcessControl, ProcessSource};
use os_api::PriorityClass;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleOutcome {
    pub throttled: usize,
    pub restored: usize,
}

pub fn is_game_running(snapshot: &[ProcessSnapshot], game_names: &HashSet<String>) -> bool {
    snapshot.iter().any(|p| game_names.contains(&p.key()))
}

/// Drops background processes to Idle while a game runs and puts them back once
/// no game is left. The state is all-or-nothing on the aggregate game signal.
pub async fn run(
    throttle_list: &[String],
    game_running: bool,
    snapshot: &[ProcessSnapshot],
    in_flight: &HashSet<u32>,
    throttled: &mut HashMap<u32, PriorityClass>,
    source: &Arc<dyn ProcessSource>,
    control: &Arc<dyn ProcessControl>,
) -> ThrottleOutcome {
    let mut outcome = ThrottleOutcome::default();
    if throttle_list.is_empty() {
        return outcome;
    }

    if !game_running {
        if !throttled.is_empty() {
            outcome.restored = restore_priorities(throttled, control, "throttled").await;
        }
        return outcome;
    }

    for process in snapshot {
        if throttled.contains_key(&process.pid)
            || in_flight.contains(&process.pid)
            || !throttle_list.contains(&process.key())
        {
            continue;
        }

        let pid = process.pid;
        let src = source.clone();
        let original = blocking(move || src.process_priority(pid))
            .await
            .unwrap_or(PriorityClass::Normal);

        let ctl = control.clone();
        match blocking(move || ctl.set_priority(pid, PriorityClass::Idle)).await {
            Ok(()) => tracing::info!("Throttled {} (pid {}) to Idle", process.name, pid),
            Err(e) => tracing::warn!("Throttling {} (pid {}) failed: {}", process.name, pid, e),
        }
        // Recorded either way so the restore pass covers it.
        throttled.insert(pid, original);
        outcome.throttled += 1;
    }
    outcome
}

/// Puts every recorded pid back to its original priority and clears the map,
/// even when some restores fail.
pub(crate) async fn restore_priorities(
    entries: &mut HashMap<u32, PriorityClass>,
    control: &Arc<dyn ProcessControl>,
    what: &str,
) -> usize {
    let mut restored = 0;
    for (pid, original) in entries.drain() {
        let ctl = control.clone();
        match blocking(move || ctl.set_priority(pid, original)).await {
            Ok(()) => restored += 1,
            Err(e) => tracing::debug!("Restoring {} pid {} to {} failed: {}", what, pid, original, e),
        }
    }
    if restored > 0 {
        tracing::info!("Restored {} {} process(es)", restored, what);
    }
    restored
}
