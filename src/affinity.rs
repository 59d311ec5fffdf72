use crate::error::{PolicyError, PolicyResult};
use crate::models::{CoreMask, PowerPlan, SchedulingMode};
use os_api::PriorityClass;

/// Balanced mode only thins masks wider than this.
const BALANCED_THIN_ABOVE: u32 = 4;

/// Best-effort request emitted next to a plan. Never changes the plan itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    SwitchPowerPlan(PowerPlan),
}

/// What to apply to one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffinityPlan {
    pub mask: CoreMask,
    /// `None` leaves the priority untouched.
    pub priority: Option<PriorityClass>,
    /// Mask for the main thread only, within `mask`.
    pub primary_thread: Option<CoreMask>,
    pub side_effect: Option<SideEffect>,
}

/// Turns a profile's mode and mask into the concrete plan.
///
/// `requested` is only honoured by `Dynamic`; every other mode implies its own priority.
pub fn transform(
    mode: SchedulingMode,
    input: CoreMask,
    primary_core: Option<usize>,
    requested: Option<PriorityClass>,
) -> PolicyResult<AffinityPlan> {
    if input.is_empty() {
        return Err(PolicyError::EmptyMask);
    }

    let (mask, side_effect) = match mode {
        SchedulingMode::Dynamic => (input, None),
        SchedulingMode::Static => {
            let target = primary_core
                .filter(|&c| input.contains(c))
                .or_else(|| input.lowest_set_bit())
                .ok_or(PolicyError::EmptyMask)?;
            (CoreMask::single(target)?, None)
        }
        SchedulingMode::Balanced => {
            let mask = if input.count_ones() > BALANCED_THIN_ABOVE {
                let candidate = input & CoreMask::even_positions();
                if candidate.is_empty() { input } else { candidate }
            } else {
                input
            };
            (mask, None)
        }
        SchedulingMode::Ultimate => {
            let core0 = CoreMask::from(1);
            let mask = if input.contains(0) && input != core0 {
                input.and_not(&core0)
            } else {
                input
            };
            (mask, Some(SideEffect::SwitchPowerPlan(PowerPlan::UltimatePerformance)))
        }
    };

    let priority = mode.implied_priority().or(requested);

    let primary_thread = match (mode, primary_core) {
        (SchedulingMode::Static, _) | (_, None) => None,
        (_, Some(core)) if mask.contains(core) => Some(CoreMask::single(core)?),
        _ => None,
    };

    Ok(AffinityPlan {
        mask,
        priority,
        primary_thread,
        side_effect,
    })
}
