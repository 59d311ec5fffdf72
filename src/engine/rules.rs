use crate::affinity::{AffinityPlan, transform};
use crate::engine::state::PolicyEngineState;
use crate::error::PolicyResult;
use crate::models::{CoreMask, CpuTopology, EngineConfig, ProcessSnapshot, SchedulingMode};
use std::collections::HashSet;

/// Pids below this are reserved for the kernel and never touched.
pub const MIN_MANAGED_PID: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Handled,
    InFlight,
    ReservedPid,
    Excluded,
}

/// Which rule produced a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSource {
    Profile,
    DefaultGame,
    DefaultSystem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Skip(SkipReason),
    Apply { plan: AffinityPlan, source: RuleSource },
    /// No rule applies; the pid is looked at again next tick.
    NoRule,
}

/// Per-tick view of the config used to classify processes.
pub struct RuleEvaluator<'a> {
    config: &'a EngineConfig,
    game_names: HashSet<String>,
    game_mask: CoreMask,
    system_mask: CoreMask,
}

impl<'a> RuleEvaluator<'a> {
    pub fn new(config: &'a EngineConfig, topology: &CpuTopology) -> Self {
        let (game_mask, system_mask) = config.default_rules.resolve_masks(topology.total_cores);
        Self {
            config,
            game_names: config.game_names(),
            game_mask,
            system_mask,
        }
    }

    pub fn game_names(&self) -> &HashSet<String> {
        &self.game_names
    }

    /// First matching rule wins: handled, reserved and excluded pids are skipped,
    /// then an enabled profile, then the default rules.
    pub fn decide(&self, process: &ProcessSnapshot, state: &PolicyEngineState) -> PolicyResult<Decision> {
        if state.handled.contains(process.pid) {
            return Ok(Decision::Skip(SkipReason::Handled));
        }
        if state.is_in_flight(process.pid) {
            return Ok(Decision::Skip(SkipReason::InFlight));
        }
        if process.pid < MIN_MANAGED_PID {
            return Ok(Decision::Skip(SkipReason::ReservedPid));
        }

        let name = process.key();
        if self.config.is_excluded(&name) {
            return Ok(Decision::Skip(SkipReason::Excluded));
        }

        if let Some(profile) = self.config.profile_for(&name).filter(|p| p.enabled) {
            let plan = transform(
                profile.mode,
                profile.mask,
                profile.primary_core,
                Some(profile.priority),
            )?;
            return Ok(Decision::Apply {
                plan,
                source: RuleSource::Profile,
            });
        }

        let rules = &self.config.default_rules;
        if !rules.enabled {
            return Ok(Decision::NoRule);
        }

        let (mask, priority, source) = if self.game_names.contains(&name) {
            (self.game_mask, rules.game_priority, RuleSource::DefaultGame)
        } else {
            (self.system_mask, rules.system_priority, RuleSource::DefaultSystem)
        };
        let plan = transform(SchedulingMode::Dynamic, mask, None, Some(priority))?;
        Ok(Decision::Apply { plan, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PolicyProfile;
    use os_api::PriorityClass;

    fn topology() -> CpuTopology {
        CpuTopology::flat("test", 8).unwrap()
    }

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.upsert_profile(
            PolicyProfile::new("Game.exe", CoreMask::from(0xFF), SchedulingMode::Balanced),
        );
        config.game_list = vec!["other_game.exe".into()];
        config.default_rules.enabled = true;
        config
    }

    #[test]
    fn profile_beats_default_rules() {
        let config = config();
        let topology = topology();
        let evaluator = RuleEvaluator::new(&config, &topology);
        let state = PolicyEngineState::new();

        let decision = evaluator.decide(&ProcessSnapshot::new(500, "GAME.EXE"), &state).unwrap();
        let Decision::Apply { plan, source } = decision else {
            panic!("expected a plan");
        };
        assert_eq!(source, RuleSource::Profile);
        assert_eq!(plan.mask, CoreMask::from(0x55));
        assert_eq!(plan.priority, Some(PriorityClass::High));
    }

    #[test]
    fn default_rules_split_games_from_the_rest() {
        let config = config();
        let topology = topology();
        let evaluator = RuleEvaluator::new(&config, &topology);
        let state = PolicyEngineState::new();

        match evaluator.decide(&ProcessSnapshot::new(600, "other_game.exe"), &state).unwrap() {
            Decision::Apply { plan, source } => {
                assert_eq!(source, RuleSource::DefaultGame);
                assert_eq!(plan.mask, CoreMask::from(0x0F));
                assert_eq!(plan.priority, Some(PriorityClass::High));
            }
            other => panic!("unexpected {other:?}"),
        }

        match evaluator.decide(&ProcessSnapshot::new(601, "chrome.exe"), &state).unwrap() {
            Decision::Apply { plan, source } => {
                assert_eq!(source, RuleSource::DefaultSystem);
                assert_eq!(plan.mask, CoreMask::from(0xF0));
                assert_eq!(plan.priority, Some(PriorityClass::BelowNormal));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn skips_come_before_rules() {
        let config = config();
        let topology = topology();
        let evaluator = RuleEvaluator::new(&config, &topology);
        let mut state = PolicyEngineState::new();
        state.handled.insert(700);

        let decide = |pid, name: &str| evaluator.decide(&ProcessSnapshot::new(pid, name), &state).unwrap();
        assert_eq!(decide(700, "game.exe"), Decision::Skip(SkipReason::Handled));
        assert_eq!(decide(4, "game.exe"), Decision::Skip(SkipReason::ReservedPid));
        assert_eq!(decide(800, "Explorer.exe"), Decision::Skip(SkipReason::Excluded));
    }

    #[test]
    fn disabled_profile_falls_through() {
        let mut config = config();
        config.profiles[0].enabled = false;
        config.default_rules.enabled = false;
        let topology = topology();
        let evaluator = RuleEvaluator::new(&config, &topology);
        let state = PolicyEngineState::new();

        assert_eq!(
            evaluator.decide(&ProcessSnapshot::new(500, "game.exe"), &state).unwrap(),
            Decision::NoRule
        );
    }

    #[test]
    fn empty_configured_mask_is_rejected() {
        let mut config = config();
        config.default_rules.system_mask = Some(CoreMask::empty());
        let topology = topology();
        let evaluator = RuleEvaluator::new(&config, &topology);
        let state = PolicyEngineState::new();

        assert!(evaluator.decide(&ProcessSnapshot::new(900, "svc.exe"), &state).is_err());
    }
}
