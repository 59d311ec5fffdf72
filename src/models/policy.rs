use crate::models::CoreMask;
use crate::models::cpu_schema::half_split;
use os_api::PriorityClass;
use serde::{Deserialize, Serialize};

/// How a profile's mask is turned into the applied mask and priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SchedulingMode {
    /// Mask as given, caller-chosen priority.
    #[default]
    #[serde(rename = "dynamic")]
    Dynamic,
    /// Collapse to one core, High priority.
    #[serde(rename = "static")]
    Static,
    /// One thread per physical core on wide masks, High priority.
    #[serde(rename = "d2", alias = "balanced")]
    Balanced,
    /// Avoid core 0, RealTime priority, Ultimate Performance power plan.
    #[serde(rename = "d3", alias = "ultimate")]
    Ultimate,
}

impl SchedulingMode {
    /// Priority implied by the mode; `None` means the caller's priority is used.
    pub fn implied_priority(&self) -> Option<PriorityClass> {
        match self {
            SchedulingMode::Dynamic => None,
            SchedulingMode::Static | SchedulingMode::Balanced => Some(PriorityClass::High),
            SchedulingMode::Ultimate => Some(PriorityClass::RealTime),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_normal() -> PriorityClass {
    PriorityClass::Normal
}

/// A user-saved per-process override.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyProfile {
    /// Executable name as the user typed it; matched case-insensitively.
    #[serde(rename = "name")]
    pub process_name: String,
    #[serde(alias = "affinity")]
    pub mask: CoreMask,
    #[serde(default)]
    pub mode: SchedulingMode,
    #[serde(default = "default_normal")]
    pub priority: PriorityClass,
    #[serde(default)]
    pub primary_core: Option<usize>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Unix seconds of the last save.
    #[serde(default, alias = "timestamp")]
    pub saved_at: u64,
}

impl PolicyProfile {
    pub fn new(process_name: impl Into<String>, mask: CoreMask, mode: SchedulingMode) -> Self {
        Self {
            process_name: process_name.into(),
            mask,
            mode,
            priority: PriorityClass::Normal,
            primary_core: None,
            enabled: true,
            saved_at: 0,
        }
    }

    pub fn with_priority(mut self, priority: PriorityClass) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_primary_core(mut self, core: usize) -> Self {
        self.primary_core = Some(core);
        self
    }

    /// Lower-cased lookup key.
    pub fn key(&self) -> String {
        self.process_name.to_lowercase()
    }
}

fn default_game_priority() -> PriorityClass {
    PriorityClass::High
}

fn default_system_priority() -> PriorityClass {
    PriorityClass::BelowNormal
}

/// Fallback classification for processes without a profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DefaultRules {
    pub enabled: bool,
    pub game_mask: Option<CoreMask>,
    pub system_mask: Option<CoreMask>,
    #[serde(default = "default_game_priority")]
    pub game_priority: PriorityClass,
    #[serde(default = "default_system_priority")]
    pub system_priority: PriorityClass,
}

impl Default for DefaultRules {
    fn default() -> Self {
        Self {
            enabled: false,
            game_mask: None,
            system_mask: None,
            game_priority: PriorityClass::High,
            system_priority: PriorityClass::BelowNormal,
        }
    }
}

impl DefaultRules {
    /// Configured masks, with unset ones taken from the half split of `total_cores`.
    /// A single core cannot be split, so both sides then get all of it.
    pub fn resolve_masks(&self, total_cores: usize) -> (CoreMask, CoreMask) {
        let (game_half, system_half) = if total_cores < 2 {
            let all = CoreMask::from_range(total_cores);
            (all, all)
        } else {
            half_split(total_cores)
        };
        (
            self.game_mask.unwrap_or(game_half),
            self.system_mask.unwrap_or(system_half),
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TrimMode {
    #[default]
    StandbyOnly,
    WorkingSet,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SmartTrimConfig {
    pub enabled: bool,
    #[serde(alias = "threshold")]
    pub threshold_percent: f32,
    #[serde(alias = "interval")]
    pub interval_seconds: u64,
    pub mode: TrimMode,
}

impl Default for SmartTrimConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_percent: 80.0,
            interval_seconds: 30,
            mode: TrimMode::StandbyOnly,
        }
    }
}

/// Load-triggered restraint of busy background processes while a game runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProBalanceConfig {
    pub enabled: bool,
    /// Total CPU percentage above which background processes are restrained.
    pub cpu_threshold: f32,
    pub restrain_priority: PriorityClass,
    pub excluded_processes: Vec<String>,
}

impl Default for ProBalanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cpu_threshold: 50.0,
            restrain_priority: PriorityClass::BelowNormal,
            excluded_processes: vec!["explorer.exe".to_string()],
        }
    }
}

/// Power schemes the engine may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerPlan {
    UltimatePerformance,
}

impl PowerPlan {
    pub fn guid(&self) -> &'static str {
        match self {
            PowerPlan::UltimatePerformance => os_api::ULTIMATE_PERFORMANCE_PLAN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_accepts_legacy_field_names() {
        let json = r#"{
            "name": "CS2.exe",
            "affinity": "FF",
            "mode": "d3",
            "priority": "RealTime",
            "timestamp": 1700000000
        }"#;
        let profile: PolicyProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.key(), "cs2.exe");
        assert_eq!(profile.mask, CoreMask::from(0xFF));
        assert_eq!(profile.mode, SchedulingMode::Ultimate);
        assert_eq!(profile.priority, PriorityClass::RealTime);
        assert!(profile.enabled);
        assert_eq!(profile.saved_at, 1_700_000_000);
    }

    #[test]
    fn modes_imply_priorities() {
        assert_eq!(SchedulingMode::Dynamic.implied_priority(), None);
        assert_eq!(SchedulingMode::Static.implied_priority(), Some(PriorityClass::High));
        assert_eq!(SchedulingMode::Balanced.implied_priority(), Some(PriorityClass::High));
        assert_eq!(SchedulingMode::Ultimate.implied_priority(), Some(PriorityClass::RealTime));
    }

    #[test]
    fn default_rules_fall_back_to_half_split() {
        let rules = DefaultRules {
            system_mask: Some(CoreMask::from(0x80)),
            ..DefaultRules::default()
        };
        let (game, system) = rules.resolve_masks(8);
        assert_eq!(game, CoreMask::from(0x0F));
        assert_eq!(system, CoreMask::from(0x80));
    }

    #[test]
    fn single_core_machines_share_the_only_core() {
        let (game, system) = DefaultRules::default().resolve_masks(1);
        assert_eq!(game, CoreMask::from(1));
        assert_eq!(system, CoreMask::from(1));
    }

    #[test]
    fn smart_trim_reads_short_keys() {
        let cfg: SmartTrimConfig =
            serde_json::from_str(r#"{"enabled":true,"threshold":75,"interval":10,"mode":"working-set"}"#)
                .unwrap();
        assert_eq!(cfg.threshold_percent, 75.0);
        assert_eq!(cfg.interval_seconds, 10);
        assert_eq!(cfg.mode, TrimMode::WorkingSet);
    }
}
