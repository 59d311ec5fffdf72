use crate::error::{PolicyError, PolicyResult};
use crate::models::{
    CoreMask, DefaultRules, PolicyProfile, ProBalanceConfig, SchedulingMode, SmartTrimConfig,
};
use os_api::PriorityClass;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current version of the engine config schema
pub const CURRENT_CONFIG_VERSION: u32 = 2;

pub const CONFIG_FILE_NAME: &str = "engine.json";

fn default_exclude_list() -> Vec<String> {
    [
        "system",
        "idle",
        "registry",
        "explorer.exe",
        "csrss.exe",
        "wininit.exe",
        "winlogon.exe",
        "lsass.exe",
        "services.exe",
        "smss.exe",
        "dwm.exe",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_tick_interval() -> u64 {
    5
}

fn current_version() -> u32 {
    CURRENT_CONFIG_VERSION
}

/// Everything the engine reads from disk. Edited by the user, read-only to a tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "current_version")]
    pub version: u32,
    #[serde(default)]
    pub profiles: Vec<PolicyProfile>,
    #[serde(default)]
    pub default_rules: DefaultRules,
    #[serde(default)]
    pub game_list: Vec<String>,
    #[serde(default = "default_exclude_list")]
    pub exclude_list: Vec<String>,
    #[serde(default)]
    pub throttle_list: Vec<String>,
    #[serde(default)]
    pub smart_trim: SmartTrimConfig,
    #[serde(default)]
    pub pro_balance: ProBalanceConfig,
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_CONFIG_VERSION,
            profiles: Vec::new(),
            default_rules: DefaultRules::default(),
            game_list: Vec::new(),
            exclude_list: default_exclude_list(),
            throttle_list: Vec::new(),
            smart_trim: SmartTrimConfig::default(),
            pro_balance: ProBalanceConfig::default(),
            tick_interval_secs: default_tick_interval(),
        }
    }
}

// Version 1 files stored profiles with a raw `affinity` string and free-form mode/priority text.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct V1Profile {
    name: String,
    affinity: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    primary_core: Option<usize>,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    timestamp: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct V1EngineConfig {
    #[serde(default)]
    profiles: Vec<V1Profile>,
    #[serde(default)]
    default_rules: DefaultRules,
    #[serde(default)]
    game_list: Vec<String>,
    #[serde(default = "default_exclude_list")]
    exclude_list: Vec<String>,
    #[serde(default)]
    throttle_list: Vec<String>,
    #[serde(default)]
    smart_trim: SmartTrimConfig,
    #[serde(default)]
    pro_balance: ProBalanceConfig,
}

impl V1Profile {
    fn migrate(self) -> PolicyResult<PolicyProfile> {
        let mode = self
            .mode
            .and_then(|m| serde_json::from_value::<SchedulingMode>(Value::String(m.to_lowercase())).ok())
            .unwrap_or_default();
        let priority = self
            .priority
            .and_then(|p| PriorityClass::from_str(&p).ok())
            .unwrap_or(PriorityClass::Normal);

        Ok(PolicyProfile {
            process_name: self.name,
            mask: CoreMask::from_hex(&self.affinity)?,
            mode,
            priority,
            primary_core: self.primary_core,
            enabled: self.enabled.unwrap_or(true),
            saved_at: self.timestamp,
        })
    }
}

impl V1EngineConfig {
    fn migrate(self) -> PolicyResult<EngineConfig> {
        let profiles = self
            .profiles
            .into_iter()
            .map(V1Profile::migrate)
            .collect::<PolicyResult<Vec<_>>>()?;

        Ok(EngineConfig {
            version: CURRENT_CONFIG_VERSION,
            profiles,
            default_rules: self.default_rules,
            game_list: self.game_list,
            exclude_list: self.exclude_list,
            throttle_list: self.throttle_list,
            smart_trim: self.smart_trim,
            pro_balance: self.pro_balance,
            tick_interval_secs: default_tick_interval(),
        })
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn normalize_names(names: &mut Vec<String>) {
    for name in names.iter_mut() {
        *name = name.trim().to_lowercase();
    }
    names.retain(|n| !n.is_empty());
    let mut seen = HashSet::new();
    names.retain(|n| seen.insert(n.clone()));
}

fn parse_priority(value: &Value) -> PolicyResult<PriorityClass> {
    let text = value
        .as_str()
        .ok_or_else(|| PolicyError::InvalidPriority(value.to_string()))?;
    PriorityClass::from_str(text).map_err(|_| PolicyError::InvalidPriority(text.to_string()))
}

fn from_value<T: serde::de::DeserializeOwned>(key: &str, value: Value) -> PolicyResult<T> {
    serde_json::from_value(value).map_err(|e| PolicyError::Config(format!("invalid value for '{key}': {e}")))
}

impl EngineConfig {
    /// `engine.json` in the executable's directory.
    pub fn default_path() -> PathBuf {
        std::env::current_exe()
            .map(|mut p| {
                p.set_file_name(CONFIG_FILE_NAME);
                p
            })
            .unwrap_or_else(|_| CONFIG_FILE_NAME.into())
    }

    /// Parses a config document, migrating older schema versions.
    pub fn from_json(data: &str) -> PolicyResult<Self> {
        #[derive(Deserialize)]
        struct VersionCheck {
            version: Option<u32>,
        }

        let v_check: VersionCheck = serde_json::from_str(data)?;
        let mut config = match v_check.version {
            Some(CURRENT_CONFIG_VERSION) => serde_json::from_str::<EngineConfig>(data)?,
            None | Some(1) => {
                tracing::info!("Migrating engine config from version 1");
                serde_json::from_str::<V1EngineConfig>(data)?.migrate()?
            }
            Some(other) => {
                return Err(PolicyError::Config(format!(
                    "unsupported config version {other}"
                )));
            }
        };
        config.normalize();
        Ok(config)
    }

    pub fn load(path: &Path) -> PolicyResult<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    /// Loads the config, writing a default file when none exists.
    ///
    /// A file that exists but cannot be parsed is left untouched and defaults are used.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            let config = Self::default();
            if let Err(e) = config.save(path) {
                tracing::warn!("Failed to write default config to {}: {}", path.display(), e);
            }
            return config;
        }

        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config from {}: {}; using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> PolicyResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn normalize(&mut self) {
        normalize_names(&mut self.game_list);
        normalize_names(&mut self.exclude_list);
        normalize_names(&mut self.throttle_list);
        normalize_names(&mut self.pro_balance.excluded_processes);
        if self.tick_interval_secs == 0 {
            self.tick_interval_secs = default_tick_interval();
        }
    }

    /// Saved profile for a lower-cased process name. Later entries win.
    pub fn profile_for(&self, name_lower: &str) -> Option<&PolicyProfile> {
        self.profiles.iter().rev().find(|p| p.key() == name_lower)
    }

    /// Adds or replaces the profile with the same lower-cased name.
    pub fn upsert_profile(&mut self, mut profile: PolicyProfile) {
        let key = profile.key();
        profile.saved_at = unix_now();
        self.profiles.retain(|p| p.key() != key);
        self.profiles.push(profile);
    }

    pub fn remove_profile(&mut self, name: &str) -> PolicyResult<PolicyProfile> {
        let key = name.to_lowercase();
        let index = self
            .profiles
            .iter()
            .rposition(|p| p.key() == key)
            .ok_or_else(|| PolicyError::Config(format!("no profile named '{name}'")))?;
        let removed = self.profiles.remove(index);
        self.profiles.retain(|p| p.key() != key);
        Ok(removed)
    }

    /// Lower-cased game list plus every profile key.
    pub fn game_names(&self) -> HashSet<String> {
        self.game_list
            .iter()
            .map(|n| n.to_lowercase())
            .chain(self.profiles.iter().map(PolicyProfile::key))
            .collect()
    }

    pub fn is_excluded(&self, name_lower: &str) -> bool {
        self.exclude_list.iter().any(|n| n == name_lower)
    }

    /// Replaces one top-level setting from a JSON value.
    pub fn set_value(&mut self, key: &str, value: Value) -> PolicyResult<()> {
        match key {
            "defaultRules" => self.default_rules = from_value(key, value)?,
            "gameList" => self.game_list = from_value(key, value)?,
            "excludeList" => self.exclude_list = from_value(key, value)?,
            "throttleList" => self.throttle_list = from_value(key, value)?,
            "smartTrim" => self.smart_trim = from_value(key, value)?,
            "proBalance" => self.pro_balance = from_value(key, value)?,
            "gamePriority" => self.default_rules.game_priority = parse_priority(&value)?,
            "systemPriority" => self.default_rules.system_priority = parse_priority(&value)?,
            "tickIntervalSecs" => {
                let secs: u64 = from_value(key, value)?;
                if secs == 0 {
                    return Err(PolicyError::Config("tickIntervalSecs must be positive".into()));
                }
                self.tick_interval_secs = secs;
            }
            other => return Err(PolicyError::Config(format!("unknown config key '{other}'"))),
        }
        self.normalize();
        Ok(())
    }
}
