use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scheduling priority tiers, ordered from lowest to highest.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityClass {
    #[serde(alias = "idle")]
    Idle,
    #[serde(alias = "belownormal", alias = "below_normal")]
    BelowNormal,
    #[serde(alias = "normal")]
    Normal,
    #[serde(alias = "abovenormal", alias = "above_normal")]
    AboveNormal,
    #[serde(alias = "high")]
    High,
    #[serde(alias = "Realtime", alias = "realtime")]
    RealTime,
}

impl PriorityClass {
    pub const ALL: [PriorityClass; 6] = [
        PriorityClass::Idle,
        PriorityClass::BelowNormal,
        PriorityClass::Normal,
        PriorityClass::AboveNormal,
        PriorityClass::High,
        PriorityClass::RealTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityClass::Idle => "Idle",
            PriorityClass::BelowNormal => "BelowNormal",
            PriorityClass::Normal => "Normal",
            PriorityClass::AboveNormal => "AboveNormal",
            PriorityClass::High => "High",
            PriorityClass::RealTime => "RealTime",
        }
    }
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorityClass {
    type Err = String;

    /// Case-insensitive; accepts `_`/`-`/space separated spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match key.as_str() {
            "idle" => Ok(PriorityClass::Idle),
            "belownormal" => Ok(PriorityClass::BelowNormal),
            "normal" => Ok(PriorityClass::Normal),
            "abovenormal" => Ok(PriorityClass::AboveNormal),
            "high" => Ok(PriorityClass::High),
            "realtime" => Ok(PriorityClass::RealTime),
            _ => Err(format!("unknown priority class '{s}'")),
        }
    }
}

/// One row of a process listing.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
    /// Share of the whole machine, 0.0 - 100.0.
    pub cpu_usage: f32,
}
