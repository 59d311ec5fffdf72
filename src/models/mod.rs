/// Fixed-width core bitset
pub mod core_mask;
/// CPU model lookup table and brand-string normalization
pub mod cpu_presets;
/// Logical core partitioning
pub mod cpu_schema;
/// Persisted engine configuration
mod engine_config;
/// Profiles, default rules and auxiliary loop settings
mod policy;
mod process;

// Public re-exports of key structures for use in other modules
pub use core_mask::CoreMask;
pub use cpu_presets::topology_for_model;
pub use cpu_schema::{CoreType, CorePartition, CpuArchitecture, CpuTopology, LogicalCore};
pub use engine_config::{CONFIG_FILE_NAME, CURRENT_CONFIG_VERSION, EngineConfig};
pub use policy::{
    DefaultRules, PolicyProfile, PowerPlan, ProBalanceConfig, SchedulingMode, SmartTrimConfig,
    TrimMode,
};
pub use process::ProcessSnapshot;
