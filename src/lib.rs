//! Affinity and priority policy engine for games.
//!
//! Given a CPU topology, saved per-process profiles and default rules, the engine
//! decides which cores each process may use and at what priority, throttles
//! background processes while a game runs and trims memory under pressure.

pub mod affinity;
pub mod engine;
pub mod error;
pub mod logging;
pub mod models;
pub mod os_cmd;

pub use affinity::{AffinityPlan, SideEffect, transform};
pub use engine::{MonitorHandle, PolicyEngine, PolicyEngineState, TickReport, spawn_monitor};
pub use error::{PolicyError, PolicyResult};
pub use os_api::PriorityClass;

pub const APP_NAME: &str = "core-governor";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
