use anyhow::{Context, Result};
use core_governor::models::{EngineConfig, topology_for_model};
use core_governor::os_cmd::{OsBackend, ProcessControl, ProcessSource};
use core_governor::{APP_NAME, PolicyEngine, VERSION, logging, spawn_monitor};
use mimalloc::MiMalloc;
use os_api::OS;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn log_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|dir| dir.join("logs")))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let debug = std::env::args().any(|a| a == "--debug");
    let _guard = logging::setup_logging(&log_dir(), APP_NAME, debug, true)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let config_path = EngineConfig::default_path();
    let config = EngineConfig::load_or_default(&config_path);
    tracing::info!(
        "Loaded {} profile(s) from {}",
        config.profiles.len(),
        config_path.display()
    );

    let cpu_model = OS::get_cpu_model();
    let logical_cores = num_cpus::get();
    let topology = topology_for_model(&cpu_model, logical_cores)
        .with_context(|| format!("Unsupported CPU layout: {} ({} threads)", cpu_model, logical_cores))?;
    tracing::info!(
        "CPU: {} | {} logical cores | {:?}",
        topology.model,
        topology.total_cores,
        topology.architecture
    );

    let backend = Arc::new(OsBackend::new());
    let source: Arc<dyn ProcessSource> = backend.clone();
    let control: Arc<dyn ProcessControl> = backend;

    let engine = Arc::new(PolicyEngine::new(
        Arc::new(RwLock::new(config)),
        Arc::new(topology),
        source,
        control,
    ));
    let monitor = spawn_monitor(engine);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Ctrl-C received, restoring processes");
    monitor.stop().await;

    Ok(())
}
