//! Latch Runtime
//!
//! Minimal binary that owns a database and drives a fixed-tick simulation
//! through it.
//!
//! Usage: `latch [config.json]`

mod simulation;
mod time;

use anyhow::{Context, Result};
use latch_db::DatabaseConfig;
use latch_metrics::Counter;
use simulation::Simulation;
use std::path::Path;

const BODY_COUNT: usize = 64;
const SIMULATED_TICKS: u64 = 10 * time::TICK_RATE_HZ as u64;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    tracing::info!("Latch DB v{}", latch_db::VERSION);

    let config = match std::env::args().nth(1) {
        Some(path) => load_config(Path::new(&path))?,
        None => DatabaseConfig::default(),
    };
    tracing::info!(?config, "database config");

    let mut sim = Simulation::new(config).context("failed to create database")?;
    sim.spawn_ring(BODY_COUNT)?;
    let summary = sim.run(SIMULATED_TICKS)?;

    tracing::info!(
        ticks = summary.ticks,
        seconds = sim.time().total_time().as_secs_f32(),
        alive = summary.alive,
        frozen = summary.frozen,
        culled = summary.culled,
        "simulation finished"
    );
    for (name, position) in sim.report() {
        tracing::debug!(name = %name.0, x = position.0.x, y = position.0.y, "body");
    }
    log_counters(sim.database().counters());

    Ok(())
}

fn load_config(path: &Path) -> Result<DatabaseConfig> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    DatabaseConfig::from_json_str(&json)
        .with_context(|| format!("invalid config {}", path.display()))
}

fn log_counters(counters: &Counter) {
    for (name, value) in counters.iter() {
        tracing::info!(counter = name, value, "metrics");
    }
}
