//! Fixed-step clock driving the simulation systems.
//!
//! Every `Simulation::tick` advances the clock by exactly one step, and the
//! physics system integrates with `TICK_DURATION_SECS`, so a run of N ticks
//! is reproducible regardless of wall-clock speed.

use std::time::Duration;

/// Steps per simulated second.
pub const TICK_RATE_HZ: u32 = 60;
pub const TICK_DURATION: Duration = Duration::from_micros(16_666);
/// Step length handed to `physics_system`.
pub const TICK_DURATION_SECS: f32 = 1.0 / TICK_RATE_HZ as f32;

/// Ticks run so far and the simulated time they add up to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimulationTime {
    ticks: u64,
    elapsed: Duration,
}

impl SimulationTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn advance_tick(&mut self) {
        self.ticks += 1;
        self.elapsed += TICK_DURATION;
    }

    /// Simulated time, reported by the binary when a run finishes.
    pub fn total_time(&self) -> Duration {
        self.elapsed
    }
}
