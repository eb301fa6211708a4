//! Run-time tunables for the simulation.
//!
//! Every value that the frame loop needs is carried here and handed to
//! [`FrameDriver::new`](crate::driver::FrameDriver::new); nothing is read from
//! globals. Defaults reproduce the stock scene: 500 particles falling under a
//! mild gravity and bouncing off the viewport edges.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::params::SimParams;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub particle_count: u32,
    /// Triangles per particle disc.
    pub fan_segments: u32,
    pub delta_t: f32,
    pub gravity: f32,
    pub particle_radius: f32,
    pub damping: f32,
    /// Opaque per-particle scalar stored in `auxiliary[1]`.
    pub tunable_scalar: f32,
    pub clear_color: [f64; 4],
    /// RNG seed for the initial scatter. `None` draws a fresh one.
    pub seed: Option<u64>,
    /// Emit a debug line every this many frames (0 disables).
    pub log_interval: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            particle_count: 500,
            fan_segments: 12,
            delta_t: 0.01,
            gravity: -2.0,
            particle_radius: 0.03,
            damping: 0.5,
            tunable_scalar: 0.5,
            clear_color: [0.0, 0.1, 0.2, 1.0],
            seed: None,
            log_interval: 600,
        }
    }
}

impl std::str::FromStr for SimulationConfig {
    type Err = toml::de::Error;
    fn from_str(serialized: &str) -> Result<Self, Self::Err> {
        toml::from_str(serialized)
    }
}

impl SimulationConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = text
            .parse()
            .with_context(|| format!("parsing config {}", path.display()))?;
        log::info!("Loaded simulation config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.particle_count == 0 {
            return Err(anyhow!("particle_count must be at least 1"));
        }
        if self.fan_segments < 3 {
            return Err(anyhow!(
                "fan_segments must be at least 3, got {}",
                self.fan_segments
            ));
        }
        if !self.tunable_scalar.is_finite() {
            return Err(anyhow!("tunable_scalar must be finite"));
        }
        self.sim_params().validate()?;
        Ok(())
    }

    pub fn sim_params(&self) -> SimParams {
        SimParams {
            delta_t: self.delta_t,
            gravity: self.gravity,
            particle_radius: self.particle_radius,
            damping: self.damping,
        }
    }

    pub fn clear_color(&self) -> wgpu::Color {
        let [r, g, b, a] = self.clear_color;
        wgpu::Color { r, g, b, a }
    }
}
