//! Per-frame sequencing of the compute and render stages.
//!
//! Every tick runs `Idle -> Dispatching -> Presenting -> Idle`:
//!
//! 1. [`FramePlan::for_frame`] picks the source slot (`frame % 2`) and the
//!    destination slot (the other one).
//! 2. The compute pass (source -> destination) and the render pass (reading
//!    destination as instance data) are encoded into a single command buffer
//!    and submitted once, so the GPU orders render after compute.
//! 3. The target is presented and the frame counter advances.
//!
//! The slot just written becomes the next frame's source, so frame N's draw
//! always shows frame N's integration. No locks are involved; the
//! alternation alone keeps a slot from being read and written in one pass.

use anyhow::Result;
use rand::{rngs::StdRng, SeedableRng};
use std::time::{Duration, Instant};

use crate::{
    compute::ComputeStage,
    config::SimulationConfig,
    error::GpuFault,
    geometry::GeometryBuffer,
    gpu::GpuContext,
    kernels::{KernelSet, KernelSource},
    params::{ParameterBlock, SimParams},
    particle::{ParticleRecord, Scatter},
    render::RenderStage,
    state_store::{Slot, StateStore},
    target::FrameTarget,
};

/// Slot roles for one frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FramePlan {
    pub frame: u64,
    pub source: Slot,
    pub destination: Slot,
}

impl FramePlan {
    pub fn for_frame(frame: u64) -> Self {
        let source = Slot::for_parity(frame);
        Self {
            frame,
            source,
            destination: source.other(),
        }
    }

    /// The slot bound as instance data for this frame's draw.
    pub fn render_source(&self) -> Slot {
        self.destination
    }

    pub fn next(&self) -> Self {
        Self::for_frame(self.frame + 1)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Dispatching,
    Presenting,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Presented(FramePlan),
    /// The target had nothing to draw into; the frame counter did not move.
    Skipped,
}

/// Source of display ticks. Returning `false` ends the loop.
pub trait FrameTicker {
    fn wait_for_tick(&mut self) -> bool;
}

/// Fires a fixed number of ticks back to back.
pub struct FixedTicks {
    remaining: u64,
}

impl FixedTicks {
    pub fn new(count: u64) -> Self {
        Self { remaining: count }
    }
}

impl FrameTicker for FixedTicks {
    fn wait_for_tick(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

/// Sleeps to hold a steady tick rate, optionally for a bounded number of ticks.
pub struct IntervalTicker {
    interval: Duration,
    next_tick: Option<Instant>,
    remaining: Option<u64>,
}

impl IntervalTicker {
    pub fn new(fps: u32, limit: Option<u64>) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            next_tick: None,
            remaining: limit,
        }
    }
}

impl FrameTicker for IntervalTicker {
    fn wait_for_tick(&mut self) -> bool {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return false;
            }
            *remaining -= 1;
        }

        let now = Instant::now();
        let deadline = self.next_tick.unwrap_or(now);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        self.next_tick = Some(deadline.max(now) + self.interval);
        true
    }
}

pub struct FrameDriver {
    gpu: GpuContext,
    config: SimulationConfig,
    params: ParameterBlock,
    store: StateStore,
    geometry: GeometryBuffer,
    compute: ComputeStage,
    render: RenderStage,
    aspect_ratio: f32,
    frame: u64,
    state: DriverState,
    last_plan: Option<FramePlan>,
}

impl FrameDriver {
    /// Builds every GPU resource and scatters `config.particle_count`
    /// particles over the target's aspect-corrected viewport.
    pub fn new(
        gpu: GpuContext,
        config: SimulationConfig,
        kernels: &KernelSource,
        target: &dyn FrameTarget,
    ) -> Result<Self> {
        let aspect_ratio = target.aspect_ratio();
        config.sim_params().check_aspect(aspect_ratio)?;
        let seed = config.seed.unwrap_or_else(rand::random);
        log::info!(
            "Seeding {} particles (seed {}, aspect {:.3})",
            config.particle_count,
            seed,
            aspect_ratio
        );

        let mut scatter = Scatter::new(StdRng::seed_from_u64(seed), aspect_ratio, config.tunable_scalar);
        let count = config.particle_count;
        Self::build(gpu, config, kernels, target.format(), aspect_ratio, count, |_| {
            scatter.next_record()
        })
    }

    /// Starts from explicit records instead of a random scatter. The particle
    /// count becomes `records.len()` and the domain is the narrowest aspect
    /// ratio among them.
    pub fn from_records(
        gpu: GpuContext,
        mut config: SimulationConfig,
        kernels: &KernelSource,
        format: wgpu::TextureFormat,
        records: &[ParticleRecord],
    ) -> Result<Self> {
        config.particle_count = records.len() as u32;
        let count = config.particle_count;
        let aspect_ratio = records
            .iter()
            .map(ParticleRecord::aspect_ratio)
            .fold(f32::INFINITY, f32::min);
        if !records.is_empty() {
            config.sim_params().check_aspect(aspect_ratio)?;
        }
        Self::build(gpu, config, kernels, format, aspect_ratio, count, |i| records[i as usize])
    }

    fn build(
        gpu: GpuContext,
        config: SimulationConfig,
        kernels: &KernelSource,
        format: wgpu::TextureFormat,
        aspect_ratio: f32,
        count: u32,
        seed: impl FnMut(u32) -> ParticleRecord,
    ) -> Result<Self> {
        config.validate()?;

        let kernels = KernelSet::load(&gpu.device, kernels)?;
        let params = ParameterBlock::new(&gpu, config.sim_params())?;
        let store = StateStore::initialize(&gpu, count, seed)?;
        let geometry = GeometryBuffer::new(&gpu, config.particle_radius, config.fan_segments)?;
        let compute = ComputeStage::new(&gpu, &kernels, &params, &store)?;
        let render = RenderStage::new(&gpu, &kernels, format, config.clear_color())?;

        log::info!(
            "Frame driver ready: {} particles, {} workgroups, {} vertices per disc",
            store.len(),
            compute.workgroups(),
            geometry.vertex_count()
        );

        Ok(Self {
            gpu,
            config,
            params,
            store,
            geometry,
            compute,
            render,
            aspect_ratio,
            frame: 0,
            state: DriverState::Idle,
            last_plan: None,
        })
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn last_plan(&self) -> Option<FramePlan> {
        self.last_plan
    }

    pub fn particle_count(&self) -> u32 {
        self.store.len()
    }

    pub fn params(&self) -> SimParams {
        self.params.params()
    }

    /// Takes effect from the next tick on. Invalid values are rejected and
    /// the current block stays in place. A new radius also rebuilds the disc
    /// geometry so drawn and simulated sizes agree.
    pub fn update_params(&mut self, params: SimParams) -> Result<()> {
        params.validate()?;
        params.check_aspect(self.aspect_ratio)?;

        if params.particle_radius != self.config.particle_radius {
            self.geometry = GeometryBuffer::new(&self.gpu, params.particle_radius, self.config.fan_segments)?;
            log::info!("Rebuilt particle geometry for radius {}", params.particle_radius);
        }

        self.config.delta_t = params.delta_t;
        self.config.gravity = params.gravity;
        self.config.particle_radius = params.particle_radius;
        self.config.damping = params.damping;
        self.params.set(params);
        Ok(())
    }

    /// Slot holding the most recently computed state (the next source).
    pub fn latest_slot(&self) -> Slot {
        Slot::for_parity(self.frame)
    }

    pub fn tick(&mut self, target: &mut dyn FrameTarget) -> Result<FrameStatus> {
        if target.format() != self.render.format() {
            return Err(GpuFault::Layout(format!(
                "target format {:?} does not match render pipeline format {:?}",
                target.format(),
                self.render.format()
            ))
            .into());
        }

        let Some(acquired) = target.acquire(&self.gpu)? else {
            log::debug!("Frame {} skipped: target unavailable", self.frame);
            return Ok(FrameStatus::Skipped);
        };

        let plan = FramePlan::for_frame(self.frame);
        self.state = DriverState::Dispatching;
        self.params.flush(&self.gpu.queue);

        // Encoding errors surface inside the same scope as the submission.
        self.gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });
        self.compute.encode(&mut encoder, plan.source);
        self.render.encode(
            &mut encoder,
            &acquired.view,
            &self.geometry,
            self.store.buffer_for(plan.render_source()),
            self.store.len(),
        );
        self.gpu.queue.submit(Some(encoder.finish()));
        if let Some(err) = pollster::block_on(self.gpu.device.pop_error_scope()) {
            self.state = DriverState::Idle;
            return Err(GpuFault::Submission(format!("frame {}: {}", self.frame, err)).into());
        }

        self.state = DriverState::Presenting;
        acquired.present();

        self.frame += 1;
        self.last_plan = Some(plan);
        self.state = DriverState::Idle;

        if self.config.log_interval > 0 && self.frame % self.config.log_interval == 0 {
            log::debug!("Frame {} presented (rendered slot {:?})", self.frame, plan.render_source());
        }

        Ok(FrameStatus::Presented(plan))
    }

    /// Ticks until `ticker` stops, then drains the GPU. Returns the number of
    /// presented frames in this run.
    pub fn run(&mut self, ticker: &mut dyn FrameTicker, target: &mut dyn FrameTarget) -> Result<u64> {
        let start = self.frame;
        let mut outcome = Ok(());
        while ticker.wait_for_tick() {
            if let Err(err) = self.tick(target) {
                log::error!("Frame {} failed: {:#}", self.frame, err);
                outcome = Err(err);
                break;
            }
        }
        self.finish();
        outcome.map(|()| self.frame - start)
    }

    /// Waits for every submitted frame to complete. Call before tearing down
    /// the driver so no dispatch is in flight when the slots are released.
    pub fn finish(&self) {
        self.gpu.wait_idle();
        log::info!("Frame driver drained after {} frames", self.frame);
    }

    /// Reads back the slot the last frame wrote.
    pub fn snapshot(&self) -> Result<Vec<ParticleRecord>> {
        pollster::block_on(self.store.read_snapshot(&self.gpu, self.latest_slot()))
    }

    pub fn read_slot(&self, slot: Slot) -> Result<Vec<ParticleRecord>> {
        pollster::block_on(self.store.read_snapshot(&self.gpu, slot))
    }
}

impl Drop for FrameDriver {
    fn drop(&mut self) {
        self.gpu.wait_idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_alternates() {
        let first = FramePlan::for_frame(0);
        assert_eq!(first.source, Slot::A);
        assert_eq!(first.destination, Slot::B);
        assert_eq!(first.next().source, Slot::B);
        assert_eq!(first.next().next(), FramePlan::for_frame(2));
    }

    #[test]
    fn test_fixed_ticks_stop() {
        let mut ticker = FixedTicks::new(3);
        let ticks = std::iter::from_fn(|| ticker.wait_for_tick().then_some(())).count();
        assert_eq!(ticks, 3);
        assert!(!ticker.wait_for_tick());
    }

    #[test]
    fn test_interval_ticker_honours_limit() {
        let mut ticker = IntervalTicker::new(1000, Some(2));
        assert!(ticker.wait_for_tick());
        assert!(ticker.wait_for_tick());
        assert!(!ticker.wait_for_tick());
    }
}
