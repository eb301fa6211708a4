use anyhow::{anyhow, Result};
use bytemuck::{Pod, Zeroable};

use crate::{error, gpu::GpuContext};

/// Half-extent of the domain along y; x spans `[-aspect, aspect]`.
pub const DOMAIN_HALF_HEIGHT: f32 = 1.0;

/// Uniform block read by the compute kernel at binding 0 (16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SimParams {
    pub delta_t: f32,
    pub gravity: f32,
    pub particle_radius: f32,
    pub damping: f32,
}

const _: () = assert!(std::mem::size_of::<SimParams>() == 16);

impl SimParams {
    /// Rejects values the kernel cannot integrate sensibly. A disc must fit
    /// inside the unit half-height, or the reflection clamp flips sign.
    pub fn validate(&self) -> Result<()> {
        if !(self.delta_t > 0.0 && self.delta_t.is_finite()) {
            return Err(anyhow!("delta_t must be positive, got {}", self.delta_t));
        }
        if !(self.particle_radius > 0.0 && self.particle_radius < DOMAIN_HALF_HEIGHT) {
            return Err(anyhow!(
                "particle_radius must lie in (0, {}), got {}",
                DOMAIN_HALF_HEIGHT,
                self.particle_radius
            ));
        }
        if !(0.0..=1.0).contains(&self.damping) {
            return Err(anyhow!("damping must lie in [0, 1], got {}", self.damping));
        }
        if !self.gravity.is_finite() {
            return Err(anyhow!("gravity must be finite, got {}", self.gravity));
        }
        Ok(())
    }

    /// The x half-extent is the aspect ratio, which may be narrower than 1.
    pub fn check_aspect(&self, aspect_ratio: f32) -> Result<()> {
        if !(aspect_ratio > 0.0 && aspect_ratio.is_finite()) {
            return Err(anyhow!("aspect ratio must be positive, got {}", aspect_ratio));
        }
        if self.particle_radius >= aspect_ratio {
            return Err(anyhow!(
                "particle_radius {} does not fit a domain of half-width {}",
                self.particle_radius,
                aspect_ratio
            ));
        }
        Ok(())
    }
}

/// Owns the uniform buffer behind [`SimParams`].
///
/// Changes are staged with [`ParameterBlock::set`] and only reach the GPU in
/// [`ParameterBlock::flush`], which the frame driver calls before encoding a
/// frame. `Queue::write_buffer` lands ahead of the next submission, so a
/// dispatch never sees a partially written block.
pub struct ParameterBlock {
    params: SimParams,
    buffer: wgpu::Buffer,
    dirty: bool,
}

impl ParameterBlock {
    pub fn new(gpu: &GpuContext, params: SimParams) -> anyhow::Result<Self> {
        let buffer = error::scoped(
            &gpu.device,
            wgpu::ErrorFilter::OutOfMemory,
            "simulation parameter buffer",
            || {
                gpu.create_buffer_init(
                    "Sim Params Buffer",
                    bytemuck::bytes_of(&params),
                    wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                )
            },
        )?;

        Ok(Self {
            params,
            buffer,
            dirty: false,
        })
    }

    pub fn params(&self) -> SimParams {
        self.params
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set(&mut self, params: SimParams) {
        if params != self.params {
            self.params = params;
            self.dirty = true;
        }
    }

    /// Uploads pending changes. Returns whether a write was queued.
    pub fn flush(&mut self, queue: &wgpu::Queue) -> bool {
        if !self.dirty {
            return false;
        }
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(&self.params));
        self.dirty = false;
        log::debug!("Uploaded sim params {:?}", self.params);
        true
    }
}
