//! GPU-compatible particle record and the initial scatter.
//!
//! 24-byte layout shared by the storage bindings of the compute kernel and
//! the instance vertex buffer of the render pipeline.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use rand::Rng;

/// One particle as stored in each state slot (24 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleRecord {
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub auxiliary: [f32; 2], // [aspect ratio, tunable scalar]
}

pub const PARTICLE_STRIDE: wgpu::BufferAddress =
    std::mem::size_of::<ParticleRecord>() as wgpu::BufferAddress;

const INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
    0 => Float32x2,
    1 => Float32x2,
    2 => Float32x2,
];

impl ParticleRecord {
    pub fn new(position: Vec2, velocity: Vec2, aspect_ratio: f32, tunable_scalar: f32) -> Self {
        Self {
            position: position.to_array(),
            velocity: velocity.to_array(),
            auxiliary: [aspect_ratio, tunable_scalar],
        }
    }

    pub fn at_rest(position: Vec2, aspect_ratio: f32, tunable_scalar: f32) -> Self {
        Self::new(position, Vec2::ZERO, aspect_ratio, tunable_scalar)
    }

    pub fn position(&self) -> Vec2 {
        Vec2::from_array(self.position)
    }

    pub fn velocity(&self) -> Vec2 {
        Vec2::from_array(self.velocity)
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.auxiliary[0]
    }

    /// Instance-rate layout: locations 0/1/2 = position/velocity/auxiliary.
    pub fn instance_layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: PARTICLE_STRIDE,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &INSTANCE_ATTRIBUTES,
        }
    }
}

/// Seeds particles uniformly over the visible domain
/// `[-aspect, aspect] x [-1, 1]`, at rest.
pub struct Scatter<R: Rng> {
    rng: R,
    aspect_ratio: f32,
    tunable_scalar: f32,
}

impl<R: Rng> Scatter<R> {
    pub fn new(rng: R, aspect_ratio: f32, tunable_scalar: f32) -> Self {
        Self {
            rng,
            aspect_ratio,
            tunable_scalar,
        }
    }

    pub fn next_record(&mut self) -> ParticleRecord {
        let x = self.aspect_ratio * self.rng.gen_range(-1.0f32..=1.0);
        let y = self.rng.gen_range(-1.0f32..=1.0);
        ParticleRecord::at_rest(Vec2::new(x, y), self.aspect_ratio, self.tunable_scalar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_record_size() {
        assert_eq!(std::mem::size_of::<ParticleRecord>(), 24);
        assert_eq!(PARTICLE_STRIDE, 24);
    }

    #[test]
    fn test_instance_layout_offsets() {
        let layout = ParticleRecord::instance_layout();
        assert_eq!(layout.step_mode, wgpu::VertexStepMode::Instance);
        let offsets: Vec<_> = layout.attributes.iter().map(|a| a.offset).collect();
        let locations: Vec<_> = layout.attributes.iter().map(|a| a.shader_location).collect();
        assert_eq!(offsets, vec![0, 8, 16]);
        assert_eq!(locations, vec![0, 1, 2]);
    }

    #[test]
    fn test_scatter_is_reproducible() {
        let mut a = Scatter::new(StdRng::seed_from_u64(7), 1.5, 0.5);
        let mut b = Scatter::new(StdRng::seed_from_u64(7), 1.5, 0.5);
        for _ in 0..16 {
            assert_eq!(a.next_record(), b.next_record());
        }
    }
}
