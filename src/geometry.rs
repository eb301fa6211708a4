//! Shared disc geometry drawn once per particle instance.

use std::f32::consts::TAU;

use glam::Vec2;

use crate::{error, gpu::GpuContext};

const VERTICES_PER_TRIANGLE: u32 = 3;
const VERTEX_STRIDE: wgpu::BufferAddress = std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress;

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![3 => Float32x2];

/// Triangle list approximating a disc: each segment is centre, rim(i), rim(i + 1).
pub fn fan_vertices(radius: f32, segments: u32) -> Vec<[f32; 2]> {
    let delta = TAU / segments as f32;
    let rim = |i: u32| (Vec2::from_angle(i as f32 * delta) * radius).to_array();

    (0..segments)
        .flat_map(|i| [[0.0, 0.0], rim(i), rim(i + 1)])
        .collect()
}

/// Immutable vertex buffer holding [`fan_vertices`].
pub struct GeometryBuffer {
    buffer: wgpu::Buffer,
    vertex_count: u32,
}

impl GeometryBuffer {
    pub fn new(gpu: &GpuContext, radius: f32, segments: u32) -> anyhow::Result<Self> {
        let vertices = fan_vertices(radius, segments);
        let buffer = error::scoped(
            &gpu.device,
            wgpu::ErrorFilter::OutOfMemory,
            "particle geometry buffer",
            || {
                gpu.create_buffer_init(
                    "Particle Geometry Buffer",
                    bytemuck::cast_slice(&vertices),
                    wgpu::BufferUsages::VERTEX,
                )
            },
        )?;

        Ok(Self {
            buffer,
            vertex_count: segments * VERTICES_PER_TRIANGLE,
        })
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Vertex-rate layout: location 3 = disc vertex.
    pub fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: VERTEX_STRIDE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &VERTEX_ATTRIBUTES,
        }
    }
}
