use anyhow::Result;

use crate::{
    error,
    geometry::GeometryBuffer,
    gpu::GpuContext,
    kernels::{KernelSet, FRAGMENT_ENTRY_POINT, VERTEX_ENTRY_POINT},
    particle::ParticleRecord,
};

/// Instanced draw of one disc per particle.
pub struct RenderStage {
    render_pipeline: wgpu::RenderPipeline,
    clear_color: wgpu::Color,
    format: wgpu::TextureFormat,
}

impl RenderStage {
    pub fn new(
        gpu: &GpuContext,
        kernels: &KernelSet,
        format: wgpu::TextureFormat,
        clear_color: wgpu::Color,
    ) -> Result<Self> {
        let render_pipeline = error::scoped(
            &gpu.device,
            wgpu::ErrorFilter::Validation,
            "render stage vertex layout",
            || Self::create_render_pipeline(gpu, &kernels.render, format),
        )?;

        Ok(Self {
            render_pipeline,
            clear_color,
            format,
        })
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Records the draw. `instances` must be the slot the compute pass just
    /// wrote in the same encoder.
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        geometry: &GeometryBuffer,
        instances: &wgpu::Buffer,
        instance_count: u32,
    ) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Particle Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(self.clear_color),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(&self.render_pipeline);
        render_pass.set_vertex_buffer(0, instances.slice(..));
        render_pass.set_vertex_buffer(1, geometry.buffer().slice(..));
        render_pass.draw(0..geometry.vertex_count(), 0..instance_count);
    }

    fn create_render_pipeline(
        gpu: &GpuContext,
        shader: &wgpu::ShaderModule,
        format: wgpu::TextureFormat,
    ) -> wgpu::RenderPipeline {
        let pipeline_layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Particle Render Pipeline Layout"),
            bind_group_layouts: &[],
            push_constant_ranges: &[],
        });

        gpu.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Particle Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: VERTEX_ENTRY_POINT,
                buffers: &[ParticleRecord::instance_layout(), GeometryBuffer::vertex_layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: FRAGMENT_ENTRY_POINT,
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        })
    }
}
