use anyhow::Result;
use wgpu::{BindGroup, BindGroupLayout, ComputePipeline};

use crate::{
    cpu_ref::workgroup_count,
    error,
    gpu::GpuContext,
    kernels::{KernelSet, COMPUTE_ENTRY_POINT},
    params::ParameterBlock,
    state_store::{Slot, StateStore},
};

/// Physics dispatch over the state store.
///
/// Holds one bind group per source slot: the group for source `s` binds
/// slot `s` read-only at 1 and `s.other()` writable at 2, so a slot can never
/// be both input and output of the same dispatch.
pub struct ComputeStage {
    bind_groups: [BindGroup; 2],
    compute_pipeline: ComputePipeline,
    workgroups: u32,
}

impl ComputeStage {
    pub fn new(
        gpu: &GpuContext,
        kernels: &KernelSet,
        params: &ParameterBlock,
        store: &StateStore,
    ) -> Result<Self> {
        error::scoped(
            &gpu.device,
            wgpu::ErrorFilter::Validation,
            "compute stage bindings",
            || {
                let bind_group_layout = Self::create_bind_group_layout(gpu);
                let bind_groups = Slot::BOTH
                    .map(|source| Self::create_bind_group(gpu, &bind_group_layout, params, store, source));
                let compute_pipeline = Self::create_compute_pipeline(gpu, &kernels.compute, &bind_group_layout);

                Self {
                    bind_groups,
                    compute_pipeline,
                    workgroups: workgroup_count(store.len()),
                }
            },
        )
    }

    pub fn workgroups(&self) -> u32 {
        self.workgroups
    }

    /// Records the dispatch reading `source` and writing `source.other()`.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, source: Slot) {
        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Particle Integrate Pass"),
            timestamp_writes: None,
        });

        compute_pass.set_pipeline(&self.compute_pipeline);
        compute_pass.set_bind_group(0, &self.bind_groups[source.index()], &[]);
        compute_pass.dispatch_workgroups(self.workgroups, 1, 1);
    }

    fn create_bind_group_layout(gpu: &GpuContext) -> BindGroupLayout {
        gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Compute Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(16),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        })
    }

    fn create_bind_group(
        gpu: &GpuContext,
        layout: &BindGroupLayout,
        params: &ParameterBlock,
        store: &StateStore,
        source: Slot,
    ) -> BindGroup {
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("Particle Compute Bind Group (read {:?})", source)),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: store.buffer_for(source).as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: store.buffer_for(source.other()).as_entire_binding(),
                },
            ],
        })
    }

    fn create_compute_pipeline(
        gpu: &GpuContext,
        shader: &wgpu::ShaderModule,
        bind_group_layout: &BindGroupLayout,
    ) -> ComputePipeline {
        let pipeline_layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Particle Compute Pipeline Layout"),
            bind_group_layouts: &[bind_group_layout],
            push_constant_ranges: &[],
        });

        gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Particle Integrate Pipeline"),
            layout: Some(&pipeline_layout),
            module: shader,
            entry_point: COMPUTE_ENTRY_POINT,
        })
    }
}
