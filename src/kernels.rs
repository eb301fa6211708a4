//! Compiled kernel programs handed to the compute and render stages.
//!
//! The stages only know the binding contract, not the kernel bodies:
//! compute = `main` with bindings 0 (params), 1 (source), 2 (destination);
//! render = `vs_main`/`fs_main` with instance locations 0..=2 and vertex
//! location 3.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::error;

pub const COMPUTE_ENTRY_POINT: &str = "main";
pub const VERTEX_ENTRY_POINT: &str = "vs_main";
pub const FRAGMENT_ENTRY_POINT: &str = "fs_main";

const BUILTIN_COMPUTE: &str = include_str!("shaders/compute.wgsl");
const BUILTIN_RENDER: &str = include_str!("shaders/render.wgsl");

/// Where kernel sources come from.
#[derive(Debug, Clone, Default)]
pub enum KernelSource {
    #[default]
    Builtin,
    Files {
        compute: Option<PathBuf>,
        render: Option<PathBuf>,
    },
}

pub struct KernelSet {
    pub compute: wgpu::ShaderModule,
    pub render: wgpu::ShaderModule,
}

impl KernelSet {
    /// Loads and compiles both programs. A compile error is fatal and is
    /// reported before the frame loop starts.
    pub fn load(device: &wgpu::Device, source: &KernelSource) -> Result<Self> {
        let (compute_src, render_src) = match source {
            KernelSource::Builtin => (BUILTIN_COMPUTE.to_string(), BUILTIN_RENDER.to_string()),
            KernelSource::Files { compute, render } => (
                read_or_builtin(compute.as_deref(), BUILTIN_COMPUTE)?,
                read_or_builtin(render.as_deref(), BUILTIN_RENDER)?,
            ),
        };

        let compute = compile(device, "Particle Compute Kernel", &compute_src)?;
        let render = compile(device, "Particle Render Kernel", &render_src)?;
        Ok(Self { compute, render })
    }

    pub fn builtin(device: &wgpu::Device) -> Result<Self> {
        Self::load(device, &KernelSource::Builtin)
    }
}

fn read_or_builtin(path: Option<&Path>, builtin: &str) -> Result<String> {
    match path {
        Some(path) => {
            log::info!("Loading kernel from {}", path.display());
            std::fs::read_to_string(path)
                .with_context(|| format!("reading kernel {}", path.display()))
        }
        None => Ok(builtin.to_string()),
    }
}

fn compile(device: &wgpu::Device, label: &str, source: &str) -> Result<wgpu::ShaderModule> {
    error::scoped(device, wgpu::ErrorFilter::Validation, label, || {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        })
    })
}
