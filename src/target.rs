//! Presentable targets the frame driver renders into.
//!
//! A window surface for interactive runs and an offscreen texture for
//! headless runs and tests. Both sit behind [`FrameTarget`] so the driver
//! never touches the host windowing layer.

use anyhow::{anyhow, Result};
use std::path::Path;

use crate::{error::GpuFault, gpu::GpuContext};

/// A texture ready to be drawn into this tick.
pub struct AcquiredFrame {
    pub view: wgpu::TextureView,
    surface_texture: Option<wgpu::SurfaceTexture>,
}

impl AcquiredFrame {
    /// A frame backed by a plain texture; presenting it is a no-op.
    pub fn offscreen(view: wgpu::TextureView) -> Self {
        Self {
            view,
            surface_texture: None,
        }
    }

    pub fn present(self) {
        if let Some(surface_texture) = self.surface_texture {
            surface_texture.present();
        }
    }
}

pub trait FrameTarget {
    fn format(&self) -> wgpu::TextureFormat;

    fn size(&self) -> (u32, u32);

    fn aspect_ratio(&self) -> f32 {
        let (width, height) = self.size();
        width as f32 / height.max(1) as f32
    }

    /// `Ok(None)` means nothing can be drawn this tick; the caller skips it.
    fn acquire(&mut self, gpu: &GpuContext) -> Result<Option<AcquiredFrame>>;
}

pub struct SurfaceTarget {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

impl SurfaceTarget {
    pub fn new(gpu: &GpuContext, surface: wgpu::Surface<'static>, width: u32, height: u32) -> Result<Self> {
        let surface_caps = surface.get_capabilities(&gpu.adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| GpuFault::Unavailable("surface reports no usable format".into()))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &config);
        log::info!(
            "Configured surface {}x{} as {:?}",
            config.width,
            config.height,
            config.format
        );

        Ok(Self { surface, config })
    }

    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&gpu.device, &self.config);
        }
    }
}

impl FrameTarget for SurfaceTarget {
    fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn acquire(&mut self, gpu: &GpuContext) -> Result<Option<AcquiredFrame>> {
        match self.surface.get_current_texture() {
            Ok(surface_texture) => {
                let view = surface_texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                Ok(Some(AcquiredFrame {
                    view,
                    surface_texture: Some(surface_texture),
                }))
            }
            Err(wgpu::SurfaceError::Lost) | Err(wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost or outdated, reconfiguring");
                self.surface.configure(&gpu.device, &self.config);
                Ok(None)
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Surface acquire timed out, skipping tick");
                Ok(None)
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                Err(GpuFault::Allocation("surface texture out of memory".into()).into())
            }
        }
    }
}

/// Render target backed by a plain texture, readable with [`capture`](Self::capture).
pub struct OffscreenTarget {
    texture: wgpu::Texture,
    width: u32,
    height: u32,
    padded_bytes_per_row: u32,
}

impl OffscreenTarget {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

    pub fn new(gpu: &GpuContext, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("offscreen target must be non-empty, got {}x{}", width, height));
        }

        let texture = crate::error::scoped(
            &gpu.device,
            wgpu::ErrorFilter::OutOfMemory,
            "offscreen target",
            || {
                gpu.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("Offscreen Target"),
                    size: wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: Self::FORMAT,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[],
                })
            },
        )?;

        let unpadded_bytes_per_row = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        Ok(Self {
            texture,
            width,
            height,
            padded_bytes_per_row,
        })
    }

    /// Reads the last rendered image back as tightly packed RGBA8 rows.
    pub fn capture(&self, gpu: &GpuContext) -> Result<Vec<u8>> {
        let staging_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Capture Staging Buffer"),
            size: self.padded_bytes_per_row as u64 * self.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Capture Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        gpu.queue.submit(Some(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (tx, rx) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        gpu.wait_idle();
        pollster::block_on(rx)
            .map_err(|_| anyhow!("capture mapping was cancelled"))?
            .map_err(|e| GpuFault::Allocation(format!("mapping capture buffer: {}", e)))?;

        let data = buffer_slice.get_mapped_range();
        let unpadded_bytes_per_row = (self.width * 4) as usize;
        let mut frame_data = Vec::with_capacity(unpadded_bytes_per_row * self.height as usize);
        for row in data.chunks(self.padded_bytes_per_row as usize) {
            frame_data.extend_from_slice(&row[..unpadded_bytes_per_row]);
        }

        drop(data);
        staging_buffer.unmap();

        Ok(frame_data)
    }

    pub fn save_png<P: AsRef<Path>>(&self, gpu: &GpuContext, path: P) -> Result<()> {
        let path = path.as_ref();
        let rgba = self.capture(gpu)?;
        image::save_buffer(path, &rgba, self.width, self.height, image::ColorType::Rgba8)?;
        log::info!("Saved frame to {}", path.display());
        Ok(())
    }
}

impl FrameTarget for OffscreenTarget {
    fn format(&self) -> wgpu::TextureFormat {
        Self::FORMAT
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn acquire(&mut self, _gpu: &GpuContext) -> Result<Option<AcquiredFrame>> {
        let view = self.texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Some(AcquiredFrame::offscreen(view)))
    }
}
