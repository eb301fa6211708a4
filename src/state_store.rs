//! The two particle state slots.
//!
//! The store is passive memory: it allocates slot A and slot B once, seeds
//! both identically, and hands out buffers by [`Slot`]. Which slot is read
//! and which is written in a given frame is decided by
//! [`FramePlan`](crate::driver::FramePlan), never by the store.

use anyhow::{anyhow, Result};

use crate::{
    error::{self, GpuFault},
    gpu::GpuContext,
    particle::{ParticleRecord, PARTICLE_STRIDE},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub const BOTH: [Slot; 2] = [Slot::A, Slot::B];

    pub fn index(self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
        }
    }

    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    /// Slot whose parity matches `frame`.
    pub fn for_parity(frame: u64) -> Slot {
        if frame % 2 == 0 {
            Slot::A
        } else {
            Slot::B
        }
    }
}

pub struct StateStore {
    slots: [wgpu::Buffer; 2],
    len: u32,
}

impl StateStore {
    /// Allocates both slots and fills each with `seed(i)` for every particle.
    pub fn initialize<F>(gpu: &GpuContext, count: u32, mut seed: F) -> Result<Self>
    where
        F: FnMut(u32) -> ParticleRecord,
    {
        if count == 0 {
            return Err(anyhow!("particle state store needs at least one particle"));
        }

        let records: Vec<ParticleRecord> = (0..count).map(&mut seed).collect();
        let slots = error::scoped(
            &gpu.device,
            wgpu::ErrorFilter::OutOfMemory,
            "particle state slots",
            || Slot::BOTH.map(|slot| Self::create_slot(gpu, slot, &records)),
        )?;

        log::info!(
            "Allocated particle state: 2 x {} records ({} bytes each)",
            count,
            count as u64 * PARTICLE_STRIDE
        );

        Ok(Self { slots, len: count })
    }

    pub fn buffer_for(&self, slot: Slot) -> &wgpu::Buffer {
        &self.slots[slot.index()]
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn byte_size(&self) -> wgpu::BufferAddress {
        self.len as wgpu::BufferAddress * PARTICLE_STRIDE
    }

    /// Copies a slot back to host memory. Waits for the device, so only call
    /// this between frames.
    pub async fn read_snapshot(&self, gpu: &GpuContext, slot: Slot) -> Result<Vec<ParticleRecord>> {
        let staging_buffer = self.create_staging_buffer(gpu);
        self.copy_to_staging_buffer(gpu, slot, &staging_buffer);
        Self::read_from_staging_buffer(gpu, &staging_buffer).await
    }

    fn create_slot(gpu: &GpuContext, slot: Slot, records: &[ParticleRecord]) -> wgpu::Buffer {
        gpu.create_buffer_init(
            &format!("Particle State {:?}", slot),
            bytemuck::cast_slice(records),
            wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        )
    }

    fn create_staging_buffer(&self, gpu: &GpuContext) -> wgpu::Buffer {
        gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Staging Buffer"),
            size: self.byte_size(),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn copy_to_staging_buffer(&self, gpu: &GpuContext, slot: Slot, staging_buffer: &wgpu::Buffer) {
        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Snapshot Copy Encoder"),
        });

        encoder.copy_buffer_to_buffer(self.buffer_for(slot), 0, staging_buffer, 0, self.byte_size());

        gpu.queue.submit(Some(encoder.finish()));
    }

    async fn read_from_staging_buffer(
        gpu: &GpuContext,
        staging_buffer: &wgpu::Buffer,
    ) -> Result<Vec<ParticleRecord>> {
        let buffer_slice = staging_buffer.slice(..);
        let (tx, rx) = futures::channel::oneshot::channel();

        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        gpu.wait_idle();
        rx.await
            .map_err(|_| anyhow!("snapshot mapping was cancelled"))?
            .map_err(|e| GpuFault::Allocation(format!("mapping snapshot buffer: {}", e)))?;

        let data = buffer_slice.get_mapped_range();
        let records: Vec<ParticleRecord> = bytemuck::cast_slice(&data).to_vec();

        drop(data);
        staging_buffer.unmap();

        Ok(records)
    }
}
