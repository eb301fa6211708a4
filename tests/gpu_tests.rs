//! End-to-end checks against a real adapter. Each test returns early when
//! the machine has no usable GPU.

use approx::assert_abs_diff_eq;
use glam::Vec2;
use pingpong_particles::{
    config::SimulationConfig,
    cpu_ref,
    driver::{DriverState, FixedTicks, FrameDriver, FrameStatus},
    error::GpuFault,
    gpu::GpuContext,
    kernels::KernelSource,
    params::SimParams,
    particle::ParticleRecord,
    state_store::Slot,
    target::{AcquiredFrame, FrameTarget, OffscreenTarget},
};

const TARGET_SIZE: u32 = 64;
const ASPECT: f32 = 1.5;

fn gpu_or_skip() -> Option<GpuContext> {
    match pollster::block_on(GpuContext::new()) {
        Ok(gpu) => Some(gpu),
        Err(err) => {
            eprintln!("Skipping GPU test: {:#}", err);
            None
        }
    }
}

fn scenario_records() -> Vec<ParticleRecord> {
    [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)]
        .iter()
        .map(|&(x, y)| ParticleRecord::at_rest(Vec2::new(x, y), ASPECT, 0.5))
        .collect()
}

fn build(records: &[ParticleRecord]) -> Option<(FrameDriver, OffscreenTarget)> {
    let gpu = gpu_or_skip()?;
    let target = OffscreenTarget::new(&gpu, TARGET_SIZE, TARGET_SIZE).unwrap();
    let driver = FrameDriver::from_records(
        gpu,
        SimulationConfig::default(),
        &KernelSource::Builtin,
        target.format(),
        records,
    )
    .unwrap();
    Some((driver, target))
}

fn assert_records_close(gpu: &[ParticleRecord], cpu: &[ParticleRecord]) {
    assert_eq!(gpu.len(), cpu.len());
    for (g, c) in gpu.iter().zip(cpu) {
        for axis in 0..2 {
            assert_abs_diff_eq!(g.position[axis], c.position[axis], epsilon = 1e-5);
            assert_abs_diff_eq!(g.velocity[axis], c.velocity[axis], epsilon = 1e-5);
        }
        assert_eq!(g.auxiliary, c.auxiliary);
    }
}

#[test]
fn test_first_frame_matches_reference_step() {
    let records = scenario_records();
    let Some((mut driver, mut target)) = build(&records) else {
        return;
    };

    let status = driver.tick(&mut target).unwrap();

    let expected = cpu_ref::simulate(&records, &driver.params(), 1);
    assert_records_close(&driver.snapshot().unwrap(), &expected);
    for record in driver.snapshot().unwrap() {
        assert_abs_diff_eq!(record.velocity[1], -0.02, epsilon = 1e-6);
    }
    assert!(matches!(status, FrameStatus::Presented(_)));
}

#[test]
fn test_source_slot_is_untouched_by_dispatch() {
    let records = scenario_records();
    let Some((mut driver, mut target)) = build(&records) else {
        return;
    };

    driver.tick(&mut target).unwrap();

    assert_eq!(driver.read_slot(Slot::A).unwrap(), records);
    assert_ne!(driver.read_slot(Slot::B).unwrap(), records);
}

#[test]
fn test_both_slots_start_identical() {
    let records = scenario_records();
    let Some((driver, _target)) = build(&records) else {
        return;
    };

    assert_eq!(driver.read_slot(Slot::A).unwrap(), records);
    assert_eq!(driver.read_slot(Slot::B).unwrap(), records);
}

#[test]
fn test_driver_renders_the_slot_it_just_wrote() {
    let records = scenario_records();
    let Some((mut driver, mut target)) = build(&records) else {
        return;
    };

    for frame in 0..6u64 {
        let FrameStatus::Presented(plan) = driver.tick(&mut target).unwrap() else {
            panic!("offscreen target never skips");
        };
        assert_eq!(plan.frame, frame);
        assert_eq!(plan.render_source(), plan.destination);
        assert_eq!(driver.latest_slot(), plan.destination);
        assert_eq!(driver.state(), DriverState::Idle);
    }
    assert_eq!(driver.frame(), 6);
}

#[test]
fn test_many_frames_track_reference() {
    let records: Vec<ParticleRecord> = (0..500)
        .map(|i| {
            let t = i as f32 / 499.0;
            ParticleRecord::new(
                Vec2::new(ASPECT * (1.8 * t - 0.9), 0.9 * (1.0 - 2.0 * t)),
                Vec2::new(0.3 * (t - 0.5), 0.0),
                ASPECT,
                0.5,
            )
        })
        .collect();
    let Some((mut driver, mut target)) = build(&records) else {
        return;
    };

    let presented = driver.run(&mut FixedTicks::new(25), &mut target).unwrap();

    assert_eq!(presented, 25);
    let expected = cpu_ref::simulate(&records, &driver.params(), 25);
    let snapshot = driver.snapshot().unwrap();
    assert_eq!(snapshot.len(), 500);
    assert!(cpu_ref::max_position_delta(&snapshot, &expected) < 1e-4);
}

#[test]
fn test_particle_count_never_changes() {
    let records = scenario_records();
    let Some((mut driver, mut target)) = build(&records) else {
        return;
    };

    for _ in 0..5 {
        driver.tick(&mut target).unwrap();
        assert_eq!(driver.particle_count(), 4);
        assert_eq!(driver.snapshot().unwrap().len(), 4);
    }
}

#[test]
fn test_parameter_update_applies_next_frame() {
    let records = scenario_records();
    let Some((mut driver, mut target)) = build(&records) else {
        return;
    };

    driver.tick(&mut target).unwrap();
    let mut params = driver.params();
    params.gravity = 0.0;
    driver.update_params(params).unwrap();
    driver.tick(&mut target).unwrap();

    for record in driver.snapshot().unwrap() {
        assert_abs_diff_eq!(record.velocity[1], -0.02, epsilon = 1e-6);
    }
}

#[test]
fn test_frame_draws_particles() {
    let records = vec![ParticleRecord::at_rest(Vec2::ZERO, 1.0, 0.5)];
    let Some(gpu) = gpu_or_skip() else {
        return;
    };
    let mut target = OffscreenTarget::new(&gpu, TARGET_SIZE, TARGET_SIZE).unwrap();
    let config = SimulationConfig {
        particle_radius: 0.25,
        gravity: 0.0,
        ..SimulationConfig::default()
    };
    let mut driver =
        FrameDriver::from_records(gpu, config, &KernelSource::Builtin, target.format(), &records).unwrap();

    driver.tick(&mut target).unwrap();
    let pixels = target.capture(driver.gpu()).unwrap();

    let pixel_at = |x: u32, y: u32| {
        let offset = ((y * TARGET_SIZE + x) * 4) as usize;
        pixels[offset..offset + 4].to_vec()
    };
    assert_eq!(pixels.len(), (TARGET_SIZE * TARGET_SIZE * 4) as usize);
    assert_ne!(pixel_at(TARGET_SIZE / 2, TARGET_SIZE / 2), pixel_at(0, 0));
}

#[test]
fn test_mismatched_target_format_is_rejected() {
    let records = scenario_records();
    let Some(gpu) = gpu_or_skip() else {
        return;
    };
    let mut target = OffscreenTarget::new(&gpu, TARGET_SIZE, TARGET_SIZE).unwrap();
    let mut driver = FrameDriver::from_records(
        gpu,
        SimulationConfig::default(),
        &KernelSource::Builtin,
        wgpu::TextureFormat::Bgra8Unorm,
        &records,
    )
    .unwrap();

    let err = driver.tick(&mut target).unwrap_err();
    let fault = err.downcast_ref::<GpuFault>().unwrap();
    assert_eq!(fault.kind(), "binding/layout mismatch");
    assert_eq!(driver.frame(), 0);
}

#[test]
fn test_seeded_driver_fills_both_slots_over_wide_target() {
    let Some(gpu) = gpu_or_skip() else {
        return;
    };
    let target = OffscreenTarget::new(&gpu, 96, 64).unwrap();
    let config = SimulationConfig {
        particle_count: 256,
        seed: Some(11),
        ..SimulationConfig::default()
    };
    let driver = FrameDriver::new(gpu, config, &KernelSource::Builtin, &target).unwrap();

    let slot_a = driver.read_slot(Slot::A).unwrap();
    let slot_b = driver.read_slot(Slot::B).unwrap();
    assert_eq!(slot_a.len(), 256);
    assert_eq!(slot_a, slot_b);
    for record in &slot_a {
        assert!(record.position[0].abs() <= ASPECT, "x out of domain: {:?}", record);
        assert!(record.position[1].abs() <= 1.0, "y out of domain: {:?}", record);
        assert_eq!(record.velocity, [0.0, 0.0]);
        assert_eq!(record.auxiliary, [ASPECT, 0.5]);
    }
}

#[test]
fn test_radius_wider_than_narrow_target_is_rejected() {
    let Some(gpu) = gpu_or_skip() else {
        return;
    };
    let target = OffscreenTarget::new(&gpu, 32, 64).unwrap();
    let config = SimulationConfig {
        particle_radius: 0.6,
        ..SimulationConfig::default()
    };

    assert!(FrameDriver::new(gpu, config, &KernelSource::Builtin, &target).is_err());
}

#[test]
fn test_invalid_parameter_update_keeps_current_block() {
    let records = scenario_records();
    let Some((mut driver, mut target)) = build(&records) else {
        return;
    };
    let before = driver.params();

    let rejected = [
        SimParams { damping: 2.0, ..before },
        SimParams { delta_t: -0.01, ..before },
        SimParams { gravity: f32::NAN, ..before },
        SimParams { particle_radius: 1.5, ..before },
    ];
    for params in rejected {
        assert!(driver.update_params(params).is_err(), "{:?} accepted", params);
        assert_eq!(driver.params(), before);
    }

    driver.tick(&mut target).unwrap();
    let expected = cpu_ref::simulate(&records, &before, 1);
    assert_records_close(&driver.snapshot().unwrap(), &expected);
}

#[test]
fn test_radius_update_resizes_drawn_disc() {
    let records = vec![ParticleRecord::at_rest(Vec2::ZERO, 1.0, 0.5)];
    let Some(gpu) = gpu_or_skip() else {
        return;
    };
    let mut target = OffscreenTarget::new(&gpu, TARGET_SIZE, TARGET_SIZE).unwrap();
    let config = SimulationConfig {
        particle_radius: 0.02,
        gravity: 0.0,
        ..SimulationConfig::default()
    };
    let mut driver =
        FrameDriver::from_records(gpu, config, &KernelSource::Builtin, target.format(), &records).unwrap();

    // About 0.2 clip units right of the particle centre.
    let rim_x = TARGET_SIZE / 2 + 6;
    let pixel_at = |pixels: &[u8], x: u32, y: u32| {
        let offset = ((y * TARGET_SIZE + x) * 4) as usize;
        pixels[offset..offset + 4].to_vec()
    };

    driver.tick(&mut target).unwrap();
    let small = target.capture(driver.gpu()).unwrap();
    assert_eq!(pixel_at(&small, rim_x, TARGET_SIZE / 2), pixel_at(&small, 0, 0));

    let params = SimParams {
        particle_radius: 0.25,
        ..driver.params()
    };
    driver.update_params(params).unwrap();
    assert_eq!(driver.config().particle_radius, 0.25);
    driver.tick(&mut target).unwrap();
    let large = target.capture(driver.gpu()).unwrap();
    assert_ne!(pixel_at(&large, rim_x, TARGET_SIZE / 2), pixel_at(&large, 0, 0));
}

/// Reports the pipeline's format but hands out a texture that cannot be
/// rendered into.
struct SampledOnlyTarget {
    texture: wgpu::Texture,
}

impl SampledOnlyTarget {
    fn new(gpu: &GpuContext) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Sampled Only Target"),
            size: wgpu::Extent3d {
                width: TARGET_SIZE,
                height: TARGET_SIZE,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OffscreenTarget::FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        Self { texture }
    }
}

impl FrameTarget for SampledOnlyTarget {
    fn format(&self) -> wgpu::TextureFormat {
        OffscreenTarget::FORMAT
    }

    fn size(&self) -> (u32, u32) {
        (TARGET_SIZE, TARGET_SIZE)
    }

    fn acquire(&mut self, _gpu: &GpuContext) -> anyhow::Result<Option<AcquiredFrame>> {
        let view = self.texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Some(AcquiredFrame::offscreen(view)))
    }
}

#[test]
fn test_rejected_submission_returns_driver_to_idle() {
    let records = scenario_records();
    let Some(gpu) = gpu_or_skip() else {
        return;
    };
    let mut target = SampledOnlyTarget::new(&gpu);
    let mut driver = FrameDriver::from_records(
        gpu,
        SimulationConfig::default(),
        &KernelSource::Builtin,
        target.format(),
        &records,
    )
    .unwrap();

    let err = driver.tick(&mut target).unwrap_err();

    let fault = err.downcast_ref::<GpuFault>().unwrap();
    assert_eq!(fault.kind(), "submission failure");
    assert_eq!(driver.state(), DriverState::Idle);
    assert_eq!(driver.frame(), 0);
    assert_eq!(driver.last_plan(), None);
}
