//! Host-side mirror of `shaders/compute.wgsl`.
//!
//! Same integration order and edge policy as the kernel, so it serves as the
//! oracle for GPU parity tests and for reasoning about a single step.

use glam::Vec2;

use crate::{params::SimParams, particle::ParticleRecord};

/// Work-items per compute batch; must match `@workgroup_size` in the kernel.
pub const WORKGROUP_SIZE: u32 = 64;

pub fn workgroup_count(particle_total: u32) -> u32 {
    particle_total.div_ceil(WORKGROUP_SIZE)
}

/// One semi-implicit Euler step with damped reflection at the domain edges.
pub fn step_particle(source: &ParticleRecord, params: &SimParams) -> ParticleRecord {
    let mut velocity = source.velocity();
    velocity.y += params.gravity * params.delta_t;
    let position = source.position() + velocity * params.delta_t;

    let (x, vx) = reflect_axis(position.x, velocity.x, source.aspect_ratio(), params);
    let (y, vy) = reflect_axis(position.y, velocity.y, 1.0, params);

    ParticleRecord {
        position: [x, y],
        velocity: [vx, vy],
        auxiliary: source.auxiliary,
    }
}

fn reflect_axis(p: f32, v: f32, half_extent: f32, params: &SimParams) -> (f32, f32) {
    let limit = half_extent - params.particle_radius;
    if p > limit && v > 0.0 {
        (limit, -v * params.damping)
    } else if p < -limit && v < 0.0 {
        (-limit, -v * params.damping)
    } else {
        (p, v)
    }
}

/// Runs a full dispatch over `workgroup_count(source.len())` batches.
///
/// `destination` may be longer than `source`; work-items past the particle
/// count write nothing, exactly like the kernel's bounds guard.
pub fn dispatch(source: &[ParticleRecord], destination: &mut [ParticleRecord], params: &SimParams) {
    let particle_total = source.len().min(destination.len()) as u32;
    let invocations = workgroup_count(particle_total) * WORKGROUP_SIZE;

    for index in 0..invocations {
        if index >= particle_total {
            continue;
        }
        let i = index as usize;
        destination[i] = step_particle(&source[i], params);
    }
}

/// Advances `records` by `frames` steps through two host-side slots.
pub fn simulate(records: &[ParticleRecord], params: &SimParams, frames: u64) -> Vec<ParticleRecord> {
    let mut slots = [records.to_vec(), records.to_vec()];
    for frame in 0..frames {
        let source = (frame % 2) as usize;
        let (a, b) = slots.split_at_mut(1);
        let (src, dst) = if source == 0 { (&a[0], &mut b[0]) } else { (&b[0], &mut a[0]) };
        dispatch(src, dst, params);
    }
    slots[(frames % 2) as usize].clone()
}

/// Largest displacement between two snapshots, handy for parity checks.
pub fn max_position_delta(a: &[ParticleRecord], b: &[ParticleRecord]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(lhs, rhs)| lhs.position().distance(rhs.position()))
        .fold(0.0, f32::max)
}

pub fn kinetic_energy(records: &[ParticleRecord]) -> f32 {
    records
        .iter()
        .map(|r| 0.5 * r.velocity().length_squared())
        .sum()
}

pub fn centroid(records: &[ParticleRecord]) -> Vec2 {
    if records.is_empty() {
        return Vec2::ZERO;
    }
    records.iter().map(ParticleRecord::position).sum::<Vec2>() / records.len() as f32
}
