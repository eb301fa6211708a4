use pingpong_particles::particle::{ParticleRecord, Scatter};
use rand::{rngs::StdRng, SeedableRng};

fn scatter(seed: u64, aspect: f32, count: usize) -> Vec<ParticleRecord> {
    let mut scatter = Scatter::new(StdRng::seed_from_u64(seed), aspect, 0.5);
    (0..count).map(|_| scatter.next_record()).collect()
}

#[test]
fn test_seeded_positions_cover_viewport_only() {
    for aspect in [0.5, 1.0, 16.0 / 9.0, 3.0] {
        for record in scatter(42, aspect, 5_000) {
            assert!(record.position[0].abs() <= aspect, "x out of range for aspect {}", aspect);
            assert!(record.position[1].abs() <= 1.0);
        }
    }
}

#[test]
fn test_seeded_velocities_are_zero() {
    for record in scatter(3, 1.6, 1_000) {
        assert_eq!(record.velocity, [0.0, 0.0]);
    }
}

#[test]
fn test_auxiliary_carries_aspect_and_scalar() {
    for record in scatter(9, 1.25, 100) {
        assert_eq!(record.auxiliary, [1.25, 0.5]);
    }
}

#[test]
fn test_scatter_uses_whole_width() {
    let records = scatter(1, 2.0, 5_000);
    let max_x = records.iter().map(|r| r.position[0]).fold(f32::MIN, f32::max);
    let min_x = records.iter().map(|r| r.position[0]).fold(f32::MAX, f32::min);
    assert!(max_x > 1.8, "scatter never reached the right edge: {}", max_x);
    assert!(min_x < -1.8, "scatter never reached the left edge: {}", min_x);
}

#[test]
fn test_different_seeds_differ() {
    assert_ne!(scatter(1, 1.0, 8), scatter(2, 1.0, 8));
}
