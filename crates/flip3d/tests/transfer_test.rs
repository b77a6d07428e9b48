//! Particle/grid transfer tests
//!
//! Round trips through the MAC grid with both kernels and the PIC/FLIP blend.

use flip3d::transfer::{grid_to_particles, particles_to_grid, TransferBuffers};
use flip3d::{FaceAxis, MacVelocityField, MarkerParticle, Vec3, WeightingMode};

/// A jittered block of particles, four per cell, filling cells 2..6.
fn particle_block(velocity: Vec3) -> Vec<MarkerParticle> {
    let mut particles = Vec::new();
    for k in 2..6 {
        for j in 2..6 {
            for i in 2..6 {
                for s in 0..4 {
                    let jitter = Vec3::new(0.2 + 0.15 * s as f32, 0.7 - 0.1 * s as f32, 0.3 + 0.1 * s as f32);
                    particles.push(MarkerParticle::new(
                        Vec3::new(i as f32, j as f32, k as f32) + jitter,
                        velocity,
                    ));
                }
            }
        }
    }
    particles
}

#[test]
fn test_uniform_flow_survives_round_trip() {
    let velocity = Vec3::new(0.3, -1.2, 0.8);
    for mode in [WeightingMode::Trilinear, WeightingMode::Tricubic] {
        let mut field = MacVelocityField::new(8, 8, 8, 1.0);
        let mut buffers = TransferBuffers::new(&field, mode);
        let mut particles = particle_block(velocity);

        particles_to_grid(&mut field, &particles, &mut buffers);
        let saved = MacVelocityField::new(8, 8, 8, 1.0);
        grid_to_particles(&field, &saved, &mut particles, 1.0);

        for p in &particles {
            let interior = p.position.cmpge(Vec3::splat(3.0)).all() && p.position.cmplt(Vec3::splat(5.0)).all();
            if interior {
                assert!(
                    (p.velocity - velocity).length() < 1e-4,
                    "{:?}: particle at {:?} read {:?}",
                    mode,
                    p.position,
                    p.velocity
                );
            }
        }
    }
}

#[test]
fn test_unreached_faces_are_zero_and_unknown() {
    let mut field = MacVelocityField::new(8, 8, 8, 1.0);
    field.u_mut().fill(9.0);
    let mut buffers = TransferBuffers::new(&field, WeightingMode::Trilinear);
    let particles = particle_block(Vec3::ONE);

    particles_to_grid(&mut field, &particles, &mut buffers);
    assert_eq!(field.u().get(0, 0, 0), 0.0);
    assert!(!buffers.known(FaceAxis::U).get(0, 0, 0));
    assert!(buffers.known(FaceAxis::U).get(4, 4, 4));
}

#[test]
fn test_particle_order_does_not_change_grid() {
    let mut particles = particle_block(Vec3::ZERO);
    for (n, p) in particles.iter_mut().enumerate() {
        p.velocity = Vec3::new((n % 5) as f32, (n % 3) as f32 - 1.0, (n % 7) as f32 * 0.5);
    }
    let mut reversed = particles.clone();
    reversed.reverse();

    let mut a = MacVelocityField::new(8, 8, 8, 1.0);
    let mut b = MacVelocityField::new(8, 8, 8, 1.0);
    let mut buffers = TransferBuffers::new(&a, WeightingMode::Trilinear);
    particles_to_grid(&mut a, &particles, &mut buffers);
    particles_to_grid(&mut b, &reversed, &mut buffers);

    for axis in FaceAxis::ALL {
        for (x, y) in a.component(axis).as_slice().iter().zip(b.component(axis).as_slice()) {
            assert!((x - y).abs() < 1e-4, "{:?} face differs: {} vs {}", axis, x, y);
        }
    }
}

#[test]
fn test_flip_blend_keeps_particle_detail() {
    let mut grid = MacVelocityField::new(8, 8, 8, 1.0);
    let saved = grid.clone();
    grid.v_mut().fill(-0.5);

    let mut particles = vec![
        MarkerParticle::new(Vec3::splat(4.0), Vec3::new(1.0, 0.0, 0.0)),
        MarkerParticle::new(Vec3::splat(4.2), Vec3::new(-1.0, 0.0, 0.0)),
    ];
    grid_to_particles(&grid, &saved, &mut particles, 0.05);

    // Each keeps 95% of its own horizontal motion and gains the grid change
    assert!((particles[0].velocity.x - 0.95).abs() < 1e-5);
    assert!((particles[1].velocity.x + 0.95).abs() < 1e-5);
    for p in &particles {
        assert!((p.velocity.y + 0.5).abs() < 1e-5, "got {:?}", p.velocity);
    }
}
