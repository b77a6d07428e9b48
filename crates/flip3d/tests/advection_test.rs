//! Advection tests
//!
//! Threaded marker particle advance against solids, and semi-Lagrangian
//! field advection. Property tests check that a still field never moves a
//! particle, whatever the thread count.

use flip3d::advection::{advance_marker_particles, advect_velocity_field, AdvanceParams};
use flip3d::array3d::{Array3D, GridIndex};
use flip3d::classify::SolidMask;
use flip3d::{Integrator, MacVelocityField, MarkerParticle, Material, Vec3};
use proptest::prelude::*;

const N: usize = 10;

fn pool(threads: usize) -> rayon::ThreadPool {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .unwrap()
}

fn params(dt: f32) -> AdvanceParams {
    AdvanceParams {
        dt,
        order: Integrator::Rk4,
        max_distance: 2.5,
        collision_epsilon: 0.01,
    }
}

/// Strategy for positions inside the non-solid interior of an `N`-cell box.
fn interior_position() -> impl Strategy<Value = Vec3> {
    let hi = (N - 1) as f32 - 1e-3;
    (1.0f32..hi, 1.0f32..hi, 1.0f32..hi).prop_map(|(x, y, z)| Vec3::new(x, y, z))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: a zero velocity field leaves every particle where it is
    #[test]
    fn test_zero_field_never_moves_particles(
        positions in prop::collection::vec(interior_position(), 1..60),
        threads in 1usize..5,
    ) {
        let field = MacVelocityField::new(N, N, N, 1.0);
        let solids = SolidMask::with_border(N, N, N);
        let mut particles: Vec<_> = positions.iter().map(|&p| MarkerParticle::at(p)).collect();

        let removed = advance_marker_particles(&pool(threads), &mut particles, &field, &solids, &params(0.1));

        prop_assert_eq!(removed, 0);
        for (p, &start) in particles.iter().zip(&positions) {
            prop_assert_eq!(p.position, start);
        }
    }

    /// Property: particles never end a step inside a solid cell
    #[test]
    fn test_particles_never_enter_solids(
        positions in prop::collection::vec(interior_position(), 1..40),
        velocity in (-20.0f32..20.0, -20.0f32..20.0, -20.0f32..20.0),
    ) {
        let mut field = MacVelocityField::new(N, N, N, 1.0);
        field.u_mut().fill(velocity.0);
        field.v_mut().fill(velocity.1);
        field.w_mut().fill(velocity.2);
        let mut solids = SolidMask::with_border(N, N, N);
        solids.add(&[GridIndex::new(5, 5, 5), GridIndex::new(4, 5, 5), GridIndex::new(5, 4, 5)]);
        let mut particles: Vec<_> = positions
            .iter()
            .map(|&p| MarkerParticle::new(p, Vec3::new(velocity.0, velocity.1, velocity.2)))
            .collect();

        advance_marker_particles(&pool(3), &mut particles, &field, &solids, &params(0.2));

        for p in &particles {
            let cell = flip3d::grid::position_to_cell(p.position, 1.0);
            prop_assert!(!solids.is_solid(cell), "particle {:?} ended in solid {:?}", p.position, cell);
        }
    }
}

#[test]
fn test_particle_sliding_along_floor_keeps_tangential_velocity() {
    let mut field = MacVelocityField::new(N, N, N, 1.0);
    field.u_mut().fill(2.0);
    field.v_mut().fill(-8.0);
    let solids = SolidMask::with_border(N, N, N);
    let mut particles = vec![MarkerParticle::new(Vec3::new(3.5, 1.5, 4.5), Vec3::new(2.0, -8.0, 0.0))];

    advance_marker_particles(&pool(2), &mut particles, &field, &solids, &params(0.25));

    let p = particles[0];
    assert!(p.position.y >= 1.0, "penetrated the floor: {:?}", p.position);
    assert_eq!(p.velocity.x, 2.0, "tangential velocity kept");
    assert_eq!(p.velocity.y, 0.0, "normal velocity removed");
}

#[test]
fn test_particle_inside_new_solid_escapes_to_neighbour() {
    let field = MacVelocityField::new(N, N, N, 1.0);
    let mut solids = SolidMask::with_border(N, N, N);
    solids.add(&[GridIndex::new(4, 4, 4)]);
    let mut particles = vec![MarkerParticle::at(Vec3::splat(4.5))];

    let removed = advance_marker_particles(&pool(1), &mut particles, &field, &solids, &params(0.1));

    assert_eq!(removed, 0);
    let cell = flip3d::grid::position_to_cell(particles[0].position, 1.0);
    assert!(!solids.is_solid(cell));
    assert_eq!(particles[0].position, Vec3::new(3.5, 4.5, 4.5), "first free face neighbour is -i");
}

#[test]
fn test_field_advection_moves_a_velocity_bump_downstream() {
    let mut materials = Array3D::new(N, N, N, Material::Fluid);
    for g in materials.indices() {
        if [g.i, g.j, g.k].iter().any(|&c| c == 0 || c as usize == N - 1) {
            materials[g] = Material::Solid;
        }
    }
    let mut field = MacVelocityField::new(N, N, N, 1.0);
    field.u_mut().fill(1.0);
    // A w bump at x = 3.5
    for j in 0..N {
        for k in 0..=N {
            field.w_mut().set(3, j, k, 1.0);
        }
    }

    let mut out = MacVelocityField::new(N, N, N, 1.0);
    advect_velocity_field(&field, &mut out, &materials, 1.0, Integrator::Rk2);

    assert!((out.w().get(4, 5, 5) - 1.0).abs() < 1e-5, "bump moved one cell in +x");
    assert!(out.w().get(3, 5, 5).abs() < 1e-5, "old bump location cleared");
}
