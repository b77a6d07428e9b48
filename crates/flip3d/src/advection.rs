//! Velocity-field and particle advection for 3D PIC/FLIP.

use glam::Vec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::array3d::Array3D;
use crate::classify::SolidMask;
use crate::collision::{clamp_velocity_to_surface, escape_solid, trace_path, PathOutcome};
use crate::grid::{is_face_bordering_value, FaceAxis, MacVelocityField, Material};
use crate::particle::MarkerParticle;

/// Runge-Kutta order used for path integration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Integrator {
    Rk2,
    Rk3,
    #[default]
    Rk4,
}

/// Integrate `position` through `field` for `dt` (negative traces backward).
pub fn integrate(field: &MacVelocityField, position: Vec3, dt: f32, order: Integrator) -> Vec3 {
    let vel = |p: Vec3| field.evaluate_velocity_at_position(p);
    match order {
        Integrator::Rk2 => {
            let k1 = vel(position);
            let k2 = vel(position + 0.5 * dt * k1);
            position + dt * k2
        }
        Integrator::Rk3 => {
            let k1 = vel(position);
            let k2 = vel(position + 0.5 * dt * k1);
            let k3 = vel(position + 0.75 * dt * k2);
            position + dt * ((2.0 / 9.0) * k1 + (3.0 / 9.0) * k2 + (4.0 / 9.0) * k3)
        }
        Integrator::Rk4 => {
            let k1 = vel(position);
            let k2 = vel(position + 0.5 * dt * k1);
            let k3 = vel(position + 0.5 * dt * k2);
            let k4 = vel(position + dt * k3);
            position + (dt / 6.0) * (k1 + 2.0 * k2 + 2.0 * k3 + k4)
        }
    }
}

/// Semi-Lagrangian advection of the velocity field.
///
/// Faces bordering fluid are traced backward through `field` and resampled;
/// all other faces keep their value. Results go to `out` so no read sees a
/// partially updated field.
pub fn advect_velocity_field(
    field: &MacVelocityField,
    out: &mut MacVelocityField,
    materials: &Array3D<Material>,
    dt: f32,
    order: Integrator,
) {
    assert_eq!(
        field.dimensions(),
        materials.dimensions(),
        "velocity field and material grid differ"
    );
    out.copy_from(field);

    for axis in FaceAxis::ALL {
        let (w, h, d) = field.component(axis).dimensions();
        let target = out.component_mut(axis);
        for k in 0..d {
            for j in 0..h {
                for i in 0..w {
                    if !is_face_bordering_value(materials, axis, i as i32, j as i32, k as i32, Material::Fluid) {
                        continue;
                    }
                    let start = field.face_position(axis, i, j, k);
                    let back = integrate(field, start, -dt, order);
                    target.set(i, j, k, field.evaluate_component(axis, back));
                }
            }
        }
    }
}

/// Per-step particle advection settings.
#[derive(Clone, Copy, Debug)]
pub struct AdvanceParams {
    pub dt: f32,
    pub order: Integrator,
    /// Displacement cap in world units.
    pub max_distance: f32,
    /// Offset of a collided particle from the solid face, world units.
    pub collision_epsilon: f32,
}

/// Move one particle. Returns `false` when it must be removed.
pub fn advance_particle(
    particle: &mut MarkerParticle,
    field: &MacVelocityField,
    solids: &SolidMask,
    params: &AdvanceParams,
) -> bool {
    if !particle.is_finite() {
        return false;
    }
    let dx = field.cell_size;

    let start = match escape_solid(particle.position, solids, dx) {
        Some(p) => p,
        None => return false,
    };

    let mut end = integrate(field, start, params.dt, params.order);
    let step = end - start;
    let dist = step.length();
    if dist > params.max_distance {
        end = start + step * (params.max_distance / dist);
    }
    if !end.is_finite() {
        return false;
    }

    match trace_path(start, end, solids, dx, params.collision_epsilon) {
        PathOutcome::Free(p) => particle.position = p,
        PathOutcome::Hit { position, normal } => {
            particle.position = position;
            particle.velocity = clamp_velocity_to_surface(particle.velocity, normal);
        }
    }
    field.is_position_in_grid(particle.position)
}

/// Advance every marker particle on `pool`.
///
/// The particle list is cut into `ceil(n / threads)` contiguous chunks, one
/// per task; each task writes only its own chunk and keep flags. Returns the
/// number of removed particles, preserving the order of the rest.
pub fn advance_marker_particles(
    pool: &rayon::ThreadPool,
    particles: &mut Vec<MarkerParticle>,
    field: &MacVelocityField,
    solids: &SolidMask,
    params: &AdvanceParams,
) -> usize {
    let n = particles.len();
    if n == 0 {
        return 0;
    }
    let chunk = n.div_ceil(pool.current_num_threads().max(1));
    let mut keep = vec![true; n];

    pool.install(|| {
        particles
            .par_chunks_mut(chunk)
            .zip(keep.par_chunks_mut(chunk))
            .for_each(|(range, flags)| {
                for (particle, flag) in range.iter_mut().zip(flags.iter_mut()) {
                    *flag = advance_particle(particle, field, solids, params);
                }
            });
    });

    let before = particles.len();
    let mut flags = keep.iter();
    particles.retain(|_| flags.next().copied().unwrap_or(false));
    before - particles.len()
}
