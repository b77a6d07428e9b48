//! Particle-Grid transfer functions for 3D PIC/FLIP.
//!
//! P2G: Splat particle velocity components onto their face grids and divide by
//! the accumulated kernel weight.
//! G2P: Sample the projected grid and blend PIC with the FLIP grid delta.

use glam::Vec3;
use rayon::prelude::*;

use crate::array3d::Array3D;
use crate::grid::{FaceAxis, MacVelocityField};
use crate::implicit_field::ImplicitField;
use crate::kernels::WeightingMode;
use crate::particle::MarkerParticle;

/// Pre-allocated splat fields and known-face masks, reused every step.
pub struct TransferBuffers {
    fields: [ImplicitField; 3],
    known: [Array3D<bool>; 3],
}

impl TransferBuffers {
    /// Create buffers sized for the given velocity field.
    pub fn new(velocity: &MacVelocityField, mode: WeightingMode) -> Self {
        let (isize, jsize, ksize) = velocity.dimensions();
        let dx = velocity.cell_size;
        let field = |axis: FaceAxis| {
            let (w, h, d) = axis.dimensions(isize, jsize, ksize);
            ImplicitField::new(w, h, d, dx, axis.sample_offset(), dx, mode)
        };
        let mask = |axis: FaceAxis| {
            let (w, h, d) = axis.dimensions(isize, jsize, ksize);
            Array3D::new(w, h, d, false)
        };

        Self {
            fields: [field(FaceAxis::U), field(FaceAxis::V), field(FaceAxis::W)],
            known: [mask(FaceAxis::U), mask(FaceAxis::V), mask(FaceAxis::W)],
        }
    }

    /// Clear all buffers to zero.
    pub fn clear(&mut self) {
        for f in &mut self.fields {
            f.clear();
        }
        for k in &mut self.known {
            k.fill(false);
        }
    }

    /// Faces of `axis` that received particle weight in the last scatter.
    pub fn known(&self, axis: FaceAxis) -> &Array3D<bool> {
        &self.known[axis_slot(axis)]
    }

    /// All three known-face masks, in U, V, W order.
    pub fn known_faces(&self) -> &[Array3D<bool>; 3] {
        &self.known
    }
}

#[inline]
fn axis_slot(axis: FaceAxis) -> usize {
    match axis {
        FaceAxis::U => 0,
        FaceAxis::V => 1,
        FaceAxis::W => 2,
    }
}

/// Transfer particle velocities to grid (P2G).
///
/// Every face becomes the kernel-weighted average of nearby particle
/// velocities. Faces no particle reaches are zeroed and flagged unknown.
/// Summation is commutative so particle order does not change the result.
pub fn particles_to_grid(
    velocity: &mut MacVelocityField,
    particles: &[MarkerParticle],
    buffers: &mut TransferBuffers,
) {
    buffers.clear();

    for particle in particles {
        for axis in FaceAxis::ALL {
            let slot = axis_slot(axis);
            buffers.fields[slot].add_point_value(particle.position, axis.component(particle.velocity));
        }
    }

    for axis in FaceAxis::ALL {
        let slot = axis_slot(axis);
        let TransferBuffers { fields, known } = &mut *buffers;
        fields[slot].normalized(velocity.component_mut(axis), &mut known[slot]);
    }
}

/// Transfer grid velocities to particles (G2P) with PIC/FLIP blending.
///
/// `saved` is the field before body forces and projection:
/// `v = pic * v_grid + (1 - pic) * (v_particle + v_grid - v_saved)`.
pub fn grid_to_particles(
    velocity: &MacVelocityField,
    saved: &MacVelocityField,
    particles: &mut [MarkerParticle],
    pic_ratio: f32,
) {
    assert!(
        (0.0..=1.0).contains(&pic_ratio),
        "pic_ratio must be in [0, 1], got {}",
        pic_ratio
    );

    particles.par_iter_mut().for_each(|particle| {
        let pos = particle.position;
        let new_vel = velocity.evaluate_velocity_at_position(pos);
        let old_vel = saved.evaluate_velocity_at_position(pos);

        let flip_velocity = particle.velocity + (new_vel - old_vel);
        let pic_velocity = new_vel;
        let final_vel = pic_ratio * pic_velocity + (1.0 - pic_ratio) * flip_velocity;

        // Safety: NaN/Inf check
        particle.velocity = if final_vel.is_finite() {
            final_vel
        } else {
            Vec3::ZERO
        };
    });
}
