//! 3D weighting kernels for particle splatting.
//!
//! Both kernels are normalised to a support `radius`: a sample farther than
//! the radius along any axis (trilinear) or in distance (tricubic) gets no weight.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Kernel used when splatting particles onto grid samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightingMode {
    /// Tensor product of 1D hat functions.
    #[default]
    Trilinear,
    /// Smooth radial falloff `1 - 4/9 q^6 + 17/9 q^4 - 22/9 q^2`.
    Tricubic,
}

impl WeightingMode {
    /// Weight of a sample at offset `delta` from the particle.
    #[inline]
    pub fn weight(self, delta: Vec3, radius: f32) -> f32 {
        match self {
            WeightingMode::Trilinear => trilinear_3d(delta / radius),
            WeightingMode::Tricubic => tricubic_3d(delta.length_squared() / (radius * radius)),
        }
    }
}

/// 1D hat function. Support: [-1, 1]
#[inline]
pub fn hat_1d(r: f32) -> f32 {
    let r_abs = r.abs();
    if r_abs < 1.0 {
        1.0 - r_abs
    } else {
        0.0
    }
}

/// Trilinear (tensor product of hat functions) on a unit-normalised delta.
#[inline]
pub fn trilinear_3d(q: Vec3) -> f32 {
    hat_1d(q.x) * hat_1d(q.y) * hat_1d(q.z)
}

/// Tricubic falloff on the squared normalised distance `q2 = (r/R)^2`.
#[inline]
pub fn tricubic_3d(q2: f32) -> f32 {
    if q2 >= 1.0 {
        return 0.0;
    }
    let q4 = q2 * q2;
    let q6 = q4 * q2;
    1.0 - (4.0 / 9.0) * q6 + (17.0 / 9.0) * q4 - (22.0 / 9.0) * q2
}
