//! Implicit scalar field built by splatting points onto a grid of samples.
//!
//! Sample `(i, j, k)` sits at `(i, j, k) + offset` cells. Cell-centred fields
//! use an offset of `0.5` on every axis; a velocity component uses the face
//! offset of its axis.

use glam::Vec3;

use crate::array3d::Array3D;
use crate::kernels::WeightingMode;

/// Weights below this are treated as "no particle reached this sample".
pub const MIN_WEIGHT: f32 = 1e-6;

#[derive(Clone, Debug)]
pub struct ImplicitField {
    cell_size: f32,
    offset: Vec3,
    radius: f32,
    mode: WeightingMode,
    field: Array3D<f32>,
    weights: Array3D<f32>,
}

impl ImplicitField {
    /// Field of `width x height x depth` samples with a kernel of `radius` world units.
    pub fn new(
        width: usize,
        height: usize,
        depth: usize,
        cell_size: f32,
        offset: Vec3,
        radius: f32,
        mode: WeightingMode,
    ) -> Self {
        assert!(cell_size > 0.0, "cell_size must be positive, got {}", cell_size);
        assert!(radius > 0.0, "radius must be positive, got {}", radius);
        Self {
            cell_size,
            offset,
            radius,
            mode,
            field: Array3D::new(width, height, depth, 0.0),
            weights: Array3D::new(width, height, depth, 0.0),
        }
    }

    pub fn dimensions(&self) -> (usize, usize, usize) {
        self.field.dimensions()
    }

    pub fn clear(&mut self) {
        self.field.fill(0.0);
        self.weights.fill(0.0);
    }

    /// Add a unit-strength point: every sample in range gains its kernel weight.
    pub fn add_point(&mut self, position: Vec3) {
        self.splat(position, |field, weights, idx, w| {
            field[idx] += w;
            weights[idx] += w;
        });
    }

    /// Add a point carrying `value`. Use [`ImplicitField::normalized`] to read the
    /// weighted average.
    pub fn add_point_value(&mut self, position: Vec3, value: f32) {
        self.splat(position, |field, weights, idx, w| {
            field[idx] += w * value;
            weights[idx] += w;
        });
    }

    fn splat<F>(&mut self, position: Vec3, mut apply: F)
    where
        F: FnMut(&mut [f32], &mut [f32], usize, f32),
    {
        let (w, h, d) = self.field.dimensions();
        if w == 0 || h == 0 || d == 0 {
            return;
        }
        let g = position / self.cell_size - self.offset;
        let r = self.radius / self.cell_size;
        let lo = (g - Vec3::splat(r)).ceil().max(Vec3::ZERO);
        let hi = (g + Vec3::splat(r)).floor();
        if hi.x < 0.0 || hi.y < 0.0 || hi.z < 0.0 {
            return;
        }
        let i_hi = (hi.x as usize).min(w - 1);
        let j_hi = (hi.y as usize).min(h - 1);
        let k_hi = (hi.z as usize).min(d - 1);

        let width = w;
        let height = h;
        let field = self.field.as_mut_slice();
        let weights = self.weights.as_mut_slice();
        for k in lo.z as usize..=k_hi {
            for j in lo.y as usize..=j_hi {
                for i in lo.x as usize..=i_hi {
                    let delta = (Vec3::new(i as f32, j as f32, k as f32) - g) * self.cell_size;
                    let weight = self.mode.weight(delta, self.radius);
                    if weight > 0.0 {
                        apply(field, weights, i + width * (j + height * k), weight);
                    }
                }
            }
        }
    }

    /// Raw accumulated field.
    pub fn field(&self) -> &Array3D<f32> {
        &self.field
    }

    /// Weighted average into `out`; `known` flags samples that received weight.
    /// Unknown samples are written as zero.
    pub fn normalized(&self, out: &mut Array3D<f32>, known: &mut Array3D<bool>) {
        assert!(
            out.has_same_dimensions(&self.field) && known.has_same_dimensions(&self.field),
            "normalized output must match field dimensions {:?}",
            self.field.dimensions()
        );
        let values = self.field.as_slice().iter().zip(self.weights.as_slice());
        for ((o, k), (&v, &w)) in out
            .as_mut_slice()
            .iter_mut()
            .zip(known.as_mut_slice().iter_mut())
            .zip(values)
        {
            if w > MIN_WEIGHT {
                *o = v / w;
                *k = true;
            } else {
                *o = 0.0;
                *k = false;
            }
        }
    }
}
