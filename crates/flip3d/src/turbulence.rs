//! Scalar turbulence field over fluid cells.
//!
//! Each fluid cell sums the relative motion of its fluid neighbours within a
//! radius, weighted towards neighbours that approach it head on.

use glam::Vec3;

use crate::array3d::{Array3D, GridIndex};
use crate::grid::{interpolate_trilinear, MacVelocityField, Material};

#[derive(Clone, Debug)]
pub struct TurbulenceField {
    cell_size: f32,
    field: Array3D<f32>,
}

impl TurbulenceField {
    pub fn new(isize: usize, jsize: usize, ksize: usize, cell_size: f32) -> Self {
        Self {
            cell_size,
            field: Array3D::new(isize, jsize, ksize, 0.0),
        }
    }

    pub fn field(&self) -> &Array3D<f32> {
        &self.field
    }

    /// Recompute from cell-centre velocities. `radius` is in world units.
    pub fn update(&mut self, velocity: &MacVelocityField, materials: &Array3D<Material>, radius: f32) {
        assert!(
            self.field.has_same_dimensions(materials),
            "turbulence field {:?} does not match material grid {:?}",
            self.field.dimensions(),
            materials.dimensions()
        );
        let dx = self.cell_size;
        let reach = (radius / dx).ceil() as i32;
        let (w, h, d) = materials.dimensions();

        let mut centre_velocity = Array3D::new(w, h, d, Vec3::ZERO);
        for g in materials.indices() {
            if materials[g] == Material::Fluid {
                centre_velocity[g] = velocity.velocity_at_cell_center(g.i as usize, g.j as usize, g.k as usize);
            }
        }

        self.field.fill(0.0);
        for g in materials.indices() {
            if materials[g] != Material::Fluid {
                continue;
            }
            let vi = centre_velocity[g];
            let mut turbulence = 0.0;
            for dk in -reach..=reach {
                for dj in -reach..=reach {
                    for di in -reach..=reach {
                        if di == 0 && dj == 0 && dk == 0 {
                            continue;
                        }
                        let n: GridIndex = g.offset(di, dj, dk);
                        if !materials.contains(n) || materials[n] != Material::Fluid {
                            continue;
                        }
                        // x_ij = x_i - x_j
                        let xij = Vec3::new(-di as f32, -dj as f32, -dk as f32) * dx;
                        let dist = xij.length();
                        if dist >= radius {
                            continue;
                        }
                        let vij = vi - centre_velocity[n];
                        let speed = vij.length();
                        if speed < 1e-6 {
                            continue;
                        }
                        let alignment = (vij / speed).dot(xij / dist);
                        turbulence += speed * (1.0 - alignment) * (1.0 - dist / radius);
                    }
                }
            }
            self.field[g] = turbulence / dx;
        }
    }

    /// Trilinear sample at a world position.
    pub fn sample(&self, pos: Vec3) -> f32 {
        interpolate_trilinear(&self.field, pos / self.cell_size - Vec3::splat(0.5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_flow_has_no_turbulence() {
        let mut field = MacVelocityField::new(8, 8, 8, 1.0);
        field.u_mut().fill(2.0);
        let mut materials = Array3D::new(8, 8, 8, Material::Air);
        for k in 2..6 {
            for j in 2..6 {
                for i in 2..6 {
                    materials.set(i, j, k, Material::Fluid);
                }
            }
        }
        let mut turbulence = TurbulenceField::new(8, 8, 8, 1.0);
        turbulence.update(&field, &materials, 2.0);
        assert!(turbulence.field().as_slice().iter().all(|&t| t.abs() < 1e-6));
    }

    #[test]
    fn test_converging_flow_is_turbulent() {
        let mut field = MacVelocityField::new(8, 8, 8, 1.0);
        // Left half moves right, right half moves left
        for k in 0..8 {
            for j in 0..8 {
                for i in 0..9 {
                    field.u_mut().set(i, j, k, if i <= 4 { 1.0 } else { -1.0 });
                }
            }
        }
        let mut materials = Array3D::new(8, 8, 8, Material::Air);
        for k in 2..6 {
            for j in 2..6 {
                for i in 2..6 {
                    materials.set(i, j, k, Material::Fluid);
                }
            }
        }
        let mut turbulence = TurbulenceField::new(8, 8, 8, 1.0);
        turbulence.update(&field, &materials, 2.0);
        assert!(turbulence.field().get(3, 3, 3) > 0.0);
        assert_eq!(turbulence.field().get(0, 0, 0), 0.0, "air cells stay zero");
        assert!(turbulence.sample(Vec3::new(3.5, 3.5, 3.5)) > 0.0);
    }
}
