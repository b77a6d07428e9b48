//! Signed distance to the liquid surface at cell centres.
//!
//! Negative inside fluid, positive outside. Seeds half a cell either side of
//! every fluid/non-fluid cell boundary, then fast-sweeps the Eikonal equation
//! in 8 diagonal directions.

use glam::Vec3;

use crate::array3d::{Array3D, GridIndex};
use crate::grid::{interpolate_trilinear, Material};

#[derive(Clone, Debug)]
pub struct LevelSet {
    cell_size: f32,
    phi: Array3D<f32>,
    curvature: Array3D<f32>,
}

impl LevelSet {
    pub fn new(isize: usize, jsize: usize, ksize: usize, cell_size: f32) -> Self {
        assert!(cell_size > 0.0, "cell_size must be positive, got {}", cell_size);
        let far = (isize + jsize + ksize) as f32 * cell_size;
        Self {
            cell_size,
            phi: Array3D::new(isize, jsize, ksize, far),
            curvature: Array3D::new(isize, jsize, ksize, 0.0),
        }
    }

    /// Signed distance grid.
    pub fn phi(&self) -> &Array3D<f32> {
        &self.phi
    }

    /// Dimensionless mean curvature (`div n * dx`) at cell centres.
    pub fn curvature(&self) -> &Array3D<f32> {
        &self.curvature
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Rebuild from the fluid cells of `materials`.
    pub fn compute(&mut self, materials: &Array3D<Material>) {
        assert!(
            self.phi.has_same_dimensions(materials),
            "level set {:?} does not match material grid {:?}",
            self.phi.dimensions(),
            materials.dimensions()
        );
        let dx = self.cell_size;
        let (w, h, d) = self.phi.dimensions();
        let sentinel = (w + h + d) as f32 * dx; // Max possible distance

        let is_fluid = |g: GridIndex| materials.contains(g) && materials[g] == Material::Fluid;

        // Initialize: fluid = large negative, everything else = large positive
        for g in materials.indices() {
            let inside = is_fluid(g);
            let boundary = g
                .neighbours()
                .iter()
                .any(|&n| materials.contains(n) && is_fluid(n) != inside);
            self.phi[g] = match (inside, boundary) {
                (true, true) => -0.5 * dx,
                (true, false) => -sentinel,
                (false, true) => 0.5 * dx,
                (false, false) => sentinel,
            };
        }

        // Fast sweeping in 8 diagonal directions
        let sweeps: [(i32, i32, i32); 8] = [
            (1, 1, 1),
            (-1, 1, 1),
            (1, -1, 1),
            (-1, -1, 1),
            (1, 1, -1),
            (-1, 1, -1),
            (1, -1, -1),
            (-1, -1, -1),
        ];
        for _ in 0..2 {
            for &(di, dj, dk) in &sweeps {
                sweep(&mut self.phi, di, dj, dk, dx);
            }
        }

        self.compute_curvature();
    }

    fn compute_curvature(&mut self) {
        let (w, h, d) = self.phi.dimensions();
        let mut normals = Array3D::new(w, h, d, Vec3::ZERO);
        for g in self.phi.indices() {
            normals[g] = self.cell_gradient(g).normalize_or_zero();
        }
        let at = |g: GridIndex| normals[clamp_index(g, w, h, d)];
        for g in self.phi.indices() {
            let div = (at(g.offset(1, 0, 0)).x - at(g.offset(-1, 0, 0)).x)
                + (at(g.offset(0, 1, 0)).y - at(g.offset(0, -1, 0)).y)
                + (at(g.offset(0, 0, 1)).z - at(g.offset(0, 0, -1)).z);
            // div(n) * dx with central differences over 2 dx
            self.curvature[g] = 0.5 * div;
        }
    }

    /// Central-difference gradient at a cell centre, one-sided at the edges.
    fn cell_gradient(&self, g: GridIndex) -> Vec3 {
        let (w, h, d) = self.phi.dimensions();
        let at = |g: GridIndex| self.phi[clamp_index(g, w, h, d)];
        Vec3::new(
            at(g.offset(1, 0, 0)) - at(g.offset(-1, 0, 0)),
            at(g.offset(0, 1, 0)) - at(g.offset(0, -1, 0)),
            at(g.offset(0, 0, 1)) - at(g.offset(0, 0, -1)),
        ) / (2.0 * self.cell_size)
    }

    /// Sample signed distance at world position using trilinear interpolation.
    pub fn sample(&self, pos: Vec3) -> f32 {
        interpolate_trilinear(&self.phi, pos / self.cell_size - Vec3::splat(0.5))
    }

    pub fn sample_curvature(&self, pos: Vec3) -> f32 {
        interpolate_trilinear(&self.curvature, pos / self.cell_size - Vec3::splat(0.5))
    }

    /// Outward surface normal (gradient of the distance field).
    pub fn normal(&self, pos: Vec3) -> Vec3 {
        let eps = self.cell_size * 0.1;
        let dx = self.sample(pos + Vec3::X * eps) - self.sample(pos - Vec3::X * eps);
        let dy = self.sample(pos + Vec3::Y * eps) - self.sample(pos - Vec3::Y * eps);
        let dz = self.sample(pos + Vec3::Z * eps) - self.sample(pos - Vec3::Z * eps);

        let grad = Vec3::new(dx, dy, dz);
        let len = grad.length();
        if len > 1e-6 {
            grad / len
        } else {
            Vec3::Y // Default to up if gradient is zero
        }
    }
}

#[inline]
fn clamp_index(g: GridIndex, w: usize, h: usize, d: usize) -> GridIndex {
    GridIndex::new(
        g.i.clamp(0, w as i32 - 1),
        g.j.clamp(0, h as i32 - 1),
        g.k.clamp(0, d as i32 - 1),
    )
}

/// Single sweep pass in given direction using Eikonal solver.
fn sweep(phi: &mut Array3D<f32>, di: i32, dj: i32, dk: i32, dx: f32) {
    let (w, h, d) = phi.dimensions();
    let ordered = |n: usize, dir: i32| -> Vec<usize> {
        if dir > 0 {
            (0..n).collect()
        } else {
            (0..n).rev().collect()
        }
    };
    let is = ordered(w, di);
    let js = ordered(h, dj);
    let ks = ordered(d, dk);

    type Cell = Option<(usize, usize, usize)>;
    let neighbour_min = |phi: &Array3D<f32>, a: Cell, b: Cell, sign: f32| {
        let value = |c: Cell| match c {
            Some(c) if sign * phi[c] >= 0.0 => sign * phi[c],
            _ => f32::INFINITY,
        };
        value(a).min(value(b))
    };

    for &k in &ks {
        for &j in &js {
            for &i in &is {
                let val = phi[(i, j, k)];
                let sign = if val >= 0.0 { 1.0 } else { -1.0 };
                let xm = (i > 0).then(|| (i - 1, j, k));
                let xp = (i + 1 < w).then(|| (i + 1, j, k));
                let ym = (j > 0).then(|| (i, j - 1, k));
                let yp = (j + 1 < h).then(|| (i, j + 1, k));
                let zm = (k > 0).then(|| (i, j, k - 1));
                let zp = (k + 1 < d).then(|| (i, j, k + 1));

                // Upwind values on the same side of the interface
                let phi_x = neighbour_min(&*phi, xm, xp, sign);
                let phi_y = neighbour_min(&*phi, ym, yp, sign);
                let phi_z = neighbour_min(&*phi, zm, zp, sign);
                let candidate = eikonal_update([phi_x, phi_y, phi_z], dx);
                if candidate.is_finite() {
                    phi[(i, j, k)] = sign * (sign * val).min(candidate);
                }
            }
        }
    }
}

/// Upwind Eikonal update for one cell.
///
/// `upwind` holds the same-side neighbour magnitude along each axis, infinite
/// where an axis has none. Returns the smallest `φ` satisfying
/// `Σ (φ - a)² = dx²` over the values `a < φ`, or infinity if every entry is.
fn eikonal_update(mut upwind: [f32; 3], dx: f32) -> f32 {
    upwind.sort_unstable_by(f32::total_cmp);
    let (mut sum, mut sum_sq) = (0.0, 0.0);
    let mut phi = f32::INFINITY;
    for (n, &a) in upwind.iter().enumerate() {
        // Axes at or beyond the current solution do not constrain it
        if !a.is_finite() || phi <= a {
            break;
        }
        sum += a;
        sum_sq += a * a;
        let axes = (n + 1) as f32;
        let disc = sum * sum - axes * (sum_sq - dx * dx);
        if disc < 0.0 {
            break;
        }
        phi = (sum + disc.sqrt()) / axes;
    }
    phi
}
