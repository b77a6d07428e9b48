//! Pressure projection for 3D incompressible flow.
//!
//! Assembles the 7-point pressure matrix over fluid cells only, builds a
//! MIC(0) preconditioner, and solves with preconditioned conjugate gradient
//! in `f64`. Air cells are Dirichlet (p = 0); solid faces carry no flux.

use crate::array3d::{Array3D, GridIndex};
use crate::constants::{MIC_SIGMA, MIC_TAU};
use crate::grid::{FaceAxis, MacVelocityField, Material};

/// Material of a cell, treating anything outside the grid as solid.
#[inline]
fn material_at(materials: &Array3D<Material>, g: GridIndex) -> Material {
    if materials.contains(g) {
        materials[g]
    } else {
        Material::Solid
    }
}

/// Maps fluid cells to a compact solve-vector index.
///
/// Rebuilt every step. Indices are handed out in k-major, then j, then i scan
/// order; non-fluid cells map to `None`.
#[derive(Clone, Debug)]
pub struct FluidIndexTable {
    lookup: Array3D<Option<usize>>,
    cells: Vec<GridIndex>,
}

impl FluidIndexTable {
    pub fn new(isize: usize, jsize: usize, ksize: usize) -> Self {
        Self {
            lookup: Array3D::new(isize, jsize, ksize, None).with_out_of_range_value(None),
            cells: Vec::new(),
        }
    }

    pub fn rebuild(&mut self, materials: &Array3D<Material>) {
        assert!(
            self.lookup.has_same_dimensions(materials),
            "index table {:?} does not match material grid {:?}",
            self.lookup.dimensions(),
            materials.dimensions()
        );
        self.lookup.fill(None);
        self.cells.clear();
        for g in materials.indices() {
            if materials[g] == Material::Fluid {
                self.lookup[g] = Some(self.cells.len());
                self.cells.push(g);
            }
        }
    }

    /// Vector index of a cell, `None` for non-fluid or out-of-range cells.
    #[inline]
    pub fn index_of(&self, g: GridIndex) -> Option<usize> {
        self.lookup[g]
    }

    /// Fluid cells in vector order.
    pub fn cells(&self) -> &[GridIndex] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Symmetric 7-point matrix: diagonal plus the +i, +j, +k couplings.
#[derive(Clone, Debug, Default)]
pub struct MatrixCoefficients {
    pub diag: Vec<f64>,
    pub plus_i: Vec<f64>,
    pub plus_j: Vec<f64>,
    pub plus_k: Vec<f64>,
    /// Vector indices of the -i, +i, -j, +j, -k, +k fluid neighbours.
    neighbours: Vec<[Option<usize>; 6]>,
}

impl MatrixCoefficients {
    pub fn len(&self) -> usize {
        self.diag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diag.is_empty()
    }

    fn resize(&mut self, n: usize) {
        for v in [&mut self.diag, &mut self.plus_i, &mut self.plus_j, &mut self.plus_k] {
            v.clear();
            v.resize(n, 0.0);
        }
        self.neighbours.clear();
        self.neighbours.resize(n, [None; 6]);
    }

    /// `out = A * x`.
    pub fn multiply(&self, x: &[f64], out: &mut [f64]) {
        for (idx, o) in out.iter_mut().enumerate() {
            let [mi, pi, mj, pj, mk, pk] = self.neighbours[idx];
            let mut sum = self.diag[idx] * x[idx];
            if let Some(n) = pi {
                sum += self.plus_i[idx] * x[n];
            }
            if let Some(n) = pj {
                sum += self.plus_j[idx] * x[n];
            }
            if let Some(n) = pk {
                sum += self.plus_k[idx] * x[n];
            }
            if let Some(n) = mi {
                sum += self.plus_i[n] * x[n];
            }
            if let Some(n) = mj {
                sum += self.plus_j[n] * x[n];
            }
            if let Some(n) = mk {
                sum += self.plus_k[n] * x[n];
            }
            *o = sum;
        }
    }
}

/// Outcome of one projection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PressureReport {
    pub iterations: usize,
    /// Max-norm of the final residual.
    pub residual: f64,
    pub converged: bool,
    pub fluid_cells: usize,
}

/// Reusable pressure solver state.
pub struct PressureSolver {
    table: FluidIndexTable,
    matrix: MatrixCoefficients,
    precon: Vec<f64>,
    rhs: Vec<f64>,
    pressure: Vec<f64>,
    residual: Vec<f64>,
    aux: Vec<f64>,
    search: Vec<f64>,
    tolerance: f64,
    max_iterations: usize,
}

impl PressureSolver {
    pub fn new(isize: usize, jsize: usize, ksize: usize, tolerance: f64, max_iterations: usize) -> Self {
        Self {
            table: FluidIndexTable::new(isize, jsize, ksize),
            matrix: MatrixCoefficients::default(),
            precon: Vec::new(),
            rhs: Vec::new(),
            pressure: Vec::new(),
            residual: Vec::new(),
            aux: Vec::new(),
            search: Vec::new(),
            tolerance,
            max_iterations,
        }
    }

    pub fn index_table(&self) -> &FluidIndexTable {
        &self.table
    }

    pub fn matrix(&self) -> &MatrixCoefficients {
        &self.matrix
    }

    pub fn preconditioner(&self) -> &[f64] {
        &self.precon
    }

    /// Solved pressure of a cell; zero for non-fluid cells.
    pub fn pressure_at(&self, g: GridIndex) -> f64 {
        self.table.index_of(g).map_or(0.0, |idx| self.pressure[idx])
    }

    /// Make `field` (near) divergence free over the fluid cells of `materials`.
    pub fn project(
        &mut self,
        field: &mut MacVelocityField,
        materials: &Array3D<Material>,
        dt: f32,
        density: f32,
    ) -> PressureReport {
        assert!(dt > 0.0, "dt must be positive, got {}", dt);
        assert!(density > 0.0, "density must be positive, got {}", density);
        assert_eq!(
            field.dimensions(),
            materials.dimensions(),
            "velocity field and material grid differ"
        );

        self.table.rebuild(materials);
        let n = self.table.len();
        if n == 0 {
            self.pressure.clear();
            return PressureReport {
                iterations: 0,
                residual: 0.0,
                converged: true,
                fluid_cells: 0,
            };
        }

        let dx = field.cell_size as f64;
        let scale = dt as f64 / (density as f64 * dx * dx);
        self.assemble_matrix(materials, scale);
        self.assemble_rhs(field, materials);
        self.build_preconditioner();
        let (iterations, residual, converged) = self.solve();
        if !converged {
            log::warn!(
                "pressure solve did not converge: {} iterations, residual {:e}",
                iterations,
                residual
            );
        }

        self.apply_pressure_gradient(field, materials, dt as f64 / (density as f64 * dx));

        PressureReport {
            iterations,
            residual,
            converged,
            fluid_cells: n,
        }
    }

    fn assemble_matrix(&mut self, materials: &Array3D<Material>, scale: f64) {
        let n = self.table.len();
        self.matrix.resize(n);
        for (idx, &g) in self.table.cells().iter().enumerate() {
            let neighbours = g.neighbours();
            let mut non_solid = 0;
            for (slot, &nb) in neighbours.iter().enumerate() {
                let m = material_at(materials, nb);
                if m != Material::Solid {
                    non_solid += 1;
                }
                self.matrix.neighbours[idx][slot] = self.table.index_of(nb);
            }
            self.matrix.diag[idx] = scale * non_solid as f64;
            if material_at(materials, neighbours[1]) == Material::Fluid {
                self.matrix.plus_i[idx] = -scale;
            }
            if material_at(materials, neighbours[3]) == Material::Fluid {
                self.matrix.plus_j[idx] = -scale;
            }
            if material_at(materials, neighbours[5]) == Material::Fluid {
                self.matrix.plus_k[idx] = -scale;
            }
        }
    }

    /// `b = -div(u)`, with faces bordering solid treated as zero flux.
    fn assemble_rhs(&mut self, field: &MacVelocityField, materials: &Array3D<Material>) {
        let inv_dx = 1.0 / field.cell_size as f64;
        self.rhs.clear();
        self.rhs.extend(
            self.table
                .cells()
                .iter()
                .map(|&g| -inv_dx * cell_flux(field, materials, g)),
        );
    }

    fn build_preconditioner(&mut self) {
        let n = self.table.len();
        let m = &self.matrix;
        self.precon.clear();
        self.precon.resize(n, 0.0);
        for idx in 0..n {
            let [mi, _, mj, _, mk, _] = m.neighbours[idx];
            let diag = m.diag[idx];
            let mut e = diag;
            if let Some(a) = mi {
                let c = m.plus_i[a] * self.precon[a];
                e -= c * c + MIC_TAU * m.plus_i[a] * (m.plus_j[a] + m.plus_k[a]) * self.precon[a] * self.precon[a];
            }
            if let Some(a) = mj {
                let c = m.plus_j[a] * self.precon[a];
                e -= c * c + MIC_TAU * m.plus_j[a] * (m.plus_i[a] + m.plus_k[a]) * self.precon[a] * self.precon[a];
            }
            if let Some(a) = mk {
                let c = m.plus_k[a] * self.precon[a];
                e -= c * c + MIC_TAU * m.plus_k[a] * (m.plus_i[a] + m.plus_j[a]) * self.precon[a] * self.precon[a];
            }
            if e < MIC_SIGMA * diag {
                e = diag;
            }
            self.precon[idx] = if e > 0.0 { 1.0 / e.sqrt() } else { 0.0 };
        }
    }

    /// Solve `L L^T z = r` with the MIC(0) factor.
    fn apply_preconditioner(m: &MatrixCoefficients, precon: &[f64], r: &[f64], z: &mut [f64]) {
        let n = r.len();
        // Forward substitution: q stored in z
        for idx in 0..n {
            let [mi, _, mj, _, mk, _] = m.neighbours[idx];
            let mut t = r[idx];
            if let Some(a) = mi {
                t -= m.plus_i[a] * precon[a] * z[a];
            }
            if let Some(a) = mj {
                t -= m.plus_j[a] * precon[a] * z[a];
            }
            if let Some(a) = mk {
                t -= m.plus_k[a] * precon[a] * z[a];
            }
            z[idx] = t * precon[idx];
        }
        // Backward substitution
        for idx in (0..n).rev() {
            let [_, pi, _, pj, _, pk] = m.neighbours[idx];
            let mut t = z[idx];
            if let Some(a) = pi {
                t -= m.plus_i[idx] * precon[idx] * z[a];
            }
            if let Some(a) = pj {
                t -= m.plus_j[idx] * precon[idx] * z[a];
            }
            if let Some(a) = pk {
                t -= m.plus_k[idx] * precon[idx] * z[a];
            }
            z[idx] = t * precon[idx];
        }
    }

    /// PCG. Stops when `|r|_inf <= tolerance * |b|_inf`.
    fn solve(&mut self) -> (usize, f64, bool) {
        let n = self.table.len();
        self.pressure.clear();
        self.pressure.resize(n, 0.0);
        self.residual.clear();
        self.residual.extend_from_slice(&self.rhs);
        self.aux.clear();
        self.aux.resize(n, 0.0);
        self.search.clear();
        self.search.resize(n, 0.0);

        let b_norm = max_abs(&self.rhs);
        if b_norm == 0.0 {
            return (0, 0.0, true);
        }
        let target = self.tolerance * b_norm;

        Self::apply_preconditioner(&self.matrix, &self.precon, &self.residual, &mut self.aux);
        self.search.copy_from_slice(&self.aux);
        let mut sigma = dot(&self.aux, &self.residual);
        let mut residual_norm = b_norm;

        for iteration in 1..=self.max_iterations {
            self.matrix.multiply(&self.search, &mut self.aux);
            let denom = dot(&self.aux, &self.search);
            if denom == 0.0 {
                return (iteration, residual_norm, false);
            }
            let alpha = sigma / denom;
            for idx in 0..n {
                self.pressure[idx] += alpha * self.search[idx];
                self.residual[idx] -= alpha * self.aux[idx];
            }

            residual_norm = max_abs(&self.residual);
            if residual_norm <= target {
                return (iteration, residual_norm, true);
            }

            Self::apply_preconditioner(&self.matrix, &self.precon, &self.residual, &mut self.aux);
            let sigma_new = dot(&self.aux, &self.residual);
            let beta = sigma_new / sigma;
            for idx in 0..n {
                self.search[idx] = self.aux[idx] + beta * self.search[idx];
            }
            sigma = sigma_new;
        }

        (self.max_iterations, residual_norm, false)
    }

    /// Subtract `dt / (rho dx) * grad p` on faces between fluid and fluid or
    /// fluid and air. Faces touching solid are left alone.
    fn apply_pressure_gradient(&self, field: &mut MacVelocityField, materials: &Array3D<Material>, scale: f64) {
        for axis in FaceAxis::ALL {
            let component = field.component_mut(axis);
            for g in component.indices().collect::<Vec<_>>() {
                let (lower, upper) = axis.bordering_cells(g.i, g.j, g.k);
                let ml = material_at(materials, lower);
                let mu = material_at(materials, upper);
                if ml == Material::Solid || mu == Material::Solid {
                    continue;
                }
                if ml != Material::Fluid && mu != Material::Fluid {
                    continue;
                }
                let grad = self.pressure_at(upper) - self.pressure_at(lower);
                component[g] -= (scale * grad) as f32;
            }
        }
    }
}

/// Net outward flux of a cell times `1/dx` is its divergence. Faces bordering
/// solid contribute nothing.
fn cell_flux(field: &MacVelocityField, materials: &Array3D<Material>, g: GridIndex) -> f64 {
    let mut flux = 0.0f64;
    for axis in FaceAxis::ALL {
        let (di, dj, dk) = axis.step();
        let component = field.component(axis);
        let low_face = g;
        let high_face = g.offset(di, dj, dk);
        if material_at(materials, g.offset(-di, -dj, -dk)) != Material::Solid {
            flux -= component[low_face] as f64;
        }
        if material_at(materials, high_face) != Material::Solid {
            flux += component[high_face] as f64;
        }
    }
    flux
}

/// Velocity divergence at every fluid cell (zero elsewhere), ignoring flux
/// through faces that border solid.
pub fn compute_divergence(field: &MacVelocityField, materials: &Array3D<Material>) -> Array3D<f32> {
    let (w, h, d) = materials.dimensions();
    let mut divergence = Array3D::new(w, h, d, 0.0f32);
    let inv_dx = 1.0 / field.cell_size as f64;
    for g in materials.indices() {
        if materials[g] == Material::Fluid {
            divergence[g] = (inv_dx * cell_flux(field, materials, g)) as f32;
        }
    }
    divergence
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn max_abs(a: &[f64]) -> f64 {
    a.iter().fold(0.0, |acc, v| acc.max(v.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn materials_with_fluid(n: usize, cells: impl Iterator<Item = GridIndex>) -> Array3D<Material> {
        let mut m = Array3D::new(n, n, n, Material::Air);
        for g in cells {
            m[g] = Material::Fluid;
        }
        m
    }

    #[test]
    fn test_divergence_zero_velocity() {
        let field = MacVelocityField::new(4, 4, 4, 1.0);
        let materials = Array3D::new(4, 4, 4, Material::Fluid);
        let div = compute_divergence(&field, &materials);
        for &d in div.as_slice() {
            assert!(d.abs() < 1e-6);
        }
    }

    #[test]
    fn test_index_table_scan_order() {
        let cells = [GridIndex::new(2, 1, 1), GridIndex::new(1, 1, 1), GridIndex::new(1, 1, 2), GridIndex::new(1, 2, 1)];
        let materials = materials_with_fluid(4, cells.into_iter());
        let mut table = FluidIndexTable::new(4, 4, 4);
        table.rebuild(&materials);
        assert_eq!(table.len(), 4);
        assert_eq!(table.index_of(GridIndex::new(1, 1, 1)), Some(0));
        assert_eq!(table.index_of(GridIndex::new(2, 1, 1)), Some(1));
        assert_eq!(table.index_of(GridIndex::new(1, 2, 1)), Some(2));
        assert_eq!(table.index_of(GridIndex::new(1, 1, 2)), Some(3));
        assert_eq!(table.index_of(GridIndex::new(0, 0, 0)), None);
        assert_eq!(table.index_of(GridIndex::new(-1, 0, 0)), None);
    }

    #[test]
    fn test_single_cell_preconditioner_and_one_iteration() {
        let materials = materials_with_fluid(3, std::iter::once(GridIndex::new(1, 1, 1)));
        let mut field = MacVelocityField::new(3, 3, 3, 1.0);
        field.u_mut().set(2, 1, 1, 1.0);

        let mut solver = PressureSolver::new(3, 3, 3, 1e-6, 150);
        let report = solver.project(&mut field, &materials, 0.1, 1.0);

        let diag = solver.matrix().diag[0];
        assert!((diag - 0.6).abs() < 1e-12, "six air neighbours at dt/(rho dx^2) = 0.1");
        assert!((solver.preconditioner()[0] - 1.0 / diag.sqrt()).abs() < 1e-12);
        assert!(report.converged);
        assert_eq!(report.iterations, 1);

        let div = compute_divergence(&field, &materials);
        assert!(div.get(1, 1, 1).abs() < 1e-5, "residual divergence {}", div.get(1, 1, 1));
    }

    #[test]
    fn test_solid_neighbours_reduce_diagonal() {
        let mut materials = materials_with_fluid(3, std::iter::once(GridIndex::new(1, 1, 1)));
        materials.set(1, 0, 1, Material::Solid);
        let mut solver = PressureSolver::new(3, 3, 3, 1e-6, 150);
        let mut field = MacVelocityField::new(3, 3, 3, 1.0);
        field.v_mut().set(1, 2, 1, 0.5);
        solver.project(&mut field, &materials, 1.0, 1.0);
        assert!((solver.matrix().diag[0] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_off_diagonals_only_between_fluid() {
        let cells = [GridIndex::new(1, 1, 1), GridIndex::new(2, 1, 1)];
        let materials = materials_with_fluid(4, cells.into_iter());
        let mut solver = PressureSolver::new(4, 4, 4, 1e-6, 150);
        let mut field = MacVelocityField::new(4, 4, 4, 1.0);
        field.u_mut().set(1, 1, 1, 1.0);
        solver.project(&mut field, &materials, 1.0, 1.0);
        let m = solver.matrix();
        assert_eq!(m.plus_i[0], -1.0);
        assert_eq!(m.plus_i[1], 0.0);
        assert_eq!(m.plus_j[0], 0.0);
        assert_eq!(m.diag[0], 6.0);
    }

    #[test]
    fn test_projection_removes_divergence_of_enclosed_cube() {
        let n = 8;
        let cells: Vec<_> = (2..6)
            .flat_map(|k| (2..6).flat_map(move |j| (2..6).map(move |i| GridIndex::new(i, j, k))))
            .collect();
        let materials = materials_with_fluid(n, cells.into_iter());
        let mut field = MacVelocityField::new(n, n, n, 0.5);
        // Deterministic non-solenoidal field
        for axis in FaceAxis::ALL {
            let comp = field.component_mut(axis);
            for g in comp.indices().collect::<Vec<_>>() {
                let v = ((g.i * 7 + g.j * 3 + g.k * 5) % 11) as f32 / 11.0 - 0.5;
                comp[g] = v;
            }
        }
        let before = compute_divergence(&field, &materials);
        let before_max = before.as_slice().iter().fold(0.0f32, |a, d| a.max(d.abs()));

        let mut solver = PressureSolver::new(n, n, n, 1e-6, 150);
        let report = solver.project(&mut field, &materials, 0.05, 1000.0);
        assert!(report.converged, "{:?}", report);
        assert_eq!(report.fluid_cells, 64);

        let after = compute_divergence(&field, &materials);
        for &d in after.as_slice() {
            assert!(d.abs() <= 1e-3 * before_max, "divergence {} vs {}", d, before_max);
        }
    }

    #[test]
    fn test_no_fluid_is_trivially_converged() {
        let materials = Array3D::new(3, 3, 3, Material::Air);
        let mut field = MacVelocityField::new(3, 3, 3, 1.0);
        let mut solver = PressureSolver::new(3, 3, 3, 1e-6, 150);
        let report = solver.project(&mut field, &materials, 0.1, 1.0);
        assert!(report.converged);
        assert_eq!(report.fluid_cells, 0);
    }

    #[test]
    fn test_iteration_cap_is_soft_fail() {
        let n = 10;
        let cells: Vec<_> = (1..9)
            .flat_map(|k| (1..9).flat_map(move |j| (1..9).map(move |i| GridIndex::new(i, j, k))))
            .collect();
        let materials = materials_with_fluid(n, cells.into_iter());
        let mut field = MacVelocityField::new(n, n, n, 1.0);
        field.u_mut().set(5, 5, 5, 1.0);
        let mut solver = PressureSolver::new(n, n, n, 1e-14, 1);
        let report = solver.project(&mut field, &materials, 0.1, 1.0);
        assert!(!report.converged);
        assert_eq!(report.iterations, 1);
        assert!(field.u().as_slice().iter().all(|u| u.is_finite()));
    }
}
