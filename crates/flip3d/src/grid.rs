//! 3D MAC (Marker-and-Cell) staggered velocity field and cell materials.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::array3d::{Array3D, GridIndex};

/// Cell classification, recomputed every sub-step.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum Material {
    /// Empty air
    #[default]
    Air,
    /// Contains at least one marker particle
    Fluid,
    /// Solid obstacle (no flow)
    Solid,
}

/// Which velocity component a face carries.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum FaceAxis {
    /// X-velocity on YZ faces
    U,
    /// Y-velocity on XZ faces
    V,
    /// Z-velocity on XY faces
    W,
}

impl FaceAxis {
    pub const ALL: [FaceAxis; 3] = [FaceAxis::U, FaceAxis::V, FaceAxis::W];

    /// Unit step across the face (from the lower cell to the upper cell).
    #[inline]
    pub fn step(self) -> (i32, i32, i32) {
        match self {
            FaceAxis::U => (1, 0, 0),
            FaceAxis::V => (0, 1, 0),
            FaceAxis::W => (0, 0, 1),
        }
    }

    /// Offset of the face sample from the grid origin, in cells.
    #[inline]
    pub fn sample_offset(self) -> Vec3 {
        match self {
            FaceAxis::U => Vec3::new(0.0, 0.5, 0.5),
            FaceAxis::V => Vec3::new(0.5, 0.0, 0.5),
            FaceAxis::W => Vec3::new(0.5, 0.5, 0.0),
        }
    }

    /// Array dimensions of this component for a grid of `isize x jsize x ksize` cells.
    #[inline]
    pub fn dimensions(self, isize: usize, jsize: usize, ksize: usize) -> (usize, usize, usize) {
        match self {
            FaceAxis::U => (isize + 1, jsize, ksize),
            FaceAxis::V => (isize, jsize + 1, ksize),
            FaceAxis::W => (isize, jsize, ksize + 1),
        }
    }

    /// Component of `v` along this axis.
    #[inline]
    pub fn component(self, v: Vec3) -> f32 {
        match self {
            FaceAxis::U => v.x,
            FaceAxis::V => v.y,
            FaceAxis::W => v.z,
        }
    }

    /// The two cells separated by face `(i, j, k)`: the lower one first.
    /// Either may lie outside the cell grid at the domain boundary.
    #[inline]
    pub fn bordering_cells(self, i: i32, j: i32, k: i32) -> (GridIndex, GridIndex) {
        let (di, dj, dk) = self.step();
        (GridIndex::new(i - di, j - dj, k - dk), GridIndex::new(i, j, k))
    }
}

/// True if face `(i, j, k)` of `axis` borders a cell of `grid` holding `value`.
/// Cells outside `grid` are ignored.
#[inline]
pub fn is_face_bordering_value<T: Copy + PartialEq>(
    grid: &Array3D<T>,
    axis: FaceAxis,
    i: i32,
    j: i32,
    k: i32,
    value: T,
) -> bool {
    let (lower, upper) = axis.bordering_cells(i, j, k);
    (grid.contains(lower) && grid[lower] == value) || (grid.contains(upper) && grid[upper] == value)
}

/// Face-centered velocity storage.
///
/// Velocity components are stored on cell faces:
/// - u (X-velocity) on YZ faces at x = i * dx
/// - v (Y-velocity) on XZ faces at y = j * dx
/// - w (Z-velocity) on XY faces at z = k * dx
#[derive(Clone, Debug)]
pub struct MacVelocityField {
    /// Number of cells in X direction
    pub isize: usize,
    /// Number of cells in Y direction
    pub jsize: usize,
    /// Number of cells in Z direction
    pub ksize: usize,
    /// Size of each cell in world units
    pub cell_size: f32,

    /// Size: (isize+1) * jsize * ksize
    u: Array3D<f32>,
    /// Size: isize * (jsize+1) * ksize
    v: Array3D<f32>,
    /// Size: isize * jsize * (ksize+1)
    w: Array3D<f32>,
}

impl MacVelocityField {
    /// Create a zero velocity field for the given cell grid.
    pub fn new(isize: usize, jsize: usize, ksize: usize, cell_size: f32) -> Self {
        assert!(cell_size > 0.0, "cell_size must be positive, got {}", cell_size);
        let make = |axis: FaceAxis| {
            let (w, h, d) = axis.dimensions(isize, jsize, ksize);
            Array3D::new(w, h, d, 0.0f32)
        };

        Self {
            isize,
            jsize,
            ksize,
            cell_size,
            u: make(FaceAxis::U),
            v: make(FaceAxis::V),
            w: make(FaceAxis::W),
        }
    }

    /// Cell grid dimensions.
    #[inline]
    pub fn dimensions(&self) -> (usize, usize, usize) {
        (self.isize, self.jsize, self.ksize)
    }

    /// World-space extent of the grid.
    pub fn world_size(&self) -> Vec3 {
        Vec3::new(
            self.isize as f32 * self.cell_size,
            self.jsize as f32 * self.cell_size,
            self.ksize as f32 * self.cell_size,
        )
    }

    // ========== Field accessors ==========

    pub fn u(&self) -> &Array3D<f32> {
        &self.u
    }

    pub fn u_mut(&mut self) -> &mut Array3D<f32> {
        &mut self.u
    }

    pub fn v(&self) -> &Array3D<f32> {
        &self.v
    }

    pub fn v_mut(&mut self) -> &mut Array3D<f32> {
        &mut self.v
    }

    pub fn w(&self) -> &Array3D<f32> {
        &self.w
    }

    pub fn w_mut(&mut self) -> &mut Array3D<f32> {
        &mut self.w
    }

    #[inline]
    pub fn component(&self, axis: FaceAxis) -> &Array3D<f32> {
        match axis {
            FaceAxis::U => &self.u,
            FaceAxis::V => &self.v,
            FaceAxis::W => &self.w,
        }
    }

    #[inline]
    pub fn component_mut(&mut self, axis: FaceAxis) -> &mut Array3D<f32> {
        match axis {
            FaceAxis::U => &mut self.u,
            FaceAxis::V => &mut self.v,
            FaceAxis::W => &mut self.w,
        }
    }

    /// Zero every face.
    pub fn clear(&mut self) {
        self.u.fill(0.0);
        self.v.fill(0.0);
        self.w.fill(0.0);
    }

    /// Overwrite with the values of another field of the same dimensions.
    pub fn copy_from(&mut self, other: &MacVelocityField) {
        assert_eq!(
            self.dimensions(),
            other.dimensions(),
            "velocity field dimensions differ"
        );
        self.u.copy_from(&other.u);
        self.v.copy_from(&other.v);
        self.w.copy_from(&other.w);
    }

    // ========== World position helpers ==========

    /// World position of the sample of face `(i, j, k)` of `axis`.
    #[inline]
    pub fn face_position(&self, axis: FaceAxis, i: usize, j: usize, k: usize) -> Vec3 {
        (Vec3::new(i as f32, j as f32, k as f32) + axis.sample_offset()) * self.cell_size
    }

    /// World position of U velocity node at grid indices (i, j, k).
    #[inline]
    pub fn u_position(&self, i: usize, j: usize, k: usize) -> Vec3 {
        self.face_position(FaceAxis::U, i, j, k)
    }

    /// World position of V velocity node at grid indices (i, j, k).
    #[inline]
    pub fn v_position(&self, i: usize, j: usize, k: usize) -> Vec3 {
        self.face_position(FaceAxis::V, i, j, k)
    }

    /// World position of W velocity node at grid indices (i, j, k).
    #[inline]
    pub fn w_position(&self, i: usize, j: usize, k: usize) -> Vec3 {
        self.face_position(FaceAxis::W, i, j, k)
    }

    /// World position of cell center at grid indices (i, j, k).
    #[inline]
    pub fn cell_center(&self, i: usize, j: usize, k: usize) -> Vec3 {
        cell_center(GridIndex::from_usize(i, j, k), self.cell_size)
    }

    #[inline]
    pub fn position_to_cell(&self, pos: Vec3) -> GridIndex {
        position_to_cell(pos, self.cell_size)
    }

    /// True if `pos` lies inside the simulation domain.
    #[inline]
    pub fn is_position_in_grid(&self, pos: Vec3) -> bool {
        let size = self.world_size();
        pos.x >= 0.0
            && pos.y >= 0.0
            && pos.z >= 0.0
            && pos.x < size.x
            && pos.y < size.y
            && pos.z < size.z
    }

    // ========== Interpolation ==========

    /// Trilinearly interpolated velocity at a world position.
    ///
    /// Samples beyond the staggered extent use the nearest edge face.
    pub fn evaluate_velocity_at_position(&self, pos: Vec3) -> Vec3 {
        Vec3::new(
            self.evaluate_component(FaceAxis::U, pos),
            self.evaluate_component(FaceAxis::V, pos),
            self.evaluate_component(FaceAxis::W, pos),
        )
    }

    /// Trilinearly interpolated single component at a world position.
    pub fn evaluate_component(&self, axis: FaceAxis, pos: Vec3) -> f32 {
        let g = pos / self.cell_size - axis.sample_offset();
        interpolate_trilinear(self.component(axis), g)
    }

    /// Velocity at the center of a cell (average of opposing faces).
    pub fn velocity_at_cell_center(&self, i: usize, j: usize, k: usize) -> Vec3 {
        Vec3::new(
            0.5 * (self.u[(i, j, k)] + self.u[(i + 1, j, k)]),
            0.5 * (self.v[(i, j, k)] + self.v[(i, j + 1, k)]),
            0.5 * (self.w[(i, j, k)] + self.w[(i, j, k + 1)]),
        )
    }
}

/// Cell containing a world position (floored, may be outside the grid).
#[inline]
pub fn position_to_cell(pos: Vec3, cell_size: f32) -> GridIndex {
    let c = pos / cell_size;
    GridIndex::new(c.x.floor() as i32, c.y.floor() as i32, c.z.floor() as i32)
}

/// World position of a cell center.
#[inline]
pub fn cell_center(g: GridIndex, cell_size: f32) -> Vec3 {
    Vec3::new(g.i as f32 + 0.5, g.j as f32 + 0.5, g.k as f32 + 0.5) * cell_size
}

/// Trilinear interpolation of `field` at continuous index coordinates `g`,
/// clamping to the array edges.
pub fn interpolate_trilinear(field: &Array3D<f32>, g: Vec3) -> f32 {
    let (w, h, d) = field.dimensions();
    if w == 0 || h == 0 || d == 0 {
        return 0.0;
    }
    let max = Vec3::new((w - 1) as f32, (h - 1) as f32, (d - 1) as f32);
    let g = g.clamp(Vec3::ZERO, max);

    let i0 = (g.x.floor() as usize).min(w.saturating_sub(2));
    let j0 = (g.y.floor() as usize).min(h.saturating_sub(2));
    let k0 = (g.z.floor() as usize).min(d.saturating_sub(2));
    let i1 = (i0 + 1).min(w - 1);
    let j1 = (j0 + 1).min(h - 1);
    let k1 = (k0 + 1).min(d - 1);

    let tx = (g.x - i0 as f32).clamp(0.0, 1.0);
    let ty = (g.y - j0 as f32).clamp(0.0, 1.0);
    let tz = (g.z - k0 as f32).clamp(0.0, 1.0);

    let c00 = field[(i0, j0, k0)] * (1.0 - tx) + field[(i1, j0, k0)] * tx;
    let c10 = field[(i0, j1, k0)] * (1.0 - tx) + field[(i1, j1, k0)] * tx;
    let c01 = field[(i0, j0, k1)] * (1.0 - tx) + field[(i1, j0, k1)] * tx;
    let c11 = field[(i0, j1, k1)] * (1.0 - tx) + field[(i1, j1, k1)] * tx;

    let c0 = c00 * (1.0 - ty) + c10 * ty;
    let c1 = c01 * (1.0 - ty) + c11 * ty;

    c0 * (1.0 - tz) + c1 * tz
}
