//! Dense 3D array used as the storage primitive for every grid field.
//!
//! Elements are laid out with `i` fastest, then `j`, then `k`:
//! `flat = i + width * (j + height * k)`.
//!
//! Reads outside the array return the out-of-range value when one is
//! configured. Without one, and for every out-of-range write, the access
//! panics: a silently clamped index would corrupt the solve.

use std::ops::{AddAssign, Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Integer cell (or face) coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridIndex {
    pub i: i32,
    pub j: i32,
    pub k: i32,
}

impl GridIndex {
    pub const fn new(i: i32, j: i32, k: i32) -> Self {
        Self { i, j, k }
    }

    /// Build from unsigned coordinates.
    #[inline]
    pub fn from_usize(i: usize, j: usize, k: usize) -> Self {
        Self::new(i as i32, j as i32, k as i32)
    }

    #[inline]
    pub fn offset(self, di: i32, dj: i32, dk: i32) -> Self {
        Self::new(self.i + di, self.j + dj, self.k + dk)
    }

    /// The six face-adjacent neighbours, in -i, +i, -j, +j, -k, +k order.
    pub fn neighbours(self) -> [GridIndex; 6] {
        [
            self.offset(-1, 0, 0),
            self.offset(1, 0, 0),
            self.offset(0, -1, 0),
            self.offset(0, 1, 0),
            self.offset(0, 0, -1),
            self.offset(0, 0, 1),
        ]
    }
}

impl From<(i32, i32, i32)> for GridIndex {
    fn from((i, j, k): (i32, i32, i32)) -> Self {
        Self::new(i, j, k)
    }
}

/// Fixed-size dense 3D array.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Array3D<T> {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    data: Vec<T>,
    out_of_range: Option<T>,
}

impl<T: Copy> Array3D<T> {
    /// Allocate a `width x height x depth` array filled with `fill`.
    pub fn new(width: usize, height: usize, depth: usize, fill: T) -> Self {
        Self {
            width,
            height,
            depth,
            data: vec![fill; width * height * depth],
            out_of_range: None,
        }
    }

    /// Builder form of [`Array3D::set_out_of_range_value`].
    pub fn with_out_of_range_value(mut self, value: T) -> Self {
        self.out_of_range = Some(value);
        self
    }

    /// Value returned by reads outside the array. `None` makes such reads panic.
    pub fn set_out_of_range_value(&mut self, value: Option<T>) {
        self.out_of_range = value;
    }

    pub fn out_of_range_value(&self) -> Option<T> {
        self.out_of_range
    }

    #[inline]
    pub fn dimensions(&self) -> (usize, usize, usize) {
        (self.width, self.height, self.depth)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn is_index_in_range(&self, i: i32, j: i32, k: i32) -> bool {
        i >= 0
            && j >= 0
            && k >= 0
            && (i as usize) < self.width
            && (j as usize) < self.height
            && (k as usize) < self.depth
    }

    #[inline]
    pub fn contains(&self, g: GridIndex) -> bool {
        self.is_index_in_range(g.i, g.j, g.k)
    }

    /// Flat buffer offset of an in-range index.
    #[inline]
    pub fn flat_index(&self, i: usize, j: usize, k: usize) -> usize {
        assert!(
            i < self.width && j < self.height && k < self.depth,
            "index ({}, {}, {}) out of range for {}x{}x{} array",
            i,
            j,
            k,
            self.width,
            self.height,
            self.depth
        );
        i + self.width * (j + self.height * k)
    }

    /// Inverse of [`Array3D::flat_index`].
    #[inline]
    pub fn unflatten(&self, flat: usize) -> GridIndex {
        let i = flat % self.width;
        let j = (flat / self.width) % self.height;
        let k = flat / (self.width * self.height);
        GridIndex::from_usize(i, j, k)
    }

    /// Read with signed indices, honouring the out-of-range value.
    #[inline]
    pub fn get(&self, i: i32, j: i32, k: i32) -> T {
        if self.is_index_in_range(i, j, k) {
            return self.data[i as usize + self.width * (j as usize + self.height * k as usize)];
        }
        match self.out_of_range {
            Some(value) => value,
            None => panic!(
                "read at ({}, {}, {}) outside {}x{}x{} array with no out-of-range value",
                i, j, k, self.width, self.height, self.depth
            ),
        }
    }

    #[inline]
    pub fn get_index(&self, g: GridIndex) -> T {
        self.get(g.i, g.j, g.k)
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, k: usize, value: T) {
        let idx = self.flat_index(i, j, k);
        self.data[idx] = value;
    }

    #[inline]
    pub fn set_index(&mut self, g: GridIndex, value: T) {
        assert!(
            self.contains(g),
            "write at {:?} outside {}x{}x{} array",
            g,
            self.width,
            self.height,
            self.depth
        );
        self.set(g.i as usize, g.j as usize, g.k as usize, value);
    }

    /// Set every listed cell to `value`.
    pub fn set_cells(&mut self, cells: &[GridIndex], value: T) {
        for &g in cells {
            self.set_index(g, value);
        }
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// True if both arrays share the same dimensions.
    pub fn has_same_dimensions<U>(&self, other: &Array3D<U>) -> bool {
        self.width == other.width && self.height == other.height && self.depth == other.depth
    }

    /// Overwrite contents with `other`. Panics on mismatched dimensions.
    pub fn copy_from(&mut self, other: &Array3D<T>) {
        assert!(
            self.has_same_dimensions(other),
            "cannot copy {:?} array into {:?} array",
            other.dimensions(),
            self.dimensions()
        );
        self.data.copy_from_slice(&other.data);
    }

    /// All indices in k-major, then j, then i order.
    pub fn indices(&self) -> impl Iterator<Item = GridIndex> {
        let (w, h, d) = self.dimensions();
        (0..d).flat_map(move |k| {
            (0..h).flat_map(move |j| (0..w).map(move |i| GridIndex::from_usize(i, j, k)))
        })
    }
}

impl<T: Copy + AddAssign> Array3D<T> {
    #[inline]
    pub fn add(&mut self, i: usize, j: usize, k: usize, value: T) {
        let idx = self.flat_index(i, j, k);
        self.data[idx] += value;
    }
}

impl<T: Copy> Index<(usize, usize, usize)> for Array3D<T> {
    type Output = T;

    #[inline]
    fn index(&self, (i, j, k): (usize, usize, usize)) -> &T {
        &self.data[self.flat_index(i, j, k)]
    }
}

impl<T: Copy> IndexMut<(usize, usize, usize)> for Array3D<T> {
    #[inline]
    fn index_mut(&mut self, (i, j, k): (usize, usize, usize)) -> &mut T {
        let idx = self.flat_index(i, j, k);
        &mut self.data[idx]
    }
}

impl<T: Copy> Index<GridIndex> for Array3D<T> {
    type Output = T;

    fn index(&self, g: GridIndex) -> &T {
        if self.contains(g) {
            return &self.data[self.flat_index(g.i as usize, g.j as usize, g.k as usize)];
        }
        match self.out_of_range.as_ref() {
            Some(value) => value,
            None => panic!(
                "read at {:?} outside {}x{}x{} array with no out-of-range value",
                g, self.width, self.height, self.depth
            ),
        }
    }
}

impl<T: Copy> IndexMut<GridIndex> for Array3D<T> {
    fn index_mut(&mut self, g: GridIndex) -> &mut T {
        assert!(
            self.contains(g),
            "write at {:?} outside {}x{}x{} array",
            g,
            self.width,
            self.height,
            self.depth
        );
        let idx = self.flat_index(g.i as usize, g.j as usize, g.k as usize);
        &mut self.data[idx]
    }
}
