//! Material classification from marker-particle occupancy.

use crate::array3d::{Array3D, GridIndex};
use crate::grid::{position_to_cell, Material};
use crate::particle::MarkerParticle;

/// Persistent solid mask: domain border plus user solids.
#[derive(Clone, Debug)]
pub struct SolidMask {
    cells: Array3D<bool>,
    user: Vec<GridIndex>,
    // Membership of `user`, so edits stay linear in the edit size
    user_mask: Array3D<bool>,
}

impl SolidMask {
    /// A mask with only the outermost cell layer solid.
    pub fn with_border(isize: usize, jsize: usize, ksize: usize) -> Self {
        let mut cells = Array3D::new(isize, jsize, ksize, false).with_out_of_range_value(true);
        for g in cells.indices() {
            if is_border(&cells, g) {
                cells[g] = true;
            }
        }
        Self {
            cells,
            user: Vec::new(),
            user_mask: Array3D::new(isize, jsize, ksize, false),
        }
    }

    /// Solid flag, `true` outside the grid.
    #[inline]
    pub fn is_solid(&self, g: GridIndex) -> bool {
        self.cells[g]
    }

    pub fn cells(&self) -> &Array3D<bool> {
        &self.cells
    }

    /// User-specified solid cells in insertion order.
    pub fn user_cells(&self) -> &[GridIndex] {
        &self.user
    }

    /// Mark cells solid. Panics on indices outside the grid.
    pub fn add(&mut self, cells: &[GridIndex]) {
        for &g in cells {
            if !self.user_mask[g] {
                self.user_mask[g] = true;
                self.user.push(g);
            }
        }
        self.cells.set_cells(cells, true);
    }

    /// Clear user solids. Border cells stay solid.
    pub fn remove(&mut self, cells: &[GridIndex]) {
        let mut removed = false;
        for &g in cells {
            removed |= self.user_mask[g];
            self.user_mask[g] = false;
            if !is_border(&self.cells, g) {
                self.cells.set_index(g, false);
            }
        }
        if removed {
            let mask = &self.user_mask;
            self.user.retain(|&g| mask[g]);
        }
    }
}

fn is_border(cells: &Array3D<bool>, g: GridIndex) -> bool {
    let (w, h, d) = cells.dimensions();
    g.i == 0 || g.j == 0 || g.k == 0 || g.i as usize == w - 1 || g.j as usize == h - 1 || g.k as usize == d - 1
}

/// Relabel every cell: Solid from the mask, Fluid if occupied by a particle,
/// Air otherwise. Returns the number of fluid cells.
pub fn classify_materials(
    materials: &mut Array3D<Material>,
    solids: &SolidMask,
    particles: &[MarkerParticle],
    cell_size: f32,
) -> usize {
    assert!(
        materials.has_same_dimensions(solids.cells()),
        "material grid {:?} does not match solid mask {:?}",
        materials.dimensions(),
        solids.cells().dimensions()
    );

    for (m, &solid) in materials
        .as_mut_slice()
        .iter_mut()
        .zip(solids.cells().as_slice())
    {
        *m = if solid { Material::Solid } else { Material::Air };
    }

    let mut fluid_cells = 0;
    for p in particles {
        let g = position_to_cell(p.position, cell_size);
        if materials.contains(g) && materials[g] == Material::Air {
            materials[g] = Material::Fluid;
            fluid_cells += 1;
        }
    }
    fluid_cells
}

/// Per-cell marker particle counts. Particles outside the grid are skipped.
pub fn count_particles_per_cell(
    counts: &mut Array3D<u32>,
    particles: &[MarkerParticle],
    cell_size: f32,
) {
    counts.fill(0);
    for p in particles {
        let g = position_to_cell(p.position, cell_size);
        if counts.contains(g) {
            counts[g] += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_border_is_solid() {
        let mask = SolidMask::with_border(4, 4, 4);
        assert!(mask.is_solid(GridIndex::new(0, 2, 2)));
        assert!(mask.is_solid(GridIndex::new(3, 2, 2)));
        assert!(!mask.is_solid(GridIndex::new(1, 2, 2)));
        assert!(mask.is_solid(GridIndex::new(-1, 2, 2)), "outside counts as solid");
    }

    #[test]
    fn test_classify_marks_occupied_cells() {
        let mask = SolidMask::with_border(5, 5, 5);
        let mut materials = Array3D::new(5, 5, 5, Material::Air);
        let particles = vec![
            MarkerParticle::at(Vec3::new(2.5, 2.5, 2.5)),
            MarkerParticle::at(Vec3::new(2.2, 2.7, 2.1)),
            MarkerParticle::at(Vec3::new(0.5, 2.5, 2.5)), // inside border solid
        ];
        let count = classify_materials(&mut materials, &mask, &particles, 1.0);
        assert_eq!(count, 1);
        assert_eq!(materials.get(2, 2, 2), Material::Fluid);
        assert_eq!(materials.get(0, 2, 2), Material::Solid);
        assert_eq!(materials.get(1, 1, 1), Material::Air);
    }

    #[test]
    fn test_classify_is_idempotent() {
        let mut mask = SolidMask::with_border(6, 6, 6);
        mask.add(&[GridIndex::new(3, 1, 3)]);
        let particles: Vec<_> = (0..20)
            .map(|n| MarkerParticle::at(Vec3::new(1.5 + (n % 4) as f32, 1.5 + (n / 4 % 4) as f32, 2.5)))
            .collect();
        let mut a = Array3D::new(6, 6, 6, Material::Air);
        classify_materials(&mut a, &mask, &particles, 1.0);
        let first = a.clone();
        classify_materials(&mut a, &mask, &particles, 1.0);
        assert_eq!(a, first);
    }

    #[test]
    fn test_remove_keeps_border() {
        let mut mask = SolidMask::with_border(5, 5, 5);
        mask.add(&[GridIndex::new(2, 2, 2)]);
        assert_eq!(mask.user_cells(), &[GridIndex::new(2, 2, 2)]);
        mask.remove(&[GridIndex::new(2, 2, 2), GridIndex::new(0, 2, 2)]);
        assert!(!mask.is_solid(GridIndex::new(2, 2, 2)));
        assert!(mask.is_solid(GridIndex::new(0, 2, 2)));
        assert!(mask.user_cells().is_empty());
    }

    #[test]
    fn test_large_edits_keep_user_list_in_order() {
        let n = 34;
        let mut mask = SolidMask::with_border(n, n, n);
        let block: Vec<GridIndex> = (1..n as i32 - 1)
            .flat_map(|k| (1..n as i32 - 1).map(move |i| GridIndex::new(i, 1 + k % 3, k)))
            .collect();
        mask.add(&block);
        mask.add(&block[..100]);
        assert_eq!(mask.user_cells(), &block[..], "re-adding keeps one entry per cell");

        let evens: Vec<GridIndex> = block.iter().copied().step_by(2).collect();
        mask.remove(&evens);
        let odds: Vec<GridIndex> = block.iter().copied().skip(1).step_by(2).collect();
        assert_eq!(mask.user_cells(), &odds[..]);
        assert!(evens.iter().all(|&g| !mask.is_solid(g)));
        assert!(odds.iter().all(|&g| mask.is_solid(g)));

        // Removing again, or removing cells never added, changes nothing
        mask.remove(&evens);
        mask.remove(&[GridIndex::new(5, 20, 5)]);
        assert_eq!(mask.user_cells(), &odds[..]);
    }

    #[test]
    fn test_particle_counts() {
        let mut counts = Array3D::new(3, 3, 3, 0u32);
        let particles = vec![
            MarkerParticle::at(Vec3::new(1.1, 1.1, 1.1)),
            MarkerParticle::at(Vec3::new(1.9, 1.9, 1.9)),
            MarkerParticle::at(Vec3::new(9.0, 1.0, 1.0)),
        ];
        count_particles_per_cell(&mut counts, &particles, 1.0);
        assert_eq!(counts.get(1, 1, 1), 2);
        assert_eq!(counts.as_slice().iter().sum::<u32>(), 2);
    }
}
