//! Fluid geometry: initial seeding shapes, external geometry, and sources.

use std::path::Path;

use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::array3d::{Array3D, GridIndex};
use crate::error::{Result, SimulationError};
use crate::grid::{cell_center, Material};
use crate::particle::MarkerParticle;
use crate::serde_utils::{deserialize_vec3, serialize_vec3};

/// Closed fluid geometry tested by point containment.
pub trait FluidGeometry {
    fn contains(&self, point: Vec3) -> bool;
}

/// Loads external geometry (a mesh file, say) as a [`FluidGeometry`].
pub trait GeometryLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn FluidGeometry>>;
}

/// Analytic fluid shapes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum FluidShape {
    Sphere {
        #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
        center: Vec3,
        radius: f32,
    },
    /// Axis-aligned box from `min` spanning `size`.
    Cuboid {
        #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
        min: Vec3,
        #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
        size: Vec3,
    },
}

impl FluidShape {
    pub fn validate(&self) -> Result<()> {
        match *self {
            FluidShape::Sphere { center, radius } => {
                if !center.is_finite() || !(radius.is_finite() && radius > 0.0) {
                    return Err(SimulationError::invalid(
                        "initial_fluid",
                        format!("sphere needs a finite center and positive radius, got {:?} r={}", center, radius),
                    ));
                }
            }
            FluidShape::Cuboid { min, size } => {
                if !min.is_finite() || !size.is_finite() || size.min_element() <= 0.0 {
                    return Err(SimulationError::invalid(
                        "initial_fluid",
                        format!("cuboid needs a finite corner and positive size, got {:?} {:?}", min, size),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl FluidGeometry for FluidShape {
    fn contains(&self, point: Vec3) -> bool {
        match *self {
            FluidShape::Sphere { center, radius } => point.distance_squared(center) < radius * radius,
            FluidShape::Cuboid { min, size } => {
                let max = min + size;
                point.cmpge(min).all() && point.cmplt(max).all()
            }
        }
    }
}

/// Cells of `materials` whose centre lies inside `geometry` and that are not solid.
pub fn covered_cells(
    geometry: &dyn FluidGeometry,
    materials: &Array3D<Material>,
    cell_size: f32,
) -> Vec<GridIndex> {
    materials
        .indices()
        .filter(|&g| materials[g] != Material::Solid && geometry.contains(cell_center(g, cell_size)))
        .collect()
}

/// Marker particles for each cell: 2x2x2 sub-cells, jittered by up to a
/// quarter sub-cell. `per_cell` beyond 8 wraps around the sub-cells.
pub fn seed_cells<R: Rng>(
    cells: &[GridIndex],
    per_cell: usize,
    cell_size: f32,
    velocity: Vec3,
    rng: &mut R,
) -> Vec<MarkerParticle> {
    let sub = 0.5 * cell_size;
    let jitter = 0.25 * sub;
    let mut particles = Vec::with_capacity(cells.len() * per_cell);
    for g in cells {
        let corner = Vec3::new(g.i as f32, g.j as f32, g.k as f32) * cell_size;
        for n in 0..per_cell {
            let s = n % 8;
            let offset = Vec3::new((s & 1) as f32, ((s >> 1) & 1) as f32, ((s >> 2) & 1) as f32);
            let centre = corner + (offset + Vec3::splat(0.5)) * sub;
            let j = Vec3::new(
                rng.gen_range(-jitter..=jitter),
                rng.gen_range(-jitter..=jitter),
                rng.gen_range(-jitter..=jitter),
            );
            particles.push(MarkerParticle::new(centre + j, velocity));
        }
    }
    particles
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// Adds fluid to covered air cells.
    Inflow,
    /// Removes marker particles from covered cells.
    Outflow,
}

/// Identifier handed out when a source is added to a simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub u32);

/// A fluid emitter or drain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FluidSource {
    pub shape: FluidShape,
    pub kind: SourceKind,
    #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
    pub velocity: Vec3,
    pub active: bool,
    /// Active only for simulation times in `[start, end)`.
    pub window: Option<(f64, f64)>,
}

/// What a source wants done this sub-step.
#[derive(Clone, Debug, PartialEq)]
pub struct EmissionRequest {
    pub kind: SourceKind,
    pub cells: Vec<GridIndex>,
    pub velocity: Vec3,
}

impl FluidSource {
    pub fn inflow(shape: FluidShape, velocity: Vec3) -> Self {
        Self {
            shape,
            kind: SourceKind::Inflow,
            velocity,
            active: true,
            window: None,
        }
    }

    pub fn outflow(shape: FluidShape) -> Self {
        Self {
            shape,
            kind: SourceKind::Outflow,
            velocity: Vec3::ZERO,
            active: true,
            window: None,
        }
    }

    pub fn with_window(mut self, start: f64, end: f64) -> Self {
        self.window = Some((start, end));
        self
    }

    pub fn is_active_at(&self, time: f64) -> bool {
        self.active
            && self
                .window
                .map_or(true, |(start, end)| time >= start && time < end)
    }

    /// Emission for this sub-step: air cells to fill (inflow) or fluid cells
    /// to drain (outflow). `None` when inactive or nothing is covered.
    pub fn update(&self, time: f64, materials: &Array3D<Material>, cell_size: f32) -> Option<EmissionRequest> {
        if !self.is_active_at(time) {
            return None;
        }
        let wanted = match self.kind {
            SourceKind::Inflow => Material::Air,
            SourceKind::Outflow => Material::Fluid,
        };
        let cells: Vec<GridIndex> = covered_cells(&self.shape, materials, cell_size)
            .into_iter()
            .filter(|&g| materials[g] == wanted)
            .collect();
        if cells.is_empty() {
            return None;
        }
        Some(EmissionRequest {
            kind: self.kind,
            cells,
            velocity: self.velocity,
        })
    }
}
