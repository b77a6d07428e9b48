//! Layered velocity extrapolation from fluid faces into the surrounding band.
//!
//! Cells are tagged with their distance (in layers) from the fluid. A face
//! inherits the smallest layer of its two cells, and faces of layer `L` take
//! the average of their same-axis neighbours of layer `0..L`.

use crate::array3d::{Array3D, GridIndex};
use crate::grid::{is_face_bordering_value, FaceAxis, MacVelocityField, Material};

const UNKNOWN: i32 = -1;

/// Cell layer grid: 0 at fluid, `L` at cells `L` steps away, -1 beyond the band.
pub fn build_layer_grid(materials: &Array3D<Material>, max_layers: usize) -> Array3D<i32> {
    let (w, h, d) = materials.dimensions();
    let mut layers = Array3D::new(w, h, d, UNKNOWN).with_out_of_range_value(UNKNOWN);
    let mut frontier: Vec<GridIndex> = Vec::new();
    for g in materials.indices() {
        if materials[g] == Material::Fluid {
            layers[g] = 0;
            frontier.push(g);
        }
    }

    for layer in 1..=max_layers as i32 {
        let mut next = Vec::new();
        for g in &frontier {
            for n in g.neighbours() {
                if layers.contains(n) && layers[n] == UNKNOWN {
                    layers[n] = layer;
                    next.push(n);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    layers
}

/// Layer of a face: the smallest non-negative layer of its bordering cells.
fn face_layer(layers: &Array3D<i32>, axis: FaceAxis, i: i32, j: i32, k: i32) -> i32 {
    let (lower, upper) = axis.bordering_cells(i, j, k);
    match (layers[lower], layers[upper]) {
        (UNKNOWN, b) => b,
        (a, UNKNOWN) => a,
        (a, b) => a.min(b),
    }
}

/// Extrapolate every velocity component outward from the fluid.
///
/// `known` holds the per-axis masks of faces that carry a real value, as
/// produced by the particle scatter. A fluid-bordering face that is not known
/// is filled like a layer-1 face. `None` treats every fluid-bordering face as
/// known. Faces bordering solid are left untouched, as are faces beyond the
/// band. Returns the number of layers actually filled.
pub fn extrapolate_velocity_field(
    field: &mut MacVelocityField,
    materials: &Array3D<Material>,
    known: Option<&[Array3D<bool>; 3]>,
    max_layers: usize,
) -> usize {
    assert_eq!(
        field.dimensions(),
        materials.dimensions(),
        "velocity field and material grid differ"
    );
    let layers = build_layer_grid(materials, max_layers);
    let deepest = layers.as_slice().iter().copied().max().unwrap_or(UNKNOWN);
    if deepest < 0 {
        return 0;
    }

    for (slot, axis) in FaceAxis::ALL.into_iter().enumerate() {
        let mask = known.map(|masks| &masks[slot]);
        if let Some(mask) = mask {
            assert_eq!(
                mask.dimensions(),
                field.component(axis).dimensions(),
                "known-face mask and {:?} faces differ",
                axis
            );
        }
        extrapolate_component(field.component_mut(axis), axis, materials, mask, &layers, deepest);
    }
    log::trace!("extrapolated {} velocity layers", deepest);
    deepest as usize
}

fn extrapolate_component(
    component: &mut Array3D<f32>,
    axis: FaceAxis,
    materials: &Array3D<Material>,
    known: Option<&Array3D<bool>>,
    cell_layers: &Array3D<i32>,
    deepest: i32,
) {
    let (w, h, d) = component.dimensions();
    let mut face_layers = Array3D::new(w, h, d, UNKNOWN).with_out_of_range_value(UNKNOWN);
    // One spare layer for unknown fluid faces and one for deferred faces
    let last = deepest as usize + 2;
    let mut by_layer: Vec<Vec<GridIndex>> = vec![Vec::new(); last + 1];
    for g in face_layers.indices() {
        let mut layer = face_layer(cell_layers, axis, g.i, g.j, g.k);
        if layer == 0 && known.is_some_and(|mask| !mask[g]) {
            layer = 1;
        }
        face_layers[g] = layer;
        if layer > 0 && !is_face_bordering_value(materials, axis, g.i, g.j, g.k, Material::Solid) {
            by_layer[layer as usize].push(g);
        }
    }

    for layer in 1..=last {
        let faces = std::mem::take(&mut by_layer[layer]);
        let current = layer as i32;
        for g in faces {
            let mut sum = 0.0;
            let mut count = 0;
            for n in g.neighbours() {
                let nl = face_layers[n];
                if nl >= 0 && nl < current {
                    sum += component[n];
                    count += 1;
                }
            }
            if count > 0 {
                component[g] = sum / count as f32;
            } else if layer < last {
                // No filled neighbour yet: retry once the next layer is done
                face_layers[g] = current + 1;
                by_layer[layer + 1].push(g);
            } else {
                face_layers[g] = UNKNOWN;
            }
        }
    }
}

/// Zero every face that borders a solid cell: no flow through solids.
pub fn enforce_boundary_conditions(field: &mut MacVelocityField, materials: &Array3D<Material>) {
    for axis in FaceAxis::ALL {
        let component = field.component_mut(axis);
        for g in component.indices().collect::<Vec<_>>() {
            if is_face_bordering_value(materials, axis, g.i, g.j, g.k, Material::Solid) {
                component[g] = 0.0;
            }
        }
    }
}
