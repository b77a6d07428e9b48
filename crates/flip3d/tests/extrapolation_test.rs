//! Velocity extrapolation tests

use flip3d::array3d::Array3D;
use flip3d::extrapolation::{build_layer_grid, enforce_boundary_conditions, extrapolate_velocity_field};
use flip3d::grid::is_face_bordering_value;
use flip3d::transfer::{particles_to_grid, TransferBuffers};
use flip3d::{FaceAxis, MacVelocityField, MarkerParticle, Material, Vec3, WeightingMode};

const N: usize = 12;

/// Fluid slab in the lower half, air above, solid border.
fn slab() -> Array3D<Material> {
    let mut materials = Array3D::new(N, N, N, Material::Air);
    for g in materials.indices() {
        if [g.i, g.j, g.k].iter().any(|&c| c == 0 || c as usize == N - 1) {
            materials[g] = Material::Solid;
        } else if g.j < 5 {
            materials[g] = Material::Fluid;
        }
    }
    materials
}

#[test]
fn test_layers_grow_away_from_surface() {
    let materials = slab();
    let layers = build_layer_grid(&materials, 3);
    assert_eq!(layers.get(5, 2, 5), 0, "fluid is layer 0");
    assert_eq!(layers.get(5, 5, 5), 1);
    assert_eq!(layers.get(5, 7, 5), 3);
    assert_eq!(layers.get(5, 8, 5), -1, "beyond the band");
}

#[test]
fn test_horizontal_flow_is_carried_into_air() {
    let materials = slab();
    let mut field = MacVelocityField::new(N, N, N, 0.5);
    // Fluid moves in +x with speed growing with height
    for k in 0..N {
        for j in 1..5 {
            for i in 1..N {
                field.u_mut().set(i, j, k, j as f32);
            }
        }
    }
    enforce_boundary_conditions(&mut field, &materials);

    let filled = extrapolate_velocity_field(&mut field, &materials, None, 4);
    assert_eq!(filled, 4);

    for j in 5..9 {
        let u = field.u().get(5, j, 5);
        assert!((u - 4.0).abs() < 1e-5, "u at j={} should copy the top fluid layer, got {}", j, u);
    }
    assert_eq!(field.u().get(5, 9, 5), 0.0, "faces beyond the band are untouched");
}

#[test]
fn test_extrapolated_field_respects_walls() {
    let materials = slab();
    let mut field = MacVelocityField::new(N, N, N, 0.5);
    field.w_mut().fill(3.0);
    enforce_boundary_conditions(&mut field, &materials);
    extrapolate_velocity_field(&mut field, &materials, None, 6);

    for j in 0..N {
        for i in 0..N {
            assert_eq!(field.w().get(i as i32, j as i32, 1), 0.0, "face against the k=0 wall");
        }
    }
    assert_eq!(field.w().get(5, 6, 5), 3.0);
}

#[test]
fn test_faces_missed_by_sparse_scatter_are_filled_from_known_faces() {
    let mut materials = Array3D::new(8, 8, 8, Material::Air);
    materials.set(3, 3, 3, Material::Fluid);
    let mut field = MacVelocityField::new(8, 8, 8, 1.0);
    let mut buffers = TransferBuffers::new(&field, WeightingMode::Tricubic);
    // Near the +x face only: the tricubic support misses the -x face
    let particles = [MarkerParticle::new(Vec3::new(3.95, 3.05, 3.05), Vec3::new(1.0, 0.0, 0.0))];
    particles_to_grid(&mut field, &particles, &mut buffers);
    assert!(!buffers.known(FaceAxis::U).get(3, 3, 3));
    assert!(buffers.known(FaceAxis::U).get(4, 3, 3));

    let before = field.clone();
    extrapolate_velocity_field(&mut field, &materials, Some(buffers.known_faces()), 3);

    assert!((field.u().get(4, 3, 3) - 1.0).abs() < 1e-6, "known face keeps its value");
    assert!((field.u().get(3, 3, 3) - 1.0).abs() < 1e-6, "unknown fluid face takes its known neighbour");
    assert!((field.u().get(2, 3, 3) - 1.0).abs() < 1e-6, "band beyond it follows");

    for axis in FaceAxis::ALL {
        let known = buffers.known(axis);
        let component = field.component(axis);
        for g in component.indices() {
            let borders_fluid = is_face_bordering_value(&materials, axis, g.i, g.j, g.k, Material::Fluid);
            if !borders_fluid || known[g] {
                continue;
            }
            let sources: Vec<f32> = g
                .neighbours()
                .into_iter()
                .filter(|&n| {
                    known.contains(n)
                        && known[n]
                        && is_face_bordering_value(&materials, axis, n.i, n.j, n.k, Material::Fluid)
                })
                .map(|n| before.component(axis)[n])
                .collect();
            if sources.is_empty() {
                continue;
            }
            let expected = sources.iter().sum::<f32>() / sources.len() as f32;
            assert!(
                (component[g] - expected).abs() < 1e-6,
                "{:?} face {:?}: {} vs average {}",
                axis,
                g,
                component[g],
                expected
            );
            if axis == FaceAxis::U {
                assert!(component[g] != 0.0, "unknown u face {:?} left at zero", g);
            }
        }
    }
}
