//! Liquid surface output.
//!
//! Meshing is done outside the crate: attach a [`Polygonizer`] to the
//! simulation and it is handed the level set once per frame.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::array3d::Array3D;
use crate::levelset::LevelSet;
use crate::serde_utils::vec3_list;

/// Indexed triangle mesh.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    #[serde(with = "vec3_list")]
    pub vertices: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl TriangleMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Append `other`, re-basing its indices.
    pub fn append(&mut self, other: &TriangleMesh) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.triangles
            .extend(other.triangles.iter().map(|t| [t[0] + base, t[1] + base, t[2] + base]));
    }

    /// Shift every vertex by `offset`.
    pub fn translate(&mut self, offset: Vec3) {
        for v in &mut self.vertices {
            *v += offset;
        }
    }
}

/// Surface extraction from the signed distance field.
pub trait Polygonizer: Send {
    /// Mesh of the zero isosurface of `level_set`. Cells flagged in
    /// `solid` may be excluded by the implementation.
    fn polygonize(&mut self, level_set: &LevelSet, solid: &Array3D<bool>) -> TriangleMesh;
}
