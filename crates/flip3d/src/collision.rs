//! Particle collision against solid cells.
//!
//! A particle path is walked cell by cell (3D DDA) so every solid cell face
//! crossed along the direction of travel is found, not just axis neighbours.

use glam::Vec3;

use crate::array3d::GridIndex;
use crate::classify::SolidMask;
use crate::grid::{cell_center, position_to_cell};

/// Result of tracing a particle path through the solid mask.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PathOutcome {
    /// The path reached its end without touching a solid cell.
    Free(Vec3),
    /// The path entered a solid cell through the face with outward `normal`.
    /// `position` is the entry point nudged back into the free cell.
    Hit { position: Vec3, normal: Vec3 },
}

/// Walk the segment `p0 -> p1` and stop at the first solid cell face.
///
/// `p0` must not lie in a solid cell. `epsilon` is the distance (world units)
/// the stopped particle is moved off the face.
pub fn trace_path(p0: Vec3, p1: Vec3, solids: &SolidMask, cell_size: f32, epsilon: f32) -> PathOutcome {
    let delta = p1 - p0;
    let mut cell = position_to_cell(p0, cell_size);
    let end = position_to_cell(p1, cell_size);
    if cell == end {
        return if solids.is_solid(end) {
            // p1 and p0 share a solid cell: caller broke the precondition
            PathOutcome::Hit {
                position: p0,
                normal: Vec3::ZERO,
            }
        } else {
            PathOutcome::Free(p1)
        };
    }

    let g0 = p0 / cell_size;
    let step = [
        axis_step(delta.x),
        axis_step(delta.y),
        axis_step(delta.z),
    ];
    let mut t_max = [0.0f32; 3];
    let mut t_delta = [f32::INFINITY; 3];
    let d = delta / cell_size;
    let comps = [(g0.x, d.x), (g0.y, d.y), (g0.z, d.z)];
    let start = [cell.i, cell.j, cell.k];
    for axis in 0..3 {
        let (g, dg) = comps[axis];
        if step[axis] == 0 {
            t_max[axis] = f32::INFINITY;
            continue;
        }
        let boundary = if step[axis] > 0 {
            (start[axis] + 1) as f32
        } else {
            start[axis] as f32
        };
        t_max[axis] = (boundary - g) / dg;
        t_delta[axis] = 1.0 / dg.abs();
    }

    // Bounded walk: a segment crosses at most |di| + |dj| + |dk| faces
    let max_steps = (end.i - cell.i).abs() + (end.j - cell.j).abs() + (end.k - cell.k).abs();
    for _ in 0..max_steps {
        let axis = if t_max[0] <= t_max[1] && t_max[0] <= t_max[2] {
            0
        } else if t_max[1] <= t_max[2] {
            1
        } else {
            2
        };
        let t = t_max[axis];
        if t > 1.0 {
            break;
        }
        cell = match axis {
            0 => cell.offset(step[0], 0, 0),
            1 => cell.offset(0, step[1], 0),
            _ => cell.offset(0, 0, step[2]),
        };
        if solids.is_solid(cell) {
            let mut normal = Vec3::ZERO;
            normal[axis] = -(step[axis] as f32);
            let hit = p0 + delta * t;
            return PathOutcome::Hit {
                position: hit + normal * epsilon,
                normal,
            };
        }
        t_max[axis] += t_delta[axis];
    }

    PathOutcome::Free(p1)
}

#[inline]
fn axis_step(d: f32) -> i32 {
    if d > 0.0 {
        1
    } else if d < 0.0 {
        -1
    } else {
        0
    }
}

/// Fallback for a particle that starts inside a solid cell: the centre of the
/// first non-solid face neighbour, or `None` when the cell is enclosed.
pub fn escape_solid(position: Vec3, solids: &SolidMask, cell_size: f32) -> Option<Vec3> {
    let cell = position_to_cell(position, cell_size);
    if !solids.is_solid(cell) {
        return Some(position);
    }
    cell.neighbours()
        .into_iter()
        .find(|&n: &GridIndex| !solids.is_solid(n))
        .map(|n| cell_center(n, cell_size))
}

/// Remove the velocity component pointing into a surface with outward `normal`.
#[inline]
pub fn clamp_velocity_to_surface(velocity: Vec3, normal: Vec3) -> Vec3 {
    let into = velocity.dot(normal);
    if into < 0.0 {
        velocity - normal * into
    } else {
        velocity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(n: usize) -> SolidMask {
        SolidMask::with_border(n, n, n)
    }

    #[test]
    fn test_free_path() {
        let solids = boxed(8);
        let p1 = Vec3::new(5.5, 4.2, 3.3);
        let out = trace_path(Vec3::splat(2.5), p1, &solids, 1.0, 0.01);
        assert_eq!(out, PathOutcome::Free(p1));
    }

    #[test]
    fn test_falling_particle_stops_on_floor() {
        let solids = boxed(8);
        // Floor is the j = 0 border layer, its top face is at y = 1.0
        let out = trace_path(Vec3::new(3.5, 2.5, 3.5), Vec3::new(3.5, -0.5, 3.5), &solids, 1.0, 0.01);
        match out {
            PathOutcome::Hit { position, normal } => {
                assert_eq!(normal, Vec3::Y);
                assert!((position.y - 1.01).abs() < 1e-5, "got {:?}", position);
                assert!(!solids.is_solid(position_to_cell(position, 1.0)));
            }
            other => panic!("expected hit, got {:?}", other),
        }
    }

    #[test]
    fn test_diagonal_path_hits_user_solid() {
        let mut solids = boxed(8);
        solids.add(&[GridIndex::new(4, 4, 3)]);
        let out = trace_path(Vec3::new(2.5, 2.5, 3.5), Vec3::new(5.5, 5.5, 3.5), &solids, 1.0, 0.01);
        match out {
            PathOutcome::Hit { position, .. } => {
                assert!(!solids.is_solid(position_to_cell(position, 1.0)));
                assert!(position.x < 4.0 + 1e-3 || position.y < 4.0 + 1e-3);
            }
            other => panic!("expected hit, got {:?}", other),
        }
    }

    #[test]
    fn test_escape_from_solid() {
        let mut solids = boxed(6);
        solids.add(&[GridIndex::new(2, 2, 2)]);
        let escaped = escape_solid(Vec3::new(2.5, 2.5, 2.5), &solids, 1.0).unwrap();
        assert!(!solids.is_solid(position_to_cell(escaped, 1.0)));
    }

    #[test]
    fn test_enclosed_particle_has_no_escape() {
        let mut solids = boxed(6);
        let cells: Vec<_> = (1..5)
            .flat_map(|k| (1..5).flat_map(move |j| (1..5).map(move |i| GridIndex::new(i, j, k))))
            .collect();
        solids.add(&cells);
        assert!(escape_solid(Vec3::new(2.5, 2.5, 2.5), &solids, 1.0).is_none());
    }

    #[test]
    fn test_clamp_velocity() {
        let v = clamp_velocity_to_surface(Vec3::new(1.0, -3.0, 0.0), Vec3::Y);
        assert_eq!(v, Vec3::new(1.0, 0.0, 0.0));
        let up = clamp_velocity_to_surface(Vec3::new(0.0, 2.0, 0.0), Vec3::Y);
        assert_eq!(up, Vec3::new(0.0, 2.0, 0.0));
    }
}
