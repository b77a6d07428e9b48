//! Coarse brick grid for stylised rendering.
//!
//! Each brick covers a block of simulation cells. Its intensity chases the
//! mean fluid density inside the block, limited by a maximum rate of change
//! and a maximum change of that rate, so bricks fade in and out smoothly
//! instead of flickering with the particles.
//!
//! Neighbourhoods (the 26 surrounding bricks) smooth the result further:
//! targets are blended with the neighbour mean, lit bricks with too few lit
//! neighbours are switched off, and dark bricks enclosed by lit ones are
//! switched on.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::array3d::{Array3D, GridIndex};
use crate::config::BrickConfig;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Brick {
    /// In [0, 1].
    pub intensity: f32,
    /// Rate of change of `intensity` per second.
    pub velocity: f32,
    pub is_active: bool,
    /// Frames this brick has stayed active since it was last wanted.
    #[serde(default)]
    pub inactive_frames: u32,
}

#[derive(Clone, Debug)]
pub struct BrickGrid {
    brick_size: Vec3,
    config: BrickConfig,
    bricks: Array3D<Brick>,
    targets: Array3D<f32>,
}

impl BrickGrid {
    /// Bricks tiling a domain of `world_size`. Partial bricks at the far edge
    /// are dropped.
    pub fn new(world_size: Vec3, config: &BrickConfig) -> Self {
        let brick_size = Vec3::new(config.width, config.height, config.depth);
        assert!(
            brick_size.min_element() > 0.0,
            "brick size must be positive, got {:?}",
            brick_size
        );
        let counts = (world_size / brick_size).floor().max(Vec3::ZERO);
        let (w, h, d) = (counts.x as usize, counts.y as usize, counts.z as usize);
        Self {
            brick_size,
            config: config.clone(),
            bricks: Array3D::new(w, h, d, Brick::default()),
            targets: Array3D::new(w, h, d, 0.0),
        }
    }

    pub fn dimensions(&self) -> (usize, usize, usize) {
        self.bricks.dimensions()
    }

    pub fn brick_size(&self) -> Vec3 {
        self.brick_size
    }

    pub fn bricks(&self) -> &Array3D<Brick> {
        &self.bricks
    }

    /// World-space centre of a brick.
    pub fn brick_center(&self, g: GridIndex) -> Vec3 {
        (Vec3::new(g.i as f32, g.j as f32, g.k as f32) + Vec3::splat(0.5)) * self.brick_size
    }

    pub fn active_count(&self) -> usize {
        self.bricks.as_slice().iter().filter(|b| b.is_active).count()
    }

    /// Advance every brick by `dt` towards the density of the cells it covers.
    ///
    /// Targets are the per-brick mean density divided by the largest mean, so
    /// the densest brick aims for full intensity.
    pub fn update(&mut self, density: &Array3D<f32>, cell_size: f32, dt: f32) {
        if self.bricks.is_empty() || dt <= 0.0 {
            return;
        }
        self.compute_targets(density, cell_size);
        self.blend_neighbour_targets();

        let max_velocity = self.config.max_velocity;
        let max_acceleration = self.config.max_acceleration;
        for (brick, &target) in self.bricks.as_mut_slice().iter_mut().zip(self.targets.as_slice()) {
            let desired = ((target - brick.intensity) / dt).clamp(-max_velocity, max_velocity);
            let acceleration = ((desired - brick.velocity) / dt).clamp(-max_acceleration, max_acceleration);
            brick.velocity = (brick.velocity + acceleration * dt).clamp(-max_velocity, max_velocity);
            brick.intensity = (brick.intensity + brick.velocity * dt).clamp(0.0, 1.0);
            if brick.intensity == 0.0 || brick.intensity == 1.0 {
                brick.velocity = 0.0;
            }
        }
        self.update_activity();
    }

    /// Pull each target towards the mean target of its neighbours.
    fn blend_neighbour_targets(&mut self) {
        let ratio = self.config.neighbour_intensity_influence_ratio;
        if ratio <= 0.0 {
            return;
        }
        let own = self.targets.clone();
        for g in own.indices() {
            let (sum, count) = neighbourhood(&own, g).fold((0.0, 0), |(s, c), n| (s + own[n], c + 1));
            if count > 0 {
                self.targets[g] = (1.0 - ratio) * own[g] + ratio * sum / count as f32;
            }
        }
    }

    /// Decide activity from intensity and the share of lit neighbours.
    fn update_activity(&mut self) {
        let (w, h, d) = self.bricks.dimensions();
        let mut lit = Array3D::new(w, h, d, false);
        for (l, b) in lit.as_mut_slice().iter_mut().zip(self.bricks.as_slice()) {
            *l = b.intensity > self.config.active_threshold;
        }

        for g in lit.indices() {
            let (lit_neighbours, count) =
                neighbourhood(&lit, g).fold((0, 0), |(l, c), n| (l + lit[n] as u32, c + 1));
            let wanted = if count == 0 {
                lit[g]
            } else {
                let ratio = lit_neighbours as f32 / count as f32;
                if lit[g] {
                    ratio >= self.config.min_neighbour_ratio
                } else {
                    ratio > self.config.max_neighbour_ratio
                }
            };

            let brick = &mut self.bricks[g];
            if wanted {
                brick.is_active = true;
                brick.inactive_frames = 0;
            } else if brick.is_active && brick.inactive_frames < self.config.max_inactive_frames {
                brick.inactive_frames += 1;
            } else {
                brick.is_active = false;
                brick.inactive_frames = 0;
            }
        }
    }

    fn compute_targets(&mut self, density: &Array3D<f32>, cell_size: f32) {
        let (w, h, d) = self.bricks.dimensions();
        let mut sums = Array3D::new(w, h, d, 0.0f32);
        let mut counts = Array3D::new(w, h, d, 0u32);
        for g in density.indices() {
            let centre = (Vec3::new(g.i as f32, g.j as f32, g.k as f32) + Vec3::splat(0.5)) * cell_size;
            let b = (centre / self.brick_size).floor();
            let bg = GridIndex::new(b.x as i32, b.y as i32, b.z as i32);
            if sums.contains(bg) {
                sums[bg] += density[g].max(0.0);
                counts[bg] += 1;
            }
        }

        let mut max_mean = 0.0f32;
        for ((t, &s), &c) in self
            .targets
            .as_mut_slice()
            .iter_mut()
            .zip(sums.as_slice())
            .zip(counts.as_slice())
        {
            *t = if c > 0 { s / c as f32 } else { 0.0 };
            max_mean = max_mean.max(*t);
        }
        if max_mean > 0.0 {
            for t in self.targets.as_mut_slice() {
                *t /= max_mean;
            }
        }
    }
}

/// The up to 26 in-range bricks around `g`.
fn neighbourhood<T: Copy>(grid: &Array3D<T>, g: GridIndex) -> impl Iterator<Item = GridIndex> + '_ {
    (-1..=1)
        .flat_map(|dk| (-1..=1).flat_map(move |dj| (-1..=1).map(move |di| (di, dj, dk))))
        .filter(|&offset| offset != (0, 0, 0))
        .map(move |(di, dj, dk)| GridIndex::new(g.i + di, g.j + dj, g.k + dk))
        .filter(move |&n| grid.contains(n))
}
