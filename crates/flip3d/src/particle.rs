//! Marker particles: the Lagrangian samples that carry the liquid.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::serde_utils::{deserialize_vec3, serialize_vec3};

/// A single marker particle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerParticle {
    /// World position
    #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
    pub position: Vec3,
    /// Current velocity
    #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
    pub velocity: Vec3,
}

impl MarkerParticle {
    /// Create a new particle at the given position with initial velocity.
    pub fn new(position: Vec3, velocity: Vec3) -> Self {
        Self { position, velocity }
    }

    /// Create a stationary particle at the given position.
    pub fn at(position: Vec3) -> Self {
        Self::new(position, Vec3::ZERO)
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.velocity.is_finite()
    }
}

impl Default for MarkerParticle {
    fn default() -> Self {
        Self::at(Vec3::ZERO)
    }
}

/// Collection of marker particles.
#[derive(Clone, Debug, Default)]
pub struct MarkerParticles {
    pub list: Vec<MarkerParticle>,
}

impl MarkerParticles {
    /// Create an empty particle collection.
    pub fn new() -> Self {
        Self { list: Vec::new() }
    }

    /// Create with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            list: Vec::with_capacity(capacity),
        }
    }

    /// Add a particle with the given position and velocity.
    pub fn spawn(&mut self, position: Vec3, velocity: Vec3) {
        self.list.push(MarkerParticle::new(position, velocity));
    }

    /// Number of particles.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn clear(&mut self) {
        self.list.clear();
    }

    /// Remove particles outside the half-open box `[min, max)`.
    pub fn remove_out_of_bounds(&mut self, min: Vec3, max: Vec3) {
        self.list.retain(|p| {
            p.position.x >= min.x
                && p.position.x < max.x
                && p.position.y >= min.y
                && p.position.y < max.y
                && p.position.z >= min.z
                && p.position.z < max.z
        });
    }

    /// Keep only particles whose `keep` flag is set. `keep` is parallel to `list`.
    pub fn retain_flagged(&mut self, keep: &[bool]) {
        assert_eq!(keep.len(), self.list.len(), "keep mask length mismatch");
        let mut flags = keep.iter();
        self.list.retain(|_| flags.next().copied().unwrap_or(false));
    }

    /// Largest particle speed, zero when empty.
    pub fn max_speed(&self) -> f32 {
        self.list
            .iter()
            .map(|p| p.velocity.length_squared())
            .fold(0.0f32, f32::max)
            .sqrt()
    }

    pub fn positions(&self) -> Vec<Vec3> {
        self.list.iter().map(|p| p.position).collect()
    }

    pub fn velocities(&self) -> Vec<Vec3> {
        self.list.iter().map(|p| p.velocity).collect()
    }
}
