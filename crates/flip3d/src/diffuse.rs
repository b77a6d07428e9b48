//! Diffuse material: spray, foam and bubble particles.
//!
//! Marker particles near wave crests or in turbulent, energetic flow emit
//! short-lived diffuse particles. Each step every diffuse particle is
//! reclassified from its depth and speed, moved with the kinematics of its
//! kind, and retired when its lifetime runs out or it leaves the fluid domain.

use glam::Vec3;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::classify::SolidMask;
use crate::config::DiffuseConfig;
use crate::grid::{position_to_cell, MacVelocityField};
use crate::levelset::LevelSet;
use crate::particle::MarkerParticle;
use crate::serde_utils::{deserialize_vec3, serialize_vec3};
use crate::turbulence::TurbulenceField;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiffuseKind {
    Bubble,
    Foam,
    Spray,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiffuseParticle {
    #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
    pub position: Vec3,
    #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
    pub velocity: Vec3,
    /// Seconds left to live.
    pub lifetime: f32,
    pub kind: DiffuseKind,
}

/// Emission candidate computed from a marker particle. Never stored.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DiffuseEmitter {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Normalised kinetic energy potential in [0, 1].
    pub energy: f32,
    /// Normalised wavecrest potential in [0, 1].
    pub wavecrest: f32,
    /// Normalised trapped-air potential in [0, 1].
    pub turbulence: f32,
}

/// Diffuse particles by kind, for export.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DiffuseParticlesByKind {
    pub bubble: Vec<DiffuseParticle>,
    pub foam: Vec<DiffuseParticle>,
    pub spray: Vec<DiffuseParticle>,
}

/// Read-only simulation state the generator consumes each step.
pub struct DiffuseContext<'a> {
    pub velocity: &'a MacVelocityField,
    pub level_set: &'a LevelSet,
    pub turbulence: &'a TurbulenceField,
    pub solids: &'a SolidMask,
    pub body_force: Vec3,
    pub dt: f32,
}

#[inline]
fn normalise(value: f32, min: f32, max: f32) -> f32 {
    if max <= min {
        return if value >= max { 1.0 } else { 0.0 };
    }
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}

/// Emission candidates among `markers`. Only particles with a non-zero
/// energy potential and some wavecrest or turbulence potential qualify.
pub fn find_emitters(markers: &[MarkerParticle], ctx: &DiffuseContext, config: &DiffuseConfig) -> Vec<DiffuseEmitter> {
    let dx = ctx.velocity.cell_size;
    let band = -config.surface_narrow_band * dx;
    markers
        .iter()
        .filter_map(|m| {
            let energy = normalise(0.5 * m.velocity.length_squared(), config.min_energy, config.max_energy);
            if energy <= 0.0 {
                return None;
            }

            let phi = ctx.level_set.sample(m.position);
            let wavecrest = if phi > band {
                let normal = ctx.level_set.normal(m.position);
                let direction = m.velocity.normalize_or_zero();
                if direction.dot(normal) < config.wavecrest_sharpness {
                    0.0
                } else {
                    let curvature = ctx.level_set.sample_curvature(m.position);
                    normalise(curvature, config.min_wavecrest_curvature, config.max_wavecrest_curvature)
                }
            } else {
                0.0
            };

            let turbulence = normalise(
                ctx.turbulence.sample(m.position),
                config.min_turbulence,
                config.max_turbulence,
            );
            if wavecrest <= 0.0 && turbulence <= 0.0 {
                return None;
            }
            Some(DiffuseEmitter {
                position: m.position,
                velocity: m.velocity,
                energy,
                wavecrest,
                turbulence,
            })
        })
        .collect()
}

/// Kind of a diffuse particle from its signed distance (world units) and speed.
pub fn classify(phi: f32, speed: f32, cell_size: f32, config: &DiffuseConfig) -> DiffuseKind {
    if phi < -config.bubble_distance * cell_size && speed <= config.max_bubble_speed {
        DiffuseKind::Bubble
    } else if phi.abs() <= config.foam_layer_distance * cell_size && speed <= config.max_foam_speed {
        DiffuseKind::Foam
    } else {
        DiffuseKind::Spray
    }
}

/// Live diffuse particles plus the random stream used to emit them.
#[derive(Clone, Debug)]
pub struct DiffuseMaterial {
    particles: Vec<DiffuseParticle>,
    rng: ChaCha8Rng,
}

impl DiffuseMaterial {
    pub fn new(rng: ChaCha8Rng) -> Self {
        Self {
            particles: Vec::new(),
            rng,
        }
    }

    pub fn particles(&self) -> &[DiffuseParticle] {
        &self.particles
    }

    pub fn set_particles(&mut self, particles: Vec<DiffuseParticle>) {
        self.particles = particles;
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn by_kind(&self) -> DiffuseParticlesByKind {
        let mut out = DiffuseParticlesByKind::default();
        for &p in &self.particles {
            match p.kind {
                DiffuseKind::Bubble => out.bubble.push(p),
                DiffuseKind::Foam => out.foam.push(p),
                DiffuseKind::Spray => out.spray.push(p),
            }
        }
        out
    }

    /// One step: advance existing particles, then emit from `markers`.
    pub fn update(&mut self, markers: &[MarkerParticle], ctx: &DiffuseContext, config: &DiffuseConfig) {
        let removed = self.advance(ctx, config);
        let emitters = find_emitters(markers, ctx, config);
        let emitted = self.emit(&emitters, ctx, config);
        log::trace!(
            "diffuse: {} emitters, {} emitted, {} removed, {} live",
            emitters.len(),
            emitted,
            removed,
            self.particles.len()
        );
    }

    /// Reclassify, move and age every particle. Returns the number removed.
    pub fn advance(&mut self, ctx: &DiffuseContext, config: &DiffuseConfig) -> usize {
        let dx = ctx.velocity.cell_size;
        let dt = ctx.dt;
        let before = self.particles.len();
        self.particles.retain_mut(|p| {
            let phi = ctx.level_set.sample(p.position);
            p.kind = classify(phi, p.velocity.length(), dx, config);
            let fluid_velocity = ctx.velocity.evaluate_velocity_at_position(p.position);
            match p.kind {
                DiffuseKind::Bubble => {
                    p.velocity += dt * (-config.bubble_buoyancy * ctx.body_force)
                        + config.bubble_drag * (fluid_velocity - p.velocity);
                }
                DiffuseKind::Spray => {
                    p.velocity += dt * ctx.body_force;
                }
                DiffuseKind::Foam => {
                    p.velocity = fluid_velocity;
                }
            }
            p.position += dt * p.velocity;
            p.lifetime -= dt;

            p.lifetime > 0.0
                && p.position.is_finite()
                && ctx.velocity.is_position_in_grid(p.position)
                && !ctx.solids.is_solid(position_to_cell(p.position, dx))
        });
        before - self.particles.len()
    }

    /// Emit new particles around `emitters`. Returns the number emitted.
    pub fn emit(&mut self, emitters: &[DiffuseEmitter], ctx: &DiffuseContext, config: &DiffuseConfig) -> usize {
        let dx = ctx.velocity.cell_size;
        let radius = 0.5 * dx;
        let mut emitted = 0;
        for e in emitters {
            let rate = e.energy
                * (config.wavecrest_emission_rate * e.wavecrest + config.turbulence_emission_rate * e.turbulence)
                * ctx.dt;
            let mut count = rate.floor() as usize;
            if self.rng.gen::<f32>() < rate.fract() {
                count += 1;
            }

            let speed = e.velocity.length();
            let axis = if speed > 1e-6 { e.velocity / speed } else { Vec3::Y };
            let e1 = axis.any_orthonormal_vector();
            let e2 = axis.cross(e1);
            for _ in 0..count {
                if self.particles.len() >= config.max_particles {
                    return emitted;
                }
                // Uniform sample of a cylinder aligned with the velocity
                let r = radius * self.rng.gen::<f32>().sqrt();
                let theta = self.rng.gen::<f32>() * std::f32::consts::TAU;
                let h = self.rng.gen::<f32>() * speed * ctx.dt;
                let radial = r * theta.cos() * e1 + r * theta.sin() * e2;
                let position = e.position + radial + h * axis;
                if !ctx.velocity.is_position_in_grid(position)
                    || ctx.solids.is_solid(position_to_cell(position, dx))
                {
                    continue;
                }
                let velocity = e.velocity + radial;
                let phi = ctx.level_set.sample(position);
                self.particles.push(DiffuseParticle {
                    position,
                    velocity,
                    lifetime: config.max_lifetime * self.rng.gen_range(0.5f32..=1.0),
                    kind: classify(phi, velocity.length(), dx, config),
                });
                emitted += 1;
            }
        }
        emitted
    }
}
