//! Simulation configuration.
//!
//! Every tunable lives here. A config is validated once and then moved into
//! the simulation, which only ever reads it.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::advection::Integrator;
use crate::array3d::GridIndex;
use crate::constants::*;
use crate::error::{Result, SimulationError};
use crate::kernels::WeightingMode;
use crate::serde_utils::{deserialize_vec3, serialize_vec3};
use crate::sources::FluidShape;

/// Spray/foam/bubble generation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffuseConfig {
    pub enabled: bool,
    /// Marker particles with signed distance above `-band * dx` are surface particles.
    pub surface_narrow_band: f32,
    pub min_wavecrest_curvature: f32,
    pub max_wavecrest_curvature: f32,
    pub min_energy: f32,
    pub max_energy: f32,
    pub min_turbulence: f32,
    pub max_turbulence: f32,
    pub wavecrest_sharpness: f32,
    pub wavecrest_emission_rate: f32,
    pub turbulence_emission_rate: f32,
    /// Seconds.
    pub max_lifetime: f32,
    pub max_particles: usize,
    /// Foam band half-width in cells.
    pub foam_layer_distance: f32,
    /// Bubble depth in cells.
    pub bubble_distance: f32,
    pub max_bubble_speed: f32,
    pub max_foam_speed: f32,
    pub bubble_buoyancy: f32,
    /// Fraction of the fluid/bubble velocity difference removed per step, in [0, 1].
    pub bubble_drag: f32,
    /// Turbulence neighbourhood radius in cells.
    pub turbulence_radius: f32,
}

impl Default for DiffuseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            surface_narrow_band: DIFFUSE_SURFACE_NARROW_BAND,
            min_wavecrest_curvature: MIN_WAVECREST_CURVATURE,
            max_wavecrest_curvature: MAX_WAVECREST_CURVATURE,
            min_energy: MIN_PARTICLE_ENERGY,
            max_energy: MAX_PARTICLE_ENERGY,
            min_turbulence: MIN_TURBULENCE,
            max_turbulence: MAX_TURBULENCE,
            wavecrest_sharpness: WAVECREST_SHARPNESS,
            wavecrest_emission_rate: WAVECREST_EMISSION_RATE,
            turbulence_emission_rate: TURBULENCE_EMISSION_RATE,
            max_lifetime: MAX_DIFFUSE_PARTICLE_LIFETIME,
            max_particles: MAX_DIFFUSE_PARTICLES,
            foam_layer_distance: FOAM_LAYER_DISTANCE,
            bubble_distance: BUBBLE_DISTANCE,
            max_bubble_speed: MAX_BUBBLE_SPEED,
            max_foam_speed: MAX_FOAM_SPEED,
            bubble_buoyancy: BUBBLE_BUOYANCY,
            bubble_drag: BUBBLE_DRAG,
            turbulence_radius: TURBULENCE_RADIUS,
        }
    }
}

/// Coarse brick grid settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrickConfig {
    pub enabled: bool,
    /// Brick extent in world units.
    pub width: f32,
    pub height: f32,
    pub depth: f32,
    pub max_velocity: f32,
    pub max_acceleration: f32,
    pub active_threshold: f32,
    pub min_neighbour_ratio: f32,
    pub max_neighbour_ratio: f32,
    /// Weight of the neighbour mean in each brick's target intensity.
    pub neighbour_intensity_influence_ratio: f32,
    /// Frames a brick stays active after it stops qualifying.
    pub max_inactive_frames: u32,
}

impl Default for BrickConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            width: BRICK_WIDTH,
            height: BRICK_HEIGHT,
            depth: BRICK_DEPTH,
            max_velocity: BRICK_MAX_VELOCITY,
            max_acceleration: BRICK_MAX_ACCELERATION,
            active_threshold: BRICK_ACTIVE_THRESHOLD,
            min_neighbour_ratio: BRICK_MIN_NEIGHBOUR_RATIO,
            max_neighbour_ratio: BRICK_MAX_NEIGHBOUR_RATIO,
            neighbour_intensity_influence_ratio: BRICK_NEIGHBOUR_INTENSITY_INFLUENCE_RATIO,
            max_inactive_frames: BRICK_MAX_INACTIVE_FRAMES,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub isize: usize,
    pub jsize: usize,
    pub ksize: usize,
    pub cell_size: f32,

    #[serde(serialize_with = "serialize_vec3", deserialize_with = "deserialize_vec3")]
    pub body_force: Vec3,
    pub density: f32,

    pub cfl_number: f32,
    pub min_time_step: f64,
    pub max_time_step: f64,
    pub max_advection_distance_factor: f32,

    pub pressure_tolerance: f64,
    pub max_pressure_iterations: usize,

    pub max_marker_particles_per_cell: usize,
    pub particles_per_cell: usize,
    /// Density-grid kernel radius as a multiple of the marker particle radius.
    pub marker_particle_scale: f32,
    pub pic_ratio: f32,

    pub advection_threads: usize,
    pub integrator: Integrator,
    pub weighting: WeightingMode,
    pub extrapolation_layers: usize,
    pub advect_velocity_field: bool,
    /// Distance a collided particle is kept off the solid face, in cells.
    pub collision_epsilon: f32,

    pub seed: u64,
    /// User solid cells; the outer cell layer is always solid.
    pub solid_cells: Vec<GridIndex>,
    pub initial_fluid: Vec<FluidShape>,

    pub diffuse: DiffuseConfig,
    pub brick: BrickConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            isize: 32,
            jsize: 32,
            ksize: 32,
            cell_size: 0.125,
            body_force: Vec3::new(0.0, GRAVITY, 0.0),
            density: WATER_DENSITY,
            cfl_number: CFL_NUMBER,
            min_time_step: MIN_TIME_STEP,
            max_time_step: MAX_TIME_STEP,
            max_advection_distance_factor: MAX_ADVECTION_DISTANCE_FACTOR,
            pressure_tolerance: PRESSURE_SOLVE_TOLERANCE,
            max_pressure_iterations: MAX_PRESSURE_ITERATIONS,
            max_marker_particles_per_cell: MAX_MARKER_PARTICLES_PER_CELL,
            particles_per_cell: MARKER_PARTICLES_PER_CELL,
            marker_particle_scale: MARKER_PARTICLE_SCALE,
            pic_ratio: PIC_RATIO,
            advection_threads: ADVECTION_THREADS,
            integrator: Integrator::default(),
            weighting: WeightingMode::default(),
            extrapolation_layers: EXTRAPOLATION_LAYERS,
            advect_velocity_field: true,
            collision_epsilon: COLLISION_EPSILON,
            seed: 0,
            solid_cells: Vec::new(),
            initial_fluid: Vec::new(),
            diffuse: DiffuseConfig::default(),
            brick: BrickConfig::default(),
        }
    }
}

fn positive_f32(field: &'static str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimulationError::invalid(field, format!("must be positive, got {}", value)))
    }
}

fn non_negative_f32(field: &'static str, value: f32) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SimulationError::invalid(field, format!("must not be negative, got {}", value)))
    }
}

fn ordered(field: &'static str, min: f32, max: f32) -> Result<()> {
    if min <= max {
        Ok(())
    } else {
        Err(SimulationError::invalid(field, format!("min {} exceeds max {}", min, max)))
    }
}

fn unit_interval(field: &'static str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SimulationError::invalid(field, format!("must be in [0, 1], got {}", value)))
    }
}

impl SimulationConfig {
    /// Config for an `isize x jsize x ksize` grid with default tuning.
    pub fn new(isize: usize, jsize: usize, ksize: usize, cell_size: f32) -> Self {
        Self {
            isize,
            jsize,
            ksize,
            cell_size,
            ..Self::default()
        }
    }

    pub fn dimensions(&self) -> (usize, usize, usize) {
        (self.isize, self.jsize, self.ksize)
    }

    /// Reject configurations the solver cannot run with.
    pub fn validate(&self) -> Result<()> {
        for (field, n) in [("isize", self.isize), ("jsize", self.jsize), ("ksize", self.ksize)] {
            if n < 3 {
                return Err(SimulationError::invalid(
                    field,
                    format!("needs at least 3 cells (solid border plus interior), got {}", n),
                ));
            }
        }
        positive_f32("cell_size", self.cell_size)?;
        positive_f32("density", self.density)?;
        if !self.body_force.is_finite() {
            return Err(SimulationError::invalid("body_force", "must be finite"));
        }
        positive_f32("cfl_number", self.cfl_number)?;
        if !(self.min_time_step.is_finite() && self.min_time_step > 0.0) {
            return Err(SimulationError::invalid(
                "min_time_step",
                format!("must be positive, got {}", self.min_time_step),
            ));
        }
        if !(self.max_time_step.is_finite() && self.max_time_step >= self.min_time_step) {
            return Err(SimulationError::invalid(
                "max_time_step",
                format!(
                    "must be at least min_time_step {}, got {}",
                    self.min_time_step, self.max_time_step
                ),
            ));
        }
        positive_f32("max_advection_distance_factor", self.max_advection_distance_factor)?;
        if !(self.pressure_tolerance.is_finite() && self.pressure_tolerance > 0.0) {
            return Err(SimulationError::invalid(
                "pressure_tolerance",
                format!("must be positive, got {}", self.pressure_tolerance),
            ));
        }
        if self.max_pressure_iterations == 0 {
            return Err(SimulationError::invalid("max_pressure_iterations", "must be non-zero"));
        }
        if self.max_marker_particles_per_cell == 0 {
            return Err(SimulationError::invalid("max_marker_particles_per_cell", "must be non-zero"));
        }
        if self.particles_per_cell == 0 {
            return Err(SimulationError::invalid("particles_per_cell", "must be non-zero"));
        }
        if self.particles_per_cell > self.max_marker_particles_per_cell {
            return Err(SimulationError::invalid(
                "particles_per_cell",
                format!(
                    "{} exceeds max_marker_particles_per_cell {}",
                    self.particles_per_cell, self.max_marker_particles_per_cell
                ),
            ));
        }
        positive_f32("marker_particle_scale", self.marker_particle_scale)?;
        unit_interval("pic_ratio", self.pic_ratio)?;
        if self.advection_threads == 0 {
            return Err(SimulationError::invalid("advection_threads", "must be non-zero"));
        }
        non_negative_f32("collision_epsilon", self.collision_epsilon)?;
        if self.collision_epsilon >= 0.5 {
            return Err(SimulationError::invalid("collision_epsilon", "must be below half a cell"));
        }

        for &g in &self.solid_cells {
            if !self.contains_cell(g) {
                return Err(SimulationError::CellOutOfRange(g));
            }
        }
        for shape in &self.initial_fluid {
            shape.validate()?;
        }

        self.validate_diffuse()?;
        self.validate_brick()
    }

    fn validate_diffuse(&self) -> Result<()> {
        let d = &self.diffuse;
        non_negative_f32("diffuse.surface_narrow_band", d.surface_narrow_band)?;
        ordered("diffuse.wavecrest_curvature", d.min_wavecrest_curvature, d.max_wavecrest_curvature)?;
        ordered("diffuse.energy", d.min_energy, d.max_energy)?;
        ordered("diffuse.turbulence", d.min_turbulence, d.max_turbulence)?;
        non_negative_f32("diffuse.wavecrest_emission_rate", d.wavecrest_emission_rate)?;
        non_negative_f32("diffuse.turbulence_emission_rate", d.turbulence_emission_rate)?;
        positive_f32("diffuse.max_lifetime", d.max_lifetime)?;
        non_negative_f32("diffuse.foam_layer_distance", d.foam_layer_distance)?;
        non_negative_f32("diffuse.bubble_distance", d.bubble_distance)?;
        non_negative_f32("diffuse.max_bubble_speed", d.max_bubble_speed)?;
        non_negative_f32("diffuse.max_foam_speed", d.max_foam_speed)?;
        non_negative_f32("diffuse.bubble_buoyancy", d.bubble_buoyancy)?;
        unit_interval("diffuse.bubble_drag", d.bubble_drag)?;
        positive_f32("diffuse.turbulence_radius", d.turbulence_radius)
    }

    fn validate_brick(&self) -> Result<()> {
        let b = &self.brick;
        positive_f32("brick.width", b.width)?;
        positive_f32("brick.height", b.height)?;
        positive_f32("brick.depth", b.depth)?;
        positive_f32("brick.max_velocity", b.max_velocity)?;
        positive_f32("brick.max_acceleration", b.max_acceleration)?;
        unit_interval("brick.min_neighbour_ratio", b.min_neighbour_ratio)?;
        unit_interval("brick.max_neighbour_ratio", b.max_neighbour_ratio)?;
        unit_interval(
            "brick.neighbour_intensity_influence_ratio",
            b.neighbour_intensity_influence_ratio,
        )
    }

    pub fn contains_cell(&self, g: GridIndex) -> bool {
        g.i >= 0
            && g.j >= 0
            && g.k >= 0
            && (g.i as usize) < self.isize
            && (g.j as usize) < self.jsize
            && (g.k as usize) < self.ksize
    }

    /// Save configuration to JSON file
    pub fn save_json(&self, path: &std::path::Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load and validate configuration from JSON file
    pub fn load_json(path: &std::path::Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}
