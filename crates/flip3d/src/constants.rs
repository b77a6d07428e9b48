//! Default numeric constants for the liquid simulation.
//!
//! These seed [`SimulationConfig::default`](crate::config::SimulationConfig);
//! components never read them directly once a config exists.

/// Gravity acceleration (m/s^2) - negative Y direction
pub const GRAVITY: f32 = -9.8;

/// Density of water (kg/m³)
pub const WATER_DENSITY: f32 = 1000.0;

// =============================================================================
// TIME STEPPING
// =============================================================================

/// Cells the fastest particle may cross in one sub-step.
pub const CFL_NUMBER: f32 = 5.0;

pub const MIN_TIME_STEP: f64 = 1.0 / 300.0;
pub const MAX_TIME_STEP: f64 = 1.0 / 15.0;

/// Particle displacement cap per sub-step, in cells.
pub const MAX_ADVECTION_DISTANCE_FACTOR: f32 = 2.5;

// =============================================================================
// PRESSURE SOLVE
// =============================================================================

pub const PRESSURE_SOLVE_TOLERANCE: f64 = 10e-6;
pub const MAX_PRESSURE_ITERATIONS: usize = 150;

/// MIC(0) blend between incomplete and modified Cholesky.
pub const MIC_TAU: f64 = 0.97;
/// MIC(0) safety factor against small pivots.
pub const MIC_SIGMA: f64 = 0.25;

// =============================================================================
// PARTICLES
// =============================================================================

pub const MAX_MARKER_PARTICLES_PER_CELL: usize = 50;
pub const MARKER_PARTICLES_PER_CELL: usize = 8;

/// Radius of a marker particle for density splatting, in cells.
pub const MARKER_PARTICLE_SCALE: f32 = 3.0;

/// 35% PIC, 65% FLIP.
pub const PIC_RATIO: f32 = 0.35;

pub const ADVECTION_THREADS: usize = 8;

/// Extrapolation band width in layers (ceil(CFL) + 2).
pub const EXTRAPOLATION_LAYERS: usize = 7;

/// Offset of a collided particle away from the solid face, in cells.
pub const COLLISION_EPSILON: f32 = 0.01;

// =============================================================================
// DIFFUSE MATERIAL
// =============================================================================

/// Marker particles closer than this to the surface (in cells) may emit.
pub const DIFFUSE_SURFACE_NARROW_BAND: f32 = 0.25;
pub const MIN_WAVECREST_CURVATURE: f32 = 0.2;
pub const MAX_WAVECREST_CURVATURE: f32 = 1.0;
pub const MIN_PARTICLE_ENERGY: f32 = 0.0;
pub const MAX_PARTICLE_ENERGY: f32 = 20.0;
pub const MIN_TURBULENCE: f32 = 100.0;
pub const MAX_TURBULENCE: f32 = 200.0;
/// Velocity/normal alignment below which a particle is not a wavecrest.
pub const WAVECREST_SHARPNESS: f32 = 0.6;
pub const WAVECREST_EMISSION_RATE: f32 = 200.0;
pub const TURBULENCE_EMISSION_RATE: f32 = 200.0;
pub const MAX_DIFFUSE_PARTICLE_LIFETIME: f32 = 2.0;
pub const MAX_DIFFUSE_PARTICLES: usize = 2_000_000;
/// Foam band half-width around the surface, in cells.
pub const FOAM_LAYER_DISTANCE: f32 = 1.0;
/// Depth below the surface beyond which slow particles are bubbles, in cells.
pub const BUBBLE_DISTANCE: f32 = 1.0;
pub const MAX_BUBBLE_SPEED: f32 = 2.0;
pub const MAX_FOAM_SPEED: f32 = 1.0;
pub const BUBBLE_BUOYANCY: f32 = 4.0;
pub const BUBBLE_DRAG: f32 = 1.0;

/// Neighbourhood radius of the turbulence field, in cells.
pub const TURBULENCE_RADIUS: f32 = 2.0;

// =============================================================================
// BRICKS
// =============================================================================

pub const BRICK_WIDTH: f32 = 1.0;
pub const BRICK_HEIGHT: f32 = 1.0;
pub const BRICK_DEPTH: f32 = 1.0;
pub const BRICK_MAX_VELOCITY: f32 = 10.0;
pub const BRICK_MAX_ACCELERATION: f32 = 10.0;
pub const BRICK_ACTIVE_THRESHOLD: f32 = 0.0;
/// Lit bricks with a smaller share of lit neighbours are switched off.
pub const BRICK_MIN_NEIGHBOUR_RATIO: f32 = 0.1;
/// Dark bricks with a larger share of lit neighbours are switched on.
pub const BRICK_MAX_NEIGHBOUR_RATIO: f32 = 0.5;
pub const BRICK_NEIGHBOUR_INTENSITY_INFLUENCE_RATIO: f32 = 0.5;
pub const BRICK_MAX_INACTIVE_FRAMES: u32 = 0;
