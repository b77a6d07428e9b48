//! The simulation driver.
//!
//! [`FluidSimulation`] owns every grid, the marker and diffuse particles and
//! the advection thread pool, and runs the per-step pipeline:
//!
//! 1. apply fluid sources and classify cells
//! 2. rebuild the level set
//! 3. particle to grid transfer, extrapolate
//! 4. semi-Lagrangian velocity advection
//! 5. save the field, apply body forces, zero solid faces, extrapolate
//! 6. pressure projection, extrapolate
//! 7. grid to particle transfer (PIC/FLIP)
//! 8. threaded marker particle advance with solid collision
//! 9. per-cell particle cap, diffuse material

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use glam::Vec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::advection::{advance_marker_particles, advect_velocity_field, AdvanceParams};
use crate::array3d::{Array3D, GridIndex};
use crate::brick::BrickGrid;
use crate::classify::{classify_materials, SolidMask};
use crate::config::SimulationConfig;
use crate::diffuse::{DiffuseContext, DiffuseMaterial, DiffuseParticle, DiffuseParticlesByKind};
use crate::error::{Result, SimulationError};
use crate::extrapolation::{enforce_boundary_conditions, extrapolate_velocity_field};
use crate::grid::{is_face_bordering_value, position_to_cell, FaceAxis, MacVelocityField, Material};
use crate::implicit_field::ImplicitField;
use crate::levelset::LevelSet;
use crate::particle::{MarkerParticle, MarkerParticles};
use crate::pressure::{PressureReport, PressureSolver};
use crate::savestate::SaveState;
use crate::sources::{covered_cells, seed_cells, FluidGeometry, FluidShape, FluidSource, GeometryLoader, SourceId, SourceKind};
use crate::surface::{Polygonizer, TriangleMesh};
use crate::transfer::{grid_to_particles, particles_to_grid, TransferBuffers};
use crate::turbulence::TurbulenceField;

/// Summary of one sub-step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepReport {
    pub dt: f64,
    pub fluid_cells: usize,
    /// `None` when there was no fluid to project.
    pub pressure: Option<PressureReport>,
    pub removed_particles: usize,
}

/// Radius of the sphere holding one of the 8 marker particles of a cell.
fn marker_particle_radius(cell_size: f32) -> f32 {
    let volume = cell_size * cell_size * cell_size / 8.0;
    (3.0 * volume / (4.0 * std::f32::consts::PI)).cbrt()
}

pub struct FluidSimulation {
    config: SimulationConfig,
    pool: rayon::ThreadPool,
    rng: ChaCha8Rng,

    materials: Array3D<Material>,
    solids: SolidMask,
    velocity: MacVelocityField,
    saved_velocity: MacVelocityField,
    advected_velocity: MacVelocityField,
    transfer: TransferBuffers,
    pressure: PressureSolver,
    level_set: LevelSet,
    turbulence: TurbulenceField,
    density: ImplicitField,
    particle_counts: Array3D<u32>,

    markers: MarkerParticles,
    diffuse: DiffuseMaterial,
    bricks: Option<BrickGrid>,
    polygonizer: Option<Box<dyn Polygonizer>>,
    surface_mesh: TriangleMesh,

    sources: BTreeMap<SourceId, FluidSource>,
    next_source_id: u32,

    frame: u64,
    simulation_time: f64,
    is_running: bool,
    is_current_frame_finished: bool,
}

impl FluidSimulation {
    /// Validate `config`, build every grid and seed the initial fluid.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let mut sim = Self::build(config)?;
        let shapes = sim.config.initial_fluid.clone();
        let mut cells = BTreeSet::new();
        for shape in &shapes {
            cells.extend(covered_cells(shape, &sim.materials, sim.config.cell_size));
        }
        let cells: Vec<GridIndex> = cells.into_iter().collect();
        sim.seed_fluid_cells(&cells, Vec3::ZERO);
        log::info!(
            "flip3d: {}x{}x{} grid, dx {}, {} initial fluid cells, {} marker particles",
            sim.config.isize,
            sim.config.jsize,
            sim.config.ksize,
            sim.config.cell_size,
            cells.len(),
            sim.markers.len()
        );
        Ok(sim)
    }

    /// Resume from `state`. The state is checked against `config` before
    /// anything is built; initial fluid shapes in `config` are not seeded.
    pub fn from_save_state(state: &SaveState, config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        state.validate(&config)?;

        let mut sim = Self::build(config)?;
        sim.solids.add(&state.solid_cells);
        sim.markers.list = state.marker_particles.clone();
        sim.diffuse.set_particles(state.diffuse_particles.clone());
        sim.frame = state.frame;
        sim.simulation_time = state.simulation_time;
        sim.classify();
        log::info!(
            "flip3d: restored frame {} at t={:.4}s with {} marker particles",
            sim.frame,
            sim.simulation_time,
            sim.markers.len()
        );
        Ok(sim)
    }

    fn build(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let (isize, jsize, ksize) = config.dimensions();
        let dx = config.cell_size;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.advection_threads)
            .thread_name(|i| format!("flip3d-advect-{}", i))
            .build()?;

        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut diffuse_rng = ChaCha8Rng::seed_from_u64(config.seed);
        diffuse_rng.set_stream(1);

        let mut solids = SolidMask::with_border(isize, jsize, ksize);
        solids.add(&config.solid_cells);

        let velocity = MacVelocityField::new(isize, jsize, ksize, dx);
        let transfer = TransferBuffers::new(&velocity, config.weighting);
        let density = ImplicitField::new(
            isize,
            jsize,
            ksize,
            dx,
            Vec3::splat(0.5),
            config.marker_particle_scale * marker_particle_radius(dx),
            config.weighting,
        );
        let bricks = config
            .brick
            .enabled
            .then(|| BrickGrid::new(velocity.world_size(), &config.brick));

        let mut sim = Self {
            pool,
            rng,
            materials: Array3D::new(isize, jsize, ksize, Material::Air),
            solids,
            saved_velocity: velocity.clone(),
            advected_velocity: velocity.clone(),
            velocity,
            transfer,
            pressure: PressureSolver::new(
                isize,
                jsize,
                ksize,
                config.pressure_tolerance,
                config.max_pressure_iterations,
            ),
            level_set: LevelSet::new(isize, jsize, ksize, dx),
            turbulence: TurbulenceField::new(isize, jsize, ksize, dx),
            density,
            particle_counts: Array3D::new(isize, jsize, ksize, 0),
            markers: MarkerParticles::new(),
            diffuse: DiffuseMaterial::new(diffuse_rng),
            bricks,
            polygonizer: None,
            surface_mesh: TriangleMesh::new(),
            sources: BTreeMap::new(),
            next_source_id: 0,
            frame: 0,
            simulation_time: 0.0,
            is_running: false,
            is_current_frame_finished: true,
            config,
        };
        sim.classify();
        Ok(sim)
    }

    fn classify(&mut self) -> usize {
        classify_materials(
            &mut self.materials,
            &self.solids,
            &self.markers.list,
            self.config.cell_size,
        )
    }

    fn seed_fluid_cells(&mut self, cells: &[GridIndex], velocity: Vec3) -> usize {
        let seeded = seed_cells(
            cells,
            self.config.particles_per_cell,
            self.config.cell_size,
            velocity,
            &mut self.rng,
        );
        let n = seeded.len();
        self.markers.list.extend(seeded);
        self.classify();
        n
    }

    // ---- fluid and solid geometry ----

    /// Fill every non-solid, non-fluid cell whose centre lies inside
    /// `geometry`. Returns the number of particles added.
    pub fn add_fluid_geometry(&mut self, geometry: &dyn FluidGeometry, velocity: Vec3) -> usize {
        self.classify();
        let cells: Vec<GridIndex> = covered_cells(geometry, &self.materials, self.config.cell_size)
            .into_iter()
            .filter(|&g| self.materials[g] == Material::Air)
            .collect();
        self.seed_fluid_cells(&cells, velocity)
    }

    pub fn add_fluid_shape(&mut self, shape: FluidShape, velocity: Vec3) -> Result<usize> {
        shape.validate()?;
        Ok(self.add_fluid_geometry(&shape, velocity))
    }

    /// Load external geometry and add it as fluid. A loader failure leaves
    /// the simulation untouched.
    pub fn load_fluid_geometry(
        &mut self,
        loader: &dyn GeometryLoader,
        path: &Path,
        velocity: Vec3,
    ) -> Result<usize> {
        let geometry = loader.load(path)?;
        Ok(self.add_fluid_geometry(geometry.as_ref(), velocity))
    }

    fn check_cells(&self, cells: &[GridIndex]) -> Result<()> {
        match cells.iter().find(|&&g| !self.config.contains_cell(g)) {
            Some(&g) => Err(SimulationError::CellOutOfRange(g)),
            None => Ok(()),
        }
    }

    /// Make `cells` solid and drop the marker particles inside them.
    pub fn add_solid_cells(&mut self, cells: &[GridIndex]) -> Result<()> {
        self.check_cells(cells)?;
        self.solids.add(cells);
        let dx = self.config.cell_size;
        let solids = &self.solids;
        let before = self.markers.len();
        self.markers
            .list
            .retain(|p| !solids.is_solid(position_to_cell(p.position, dx)));
        log::debug!(
            "added {} solid cells, removed {} marker particles",
            cells.len(),
            before - self.markers.len()
        );
        self.classify();
        Ok(())
    }

    /// Clear user solid cells. The domain border stays solid.
    pub fn remove_solid_cells(&mut self, cells: &[GridIndex]) -> Result<()> {
        self.check_cells(cells)?;
        self.solids.remove(cells);
        self.classify();
        Ok(())
    }

    // ---- sources ----

    pub fn add_source(&mut self, source: FluidSource) -> Result<SourceId> {
        source.shape.validate()?;
        if !source.velocity.is_finite() {
            return Err(SimulationError::invalid("source.velocity", "must be finite"));
        }
        let id = SourceId(self.next_source_id);
        self.next_source_id += 1;
        self.sources.insert(id, source);
        Ok(id)
    }

    pub fn remove_source(&mut self, id: SourceId) -> Option<FluidSource> {
        self.sources.remove(&id)
    }

    pub fn source(&self, id: SourceId) -> Option<&FluidSource> {
        self.sources.get(&id)
    }

    pub fn source_mut(&mut self, id: SourceId) -> Option<&mut FluidSource> {
        self.sources.get_mut(&id)
    }

    fn apply_sources(&mut self) {
        if self.sources.is_empty() {
            return;
        }
        self.classify();
        let dx = self.config.cell_size;
        let mut drained = Array3D::new(self.config.isize, self.config.jsize, self.config.ksize, false);
        let mut any_drained = false;

        let requests: Vec<_> = self
            .sources
            .values()
            .filter_map(|s| s.update(self.simulation_time, &self.materials, dx))
            .collect();
        for request in requests {
            match request.kind {
                SourceKind::Inflow => {
                    let cells: Vec<GridIndex> = request
                        .cells
                        .into_iter()
                        .filter(|&g| self.materials[g] == Material::Air)
                        .collect();
                    let seeded = seed_cells(
                        &cells,
                        self.config.particles_per_cell,
                        dx,
                        request.velocity,
                        &mut self.rng,
                    );
                    self.markers.list.extend(seeded);
                    self.materials.set_cells(&cells, Material::Fluid);
                }
                SourceKind::Outflow => {
                    drained.set_cells(&request.cells, true);
                    any_drained = true;
                }
            }
        }

        if any_drained {
            self.markers.list.retain(|p| {
                let g = position_to_cell(p.position, dx);
                !(drained.contains(g) && drained[g])
            });
        }
    }

    // ---- runtime control ----

    pub fn run(&mut self) {
        self.is_running = true;
    }

    pub fn pause(&mut self) {
        self.is_running = false;
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    /// CFL-limited sub-step length for the current particle velocities.
    pub fn next_time_step(&self) -> f64 {
        let max_speed = self.markers.max_speed() as f64;
        if max_speed < 1e-6 {
            return self.config.max_time_step;
        }
        let dt = self.config.cfl_number as f64 * self.config.cell_size as f64 / max_speed;
        dt.clamp(self.config.min_time_step, self.config.max_time_step)
    }

    /// Advance one frame of `frame_dt` seconds in CFL-limited sub-steps.
    /// Does nothing while paused.
    pub fn update(&mut self, frame_dt: f64) {
        assert!(
            frame_dt.is_finite() && frame_dt > 0.0,
            "frame dt must be positive, got {}",
            frame_dt
        );
        if !self.is_running {
            return;
        }

        self.is_current_frame_finished = false;
        let mut elapsed = 0.0;
        let mut substeps = 0;
        loop {
            let mut dt = self.next_time_step();
            let last = elapsed + dt >= frame_dt * (1.0 - 1e-9);
            if last {
                dt = frame_dt - elapsed;
            }
            self.step(dt);
            elapsed += dt;
            substeps += 1;
            if last {
                break;
            }
        }

        self.update_frame_outputs(frame_dt as f32);
        log::info!(
            "frame {}: {} substeps, {} marker particles, {} diffuse particles, t={:.4}s",
            self.frame,
            substeps,
            self.markers.len(),
            self.diffuse.len(),
            self.simulation_time
        );
        self.frame += 1;
        self.is_current_frame_finished = true;
    }

    /// Advance a single sub-step of `dt` seconds, whether running or not.
    pub fn step(&mut self, dt: f64) -> StepReport {
        assert!(dt.is_finite() && dt > 0.0, "dt must be positive, got {}", dt);
        let dtf = dt as f32;
        let dx = self.config.cell_size;

        self.apply_sources();
        let fluid_cells = self.classify();
        self.level_set.compute(&self.materials);

        if fluid_cells == 0 {
            if self.config.diffuse.enabled && !self.diffuse.is_empty() {
                self.turbulence.update(&self.velocity, &self.materials, self.config.diffuse.turbulence_radius * dx);
                self.update_diffuse(dtf);
            }
            self.simulation_time += dt;
            log::debug!("step dt={:.5}: no fluid", dt);
            return StepReport {
                dt,
                fluid_cells,
                pressure: None,
                removed_particles: 0,
            };
        }

        let layers = self.config.extrapolation_layers;
        particles_to_grid(&mut self.velocity, &self.markers.list, &mut self.transfer);
        extrapolate_velocity_field(
            &mut self.velocity,
            &self.materials,
            Some(self.transfer.known_faces()),
            layers,
        );

        if self.config.advect_velocity_field {
            advect_velocity_field(
                &self.velocity,
                &mut self.advected_velocity,
                &self.materials,
                dtf,
                self.config.integrator,
            );
            std::mem::swap(&mut self.velocity, &mut self.advected_velocity);
        }

        self.saved_velocity.copy_from(&self.velocity);
        self.apply_body_force(dtf);
        enforce_boundary_conditions(&mut self.velocity, &self.materials);
        extrapolate_velocity_field(&mut self.velocity, &self.materials, None, layers);

        let pressure = self
            .pressure
            .project(&mut self.velocity, &self.materials, dtf, self.config.density);
        extrapolate_velocity_field(&mut self.velocity, &self.materials, None, layers);

        let velocity = &self.velocity;
        let saved = &self.saved_velocity;
        let markers = &mut self.markers.list;
        let pic_ratio = self.config.pic_ratio;
        self.pool
            .install(|| grid_to_particles(velocity, saved, markers, pic_ratio));

        let params = AdvanceParams {
            dt: dtf,
            order: self.config.integrator,
            max_distance: self.config.max_advection_distance_factor * dx,
            collision_epsilon: self.config.collision_epsilon * dx,
        };
        let mut removed = advance_marker_particles(
            &self.pool,
            &mut self.markers.list,
            &self.velocity,
            &self.solids,
            &params,
        );
        removed += self.remove_excess_particles();

        if self.config.diffuse.enabled {
            self.turbulence.update(&self.velocity, &self.materials, self.config.diffuse.turbulence_radius * dx);
            self.update_diffuse(dtf);
        }

        self.simulation_time += dt;
        log::debug!(
            "step dt={:.5}: {} fluid cells, pressure {} iterations (residual {:.3e}), {} particles removed",
            dt,
            fluid_cells,
            pressure.iterations,
            pressure.residual,
            removed
        );
        StepReport {
            dt,
            fluid_cells,
            pressure: Some(pressure),
            removed_particles: removed,
        }
    }

    fn apply_body_force(&mut self, dt: f32) {
        let force = self.config.body_force;
        for axis in FaceAxis::ALL {
            let delta = axis.component(force) * dt;
            if delta == 0.0 {
                continue;
            }
            let component = self.velocity.component_mut(axis);
            for g in component.indices() {
                if is_face_bordering_value(&self.materials, axis, g.i, g.j, g.k, Material::Fluid) {
                    component[g] += delta;
                }
            }
        }
    }

    /// Keep at most `max_marker_particles_per_cell` per cell, first come first kept.
    fn remove_excess_particles(&mut self) -> usize {
        let max = self.config.max_marker_particles_per_cell as u32;
        let dx = self.config.cell_size;
        let counts = &mut self.particle_counts;
        counts.fill(0);
        let before = self.markers.len();
        self.markers.list.retain(|p| {
            let g = position_to_cell(p.position, dx);
            if !counts.contains(g) {
                return false;
            }
            counts[g] += 1;
            counts[g] <= max
        });
        before - self.markers.len()
    }

    fn update_diffuse(&mut self, dt: f32) {
        let ctx = DiffuseContext {
            velocity: &self.velocity,
            level_set: &self.level_set,
            turbulence: &self.turbulence,
            solids: &self.solids,
            body_force: self.config.body_force,
            dt,
        };
        self.diffuse.update(&self.markers.list, &ctx, &self.config.diffuse);
    }

    fn update_frame_outputs(&mut self, frame_dt: f32) {
        self.density.clear();
        for p in &self.markers.list {
            self.density.add_point(p.position);
        }

        if let Some(bricks) = self.bricks.as_mut() {
            bricks.update(self.density.field(), self.config.cell_size, frame_dt);
        }

        if let Some(polygonizer) = self.polygonizer.as_mut() {
            self.surface_mesh = polygonizer.polygonize(&self.level_set, self.solids.cells());
        }
    }

    /// Attach an external surface mesher; it runs once per frame.
    pub fn set_polygonizer(&mut self, polygonizer: Box<dyn Polygonizer>) {
        self.polygonizer = Some(polygonizer);
    }

    pub fn clear_polygonizer(&mut self) {
        self.polygonizer = None;
        self.surface_mesh = TriangleMesh::new();
    }

    // ---- save state ----

    pub fn save_state(&self) -> SaveState {
        SaveState {
            dimensions: self.config.dimensions(),
            cell_size: self.config.cell_size,
            frame: self.frame,
            simulation_time: self.simulation_time,
            marker_particles: self.markers.list.clone(),
            solid_cells: self.solids.user_cells().to_vec(),
            diffuse_particles: self.diffuse.particles().to_vec(),
        }
    }

    // ---- queries ----

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn current_frame(&self) -> u64 {
        self.frame
    }

    pub fn is_current_frame_finished(&self) -> bool {
        self.is_current_frame_finished
    }

    pub fn simulation_time(&self) -> f64 {
        self.simulation_time
    }

    pub fn grid_dimensions(&self) -> (usize, usize, usize) {
        self.config.dimensions()
    }

    /// World-space extent of the domain.
    pub fn simulation_dimensions(&self) -> Vec3 {
        self.velocity.world_size()
    }

    pub fn cell_size(&self) -> f32 {
        self.config.cell_size
    }

    /// Material of a cell as of the last classification. Panics outside the grid.
    pub fn material(&self, i: usize, j: usize, k: usize) -> Material {
        self.materials[(i, j, k)]
    }

    pub fn materials(&self) -> &Array3D<Material> {
        &self.materials
    }

    pub fn marker_particles(&self) -> &[MarkerParticle] {
        &self.markers.list
    }

    pub fn marker_particle_count(&self) -> usize {
        self.markers.len()
    }

    pub fn marker_particle_positions(&self) -> Vec<Vec3> {
        self.markers.positions()
    }

    pub fn marker_particle_velocities(&self) -> Vec<Vec3> {
        self.markers.velocities()
    }

    pub fn velocity_field(&self) -> &MacVelocityField {
        &self.velocity
    }

    /// Marker particle density at cell centres, refreshed once per frame.
    pub fn density_grid(&self) -> &Array3D<f32> {
        self.density.field()
    }

    pub fn level_set(&self) -> &LevelSet {
        &self.level_set
    }

    /// Last extracted surface; `None` without a polygonizer.
    pub fn surface_mesh(&self) -> Option<&TriangleMesh> {
        self.polygonizer.as_ref().map(|_| &self.surface_mesh)
    }

    pub fn diffuse_particles(&self) -> &[DiffuseParticle] {
        self.diffuse.particles()
    }

    pub fn diffuse_particles_by_kind(&self) -> DiffuseParticlesByKind {
        self.diffuse.by_kind()
    }

    pub fn brick_grid(&self) -> Option<&BrickGrid> {
        self.bricks.as_ref()
    }

    /// User solid cells; the border is implied.
    pub fn solid_cells(&self) -> &[GridIndex] {
        self.solids.user_cells()
    }

    pub fn is_solid(&self, g: GridIndex) -> bool {
        self.solids.is_solid(g)
    }
}
