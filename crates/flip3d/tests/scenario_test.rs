//! End-to-end scenarios through `FluidSimulation`
//!
//! Small domains, a handful of frames each. These check physical sanity
//! (rest stays at rest, water falls, nothing enters solids or goes NaN)
//! rather than exact numbers.

use flip3d::{FluidShape, FluidSimulation, GridIndex, Material, SimulationConfig, Vec3};

const FRAME_DT: f64 = 1.0 / 30.0;

fn config(n: usize, dx: f32) -> SimulationConfig {
    let mut config = SimulationConfig::new(n, n, n, dx);
    config.advection_threads = 4;
    config.seed = 17;
    config
}

fn assert_particles_sane(sim: &FluidSimulation) {
    let size = sim.simulation_dimensions();
    for (idx, p) in sim.marker_particles().iter().enumerate() {
        assert!(p.is_finite(), "particle {} not finite: {:?}", idx, p);
        assert!(
            p.position.cmpge(Vec3::ZERO).all() && p.position.cmplt(size).all(),
            "particle {} left the domain: {:?}",
            idx,
            p.position
        );
        let cell = flip3d::grid::position_to_cell(p.position, sim.cell_size());
        assert!(!sim.is_solid(cell), "particle {} inside solid cell {:?}", idx, cell);
    }
}

#[test]
fn test_cube_at_rest_without_forces_stays_at_rest() {
    let mut config = config(10, 0.1);
    config.body_force = Vec3::ZERO;
    config.initial_fluid.push(FluidShape::Cuboid {
        min: Vec3::splat(0.2),
        size: Vec3::splat(0.6),
    });
    let mut sim = FluidSimulation::new(config).unwrap();
    assert_eq!(sim.marker_particle_count(), 6 * 6 * 6 * 8);
    let before: Vec<Vec3> = sim.marker_particle_positions();

    for _ in 0..10 {
        let report = sim.step(1.0 / 60.0);
        assert_eq!(report.fluid_cells, 216);
        assert_eq!(report.removed_particles, 0);
    }

    assert_eq!(sim.marker_particle_positions(), before);
    assert!(sim.marker_particle_velocities().iter().all(|v| *v == Vec3::ZERO));
    for i in 2..=7 {
        assert_eq!(sim.material(i, i, i), Material::Fluid);
    }
}

#[test]
fn test_water_column_falls_and_stays_in_bounds() {
    let mut config = config(12, 0.1);
    config.initial_fluid.push(FluidShape::Cuboid {
        min: Vec3::splat(0.1),
        size: Vec3::new(0.4, 0.8, 1.0),
    });
    let mut sim = FluidSimulation::new(config).unwrap();
    let initial = sim.marker_particle_count();
    let mean_y = |sim: &FluidSimulation| {
        sim.marker_particles().iter().map(|p| p.position.y).sum::<f32>() / sim.marker_particle_count() as f32
    };
    let start_y = mean_y(&sim);

    sim.run();
    for _ in 0..10 {
        sim.update(FRAME_DT);
        assert_particles_sane(&sim);
    }

    assert_eq!(sim.current_frame(), 10);
    assert!((sim.simulation_time() - 10.0 * FRAME_DT).abs() < 1e-9);
    assert!(mean_y(&sim) < start_y, "column should slump: {} -> {}", start_y, mean_y(&sim));
    assert!(
        sim.marker_particle_count() * 100 >= initial * 95,
        "lost too many particles: {} of {}",
        sim.marker_particle_count(),
        initial
    );
    let max_speed = sim
        .marker_particle_velocities()
        .iter()
        .map(|v| v.length())
        .fold(0.0f32, f32::max);
    assert!(max_speed < 20.0, "velocities exploded: {}", max_speed);
}

#[test]
fn test_column_on_floor_falls_slower_than_free_fall() {
    let mut config = config(10, 0.1);
    config.initial_fluid.push(FluidShape::Cuboid {
        min: Vec3::new(0.3, 0.1, 0.3),
        size: Vec3::new(0.4, 0.6, 0.4),
    });
    let gravity = config.body_force.y;
    let mut sim = FluidSimulation::new(config).unwrap();
    sim.run();
    sim.update(FRAME_DT);

    let n = sim.marker_particle_count() as f32;
    let mean_vy = sim.marker_particle_velocities().iter().map(|v| v.y).sum::<f32>() / n;
    let free_fall = gravity * sim.simulation_time() as f32;
    assert!(mean_vy < 0.0, "column should start falling, mean vy {}", mean_vy);
    assert!(
        mean_vy >= free_fall * 1.01,
        "floor should hold the column back: mean vy {} vs free fall {}",
        mean_vy,
        free_fall
    );
}

#[test]
fn test_obstacle_is_never_entered() {
    let mut config = config(12, 0.1);
    let obstacle: Vec<GridIndex> = (3..9)
        .flat_map(|k| (3..9).map(move |i| GridIndex::new(i, 3, k)))
        .collect();
    config.solid_cells = obstacle.clone();
    config.initial_fluid.push(FluidShape::Sphere {
        center: Vec3::new(0.6, 0.8, 0.6),
        radius: 0.25,
    });
    let mut sim = FluidSimulation::new(config).unwrap();
    assert!(sim.marker_particle_count() > 0);
    sim.run();
    for _ in 0..8 {
        sim.update(FRAME_DT);
        assert_particles_sane(&sim);
    }
    for g in obstacle {
        assert_eq!(sim.material(g.i as usize, g.j as usize, g.k as usize), Material::Solid);
    }
}

#[test]
fn test_empty_domain_still_advances_time() {
    let mut sim = FluidSimulation::new(config(6, 0.2)).unwrap();
    let report = sim.step(0.01);
    assert_eq!(report.fluid_cells, 0);
    assert!(report.pressure.is_none());
    sim.run();
    sim.update(FRAME_DT);
    assert_eq!(sim.current_frame(), 1);
    assert!((sim.simulation_time() - (0.01 + FRAME_DT)).abs() < 1e-9);
}

#[test]
fn test_dam_break_produces_classified_diffuse_particles() {
    let mut config = config(14, 0.1);
    config.diffuse.enabled = true;
    config.diffuse.min_turbulence = 0.0;
    config.diffuse.max_turbulence = 1.0;
    config.diffuse.min_energy = 0.0;
    config.diffuse.max_energy = 1.0;
    config.initial_fluid.push(FluidShape::Cuboid {
        min: Vec3::splat(0.1),
        size: Vec3::new(0.5, 1.0, 1.2),
    });
    let mut sim = FluidSimulation::new(config).unwrap();
    sim.run();
    for _ in 0..12 {
        sim.update(FRAME_DT);
    }

    let diffuse = sim.diffuse_particles();
    assert!(!diffuse.is_empty(), "a breaking column should throw spray or foam");
    let max_lifetime = sim.config().diffuse.max_lifetime;
    for p in diffuse {
        assert!(p.position.is_finite() && p.velocity.is_finite());
        assert!(p.lifetime > 0.0 && p.lifetime <= max_lifetime);
    }
    let by_kind = sim.diffuse_particles_by_kind();
    assert_eq!(
        by_kind.bubble.len() + by_kind.foam.len() + by_kind.spray.len(),
        diffuse.len()
    );
}

#[test]
fn test_seeding_is_reproducible_from_seed() {
    let mut config = config(10, 0.1);
    config.initial_fluid.push(FluidShape::Sphere {
        center: Vec3::splat(0.5),
        radius: 0.3,
    });
    let a = FluidSimulation::new(config.clone()).unwrap();
    let b = FluidSimulation::new(config.clone()).unwrap();
    assert_eq!(a.marker_particles(), b.marker_particles());

    config.seed += 1;
    let c = FluidSimulation::new(config).unwrap();
    assert_ne!(a.marker_particles(), c.marker_particles());
}
