//! Resumable simulation snapshot.
//!
//! A save state holds everything needed to continue a run from a sub-step
//! boundary: the clock, the marker and diffuse particles, and the user solid
//! cells. Grid fields are rebuilt from these on the next step.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::array3d::GridIndex;
use crate::config::SimulationConfig;
use crate::diffuse::DiffuseParticle;
use crate::error::{Result, SimulationError};
use crate::particle::MarkerParticle;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaveState {
    pub dimensions: (usize, usize, usize),
    pub cell_size: f32,
    pub frame: u64,
    pub simulation_time: f64,
    pub marker_particles: Vec<MarkerParticle>,
    /// User solid cells only; the domain border is implied.
    pub solid_cells: Vec<GridIndex>,
    #[serde(default)]
    pub diffuse_particles: Vec<DiffuseParticle>,
}

impl SaveState {
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a save state. Structural checks only; see [`SaveState::validate`].
    pub fn load_json(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Check this state against the config it is about to be restored into.
    pub fn validate(&self, config: &SimulationConfig) -> Result<()> {
        if self.dimensions != config.dimensions() {
            return Err(SimulationError::DimensionMismatch {
                expected: config.dimensions(),
                found: self.dimensions,
            });
        }
        if (self.cell_size - config.cell_size).abs() > f32::EPSILON * config.cell_size.max(1.0) {
            return Err(SimulationError::CorruptedSaveState(format!(
                "cell size {} does not match config {}",
                self.cell_size, config.cell_size
            )));
        }
        if !(self.simulation_time.is_finite() && self.simulation_time >= 0.0) {
            return Err(SimulationError::CorruptedSaveState(format!(
                "invalid simulation time {}",
                self.simulation_time
            )));
        }
        for &g in &self.solid_cells {
            if !config.contains_cell(g) {
                return Err(SimulationError::CellOutOfRange(g));
            }
        }
        if let Some(idx) = self.marker_particles.iter().position(|p| !p.is_finite()) {
            return Err(SimulationError::CorruptedSaveState(format!(
                "marker particle {} is not finite",
                idx
            )));
        }
        if let Some(idx) = self
            .diffuse_particles
            .iter()
            .position(|p| !(p.position.is_finite() && p.velocity.is_finite() && p.lifetime.is_finite()))
        {
            return Err(SimulationError::CorruptedSaveState(format!(
                "diffuse particle {} is not finite",
                idx
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn state() -> SaveState {
        SaveState {
            dimensions: (8, 8, 8),
            cell_size: 0.5,
            frame: 3,
            simulation_time: 0.1,
            marker_particles: vec![MarkerParticle::new(Vec3::splat(1.2), Vec3::Y)],
            solid_cells: vec![GridIndex::new(3, 3, 3)],
            diffuse_particles: Vec::new(),
        }
    }

    #[test]
    fn test_valid_state() {
        state().validate(&SimulationConfig::new(8, 8, 8, 0.5)).unwrap();
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = state().validate(&SimulationConfig::new(8, 9, 8, 0.5)).unwrap_err();
        assert!(matches!(err, SimulationError::DimensionMismatch { .. }), "{:?}", err);
    }

    #[test]
    fn test_rejects_bad_contents() {
        let config = SimulationConfig::new(8, 8, 8, 0.5);

        let mut s = state();
        s.solid_cells.push(GridIndex::new(0, 8, 0));
        assert!(matches!(s.validate(&config), Err(SimulationError::CellOutOfRange(_))));

        let mut s = state();
        s.marker_particles[0].velocity.x = f32::NAN;
        assert!(matches!(s.validate(&config), Err(SimulationError::CorruptedSaveState(_))));

        let mut s = state();
        s.cell_size = 0.25;
        assert!(matches!(s.validate(&config), Err(SimulationError::CorruptedSaveState(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let path = std::env::temp_dir().join("flip3d_savestate_does_not_exist.json");
        assert!(matches!(SaveState::load_json(&path), Err(SimulationError::Io(_))));
    }
}
