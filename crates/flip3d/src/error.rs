//! Simulation error types.

use thiserror::Error;

use crate::array3d::GridIndex;

/// Errors surfaced to the caller. Numerical non-convergence is not an error.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// A configuration value failed validation.
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// Two cooperating grids disagree on their dimensions.
    #[error("grid dimension mismatch: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },

    /// A cell index lies outside the simulation grid.
    #[error("cell {0:?} is outside the simulation grid")]
    CellOutOfRange(GridIndex),

    /// A save state could not be restored.
    #[error("corrupted save state: {0}")]
    CorruptedSaveState(String),

    /// The worker pool for particle advection could not be built.
    #[error("failed to build advection thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// External fluid geometry could not be loaded.
    #[error("failed to load fluid geometry: {0}")]
    GeometryLoad(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SimulationError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SimulationError>;
