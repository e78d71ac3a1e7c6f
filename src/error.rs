//! Construction-time errors.
//!
//! Only caller programming errors surface here. Runtime trouble inside a
//! running simulation (capacity exhaustion, grid overflow, coincident
//! particles) is handled by skipping and never produces a `SimError`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("dimension must be between 1 and {max}, got {got}")]
    InvalidDimension { got: usize, max: usize },

    #[error("maximum particle count must be positive")]
    InvalidCapacity,

    #[error("grid resolution must be positive, sizing produced {0}")]
    InvalidGridSize(usize),

    #[error("grid cell capacity must be positive, sizing produced {0}")]
    InvalidCellCapacity(usize),

    #[error("radius must be finite and positive, got {0}")]
    InvalidRadius(f32),

    #[error("grid of {grid_size}^{dimension} cells x {cell_capacity} slots does not fit in memory")]
    GridTooLarge {
        grid_size: usize,
        dimension: usize,
        cell_capacity: usize,
    },
}

pub type SimResult<T> = Result<T, SimError>;
