//! Force fields acting on a [`ParticleSystem`](crate::ParticleSystem).
//!
//! A pass reads positions and velocities from the read side of their
//! buffers and writes new velocities into the write side. Before a field
//! runs, the particle system copies current velocities into the write side,
//! so a field only has to touch the particles it affects. Fields that also
//! move particles stage the position buffer themselves and report it through
//! [`FieldEffect`]; the particle system swaps whatever was written.

use std::ops::Range;

use crate::double_buffer::DoubleBuffer;
use crate::neighbor_grid::NeighborhoodGrid;
use crate::rng::SimRng;

pub mod collision;
pub mod external;
pub mod stochastic;

pub use collision::{CollisionForceField, OverlapCorrection};
pub use external::{
    CentriForceField, ConstantForceField, DragForceField, EllipsoidalForceField, SurfaceMode,
};
pub use stochastic::StochasticRepulsionForceField;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldEffect {
    VelocitiesOnly,
    VelocitiesAndPositions,
}

pub struct FieldState<'a> {
    pub dimension: usize,
    pub count: usize,
    pub positions: &'a mut DoubleBuffer,
    pub velocities: &'a mut DoubleBuffer,
    pub radii: &'a [f32],
    pub rng: &'a mut SimRng,
}

impl FieldState<'_> {
    /// Copies current positions to the write side so a pass can accumulate
    /// displacements into it.
    pub fn stage_positions(&mut self) {
        self.positions.copy_read_to_write(self.count * self.dimension);
    }
}

/// A field whose effect on a particle depends only on that particle's own
/// state and the field's parameters.
pub trait ExternalForceField {
    fn apply(&mut self, range: Range<usize>, state: &mut FieldState<'_>) -> FieldEffect;

    fn intensity(&self) -> f32;

    fn set_intensity(&mut self, intensity: f32);
}

/// A pairwise field; candidate partners come from the neighborhood grid.
pub trait InteractionForceField {
    fn apply(
        &mut self,
        range: Range<usize>,
        grid: &NeighborhoodGrid,
        state: &mut FieldState<'_>,
    ) -> FieldEffect;

    fn intensity(&self) -> f32;

    fn set_intensity(&mut self, intensity: f32);
}

pub enum ForceField {
    External(Box<dyn ExternalForceField>),
    Interaction(Box<dyn InteractionForceField>),
}

impl ForceField {
    pub fn external<F: ExternalForceField + 'static>(field: F) -> Self {
        ForceField::External(Box::new(field))
    }

    pub fn interaction<F: InteractionForceField + 'static>(field: F) -> Self {
        ForceField::Interaction(Box::new(field))
    }

    pub fn intensity(&self) -> f32 {
        match self {
            ForceField::External(field) => field.intensity(),
            ForceField::Interaction(field) => field.intensity(),
        }
    }

    pub fn set_intensity(&mut self, intensity: f32) {
        match self {
            ForceField::External(field) => field.set_intensity(intensity),
            ForceField::Interaction(field) => field.set_intensity(intensity),
        }
    }
}
