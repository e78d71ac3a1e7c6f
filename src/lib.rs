use wasm_bindgen::prelude::*;

pub mod division;
pub mod double_buffer;
pub mod error;
pub mod field;
pub mod math;
pub mod merge_set;
pub mod neighbor_grid;
pub mod particles;
pub mod presets;
pub mod rng;
pub mod tissue;

pub use division::{
    CellCyclePhase, CloneAndShrink, DivisionHook, DivisionOutcome, DivisionPolicy, DivisionReport,
    OscillatorParams, PeriodicDivision,
};
pub use double_buffer::DoubleBuffer;
pub use error::{SimError, SimResult};
pub use field::{
    CentriForceField, CollisionForceField, ConstantForceField, DragForceField,
    EllipsoidalForceField, ExternalForceField, FieldEffect, FieldState, ForceField,
    InteractionForceField, OverlapCorrection, StochasticRepulsionForceField, SurfaceMode,
};
pub use math::MathMode;
pub use neighbor_grid::{GridSizing, NeighborhoodGrid, OccupancyStats, OverflowPolicy};
pub use particles::{ParticleProperty, ParticleSystem, ParticleSystemConfig};
pub use presets::{spherical_embryo, SphericalEmbryoConfig};
pub use tissue::{ForceSchedule, Integrator, TissueConfig, TissueDynamics};

/// Snapshot boundary for JS hosts: drive ticks, then copy state out into
/// caller-owned arrays.
#[wasm_bindgen]
pub struct Sim {
    tissue: TissueDynamics,
}

#[wasm_bindgen]
impl Sim {
    #[wasm_bindgen(constructor)]
    pub fn new(max_particles: usize, initial_particles: usize, seed: u32) -> Result<Sim, JsError> {
        let tissue = spherical_embryo(SphericalEmbryoConfig {
            max_particles,
            initial_particles,
            seed: Some(u64::from(seed)),
            ..SphericalEmbryoConfig::default()
        })?;
        Ok(Sim { tissue })
    }

    pub fn step(&mut self, steps: u32) {
        self.tissue.simulation_steps(steps as usize);
    }

    pub fn count(&self) -> usize {
        self.tissue.number_of_particles()
    }

    pub fn dimension(&self) -> usize {
        self.tissue.system().dimension()
    }

    pub fn grid_size(&self) -> usize {
        self.tissue.system().grid_size()
    }

    pub fn time_step_index(&self) -> u64 {
        self.tissue.time_step_index()
    }

    pub fn max_generation(&self) -> u32 {
        self.tissue.max_generation()
    }

    pub fn set_math_mode(&mut self, mode: u32) {
        if let Some(collision) = self.tissue.collision_mut() {
            collision.math_mode = MathMode::from_u32(mode);
        }
    }

    pub fn math_mode(&self) -> u32 {
        self.tissue
            .collision()
            .map_or(MathMode::default(), |c| c.math_mode)
            .as_u32()
    }

    pub fn copy_positions(&self, dst: &mut [f32]) -> usize {
        self.tissue.system().copy_positions(dst)
    }

    pub fn copy_velocities(&self, dst: &mut [f32]) -> usize {
        self.tissue.system().copy_velocities(dst)
    }

    pub fn copy_radii(&self, dst: &mut [f32]) -> usize {
        self.tissue.system().copy_radii(dst)
    }

    pub fn average_occupancy(&self) -> f32 {
        self.tissue.system().average_occupancy()
    }

    pub fn maximal_occupancy(&self) -> usize {
        self.tissue.system().maximal_occupancy()
    }

    pub fn maximal_effective_count_per_cell(&self) -> usize {
        self.tissue.system().maximal_effective_count_per_cell()
    }

    pub fn dropped_insertions(&self) -> usize {
        self.tissue.system().grid().dropped_last_update()
    }
}

#[cfg(test)]
mod tests {
    use super::Sim;

    #[test]
    fn facade_steps_and_copies() {
        let mut sim = Sim::new(32, 3, 7).unwrap_or_else(|_| panic!("construction failed"));
        assert_eq!(sim.count(), 3);
        assert_eq!(sim.dimension(), 3);

        sim.step(5);
        assert_eq!(sim.time_step_index(), 5);

        let mut positions = vec![0.0; sim.count() * sim.dimension()];
        let mut radii = vec![0.0; sim.count()];
        assert_eq!(sim.copy_positions(&mut positions), positions.len());
        assert_eq!(sim.copy_radii(&mut radii), radii.len());
        assert!(positions.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(radii.iter().all(|r| *r > 0.0));

        sim.set_math_mode(1);
        assert_eq!(sim.math_mode(), 1);
        assert_eq!(sim.dropped_insertions(), 0);
    }
}
