use serde::{Deserialize, Serialize};

use crate::division::{DivisionPolicy, DivisionReport};
use crate::field::{CollisionForceField, ForceField};
use crate::math::clamp_finite;
use crate::particles::ParticleSystem;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Integrator {
    #[default]
    Euler,
    Trapezoidal,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TissueConfig {
    /// Fraction of the way radii move toward their target each tick.
    pub relaxation_alpha: f32,
    pub bounds_dampening: f32,
    pub bounds_noise: f32,
    /// Per-component velocity noise added after the force passes; 0 disables.
    pub brownian: f32,
    pub integrator: Integrator,
}

impl Default for TissueConfig {
    fn default() -> Self {
        Self {
            relaxation_alpha: 0.01,
            bounds_dampening: 0.5,
            bounds_noise: 0.0001,
            brownian: 0.0,
            integrator: Integrator::Euler,
        }
    }
}

impl TissueConfig {
    pub fn sanitize(&mut self) {
        self.relaxation_alpha = clamp_finite(self.relaxation_alpha, 0.0, 1.0, 0.01);
        self.bounds_dampening = clamp_finite(self.bounds_dampening, 0.0, 1.0, 0.5);
        self.bounds_noise = clamp_finite(self.bounds_noise, 0.0, 0.01, 0.0001);
        self.brownian = clamp_finite(self.brownian, 0.0, 0.01, 0.0);
    }
}

/// Intensity of one external field as a function of the highest generation
/// reached so far. Generations past the end of the table use its last entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForceSchedule {
    pub field_index: usize,
    pub intensities: Vec<f32>,
}

impl ForceSchedule {
    pub fn new(field_index: usize, intensities: Vec<f32>) -> Self {
        Self {
            field_index,
            intensities,
        }
    }

    pub fn intensity_for(&self, generation: u32) -> Option<f32> {
        let last = self.intensities.len().checked_sub(1)?;
        let index = (generation as usize).min(last);
        self.intensities.get(index).copied()
    }
}

/// A particle system driven by force fields and a division policy.
///
/// One tick runs, in order: division, force schedule, radius relaxation,
/// external fields in insertion order, collision, Brownian noise,
/// integration, bounds, grid rebuild.
pub struct TissueDynamics {
    system: ParticleSystem,
    fields: Vec<ForceField>,
    collision: Option<CollisionForceField>,
    division: DivisionPolicy,
    schedule: Option<ForceSchedule>,
    config: TissueConfig,
    time_step: u64,
    max_generation: u32,
    last_division: DivisionReport,
}

impl TissueDynamics {
    pub fn new(mut system: ParticleSystem, mut config: TissueConfig) -> Self {
        config.sanitize();
        system.update_neighborhood_cells();
        Self {
            system,
            fields: Vec::new(),
            collision: None,
            division: DivisionPolicy::NoDivision,
            schedule: None,
            config,
            time_step: 0,
            max_generation: 0,
            last_division: DivisionReport::default(),
        }
    }

    /// Appends a field and returns its index for use in a [`ForceSchedule`].
    pub fn add_field(&mut self, field: ForceField) -> usize {
        self.fields.push(field);
        self.fields.len() - 1
    }

    pub fn set_collision(&mut self, collision: Option<CollisionForceField>) {
        self.collision = collision;
    }

    pub fn set_division_policy(&mut self, policy: DivisionPolicy) {
        policy.prepare(&mut self.system);
        self.division = policy;
    }

    pub fn set_force_schedule(&mut self, schedule: Option<ForceSchedule>) {
        self.schedule = schedule;
    }

    pub fn system(&self) -> &ParticleSystem {
        &self.system
    }

    /// Direct access for setup; the grid is rebuilt at the start of the next
    /// tick if the particle count changed.
    pub fn system_mut(&mut self) -> &mut ParticleSystem {
        &mut self.system
    }

    pub fn config(&self) -> &TissueConfig {
        &self.config
    }

    pub fn fields(&self) -> &[ForceField] {
        &self.fields
    }

    pub fn field_mut(&mut self, index: usize) -> Option<&mut ForceField> {
        self.fields.get_mut(index)
    }

    pub fn collision(&self) -> Option<&CollisionForceField> {
        self.collision.as_ref()
    }

    pub fn collision_mut(&mut self) -> Option<&mut CollisionForceField> {
        self.collision.as_mut()
    }

    pub fn number_of_particles(&self) -> usize {
        self.system.number_of_particles()
    }

    pub fn time_step_index(&self) -> u64 {
        self.time_step
    }

    pub fn max_generation(&self) -> u32 {
        self.max_generation
    }

    pub fn last_division_report(&self) -> DivisionReport {
        self.last_division
    }

    pub fn simulation_steps(&mut self, steps: usize) {
        for _ in 0..steps {
            self.step();
        }
    }

    fn step(&mut self) {
        let report = self.division.update(&mut self.system);
        if let Some(generation) = report.highest_generation {
            if generation > self.max_generation {
                self.max_generation = generation;
                log::info!(
                    "tick {}: generation {} reached, {} particles",
                    self.time_step,
                    generation,
                    self.system.number_of_particles()
                );
            }
        }
        self.last_division = report;

        let indexed = self.system.grid().particle_count();
        if report.divisions > 0 || indexed != self.system.number_of_particles() {
            self.system.update_neighborhood_cells();
        }

        if let Some(schedule) = &self.schedule {
            let intensity = schedule.intensity_for(self.max_generation);
            let field = self.fields.get_mut(schedule.field_index);
            if let (Some(intensity), Some(field)) = (intensity, field) {
                field.set_intensity(intensity);
            }
        }

        self.system.smooth_to_target_radius(self.config.relaxation_alpha);

        for field in &mut self.fields {
            self.system.apply_force_field(field);
        }
        if let Some(collision) = &mut self.collision {
            let n = self.system.number_of_particles();
            self.system.apply_interaction_field_in(collision, 0..n);
        }
        if self.config.brownian > 0.0 {
            self.system.add_brownian_motion(self.config.brownian);
        }

        match self.config.integrator {
            Integrator::Euler => self.system.integrate_euler(),
            Integrator::Trapezoidal => self.system.integrate_trapezoidal(),
        }
        self.system
            .enforce_bounds(self.config.bounds_dampening, self.config.bounds_noise);
        self.system.update_neighborhood_cells();
        self.time_step += 1;

        log::trace!(
            "tick {}: n={}, divisions={}, max occupancy={}",
            self.time_step,
            self.system.number_of_particles(),
            report.divisions,
            self.system.maximal_occupancy()
        );
    }
}
