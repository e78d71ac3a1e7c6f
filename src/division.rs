//! Cell division policies.
//!
//! A policy runs once per tick before any force is applied. It keeps its
//! per-particle clock in a named [`ParticleProperty`](crate::ParticleProperty)
//! so the clock follows particles through clone and remove. Daughters are
//! appended at the end of the particle range and are not advanced in the
//! tick they are born.

use serde::{Deserialize, Serialize};

use crate::math::{clamp_finite, volume_halving_radius};
use crate::neighbor_grid::MAX_DIMENSION;
use crate::particles::ParticleSystem;
use crate::rng;

pub const MORPHOGEN_PROPERTY: &str = "morphogen";
pub const CELL_CYCLE_PROPERTY: &str = "cell_cycle";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DivisionOutcome {
    Divided { daughter: usize },
    /// The hook declined; the clock keeps running.
    Suppressed,
    /// The hook declined for now; the clock is held so the event fires again
    /// next tick.
    Delayed,
    AtCapacity,
}

/// Reacts to a particle's morphogen crossing into `generation`.
pub trait DivisionHook {
    fn on_generation(
        &mut self,
        system: &mut ParticleSystem,
        id: usize,
        generation: u32,
    ) -> DivisionOutcome;
}

/// Clones the particle; from `shrink_from_generation` on, mother and
/// daughter both get the target radius that halves the mother's volume.
/// An optional position gate can hold division back.
pub struct CloneAndShrink {
    pub shrink_from_generation: u32,
    pub position_noise: f32,
    gate: Option<Box<dyn Fn(&[f32]) -> bool>>,
}

impl CloneAndShrink {
    pub fn new(shrink_from_generation: u32, position_noise: f32) -> Self {
        Self {
            shrink_from_generation,
            position_noise: clamp_finite(position_noise, 0.0, 0.5, 0.0),
            gate: None,
        }
    }

    /// Division is delayed while `allow(position)` is false.
    pub fn with_gate<F>(mut self, allow: F) -> Self
    where
        F: Fn(&[f32]) -> bool + 'static,
    {
        self.gate = Some(Box::new(allow));
        self
    }
}

impl DivisionHook for CloneAndShrink {
    fn on_generation(
        &mut self,
        system: &mut ParticleSystem,
        id: usize,
        generation: u32,
    ) -> DivisionOutcome {
        if let (Some(allow), Some(position)) = (&self.gate, system.position(id)) {
            if !allow(position) {
                return DivisionOutcome::Delayed;
            }
        }

        let Some(daughter) = system.clone_particle(id, self.position_noise) else {
            return DivisionOutcome::AtCapacity;
        };

        if generation >= self.shrink_from_generation {
            if let Some(radius) = system.radius(id) {
                let target = volume_halving_radius(radius, system.dimension());
                system.set_target_radius(id, target);
                system.set_target_radius(daughter, target);
            }
        }
        DivisionOutcome::Divided { daughter }
    }
}

/// Morphogen clock: `m += rate + U[-rate_jitter, rate_jitter]` per tick,
/// never decreasing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OscillatorParams {
    pub rate: f32,
    pub rate_jitter: f32,
}

impl Default for OscillatorParams {
    fn default() -> Self {
        Self {
            rate: 0.01,
            rate_jitter: 0.0,
        }
    }
}

impl OscillatorParams {
    pub fn sanitize(&mut self) {
        self.rate = clamp_finite(self.rate, 0.0, 1.0, 0.01);
        self.rate_jitter = clamp_finite(self.rate_jitter, 0.0, self.rate, 0.0);
    }
}

pub struct MorphogenDivision {
    pub oscillator: OscillatorParams,
    pub hook: Box<dyn DivisionHook>,
}

impl MorphogenDivision {
    pub fn new<H: DivisionHook + 'static>(mut oscillator: OscillatorParams, hook: H) -> Self {
        oscillator.sanitize();
        Self {
            oscillator,
            hook: Box::new(hook),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellCyclePhase {
    Growth,
    /// Velocity is zeroed on entry.
    Commit,
    /// The particle divides on entry.
    Division,
    /// Position is perturbed on entry.
    Relocation,
    Done,
}

impl CellCyclePhase {
    const CYCLE: [CellCyclePhase; 4] = [
        CellCyclePhase::Growth,
        CellCyclePhase::Commit,
        CellCyclePhase::Division,
        CellCyclePhase::Relocation,
    ];

    /// Phase for a cell-cycle clock value. Four integer steps make one
    /// generation.
    pub fn at(counter: f32, max_generations: u32) -> Self {
        let step = counter.max(0.0).floor() as u32;
        if step / 4 >= max_generations {
            CellCyclePhase::Done
        } else {
            Self::CYCLE[(step % 4) as usize]
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeriodicDivision {
    /// Ticks spent in each phase.
    pub period: f32,
    pub max_generations: u32,
    pub position_noise: f32,
    pub relocation_noise: f32,
    pub shrink: bool,
}

impl Default for PeriodicDivision {
    fn default() -> Self {
        Self {
            period: 25.0,
            max_generations: 6,
            position_noise: 0.001,
            relocation_noise: 0.0,
            shrink: true,
        }
    }
}

impl PeriodicDivision {
    pub fn sanitize(&mut self) {
        self.period = clamp_finite(self.period, 1.0, 1.0e6, 25.0);
        self.position_noise = clamp_finite(self.position_noise, 0.0, 0.5, 0.001);
        self.relocation_noise = clamp_finite(self.relocation_noise, 0.0, 0.5, 0.0);
    }

    fn update(&self, system: &mut ParticleSystem, report: &mut DivisionReport) {
        let index = system.register_property(CELL_CYCLE_PROPERTY);
        let increment = 1.0 / self.period;
        let d = system.dimension();

        for id in 0..system.number_of_particles() {
            let Some(clock) = system.property_mut(index) else {
                return;
            };
            let old = clock[id];
            if CellCyclePhase::at(old, self.max_generations) == CellCyclePhase::Done {
                continue;
            }
            let new = old + increment;
            clock[id] = new;
            if new.floor() <= old.floor() {
                continue;
            }

            match CellCyclePhase::at(new, self.max_generations) {
                CellCyclePhase::Growth => {
                    report.observe_generation(new.floor() as u32 / 4);
                }
                CellCyclePhase::Commit => {
                    system.set_velocity(id, &[0.0; MAX_DIMENSION][..d]);
                }
                CellCyclePhase::Division => match system.clone_particle(id, self.position_noise) {
                    Some(daughter) => {
                        report.divisions += 1;
                        if self.shrink {
                            if let Some(radius) = system.radius(id) {
                                let target = volume_halving_radius(radius, d);
                                system.set_target_radius(id, target);
                                system.set_target_radius(daughter, target);
                            }
                        }
                    }
                    None => report.at_capacity += 1,
                },
                CellCyclePhase::Relocation => {
                    if self.relocation_noise > 0.0 {
                        let mut position = [0.0f32; MAX_DIMENSION];
                        if let Some(current) = system.position(id) {
                            position[..d].copy_from_slice(current);
                        }
                        for p in &mut position[..d] {
                            *p += rng::symmetric(system.rng_mut(), self.relocation_noise);
                        }
                        system.set_position(id, &position[..d]);
                    }
                }
                CellCyclePhase::Done => report.observe_generation(self.max_generations),
            }
        }
    }
}

/// What one policy update did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DivisionReport {
    pub divisions: usize,
    pub delayed: usize,
    pub suppressed: usize,
    pub at_capacity: usize,
    /// Highest generation any particle reached during the update.
    pub highest_generation: Option<u32>,
}

impl DivisionReport {
    fn observe_generation(&mut self, generation: u32) {
        let highest = self.highest_generation.unwrap_or(0).max(generation);
        self.highest_generation = Some(highest);
    }
}

#[derive(Default)]
pub enum DivisionPolicy {
    #[default]
    NoDivision,
    Periodic(PeriodicDivision),
    MorphogenDriven(MorphogenDivision),
}

impl DivisionPolicy {
    pub fn periodic(mut params: PeriodicDivision) -> Self {
        params.sanitize();
        DivisionPolicy::Periodic(params)
    }

    pub fn morphogen_driven<H>(oscillator: OscillatorParams, hook: H) -> Self
    where
        H: DivisionHook + 'static,
    {
        DivisionPolicy::MorphogenDriven(MorphogenDivision::new(oscillator, hook))
    }

    /// Registers the clock property this policy keeps, if any.
    pub fn prepare(&self, system: &mut ParticleSystem) {
        match self {
            DivisionPolicy::NoDivision => {}
            DivisionPolicy::Periodic(_) => {
                system.register_property(CELL_CYCLE_PROPERTY);
            }
            DivisionPolicy::MorphogenDriven(_) => {
                system.register_property(MORPHOGEN_PROPERTY);
            }
        }
    }

    pub fn update(&mut self, system: &mut ParticleSystem) -> DivisionReport {
        let mut report = DivisionReport::default();
        match self {
            DivisionPolicy::NoDivision => {}
            DivisionPolicy::Periodic(params) => params.update(system, &mut report),
            DivisionPolicy::MorphogenDriven(policy) => policy.update(system, &mut report),
        }
        report
    }
}

impl MorphogenDivision {
    fn update(&mut self, system: &mut ParticleSystem, report: &mut DivisionReport) {
        let index = system.register_property(MORPHOGEN_PROPERTY);
        let OscillatorParams { rate, rate_jitter } = self.oscillator;

        for id in 0..system.number_of_particles() {
            let jitter = rng::symmetric(system.rng_mut(), rate_jitter);
            let step = (rate + jitter).max(0.0);
            let Some(morphogen) = system.property_mut(index) else {
                return;
            };
            let old = morphogen[id];
            let new = old + step;
            morphogen[id] = new;
            if new.floor() <= old.floor() {
                continue;
            }

            let generation = new.floor() as u32;
            match self.hook.on_generation(system, id, generation) {
                DivisionOutcome::Divided { .. } => {
                    report.divisions += 1;
                    report.observe_generation(generation);
                }
                DivisionOutcome::Suppressed => {
                    report.suppressed += 1;
                    report.observe_generation(generation);
                }
                DivisionOutcome::Delayed => {
                    report.delayed += 1;
                    if let Some(morphogen) = system.property_mut(index) {
                        morphogen[id] = old;
                    }
                }
                DivisionOutcome::AtCapacity => {
                    report.at_capacity += 1;
                    report.observe_generation(generation);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CellCyclePhase, CloneAndShrink, DivisionPolicy, OscillatorParams, PeriodicDivision,
        MORPHOGEN_PROPERTY,
    };
    use crate::particles::{ParticleSystem, ParticleSystemConfig};

    fn system(capacity: usize) -> ParticleSystem {
        let config = ParticleSystemConfig::explicit(3, capacity, 8, 16).with_seed(17);
        let mut ps = ParticleSystem::new(config).unwrap();
        ps.add_particle_with_radius(&[0.5, 0.5, 0.5], 0.08);
        ps
    }

    fn quarter_rate() -> OscillatorParams {
        OscillatorParams {
            rate: 0.25,
            rate_jitter: 0.0,
        }
    }

    #[test]
    fn morphogen_crossing_divides_once() {
        let mut ps = system(8);
        let hook = CloneAndShrink::new(5, 0.001);
        let mut policy = DivisionPolicy::morphogen_driven(quarter_rate(), hook);
        policy.prepare(&mut ps);

        for _ in 0..3 {
            assert_eq!(policy.update(&mut ps).divisions, 0);
        }
        let report = policy.update(&mut ps);
        assert_eq!(report.divisions, 1);
        assert_eq!(report.highest_generation, Some(1));
        assert_eq!(ps.number_of_particles(), 2);

        // daughter inherits the morphogen value
        let index = ps.property_index(MORPHOGEN_PROPERTY).unwrap();
        assert_eq!(ps.property(index).unwrap(), &[1.0, 1.0]);
        // below the shrink threshold radii are untouched
        assert_eq!(ps.target_radii(), &[0.08, 0.08]);
    }

    #[test]
    fn division_halves_volume_after_relaxation() {
        let mut ps = system(8);
        let hook = CloneAndShrink::new(0, 0.0);
        let mut policy = DivisionPolicy::morphogen_driven(quarter_rate(), hook);
        for _ in 0..4 {
            policy.update(&mut ps);
        }
        for _ in 0..400 {
            ps.smooth_to_target_radius(0.05);
        }
        let expected = 0.08 * 0.5f32.powf(1.0 / 3.0);
        for r in ps.radii() {
            assert!((r - expected).abs() < 1.0e-5);
        }
    }

    #[test]
    fn gate_delays_division() {
        let mut ps = system(8);
        let hook = CloneAndShrink::new(0, 0.0).with_gate(|p| p[0] < 0.4);
        let mut policy = DivisionPolicy::morphogen_driven(quarter_rate(), hook);
        for _ in 0..10 {
            policy.update(&mut ps);
        }
        assert_eq!(ps.number_of_particles(), 1);
        let index = ps.property_index(MORPHOGEN_PROPERTY).unwrap();
        assert!(ps.property(index).unwrap()[0] < 1.0);

        ps.set_position(0, &[0.3, 0.5, 0.5]);
        assert_eq!(policy.update(&mut ps).divisions, 1);
    }

    #[test]
    fn division_at_capacity_is_silent() {
        let mut ps = system(1);
        let hook = CloneAndShrink::new(0, 0.0);
        let mut policy = DivisionPolicy::morphogen_driven(quarter_rate(), hook);
        let mut at_capacity = 0;
        for _ in 0..12 {
            at_capacity += policy.update(&mut ps).at_capacity;
        }
        assert_eq!(at_capacity, 3);
        assert_eq!(ps.number_of_particles(), 1);
        assert_eq!(ps.target_radii(), &[0.08]);
    }

    #[test]
    fn cell_cycle_phases() {
        assert_eq!(CellCyclePhase::at(0.5, 2), CellCyclePhase::Growth);
        assert_eq!(CellCyclePhase::at(1.0, 2), CellCyclePhase::Commit);
        assert_eq!(CellCyclePhase::at(2.9, 2), CellCyclePhase::Division);
        assert_eq!(CellCyclePhase::at(3.0, 2), CellCyclePhase::Relocation);
        assert_eq!(CellCyclePhase::at(4.0, 2), CellCyclePhase::Growth);
        assert_eq!(CellCyclePhase::at(8.0, 2), CellCyclePhase::Done);
    }

    #[test]
    fn periodic_policy_walks_the_cycle() {
        let mut ps = system(8);
        ps.set_velocity(0, &[0.01, 0.0, 0.0]);
        let mut policy = DivisionPolicy::periodic(PeriodicDivision {
            period: 1.0,
            max_generations: 1,
            position_noise: 0.0,
            relocation_noise: 0.0,
            shrink: true,
        });

        policy.update(&mut ps);
        assert_eq!(ps.velocity(0), Some(&[0.0, 0.0, 0.0][..]));

        assert_eq!(policy.update(&mut ps).divisions, 1);
        assert_eq!(ps.number_of_particles(), 2);

        let mut later = 0;
        for _ in 0..10 {
            later += policy.update(&mut ps).divisions;
        }
        assert_eq!(later, 0);
        assert_eq!(ps.number_of_particles(), 2);
    }

    #[test]
    fn no_division_leaves_system_alone() {
        let mut ps = system(4);
        let mut policy = DivisionPolicy::default();
        policy.prepare(&mut ps);
        assert_eq!(policy.update(&mut ps).divisions, 0);
        assert_eq!(ps.property_index(MORPHOGEN_PROPERTY), None);
    }
}
