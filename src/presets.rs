//! Ready-made organisms. Everything organism-specific lives in the config
//! structs here; the generic core only sees fields and policies.

use serde::{Deserialize, Serialize};

use crate::division::{CloneAndShrink, DivisionPolicy, OscillatorParams, MORPHOGEN_PROPERTY};
use crate::error::SimResult;
use crate::field::{
    CollisionForceField, EllipsoidalForceField, ForceField, OverlapCorrection, SurfaceMode,
};
use crate::math::clamp_finite;
use crate::neighbor_grid::{GridSizing, OverflowPolicy, MAX_DIMENSION};
use crate::particles::{ParticleSystem, ParticleSystemConfig};
use crate::rng;
use crate::tissue::{ForceSchedule, TissueConfig, TissueDynamics};

/// A ball of cells that divides inside a spherical shell. The shell
/// constraint tightens with each generation following
/// `shell_intensities`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SphericalEmbryoConfig {
    pub dimension: usize,
    pub max_particles: usize,
    pub initial_particles: usize,
    pub initial_radius: f32,
    /// Smallest radius expected after all divisions; sizes the grid cells.
    pub min_radius: f32,
    pub shell_radius: f32,
    pub shell_intensities: Vec<f32>,
    pub collision_intensity: f32,
    pub collision_drag: f32,
    pub overlap_correction: Option<OverlapCorrection>,
    pub oscillator: OscillatorParams,
    pub shrink_from_generation: u32,
    pub division_noise: f32,
    pub overflow_policy: OverflowPolicy,
    pub tissue: TissueConfig,
    pub seed: Option<u64>,
}

impl Default for SphericalEmbryoConfig {
    fn default() -> Self {
        Self {
            dimension: 3,
            max_particles: 1024,
            initial_particles: 1,
            initial_radius: 0.12,
            min_radius: 0.02,
            shell_radius: 0.3,
            shell_intensities: vec![0.0015, 0.003, 0.0045, 0.006, 0.0075],
            collision_intensity: 0.0002,
            collision_drag: 0.9,
            overlap_correction: Some(OverlapCorrection {
                factor: 0.2,
                jitter: 0.0001,
            }),
            oscillator: OscillatorParams {
                rate: 0.005,
                rate_jitter: 0.001,
            },
            shrink_from_generation: 0,
            division_noise: 0.001,
            overflow_policy: OverflowPolicy::Silent,
            tissue: TissueConfig {
                relaxation_alpha: 0.02,
                ..TissueConfig::default()
            },
            seed: None,
        }
    }
}

impl SphericalEmbryoConfig {
    pub fn sanitize(&mut self) {
        self.initial_particles = self.initial_particles.min(self.max_particles);
        self.initial_radius = clamp_finite(self.initial_radius, 0.001, 0.5, 0.12);
        self.min_radius = clamp_finite(self.min_radius, 0.0005, self.initial_radius, 0.02);
        self.shell_radius = clamp_finite(self.shell_radius, self.initial_radius, 0.5, 0.3);
        self.collision_intensity = clamp_finite(self.collision_intensity, 0.0, 1.0, 0.0002);
        self.collision_drag = clamp_finite(self.collision_drag, 0.0, 1.0, 0.9);
        self.division_noise = clamp_finite(self.division_noise, 0.0, 0.1, 0.001);
        for intensity in &mut self.shell_intensities {
            *intensity = clamp_finite(*intensity, 0.0, 1.0, 0.0);
        }
        if let Some(correction) = &mut self.overlap_correction {
            correction.sanitize();
        }
        self.oscillator.sanitize();
        self.tissue.sanitize();
    }
}

pub fn spherical_embryo(mut config: SphericalEmbryoConfig) -> SimResult<TissueDynamics> {
    config.sanitize();
    let d = config.dimension;

    let mut system = ParticleSystem::new(ParticleSystemConfig {
        dimension: d,
        max_particles: config.max_particles,
        sizing: GridSizing::FromRadii {
            min_radius: config.min_radius,
            typical_radius: config.initial_radius,
        },
        default_radius: config.initial_radius,
        overflow_policy: config.overflow_policy,
        seed: config.seed,
    })?;

    let morphogen = system.register_property(MORPHOGEN_PROPERTY);
    let spread = 0.5 * config.initial_radius;
    let mut position = [0.5f32; MAX_DIMENSION];
    for _ in 0..config.initial_particles {
        for p in &mut position[..d] {
            *p = 0.5 + rng::symmetric(system.rng_mut(), spread);
        }
        let phase = rng::symmetric(system.rng_mut(), 0.5) + 0.5;
        if let Some(id) = system.add_particle(&position[..d]) {
            if let Some(values) = system.property_mut(morphogen) {
                // stagger clocks so the first divisions are not simultaneous
                values[id] = phase.min(0.99);
            }
        }
    }

    log::debug!(
        "spherical embryo: d={}, {} initial particles, shell radius {}",
        d,
        system.number_of_particles(),
        config.shell_radius
    );

    let mut tissue = TissueDynamics::new(system, config.tissue);

    let center = [0.5f32; MAX_DIMENSION];
    let axes = [config.shell_radius; MAX_DIMENSION];
    let first = config.shell_intensities.first().copied().unwrap_or(0.0);
    let shell = tissue.add_field(ForceField::external(EllipsoidalForceField::new(
        first,
        &center[..d],
        &axes[..d],
        SurfaceMode::KeepInside,
    )));
    if !config.shell_intensities.is_empty() {
        let schedule = ForceSchedule::new(shell, config.shell_intensities.clone());
        tissue.set_force_schedule(Some(schedule));
    }

    let mut collision = CollisionForceField::new(config.collision_intensity, config.collision_drag);
    collision.overlap_correction = config.overlap_correction;
    tissue.set_collision(Some(collision));

    tissue.set_division_policy(DivisionPolicy::morphogen_driven(
        config.oscillator,
        CloneAndShrink::new(config.shrink_from_generation, config.division_noise),
    ));
    Ok(tissue)
}
