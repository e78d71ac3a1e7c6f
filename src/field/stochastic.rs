use std::ops::Range;

use rand::Rng;

use super::{FieldEffect, FieldState, InteractionForceField};
use crate::math::{clamp_finite, inverse_sqrt, norm_sq, MathMode, EPSILON};
use crate::neighbor_grid::{NeighborhoodGrid, MAX_DIMENSION};

/// Repulsion between each particle and a fixed number of partners drawn
/// uniformly from the whole population, instead of grid neighbors. The
/// per-pair impulse matches [`CollisionForceField`](super::CollisionForceField).
#[derive(Clone, Debug)]
pub struct StochasticRepulsionForceField {
    pub intensity: f32,
    pub drag: f32,
    pub samples_per_particle: usize,
    pub math_mode: MathMode,
    contacts: usize,
}

impl StochasticRepulsionForceField {
    pub fn new(intensity: f32, drag: f32, samples_per_particle: usize) -> Self {
        Self {
            intensity: clamp_finite(intensity, 0.0, f32::MAX, 0.0),
            drag: clamp_finite(drag, 0.0, 1.0, 1.0),
            samples_per_particle,
            math_mode: MathMode::Accurate,
            contacts: 0,
        }
    }

    pub fn contacts(&self) -> usize {
        self.contacts
    }
}

impl InteractionForceField for StochasticRepulsionForceField {
    fn apply(
        &mut self,
        range: Range<usize>,
        _grid: &NeighborhoodGrid,
        state: &mut FieldState<'_>,
    ) -> FieldEffect {
        let d = state.dimension;
        let n = state.count;
        self.contacts = 0;
        state.velocities.scale_copy(self.drag, n * d);
        if n < 2 {
            return FieldEffect::VelocitiesOnly;
        }

        let radii = state.radii;
        let positions = state.positions.read();
        let velocities = state.velocities.write_mut();
        let mut delta = [0.0f32; MAX_DIMENSION];

        for u in range {
            for _ in 0..self.samples_per_particle {
                // draw from the other n - 1 particles
                let mut v = state.rng.gen_range(0..n - 1);
                if v >= u {
                    v += 1;
                }

                for axis in 0..d {
                    delta[axis] = positions[u * d + axis] - positions[v * d + axis];
                }
                let dist_sq = norm_sq(&delta[..d]);
                if dist_sq <= EPSILON * EPSILON {
                    continue;
                }
                let inv_dist = inverse_sqrt(self.math_mode, dist_sq);
                if dist_sq * inv_dist >= radii[u] + radii[v] {
                    continue;
                }
                self.contacts += 1;

                let scale = self.intensity * inv_dist * inv_dist;
                for axis in 0..d {
                    velocities[u * d + axis] += scale * delta[axis];
                    velocities[v * d + axis] -= scale * delta[axis];
                }
            }
        }
        FieldEffect::VelocitiesOnly
    }

    fn intensity(&self) -> f32 {
        self.intensity
    }

    fn set_intensity(&mut self, intensity: f32) {
        self.intensity = clamp_finite(intensity, 0.0, f32::MAX, self.intensity);
    }
}

#[cfg(test)]
mod tests {
    use super::StochasticRepulsionForceField;
    use crate::field::ForceField;
    use crate::particles::{ParticleSystem, ParticleSystemConfig};

    fn system(points: &[[f32; 2]]) -> ParticleSystem {
        let config = ParticleSystemConfig::explicit(2, 8, 8, 8).with_seed(21);
        let mut ps = ParticleSystem::new(config).unwrap();
        for p in points {
            ps.add_particle_with_radius(p, 0.05);
        }
        ps
    }

    #[test]
    fn sampled_partner_pushes_apart() {
        let mut ps = system(&[[0.40, 0.5], [0.44, 0.5]]);
        let mut field = ForceField::interaction(StochasticRepulsionForceField::new(0.001, 1.0, 3));
        ps.apply_force_field(&mut field);

        let v = ps.velocities();
        assert!(v[0] < 0.0);
        assert!(v[2] > 0.0);
        assert!((v[0] + v[2]).abs() < 1.0e-6);
    }

    #[test]
    fn lone_and_coincident_particles_are_safe() {
        let mut ps = system(&[[0.5, 0.5]]);
        let mut field = ForceField::interaction(StochasticRepulsionForceField::new(0.01, 1.0, 4));
        ps.apply_force_field(&mut field);
        assert_eq!(ps.velocities(), &[0.0, 0.0]);

        ps.add_particle_with_radius(&[0.5, 0.5], 0.05);
        ps.apply_force_field(&mut field);
        assert!(ps.velocities().iter().all(|v| *v == 0.0));
    }
}
