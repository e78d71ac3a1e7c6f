use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::{FieldEffect, FieldState, InteractionForceField};
use crate::math::{clamp_finite, inverse_sqrt, norm_sq, MathMode, EPSILON};
use crate::neighbor_grid::{NeighborhoodGrid, MAX_DIMENSION};
use crate::rng;

/// Position-space push applied to overlapping pairs on top of the velocity
/// impulse. Each particle moves `0.5 * penetration * factor` away from the
/// other, plus uniform jitter in `[-jitter, jitter]` per axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlapCorrection {
    pub factor: f32,
    pub jitter: f32,
}

impl OverlapCorrection {
    pub fn sanitize(&mut self) {
        self.factor = clamp_finite(self.factor, 0.0, 0.99, 0.5);
        self.jitter = clamp_finite(self.jitter, 0.0, 0.01, 0.0);
    }
}

/// Elastic sphere-sphere repulsion, broad-phased through the grid.
///
/// Every call first scales all velocities by `drag`, regardless of the
/// range, then visits each overlapping pair `(u, v)` with `u` in the range
/// and `v > u` once. The impulse on `u` is `intensity * (pu - pv) / |pu - pv|^2`
/// and `v` receives the opposite. Coincident pairs get no impulse.
#[derive(Clone, Debug)]
pub struct CollisionForceField {
    pub intensity: f32,
    pub drag: f32,
    pub overlap_correction: Option<OverlapCorrection>,
    pub math_mode: MathMode,
    pairs_examined: usize,
    contacts: usize,
    candidates: Vec<usize>,
    scratch: Vec<usize>,
}

impl CollisionForceField {
    pub fn new(intensity: f32, drag: f32) -> Self {
        Self {
            intensity: clamp_finite(intensity, 0.0, f32::MAX, 0.0),
            drag: clamp_finite(drag, 0.0, 1.0, 1.0),
            overlap_correction: None,
            math_mode: MathMode::Accurate,
            pairs_examined: 0,
            contacts: 0,
            candidates: Vec::new(),
            scratch: Vec::new(),
        }
    }

    pub fn with_overlap_correction(mut self, factor: f32, jitter: f32) -> Self {
        let mut correction = OverlapCorrection { factor, jitter };
        correction.sanitize();
        self.overlap_correction = Some(correction);
        self
    }

    pub fn with_math_mode(mut self, mode: MathMode) -> Self {
        self.math_mode = mode;
        self
    }

    /// Candidate pairs that reached the bounding-box test in the last pass.
    pub fn pairs_examined(&self) -> usize {
        self.pairs_examined
    }

    /// Overlapping pairs that received an impulse in the last pass.
    pub fn contacts(&self) -> usize {
        self.contacts
    }
}

impl InteractionForceField for CollisionForceField {
    fn apply(
        &mut self,
        range: Range<usize>,
        grid: &NeighborhoodGrid,
        state: &mut FieldState<'_>,
    ) -> FieldEffect {
        let d = state.dimension;
        let n = state.count;
        self.pairs_examined = 0;
        self.contacts = 0;

        state.velocities.scale_copy(self.drag, n * d);
        if self.overlap_correction.is_some() {
            state.stage_positions();
        }

        let radii = state.radii;
        let (positions, staged) = state.positions.split();
        let velocities = state.velocities.write_mut();
        let random = &mut *state.rng;
        let reach = grid.max_radius();
        let mut delta = [0.0f32; MAX_DIMENSION];

        for u in range {
            let ru = radii[u];
            grid.get_all_neighbors_for_particle(
                &mut self.candidates,
                u,
                ru + reach,
                &mut self.scratch,
            );

            for &v in &self.candidates {
                if v <= u || v >= n {
                    continue;
                }
                self.pairs_examined += 1;
                let contact = ru + radii[v];

                let mut separated = false;
                for axis in 0..d {
                    delta[axis] = positions[u * d + axis] - positions[v * d + axis];
                    if delta[axis].abs() - contact > 0.0 {
                        separated = true;
                        break;
                    }
                }
                if separated {
                    continue;
                }

                let dist_sq = norm_sq(&delta[..d]);
                if dist_sq <= EPSILON * EPSILON {
                    if let Some(correction) = self.overlap_correction {
                        for axis in 0..d {
                            staged[u * d + axis] += rng::symmetric(random, correction.jitter);
                            staged[v * d + axis] += rng::symmetric(random, correction.jitter);
                        }
                    }
                    continue;
                }

                let inv_dist = inverse_sqrt(self.math_mode, dist_sq);
                let gap = dist_sq * inv_dist - contact;
                if gap >= 0.0 {
                    continue;
                }
                self.contacts += 1;

                let scale = self.intensity * inv_dist * inv_dist;
                for axis in 0..d {
                    let impulse = scale * delta[axis];
                    velocities[u * d + axis] += impulse;
                    velocities[v * d + axis] -= impulse;
                }

                if let Some(correction) = self.overlap_correction {
                    let shift = -0.5 * gap * correction.factor * inv_dist;
                    for axis in 0..d {
                        let push = shift * delta[axis];
                        staged[u * d + axis] += push + rng::symmetric(random, correction.jitter);
                        staged[v * d + axis] -= push + rng::symmetric(random, correction.jitter);
                    }
                }
            }
        }

        log::trace!(
            "collision: {} pairs examined, {} contacts",
            self.pairs_examined,
            self.contacts
        );

        if self.overlap_correction.is_some() {
            FieldEffect::VelocitiesAndPositions
        } else {
            FieldEffect::VelocitiesOnly
        }
    }

    fn intensity(&self) -> f32 {
        self.intensity
    }

    fn set_intensity(&mut self, intensity: f32) {
        self.intensity = clamp_finite(intensity, 0.0, f32::MAX, self.intensity);
    }
}
