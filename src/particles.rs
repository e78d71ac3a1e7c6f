use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::double_buffer::DoubleBuffer;
use crate::error::{SimError, SimResult};
use crate::field::{ExternalForceField, FieldEffect, FieldState, ForceField, InteractionForceField};
use crate::math::clamp_finite;
use crate::neighbor_grid::{
    GridSizing, NeighborhoodGrid, OccupancyStats, OverflowPolicy, MAX_DIMENSION,
};
use crate::rng::{self, SimRng};

const DEFAULT_RADIUS: f32 = 0.01;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleSystemConfig {
    pub dimension: usize,
    pub max_particles: usize,
    pub sizing: GridSizing,
    pub default_radius: f32,
    pub overflow_policy: OverflowPolicy,
    pub seed: Option<u64>,
}

impl ParticleSystemConfig {
    pub fn explicit(
        dimension: usize,
        max_particles: usize,
        grid_size: usize,
        cell_capacity: usize,
    ) -> Self {
        Self {
            dimension,
            max_particles,
            sizing: GridSizing::Explicit {
                grid_size,
                cell_capacity,
            },
            default_radius: DEFAULT_RADIUS,
            overflow_policy: OverflowPolicy::default(),
            seed: None,
        }
    }

    pub fn from_radii(
        dimension: usize,
        max_particles: usize,
        min_radius: f32,
        typical_radius: f32,
    ) -> Self {
        Self {
            dimension,
            max_particles,
            sizing: GridSizing::FromRadii {
                min_radius,
                typical_radius,
            },
            default_radius: typical_radius,
            overflow_policy: OverflowPolicy::default(),
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn sanitize(&mut self) {
        self.default_radius = clamp_finite(self.default_radius, 0.0, 0.5, DEFAULT_RADIUS);
    }
}

/// Auxiliary per-particle scalar, e.g. a morphogen concentration.
#[derive(Clone, Debug)]
pub struct ParticleProperty {
    name: String,
    values: DoubleBuffer,
}

impl ParticleProperty {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buffer(&self) -> &DoubleBuffer {
        &self.values
    }

    pub fn buffer_mut(&mut self) -> &mut DoubleBuffer {
        &mut self.values
    }
}

/// Index-addressed particle store: positions and velocities are flat
/// `max_particles * dimension` arrays, radii are `max_particles` long.
/// Only the first [`number_of_particles`](Self::number_of_particles) entries
/// are live. Removing a particle moves the last one into its slot.
pub struct ParticleSystem {
    dimension: usize,
    max_particles: usize,
    count: usize,
    default_radius: f32,
    positions: DoubleBuffer,
    velocities: DoubleBuffer,
    radii: DoubleBuffer,
    target_radii: Vec<f32>,
    previous_velocities: Vec<f32>,
    properties: Vec<ParticleProperty>,
    grid: NeighborhoodGrid,
    rng: SimRng,
}

impl ParticleSystem {
    pub fn new(mut config: ParticleSystemConfig) -> SimResult<Self> {
        config.sanitize();
        let d = config.dimension;
        if d == 0 || d > MAX_DIMENSION {
            return Err(SimError::InvalidDimension {
                got: d,
                max: MAX_DIMENSION,
            });
        }
        if config.max_particles == 0 {
            return Err(SimError::InvalidCapacity);
        }

        let (grid_size, cell_capacity) = config.sizing.resolve(d)?;
        let mut grid = NeighborhoodGrid::new(d, grid_size, cell_capacity, config.max_particles)?;
        grid.set_overflow_policy(config.overflow_policy);

        log::debug!(
            "particle system: d={}, capacity={}, grid={}^{} x {}",
            d,
            config.max_particles,
            grid_size,
            d,
            cell_capacity
        );

        Ok(Self {
            dimension: d,
            max_particles: config.max_particles,
            count: 0,
            default_radius: config.default_radius,
            positions: DoubleBuffer::allocate(config.max_particles * d),
            velocities: DoubleBuffer::allocate(config.max_particles * d),
            radii: DoubleBuffer::allocate(config.max_particles),
            target_radii: vec![0.0; config.max_particles],
            previous_velocities: vec![0.0; config.max_particles * d],
            properties: Vec::new(),
            grid,
            rng: rng::from_seed_or_entropy(config.seed),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn max_particles(&self) -> usize {
        self.max_particles
    }

    pub fn number_of_particles(&self) -> usize {
        self.count
    }

    pub fn grid(&self) -> &NeighborhoodGrid {
        &self.grid
    }

    pub fn grid_size(&self) -> usize {
        self.grid.get_grid_size()
    }

    pub fn rng_mut(&mut self) -> &mut SimRng {
        &mut self.rng
    }

    pub fn add_particle(&mut self, position: &[f32]) -> Option<usize> {
        self.add_particle_with_radius(position, self.default_radius)
    }

    /// Appends a particle at rest. Returns `None` without touching anything
    /// when the system is full.
    pub fn add_particle_with_radius(&mut self, position: &[f32], radius: f32) -> Option<usize> {
        if self.count >= self.max_particles {
            return None;
        }
        let id = self.count;
        let d = self.dimension;
        let radius = clamp_finite(radius, 0.0, f32::MAX, 0.0);

        let pos = &mut self.positions.read_mut()[id * d..id * d + d];
        pos.fill(0.0);
        for (dst, &src) in pos.iter_mut().zip(position) {
            *dst = src;
        }
        self.velocities.read_mut()[id * d..id * d + d].fill(0.0);
        self.previous_velocities[id * d..id * d + d].fill(0.0);
        self.radii.read_mut()[id] = radius;
        self.target_radii[id] = radius;
        for property in &mut self.properties {
            property.values.read_mut()[id] = 0.0;
        }

        self.count += 1;
        Some(id)
    }

    /// Moves the last particle into `id`'s slot. The moved particle changes
    /// id; callers holding ids across this call must account for that.
    pub fn remove_particle(&mut self, id: usize) {
        if id >= self.count {
            return;
        }
        let last = self.count - 1;
        if id != last {
            self.copy_particle(last, id);
        }
        self.count -= 1;
    }

    pub fn clone_particle(&mut self, source: usize, position_noise: f32) -> Option<usize> {
        self.clone_particle_with_velocity_noise(source, position_noise, 0.0)
    }

    /// Appends a copy of `source` whose position (and velocity) is perturbed
    /// by independent uniform noise per axis. Returns `None` at capacity or
    /// for a dead source.
    pub fn clone_particle_with_velocity_noise(
        &mut self,
        source: usize,
        position_noise: f32,
        velocity_noise: f32,
    ) -> Option<usize> {
        if source >= self.count || self.count >= self.max_particles {
            return None;
        }
        let id = self.count;
        self.count += 1;
        self.copy_particle(source, id);

        let d = self.dimension;
        for axis in 0..d {
            let dp = rng::symmetric(&mut self.rng, position_noise);
            let dv = rng::symmetric(&mut self.rng, velocity_noise);
            self.positions.read_mut()[id * d + axis] += dp;
            self.velocities.read_mut()[id * d + axis] += dv;
        }
        Some(id)
    }

    fn copy_particle(&mut self, from: usize, to: usize) {
        let d = self.dimension;
        let span = from * d..from * d + d;
        for buffer in [&mut self.positions, &mut self.velocities] {
            buffer.read_mut().copy_within(span.clone(), to * d);
        }
        self.previous_velocities.copy_within(span, to * d);
        let radii = self.radii.read_mut();
        radii[to] = radii[from];
        self.target_radii[to] = self.target_radii[from];
        for property in &mut self.properties {
            let values = property.values.read_mut();
            values[to] = values[from];
        }
    }

    pub fn positions(&self) -> &[f32] {
        &self.positions.read()[..self.count * self.dimension]
    }

    pub fn velocities(&self) -> &[f32] {
        &self.velocities.read()[..self.count * self.dimension]
    }

    pub fn radii(&self) -> &[f32] {
        &self.radii.read()[..self.count]
    }

    pub fn target_radii(&self) -> &[f32] {
        &self.target_radii[..self.count]
    }

    pub fn position(&self, id: usize) -> Option<&[f32]> {
        let d = self.dimension;
        let live = &self.positions.read()[..self.count * d];
        live.get(id * d..id * d + d)
    }

    pub fn velocity(&self, id: usize) -> Option<&[f32]> {
        let d = self.dimension;
        let live = &self.velocities.read()[..self.count * d];
        live.get(id * d..id * d + d)
    }

    pub fn radius(&self, id: usize) -> Option<f32> {
        (id < self.count).then(|| self.radii.read()[id])
    }

    pub fn target_radius(&self, id: usize) -> Option<f32> {
        (id < self.count).then(|| self.target_radii[id])
    }

    pub fn set_position(&mut self, id: usize, position: &[f32]) {
        if id < self.count {
            let d = self.dimension;
            let slots = &mut self.positions.read_mut()[id * d..id * d + d];
            for (dst, &src) in slots.iter_mut().zip(position) {
                *dst = src;
            }
        }
    }

    pub fn set_velocity(&mut self, id: usize, velocity: &[f32]) {
        if id < self.count {
            let d = self.dimension;
            let slots = &mut self.velocities.read_mut()[id * d..id * d + d];
            for (dst, &src) in slots.iter_mut().zip(velocity) {
                *dst = src;
            }
        }
    }

    /// Sets the current radius only; the target radius is left alone.
    pub fn set_radius(&mut self, id: usize, radius: f32) {
        if id < self.count && radius.is_finite() && radius >= 0.0 {
            self.radii.read_mut()[id] = radius;
        }
    }

    pub fn set_target_radius(&mut self, id: usize, radius: f32) {
        if id < self.count && radius.is_finite() && radius >= 0.0 {
            self.target_radii[id] = radius;
        }
    }

    /// `radius := (1 - alpha) * radius + alpha * target` for every particle.
    pub fn smooth_to_target_radius(&mut self, alpha: f32) {
        let alpha = clamp_finite(alpha, 0.0, 1.0, 0.0);
        let radii = self.radii.read_mut();
        for (r, &target) in radii[..self.count].iter_mut().zip(&self.target_radii) {
            *r = (1.0 - alpha) * *r + alpha * target;
        }
    }

    /// Registers a named per-particle scalar (zero for every particle) and
    /// returns its index. Registering an existing name returns the existing
    /// index.
    pub fn register_property(&mut self, name: &str) -> usize {
        if let Some(index) = self.property_index(name) {
            return index;
        }
        self.properties.push(ParticleProperty {
            name: name.to_owned(),
            values: DoubleBuffer::allocate(self.max_particles),
        });
        self.properties.len() - 1
    }

    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    pub fn property(&self, index: usize) -> Option<&[f32]> {
        self.properties
            .get(index)
            .map(|p| &p.values.read()[..self.count])
    }

    pub fn property_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        let count = self.count;
        self.properties
            .get_mut(index)
            .map(|p| &mut p.values.read_mut()[..count])
    }

    pub fn property_buffer_mut(&mut self, index: usize) -> Option<&mut ParticleProperty> {
        self.properties.get_mut(index)
    }

    /// Rebuilds the grid from current positions. Must run after motion and
    /// before any neighbor-dependent pass.
    pub fn update_neighborhood_cells(&mut self) {
        self.grid
            .update(self.positions.read(), self.radii.read(), self.count);
    }

    /// Broad-phase candidates for `id` within `radius`, written into `out`.
    pub fn get_neighbors(&self, id: usize, radius: f32, out: &mut Vec<usize>) -> usize {
        let mut scratch = Vec::new();
        self.grid
            .get_all_neighbors_for_particle(out, id, radius, &mut scratch)
    }

    pub fn occupancy(&self) -> OccupancyStats {
        self.grid.occupancy()
    }

    pub fn average_occupancy(&self) -> f32 {
        self.grid.average_occupancy()
    }

    pub fn maximal_occupancy(&self) -> usize {
        self.grid.maximal_occupancy()
    }

    pub fn maximal_effective_count_per_cell(&self) -> usize {
        self.grid.maximal_effective_count_per_cell()
    }

    fn clamp_range(&self, range: Range<usize>) -> Range<usize> {
        let end = range.end.min(self.count);
        range.start.min(end)..end
    }

    pub fn apply_force(&mut self, vector: &[f32]) {
        self.apply_force_in(vector, 0..self.count);
    }

    /// `velocity += vector` for particles in `range`, as a double-buffered pass.
    pub fn apply_force_in(&mut self, vector: &[f32], range: Range<usize>) {
        let range = self.clamp_range(range);
        let d = self.dimension;
        self.velocities.copy_read_to_write(self.count * d);
        let (read, write) = self.velocities.split();
        for i in range {
            for (axis, &f) in vector.iter().take(d).enumerate() {
                write[i * d + axis] = read[i * d + axis] + f;
            }
        }
        self.velocities.swap();
    }

    pub fn apply_force_field(&mut self, field: &mut ForceField) {
        self.apply_force_field_in(field, 0..self.count);
    }

    pub fn apply_force_field_in(&mut self, field: &mut ForceField, range: Range<usize>) {
        match field {
            ForceField::External(field) => self.apply_external_field_in(field.as_mut(), range),
            ForceField::Interaction(field) => {
                self.apply_interaction_field_in(field.as_mut(), range)
            }
        }
    }

    pub fn apply_external_field_in(
        &mut self,
        field: &mut dyn ExternalForceField,
        range: Range<usize>,
    ) {
        let range = self.clamp_range(range);
        let n = self.count;
        self.velocities.copy_read_to_write(n * self.dimension);
        let mut state = FieldState {
            dimension: self.dimension,
            count: n,
            positions: &mut self.positions,
            velocities: &mut self.velocities,
            radii: &self.radii.read()[..n],
            rng: &mut self.rng,
        };
        let effect = field.apply(range, &mut state);
        self.publish(effect);
    }

    pub fn apply_interaction_field_in(
        &mut self,
        field: &mut dyn InteractionForceField,
        range: Range<usize>,
    ) {
        let range = self.clamp_range(range);
        let n = self.count;
        self.velocities.copy_read_to_write(n * self.dimension);
        let mut state = FieldState {
            dimension: self.dimension,
            count: n,
            positions: &mut self.positions,
            velocities: &mut self.velocities,
            radii: &self.radii.read()[..n],
            rng: &mut self.rng,
        };
        let effect = field.apply(range, &self.grid, &mut state);
        self.publish(effect);
    }

    fn publish(&mut self, effect: FieldEffect) {
        self.velocities.swap();
        if effect == FieldEffect::VelocitiesAndPositions {
            self.positions.swap();
        }
    }

    /// Adds uniform noise in `[-amount, amount]` to every velocity component.
    pub fn add_brownian_motion(&mut self, amount: f32) {
        let len = self.count * self.dimension;
        let velocities = self.velocities.read_mut();
        for v in &mut velocities[..len] {
            *v += rng::symmetric(&mut self.rng, amount);
        }
    }

    /// `position += velocity` (one tick).
    pub fn integrate_euler(&mut self) {
        let len = self.count * self.dimension;
        let velocities = self.velocities.read();
        let (read, write) = self.positions.split();
        for k in 0..len {
            write[k] = read[k] + velocities[k];
        }
        self.positions.swap();
        self.previous_velocities[..len].copy_from_slice(&velocities[..len]);
    }

    /// `position += (velocity + previous velocity) / 2`, where the previous
    /// velocity is the one used by the last integration step.
    pub fn integrate_trapezoidal(&mut self) {
        let len = self.count * self.dimension;
        let velocities = self.velocities.read();
        let (read, write) = self.positions.split();
        for k in 0..len {
            write[k] = read[k] + 0.5 * (velocities[k] + self.previous_velocities[k]);
        }
        self.positions.swap();
        self.previous_velocities[..len].copy_from_slice(&velocities[..len]);
    }

    /// Reflects particles off the radius-aware walls of the unit cube.
    /// A particle past a wall is put back inside by up to `noise` and its
    /// velocity along that axis becomes `-dampening * velocity`.
    pub fn enforce_bounds(&mut self, dampening: f32, noise: f32) {
        let d = self.dimension;
        let noise = noise.max(0.0);
        for i in 0..self.count {
            let r = self.radii.read()[i];
            let (lo, hi) = if r < 0.5 { (r, 1.0 - r) } else { (0.5, 0.5) };
            for axis in 0..d {
                let k = i * d + axis;
                let p = self.positions.read()[k];
                let placed = if p < lo || p.is_nan() {
                    (lo + rng::symmetric(&mut self.rng, noise).abs()).min(hi)
                } else if p > hi {
                    (hi - rng::symmetric(&mut self.rng, noise).abs()).max(lo)
                } else {
                    continue;
                };
                self.positions.read_mut()[k] = placed;
                let v = &mut self.velocities.read_mut()[k];
                *v = if v.is_finite() { -dampening * *v } else { 0.0 };
            }
        }
    }

    pub fn copy_positions(&self, dst: &mut [f32]) -> usize {
        self.positions.copy_into(dst, self.count * self.dimension)
    }

    pub fn copy_velocities(&self, dst: &mut [f32]) -> usize {
        self.velocities.copy_into(dst, self.count * self.dimension)
    }

    pub fn copy_radii(&self, dst: &mut [f32]) -> usize {
        self.radii.copy_into(dst, self.count)
    }
}
