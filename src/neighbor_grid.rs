//! Uniform spatial grid over the unit hypercube `[0, 1]^d`.
//!
//! Each cell holds at most `cell_capacity` particle ids. The grid is rebuilt
//! from scratch every tick; ids are inserted in ascending order so every cell
//! list is sorted, which lets queries union cell lists with [`merge_set`].
//! Insertions into a full cell are dropped and counted, never reported as an
//! error.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::merge_set;

pub const MAX_DIMENSION: usize = 4;
pub const MIN_GRID_SIZE: usize = 4;
/// Width of a grid cell expressed in typical particle radii.
pub const CELL_WIDTH_IN_RADII: f32 = 2.0;
pub const CELL_CAPACITY_SAFETY_MARGIN: usize = 8;
const MAX_SLOTS: usize = 1 << 30;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum GridSizing {
    Explicit {
        grid_size: usize,
        cell_capacity: usize,
    },
    FromRadii {
        min_radius: f32,
        typical_radius: f32,
    },
}

impl GridSizing {
    /// Resolves to `(grid_size, cell_capacity)`.
    pub fn resolve(self, dimension: usize) -> SimResult<(usize, usize)> {
        let (grid_size, cell_capacity) = match self {
            GridSizing::Explicit {
                grid_size,
                cell_capacity,
            } => (grid_size, cell_capacity),
            GridSizing::FromRadii {
                min_radius,
                typical_radius,
            } => {
                for r in [min_radius, typical_radius] {
                    if !r.is_finite() || r <= 0.0 {
                        return Err(SimError::InvalidRadius(r));
                    }
                }
                let grid_size = optimal_grid_size(typical_radius);
                (
                    grid_size,
                    optimal_cell_capacity(dimension, grid_size, min_radius),
                )
            }
        };

        if grid_size == 0 {
            return Err(SimError::InvalidGridSize(grid_size));
        }
        if cell_capacity == 0 {
            return Err(SimError::InvalidCellCapacity(cell_capacity));
        }
        Ok((grid_size, cell_capacity))
    }
}

pub fn optimal_grid_size(typical_radius: f32) -> usize {
    let cells = (1.0 / (CELL_WIDTH_IN_RADII * typical_radius)).floor();
    (cells as usize).max(MIN_GRID_SIZE)
}

pub fn optimal_cell_capacity(dimension: usize, grid_size: usize, min_radius: f32) -> usize {
    let cell_volume = (1.0 / grid_size as f32).powi(dimension as i32);
    let particle_volume = (2.0 * min_radius).powi(dimension as i32);
    let packed = (cell_volume / particle_volume).ceil();
    let packed = if packed.is_finite() { packed as usize } else { 1 };
    packed.max(1) + CELL_CAPACITY_SAFETY_MARGIN
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    #[default]
    Silent,
    Warn,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OccupancyStats {
    pub average_occupancy: f32,
    pub maximal_occupancy: usize,
    pub maximal_effective_count_per_cell: usize,
    pub dropped: usize,
}

#[derive(Clone, Debug)]
pub struct NeighborhoodGrid {
    dimension: usize,
    grid_size: usize,
    cell_capacity: usize,
    volume: usize,
    strides: [usize; MAX_DIMENSION],
    slots: Vec<usize>,
    counts: Vec<usize>,
    requested: Vec<usize>,
    home_coords: Vec<usize>,
    particle_count: usize,
    max_radius: f32,
    dropped_last_update: usize,
    overflow_policy: OverflowPolicy,
}

impl NeighborhoodGrid {
    pub fn new(
        dimension: usize,
        grid_size: usize,
        cell_capacity: usize,
        max_particles: usize,
    ) -> SimResult<Self> {
        if dimension == 0 || dimension > MAX_DIMENSION {
            return Err(SimError::InvalidDimension {
                got: dimension,
                max: MAX_DIMENSION,
            });
        }
        if grid_size == 0 {
            return Err(SimError::InvalidGridSize(grid_size));
        }
        if cell_capacity == 0 {
            return Err(SimError::InvalidCellCapacity(cell_capacity));
        }

        let too_large = SimError::GridTooLarge {
            grid_size,
            dimension,
            cell_capacity,
        };
        let mut strides = [0usize; MAX_DIMENSION];
        let mut volume = 1usize;
        for stride in strides.iter_mut().take(dimension) {
            *stride = volume;
            volume = volume.checked_mul(grid_size).ok_or(too_large.clone())?;
        }
        let slot_count = volume
            .checked_mul(cell_capacity)
            .filter(|&n| n <= MAX_SLOTS)
            .ok_or(too_large)?;

        log::debug!(
            "neighborhood grid: {}^{} cells, {} slots per cell",
            grid_size,
            dimension,
            cell_capacity
        );

        Ok(Self {
            dimension,
            grid_size,
            cell_capacity,
            volume,
            strides,
            slots: vec![merge_set::EMPTY_SLOT; slot_count],
            counts: vec![0; volume],
            requested: vec![0; volume],
            home_coords: vec![0; max_particles * dimension],
            particle_count: 0,
            max_radius: 0.0,
            dropped_last_update: 0,
            overflow_policy: OverflowPolicy::default(),
        })
    }

    pub fn set_overflow_policy(&mut self, policy: OverflowPolicy) {
        self.overflow_policy = policy;
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow_policy
    }

    pub fn get_volume(&self) -> usize {
        self.volume
    }

    pub fn get_grid_size(&self) -> usize {
        self.grid_size
    }

    pub fn get_max_particles_per_grid_cell(&self) -> usize {
        self.cell_capacity
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Largest radius among the particles of the last update.
    pub fn max_radius(&self) -> f32 {
        self.max_radius
    }

    /// Number of particles indexed by the last update.
    pub fn particle_count(&self) -> usize {
        self.particle_count
    }

    pub fn dropped_last_update(&self) -> usize {
        self.dropped_last_update
    }

    pub fn clear(&mut self) {
        self.counts.fill(0);
        self.requested.fill(0);
        self.particle_count = 0;
        self.max_radius = 0.0;
        self.dropped_last_update = 0;
    }

    pub fn update(&mut self, positions: &[f32], radii: &[f32], n: usize) {
        self.clear();
        let d = self.dimension;
        let n = n
            .min(positions.len() / d)
            .min(radii.len())
            .min(self.home_coords.len() / d);

        for id in 0..n {
            let mut cell = 0;
            for axis in 0..d {
                let coord = self.axis_cell(positions[id * d + axis]);
                self.home_coords[id * d + axis] = coord;
                cell += coord * self.strides[axis];
            }

            self.requested[cell] += 1;
            let count = self.counts[cell];
            if count < self.cell_capacity {
                self.slots[cell * self.cell_capacity + count] = id;
                self.counts[cell] = count + 1;
            } else {
                self.dropped_last_update += 1;
            }

            let r = radii[id];
            if r > self.max_radius {
                self.max_radius = r;
            }
        }
        self.particle_count = n;

        if self.dropped_last_update > 0 && self.overflow_policy == OverflowPolicy::Warn {
            log::warn!(
                "grid overflow: dropped {} of {} insertions (cell capacity {}, max demand {})",
                self.dropped_last_update,
                n,
                self.cell_capacity,
                self.maximal_effective_count_per_cell()
            );
        }
    }

    /// Ids stored in one cell, ascending.
    pub fn cell(&self, cell_index: usize) -> &[usize] {
        let start = cell_index * self.cell_capacity;
        &self.slots[start..start + self.counts[cell_index]]
    }

    pub fn cell_index_for_position(&self, position: &[f32]) -> usize {
        position
            .iter()
            .take(self.dimension)
            .enumerate()
            .map(|(axis, &x)| self.axis_cell(x) * self.strides[axis])
            .sum()
    }

    /// Candidate ids for particle `id`: every id stored in a cell within
    /// `ceil(radius * G)` cells of `id`'s home cell, sorted, without
    /// duplicates, including `id` itself. Returns the number written to
    /// `out` (which is cleared first).
    pub fn get_all_neighbors_for_particle(
        &self,
        out: &mut Vec<usize>,
        id: usize,
        radius: f32,
        scratch: &mut Vec<usize>,
    ) -> usize {
        out.clear();
        if id >= self.particle_count {
            return 0;
        }
        let d = self.dimension;
        let mut home = [0usize; MAX_DIMENSION];
        home[..d].copy_from_slice(&self.home_coords[id * d..id * d + d]);
        self.gather(out, &home, radius, scratch)
    }

    /// Same as [`get_all_neighbors_for_particle`](Self::get_all_neighbors_for_particle)
    /// for an arbitrary point.
    pub fn get_all_neighbors_for_position(
        &self,
        out: &mut Vec<usize>,
        position: &[f32],
        radius: f32,
        scratch: &mut Vec<usize>,
    ) -> usize {
        out.clear();
        let mut home = [0usize; MAX_DIMENSION];
        for (axis, &x) in position.iter().take(self.dimension).enumerate() {
            home[axis] = self.axis_cell(x);
        }
        self.gather(out, &home, radius, scratch)
    }

    pub fn occupancy(&self) -> OccupancyStats {
        OccupancyStats {
            average_occupancy: self.average_occupancy(),
            maximal_occupancy: self.maximal_occupancy(),
            maximal_effective_count_per_cell: self.maximal_effective_count_per_cell(),
            dropped: self.dropped_last_update,
        }
    }

    /// Mean number of stored ids per cell, over all cells.
    pub fn average_occupancy(&self) -> f32 {
        let stored: usize = self.counts.iter().sum();
        stored as f32 / self.volume as f32
    }

    pub fn maximal_occupancy(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// Largest number of particles whose home was a single cell, counting
    /// the ones dropped for lack of capacity.
    pub fn maximal_effective_count_per_cell(&self) -> usize {
        self.requested.iter().copied().max().unwrap_or(0)
    }

    fn axis_cell(&self, x: f32) -> usize {
        let scaled = (x * self.grid_size as f32).floor();
        // NaN lands in cell 0 instead of poisoning the index.
        if scaled.is_nan() || scaled < 0.0 {
            0
        } else {
            (scaled as usize).min(self.grid_size - 1)
        }
    }

    fn gather(
        &self,
        out: &mut Vec<usize>,
        home: &[usize; MAX_DIMENSION],
        radius: f32,
        scratch: &mut Vec<usize>,
    ) -> usize {
        let d = self.dimension;
        let reach = (radius.max(0.0) * self.grid_size as f32).ceil();
        let reach = if reach.is_finite() {
            (reach as usize).min(self.grid_size)
        } else {
            self.grid_size
        };

        let mut lo = [0usize; MAX_DIMENSION];
        let mut hi = [0usize; MAX_DIMENSION];
        for axis in 0..d {
            lo[axis] = home[axis].saturating_sub(reach);
            hi[axis] = (home[axis] + reach).min(self.grid_size - 1);
        }

        let mut coord = lo;
        loop {
            let cell: usize = (0..d).map(|axis| coord[axis] * self.strides[axis]).sum();
            let ids = self.cell(cell);
            if !ids.is_empty() {
                scratch.clear();
                merge_set::merge_into(out, ids, scratch);
                std::mem::swap(out, scratch);
            }

            // Odometer step over the cube of cells.
            let mut axis = 0;
            loop {
                if axis == d {
                    return out.len();
                }
                if coord[axis] < hi[axis] {
                    coord[axis] += 1;
                    break;
                }
                coord[axis] = lo[axis];
                axis += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GridSizing, NeighborhoodGrid, OverflowPolicy};
    use crate::error::SimError;
    use crate::math::distance;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn neighbors(grid: &NeighborhoodGrid, id: usize, radius: f32) -> Vec<usize> {
        let mut out = Vec::new();
        let mut scratch = Vec::new();
        grid.get_all_neighbors_for_particle(&mut out, id, radius, &mut scratch);
        out
    }

    #[test]
    fn finds_neighbors_in_known_layout() {
        let positions = [0.10, 0.10, 0.15, 0.12, 0.80, 0.80, 0.27, 0.11];
        let radii = [0.05; 4];
        let mut grid = NeighborhoodGrid::new(2, 10, 4, 4).unwrap();
        grid.update(&positions, &radii, 4);

        assert_eq!(neighbors(&grid, 0, 0.1), vec![0, 1, 3]);
        assert_eq!(neighbors(&grid, 2, 0.1), vec![2]);
    }

    #[test]
    fn queries_arbitrary_points() {
        let positions = [0.10, 0.10, 0.15, 0.12, 0.80, 0.80, 0.27, 0.11];
        let radii = [0.05; 4];
        let mut grid = NeighborhoodGrid::new(2, 10, 4, 4).unwrap();
        grid.update(&positions, &radii, 4);

        let mut out = vec![99];
        let mut scratch = Vec::new();
        let found = grid.get_all_neighbors_for_position(&mut out, &[0.12, 0.11], 0.1, &mut scratch);
        assert_eq!(found, 3);
        assert_eq!(out, vec![0, 1, 3]);

        grid.get_all_neighbors_for_position(&mut out, &[0.55, 0.55], 0.05, &mut scratch);
        assert!(out.is_empty());

        // points outside the unit cube query the nearest border cell
        grid.get_all_neighbors_for_position(&mut out, &[1.4, 1.4], 0.1, &mut scratch);
        assert_eq!(out, vec![2]);
    }

    #[test]
    fn checks_across_cell_boundaries() {
        let positions = [0.199, 0.5, 0.201, 0.5, 0.9, 0.9];
        let radii = [0.01; 3];
        let mut grid = NeighborhoodGrid::new(2, 10, 4, 3).unwrap();
        grid.update(&positions, &radii, 3);

        assert_eq!(neighbors(&grid, 0, 0.01), vec![0, 1]);
        assert_eq!(neighbors(&grid, 1, 0.01), vec![0, 1]);
    }

    #[test]
    fn clamps_positions_outside_unit_cube() {
        let positions = [-0.5, 1.5];
        let radii = [0.1];
        let mut grid = NeighborhoodGrid::new(2, 8, 2, 1).unwrap();
        grid.update(&positions, &radii, 1);
        assert_eq!(grid.cell_index_for_position(&[-0.5, 1.5]), 7 * 8);
        assert_eq!(grid.cell(7 * 8), &[0]);
    }

    #[test]
    fn overflow_drops_and_reports() {
        let positions = [0.5; 10];
        let radii = [0.01; 5];
        let mut grid = NeighborhoodGrid::new(2, 4, 3, 5).unwrap();
        grid.set_overflow_policy(OverflowPolicy::Warn);
        grid.update(&positions, &radii, 5);

        let stats = grid.occupancy();
        assert_eq!(stats.maximal_occupancy, 3);
        assert_eq!(stats.maximal_effective_count_per_cell, 5);
        assert_eq!(stats.dropped, 2);
        assert!((stats.average_occupancy - 3.0 / 16.0).abs() < 1.0e-6);

        grid.clear();
        assert_eq!(grid.maximal_occupancy(), 0);
    }

    #[test]
    fn no_false_negatives_against_brute_force() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for dimension in 1..=3 {
            let n = 150;
            let positions: Vec<f32> =
                (0..n * dimension).map(|_| rng.gen_range(0.0..1.0)).collect();
            let radii: Vec<f32> = (0..n).map(|_| rng.gen_range(0.005..0.06)).collect();
            let mut grid = NeighborhoodGrid::new(dimension, 12, 256, n).unwrap();
            grid.update(&positions, &radii, n);
            let max_radius = grid.max_radius();

            for i in 0..n {
                let found = neighbors(&grid, i, radii[i] + max_radius);
                let pi = &positions[i * dimension..(i + 1) * dimension];
                for j in 0..n {
                    let pj = &positions[j * dimension..(j + 1) * dimension];
                    if distance(pi, pj) < radii[i] + radii[j] {
                        assert!(found.binary_search(&j).is_ok(), "missing {j} for {i}");
                    }
                }
            }
        }
    }

    #[test]
    fn sizing_heuristics() {
        let (g, c) = GridSizing::FromRadii {
            min_radius: 0.01,
            typical_radius: 0.02,
        }
        .resolve(2)
        .unwrap();
        assert_eq!(g, 25);
        // cell width 0.04, particle diameter 0.02: 4 packed + margin
        assert_eq!(c, 4 + super::CELL_CAPACITY_SAFETY_MARGIN);

        let (g, _) = GridSizing::FromRadii {
            min_radius: 0.2,
            typical_radius: 0.4,
        }
        .resolve(3)
        .unwrap();
        assert_eq!(g, super::MIN_GRID_SIZE);
    }

    #[test]
    fn rejects_invalid_construction() {
        assert!(matches!(
            GridSizing::Explicit {
                grid_size: 0,
                cell_capacity: 4
            }
            .resolve(2),
            Err(SimError::InvalidGridSize(0))
        ));
        assert!(matches!(
            NeighborhoodGrid::new(5, 4, 4, 1),
            Err(SimError::InvalidDimension { got: 5, .. })
        ));
        assert!(matches!(
            NeighborhoodGrid::new(4, 1 << 12, 64, 1),
            Err(SimError::GridTooLarge { .. })
        ));
    }
}
