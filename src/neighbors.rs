//! Spatial index over reciprocal-space points for k-nearest-neighbour queries.
//!
//! `NeighborIndex` bins points into a uniform 3D grid of cubic cells sized so
//! that each cell holds a handful of points on average. Each cell maps to a
//! compact slice of point indices (offsets + flat index array), so the index
//! is two allocations regardless of the number of cells.
//!
//! Query flow:
//! 1. Locate the cell containing the query point (clamped to the grid).
//! 2. Visit cells in shells of increasing Chebyshev distance from it.
//! 3. Stop once `k` points are held and no unvisited shell can be closer
//!    than the current k-th distance.
//!
//! Query time scales with local point density instead of dataset size.
//! The index is immutable after [`NeighborIndex::build`] and can be shared
//! across threads.

use crate::Vector3;

/// Target mean occupancy of a grid cell.
const TARGET_POINTS_PER_CELL: f64 = 4.0;

#[derive(Debug, Clone)]
pub struct NeighborIndex {
    points: Vec<Vector3>,
    origin: Vector3,
    cell_size: f64,
    dims: [usize; 3],
    cell_offsets: Vec<u32>,
    point_indices: Vec<u32>,
}

impl NeighborIndex {
    /// Build the index over `points`. Point ids are positions in this slice.
    pub fn build(points: &[Vector3]) -> Self {
        let points: Vec<Vector3> = points.to_vec();
        let finite = points.iter().filter(|p| p.iter().all(|v| v.is_finite()));

        let mut lo = Vector3::repeat(f64::INFINITY);
        let mut hi = Vector3::repeat(f64::NEG_INFINITY);
        let mut n_finite = 0usize;
        for p in finite {
            lo = lo.inf(p);
            hi = hi.sup(p);
            n_finite += 1;
        }
        if n_finite == 0 {
            lo = Vector3::zeros();
            hi = Vector3::zeros();
        }

        let (cell_size, dims) = Self::choose_grid(&(hi - lo), n_finite);
        let n_cells = dims[0] * dims[1] * dims[2];

        let mut bins: Vec<Vec<u32>> = vec![Vec::new(); n_cells];
        for (idx, p) in points.iter().enumerate() {
            if !p.iter().all(|v| v.is_finite()) {
                continue;
            }
            let cell = Self::cell_coords(&lo, cell_size, &dims, p);
            bins[Self::flat(&dims, cell)].push(idx as u32);
        }

        let mut cell_offsets = Vec::with_capacity(n_cells + 1);
        let mut point_indices = Vec::with_capacity(points.len());
        cell_offsets.push(0);
        for bin in bins {
            point_indices.extend(bin);
            cell_offsets.push(point_indices.len() as u32);
        }

        Self {
            points,
            origin: lo,
            cell_size,
            dims,
            cell_offsets,
            point_indices,
        }
    }

    /// Return the total number of points in the index.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Return `true` when the index holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Return all indexed points as an immutable slice.
    pub fn points(&self) -> &[Vector3] {
        &self.points
    }

    /// Edge length of a grid cell.
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Ids of the `k` points nearest to `point`, by ascending Euclidean
    /// distance. Equidistant points are ordered by id.
    pub fn query_k_nearest(&self, point: &Vector3, k: usize) -> Vec<usize> {
        self.query_k_nearest_where(point, k, |_| true)
            .into_iter()
            .map(|(idx, _)| idx)
            .collect()
    }

    /// The `k` nearest points accepted by `filter`, as `(id, distance)` pairs
    /// by ascending distance.
    ///
    /// Fewer than `k` pairs are returned only when fewer than `k` points pass
    /// the filter.
    pub fn query_k_nearest_where<F>(&self, point: &Vector3, k: usize, filter: F) -> Vec<(usize, f64)>
    where
        F: Fn(usize) -> bool,
    {
        if k == 0 || self.is_empty() || !point.iter().all(|v| v.is_finite()) {
            return Vec::new();
        }

        let center = Self::cell_coords(&self.origin, self.cell_size, &self.dims, point);
        let max_shell = (0..3)
            .map(|axis| center[axis].max(self.dims[axis] - 1 - center[axis]))
            .max()
            .unwrap_or(0);

        // (distance², id), kept sorted, at most k long
        let mut best: Vec<(f64, usize)> = Vec::with_capacity(k + 1);

        for shell in 0..=max_shell {
            if best.len() == k {
                let bound = self.shell_lower_bound(point, center, shell);
                if bound * bound > best[k - 1].0 {
                    break;
                }
            }
            self.for_each_shell_cell(center, shell, |cell| {
                if best.len() == k && self.cell_distance_sq(point, cell) > best[k - 1].0 {
                    return;
                }
                let flat = Self::flat(&self.dims, cell);
                let start = self.cell_offsets[flat] as usize;
                let end = self.cell_offsets[flat + 1] as usize;
                for &idx in &self.point_indices[start..end] {
                    let idx = idx as usize;
                    if !filter(idx) {
                        continue;
                    }
                    let d2 = (self.points[idx] - point).norm_squared();
                    insert_bounded(&mut best, (d2, idx), k);
                }
            });
        }

        best.into_iter().map(|(d2, idx)| (idx, d2.sqrt())).collect()
    }

    /// Ids of all points within `radius` of `point`, sorted by id.
    pub fn query_radius(&self, point: &Vector3, radius: f64) -> Vec<usize> {
        if self.is_empty() || !(radius >= 0.0) || !point.iter().all(|v| v.is_finite()) {
            return Vec::new();
        }
        let radius_sq = radius * radius;
        let lo = Self::cell_coords(
            &self.origin,
            self.cell_size,
            &self.dims,
            &(point - Vector3::repeat(radius)),
        );
        let hi = Self::cell_coords(
            &self.origin,
            self.cell_size,
            &self.dims,
            &(point + Vector3::repeat(radius)),
        );

        let mut out = Vec::new();
        for z in lo[2]..=hi[2] {
            for y in lo[1]..=hi[1] {
                for x in lo[0]..=hi[0] {
                    let flat = Self::flat(&self.dims, [x, y, z]);
                    let start = self.cell_offsets[flat] as usize;
                    let end = self.cell_offsets[flat + 1] as usize;
                    for &idx in &self.point_indices[start..end] {
                        let idx = idx as usize;
                        if (self.points[idx] - point).norm_squared() <= radius_sq {
                            out.push(idx);
                        }
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }

    // ── Grid geometry ───────────────────────────────────────────────────────

    fn choose_grid(extent: &Vector3, n_points: usize) -> (f64, [usize; 3]) {
        let max_extent = extent.max();
        if n_points <= 1 || !(max_extent > 0.0) {
            return (1.0, [1, 1, 1]);
        }
        // Flat or linear point sets still get a usable volume estimate.
        let floor = max_extent * 1e-3;
        let padded = extent.map(|e| e.max(floor));
        let n_cells = (n_points as f64 / TARGET_POINTS_PER_CELL).ceil().max(1.0);
        let mut cell_size = (padded.x * padded.y * padded.z / n_cells).cbrt();

        let max_cells = 8 * n_points + 8;
        loop {
            let dims = [
                ((extent.x / cell_size).floor() as usize + 1).max(1),
                ((extent.y / cell_size).floor() as usize + 1).max(1),
                ((extent.z / cell_size).floor() as usize + 1).max(1),
            ];
            if dims[0] * dims[1] * dims[2] <= max_cells {
                return (cell_size, dims);
            }
            cell_size *= 1.25;
        }
    }

    fn cell_coords(origin: &Vector3, cell_size: f64, dims: &[usize; 3], p: &Vector3) -> [usize; 3] {
        let mut out = [0usize; 3];
        for axis in 0..3 {
            let u = ((p[axis] - origin[axis]) / cell_size).floor();
            out[axis] = if u <= 0.0 {
                0
            } else {
                (u as usize).min(dims[axis] - 1)
            };
        }
        out
    }

    #[inline]
    fn flat(dims: &[usize; 3], cell: [usize; 3]) -> usize {
        (cell[2] * dims[1] + cell[1]) * dims[0] + cell[0]
    }

    /// Squared distance from `p` to the axis-aligned box of `cell`.
    fn cell_distance_sq(&self, p: &Vector3, cell: [usize; 3]) -> f64 {
        let mut d2 = 0.0;
        for axis in 0..3 {
            let lo = self.origin[axis] + cell[axis] as f64 * self.cell_size;
            let hi = lo + self.cell_size;
            let d = if p[axis] < lo {
                lo - p[axis]
            } else if p[axis] > hi {
                p[axis] - hi
            } else {
                0.0
            };
            d2 += d * d;
        }
        d2
    }

    /// Lower bound on the distance from `p` to any cell in shell `shell` or
    /// beyond: the distance from `p` to the boundary of the block of cells
    /// covered by shells `0..shell`, or zero if `p` lies outside that block.
    fn shell_lower_bound(&self, p: &Vector3, center: [usize; 3], shell: usize) -> f64 {
        if shell == 0 {
            return 0.0;
        }
        let inner = shell as f64 - 1.0;
        let mut bound = f64::INFINITY;
        for axis in 0..3 {
            let lo = self.origin[axis] + (center[axis] as f64 - inner) * self.cell_size;
            let hi = self.origin[axis] + (center[axis] as f64 + inner + 1.0) * self.cell_size;
            if p[axis] < lo || p[axis] > hi {
                return 0.0;
            }
            bound = bound.min(p[axis] - lo).min(hi - p[axis]);
        }
        bound
    }

    /// Visit every in-grid cell at Chebyshev distance exactly `shell` from `center`.
    fn for_each_shell_cell<F>(&self, center: [usize; 3], shell: usize, mut f: F)
    where
        F: FnMut([usize; 3]),
    {
        let s = shell as isize;
        let c = [center[0] as isize, center[1] as isize, center[2] as isize];
        let d = [
            self.dims[0] as isize,
            self.dims[1] as isize,
            self.dims[2] as isize,
        ];
        let in_grid = |v: isize, axis: usize| v >= 0 && v < d[axis];

        for dz in -s..=s {
            let z = c[2] + dz;
            if !in_grid(z, 2) {
                continue;
            }
            for dy in -s..=s {
                let y = c[1] + dy;
                if !in_grid(y, 1) {
                    continue;
                }
                if dz.abs() == s || dy.abs() == s {
                    for dx in -s..=s {
                        let x = c[0] + dx;
                        if in_grid(x, 0) {
                            f([x as usize, y as usize, z as usize]);
                        }
                    }
                } else {
                    for dx in [-s, s] {
                        let x = c[0] + dx;
                        if in_grid(x, 0) {
                            f([x as usize, y as usize, z as usize]);
                        }
                    }
                }
            }
        }
    }
}

/// Insert into a sorted list, keeping at most `k` entries.
fn insert_bounded(best: &mut Vec<(f64, usize)>, entry: (f64, usize), k: usize) {
    if best.len() == k {
        let worst = best[k - 1];
        if (entry.0, entry.1) >= (worst.0, worst.1) {
            return;
        }
    }
    let pos = best
        .iter()
        .position(|&(d2, idx)| (entry.0, entry.1) < (d2, idx))
        .unwrap_or(best.len());
    best.insert(pos, entry);
    best.truncate(k);
}
