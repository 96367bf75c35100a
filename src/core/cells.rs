//! Periodic uniform cell grid for neighbor-list candidate search.
//!
//! Sorted-index + offset layout: `sorted[offsets[c]..offsets[c + 1]]` are the
//! points binned into cell `c`. Cells are at least as wide as the search
//! radius, so the 27 cells around a point hold every point within that radius.

use crate::core::boundary::wrap_coordinate;
use crate::core::particle::DIM;

#[derive(Debug, Clone)]
pub struct CellGrid {
    extent: [f64; DIM],
    dims: [usize; DIM],
    cell: [f64; DIM],
    offsets: Vec<usize>,
    sorted: Vec<usize>,
}

impl CellGrid {
    /// Grid over the periodic box with cells no narrower than `min_cell_size`.
    ///
    /// Returns `None` when some axis fits fewer than three cells: the 27-cell
    /// stencil would then visit the same cell twice and an exhaustive scan is cheaper.
    pub fn new(extent: [f64; DIM], min_cell_size: f64) -> Option<Self> {
        if !min_cell_size.is_finite() || min_cell_size <= 0.0 {
            return None;
        }
        let mut dims = [0usize; DIM];
        let mut cell = [0.0; DIM];
        for k in 0..DIM {
            dims[k] = (extent[k] / min_cell_size).floor() as usize;
            if dims[k] < 3 {
                return None;
            }
            cell[k] = extent[k] / dims[k] as f64;
        }
        Some(Self {
            extent,
            dims,
            cell,
            offsets: Vec::new(),
            sorted: Vec::new(),
        })
    }

    fn total_cells(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    #[inline]
    fn cell_coords(&self, r: &[f64; DIM]) -> [usize; DIM] {
        let mut c = [0usize; DIM];
        for k in 0..DIM {
            let x = wrap_coordinate(r[k], self.extent[k]);
            c[k] = ((x / self.cell[k]).floor() as usize).min(self.dims[k] - 1);
        }
        c
    }

    #[inline]
    fn cell_hash(&self, c: [usize; DIM]) -> usize {
        c[0] + c[1] * self.dims[0] + c[2] * self.dims[0] * self.dims[1]
    }

    /// Rebin the grid from scratch for `positions`.
    pub fn bin(&mut self, positions: &[[f64; DIM]]) {
        let total = self.total_cells();
        let cell_of: Vec<usize> = positions
            .iter()
            .map(|r| self.cell_hash(self.cell_coords(r)))
            .collect();

        // Count, prefix-sum, scatter.
        self.offsets.clear();
        self.offsets.resize(total + 1, 0);
        for &c in &cell_of {
            self.offsets[c + 1] += 1;
        }
        for c in 0..total {
            self.offsets[c + 1] += self.offsets[c];
        }
        self.sorted.clear();
        self.sorted.resize(positions.len(), 0);
        let mut heads = self.offsets.clone();
        for (i, &c) in cell_of.iter().enumerate() {
            self.sorted[heads[c]] = i;
            heads[c] += 1;
        }
    }

    /// Call `f` with every binned index in the 27 cells around `r`.
    pub fn for_each_near<F: FnMut(usize)>(&self, r: &[f64; DIM], mut f: F) {
        if self.offsets.is_empty() {
            return;
        }
        let c = self.cell_coords(r);
        for dz in -1isize..=1 {
            for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    let n = [
                        (c[0] as isize + dx).rem_euclid(self.dims[0] as isize) as usize,
                        (c[1] as isize + dy).rem_euclid(self.dims[1] as isize) as usize,
                        (c[2] as isize + dz).rem_euclid(self.dims[2] as isize) as usize,
                    ];
                    let h = self.cell_hash(n);
                    for &i in &self.sorted[self.offsets[h]..self.offsets[h + 1]] {
                        f(i);
                    }
                }
            }
        }
    }
}
