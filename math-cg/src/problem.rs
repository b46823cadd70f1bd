//! Model problem: the 7-point Laplacian on a structured 3D grid
//!
//! Grid point `(ix, iy, iz)` is global row `ix + nx * (iy + ny * iz)`. Each
//! row has 6 on the diagonal and -1 for every neighbor inside the grid, so
//! the operator is symmetric positive definite. Rows are split into
//! contiguous blocks, one per partition.

use crate::error::{Result, SolverError};
use crate::sparse::{CsrBuilder, CsrMatrix};
use crate::vector::DistVector;

/// Grid dimensions of the model problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    /// Points along x (fastest varying index)
    pub nx: usize,
    /// Points along y
    pub ny: usize,
    /// Points along z (slowest varying index)
    pub nz: usize,
}

impl Grid {
    /// Grid of `nx * ny * nz` points
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self { nx, ny, nz }
    }

    /// Number of grid points (global rows)
    pub fn len(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Whether any dimension is zero
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Global indices of the in-grid neighbors of `row` and the row itself,
    /// in ascending order.
    fn stencil(&self, row: usize) -> impl Iterator<Item = (usize, f64)> {
        let (nx, ny, nz) = (self.nx, self.ny, self.nz);
        let ix = row % nx;
        let iy = (row / nx) % ny;
        let iz = row / (nx * ny);
        let plane = nx * ny;

        [
            (iz > 0).then(|| (row - plane, -1.0)),
            (iy > 0).then(|| (row - nx, -1.0)),
            (ix > 0).then(|| (row - 1, -1.0)),
            Some((row, 6.0)),
            (ix + 1 < nx).then(|| (row + 1, -1.0)),
            (iy + 1 < ny).then(|| (row + nx, -1.0)),
            (iz + 1 < nz).then(|| (row + plane, -1.0)),
        ]
        .into_iter()
        .flatten()
    }
}

/// Contiguous row block `(start, len)` of partition `rank` out of `size`.
///
/// The first `n % size` partitions get one extra row.
pub fn partition_rows(n: usize, size: usize, rank: usize) -> Result<(usize, usize)> {
    if size == 0 || rank >= size {
        return Err(SolverError::InvalidPartition {
            rank,
            size,
            rows: n,
        });
    }
    let base = n / size;
    let extra = n % size;
    let len = base + usize::from(rank < extra);
    let start = rank * base + rank.min(extra);
    Ok((start, len))
}

fn check_rows(grid: &Grid, start: usize, len: usize) -> Result<()> {
    if start + len > grid.len() {
        return Err(SolverError::DimensionMismatch {
            expected: start + len,
            got: grid.len(),
        });
    }
    Ok(())
}

/// Rows `start..start + len` of the Laplacian, with global column indices.
pub fn poisson_3d(grid: &Grid, start: usize, len: usize) -> Result<CsrMatrix<f64>> {
    check_rows(grid, start, len)?;
    let mut builder = CsrBuilder::with_capacity(len, grid.len(), 7 * len);
    for row in start..start + len {
        builder.add_row_entries(grid.stencil(row));
    }
    let a = builder.finish().with_start_row(start);
    log::debug!(
        "poisson_3d: {}x{}x{} grid, rows {}..{}, {} nonzeros",
        grid.nx,
        grid.ny,
        grid.nz,
        start,
        start + len,
        a.nnz()
    );
    Ok(a)
}

/// Right-hand side `b = A * 1`, so the exact solution is all ones.
pub fn poisson_rhs(grid: &Grid, start: usize, len: usize) -> Result<DistVector<f64>> {
    check_rows(grid, start, len)?;
    let coefs = (start..start + len)
        .map(|row| grid.stencil(row).map(|(_, v)| v).sum())
        .collect();
    Ok(DistVector::from_vec(start, coefs))
}
