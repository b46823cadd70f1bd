//! Compressed Sparse Row (CSR) matrix format
//!
//! CSR format stores:
//! - `values`: Non-zero entries in row-major order
//! - `col_indices`: Column index for each value
//! - `row_ptrs`: Index into values/col_indices where each row starts
//!
//! A matrix holds the rows `start_row..start_row + num_rows` of a possibly
//! partitioned global matrix. Column indices are global until
//! [`CsrMatrix::make_local_matrix`] renumbers them.

use super::local::{ExternalMap, check_columns, exchange_externals, localize_columns};
use crate::comm::Communicator;
use crate::error::{Result, SolverError};
use crate::space::ExecutionSpace;
use crate::traits::{Scalar, SparseOperator};
use crate::vector::DistVector;
use ndarray::Array2;
use num_traits::Zero;
use std::ops::Range;

/// Compressed Sparse Row (CSR) matrix format
#[derive(Debug, Clone)]
pub struct CsrMatrix<T: Scalar> {
    /// Number of locally owned rows
    pub num_rows: usize,
    /// Global column count, or local column count once localized
    pub num_cols: usize,
    /// Global index of the first row
    pub start_row: usize,
    /// Non-zero values in row-major order
    pub values: Vec<T>,
    /// Column indices for each value
    pub col_indices: Vec<usize>,
    /// Row pointers: row_ptrs[i] is the start index in values/col_indices for row i
    /// row_ptrs[num_rows] = nnz (total number of non-zeros)
    pub row_ptrs: Vec<usize>,
    has_local_indices: bool,
    external_map: ExternalMap,
}

impl<T: Scalar> CsrMatrix<T> {
    /// Create a new empty CSR matrix
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        Self::from_raw_parts(
            num_rows,
            num_cols,
            vec![0; num_rows + 1],
            Vec::new(),
            Vec::new(),
        )
    }

    /// Create a CSR matrix from raw components
    ///
    /// # Panics
    ///
    /// Panics if the input arrays are inconsistent:
    /// - `row_ptrs` must have length `num_rows + 1`
    /// - `col_indices` and `values` must have the same length
    /// - `row_ptrs[num_rows]` must equal `values.len()`
    pub fn from_raw_parts(
        num_rows: usize,
        num_cols: usize,
        row_ptrs: Vec<usize>,
        col_indices: Vec<usize>,
        values: Vec<T>,
    ) -> Self {
        assert_eq!(
            row_ptrs.len(),
            num_rows + 1,
            "row_ptrs must have num_rows + 1 elements"
        );
        assert_eq!(
            col_indices.len(),
            values.len(),
            "col_indices and values must have the same length"
        );
        assert_eq!(
            row_ptrs[num_rows],
            values.len(),
            "row_ptrs[num_rows] must equal nnz"
        );

        Self {
            num_rows,
            num_cols,
            start_row: 0,
            values,
            col_indices,
            row_ptrs,
            has_local_indices: false,
            external_map: ExternalMap::default(),
        }
    }

    /// Create a CSR matrix from a dense matrix
    ///
    /// Only stores entries with magnitude > threshold
    pub fn from_dense(dense: &Array2<T>, threshold: T::Real) -> Self {
        let mut builder = CsrBuilder::new(dense.nrows(), dense.ncols());
        for row in dense.rows() {
            builder.add_row_entries(
                row.iter()
                    .copied()
                    .enumerate()
                    .filter(|(_, v)| v.norm() > threshold),
            );
        }
        builder.finish()
    }

    /// Create a CSR matrix from COO (Coordinate) format triplets
    ///
    /// Triplets are (local row, global column, value). Duplicate entries are summed.
    pub fn from_triplets(
        num_rows: usize,
        num_cols: usize,
        mut triplets: Vec<(usize, usize, T)>,
    ) -> Self {
        triplets.sort_by_key(|&(row, col, _)| (row, col));

        let mut row_ptrs = vec![0usize; num_rows + 1];
        let mut col_indices: Vec<usize> = Vec::with_capacity(triplets.len());
        let mut values: Vec<T> = Vec::with_capacity(triplets.len());
        let mut last: Option<(usize, usize)> = None;

        for (row, col, val) in triplets.into_iter().filter(|&(row, _, _)| row < num_rows) {
            if last == Some((row, col)) {
                if let Some(v) = values.last_mut() {
                    *v += val;
                }
                continue;
            }
            col_indices.push(col);
            values.push(val);
            row_ptrs[row + 1] += 1;
            last = Some((row, col));
        }
        for i in 0..num_rows {
            row_ptrs[i + 1] += row_ptrs[i];
        }

        Self::from_raw_parts(num_rows, num_cols, row_ptrs, col_indices, values)
    }

    /// Create identity matrix in CSR format
    pub fn identity(n: usize) -> Self {
        Self::from_raw_parts(n, n, (0..=n).collect(), (0..n).collect(), vec![T::one(); n])
    }

    /// Create diagonal matrix from its entries
    pub fn from_diagonal(diag: &[T]) -> Self {
        let n = diag.len();
        Self::from_raw_parts(n, n, (0..=n).collect(), (0..n).collect(), diag.to_vec())
    }

    /// Place these rows at global row `start_row`
    pub fn with_start_row(mut self, start_row: usize) -> Self {
        self.start_row = start_row;
        self
    }

    /// Number of non-zero entries
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Longest row, in stored entries
    pub fn max_row_len(&self) -> usize {
        (0..self.num_rows)
            .map(|i| self.row_range(i).len())
            .max()
            .unwrap_or(0)
    }

    /// Get the range of indices in values/col_indices for a given row
    pub fn row_range(&self, row: usize) -> Range<usize> {
        self.row_ptrs[row]..self.row_ptrs[row + 1]
    }

    /// Get the (col, value) pairs for a row
    pub fn row_entries(&self, row: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        let range = self.row_range(row);
        self.col_indices[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// Get element at (local row, column), returns 0 if not stored
    pub fn get(&self, row: usize, col: usize) -> T {
        self.row_entries(row)
            .filter(|&(c, _)| c == col)
            .fold(T::zero(), |acc, (_, v)| acc + v)
    }

    /// Diagonal entries of the owned rows
    pub fn diagonal(&self) -> Vec<T> {
        (0..self.num_rows)
            .map(|i| self.get(i, self.diagonal_column(i)))
            .collect()
    }

    fn diagonal_column(&self, row: usize) -> usize {
        if self.has_local_indices {
            row
        } else {
            self.start_row + row
        }
    }

    /// Global indices of the external columns (empty before localizing)
    pub fn external_map(&self) -> &ExternalMap {
        &self.external_map
    }

    /// Convert global column indices to local numbering.
    ///
    /// Collective over `comm`. Columns owned by other partitions are
    /// appended after the owned rows; afterwards `num_cols` is the local
    /// column count and vectors multiplied by this matrix need
    /// `num_cols` entries.
    pub fn make_local_matrix<C: Communicator>(&mut self, comm: &C) -> Result<()> {
        if self.has_local_indices {
            return Ok(());
        }
        let row_ptrs = &self.row_ptrs;
        check_columns(&self.col_indices, self.num_cols, |pos| {
            row_ptrs.partition_point(|&p| p <= pos).saturating_sub(1)
        })?;

        self.external_map =
            localize_columns(comm, &mut self.col_indices, self.start_row, self.num_rows)?;
        self.num_cols = self.num_rows + self.external_map.len();
        self.has_local_indices = true;
        log::debug!(
            "rank {}: localized {} rows, {} externals",
            comm.rank(),
            self.num_rows,
            self.external_map.len()
        );
        Ok(())
    }

    /// Convert to dense matrix (for debugging/small matrices)
    pub fn to_dense(&self) -> Array2<T> {
        let mut dense = Array2::from_elem((self.num_rows, self.num_cols), T::zero());
        for i in 0..self.num_rows {
            for (j, v) in self.row_entries(i) {
                dense[[i, j]] += v;
            }
        }
        dense
    }
}

impl<T: Scalar> SparseOperator<T> for CsrMatrix<T> {
    fn local_rows(&self) -> usize {
        self.num_rows
    }

    fn local_cols(&self) -> usize {
        self.num_cols
    }

    fn start_row(&self) -> usize {
        self.start_row
    }

    fn has_local_indices(&self) -> bool {
        self.has_local_indices
    }

    fn exchange_externals<C: Communicator>(&self, comm: &C, x: &mut DistVector<T>) -> Result<()> {
        exchange_externals(comm, &self.external_map, self.num_rows, x)
    }

    fn apply<E: ExecutionSpace>(&self, space: &E, x: &[T], y: &mut [T]) -> Result<()> {
        if x.len() < self.num_cols {
            return Err(SolverError::DimensionMismatch {
                expected: self.num_cols,
                got: x.len(),
            });
        }
        if y.len() < self.num_rows {
            return Err(SolverError::DimensionMismatch {
                expected: self.num_rows,
                got: y.len(),
            });
        }
        space.for_each_mut(&mut y[..self.num_rows], |row, yi| {
            let mut sum = T::zero();
            for idx in self.row_range(row) {
                sum += self.values[idx] * x[self.col_indices[idx]];
            }
            *yi = sum;
        });
        Ok(())
    }
}

/// Builder for constructing CSR matrices row by row
pub struct CsrBuilder<T: Scalar> {
    num_rows: usize,
    num_cols: usize,
    values: Vec<T>,
    col_indices: Vec<usize>,
    row_ptrs: Vec<usize>,
}

impl<T: Scalar> CsrBuilder<T> {
    /// Create a new CSR builder
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        Self::with_capacity(num_rows, num_cols, 0)
    }

    /// Create a new CSR builder with estimated non-zeros
    pub fn with_capacity(num_rows: usize, num_cols: usize, nnz_estimate: usize) -> Self {
        let mut row_ptrs = Vec::with_capacity(num_rows + 1);
        row_ptrs.push(0);
        Self {
            num_rows,
            num_cols,
            values: Vec::with_capacity(nnz_estimate),
            col_indices: Vec::with_capacity(nnz_estimate),
            row_ptrs,
        }
    }

    /// Add entries for the next row; explicit zeros are dropped
    pub fn add_row_entries(&mut self, entries: impl Iterator<Item = (usize, T)>) {
        for (col, val) in entries {
            if val.norm() > T::Real::zero() {
                self.values.push(val);
                self.col_indices.push(col);
            }
        }
        self.row_ptrs.push(self.values.len());
    }

    /// Finish building and return the CSR matrix
    ///
    /// Rows never added are empty; rows added beyond `num_rows` are dropped.
    pub fn finish(mut self) -> CsrMatrix<T> {
        self.row_ptrs.truncate(self.num_rows + 1);
        let nnz = self.row_ptrs.last().copied().unwrap_or(0);
        self.values.truncate(nnz);
        self.col_indices.truncate(nnz);
        while self.row_ptrs.len() < self.num_rows + 1 {
            self.row_ptrs.push(nnz);
        }
        CsrMatrix::from_raw_parts(
            self.num_rows,
            self.num_cols,
            self.row_ptrs,
            self.col_indices,
            self.values,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{SingleProcess, run_partitioned};
    use crate::space::Serial;
    use approx::assert_relative_eq;
    use ndarray::array;
    use num_complex::Complex64;

    #[test]
    fn test_csr_from_dense() {
        let dense = array![[1.0_f64, 0.0, 2.0], [0.0, 3.0, 0.0], [4.0, 0.0, 5.0]];

        let csr = CsrMatrix::from_dense(&dense, 1e-15);

        assert_eq!(csr.num_rows, 3);
        assert_eq!(csr.num_cols, 3);
        assert_eq!(csr.nnz(), 5);
        assert_eq!(csr.max_row_len(), 2);
        assert_relative_eq!(csr.get(0, 2), 2.0);
        assert_relative_eq!(csr.get(2, 0), 4.0);
        assert_eq!(csr.diagonal(), vec![1.0, 3.0, 5.0]);
        assert!(!csr.has_local_indices());
    }

    #[test]
    fn test_csr_apply() {
        let dense = array![
            [Complex64::new(1.0, 0.0), Complex64::new(2.0, 0.0)],
            [Complex64::new(3.0, 0.0), Complex64::new(4.0, 1.0)],
        ];
        let csr = CsrMatrix::from_dense(&dense, 1e-15);
        let x = [Complex64::new(1.0, 0.0), Complex64::new(2.0, 0.0)];
        let mut y = [Complex64::new(0.0, 0.0); 2];

        csr.apply(&Serial, &x, &mut y).unwrap();

        // [1 2  ] * [1]   [5    ]
        // [3 4+i]   [2] = [11+2i]
        assert_relative_eq!(y[0].re, 5.0, epsilon = 1e-10);
        assert_relative_eq!(y[1].re, 11.0, epsilon = 1e-10);
        assert_relative_eq!(y[1].im, 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_csr_apply_short_input_is_error() {
        let csr: CsrMatrix<f64> = CsrMatrix::identity(3);
        let mut y = [0.0; 3];
        assert!(csr.apply(&Serial, &[1.0, 2.0], &mut y).is_err());
    }

    #[test]
    fn test_csr_triplets_duplicate() {
        let triplets = vec![(1, 1, 3.0_f64), (0, 0, 1.0), (0, 0, 2.0), (5, 0, 9.0)];

        let csr = CsrMatrix::from_triplets(2, 2, triplets);

        assert_eq!(csr.nnz(), 2);
        assert_eq!(csr.row_ptrs, vec![0, 1, 2]);
        assert_relative_eq!(csr.get(0, 0), 3.0);
        assert_relative_eq!(csr.get(1, 1), 3.0);
    }

    #[test]
    fn test_csr_triplets_empty_rows() {
        let csr = CsrMatrix::from_triplets(4, 4, vec![(2, 3, 1.0_f64)]);
        assert_eq!(csr.row_ptrs, vec![0, 0, 0, 1, 1]);
    }

    #[test]
    fn test_csr_builder() {
        let mut builder: CsrBuilder<f64> = CsrBuilder::new(3, 3);
        builder.add_row_entries([(0, 1.0), (1, 0.0), (2, 2.0)].into_iter());
        builder.add_row_entries([(1, 3.0)].into_iter());

        let csr = builder.finish();

        assert_eq!(csr.nnz(), 3);
        assert_eq!(csr.row_ptrs, vec![0, 2, 3, 3]);
        assert_relative_eq!(csr.get(1, 1), 3.0);
    }

    #[test]
    fn test_make_local_single_partition() {
        let mut csr: CsrMatrix<f64> = CsrMatrix::from_diagonal(&[2.0, 3.0]);
        csr.make_local_matrix(&SingleProcess).unwrap();
        assert!(csr.has_local_indices());
        assert_eq!(csr.num_cols, 2);
        assert!(csr.external_map().is_empty());
        assert_eq!(csr.diagonal(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_make_local_rejects_out_of_range_column() {
        let mut csr = CsrMatrix::from_triplets(2, 2, vec![(0, 0, 1.0_f64), (1, 7, 1.0)]);
        let err = csr.make_local_matrix(&SingleProcess).unwrap_err();
        match err {
            SolverError::ColumnOutOfRange { row, col, .. } => assert_eq!((row, col), (1, 7)),
            other => panic!("unexpected error {other}"),
        }
        assert!(!csr.has_local_indices());
    }

    #[test]
    fn test_partitioned_tridiagonal_product() {
        // global 4x4 tridiag(-1, 2, -1), two rows per partition
        let results = run_partitioned(2, |comm| {
            let start = 2 * comm.rank();
            let mut triplets = Vec::new();
            for local in 0..2 {
                let g = start + local;
                triplets.push((local, g, 2.0_f64));
                if g > 0 {
                    triplets.push((local, g - 1, -1.0));
                }
                if g < 3 {
                    triplets.push((local, g + 1, -1.0));
                }
            }
            let mut a = CsrMatrix::from_triplets(2, 4, triplets).with_start_row(start);
            a.make_local_matrix(&comm).unwrap();

            let mut x = DistVector::zeros_with_externals(start, 2, a.local_cols());
            for (i, v) in x.owned_mut().iter_mut().enumerate() {
                *v = (start + i + 1) as f64;
            }
            let mut y = DistVector::new(start, 2);
            a.exchange_externals(&comm, &mut x).unwrap();
            a.apply(&Serial, &x.coefs, &mut y.coefs).unwrap();
            y.coefs
        });

        // A * [1, 2, 3, 4] = [0, 0, 0, 5]
        assert_eq!(results[0], vec![0.0, 0.0]);
        assert_eq!(results[1], vec![0.0, 5.0]);
    }
}
