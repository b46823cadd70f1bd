//! ELLPACK (fixed row width) matrix format
//!
//! Every row stores exactly `row_width` entries in `cols`/`coefs`, row `i`
//! occupying `i * row_width..(i + 1) * row_width`. Short rows are padded
//! with a zero coefficient pointing at the row's own diagonal column, which
//! is always owned locally and therefore survives localization unchanged.

use super::csr::CsrMatrix;
use super::local::{ExternalMap, check_columns, exchange_externals, localize_columns};
use crate::comm::Communicator;
use crate::error::{Result, SolverError};
use crate::space::ExecutionSpace;
use crate::traits::{Scalar, SparseOperator};
use crate::vector::DistVector;

/// Fixed-width sparse matrix
#[derive(Debug, Clone)]
pub struct EllMatrix<T: Scalar> {
    /// Number of locally owned rows
    pub num_rows: usize,
    /// Global column count, or local column count once localized
    pub num_cols: usize,
    /// Global index of the first row
    pub start_row: usize,
    /// Stored entries per row
    pub row_width: usize,
    /// Column indices, `num_rows * row_width`
    pub cols: Vec<usize>,
    /// Coefficients, `num_rows * row_width`
    pub coefs: Vec<T>,
    has_local_indices: bool,
    external_map: ExternalMap,
}

impl<T: Scalar> EllMatrix<T> {
    /// Convert from CSR, keeping row placement and local indexing state
    pub fn from_csr(csr: &CsrMatrix<T>) -> Self {
        let row_width = csr.max_row_len();
        let mut cols = Vec::with_capacity(csr.num_rows * row_width);
        let mut coefs = Vec::with_capacity(csr.num_rows * row_width);
        let localized = csr.has_local_indices();

        for row in 0..csr.num_rows {
            let pad_col = if localized { row } else { csr.start_row + row };
            let mut stored = 0;
            for (col, value) in csr.row_entries(row) {
                cols.push(col);
                coefs.push(value);
                stored += 1;
            }
            for _ in stored..row_width {
                cols.push(pad_col);
                coefs.push(T::zero());
            }
        }

        Self {
            num_rows: csr.num_rows,
            num_cols: csr.num_cols,
            start_row: csr.start_row,
            row_width,
            cols,
            coefs,
            has_local_indices: localized,
            external_map: csr.external_map().clone(),
        }
    }

    /// Global indices of the external columns (empty before localizing)
    pub fn external_map(&self) -> &ExternalMap {
        &self.external_map
    }

    /// Convert global column indices to local numbering.
    ///
    /// Collective over `comm`, same numbering as [`CsrMatrix::make_local_matrix`].
    pub fn make_local_matrix<C: Communicator>(&mut self, comm: &C) -> Result<()> {
        if self.has_local_indices {
            return Ok(());
        }
        let width = self.row_width.max(1);
        check_columns(&self.cols, self.num_cols, |pos| pos / width)?;

        self.external_map = localize_columns(comm, &mut self.cols, self.start_row, self.num_rows)?;
        self.num_cols = self.num_rows + self.external_map.len();
        self.has_local_indices = true;
        Ok(())
    }
}

impl<T: Scalar> SparseOperator<T> for EllMatrix<T> {
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
        let width = self.row_width;
        space.for_each_mut(&mut y[..self.num_rows], |row, yi| {
            let base = row * width;
            let mut sum = T::zero();
            for k in base..base + width {
                sum += self.coefs[k] * x[self.cols[k]];
            }
            *yi = sum;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{SingleProcess, run_partitioned};
    use crate::space::{Serial, WorkGroup};
    use ndarray::array;

    #[test]
    fn test_from_csr_pads_short_rows() {
        let dense = array![[4.0_f64, 1.0, 0.0], [0.0, 3.0, 0.0], [1.0, 0.0, 2.0]];
        let csr = CsrMatrix::from_dense(&dense, 0.0);
        let ell = EllMatrix::from_csr(&csr);

        assert_eq!(ell.row_width, 2);
        assert_eq!(ell.cols, vec![0, 1, 1, 1, 0, 2]);
        assert_eq!(ell.coefs, vec![4.0, 1.0, 3.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_ell_matches_csr() {
        let dense = array![[4.0_f64, 1.0, 0.0], [1.0, 3.0, 1.0], [0.0, 1.0, 2.0]];
        let mut csr = CsrMatrix::from_dense(&dense, 0.0);
        let mut ell = EllMatrix::from_csr(&csr);
        csr.make_local_matrix(&SingleProcess).unwrap();
        ell.make_local_matrix(&SingleProcess).unwrap();

        let x = [1.0, -2.0, 0.5];
        let mut y_csr = [0.0; 3];
        let mut y_ell = [0.0; 3];
        csr.apply(&Serial, &x, &mut y_csr).unwrap();
        ell.apply(&WorkGroup::new(2, 2), &x, &mut y_ell).unwrap();
        assert_eq!(y_csr, y_ell);
        assert_eq!(y_ell, [2.0, -4.5, -1.0]);
    }

    #[test]
    fn test_partitioned_padding_stays_local() {
        let results = run_partitioned(2, |comm| {
            let start = comm.rank();
            // row 0: [2, -1], row 1: [0, 5]
            let triplets = if start == 0 {
                vec![(0, 0, 2.0_f64), (0, 1, -1.0)]
            } else {
                vec![(0, 1, 5.0)]
            };
            let csr = CsrMatrix::from_triplets(1, 2, triplets).with_start_row(start);
            let mut ell = EllMatrix::from_csr(&csr);
            ell.make_local_matrix(&comm).unwrap();

            let mut x = DistVector::zeros_with_externals(start, 1, ell.local_cols());
            x.coefs[0] = 10.0 * (start + 1) as f64;
            let mut y = DistVector::new(start, 1);
            ell.exchange_externals(&comm, &mut x).unwrap();
            ell.apply(&Serial, &x.coefs, &mut y.coefs).unwrap();
            (ell.external_map().len(), y.coefs[0])
        });

        assert_eq!(results[0], (1, 0.0));
        assert_eq!(results[1], (0, 100.0));
    }
}
