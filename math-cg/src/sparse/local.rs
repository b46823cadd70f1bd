//! Global-to-local column numbering and external entry exchange
//!
//! After [`localize_columns`], a partition owning rows
//! `start_row..start_row + local_rows` numbers its columns as:
//! - `0..local_rows` for owned rows
//! - `local_rows..local_rows + externals.len()` for columns owned by
//!   other partitions, in ascending global order

use crate::comm::{Communicator, pack_scalars, unpack_scalar};
use crate::error::{Result, SolverError};
use crate::traits::Scalar;
use crate::vector::DistVector;

/// Where each external column of a locally indexed operator comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalMap {
    /// Global indices of external columns, ascending
    pub externals: Vec<usize>,
    /// `(owner rank, offset within the owner's rows)` per external
    pub sources: Vec<(usize, usize)>,
}

impl ExternalMap {
    /// Number of external columns
    pub fn len(&self) -> usize {
        self.externals.len()
    }

    /// Whether every column is owned locally
    pub fn is_empty(&self) -> bool {
        self.externals.is_empty()
    }
}

/// Check that every stored column is below `num_cols`.
///
/// `row_of` maps a position in `cols` back to its local row for the error.
pub(crate) fn check_columns(
    cols: &[usize],
    num_cols: usize,
    row_of: impl Fn(usize) -> usize,
) -> Result<()> {
    match cols.iter().position(|&c| c >= num_cols) {
        Some(pos) => Err(SolverError::ColumnOutOfRange {
            row: row_of(pos),
            col: cols[pos],
            num_cols,
        }),
        None => Ok(()),
    }
}

/// Rewrite global column indices in place to local numbering.
///
/// Collective: every partition of `comm` must call it, since the row
/// ranges of all partitions are gathered to locate external owners.
pub(crate) fn localize_columns<C: Communicator>(
    comm: &C,
    cols: &mut [usize],
    start_row: usize,
    local_rows: usize,
) -> Result<ExternalMap> {
    let end_row = start_row + local_rows;
    let is_local = |c: usize| c >= start_row && c < end_row;

    let mut externals: Vec<usize> = cols.iter().copied().filter(|&c| !is_local(c)).collect();
    externals.sort_unstable();
    externals.dedup();

    let ranges: Vec<(usize, usize)> = comm
        .all_gather(&[start_row as f64, local_rows as f64])
        .iter()
        .map(|buf| {
            let start = buf.first().copied().unwrap_or(0.0) as usize;
            let len = buf.get(1).copied().unwrap_or(0.0) as usize;
            (start, len)
        })
        .collect();

    let mut sources = Vec::with_capacity(externals.len());
    for &global in &externals {
        let owner = ranges
            .iter()
            .position(|&(start, len)| global >= start && global < start + len)
            .ok_or(SolverError::UnownedColumn { col: global })?;
        sources.push((owner, global - ranges[owner].0));
    }

    for c in cols.iter_mut() {
        *c = if is_local(*c) {
            *c - start_row
        } else {
            let pos = externals.binary_search(c).unwrap_or_else(|p| p);
            local_rows + pos
        };
    }

    Ok(ExternalMap { externals, sources })
}

/// Fill `x.coefs[local_rows..]` with the current values of the externals.
///
/// Collective whenever `comm.size() > 1`, even for partitions without
/// externals.
pub(crate) fn exchange_externals<T: Scalar, C: Communicator>(
    comm: &C,
    map: &ExternalMap,
    local_rows: usize,
    x: &mut DistVector<T>,
) -> Result<()> {
    if comm.size() == 1 {
        return Ok(());
    }
    let needed = local_rows + map.len();
    if x.coefs.len() < needed {
        return Err(SolverError::DimensionMismatch {
            expected: needed,
            got: x.coefs.len(),
        });
    }

    let gathered = comm.all_gather(&pack_scalars(&x.coefs[..local_rows]));
    for (k, &(owner, offset)) in map.sources.iter().enumerate() {
        let buf = &gathered[owner];
        let (Some(&re), Some(&im)) = (buf.get(2 * offset), buf.get(2 * offset + 1)) else {
            return Err(SolverError::DimensionMismatch {
                expected: 2 * offset + 2,
                got: buf.len(),
            });
        };
        x.coefs[local_rows + k] = unpack_scalar(re, im);
    }
    Ok(())
}
