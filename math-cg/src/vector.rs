//! Partitioned dense vectors
//!
//! A [`DistVector`] holds the slice of a global vector owned by one
//! partition: coefficients for global indices
//! `start_index..start_index + local_size`, optionally followed by external
//! entries that a matrix-vector product reads from other partitions.

use crate::comm::Communicator;
use crate::error::Result;
use crate::traits::Scalar;
use ndarray::{Array1, ArrayView1};
use num_traits::ToPrimitive;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// The locally owned part of a distributed vector.
#[derive(Debug, Clone, PartialEq)]
pub struct DistVector<T: Scalar> {
    /// Global index of `coefs[0]`
    pub start_index: usize,
    /// Number of locally owned entries
    pub local_size: usize,
    /// Owned entries followed by externals (`coefs.len() >= local_size`)
    pub coefs: Vec<T>,
}

impl<T: Scalar> DistVector<T> {
    /// Zero vector owning `local_size` entries from `start_index`
    pub fn new(start_index: usize, local_size: usize) -> Self {
        Self {
            start_index,
            local_size,
            coefs: vec![T::zero(); local_size],
        }
    }

    /// Zero vector with room for `num_cols - local_size` external entries
    pub fn zeros_with_externals(start_index: usize, local_size: usize, num_cols: usize) -> Self {
        Self {
            start_index,
            local_size,
            coefs: vec![T::zero(); num_cols.max(local_size)],
        }
    }

    /// Vector owning all of `coefs`
    pub fn from_vec(start_index: usize, coefs: Vec<T>) -> Self {
        Self {
            start_index,
            local_size: coefs.len(),
            coefs,
        }
    }

    /// Vector owning all entries of an ndarray
    pub fn from_array(start_index: usize, values: &Array1<T>) -> Self {
        Self::from_vec(start_index, values.to_vec())
    }

    /// View of the owned entries
    pub fn as_array(&self) -> ArrayView1<'_, T> {
        ArrayView1::from(self.owned())
    }

    /// Owned entries only
    pub fn owned(&self) -> &[T] {
        &self.coefs[..self.local_size]
    }

    /// Mutable owned entries only
    pub fn owned_mut(&mut self) -> &mut [T] {
        &mut self.coefs[..self.local_size]
    }

    /// Number of stored entries, externals included
    pub fn len(&self) -> usize {
        self.coefs.len()
    }

    /// Whether no entries are stored
    pub fn is_empty(&self) -> bool {
        self.coefs.is_empty()
    }

    /// Whether the global index is owned by this partition
    pub fn owns(&self, global: usize) -> bool {
        global >= self.start_index && global < self.start_index + self.local_size
    }

    /// Overwrite every owned entry with `value`
    pub fn fill(&mut self, value: T) {
        for v in self.owned_mut() {
            *v = value;
        }
    }
}

/// Add `coefs[k]` into the entry at global index `indices[k]`.
///
/// Indices outside the owned range are skipped, so every partition can be
/// handed the same element contribution.
pub fn sum_into_vector<T: Scalar>(indices: &[usize], coefs: &[T], vec: &mut DistVector<T>) {
    for (&global, &value) in indices.iter().zip(coefs.iter()) {
        if !vec.owns(global) {
            continue;
        }
        vec.coefs[global - vec.start_index] += value;
    }
}

/// Path of the file written by `rank` out of `size` partitions.
pub fn partition_file_name(base: &Path, size: usize, rank: usize) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{size}.{rank}"));
    PathBuf::from(name)
}

/// Write the owned entries to `<base>.<size>.<rank>`.
///
/// Partition 0 starts its file with the local length. Each following line
/// holds a global index and the real part of the entry (plus the imaginary
/// part for complex vectors).
pub fn write_vector<T: Scalar, C: Communicator>(
    base: &Path,
    vec: &DistVector<T>,
    comm: &C,
) -> Result<PathBuf> {
    let path = partition_file_name(base, comm.size(), comm.rank());
    let mut out = BufWriter::new(File::create(&path)?);

    if comm.rank() == 0 {
        writeln!(out, "{}", vec.local_size)?;
    }
    for (i, v) in vec.owned().iter().enumerate() {
        let re = v.re().to_f64().unwrap_or(f64::NAN);
        let im = v.im().to_f64().unwrap_or(f64::NAN);
        if im == 0.0 {
            writeln!(out, "{} {}", vec.start_index + i, re)?;
        } else {
            writeln!(out, "{} {} {}", vec.start_index + i, re, im)?;
        }
    }
    out.flush()?;
    Ok(path)
}
