//! Core traits for the solver
//!
//! This module defines the abstractions the CG driver is written against:
//! - [`Scalar`]: real and complex coefficient types with their magnitude type
//! - [`SparseOperator`]: a locally indexed matrix that can multiply into a vector
//! - [`Matvec`]: the strategy the driver calls for `y = A * x`

use crate::comm::Communicator;
use crate::error::Result;
use crate::space::{ExecContext, ExecutionSpace};
use crate::vector::DistVector;
use num_complex::{Complex32, Complex64};
use num_traits::{Float, FromPrimitive, NumAssign, One, ToPrimitive, Zero};
use std::fmt::Debug;
use std::ops::Neg;

/// Trait for coefficient types of vectors and operators.
///
/// `Real` is the magnitude type: norms, residuals, `alpha`, `beta` and the
/// breakdown tolerance all live there, even for complex coefficients.
///
/// # Implementations
///
/// Provided for `f64`, `f32`, `Complex64` and `Complex32`.
pub trait Scalar:
    NumAssign + Clone + Copy + Send + Sync + Debug + Zero + One + Neg<Output = Self> + 'static
{
    /// The real number type underlying this field
    type Real: Float + NumAssign + FromPrimitive + ToPrimitive + Send + Sync + Debug + 'static;

    /// Complex conjugate
    fn conj(&self) -> Self;

    /// Squared magnitude |z|²
    fn norm_sqr(&self) -> Self::Real;

    /// Magnitude |z|
    fn norm(&self) -> Self::Real {
        self.norm_sqr().sqrt()
    }

    /// Create from a real value
    fn from_real(r: Self::Real) -> Self;

    /// Create from real and imaginary parts
    fn from_re_im(re: Self::Real, im: Self::Real) -> Self;

    /// Real part
    fn re(&self) -> Self::Real;

    /// Imaginary part
    fn im(&self) -> Self::Real;
}

impl Scalar for Complex64 {
    type Real = f64;

    #[inline]
    fn conj(&self) -> Self {
        Complex64::conj(self)
    }

    #[inline]
    fn norm_sqr(&self) -> f64 {
        self.re * self.re + self.im * self.im
    }

    #[inline]
    fn from_real(r: f64) -> Self {
        Complex64::new(r, 0.0)
    }

    #[inline]
    fn from_re_im(re: f64, im: f64) -> Self {
        Complex64::new(re, im)
    }

    #[inline]
    fn re(&self) -> f64 {
        self.re
    }

    #[inline]
    fn im(&self) -> f64 {
        self.im
    }
}

impl Scalar for Complex32 {
    type Real = f32;

    #[inline]
    fn conj(&self) -> Self {
        Complex32::conj(self)
    }

    #[inline]
    fn norm_sqr(&self) -> f32 {
        self.re * self.re + self.im * self.im
    }

    #[inline]
    fn from_real(r: f32) -> Self {
        Complex32::new(r, 0.0)
    }

    #[inline]
    fn from_re_im(re: f32, im: f32) -> Self {
        Complex32::new(re, im)
    }

    #[inline]
    fn re(&self) -> f32 {
        self.re
    }

    #[inline]
    fn im(&self) -> f32 {
        self.im
    }
}

impl Scalar for f64 {
    type Real = f64;

    #[inline]
    fn conj(&self) -> Self {
        *self
    }

    #[inline]
    fn norm_sqr(&self) -> f64 {
        *self * *self
    }

    #[inline]
    fn from_real(r: f64) -> Self {
        r
    }

    #[inline]
    fn from_re_im(re: f64, _im: f64) -> Self {
        re
    }

    #[inline]
    fn re(&self) -> f64 {
        *self
    }

    #[inline]
    fn im(&self) -> f64 {
        0.0
    }
}

impl Scalar for f32 {
    type Real = f32;

    #[inline]
    fn conj(&self) -> Self {
        *self
    }

    #[inline]
    fn norm_sqr(&self) -> f32 {
        *self * *self
    }

    #[inline]
    fn from_real(r: f32) -> Self {
        r
    }

    #[inline]
    fn from_re_im(re: f32, _im: f32) -> Self {
        re
    }

    #[inline]
    fn re(&self) -> f32 {
        *self
    }

    #[inline]
    fn im(&self) -> f32 {
        0.0
    }
}

/// Trait for sparse operators owned by one partition.
///
/// Rows `start_row()..start_row() + local_rows()` are owned locally. After
/// local indexing, column `j < local_rows()` refers to a local row and
/// `j >= local_rows()` to an external entry fetched by
/// [`SparseOperator::exchange_externals`]. The operator is never mutated
/// during a solve, so one instance can serve concurrent solves.
pub trait SparseOperator<T: Scalar>: Send + Sync {
    /// Number of locally owned rows
    fn local_rows(&self) -> usize;

    /// Number of local columns (owned rows plus externals)
    fn local_cols(&self) -> usize;

    /// Global index of the first owned row
    fn start_row(&self) -> usize;

    /// Whether column indices have been converted to local numbering
    fn has_local_indices(&self) -> bool;

    /// Fill the external section of `x` from the owning partitions.
    fn exchange_externals<C: Communicator>(&self, comm: &C, x: &mut DistVector<T>) -> Result<()>;

    /// Compute `y[i] = sum_j A[i, j] * x[j]` for every local row.
    fn apply<E: ExecutionSpace>(&self, space: &E, x: &[T], y: &mut [T]) -> Result<()>;
}

/// Strategy for the matrix-vector product used by the CG driver.
///
/// `x` is mutable because a distributed product refreshes its external
/// entries before multiplying.
pub trait Matvec<T: Scalar, A: ?Sized> {
    /// Compute `y = A * x`.
    fn multiply<E: ExecutionSpace, C: Communicator>(
        &self,
        ctx: &ExecContext<E, C>,
        a: &A,
        x: &mut DistVector<T>,
        y: &mut DistVector<T>,
    ) -> Result<()>;
}

/// Default strategy: exchange externals, then apply the stored operator.
#[derive(Clone, Copy, Debug, Default)]
pub struct SparseMatvec;

impl<T, A> Matvec<T, A> for SparseMatvec
where
    T: Scalar,
    A: SparseOperator<T>,
{
    fn multiply<E: ExecutionSpace, C: Communicator>(
        &self,
        ctx: &ExecContext<E, C>,
        a: &A,
        x: &mut DistVector<T>,
        y: &mut DistVector<T>,
    ) -> Result<()> {
        a.exchange_externals(&ctx.comm, x)?;
        a.apply(&ctx.space, &x.coefs, &mut y.coefs)
    }
}
