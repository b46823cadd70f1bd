//! Vector kernels of the CG iteration
//!
//! All kernels operate on the owned entries of a [`DistVector`] and run on
//! the execution space of an [`ExecContext`]. Inner products finish with a
//! global sum across partitions so every partition sees the same value.

use crate::comm::{Communicator, global_sum, global_sum_real};
use crate::error::{Result, SolverError};
use crate::space::{ExecContext, ExecutionSpace};
use crate::traits::Scalar;
use crate::vector::DistVector;

fn ensure_len(expected: usize, got: usize) -> Result<()> {
    if got < expected {
        return Err(SolverError::DimensionMismatch { expected, got });
    }
    Ok(())
}

/// Compute `w = alpha * x + beta * y` over the owned entries of `x`.
///
/// When `beta` is zero `y` is never read, so non-finite values in `y`
/// cannot reach `w`. The in-place form `y = alpha * x + beta * y` is
/// [`daxpby`].
pub fn waxpby<T, E, C>(
    ctx: &ExecContext<E, C>,
    alpha: T,
    x: &DistVector<T>,
    beta: T,
    y: &DistVector<T>,
    w: &mut DistVector<T>,
) -> Result<()>
where
    T: Scalar,
    E: ExecutionSpace,
    C: Communicator,
{
    let n = x.local_size;
    ensure_len(n, w.coefs.len())?;
    let xs = &x.coefs[..n];
    let out = &mut w.coefs[..n];
    let one = T::one();

    if beta == T::zero() {
        if alpha == one {
            ctx.space.for_each_mut(out, |i, wi| *wi = xs[i]);
        } else {
            ctx.space.for_each_mut(out, |i, wi| *wi = alpha * xs[i]);
        }
        return Ok(());
    }

    ensure_len(n, y.coefs.len())?;
    let ys = &y.coefs[..n];
    if alpha == one {
        ctx.space.for_each_mut(out, |i, wi| *wi = xs[i] + beta * ys[i]);
    } else {
        ctx.space
            .for_each_mut(out, |i, wi| *wi = alpha * xs[i] + beta * ys[i]);
    }
    Ok(())
}

/// Compute `y = alpha * x + beta * y` in place.
///
/// Covers the first `min(x.local_size, y.local_size)` entries; external
/// entries of `y` are left untouched. With `beta` zero the old `y` is
/// overwritten without being read.
pub fn daxpby<T, E, C>(
    ctx: &ExecContext<E, C>,
    alpha: T,
    x: &DistVector<T>,
    beta: T,
    y: &mut DistVector<T>,
) where
    T: Scalar,
    E: ExecutionSpace,
    C: Communicator,
{
    let n = x.local_size.min(y.local_size);
    let xs = &x.coefs[..n];
    let ys = &mut y.coefs[..n];
    let one = T::one();

    if alpha == one && beta == one {
        ctx.space.for_each_mut(ys, |i, yi| *yi += xs[i]);
    } else if beta == one {
        ctx.space.for_each_mut(ys, |i, yi| *yi += alpha * xs[i]);
    } else if beta == T::zero() {
        if alpha == one {
            ctx.space.for_each_mut(ys, |i, yi| *yi = xs[i]);
        } else {
            ctx.space.for_each_mut(ys, |i, yi| *yi = alpha * xs[i]);
        }
    } else if alpha == one {
        ctx.space.for_each_mut(ys, |i, yi| *yi = xs[i] + beta * *yi);
    } else {
        ctx.space
            .for_each_mut(ys, |i, yi| *yi = alpha * xs[i] + beta * *yi);
    }
}

/// Inner product `sum(conj(x[i]) * y[i])` over the owned entries of `x`,
/// summed across all partitions.
pub fn dot<T, E, C>(ctx: &ExecContext<E, C>, x: &DistVector<T>, y: &DistVector<T>) -> Result<T>
where
    T: Scalar,
    E: ExecutionSpace,
    C: Communicator,
{
    let n = x.local_size;
    ensure_len(n, y.coefs.len())?;
    let xs = &x.coefs[..n];
    let ys = &y.coefs[..n];
    let local = ctx.space.reduce_sum(n, |i| xs[i].conj() * ys[i]);
    Ok(global_sum(&ctx.comm, local))
}

/// Squared 2-norm of the owned entries, summed across all partitions.
pub fn dot_r2<T, E, C>(ctx: &ExecContext<E, C>, x: &DistVector<T>) -> T::Real
where
    T: Scalar,
    E: ExecutionSpace,
    C: Communicator,
{
    let xs = x.owned();
    let local = ctx.space.reduce_sum(xs.len(), |i| xs[i].norm_sqr());
    global_sum_real(&ctx.comm, local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::WorkGroup;
    use approx::assert_relative_eq;
    use num_complex::Complex64;

    fn v(values: &[f64]) -> DistVector<f64> {
        DistVector::from_vec(0, values.to_vec())
    }

    #[test]
    fn test_waxpby_general() {
        let ctx = ExecContext::serial();
        let x = v(&[1.0, 2.0, 3.0]);
        let y = v(&[4.0, 5.0, 6.0]);
        let mut w = DistVector::new(0, 3);

        waxpby(&ctx, 2.0, &x, 0.5, &y, &mut w).unwrap();

        // w = 2*x + 0.5*y = [2, 4, 6] + [2, 2.5, 3]
        assert_eq!(w.coefs, vec![4.0, 6.5, 9.0]);
    }

    #[test]
    fn test_waxpby_beta_zero_ignores_nan() {
        let ctx = ExecContext::serial();
        let x = v(&[1.0, 2.0]);
        let y = v(&[f64::NAN, f64::INFINITY]);
        let mut w = DistVector::new(0, 2);

        waxpby(&ctx, 3.0, &x, 0.0, &y, &mut w).unwrap();
        assert_eq!(w.coefs, vec![3.0, 6.0]);
    }

    #[test]
    fn test_waxpby_short_output_is_error() {
        let ctx = ExecContext::serial();
        let x = v(&[1.0, 2.0, 3.0]);
        let mut w = DistVector::new(0, 2);
        let err = waxpby(&ctx, 1.0, &x, 0.0, &x, &mut w).unwrap_err();
        assert!(err.is_dimension_error());
    }

    #[test]
    fn test_daxpby_cases() {
        let ctx = ExecContext::serial();
        let x = v(&[1.0, 2.0]);

        let mut y = v(&[1.0, 1.0]);
        daxpby(&ctx, 1.0, &x, 1.0, &mut y);
        assert_eq!(y.coefs, vec![2.0, 3.0]);

        daxpby(&ctx, -2.0, &x, 1.0, &mut y);
        assert_eq!(y.coefs, vec![0.0, -1.0]);

        daxpby(&ctx, 1.0, &x, 3.0, &mut y);
        assert_eq!(y.coefs, vec![1.0, -1.0]);

        daxpby(&ctx, 4.0, &x, 0.0, &mut y);
        assert_eq!(y.coefs, vec![4.0, 8.0]);

        daxpby(&ctx, 0.5, &x, 0.5, &mut y);
        assert_eq!(y.coefs, vec![2.5, 5.0]);
    }

    #[test]
    fn test_daxpby_beta_zero_overwrites_nan() {
        let ctx = ExecContext::serial();
        let x = v(&[1.0, 2.0]);
        let mut y = v(&[f64::NAN, f64::NAN]);
        daxpby(&ctx, 1.0, &x, 0.0, &mut y);
        assert_eq!(y.coefs, vec![1.0, 2.0]);
    }

    #[test]
    fn test_daxpby_leaves_externals() {
        let ctx = ExecContext::serial();
        let x = v(&[1.0, 1.0]);
        let mut p = DistVector::zeros_with_externals(0, 2, 4);
        p.coefs[3] = 9.0;
        daxpby(&ctx, 1.0, &x, 0.0, &mut p);
        assert_eq!(p.coefs, vec![1.0, 1.0, 0.0, 9.0]);
    }

    #[test]
    fn test_dot_real() {
        let ctx = ExecContext::serial();
        let x = v(&[1.0, 2.0, 3.0]);
        let y = v(&[4.0, 5.0, 6.0]);
        assert_relative_eq!(dot(&ctx, &x, &y).unwrap(), 32.0);
    }

    #[test]
    fn test_dot_complex_conjugates_first_argument() {
        let ctx = ExecContext::serial();
        let x = DistVector::from_vec(0, vec![Complex64::new(1.0, 2.0), Complex64::new(3.0, 4.0)]);
        let y = DistVector::from_vec(0, vec![Complex64::new(5.0, 6.0), Complex64::new(7.0, 8.0)]);

        let ip = dot(&ctx, &x, &y).unwrap();
        assert_relative_eq!(ip.re, 70.0, epsilon = 1e-10);
        assert_relative_eq!(ip.im, -8.0, epsilon = 1e-10);
        assert_relative_eq!(dot_r2(&ctx, &x), 30.0, epsilon = 1e-10);
    }

    #[test]
    fn test_dot_r2_work_group() {
        let ctx = ExecContext::new(WorkGroup::new(4, 8), crate::comm::SingleProcess);
        let x = v(&[3.0, 4.0]);
        assert_relative_eq!(dot_r2(&ctx, &x), 25.0);
    }

    #[test]
    fn test_dot_ignores_externals() {
        let ctx = ExecContext::serial();
        let mut p = DistVector::zeros_with_externals(0, 2, 3);
        p.coefs = vec![1.0, 2.0, 100.0];
        assert_relative_eq!(dot_r2(&ctx, &p), 5.0);
    }
}
