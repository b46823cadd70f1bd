//! CG (Conjugate Gradient) solver
//!
//! The Conjugate Gradient method for symmetric (Hermitian) positive definite
//! systems, run over partitioned vectors with per-kernel timing and
//! breakdown detection.
//!
//! By default the iteration count is fixed: the loop runs `max_iterations`
//! times so timings are comparable between runs. Set
//! [`CgConfig::stop_on_convergence`] to leave as soon as the residual norm
//! reaches the tolerance.

use crate::comm::Communicator;
use crate::error::{Result, SolverError};
use crate::space::{ExecContext, ExecutionSpace};
use crate::timer::{CgTimes, Clock, WallClock, timed};
use crate::traits::{Matvec, Scalar, SparseMatvec, SparseOperator};
use crate::vector::DistVector;
use crate::vector_ops::{daxpby, dot, dot_r2, waxpby};
use num_traits::{Float, FromPrimitive, One, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// CG solver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CgConfig {
    /// Number of iterations to run
    pub max_iterations: usize,
    /// Residual norm regarded as converged
    pub tolerance: f64,
    /// Report progress every N iterations (`None` = max(1, min(50, max/10)), 0 = no output)
    pub print_interval: Option<usize>,
    /// Leave the loop once the residual norm is below `tolerance`
    pub stop_on_convergence: bool,
}

impl Default for CgConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 0.0,
            print_interval: None,
            stop_on_convergence: false,
        }
    }
}

impl CgConfig {
    /// Load a configuration from a JSON file; missing fields take defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Iterations between progress lines, `None` when progress is disabled
    pub fn print_frequency(&self) -> Option<usize> {
        match self.print_interval {
            Some(0) => None,
            Some(n) => Some(n),
            None => Some((self.max_iterations / 10).clamp(1, 50)),
        }
    }
}

/// How a solve ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CgStatus {
    /// Final residual norm is at or below the tolerance
    Converged,
    /// All iterations ran without reaching the tolerance
    MaxIterations,
    /// The search direction degenerated at this iteration; `x` holds the
    /// iterate from before it
    Breakdown {
        /// Iteration at which breakdown was detected
        iteration: usize,
    },
}

/// CG solver result
#[derive(Debug, Clone, Serialize)]
pub struct CgReport<R> {
    /// Iterations whose updates were applied to `x`
    pub iterations: usize,
    /// Final residual 2-norm
    pub residual: R,
    /// How the solve ended
    pub status: CgStatus,
    /// Time spent per kernel category
    pub times: CgTimes,
}

impl<R> CgReport<R> {
    /// Whether the solve reached the tolerance
    pub fn converged(&self) -> bool {
        self.status == CgStatus::Converged
    }

    /// Whether the solve stopped on numerical breakdown
    pub fn broke_down(&self) -> bool {
        matches!(self.status, CgStatus::Breakdown { .. })
    }
}

/// Whether `inner = <v, w>` is numerically zero relative to the vector norms:
/// `|inner| <= 100 * ||v|| * ||w|| * epsilon`.
fn breakdown<T, E, C>(
    ctx: &ExecContext<E, C>,
    inner: T::Real,
    v: &DistVector<T>,
    w: &DistVector<T>,
) -> bool
where
    T: Scalar,
    E: ExecutionSpace,
    C: Communicator,
{
    let vnorm = dot_r2(ctx, v).sqrt();
    let wnorm = dot_r2(ctx, w).sqrt();
    let hundred = T::Real::from_f64(100.0).unwrap_or_else(T::Real::one);
    inner.abs() <= hundred * vnorm * wnorm * T::Real::epsilon()
}

fn as_f64<R: ToPrimitive>(r: R) -> f64 {
    r.to_f64().unwrap_or(f64::NAN)
}

/// Solve `A x = b` with the default matvec and a wall clock.
pub fn cg<T, A, E, C>(
    ctx: &ExecContext<E, C>,
    a: &A,
    b: &DistVector<T>,
    x: &mut DistVector<T>,
    config: &CgConfig,
) -> Result<CgReport<T::Real>>
where
    T: Scalar,
    A: SparseOperator<T>,
    E: ExecutionSpace,
    C: Communicator,
{
    cg_solve(ctx, a, b, x, &SparseMatvec, config, &WallClock::new())
}

/// Solve `A x = b` in place, starting from the current `x`.
///
/// `a` must have been prepared with `make_local_matrix`; otherwise the call
/// fails with [`SolverError::NotLocallyIndexed`] before iterating. A
/// breakdown is not an error: the report carries
/// [`CgStatus::Breakdown`] and `x` keeps the last completed iterate.
/// Every partition of `ctx.comm` must call this with its own share of the
/// same system.
pub fn cg_solve<T, A, M, E, C, K>(
    ctx: &ExecContext<E, C>,
    a: &A,
    b: &DistVector<T>,
    x: &mut DistVector<T>,
    matvec: &M,
    config: &CgConfig,
    clock: &K,
) -> Result<CgReport<T::Real>>
where
    T: Scalar,
    A: SparseOperator<T>,
    M: Matvec<T, A>,
    E: ExecutionSpace,
    C: Communicator,
    K: Clock + ?Sized,
{
    let total_start = clock.seconds();
    let mut times = CgTimes::default();
    let root = ctx.is_root();

    if !a.has_local_indices() {
        log::error!(
            "cg_solve: operator has no local indices; make_local_matrix was not called before cg_solve"
        );
        return Err(SolverError::NotLocallyIndexed);
    }

    let nrows = a.local_rows();
    let ncols = a.local_cols();
    for len in [b.local_size, x.local_size] {
        if len != nrows {
            return Err(SolverError::DimensionMismatch {
                expected: nrows,
                got: len,
            });
        }
    }
    log::debug!(
        "cg_solve: rank {} of {}, {} rows, {} cols, space {}",
        ctx.comm.rank(),
        ctx.comm.size(),
        nrows,
        ncols,
        ctx.space.describe()
    );

    let mut r = DistVector::new(b.start_index, nrows);
    let mut p = DistVector::zeros_with_externals(b.start_index, nrows, ncols);
    let mut ap = DistVector::new(b.start_index, nrows);

    let one = T::one();
    let zero = T::zero();
    let real_zero = T::Real::zero();
    let tenth = T::Real::from_f64(0.1).unwrap_or_else(T::Real::epsilon);
    let tolerance = T::Real::from_f64(config.tolerance).unwrap_or(real_zero);
    let max_iter = config.max_iterations;
    let print_freq = config.print_frequency();

    // r = b - A x
    timed(clock, &mut times.waxpby, || {
        waxpby(ctx, one, &*x, zero, &*x, &mut p)
    })?;
    timed(clock, &mut times.matvec, || {
        matvec.multiply(ctx, a, &mut p, &mut ap)
    })?;
    timed(clock, &mut times.waxpby, || {
        waxpby(ctx, one, b, -one, &ap, &mut r)
    })?;

    let mut rtrans = timed(clock, &mut times.dot, || dot_r2(ctx, &r));
    let mut oldrtrans = T::Real::one();
    let mut normr = rtrans.sqrt();

    if root {
        log::info!("Initial Residual = {:e}", as_f64(normr));
    }

    let mut brkdown_tol = T::Real::epsilon();
    let mut num_iters = 0;
    let mut broke_down_at = None;

    for k in 1..=max_iter {
        if rtrans == real_zero {
            break;
        }

        if k == 1 {
            timed(clock, &mut times.waxpby, || daxpby(ctx, one, &r, zero, &mut p));
        } else {
            let beta = T::from_real(rtrans / oldrtrans);
            timed(clock, &mut times.waxpby, || daxpby(ctx, one, &r, beta, &mut p));
        }

        timed(clock, &mut times.matvec, || {
            matvec.multiply(ctx, a, &mut p, &mut ap)
        })?;
        let p_ap_dot = timed(clock, &mut times.dot, || dot(ctx, &ap, &p))?.re();

        if p_ap_dot < brkdown_tol {
            let degenerate = p_ap_dot < real_zero
                || timed(clock, &mut times.dot, || breakdown(ctx, p_ap_dot, &ap, &p));
            if degenerate {
                log::error!(
                    "cg_solve: numerical breakdown at iteration {} (p.Ap = {:e})",
                    k,
                    as_f64(p_ap_dot)
                );
                broke_down_at = Some(k);
                break;
            }
            brkdown_tol = tenth * p_ap_dot;
        }

        let alpha = T::from_real(rtrans / p_ap_dot);
        timed(clock, &mut times.waxpby, || {
            daxpby(ctx, alpha, &p, one, &mut *x);
            daxpby(ctx, -alpha, &ap, one, &mut r);
        });

        oldrtrans = rtrans;
        rtrans = timed(clock, &mut times.dot, || dot_r2(ctx, &r));
        normr = rtrans.sqrt();
        num_iters = k;

        if root && print_freq.is_some_and(|freq| k % freq == 0 || k == max_iter) {
            log::info!("Iteration = {}   Residual = {:e}", k, as_f64(normr));
        }

        if config.stop_on_convergence && normr <= tolerance {
            break;
        }
    }

    times.total = clock.seconds() - total_start;

    if root {
        log::info!("  TOTAL    MATVEC   DOT   WAXPY");
        log::info!(
            "  {:.6}  {:.6}  {:.6}  {:.6}",
            times.total,
            times.matvec,
            times.dot,
            times.waxpby
        );
    }

    let status = match broke_down_at {
        Some(iteration) => CgStatus::Breakdown { iteration },
        None if normr <= tolerance => CgStatus::Converged,
        None => CgStatus::MaxIterations,
    };

    Ok(CgReport {
        iterations: num_iters,
        residual: normr,
        status,
        times,
    })
}
