//! Phase timing for the CG driver

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Source of monotonically non-decreasing time in seconds.
pub trait Clock {
    /// Seconds since an arbitrary fixed origin
    fn seconds(&self) -> f64;
}

/// Wall clock measured from its creation.
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    origin: Instant,
}

impl WallClock {
    /// Clock whose origin is now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for WallClock {
    fn seconds(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Seconds spent in each kernel category of one solve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CgTimes {
    /// Whole solve call
    pub total: f64,
    /// Matrix-vector products (external exchange included)
    pub matvec: f64,
    /// Inner products and norms (global reductions included)
    pub dot: f64,
    /// Scaled vector additions
    pub waxpby: f64,
}

/// Run `f` and add its elapsed time to `acc`.
pub fn timed<C, R, F>(clock: &C, acc: &mut f64, f: F) -> R
where
    C: Clock + ?Sized,
    F: FnOnce() -> R,
{
    let t0 = clock.seconds();
    let result = f();
    *acc += clock.seconds() - t0;
    result
}
