//! Iterative solvers for linear systems
//!
//! - [`cg_solve`]: Conjugate Gradient over partitioned vectors, for
//!   symmetric (Hermitian) positive definite operators

mod cg;

pub use cg::{CgConfig, CgReport, CgStatus, cg, cg_solve};
