//! Partitioned conjugate-gradient solver
//!
//! This crate solves `A x = b` for sparse symmetric positive definite
//! operators with the Conjugate Gradient method, the way the miniFE
//! mini-application does: rows are split into contiguous partitions, each
//! partition owns its share of every vector and reduces inner products
//! with the others.
//!
//! # Features
//!
//! - **Vector kernels**: `waxpby`, `daxpby`, `dot`, `dot_r2`
//! - **Execution spaces**: serial, rayon threads, emulated work-group launches
//! - **Partitions**: single process or one thread per partition
//! - **Sparse Matrices**: CSR and ELL with local column numbering
//! - **Generic Scalar Types**: Works with f64, f32, Complex64, Complex32
//!
//! # Example
//!
//! ```
//! use math_cg::{CgConfig, CsrMatrix, DistVector, ExecContext, cg};
//! use math_cg::comm::SingleProcess;
//!
//! let mut a = CsrMatrix::from_diagonal(&[2.0_f64, 2.0, 2.0]);
//! a.make_local_matrix(&SingleProcess)?;
//!
//! let b = DistVector::from_vec(0, vec![4.0, 4.0, 4.0]);
//! let mut x = DistVector::new(0, 3);
//! let report = cg(&ExecContext::serial(), &a, &b, &mut x, &CgConfig::default())?;
//!
//! assert!(report.converged());
//! assert_eq!(x.coefs, vec![2.0, 2.0, 2.0]);
//! # Ok::<(), math_cg::SolverError>(())
//! ```

pub mod comm;
pub mod error;
pub mod iterative;
pub mod parallel;
pub mod problem;
pub mod space;
pub mod sparse;
pub mod timer;
pub mod traits;
pub mod vector;
pub mod vector_ops;

pub use comm::{Communicator, PartitionAborted, SingleProcess, ThreadComm, run_partitioned};
pub use error::{Result, SolverError};
pub use iterative::{CgConfig, CgReport, CgStatus, cg, cg_solve};
#[cfg(feature = "rayon")]
pub use space::Threaded;
pub use space::{ExecContext, ExecutionSpace, Serial, WorkGroup};
pub use sparse::{CsrBuilder, CsrMatrix, EllMatrix};
pub use timer::{CgTimes, Clock, WallClock};
pub use traits::{Matvec, Scalar, SparseMatvec, SparseOperator};
pub use vector::DistVector;
pub use vector_ops::{daxpby, dot, dot_r2, waxpby};
