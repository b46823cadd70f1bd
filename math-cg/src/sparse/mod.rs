//! Sparse matrix storage formats
//!
//! Two formats implement [`crate::traits::SparseOperator`]:
//! - [`CsrMatrix`]: compressed sparse rows
//! - [`EllMatrix`]: fixed-width rows, the layout accelerator kernels prefer
//!
//! Both start with global column indices and must be converted with
//! `make_local_matrix` before they can be used by the CG driver.

mod csr;
mod ell;
mod local;

pub use csr::{CsrBuilder, CsrMatrix};
pub use ell::EllMatrix;
pub use local::ExternalMap;
