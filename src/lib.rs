//! hpcg-bench - a native Rust distributed-memory CG/multigrid benchmark
//!
//! Measures sustained floating-point throughput and memory bandwidth by
//! solving a synthetic 27-point-stencil sparse linear system with
//! preconditioned Conjugate Gradient, the preconditioner being a 4-level
//! geometric multigrid V-cycle smoothed by symmetric Gauss-Seidel.
//! "Participants" (HPCG's MPI ranks) are realized as an in-process
//! [`transport::Transport`] rather than system MPI, so the whole benchmark
//! runs as a single OS process.
//!
//! ## Example
//! ```rust
//! use hpcg_bench::prelude::*;
//!
//! let geometry = Geometry::new(0, 1, 16, 16, 16, None).unwrap();
//! let transports = make_local_transports(1);
//! let mut hierarchy = MultigridBuilder::build(&geometry, transports[0].as_ref()).unwrap();
//! let problem = generate_problem(&geometry);
//!
//! let mut x = problem.x0.clone();
//! let mut timers = PhaseTimers::new();
//! let result = cg(
//!     &mut hierarchy,
//!     transports[0].as_ref(),
//!     &problem.b,
//!     &mut x,
//!     50,
//!     1e-9,
//!     true,
//!     &mut timers,
//! )
//! .unwrap();
//! assert!(result.converged);
//! ```

pub mod cg;
pub mod config;
pub mod error;
pub mod geometry;
pub mod halo;
pub mod kernels;
pub mod multigrid;
pub mod problem;
pub mod report;
pub mod timers;
pub mod transport;
pub mod validator;

// Re-export common types
pub mod prelude {
    pub use crate::cg::{cg, CgResult};
    pub use crate::config::RunConfig;
    pub use crate::error::{HpcgError, HpcgResult};
    pub use crate::geometry::{Geometry, PencilParams};
    pub use crate::halo::{build_halo_plan, exchange_halo, HaloPlan};
    pub use crate::kernels::color::Coloring;
    pub use crate::multigrid::{mgv_cycle, Hierarchy, MgLevel, MultigridBuilder};
    pub use crate::problem::{generate_problem, GeneratedProblem, SparseMatrix};
    pub use crate::report::Report;
    pub use crate::timers::{Phase, PhaseTimers};
    pub use crate::transport::{make_local_transports, run_participants, LocalTransport, Transport};
}
