//! Problem construction: the sparse operator and the vectors that make up
//! one instance of the benchmark's synthetic linear system.

pub mod generator;
pub mod matrix;

pub use generator::{generate_problem, GeneratedProblem};
pub use matrix::SparseMatrix;
