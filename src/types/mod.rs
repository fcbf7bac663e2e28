//! Core value types: cells, sparse matrices and parameter fingerprints.

pub mod cell;
pub mod matrix;
pub mod cell_matrix;
pub mod params;

pub use cell::{CellId, CellSet, ensure_compatible};
pub use matrix::CsrMatrix;
pub use cell_matrix::{CellMatrix, MatrixKind};
pub use params::{KernelParams, ParamsFingerprint};
