//! Square matrix bound to the ordered cell set it is indexed by.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::cell::CellSet;
use super::matrix::CsrMatrix;
use crate::error::{KernelError, Result};

/// Relationship a cell matrix encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixKind {
    /// Undirected similarity (e.g. KNN connectivities).
    Symmetric,
    /// Directed, forward in time.
    Forward,
    /// Directed, reversed time.
    Backward,
}

impl MatrixKind {
    /// Directed kind for a `backward` flag.
    pub fn directed(backward: bool) -> Self {
        if backward {
            Self::Backward
        } else {
            Self::Forward
        }
    }

    /// Short tag used in output keys.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Symmetric => "sym",
            Self::Forward => "fwd",
            Self::Backward => "bwd",
        }
    }
}

impl fmt::Display for MatrixKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symmetric => write!(f, "symmetric"),
            Self::Forward => write!(f, "forward"),
            Self::Backward => write!(f, "backward"),
        }
    }
}

/// A square sparse matrix over a fixed, ordered set of cells.
///
/// This is what a Markov-chain estimator consumes: the transition matrix
/// together with the cell ordering its rows and columns follow.
#[derive(Debug, Clone, PartialEq)]
pub struct CellMatrix {
    cells: Arc<CellSet>,
    matrix: CsrMatrix,
    kind: MatrixKind,
}

impl CellMatrix {
    /// Bind a matrix to a cell set. The matrix must be `N x N` for `N` cells.
    pub fn new(cells: Arc<CellSet>, matrix: CsrMatrix, kind: MatrixKind) -> Result<Self> {
        if !matrix.is_square() {
            let (r, c) = matrix.shape();
            return Err(KernelError::ShapeMismatch(format!("matrix is {r}x{c}, expected square")));
        }
        if matrix.n_rows() != cells.len() {
            return Err(KernelError::shape("matrix dimension vs. cell count", cells.len(), matrix.n_rows()));
        }
        Ok(Self { cells, matrix, kind })
    }

    /// Cell ordering of rows and columns.
    pub fn cells(&self) -> &Arc<CellSet> {
        &self.cells
    }

    /// Underlying sparse matrix.
    pub fn matrix(&self) -> &CsrMatrix {
        &self.matrix
    }

    /// Relationship encoded by the matrix.
    pub fn kind(&self) -> MatrixKind {
        self.kind
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether there are no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Rows with no outgoing mass (terminal or isolated cells).
    pub fn zero_rows(&self) -> Vec<usize> {
        self.matrix
            .row_sums()
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == 0.0)
            .map(|(i, _)| i)
            .collect()
    }

    /// Whether every row sums to 1 (within `tol`) or is all-zero.
    pub fn is_row_stochastic(&self, tol: f64) -> bool {
        self.matrix.values().iter().all(|v| *v >= 0.0)
            && self
                .matrix
                .row_sums()
                .iter()
                .all(|s| *s == 0.0 || (s - 1.0).abs() <= tol)
    }
}
