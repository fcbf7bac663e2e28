//! Compressed sparse row matrix used for affinities and transition matrices.
//!
//! ## Invariants
//!
//! 1. `indptr.len() == n_rows + 1`, `indptr[0] == 0`, non-decreasing
//! 2. Column indices within a row are strictly increasing and `< n_cols`
//! 3. `indices.len() == values.len() == indptr[n_rows]`
//!
//! All transformations return a new matrix; inputs are never mutated in place.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

/// Sparse `f64` matrix in CSR layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    n_rows: usize,
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// All-zero matrix with no stored entries.
    pub fn zeros(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            indptr: vec![0; n_rows + 1],
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Square identity matrix.
    pub fn identity(n: usize) -> Self {
        Self {
            n_rows: n,
            n_cols: n,
            indptr: (0..=n).collect(),
            indices: (0..n).collect(),
            values: vec![1.0; n],
        }
    }

    /// Build from `(row, col, value)` triplets. Duplicate positions are summed.
    pub fn from_triplets(n_rows: usize, n_cols: usize, triplets: &[(usize, usize, f64)]) -> Result<Self> {
        if let Some(&(i, j, _)) = triplets.iter().find(|(i, j, _)| *i >= n_rows || *j >= n_cols) {
            return Err(KernelError::InvalidInput(format!(
                "entry ({i}, {j}) out of bounds for {n_rows}x{n_cols} matrix"
            )));
        }

        let mut sorted: Vec<(usize, usize, f64)> = triplets.to_vec();
        sorted.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut indptr = vec![0usize; n_rows + 1];
        let mut indices: Vec<usize> = Vec::with_capacity(sorted.len());
        let mut values: Vec<f64> = Vec::with_capacity(sorted.len());
        let mut last: Option<(usize, usize)> = None;

        for (i, j, v) in sorted {
            if last == Some((i, j)) {
                if let Some(tail) = values.last_mut() {
                    *tail += v;
                }
                continue;
            }
            indices.push(j);
            values.push(v);
            indptr[i + 1] += 1;
            last = Some((i, j));
        }
        for i in 0..n_rows {
            indptr[i + 1] += indptr[i];
        }

        Ok(Self { n_rows, n_cols, indptr, indices, values })
    }

    /// Build from dense rows; exact zeros are not stored.
    pub fn from_dense(rows: &[Vec<f64>]) -> Result<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some((i, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_cols) {
            return Err(KernelError::ShapeMismatch(format!(
                "row {i} has {} columns, expected {n_cols}",
                r.len()
            )));
        }

        let mut indptr = Vec::with_capacity(n_rows + 1);
        let mut indices = Vec::new();
        let mut values = Vec::new();
        indptr.push(0);
        for row in rows {
            for (j, &v) in row.iter().enumerate() {
                if v != 0.0 {
                    indices.push(j);
                    values.push(v);
                }
            }
            indptr.push(indices.len());
        }

        Ok(Self { n_rows, n_cols, indptr, indices, values })
    }

    /// Build from raw CSR buffers, validating every structural invariant.
    pub fn try_from_parts(
        n_rows: usize,
        n_cols: usize,
        indptr: Vec<usize>,
        indices: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self> {
        if indptr.len() != n_rows + 1 {
            return Err(KernelError::shape("indptr length", n_rows + 1, indptr.len()));
        }
        if indptr[0] != 0 {
            return Err(KernelError::InvalidInput("indptr must start at 0".to_string()));
        }
        if indices.len() != values.len() || indptr[n_rows] != indices.len() {
            return Err(KernelError::InvalidInput(format!(
                "indptr ends at {} but {} indices and {} values were given",
                indptr[n_rows],
                indices.len(),
                values.len()
            )));
        }
        for i in 0..n_rows {
            let (start, end) = (indptr[i], indptr[i + 1]);
            if start > end {
                return Err(KernelError::InvalidInput(format!("indptr decreases at row {i}")));
            }
            let cols = &indices[start..end];
            if cols.windows(2).any(|w| w[0] >= w[1]) {
                return Err(KernelError::InvalidInput(format!(
                    "column indices of row {i} are not strictly increasing"
                )));
            }
            if let Some(&j) = cols.last() {
                if j >= n_cols {
                    return Err(KernelError::InvalidInput(format!(
                        "column {j} out of bounds in row {i} ({n_cols} columns)"
                    )));
                }
            }
        }

        Ok(Self { n_rows, n_cols, indptr, indices, values })
    }

    /// `(n_rows, n_cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Whether the matrix is square.
    pub fn is_square(&self) -> bool {
        self.n_rows == self.n_cols
    }

    /// Row pointer buffer.
    pub fn indptr(&self) -> &[usize] {
        &self.indptr
    }

    /// Column index buffer.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Value buffer.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Stored entries `(col, value)` of row `i`.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.indptr[i]..self.indptr[i + 1];
        self.indices[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// All stored entries as `(row, col, value)`.
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.n_rows).flat_map(move |i| self.row(i).map(move |(j, v)| (i, j, v)))
    }

    /// Value at `(i, j)`; zero when not stored.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        if i >= self.n_rows {
            return 0.0;
        }
        let range = self.indptr[i]..self.indptr[i + 1];
        match self.indices[range.clone()].binary_search(&j) {
            Ok(pos) => self.values[range.start + pos],
            Err(_) => 0.0,
        }
    }

    /// Sum of each row.
    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.n_rows).map(|i| self.row(i).map(|(_, v)| v).sum()).collect()
    }

    /// Sum of each column.
    pub fn col_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.n_cols];
        for (&j, &v) in self.indices.iter().zip(&self.values) {
            sums[j] += v;
        }
        sums
    }

    /// New matrix with row `i` multiplied by `factors[i]`.
    pub fn scale_rows(&self, factors: &[f64]) -> Result<Self> {
        if factors.len() != self.n_rows {
            return Err(KernelError::shape("row factor count", self.n_rows, factors.len()));
        }
        let mut out = self.clone();
        for (i, &f) in factors.iter().enumerate() {
            for v in &mut out.values[self.indptr[i]..self.indptr[i + 1]] {
                *v *= f;
            }
        }
        Ok(out)
    }

    /// New matrix with column `j` multiplied by `factors[j]`.
    pub fn scale_cols(&self, factors: &[f64]) -> Result<Self> {
        if factors.len() != self.n_cols {
            return Err(KernelError::shape("column factor count", self.n_cols, factors.len()));
        }
        let mut out = self.clone();
        for (v, &j) in out.values.iter_mut().zip(&self.indices) {
            *v *= factors[j];
        }
        Ok(out)
    }

    /// Divide each row by its sum. Rows summing to zero stay all-zero.
    pub fn row_normalize(&self) -> Self {
        let factors: Vec<f64> = self
            .row_sums()
            .into_iter()
            .map(|s| if s > 0.0 { 1.0 / s } else { 1.0 })
            .collect();
        let mut out = self.clone();
        for (i, f) in factors.into_iter().enumerate() {
            for v in &mut out.values[self.indptr[i]..self.indptr[i + 1]] {
                *v *= f;
            }
        }
        out
    }

    /// Transposed copy.
    pub fn transpose(&self) -> Self {
        let mut indptr = vec![0usize; self.n_cols + 1];
        for &j in &self.indices {
            indptr[j + 1] += 1;
        }
        for j in 0..self.n_cols {
            indptr[j + 1] += indptr[j];
        }

        let mut next = indptr.clone();
        let mut indices = vec![0usize; self.nnz()];
        let mut values = vec![0.0; self.nnz()];
        // Rows are visited in order, so each output row receives increasing columns.
        for (i, j, v) in self.triplets() {
            let dst = next[j];
            indices[dst] = i;
            values[dst] = v;
            next[j] += 1;
        }

        Self {
            n_rows: self.n_cols,
            n_cols: self.n_rows,
            indptr,
            indices,
            values,
        }
    }

    /// Dense copy. Allocates `n_rows * n_cols` floats.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.n_rows, self.n_cols);
        for (i, j, v) in self.triplets() {
            dense[(i, j)] = v;
        }
        dense
    }

    /// `sum_k weight_k * M_k` over equally shaped matrices.
    ///
    /// Terms with zero weight contribute no stored positions.
    pub fn linear_combination(terms: &[(&CsrMatrix, f64)]) -> Result<Self> {
        let Some(&(first, _)) = terms.first() else {
            return Err(KernelError::EmptyCombination);
        };
        let (n_rows, n_cols) = first.shape();
        for (m, _) in terms {
            if m.shape() != (n_rows, n_cols) {
                return Err(KernelError::ShapeMismatch(format!(
                    "cannot add {}x{} matrix to {n_rows}x{n_cols} matrix",
                    m.n_rows, m.n_cols
                )));
            }
        }

        let mut acc = vec![0.0; n_cols];
        let mut seen = vec![usize::MAX; n_cols];
        let mut cols: Vec<usize> = Vec::new();
        let mut indptr = Vec::with_capacity(n_rows + 1);
        let mut indices = Vec::new();
        let mut values = Vec::new();
        indptr.push(0);

        for i in 0..n_rows {
            cols.clear();
            for &(m, w) in terms {
                if w == 0.0 {
                    continue;
                }
                for (j, v) in m.row(i) {
                    if seen[j] != i {
                        seen[j] = i;
                        acc[j] = 0.0;
                        cols.push(j);
                    }
                    acc[j] += w * v;
                }
            }
            cols.sort_unstable();
            for &j in &cols {
                indices.push(j);
                values.push(acc[j]);
            }
            indptr.push(indices.len());
        }

        Ok(Self { n_rows, n_cols, indptr, indices, values })
    }

    /// Whether `|M_ij - M_ji| <= tol` for every stored entry.
    pub fn is_symmetric(&self, tol: f64) -> bool {
        self.is_square() && self.triplets().all(|(i, j, v)| (v - self.get(j, i)).abs() <= tol)
    }

    /// Reject negative or non-finite entries.
    pub fn validate_non_negative(&self) -> Result<()> {
        match self.triplets().find(|(_, _, v)| !v.is_finite() || *v < 0.0) {
            Some((i, j, v)) => Err(KernelError::InvalidInput(format!(
                "entry ({i}, {j}) = {v} is negative or not finite"
            ))),
            None => Ok(()),
        }
    }
}
