//! In-memory dataset store.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::CellStore;
use crate::types::{CellSet, CsrMatrix};

/// Error type for the in-memory store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryError {
    /// Matrix does not match the cell set.
    #[error("Matrix under {key:?} is {rows}x{cols}, expected {n}x{n}")]
    ShapeMismatch {
        /// Key being written.
        key: String,
        /// Rows of the rejected matrix.
        rows: usize,
        /// Columns of the rejected matrix.
        cols: usize,
        /// Number of cells.
        n: usize,
    },
}

/// In-memory store for a single dataset.
///
/// Uses BTreeMap for deterministic iteration order.
#[derive(Debug, Clone)]
pub struct InMemoryCellStore {
    cells: Arc<CellSet>,
    /// Cell-by-cell matrices by key.
    pairwise: BTreeMap<String, Arc<CsrMatrix>>,
    /// Metadata documents by key.
    metadata: BTreeMap<String, Value>,
}

impl InMemoryCellStore {
    /// Create an empty store over a cell set.
    pub fn new(cells: CellSet) -> Self {
        Self::from_shared(Arc::new(cells))
    }

    /// Create an empty store over an already shared cell set.
    pub fn from_shared(cells: Arc<CellSet>) -> Self {
        Self {
            cells,
            pairwise: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Builder-style insert of a pairwise matrix.
    pub fn with_pairwise(mut self, key: &str, matrix: CsrMatrix) -> Result<Self, InMemoryError> {
        self.set_pairwise(key, matrix)?;
        Ok(self)
    }

    /// Insert a pairwise matrix without checking its shape.
    ///
    /// Lets callers model datasets that were written by other tools.
    pub fn insert_unchecked(&mut self, key: &str, matrix: CsrMatrix) {
        self.pairwise.insert(key.to_string(), Arc::new(matrix));
    }

    /// Remove a pairwise matrix.
    pub fn remove_pairwise(&mut self, key: &str) -> Option<Arc<CsrMatrix>> {
        self.pairwise.remove(key)
    }

    /// Keys of all pairwise matrices.
    pub fn pairwise_keys(&self) -> Vec<&str> {
        self.pairwise.keys().map(String::as_str).collect()
    }

    /// Keys of all metadata documents.
    pub fn metadata_keys(&self) -> Vec<&str> {
        self.metadata.keys().map(String::as_str).collect()
    }
}

impl CellStore for InMemoryCellStore {
    type Error = InMemoryError;

    fn cells(&self) -> Arc<CellSet> {
        Arc::clone(&self.cells)
    }

    fn pairwise(&self, key: &str) -> Result<Option<Arc<CsrMatrix>>, Self::Error> {
        Ok(self.pairwise.get(key).cloned())
    }

    fn set_pairwise(&mut self, key: &str, matrix: CsrMatrix) -> Result<(), Self::Error> {
        let n = self.cells.len();
        if matrix.shape() != (n, n) {
            return Err(InMemoryError::ShapeMismatch {
                key: key.to_string(),
                rows: matrix.n_rows(),
                cols: matrix.n_cols(),
                n,
            });
        }
        self.pairwise.insert(key.to_string(), Arc::new(matrix));
        Ok(())
    }

    fn metadata(&self, key: &str) -> Result<Option<Value>, Self::Error> {
        Ok(self.metadata.get(key).cloned())
    }

    fn set_metadata(&mut self, key: &str, value: Value) -> Result<(), Self::Error> {
        self.metadata.insert(key.to_string(), value);
        Ok(())
    }
}
