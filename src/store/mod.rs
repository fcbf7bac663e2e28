//! Dataset collaborator backends.
//!
//! A store holds the ordered cell set of one dataset plus named cell-by-cell
//! matrices (`pairwise`) and JSON metadata. Kernels read their raw input from
//! a store and can write their transition matrix back into one.

pub mod memory;

use serde_json::Value;
use std::sync::Arc;

use crate::types::{CellSet, CsrMatrix};

/// Trait for dataset storage backends.
///
/// Implementations hand out shared, read-only matrices; nothing reading
/// through this trait may mutate a stored matrix in place.
pub trait CellStore {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync;

    /// Ordered cells of the dataset.
    fn cells(&self) -> Arc<CellSet>;

    /// Fetch a cell-by-cell matrix by key.
    fn pairwise(&self, key: &str) -> Result<Option<Arc<CsrMatrix>>, Self::Error>;

    /// Insert or replace a cell-by-cell matrix.
    fn set_pairwise(&mut self, key: &str, matrix: CsrMatrix) -> Result<(), Self::Error>;

    /// Fetch a metadata document by key.
    fn metadata(&self, key: &str) -> Result<Option<Value>, Self::Error>;

    /// Insert or replace a metadata document.
    fn set_metadata(&mut self, key: &str, value: Value) -> Result<(), Self::Error>;
}

pub use memory::{InMemoryCellStore, InMemoryError};
