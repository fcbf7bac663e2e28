//! Cell identifiers and the ordered cell set shared by all kernels of a dataset.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{KernelError, Result};

/// Opaque identifier of a single cell (observation name).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellId(String);

impl CellId {
    /// Create a new cell id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CellId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Ordered, fixed-size collection of cells.
///
/// Index position is the only addressing scheme matrices use, so two kernels
/// can only be combined when their cell sets agree in length and order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellSet {
    ids: Vec<CellId>,
}

impl CellSet {
    /// Create a cell set, rejecting duplicate ids.
    pub fn new(ids: Vec<CellId>) -> Result<Self> {
        let unique: BTreeSet<&CellId> = ids.iter().collect();
        if unique.len() != ids.len() {
            return Err(KernelError::InvalidInput(format!(
                "cell set contains {} duplicate id(s)",
                ids.len() - unique.len()
            )));
        }
        Ok(Self { ids })
    }

    /// Cell set with generated ids `cell_0 .. cell_{n-1}`.
    pub fn with_len(n: usize) -> Self {
        Self {
            ids: (0..n).map(|i| CellId::new(format!("cell_{i}"))).collect(),
        }
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Cell ids in matrix order.
    pub fn ids(&self) -> &[CellId] {
        &self.ids
    }

    /// Position of a cell.
    pub fn index_of(&self, id: &CellId) -> Option<usize> {
        self.ids.iter().position(|c| c == id)
    }
}

/// Check that two shared cell sets address matrices identically.
pub fn ensure_compatible(a: &Arc<CellSet>, b: &Arc<CellSet>) -> Result<()> {
    if Arc::ptr_eq(a, b) {
        return Ok(());
    }
    if a.len() != b.len() {
        return Err(KernelError::shape("cell count", a.len(), b.len()));
    }
    if let Some(i) = a.ids.iter().zip(&b.ids).position(|(x, y)| x != y) {
        return Err(KernelError::ShapeMismatch(format!(
            "cell ordering differs at position {i}: {} vs {}",
            a.ids[i], b.ids[i]
        )));
    }
    Ok(())
}
