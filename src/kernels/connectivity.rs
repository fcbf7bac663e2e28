//! Connectivity kernel: density-corrected symmetric diffusion.
//!
//! Turns a symmetric cell-cell similarity graph (transcriptomic KNN
//! connectivities, spatial neighbors, ...) into a transition matrix.
//!
//! ## Algorithm
//!
//! 1. With density normalization, degrees `d_i = sum_j A_ij` rescale the
//!    affinities to `A'_ij = A_ij / (d_i * d_j)`, down-weighting cells in
//!    densely sampled regions. Without it, `A' = A`.
//! 2. Row-normalize `A'`. Rows summing to zero stay all-zero (isolated cells).
//!
//! The result is row-stochastic but, after row normalization, generally not
//! symmetric. No position that is zero in `A` becomes nonzero.

use serde::Serialize;
use std::any::Any;
use std::sync::Arc;

use super::base::{read_input, KernelCore};
use super::{Kernel, WeightedKernel};
use crate::config::KernelConfig;
use crate::error::Result;
use crate::store::CellStore;
use crate::types::{CellSet, CsrMatrix, KernelParams};

/// Kernel name used in fingerprints and persisted metadata.
pub const CONNECTIVITY_KERNEL_NAME: &str = "connectivity";

/// Largest entry difference `|A_ij - A_ji|` still treated as symmetric.
const SYMMETRY_TOL: f64 = 1e-8;

#[derive(Serialize)]
struct ConnectivityParams<'a> {
    dnorm: bool,
    key: &'a str,
}

/// Density-corrected transition matrix of a symmetric affinity matrix.
pub fn density_corrected_transition(affinity: &CsrMatrix, density_normalize: bool) -> Result<CsrMatrix> {
    if !density_normalize {
        return Ok(affinity.row_normalize());
    }

    let inv_degree: Vec<f64> = affinity
        .row_sums()
        .into_iter()
        .map(|d| if d > 0.0 { 1.0 / d } else { 0.0 })
        .collect();

    // A zero degree only pairs with stored entries when the input is not
    // symmetric; those entries are zeroed rather than divided by zero.
    let corrected = affinity.scale_rows(&inv_degree)?.scale_cols(&inv_degree)?;
    Ok(corrected.row_normalize())
}

/// Kernel over a symmetric similarity graph.
///
/// The transition matrix cannot tell direction of a biological process on
/// its own; combine with a directed kernel for that.
#[derive(Debug, Clone)]
pub struct ConnectivityKernel {
    core: KernelCore,
    key: String,
    conn: Arc<CsrMatrix>,
}

impl ConnectivityKernel {
    /// Bind to the matrix under `config.conn_key` in `store`.
    ///
    /// Fails with `MissingInput` when the key is absent and `ShapeMismatch`
    /// when the matrix is not `N x N` for the store's `N` cells.
    pub fn new<S: CellStore>(store: &S, config: &KernelConfig) -> Result<Self> {
        let conn = read_input(store, &config.conn_key)?;
        Self::from_parts(store.cells(), conn, config)
    }

    /// Bind to an already loaded matrix.
    pub fn from_parts(cells: Arc<CellSet>, conn: Arc<CsrMatrix>, config: &KernelConfig) -> Result<Self> {
        let n = cells.len();
        if conn.shape() != (n, n) {
            let (r, c) = conn.shape();
            return Err(crate::KernelError::ShapeMismatch(format!(
                "connectivities are {r}x{c}, expected {n}x{n}"
            )));
        }
        conn.validate_non_negative()?;
        if !conn.is_symmetric(SYMMETRY_TOL) {
            tracing::warn!(
                key = %config.conn_key,
                "connectivities are not symmetric; edges are used in their stored direction"
            );
        }

        let conn = if config.copy_input {
            Arc::new(CsrMatrix::clone(&conn))
        } else {
            conn
        };

        let mut kernel = Self {
            core: KernelCore::new(cells, config.backward),
            key: config.conn_key.clone(),
            conn,
        };
        if config.check_connectivity {
            kernel.check_connectivity()?;
        }
        Ok(kernel)
    }

    /// The raw connectivities this kernel reads.
    pub fn connectivities(&self) -> &Arc<CsrMatrix> {
        &self.conn
    }

    /// Compute the transition matrix, reusing the cache when
    /// `density_normalize` matches the previous call.
    ///
    /// `true` is the usual choice for KNN graphs.
    pub fn compute_transition_matrix(&mut self, density_normalize: bool) -> Result<&mut Self> {
        let params = KernelParams::from_serialize(&ConnectivityParams {
            dnorm: density_normalize,
            key: &self.key,
        })?;

        let conn = &self.conn;
        self.core.compute_cached(CONNECTIVITY_KERNEL_NAME, params, || {
            density_corrected_transition(conn, density_normalize)
        })?;
        Ok(self)
    }
}

impl Kernel for ConnectivityKernel {
    fn name(&self) -> &'static str {
        CONNECTIVITY_KERNEL_NAME
    }

    fn key(&self) -> String {
        self.key.clone()
    }

    fn core(&self) -> &KernelCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut KernelCore {
        &mut self.core
    }

    fn clone_boxed(&self) -> Box<dyn Kernel> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn connectivity_graph(&self) -> Result<&CsrMatrix> {
        Ok(&self.conn)
    }

    fn into_terms(self: Box<Self>) -> Vec<WeightedKernel> {
        vec![WeightedKernel::boxed(self, 1.0)]
    }
}
