//! Kernel over a transition matrix computed elsewhere.
//!
//! Wraps any non-negative `N x N` matrix already present in the dataset
//! (e.g. a velocity or pseudotime transition matrix) so that it can take
//! part in combinations. The matrix is row-normalized on compute; with
//! `backward` set it is transposed first, reversing every edge.

use serde::Serialize;
use std::any::Any;
use std::sync::Arc;

use super::base::{read_input, KernelCore};
use super::{Kernel, WeightedKernel};
use crate::config::KernelConfig;
use crate::error::Result;
use crate::store::CellStore;
use crate::types::{CsrMatrix, KernelParams};

/// Kernel name used in fingerprints and persisted metadata.
pub const PRECOMPUTED_KERNEL_NAME: &str = "precomputed";

#[derive(Serialize)]
struct PrecomputedParams<'a> {
    key: &'a str,
    backward: bool,
}

/// Kernel reading a ready-made transition matrix.
#[derive(Debug, Clone)]
pub struct PrecomputedKernel {
    core: KernelCore,
    key: String,
    input: Arc<CsrMatrix>,
}

impl PrecomputedKernel {
    /// Bind to the matrix under `key` in `store`.
    ///
    /// Only `backward`, `check_connectivity` and `copy_input` of `config`
    /// apply; `conn_key` is ignored.
    pub fn new<S: CellStore>(store: &S, key: &str, config: &KernelConfig) -> Result<Self> {
        let input = read_input(store, key)?;
        let input = if config.copy_input {
            Arc::new(CsrMatrix::clone(&input))
        } else {
            input
        };

        let mut kernel = Self {
            core: KernelCore::new(store.cells(), config.backward),
            key: key.to_string(),
            input,
        };
        if config.check_connectivity {
            kernel.check_connectivity()?;
        }
        Ok(kernel)
    }

    /// The wrapped input matrix.
    pub fn input(&self) -> &Arc<CsrMatrix> {
        &self.input
    }

    /// Row-normalize the input (transposed when backward).
    pub fn compute_transition_matrix(&mut self) -> Result<&mut Self> {
        let backward = self.core.backward();
        let params = KernelParams::from_serialize(&PrecomputedParams {
            key: &self.key,
            backward,
        })?;

        let input = &self.input;
        self.core.compute_cached(PRECOMPUTED_KERNEL_NAME, params, || {
            if backward {
                Ok(input.transpose().row_normalize())
            } else {
                Ok(input.row_normalize())
            }
        })?;
        Ok(self)
    }
}

impl Kernel for PrecomputedKernel {
    fn name(&self) -> &'static str {
        PRECOMPUTED_KERNEL_NAME
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
        Ok(&self.input)
    }

    fn into_terms(self: Box<Self>) -> Vec<WeightedKernel> {
        vec![WeightedKernel::boxed(self, 1.0)]
    }
}
