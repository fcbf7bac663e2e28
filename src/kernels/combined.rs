//! Weighted convex combination of kernels.
//!
//! ## Algebra
//!
//! A combination is a flat list of `(kernel, weight)` terms. Combining a
//! combination splices its terms in, so `(a + b) + c` and `a + (b + c)` hold
//! the same three terms, and scaling a combination multiplies every term
//! weight. The combined transition matrix is
//!
//! ```text
//! T = sum_i w_i T_i / sum_i w_i
//! ```
//!
//! taken entry by entry. A row that is terminal in some constituents keeps
//! only the weighted mass of the others, so it sums to less than one.
//!
//! ## Caching
//!
//! Constituents are never computed implicitly. The combined parameters
//! record each constituent's fingerprint and generation, so recomputing a
//! constituent with new parameters forces recombination on the next explicit
//! [`CombinedKernel::compute_transition_matrix`] call, and an unchanged set of
//! constituents is a cache hit.

use serde::Serialize;
use std::any::Any;
use std::fmt;

use super::base::KernelCore;
use super::Kernel;
use crate::canonical::quantize_float;
use crate::error::{KernelError, Result};
use crate::types::{ensure_compatible, CsrMatrix, KernelParams};

/// Kernel name used in fingerprints and persisted metadata.
pub const COMBINED_KERNEL_NAME: &str = "combined";

/// A kernel tagged with a non-negative combination weight.
pub struct WeightedKernel {
    kernel: Box<dyn Kernel>,
    weight: f64,
}

impl WeightedKernel {
    /// Tag `kernel` with `weight`.
    pub fn new<K: Kernel + 'static>(kernel: K, weight: f64) -> Self {
        Self::boxed(Box::new(kernel), weight)
    }

    /// Tag an already boxed kernel.
    pub fn boxed(kernel: Box<dyn Kernel>, weight: f64) -> Self {
        Self { kernel, weight }
    }

    /// The kernel.
    pub fn kernel(&self) -> &dyn Kernel {
        self.kernel.as_ref()
    }

    /// The weight.
    pub fn weight(&self) -> f64 {
        self.weight
    }
}

impl Clone for WeightedKernel {
    fn clone(&self) -> Self {
        Self {
            kernel: self.kernel.clone_boxed(),
            weight: self.weight,
        }
    }
}

impl fmt::Debug for WeightedKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeightedKernel")
            .field("kernel", &self.kernel.name())
            .field("key", &self.kernel.key())
            .field("weight", &self.weight)
            .finish()
    }
}

#[derive(Serialize)]
struct TermParams {
    kernel: &'static str,
    key: String,
    fingerprint: String,
    generation: u64,
    weight: i64,
}

#[derive(Serialize)]
struct CombinedParams {
    terms: Vec<TermParams>,
}

/// Kernel whose transition matrix is a weighted mean of its constituents'.
#[derive(Debug, Clone)]
pub struct CombinedKernel {
    core: KernelCore,
    terms: Vec<WeightedKernel>,
}

impl CombinedKernel {
    /// Combine weighted kernels, flattening nested combinations.
    ///
    /// # Errors
    ///
    /// - `EmptyCombination` for an empty list
    /// - `InvalidWeight` for a negative or non-finite weight
    /// - `ShapeMismatch` when constituents live on different cell sets
    /// - `DirectionMismatch` when constituents disagree on `backward`
    pub fn new(terms: Vec<WeightedKernel>) -> Result<Self> {
        let mut flat: Vec<WeightedKernel> = Vec::with_capacity(terms.len());
        for term in terms {
            check_weight(term.weight)?;
            let outer = term.weight;
            for inner in term.kernel.into_terms() {
                let weight = inner.weight * outer;
                check_weight(weight)?;
                flat.push(WeightedKernel::boxed(inner.kernel, weight));
            }
        }

        let Some(first) = flat.first() else {
            return Err(KernelError::EmptyCombination);
        };
        let cells = first.kernel.cells().clone();
        let backward = first.kernel.backward();

        for term in &flat[1..] {
            ensure_compatible(&cells, term.kernel.cells())?;
            if term.kernel.backward() != backward {
                return Err(KernelError::DirectionMismatch);
            }
        }

        tracing::debug!(n_terms = flat.len(), backward, "combined kernels");
        Ok(Self {
            core: KernelCore::new(cells, backward),
            terms: flat,
        })
    }

    /// Equal-weight combination of boxed kernels.
    pub fn from_kernels(kernels: Vec<Box<dyn Kernel>>) -> Result<Self> {
        Self::new(kernels.into_iter().map(|k| WeightedKernel::boxed(k, 1.0)).collect())
    }

    /// Term weights, unnormalized.
    pub fn weights(&self) -> Vec<f64> {
        self.terms.iter().map(|t| t.weight).collect()
    }

    /// Number of terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Always false; a combination holds at least one term.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Constituent kernels in order.
    pub fn constituents(&self) -> impl Iterator<Item = &dyn Kernel> + '_ {
        self.terms.iter().map(|t| t.kernel.as_ref())
    }

    /// Constituent at `index`.
    pub fn constituent(&self, index: usize) -> Option<&dyn Kernel> {
        self.terms.get(index).map(|t| t.kernel.as_ref())
    }

    /// Mutable constituent at `index`.
    ///
    /// Changes are not observed until the next explicit
    /// [`CombinedKernel::compute_transition_matrix`].
    pub fn constituent_mut(&mut self, index: usize) -> Option<&mut (dyn Kernel + 'static)> {
        self.terms.get_mut(index).map(|t| t.kernel.as_mut())
    }

    /// Constituent at `index` as its concrete type.
    pub fn constituent_as_mut<K: Kernel + 'static>(&mut self, index: usize) -> Option<&mut K> {
        self.terms.get_mut(index)?.kernel.as_any_mut().downcast_mut::<K>()
    }

    /// Combine the constituents' cached transition matrices.
    ///
    /// # Errors
    ///
    /// - `UncomputedConstituent` if any constituent has no matrix
    /// - `InvalidWeight` if all weights are zero
    pub fn compute_transition_matrix(&mut self) -> Result<&mut Self> {
        let mut entries = Vec::with_capacity(self.terms.len());
        for (index, term) in self.terms.iter().enumerate() {
            let kernel = term.kernel.as_ref();
            let record = kernel.core().record().ok_or_else(|| KernelError::UncomputedConstituent {
                index,
                name: kernel.name().to_string(),
            })?;
            entries.push(TermParams {
                kernel: kernel.name(),
                key: kernel.key(),
                fingerprint: record.fingerprint().to_string(),
                generation: record.generation(),
                weight: quantize_float(term.weight),
            });
        }

        let total: f64 = self.terms.iter().map(|t| t.weight).sum();
        if total <= 0.0 {
            return Err(KernelError::InvalidWeight(
                "weights sum to zero; at least one term needs a positive weight".to_string(),
            ));
        }

        let params = KernelParams::from_serialize(&CombinedParams { terms: entries })?;
        let terms = &self.terms;
        self.core.compute_cached(COMBINED_KERNEL_NAME, params, || {
            let weighted = terms
                .iter()
                .map(|t| Ok((t.kernel.transition()?.matrix(), t.weight / total)))
                .collect::<Result<Vec<(&CsrMatrix, f64)>>>()?;
            CsrMatrix::linear_combination(&weighted)
        })?;
        Ok(self)
    }
}

fn check_weight(weight: f64) -> Result<()> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(KernelError::InvalidWeight(format!(
            "weight {weight} must be finite and non-negative"
        )));
    }
    Ok(())
}

impl Kernel for CombinedKernel {
    fn name(&self) -> &'static str {
        COMBINED_KERNEL_NAME
    }

    fn key(&self) -> String {
        self.terms.iter().map(|t| t.kernel.key()).collect::<Vec<_>>().join("+")
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
        Ok(self
            .core
            .require_record(COMBINED_KERNEL_NAME, "checking its connectivity")?
            .transition()
            .matrix())
    }

    fn into_terms(self: Box<Self>) -> Vec<WeightedKernel> {
        self.terms
    }
}
