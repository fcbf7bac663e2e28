//! Kernels: components that turn one similarity signal into a transition matrix.
//!
//! ## Contract
//!
//! Every concrete kernel
//! 1. reads a clearly named raw input from a [`CellStore`] at construction,
//! 2. produces a row-stochastic sparse transition matrix, leaving rows
//!    without outgoing edges all-zero,
//! 3. caches that matrix under a fingerprint of its own parameters, and
//! 4. never stores a nonzero where its input had none.
//!
//! Kernels combine through [`KernelExt::combine`] and [`KernelExt::scale`]
//! into a [`CombinedKernel`].

pub mod base;
pub mod connectivity;
pub mod precomputed;
pub mod combined;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::diagnostics::{self, ConnectivityReport};
use crate::error::Result;
use crate::store::CellStore;
use crate::types::{CellMatrix, CellSet, CsrMatrix, KernelParams, ParamsFingerprint};

pub use base::{CacheStatus, ComputationRecord, KernelCore, PersistedRecord};
pub use connectivity::{density_corrected_transition, ConnectivityKernel};
pub use precomputed::PrecomputedKernel;
pub use combined::{CombinedKernel, WeightedKernel};

/// Capability shared by all kernels, concrete and combined.
///
/// Object-safe: combinations hold their constituents as `Box<dyn Kernel>`.
pub trait Kernel: fmt::Debug + Send + Sync {
    /// Short kernel identity, e.g. `"connectivity"`.
    fn name(&self) -> &'static str;

    /// Identifying key of the raw input (used for output keys).
    fn key(&self) -> String;

    /// Shared state.
    fn core(&self) -> &KernelCore;

    /// Shared state, mutable.
    fn core_mut(&mut self) -> &mut KernelCore;

    /// Independent deep copy behind a box.
    fn clone_boxed(&self) -> Box<dyn Kernel>;

    /// Downcasting support for constituents held as `dyn Kernel`.
    fn as_any(&self) -> &dyn Any;

    /// Mutable counterpart of [`Kernel::as_any`].
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Graph inspected by [`Kernel::check_connectivity`].
    fn connectivity_graph(&self) -> Result<&CsrMatrix>;

    /// Decompose into weighted terms for combination.
    ///
    /// Plain kernels are a single term of weight 1; combined kernels yield
    /// their own terms so that combination stays flat.
    fn into_terms(self: Box<Self>) -> Vec<WeightedKernel>;

    /// Cell ordering of every matrix this kernel produces.
    fn cells(&self) -> &Arc<CellSet> {
        self.core().cells()
    }

    /// Whether the kernel models reversed time.
    fn backward(&self) -> bool {
        self.core().backward()
    }

    /// Whether a transition matrix is cached.
    fn is_computed(&self) -> bool {
        self.core().record().is_some()
    }

    /// Parameters of the cached matrix.
    fn params(&self) -> Option<&KernelParams> {
        self.core().record().map(|r| r.params())
    }

    /// Fingerprint of the cached matrix.
    fn fingerprint(&self) -> Option<ParamsFingerprint> {
        self.core().record().map(|r| r.fingerprint())
    }

    /// The cached transition matrix.
    fn transition_matrix(&self) -> Option<&CsrMatrix> {
        self.core().record().map(|r| r.transition().matrix())
    }

    /// The cached transition matrix with its cell ordering, or `EmptyCache`.
    fn transition(&self) -> Result<&CellMatrix> {
        Ok(self.core().require_record(self.name(), "reading it")?.transition())
    }

    /// Cached condition number, if one was computed.
    fn condition_number(&self) -> Option<f64> {
        self.core().record().and_then(|r| r.condition_number())
    }

    /// Compute (or reuse) the dense condition number of the transition matrix.
    ///
    /// Costs `O(N^3)`; never called implicitly.
    fn compute_condition_number(&mut self) -> Result<f64> {
        let name = self.name();
        self.core_mut().compute_condition_number(name)
    }

    /// Check whether the underlying graph is connected.
    ///
    /// A disconnected graph is logged as a warning and reported, not an error.
    fn check_connectivity(&mut self) -> Result<ConnectivityReport> {
        let report = diagnostics::connected_components(self.connectivity_graph()?);
        let name = self.name();
        self.core_mut().record_connectivity(name, report.clone());
        Ok(report)
    }

    /// Last connectivity report.
    fn connectivity(&self) -> Option<&ConnectivityReport> {
        self.core().connectivity()
    }

    /// Key the transition matrix is written under, e.g. `T_bwd_connectivities`.
    fn output_key(&self) -> String {
        self.core().output_key(&self.key())
    }
}

/// Operations on kernels that need generics or ownership.
pub trait KernelExt: Kernel {
    /// Persist the transition matrix and its metadata; returns the output key.
    fn write_to<S: CellStore>(&self, store: &mut S) -> Result<String> {
        self.core().write_to(store, self.name(), &self.key())
    }

    /// Load a transition matrix written by [`KernelExt::write_to`].
    fn restore_from<S: CellStore>(&mut self, store: &S) -> Result<()> {
        let (name, key) = (self.name(), self.key());
        self.core_mut().restore(store, name, &key)
    }

    /// Independent copy: same input binding, direction and cache, no shared
    /// mutable storage.
    fn copy(&self) -> Self
    where
        Self: Sized + Clone,
    {
        self.clone()
    }

    /// Equal-weight combination of `self` and `other`.
    fn combine<K: Kernel + 'static>(self, other: K) -> Result<CombinedKernel>
    where
        Self: Sized + 'static,
    {
        CombinedKernel::from_kernels(vec![Box::new(self) as Box<dyn Kernel>, Box::new(other)])
    }

    /// Tag `self` with a weight for later combination.
    fn scale(self, weight: f64) -> Result<CombinedKernel>
    where
        Self: Sized + 'static,
    {
        CombinedKernel::new(vec![WeightedKernel::new(self, weight)])
    }
}

impl<K: Kernel + ?Sized> KernelExt for K {}
