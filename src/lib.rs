//! # transition-kernel
//!
//! Cached, composable Markov-chain transition matrices over single-cell data.
//!
//! A kernel answers one question:
//!
//! > Given one similarity signal over cells, where does a cell move next?
//!
//! ## Core Contract
//!
//! 1. Every kernel turns one raw cell-cell matrix into a row-stochastic
//!    sparse transition matrix; cells without outgoing edges keep all-zero rows
//! 2. The matrix is cached under a fingerprint of the parameters that produced
//!    it; asking again with the same parameters does no work
//! 3. Kernels combine into a weighted convex combination of their
//!    transition matrices
//!
//! ## Architecture
//!
//! ```text
//! CellStore ─► ConnectivityKernel ─┐
//!          └─► PrecomputedKernel ──┴─► CombinedKernel ─► CellMatrix (estimator)
//!                     │
//!               KernelCore (ComputationRecord, fingerprint, diagnostics)
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same input + same parameters → identical fingerprint and cache hit
//! - Parameter fingerprints hash canonical JSON with quantized floats
//! - Combination never triggers a constituent's own computation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod store;
pub mod kernels;
pub mod canonical;
pub mod diagnostics;
pub mod config;
pub mod telemetry;
pub mod error;

// Re-exports
pub use types::{CellId, CellSet, CsrMatrix, CellMatrix, MatrixKind, KernelParams, ParamsFingerprint};
pub use store::{CellStore, InMemoryCellStore, InMemoryError};
pub use kernels::{
    Kernel, KernelExt, KernelCore, CacheStatus, ComputationRecord, PersistedRecord,
    ConnectivityKernel, PrecomputedKernel, CombinedKernel, WeightedKernel,
    density_corrected_transition,
};
pub use canonical::{to_canonical_bytes, canonical_hash, canonical_hash_hex};
pub use diagnostics::{condition_number, connected_components, ConnectivityReport};
pub use config::KernelConfig;
pub use telemetry::{init_tracing, LogFormat};
pub use error::{KernelError, Result};

/// Schema version of persisted kernel metadata.
/// Increment on breaking changes to `PersistedRecord`.
pub const TRANSITION_KERNEL_SCHEMA_VERSION: &str = "1.0.0";
