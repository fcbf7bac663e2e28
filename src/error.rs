//! Error taxonomy for kernel construction, computation and combination.
//!
//! Every failure is raised to the caller immediately. Computations are
//! deterministic, so nothing here is retried. A failed operation leaves
//! previously cached matrices (on the same or other kernels) untouched.

/// Errors produced by kernels, the combined kernel and their diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// Required raw data is absent from the dataset.
    #[error("Missing input: no matrix found under key {key:?}")]
    MissingInput {
        /// Key that was looked up.
        key: String,
    },

    /// Dimension or cell-ordering incompatibility.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A diagnostic or export was requested before any transition matrix exists.
    #[error("Empty cache: {0}")]
    EmptyCache(String),

    /// The cache claims a hit but holds no usable matrix.
    ///
    /// This is an internal invariant violation and is never recovered from.
    #[error("Inconsistent cache: {0}")]
    InconsistentCache(String),

    /// Combination attempted before every constituent was computed.
    #[error("Constituent {index} ({name}) has no transition matrix; compute it before combining")]
    UncomputedConstituent {
        /// Position of the constituent in the combination.
        index: usize,
        /// Kernel name of the constituent.
        name: String,
    },

    /// Combination with zero constituents.
    #[error("Cannot combine an empty list of kernels")]
    EmptyCombination,

    /// Negative, non-finite, or all-zero combination weights.
    #[error("Invalid weight: {0}")]
    InvalidWeight(String),

    /// Constituents disagree on the `backward` flag.
    #[error("Direction mismatch: cannot combine forward and backward kernels")]
    DirectionMismatch,

    /// Raw input contains values a transition matrix cannot be built from.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error reported by the dataset collaborator.
    #[error("Store error: {0}")]
    Store(String),

    /// Canonical serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KernelError {
    /// Create a store error from any error type.
    pub fn from_store<E: std::error::Error>(e: E) -> Self {
        Self::Store(e.to_string())
    }

    /// Shorthand for a shape mismatch between two dimensions.
    pub fn shape(what: &str, expected: usize, found: usize) -> Self {
        Self::ShapeMismatch(format!("{what}: expected {expected}, found {found}"))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, KernelError>;
