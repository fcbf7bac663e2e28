//! State shared by every kernel: cell binding, direction, and the cache record.
//!
//! ## Cache Discipline
//!
//! All cached state lives in one `ComputationRecord` (matrix, params,
//! fingerprint, condition number). Replacing the record is the only way the
//! cache changes, so copy and invalidation are single operations.
//!
//! 1. Build `KernelParams` for the request and fingerprint them
//! 2. Fingerprint and params equal to the record: cache hit, nothing runs
//! 3. Otherwise run the algorithm, replace the record, bump the generation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::diagnostics::{self, ConnectivityReport};
use crate::error::{KernelError, Result};
use crate::store::CellStore;
use crate::types::{ensure_compatible, CellMatrix, CellSet, CsrMatrix, KernelParams, MatrixKind, ParamsFingerprint};
use crate::TRANSITION_KERNEL_SCHEMA_VERSION;

/// Outcome of a cached computation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Parameters matched the record; the stored matrix was kept.
    Hit,
    /// The algorithm ran and replaced the record.
    Computed,
}

/// Everything cached from the last successful computation.
#[derive(Debug, Clone)]
pub struct ComputationRecord {
    params: KernelParams,
    fingerprint: ParamsFingerprint,
    transition: CellMatrix,
    condition_number: Option<f64>,
    computed_at: DateTime<Utc>,
    generation: u64,
}

impl ComputationRecord {
    /// Parameters of the computation.
    pub fn params(&self) -> &KernelParams {
        &self.params
    }

    /// Fingerprint of the parameters.
    pub fn fingerprint(&self) -> ParamsFingerprint {
        self.fingerprint
    }

    /// The transition matrix with its cell ordering.
    pub fn transition(&self) -> &CellMatrix {
        &self.transition
    }

    /// Condition number, if it was requested since the last computation.
    pub fn condition_number(&self) -> Option<f64> {
        self.condition_number
    }

    /// When the matrix was computed.
    pub fn computed_at(&self) -> DateTime<Utc> {
        self.computed_at
    }

    /// Per-kernel counter, increased each time the matrix is replaced.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Metadata document written next to a persisted transition matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRecord {
    /// Kernel name that produced the matrix.
    pub kernel: String,
    /// Direction of the kernel.
    pub backward: bool,
    /// Parameters of the computation.
    pub params: KernelParams,
    /// Hex fingerprint of `(kernel, params)`.
    pub fingerprint: String,
    /// Condition number, if computed.
    pub condition_number: Option<f64>,
    /// When the matrix was computed.
    pub computed_at: DateTime<Utc>,
    /// Generation of the record at write time. Informational; a restored
    /// record gets a fresh generation.
    pub generation: u64,
    /// Schema version of this document.
    pub schema_version: String,
}

/// Key of the metadata document for a persisted matrix.
pub fn params_key(output_key: &str) -> String {
    format!("{output_key}_params")
}

/// Read a kernel's raw input from a store and check it against the cell set.
pub fn read_input<S: CellStore>(store: &S, key: &str) -> Result<Arc<CsrMatrix>> {
    let matrix = store
        .pairwise(key)
        .map_err(KernelError::from_store)?
        .ok_or_else(|| KernelError::MissingInput { key: key.to_string() })?;

    if !matrix.is_square() {
        let (r, c) = matrix.shape();
        return Err(KernelError::ShapeMismatch(format!("input {key:?} is {r}x{c}, expected square")));
    }
    let n = store.cells().len();
    if matrix.n_rows() != n {
        return Err(KernelError::shape(&format!("dimension of input {key:?} vs. cell count"), n, matrix.n_rows()));
    }
    matrix.validate_non_negative()?;
    Ok(matrix)
}

fn empty_cache(kernel_name: &str, operation: &str) -> KernelError {
    KernelError::EmptyCache(format!(
        "{kernel_name} kernel has no transition matrix; compute it before {operation}"
    ))
}

/// Cell binding, direction and cache shared by all kernels.
#[derive(Debug, Clone)]
pub struct KernelCore {
    cells: Arc<CellSet>,
    backward: bool,
    record: Option<ComputationRecord>,
    connectivity: Option<ConnectivityReport>,
    generation: u64,
}

impl KernelCore {
    /// Fresh, uncomputed core.
    pub fn new(cells: Arc<CellSet>, backward: bool) -> Self {
        Self {
            cells,
            backward,
            record: None,
            connectivity: None,
            generation: 0,
        }
    }

    /// Cell ordering.
    pub fn cells(&self) -> &Arc<CellSet> {
        &self.cells
    }

    /// Whether the kernel models reversed time.
    pub fn backward(&self) -> bool {
        self.backward
    }

    /// Kind of the transition matrices this core produces.
    pub fn kind(&self) -> MatrixKind {
        MatrixKind::directed(self.backward)
    }

    /// The cache record, if computed.
    pub fn record(&self) -> Option<&ComputationRecord> {
        self.record.as_ref()
    }

    /// Last connectivity report, if the check ran.
    pub fn connectivity(&self) -> Option<&ConnectivityReport> {
        self.connectivity.as_ref()
    }

    /// The record, or `EmptyCache` naming the kernel and the operation.
    pub fn require_record(&self, kernel_name: &str, operation: &str) -> Result<&ComputationRecord> {
        self.record.as_ref().ok_or_else(|| empty_cache(kernel_name, operation))
    }

    /// Run `algorithm` unless `params` match the cached record.
    pub fn compute_cached<F>(&mut self, kernel_name: &str, params: KernelParams, algorithm: F) -> Result<CacheStatus>
    where
        F: FnOnce() -> Result<CsrMatrix>,
    {
        let fingerprint = params.fingerprint(kernel_name)?;

        if let Some(record) = &self.record {
            if record.fingerprint == fingerprint && record.params == params {
                if !Arc::ptr_eq(record.transition.cells(), &self.cells) {
                    return Err(KernelError::InconsistentCache(format!(
                        "{kernel_name} kernel cache hit on {fingerprint} holds a matrix bound to a different cell set"
                    )));
                }
                tracing::debug!(kernel = kernel_name, %fingerprint, "using cached transition matrix");
                return Ok(CacheStatus::Hit);
            }
        }

        let start = Instant::now();
        tracing::info!(kernel = kernel_name, %fingerprint, n_cells = self.cells.len(), "computing transition matrix");

        let matrix = algorithm()?;
        let transition = CellMatrix::new(Arc::clone(&self.cells), matrix, self.kind())?;

        self.generation += 1;
        tracing::info!(
            kernel = kernel_name,
            nnz = transition.matrix().nnz(),
            isolated = transition.zero_rows().len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "finished transition matrix"
        );
        self.record = Some(ComputationRecord {
            params,
            fingerprint,
            transition,
            condition_number: None,
            computed_at: Utc::now(),
            generation: self.generation,
        });

        Ok(CacheStatus::Computed)
    }

    /// Condition number of the cached matrix, computing it on first request.
    pub fn compute_condition_number(&mut self, kernel_name: &str) -> Result<f64> {
        let record = self
            .record
            .as_mut()
            .ok_or_else(|| empty_cache(kernel_name, "requesting its condition number"))?;
        if let Some(c) = record.condition_number {
            return Ok(c);
        }

        let start = Instant::now();
        let c = diagnostics::condition_number(record.transition.matrix());
        tracing::info!(
            kernel = kernel_name,
            condition_number = c,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "computed condition number"
        );
        record.condition_number = Some(c);
        Ok(c)
    }

    /// Store a connectivity report; warn when the graph is disconnected.
    pub fn record_connectivity(&mut self, kernel_name: &str, report: ConnectivityReport) {
        if report.is_connected() {
            tracing::debug!(kernel = kernel_name, "graph is connected");
        } else {
            tracing::warn!(
                kernel = kernel_name,
                n_components = report.n_components(),
                component_sizes = ?report.component_sizes,
                isolated = report.isolated_cells().len(),
                "graph is not connected; the transition matrix will have multiple closed communities"
            );
        }
        self.connectivity = Some(report);
    }

    /// Deterministic output key, e.g. `T_fwd_connectivities`.
    pub fn output_key(&self, key: &str) -> String {
        format!("T_{}_{}", self.kind().tag(), key)
    }

    /// Persist the cached matrix and its metadata into a store.
    pub fn write_to<S: CellStore>(&self, store: &mut S, kernel_name: &str, key: &str) -> Result<String> {
        let record = self.require_record(kernel_name, "writing it to a dataset")?;
        ensure_compatible(&store.cells(), &self.cells)?;

        let out_key = self.output_key(key);
        let doc = PersistedRecord {
            kernel: kernel_name.to_string(),
            backward: self.backward,
            params: record.params.clone(),
            fingerprint: record.fingerprint.to_string(),
            condition_number: record.condition_number,
            computed_at: record.computed_at,
            generation: record.generation,
            schema_version: TRANSITION_KERNEL_SCHEMA_VERSION.to_string(),
        };

        store
            .set_pairwise(&out_key, record.transition.matrix().clone())
            .map_err(KernelError::from_store)?;
        store
            .set_metadata(&params_key(&out_key), serde_json::to_value(&doc)?)
            .map_err(KernelError::from_store)?;

        tracing::info!(kernel = kernel_name, key = %out_key, "wrote transition matrix");
        Ok(out_key)
    }

    /// Load a record previously written by [`KernelCore::write_to`].
    pub fn restore<S: CellStore>(&mut self, store: &S, kernel_name: &str, key: &str) -> Result<()> {
        ensure_compatible(&store.cells(), &self.cells)?;

        let out_key = self.output_key(key);
        let meta_key = params_key(&out_key);
        let doc = store.metadata(&meta_key).map_err(KernelError::from_store)?;
        let matrix = store.pairwise(&out_key).map_err(KernelError::from_store)?;

        let (doc, matrix) = match (doc, matrix) {
            (Some(doc), Some(matrix)) => (doc, matrix),
            (Some(_), None) => {
                return Err(KernelError::InconsistentCache(format!(
                    "metadata {meta_key:?} is present but matrix {out_key:?} is missing"
                )))
            }
            (None, Some(_)) => return Err(KernelError::MissingInput { key: meta_key }),
            (None, None) => return Err(KernelError::MissingInput { key: out_key }),
        };

        let doc: PersistedRecord = serde_json::from_value(doc)?;
        if doc.kernel != kernel_name || doc.backward != self.backward {
            return Err(KernelError::InvalidInput(format!(
                "{out_key:?} was written by a {} {} kernel",
                MatrixKind::directed(doc.backward),
                doc.kernel
            )));
        }

        let fingerprint = doc.params.fingerprint(kernel_name)?;
        if fingerprint.to_string() != doc.fingerprint {
            return Err(KernelError::InconsistentCache(format!(
                "stored fingerprint {} does not match stored params ({fingerprint})",
                doc.fingerprint
            )));
        }

        let transition = CellMatrix::new(Arc::clone(&self.cells), (*matrix).clone(), self.kind())
            .map_err(|e| KernelError::InconsistentCache(format!("stored matrix {out_key:?} is unusable: {e}")))?;

        self.generation += 1;
        self.record = Some(ComputationRecord {
            params: doc.params,
            fingerprint,
            transition,
            condition_number: doc.condition_number,
            computed_at: doc.computed_at,
            generation: self.generation,
        });
        tracing::info!(kernel = kernel_name, key = %out_key, %fingerprint, "restored transition matrix");
        Ok(())
    }
}
