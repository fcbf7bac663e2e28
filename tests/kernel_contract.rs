//! Contract tests for kernels and their combination.
//!
//! These tests exercise the public API only: construction from a store,
//! caching, copying, diagnostics, persistence and combination.

use approx::assert_relative_eq;
use serde_json::json;
use std::sync::Arc;

use transition_kernel::store::InMemoryCellStore;
use transition_kernel::{
    CellId, CellSet, CellStore, CombinedKernel, ConnectivityKernel, CsrMatrix, Kernel, KernelConfig,
    KernelError, KernelExt, PrecomputedKernel, WeightedKernel,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn triangle_plus_isolated() -> CsrMatrix {
    CsrMatrix::from_dense(&[
        vec![0.0, 1.0, 1.0, 0.0],
        vec![1.0, 0.0, 1.0, 0.0],
        vec![1.0, 1.0, 0.0, 0.0],
        vec![0.0, 0.0, 0.0, 0.0],
    ])
    .unwrap()
}

/// Symmetric KNN-like graph: a path with uneven weights.
fn weighted_path(n: usize) -> CsrMatrix {
    let mut t = Vec::new();
    for i in 0..n - 1 {
        let w = 1.0 + (i % 3) as f64;
        t.push((i, i + 1, w));
        t.push((i + 1, i, w));
    }
    CsrMatrix::from_triplets(n, n, &t).unwrap()
}

/// Directed flow toward the last cell.
fn forward_flow(n: usize) -> CsrMatrix {
    let mut t = Vec::new();
    for i in 0..n {
        t.push((i, (i + 1).min(n - 1), 2.0));
        t.push((i, i, 1.0));
    }
    CsrMatrix::from_triplets(n, n, &t).unwrap()
}

fn build_store(n: usize) -> InMemoryCellStore {
    InMemoryCellStore::new(CellSet::with_len(n))
        .with_pairwise("connectivities", weighted_path(n))
        .unwrap()
        .with_pairwise("velocity", forward_flow(n))
        .unwrap()
}

fn connectivity_kernel(store: &InMemoryCellStore) -> ConnectivityKernel {
    ConnectivityKernel::new(store, &KernelConfig::default()).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// SCENARIOS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_isolated_cell_keeps_zero_row() {
    let store = InMemoryCellStore::new(CellSet::with_len(4))
        .with_pairwise("connectivities", triangle_plus_isolated())
        .unwrap();
    let mut kernel = connectivity_kernel(&store);
    kernel.compute_transition_matrix(false).unwrap();

    let t = kernel.transition().unwrap();
    let sums = t.matrix().row_sums();
    for s in &sums[..3] {
        assert_relative_eq!(*s, 1.0, epsilon = 1e-12);
    }
    assert_eq!(sums[3], 0.0);
    assert_eq!(t.zero_rows(), vec![3]);
    assert!(t.is_row_stochastic(1e-12));
}

#[test]
fn test_combining_five_and_six_cells_fails() {
    let mut five = connectivity_kernel(&build_store(5));
    let mut six = connectivity_kernel(&build_store(6));
    five.compute_transition_matrix(true).unwrap();
    six.compute_transition_matrix(true).unwrap();

    let err = five.combine(six).unwrap_err();
    assert!(matches!(err, KernelError::ShapeMismatch(_)), "got {err}");
}

#[test]
fn test_combining_reordered_cells_fails() {
    let ids: Vec<CellId> = (0..3).map(|i| CellId::new(format!("c{i}"))).collect();
    let reversed: Vec<CellId> = ids.iter().rev().cloned().collect();
    let a = InMemoryCellStore::new(CellSet::new(ids).unwrap())
        .with_pairwise("connectivities", weighted_path(3))
        .unwrap();
    let b = InMemoryCellStore::new(CellSet::new(reversed).unwrap())
        .with_pairwise("connectivities", weighted_path(3))
        .unwrap();

    assert!(matches!(
        connectivity_kernel(&a).combine(connectivity_kernel(&b)),
        Err(KernelError::ShapeMismatch(_))
    ));
}

#[test]
fn test_condition_number_before_compute() {
    let store = build_store(4);
    let mut kernel = connectivity_kernel(&store);
    assert!(matches!(kernel.compute_condition_number(), Err(KernelError::EmptyCache(_))));
    assert_eq!(kernel.condition_number(), None);
}

#[test]
fn test_missing_input_key() {
    let store = build_store(4);
    let config = KernelConfig::default().conn_key("spatial_connectivities");
    match ConnectivityKernel::new(&store, &config) {
        Err(KernelError::MissingInput { key }) => assert_eq!(key, "spatial_connectivities"),
        other => panic!("expected MissingInput, got {other:?}"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CACHING
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_identical_params_are_a_cache_hit() {
    let store = build_store(8);
    let mut kernel = connectivity_kernel(&store);
    kernel.compute_transition_matrix(true).unwrap();

    let first_ptr = kernel.transition_matrix().unwrap().values().as_ptr();
    let first = kernel.transition_matrix().unwrap().clone();
    let fingerprint = kernel.fingerprint().unwrap();
    let generation = kernel.core().record().unwrap().generation();

    kernel.compute_transition_matrix(true).unwrap();

    assert_eq!(kernel.transition_matrix().unwrap().values().as_ptr(), first_ptr);
    assert_eq!(kernel.transition_matrix().unwrap(), &first);
    assert_eq!(kernel.fingerprint().unwrap(), fingerprint);
    assert_eq!(kernel.core().record().unwrap().generation(), generation);
}

#[test]
fn test_new_params_replace_the_cache() {
    let store = build_store(8);
    let mut kernel = connectivity_kernel(&store);
    kernel.compute_transition_matrix(true).unwrap();
    kernel.compute_condition_number().unwrap();
    let fingerprint = kernel.fingerprint().unwrap();

    kernel.compute_transition_matrix(false).unwrap();

    assert_ne!(kernel.fingerprint().unwrap(), fingerprint);
    assert_eq!(kernel.params().unwrap().get("dnorm"), Some(&json!(false)));
    assert_eq!(kernel.condition_number(), None);
    assert_eq!(kernel.core().record().unwrap().generation(), 2);
}

#[test]
fn test_method_chaining_returns_same_kernel() {
    let store = build_store(4);
    let mut kernel = connectivity_kernel(&store);
    let c = kernel.compute_transition_matrix(true).unwrap().compute_condition_number().unwrap();
    assert!(c >= 1.0);
    assert_eq!(kernel.condition_number(), Some(c));
}

#[test]
fn test_fingerprint_depends_on_kernel_and_params() {
    let store = build_store(4);
    let mut a = connectivity_kernel(&store);
    let mut b = connectivity_kernel(&store);
    a.compute_transition_matrix(true).unwrap();
    b.compute_transition_matrix(true).unwrap();
    assert_eq!(a.fingerprint(), b.fingerprint());

    let mut p = PrecomputedKernel::new(&store, "velocity", &KernelConfig::default()).unwrap();
    p.compute_transition_matrix().unwrap();
    assert_ne!(a.fingerprint(), p.fingerprint());
}

// ─────────────────────────────────────────────────────────────────────────────
// COPY
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_copy_is_independent() {
    let store = build_store(6);
    let mut original = connectivity_kernel(&store);
    original.compute_transition_matrix(true).unwrap();
    original.compute_condition_number().unwrap();

    let mut copy = original.copy();
    assert_eq!(copy.transition_matrix(), original.transition_matrix());
    assert_eq!(copy.params(), original.params());
    assert_eq!(copy.condition_number(), original.condition_number());
    assert_eq!(copy.backward(), original.backward());
    assert_ne!(
        copy.transition_matrix().unwrap().values().as_ptr(),
        original.transition_matrix().unwrap().values().as_ptr()
    );

    let before = original.transition_matrix().unwrap().clone();
    copy.compute_transition_matrix(false).unwrap();
    assert_eq!(original.transition_matrix().unwrap(), &before);
    assert_eq!(original.params().unwrap().get("dnorm"), Some(&json!(true)));
}

#[test]
fn test_copy_of_uncomputed_kernel_stays_uncomputed() {
    let store = build_store(3);
    let kernel = connectivity_kernel(&store);
    assert!(!kernel.copy().is_computed());
}

#[test]
fn test_input_is_shared_between_kernels() {
    let store = build_store(5);
    let a = connectivity_kernel(&store);
    let b = connectivity_kernel(&store);
    assert!(Arc::ptr_eq(a.connectivities(), b.connectivities()));
}

// ─────────────────────────────────────────────────────────────────────────────
// DIAGNOSTICS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_disconnected_graph_is_advisory() {
    let store = InMemoryCellStore::new(CellSet::with_len(4))
        .with_pairwise("connectivities", triangle_plus_isolated())
        .unwrap();
    let mut kernel = connectivity_kernel(&store);

    let report = kernel.check_connectivity().unwrap();
    assert!(!report.is_connected());
    assert_eq!(report.component_sizes, vec![3, 1]);
    assert_eq!(report.isolated_cells(), vec![3]);

    // still computable
    kernel.compute_transition_matrix(true).unwrap();
    assert!(kernel.transition().unwrap().is_row_stochastic(1e-12));
}

#[test]
fn test_connected_graph_report() {
    let store = build_store(6);
    let mut kernel = connectivity_kernel(&store);
    assert!(kernel.connectivity().is_none());
    assert!(kernel.check_connectivity().unwrap().is_connected());
    assert!(kernel.connectivity().is_some());
}

#[test]
fn test_singular_transition_has_infinite_condition_number() {
    let store = InMemoryCellStore::new(CellSet::with_len(4))
        .with_pairwise("connectivities", triangle_plus_isolated())
        .unwrap();
    let mut kernel = connectivity_kernel(&store);
    kernel.compute_transition_matrix(false).unwrap();
    let c = kernel.compute_condition_number().unwrap();
    assert!(c.is_infinite() || c > 1e12);
}

// ─────────────────────────────────────────────────────────────────────────────
// PERSISTENCE
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_write_then_restore() {
    let mut store = build_store(6);
    let mut kernel = connectivity_kernel(&store);
    kernel.compute_transition_matrix(true).unwrap();
    kernel.compute_condition_number().unwrap();

    let key = kernel.write_to(&mut store).unwrap();
    assert_eq!(key, "T_fwd_connectivities");
    assert!(store.pairwise(&key).unwrap().is_some());
    let meta = store.metadata("T_fwd_connectivities_params").unwrap().unwrap();
    assert_eq!(meta["kernel"], json!("connectivity"));
    assert_eq!(meta["params"]["dnorm"], json!(true));

    let mut restored = connectivity_kernel(&store);
    restored.restore_from(&store).unwrap();
    assert_eq!(restored.transition_matrix(), kernel.transition_matrix());
    assert_eq!(restored.fingerprint(), kernel.fingerprint());
    assert_eq!(restored.condition_number(), kernel.condition_number());

    // the restored record serves cache hits
    let generation = restored.core().record().unwrap().generation();
    restored.compute_transition_matrix(true).unwrap();
    assert_eq!(restored.core().record().unwrap().generation(), generation);
}

#[test]
fn test_write_before_compute() {
    let mut store = build_store(3);
    let kernel = connectivity_kernel(&store);
    assert!(matches!(kernel.write_to(&mut store), Err(KernelError::EmptyCache(_))));
}

#[test]
fn test_restore_without_anything_written() {
    let store = build_store(3);
    let mut kernel = connectivity_kernel(&store);
    assert!(matches!(kernel.restore_from(&store), Err(KernelError::MissingInput { .. })));
    assert!(!kernel.is_computed());
}

#[test]
fn test_restore_with_tampered_fingerprint() {
    let mut store = build_store(4);
    let mut kernel = connectivity_kernel(&store);
    kernel.compute_transition_matrix(true).unwrap();
    kernel.write_to(&mut store).unwrap();

    let mut meta = store.metadata("T_fwd_connectivities_params").unwrap().unwrap();
    meta["fingerprint"] = json!("0000000000000000");
    store.set_metadata("T_fwd_connectivities_params", meta).unwrap();

    let mut restored = connectivity_kernel(&store);
    assert!(matches!(restored.restore_from(&store), Err(KernelError::InconsistentCache(_))));
}

#[test]
fn test_restore_into_other_kernel_is_rejected() {
    let mut store = build_store(4);
    let mut kernel = connectivity_kernel(&store);
    kernel.compute_transition_matrix(true).unwrap();
    kernel.write_to(&mut store).unwrap();

    // a precomputed kernel over the written matrix reads the same output key
    let mut other = PrecomputedKernel::new(&store, "connectivities", &KernelConfig::default()).unwrap();
    assert!(matches!(other.restore_from(&store), Err(KernelError::InvalidInput(_))));
}

// ─────────────────────────────────────────────────────────────────────────────
// COMBINATION
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_weighted_combination_is_convex() {
    let store = build_store(7);
    let mut conn = connectivity_kernel(&store);
    conn.compute_transition_matrix(true).unwrap();
    let mut vel = PrecomputedKernel::new(&store, "velocity", &KernelConfig::default()).unwrap();
    vel.compute_transition_matrix().unwrap();

    let t1 = conn.transition_matrix().unwrap().clone();
    let t2 = vel.transition_matrix().unwrap().clone();

    let mut combined = CombinedKernel::new(vec![WeightedKernel::new(conn, 0.2), WeightedKernel::new(vel, 0.8)]).unwrap();
    combined.compute_transition_matrix().unwrap();
    let t = combined.transition().unwrap();

    assert!(t.is_row_stochastic(1e-12));
    for i in 0..7 {
        for j in 0..7 {
            assert_relative_eq!(t.matrix().get(i, j), 0.2 * t1.get(i, j) + 0.8 * t2.get(i, j), epsilon = 1e-12);
        }
    }
}

#[test]
fn test_weights_are_normalized() {
    let store = build_store(5);
    let mut a = connectivity_kernel(&store);
    a.compute_transition_matrix(true).unwrap();
    let mut b = PrecomputedKernel::new(&store, "velocity", &KernelConfig::default()).unwrap();
    b.compute_transition_matrix().unwrap();

    let mut small = a.clone().scale(1.0).unwrap().combine(b.clone().scale(3.0).unwrap()).unwrap();
    let mut large = a.scale(10.0).unwrap().combine(b.scale(30.0).unwrap()).unwrap();
    small.compute_transition_matrix().unwrap();
    large.compute_transition_matrix().unwrap();

    let (ts, tl) = (small.transition_matrix().unwrap(), large.transition_matrix().unwrap());
    for (i, j, v) in ts.triplets() {
        assert_relative_eq!(v, tl.get(i, j), epsilon = 1e-12);
    }
}

#[test]
fn test_terminal_row_keeps_weighted_mass() {
    // cell 3 is isolated in the graph but flows back to 0 in the cycle
    let cycle = CsrMatrix::from_triplets(4, 4, &[(0, 1, 1.0), (1, 2, 1.0), (2, 3, 1.0), (3, 0, 1.0)]).unwrap();
    let store = InMemoryCellStore::new(CellSet::with_len(4))
        .with_pairwise("connectivities", triangle_plus_isolated())
        .unwrap()
        .with_pairwise("cycle", cycle)
        .unwrap();
    let mut conn = connectivity_kernel(&store);
    conn.compute_transition_matrix(false).unwrap();
    let mut flow = PrecomputedKernel::new(&store, "cycle", &KernelConfig::default()).unwrap();
    flow.compute_transition_matrix().unwrap();

    let t1 = conn.transition_matrix().unwrap().clone();
    let t2 = flow.transition_matrix().unwrap().clone();
    assert_eq!(t1.row_sums()[3], 0.0);

    let mut combined = conn.combine(flow).unwrap();
    combined.compute_transition_matrix().unwrap();
    let t = combined.transition_matrix().unwrap();

    assert_relative_eq!(t.get(3, 0), 0.5, epsilon = 1e-12);
    assert_relative_eq!(t.row_sums()[3], 0.5, epsilon = 1e-12);
    for i in 0..4 {
        for j in 0..4 {
            assert_relative_eq!(t.get(i, j), (t1.get(i, j) + t2.get(i, j)) / 2.0, epsilon = 1e-12);
        }
    }
    for s in &t.row_sums()[..3] {
        assert_relative_eq!(*s, 1.0, epsilon = 1e-12);
    }
}

#[test]
fn test_combination_does_not_compute_constituents() {
    let store = build_store(5);
    let mut conn = connectivity_kernel(&store);
    conn.compute_transition_matrix(true).unwrap();
    let vel = PrecomputedKernel::new(&store, "velocity", &KernelConfig::default()).unwrap();

    let mut combined = conn.combine(vel).unwrap();
    assert!(matches!(
        combined.compute_transition_matrix(),
        Err(KernelError::UncomputedConstituent { index: 1, .. })
    ));
    assert!(!combined.constituent(1).unwrap().is_computed());
    // the computed constituent keeps its cache
    assert!(combined.constituent(0).unwrap().is_computed());
}

#[test]
fn test_combined_kernel_persists_under_joined_key() {
    let mut store = build_store(5);
    let mut conn = connectivity_kernel(&store);
    conn.compute_transition_matrix(true).unwrap();
    let mut vel = PrecomputedKernel::new(&store, "velocity", &KernelConfig::default()).unwrap();
    vel.compute_transition_matrix().unwrap();

    let mut combined = conn.combine(vel).unwrap();
    combined.compute_transition_matrix().unwrap();
    let key = combined.write_to(&mut store).unwrap();
    assert_eq!(key, "T_fwd_connectivities+velocity");

    let meta = store.metadata(&format!("{key}_params")).unwrap().unwrap();
    assert_eq!(meta["params"]["terms"].as_array().map(|t| t.len()), Some(2));
}

#[test]
fn test_backward_kernels_combine() {
    let store = build_store(5);
    let config = KernelConfig::default().backward(true);
    let mut conn = ConnectivityKernel::new(&store, &config).unwrap();
    conn.compute_transition_matrix(true).unwrap();
    let mut vel = PrecomputedKernel::new(&store, "velocity", &config).unwrap();
    vel.compute_transition_matrix().unwrap();

    let mut combined = conn.combine(vel).unwrap();
    assert!(combined.backward());
    combined.compute_transition_matrix().unwrap();
    assert_eq!(combined.output_key(), "T_bwd_connectivities+velocity");
}
