//! Numerical and structural diagnostics for transition matrices.
//!
//! Both diagnostics are explicit: nothing in the computation path calls them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::CsrMatrix;

/// 2-norm condition number `sigma_max / sigma_min`.
///
/// Densifies the matrix and runs a full SVD, so cost is `O(N^3)` time and
/// `O(N^2)` memory. Singular matrices yield `f64::INFINITY`; the empty matrix
/// yields `1.0`.
pub fn condition_number(matrix: &CsrMatrix) -> f64 {
    if matrix.n_rows() == 0 || matrix.n_cols() == 0 {
        return 1.0;
    }
    let singular = matrix.to_dense().singular_values();
    let max = singular.iter().copied().fold(0.0_f64, f64::max);
    let min = singular.iter().copied().fold(f64::INFINITY, f64::min);
    if min <= 0.0 {
        f64::INFINITY
    } else {
        max / min
    }
}

/// Connected components of a matrix viewed as an undirected graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityReport {
    /// Component label of each cell, numbered in order of first appearance.
    pub labels: Vec<usize>,
    /// Size of each component, largest first.
    pub component_sizes: Vec<usize>,
}

impl ConnectivityReport {
    /// Number of components.
    pub fn n_components(&self) -> usize {
        self.component_sizes.len()
    }

    /// Whether the graph has a single component (the empty graph counts as connected).
    pub fn is_connected(&self) -> bool {
        self.component_sizes.len() <= 1
    }

    /// Cells in components of size one.
    pub fn isolated_cells(&self) -> Vec<usize> {
        let mut counts: HashMap<usize, usize> = HashMap::new();
        for &l in &self.labels {
            *counts.entry(l).or_default() += 1;
        }
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, l)| counts.get(l) == Some(&1))
            .map(|(i, _)| i)
            .collect()
    }
}

// ── Union-Find ──────────────────────────────────────────────────────────────

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // path compression
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, x: usize, y: usize) {
        let rx = self.find(x);
        let ry = self.find(y);
        if rx == ry {
            return;
        }
        if self.rank[rx] < self.rank[ry] {
            self.parent[rx] = ry;
        } else if self.rank[rx] > self.rank[ry] {
            self.parent[ry] = rx;
        } else {
            self.parent[ry] = rx;
            self.rank[rx] += 1;
        }
    }
}

/// Weakly connected components of a square matrix.
///
/// Every stored entry with a positive value is an undirected edge.
pub fn connected_components(matrix: &CsrMatrix) -> ConnectivityReport {
    let n = matrix.n_rows().min(matrix.n_cols());
    let mut uf = UnionFind::new(n);

    for (i, j, v) in matrix.triplets() {
        if v > 0.0 && i < n && j < n {
            uf.union(i, j);
        }
    }

    let mut root_to_label: HashMap<usize, usize> = HashMap::new();
    let mut sizes: Vec<usize> = Vec::new();
    let labels: Vec<usize> = (0..n)
        .map(|i| {
            let root = uf.find(i);
            let next = root_to_label.len();
            let label = *root_to_label.entry(root).or_insert(next);
            if label == sizes.len() {
                sizes.push(0);
            }
            sizes[label] += 1;
            label
        })
        .collect();

    sizes.sort_unstable_by(|a, b| b.cmp(a));

    ConnectivityReport {
        labels,
        component_sizes: sizes,
    }
}
