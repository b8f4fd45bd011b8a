//! Graph structure of transition matrices.
//!
//! A square matrix is read as a directed graph with an edge `i -> j` for every
//! non-zero entry `(i, j)`. Irreducibility and the recurrent/transient
//! partition decide whether a stationary analysis is meaningful and which
//! states are long-term sinks.

use std::collections::VecDeque;

use cellfate_core::{CellfateError, Result};
use cellfate_omics::{Csr, MatrixData};

/// Tolerance used by [`is_symmetric`].
pub const SYMMETRY_TOL: f64 = 1e-12;

/// Recurrent and transient communication classes of a transition matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Classes that no edge leaves.
    pub recurrent: Vec<Vec<usize>>,
    /// All other classes.
    pub transient: Vec<Vec<usize>>,
}

pub(crate) fn square_csr(matrix: &MatrixData) -> Result<Csr> {
    if let MatrixData::Dense(rows) = matrix {
        let n = rows.len();
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n) {
            return Err(CellfateError::InvalidInput(format!(
                "expected a square matrix, row {i} has {} entries for {n} rows",
                row.len()
            )));
        }
    }
    let sparse = matrix.to_sparse();
    let (n_rows, n_cols) = sparse.shape();
    if !sparse.is_square() {
        return Err(CellfateError::InvalidInput(format!(
            "expected a square matrix, found {n_rows}\u{00d7}{n_cols}"
        )));
    }
    if n_rows == 0 {
        return Err(CellfateError::InvalidInput("expected a non-empty matrix".into()));
    }
    let csr = sparse.to_csr();
    if let Some(&j) = csr.indices.iter().find(|&&j| j >= n_cols) {
        return Err(CellfateError::InvalidInput(format!(
            "column index {j} out of bounds for {n_cols} columns"
        )));
    }
    Ok(csr)
}

fn adjacency(csr: &Csr) -> Vec<Vec<usize>> {
    (0..csr.n_rows)
        .map(|i| csr.row(i).map(|(j, _)| j).collect())
        .collect()
}

/// Strongly connected components (iterative Tarjan).
///
/// Components are sorted by their smallest member, members ascending.
fn strongly_connected_components(adj: &[Vec<usize>]) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;

    let n = adj.len();
    let mut index = vec![UNVISITED; n];
    let mut low = vec![0; n];
    let mut on_stack = vec![false; n];
    let mut stack = Vec::new();
    let mut frames: Vec<(usize, usize)> = Vec::new();
    let mut components = Vec::new();
    let mut counter = 0;

    for root in 0..n {
        if index[root] != UNVISITED {
            continue;
        }
        index[root] = counter;
        low[root] = counter;
        counter += 1;
        stack.push(root);
        on_stack[root] = true;
        frames.push((root, 0));

        while let Some(frame) = frames.last_mut() {
            let v = frame.0;
            if let Some(&w) = adj[v].get(frame.1) {
                frame.1 += 1;
                if index[w] == UNVISITED {
                    index[w] = counter;
                    low[w] = counter;
                    counter += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    frames.push((w, 0));
                } else if on_stack[w] {
                    low[v] = low[v].min(index[w]);
                }
                continue;
            }

            frames.pop();
            if let Some(&(parent, _)) = frames.last() {
                low[parent] = low[parent].min(low[v]);
            }
            if low[v] == index[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                component.sort_unstable();
                components.push(component);
            }
        }
    }

    components.sort_unstable_by_key(|c| c[0]);
    components
}

/// Whether the directed graph of non-zero entries is strongly connected.
pub fn is_irreducible(matrix: &MatrixData) -> Result<bool> {
    let csr = square_csr(matrix)?;
    Ok(strongly_connected_components(&adjacency(&csr)).len() == 1)
}

/// Whether every node is reachable from node 0 when edge direction is ignored.
pub fn is_connected(matrix: &MatrixData) -> Result<bool> {
    let csr = square_csr(matrix)?;
    let n = csr.n_rows;
    let mut undirected = vec![Vec::new(); n];
    for (i, row) in adjacency(&csr).into_iter().enumerate() {
        for j in row {
            undirected[i].push(j);
            undirected[j].push(i);
        }
    }

    let mut visited = vec![false; n];
    let mut queue = VecDeque::new();
    queue.push_back(0);
    visited[0] = true;
    let mut reached = 1;
    while let Some(curr) = queue.pop_front() {
        for &next in &undirected[curr] {
            if !visited[next] {
                visited[next] = true;
                reached += 1;
                queue.push_back(next);
            }
        }
    }
    Ok(reached == n)
}

/// Whether the matrix equals its transpose within [`SYMMETRY_TOL`].
pub fn is_symmetric(matrix: &MatrixData) -> Result<bool> {
    let csr = square_csr(matrix)?;
    let lookup = |i: usize, j: usize| -> f64 {
        let span = csr.indptr[i]..csr.indptr[i + 1];
        csr.indices[span.clone()]
            .binary_search(&j)
            .map_or(0.0, |k| csr.data[span.start + k])
    };
    for i in 0..csr.n_rows {
        for (j, v) in csr.row(i) {
            if (v - lookup(j, i)).abs() > SYMMETRY_TOL {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Split the nodes into recurrent and transient communication classes.
pub fn partition(matrix: &MatrixData) -> Result<Partition> {
    let csr = square_csr(matrix)?;
    let adj = adjacency(&csr);
    let components = strongly_connected_components(&adj);

    let mut class_of = vec![0; adj.len()];
    for (c, members) in components.iter().enumerate() {
        for &m in members {
            class_of[m] = c;
        }
    }

    let mut recurrent = Vec::new();
    let mut transient = Vec::new();
    for (c, members) in components.into_iter().enumerate() {
        let closed = members
            .iter()
            .all(|&m| adj[m].iter().all(|&j| class_of[j] == c));
        if closed {
            recurrent.push(members);
        } else {
            transient.push(members);
        }
    }

    tracing::debug!(
        n_recurrent = recurrent.len(),
        n_transient = transient.len(),
        "partitioned transition matrix"
    );
    Ok(Partition {
        recurrent,
        transient,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use cellfate_omics::SparseMatrix;

    fn ring(n: usize) -> Vec<(usize, usize, f64)> {
        (0..n)
            .flat_map(|i| [(i, (i + 1) % n, 0.5), (i, (i + n - 1) % n, 0.5)])
            .collect()
    }

    fn sparse(n: usize, triplets: Vec<(usize, usize, f64)>) -> MatrixData {
        let mut m = SparseMatrix::new(n, n);
        for (r, c, v) in triplets {
            m.insert(r, c, v).unwrap();
        }
        MatrixData::Sparse(m)
    }

    /// Skewed 12-node ring: irreducible, not symmetric.
    pub(crate) fn irreducible_ring() -> MatrixData {
        let mut t = Vec::new();
        for i in 0..12 {
            t.push((i, (i + 1) % 12, 0.7));
            t.push((i, (i + 11) % 12, 0.3));
        }
        sparse(12, t)
    }

    /// Ring 0..12 that leaks into the closed pair {12, 13}.
    pub(crate) fn leaking_ring() -> MatrixData {
        let mut t = ring(12);
        t.retain(|&(r, _, _)| r != 11);
        t.push((11, 10, 0.5));
        t.push((11, 12, 0.5));
        t.push((12, 13, 1.0));
        t.push((13, 12, 1.0));
        sparse(14, t)
    }

    /// Ring 0..12 and the pair {12, 13} without any edge between them.
    fn disconnected() -> MatrixData {
        let mut t = ring(12);
        t.push((12, 13, 1.0));
        t.push((13, 12, 1.0));
        sparse(14, t)
    }

    #[test]
    fn irreducibility() {
        assert!(is_irreducible(&irreducible_ring()).unwrap());
        assert!(!is_irreducible(&leaking_ring()).unwrap());
    }

    #[test]
    fn connectivity() {
        assert!(is_connected(&irreducible_ring()).unwrap());
        assert!(is_connected(&leaking_ring()).unwrap());
        assert!(!is_connected(&disconnected()).unwrap());
    }

    #[test]
    fn symmetry() {
        assert!(!is_symmetric(&irreducible_ring()).unwrap());
        let dense = MatrixData::Dense(vec![
            vec![0.0, 0.5, 0.5],
            vec![0.5, 0.0, 0.5],
            vec![0.5, 0.5, 0.0],
        ]);
        assert!(is_symmetric(&dense).unwrap());
    }

    #[test]
    fn partition_irreducible() {
        let p = partition(&irreducible_ring()).unwrap();
        assert_eq!(p.recurrent, vec![(0..12).collect::<Vec<_>>()]);
        assert!(p.transient.is_empty());
    }

    #[test]
    fn partition_with_sink() {
        let p = partition(&leaking_ring()).unwrap();
        assert_eq!(p.recurrent, vec![vec![12, 13]]);
        assert_eq!(p.transient, vec![(0..12).collect::<Vec<_>>()]);
    }

    #[test]
    fn partition_disconnected() {
        let p = partition(&disconnected()).unwrap();
        assert_eq!(p.recurrent, vec![(0..12).collect::<Vec<_>>(), vec![12, 13]]);
        assert!(p.transient.is_empty());
    }

    #[test]
    fn singleton_classes_are_ordered() {
        // 2 -> 1 -> 0, 0 absorbing
        let m = MatrixData::Dense(vec![
            vec![1.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
        ]);
        let p = partition(&m).unwrap();
        assert_eq!(p.recurrent, vec![vec![0]]);
        assert_eq!(p.transient, vec![vec![1], vec![2]]);
    }

    #[test]
    fn non_square_rejected() {
        let m = MatrixData::Dense(vec![vec![1.0, 0.0]]);
        assert!(partition(&m).is_err());
        assert!(is_symmetric(&m).is_err());
    }

    #[test]
    fn ragged_dense_rejected() {
        let longer = MatrixData::Dense(vec![vec![0.0, 1.0], vec![0.0, 0.0, 1.0]]);
        let shorter = MatrixData::Dense(vec![vec![0.0, 1.0], vec![1.0]]);
        for m in [&longer, &shorter] {
            assert!(matches!(partition(m), Err(CellfateError::InvalidInput(_))));
            assert!(matches!(is_irreducible(m), Err(CellfateError::InvalidInput(_))));
            assert!(matches!(is_connected(m), Err(CellfateError::InvalidInput(_))));
            assert!(matches!(is_symmetric(m), Err(CellfateError::InvalidInput(_))));
        }
    }

    #[test]
    fn empty_matrix_rejected() {
        let m = MatrixData::Dense(Vec::new());
        assert!(matches!(partition(&m), Err(CellfateError::InvalidInput(_))));
        assert!(matches!(
            partition(&MatrixData::Sparse(SparseMatrix::new(0, 0))),
            Err(CellfateError::InvalidInput(_))
        ));
    }
}
