//! Coordinate-format (COO) sparse matrix.
//!
//! [`SparseMatrix`] stores non-zero entries as `(row, col, value)` triplets.
//! It is the storage used for cell-cell transition matrices and kNN graphs,
//! and the natural import format for sparse count matrices. Row-oriented
//! algorithms go through [`SparseMatrix::to_csr`].

use std::ops::Range;

use cellfate_core::{CellfateError, Result, Splittable, Summarizable};

/// A sparse matrix in COO (coordinate) format.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
    n_rows: usize,
    n_cols: usize,
}

/// Compressed sparse row view: `indptr[i]..indptr[i + 1]` indexes row `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Csr {
    pub data: Vec<f64>,
    pub indices: Vec<usize>,
    pub indptr: Vec<usize>,
    pub n_rows: usize,
    pub n_cols: usize,
}

impl Csr {
    /// Stored `(col, value)` pairs of one row, sorted by column.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let span = self.indptr[row]..self.indptr[row + 1];
        self.indices[span.clone()]
            .iter()
            .copied()
            .zip(self.data[span].iter().copied())
    }
}

impl SparseMatrix {
    /// Create an empty sparse matrix with the given dimensions.
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self {
            rows: Vec::new(),
            cols: Vec::new(),
            values: Vec::new(),
            n_rows,
            n_cols,
        }
    }

    /// Create a sparse matrix from triplet vectors.
    ///
    /// All three vectors must have the same length, and all indices must be
    /// within bounds.
    pub fn from_triplets(
        rows: Vec<usize>,
        cols: Vec<usize>,
        values: Vec<f64>,
        n_rows: usize,
        n_cols: usize,
    ) -> Result<Self> {
        if rows.len() != cols.len() || cols.len() != values.len() {
            return Err(CellfateError::InvalidInput(
                "rows, cols, and values must have the same length".into(),
            ));
        }
        for (i, (&r, &c)) in rows.iter().zip(cols.iter()).enumerate() {
            if r >= n_rows || c >= n_cols {
                return Err(CellfateError::InvalidInput(format!(
                    "triplet {i} index ({r}, {c}) out of bounds for ({n_rows}, {n_cols})"
                )));
            }
        }
        Ok(Self {
            rows,
            cols,
            values,
            n_rows,
            n_cols,
        })
    }

    /// Insert a single entry. Returns an error if indices are out of bounds.
    pub fn insert(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        if row >= self.n_rows || col >= self.n_cols {
            return Err(CellfateError::InvalidInput(format!(
                "index ({row}, {col}) out of bounds for ({}, {})",
                self.n_rows, self.n_cols
            )));
        }
        self.rows.push(row);
        self.cols.push(col);
        self.values.push(value);
        Ok(())
    }

    /// Get the value at `(row, col)`. Duplicate triplets are summed, missing
    /// entries read as 0.0.
    ///
    /// This is an O(nnz) scan.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.iter()
            .filter(|&(r, c, _)| r == row && c == col)
            .map(|(_, _, v)| v)
            .sum()
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Fraction of entries that are stored: `nnz / (n_rows * n_cols)`.
    fn density(&self) -> f64 {
        let total = self.n_rows as f64 * self.n_cols as f64;
        if total == 0.0 {
            return 0.0;
        }
        self.values.len() as f64 / total
    }

    /// (n_rows, n_cols).
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    /// Whether the matrix has as many rows as columns.
    pub fn is_square(&self) -> bool {
        self.n_rows == self.n_cols
    }

    /// Convert to a dense 2D vector.
    pub fn to_dense(&self) -> Vec<Vec<f64>> {
        let mut dense = vec![vec![0.0; self.n_cols]; self.n_rows];
        for (r, c, v) in self.iter() {
            dense[r][c] += v;
        }
        dense
    }

    /// Create a sparse matrix from dense data, storing only values where `|value| > threshold`.
    pub fn from_dense(data: &[Vec<f64>], threshold: f64) -> Self {
        let n_rows = data.len();
        let n_cols = data.first().map_or(0, |r| r.len());
        let mut m = Self::new(n_rows, n_cols);

        for (r, row) in data.iter().enumerate() {
            for (c, &val) in row.iter().enumerate() {
                if val.abs() > threshold {
                    m.rows.push(r);
                    m.cols.push(c);
                    m.values.push(val);
                }
            }
        }
        m
    }

    /// Sum of stored values in each row.
    pub fn row_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.n_rows];
        for (r, _, v) in self.iter() {
            sums[r] += v;
        }
        sums
    }

    /// Rows `range` as a new matrix with row indices shifted to start at 0.
    pub fn row_block(&self, range: Range<usize>) -> Result<Self> {
        if range.start > range.end || range.end > self.n_rows {
            return Err(CellfateError::InvalidInput(format!(
                "row range {}..{} out of bounds for {} rows",
                range.start, range.end, self.n_rows
            )));
        }
        Ok(self.rows_in(range))
    }

    fn rows_in(&self, range: Range<usize>) -> Self {
        let mut block = Self::new(range.len(), self.n_cols);
        for (r, c, v) in self.iter() {
            if range.contains(&r) {
                block.rows.push(r - range.start);
                block.cols.push(c);
                block.values.push(v);
            }
        }
        block
    }

    /// Convert COO to CSR format.
    ///
    /// Duplicate `(row, col)` triplets are summed and explicit zeros dropped,
    /// so every stored CSR entry is a real edge of the matrix graph.
    pub fn to_csr(&self) -> Csr {
        let nnz = self.values.len();
        let mut order: Vec<usize> = (0..nnz).collect();
        order.sort_by_key(|&i| (self.rows[i], self.cols[i]));

        let mut data: Vec<f64> = Vec::with_capacity(nnz);
        let mut indices: Vec<usize> = Vec::with_capacity(nnz);
        let mut row_of: Vec<usize> = Vec::with_capacity(nnz);

        for &i in &order {
            let (r, c, v) = (self.rows[i], self.cols[i], self.values[i]);
            match (row_of.last(), indices.last()) {
                (Some(&pr), Some(&pc)) if pr == r && pc == c => {
                    if let Some(last) = data.last_mut() {
                        *last += v;
                    }
                }
                _ => {
                    data.push(v);
                    indices.push(c);
                    row_of.push(r);
                }
            }
        }

        let mut indptr = vec![0usize; self.n_rows + 1];
        let mut kept_data = Vec::with_capacity(data.len());
        let mut kept_indices = Vec::with_capacity(indices.len());
        for ((v, c), r) in data.into_iter().zip(indices).zip(row_of) {
            if v != 0.0 {
                kept_data.push(v);
                kept_indices.push(c);
                indptr[r + 1] += 1;
            }
        }
        for i in 1..=self.n_rows {
            indptr[i] += indptr[i - 1];
        }

        Csr {
            data: kept_data,
            indices: kept_indices,
            indptr,
            n_rows: self.n_rows,
            n_cols: self.n_cols,
        }
    }

    /// Iterate over stored triplets `(row, col, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.rows
            .iter()
            .zip(self.cols.iter())
            .zip(self.values.iter())
            .map(|((&r, &c), &v)| (r, c, v))
    }
}

impl Splittable for SparseMatrix {
    fn n_items(&self) -> usize {
        self.n_rows
    }

    fn split(&self, range: Range<usize>) -> Self {
        self.rows_in(range)
    }
}

impl Summarizable for SparseMatrix {
    fn summary(&self) -> String {
        format!(
            "SparseMatrix: {}\u{00d7}{}, {} nonzeros ({:.2}% density)",
            self.n_rows,
            self.n_cols,
            self.nnz(),
            self.density() * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellfate_core::{concatenate, parallelize_with, Chunk, ParallelConfig};

    fn chain(n: usize) -> SparseMatrix {
        let mut m = SparseMatrix::new(n, n);
        for i in 0..n {
            m.insert(i, (i + 1) % n, 1.0).unwrap();
        }
        m
    }

    #[test]
    fn from_triplets_bounds_check() {
        let result = SparseMatrix::from_triplets(vec![5], vec![0], vec![1.0], 3, 3);
        assert!(result.is_err());
        let result = SparseMatrix::from_triplets(vec![0, 1], vec![0], vec![1.0], 3, 3);
        assert!(result.is_err());
    }

    #[test]
    fn get_sums_duplicates() {
        let m = SparseMatrix::from_triplets(vec![0, 0], vec![1, 1], vec![0.25, 0.5], 2, 2).unwrap();
        assert_eq!(m.get(0, 1), 0.75);
        assert_eq!(m.get(1, 1), 0.0);
        assert_eq!(m.to_dense(), vec![vec![0.0, 0.75], vec![0.0, 0.0]]);
    }

    #[test]
    fn row_sums_of_stochastic_matrix() {
        let m = SparseMatrix::from_dense(&[vec![0.5, 0.5], vec![0.0, 1.0]], 0.0);
        assert_eq!(m.row_sums(), vec![1.0, 1.0]);
        assert_eq!(m.nnz(), 3);
    }

    #[test]
    fn csr_merges_duplicates_and_drops_zeros() {
        let m = SparseMatrix::from_triplets(
            vec![1, 0, 1, 1],
            vec![0, 2, 0, 1],
            vec![1.0, 2.0, 3.0, 0.0],
            2,
            3,
        )
        .unwrap();
        let csr = m.to_csr();
        assert_eq!(csr.indptr, vec![0, 1, 2]);
        assert_eq!(csr.indices, vec![2, 0]);
        assert_eq!(csr.data, vec![2.0, 4.0]);
        assert_eq!(csr.row(1).collect::<Vec<_>>(), vec![(0, 4.0)]);
    }

    #[test]
    fn row_block_shifts_rows() {
        let m = chain(4);
        let block = m.row_block(1..3).unwrap();
        assert_eq!(block.shape(), (2, 4));
        assert_eq!(block.get(0, 2), 1.0);
        assert_eq!(block.get(1, 3), 1.0);
        assert!(m.row_block(3..5).is_err());
    }

    #[test]
    fn parallel_row_chunks_keep_row_order() {
        // 3 rows, one chunk per row at most; each worker returns a constant per row.
        let m = SparseMatrix::from_dense(
            &[
                vec![0.1, 0.0, 0.9],
                vec![0.0, 0.5, 0.5],
                vec![1.0, 0.0, 0.0],
            ],
            0.0,
        );
        for n_jobs in [1, 3, 4] {
            let config = ParallelConfig {
                n_jobs,
                progress: None,
            };
            let out = parallelize_with(
                |chunk: Chunk<SparseMatrix>| {
                    assert_eq!(chunk.data.shape().1, 3);
                    Ok((0..chunk.data.shape().0)
                        .map(|r| (chunk.offset + r, 42))
                        .collect::<Vec<_>>())
                },
                &m,
                &config,
                |parts| Ok(concatenate(parts)),
            )
            .unwrap();
            assert_eq!(out, vec![(0, 42), (1, 42), (2, 42)]);
        }
    }

    #[test]
    fn summary() {
        let m = SparseMatrix::from_triplets(vec![0], vec![0], vec![1.0], 100, 50).unwrap();
        assert_eq!(
            m.summary(),
            "SparseMatrix: 100\u{00d7}50, 1 nonzeros (0.02% density)"
        );
    }
}
