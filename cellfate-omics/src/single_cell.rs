//! AnnData-like container for single-cell data.
//!
//! Provides an in-memory representation inspired by the Python AnnData format,
//! the standard data structure in the scverse ecosystem.
//!
//! # Structure
//!
//! - `X` — primary data matrix (cells × genes), dense or sparse
//! - `obs` / `var` — per-cell and per-gene annotation columns
//! - `obsm` — multi-dimensional cell annotations (embeddings, lineage memberships)
//! - `obsp` — cell × cell matrices (kNN graphs, transition matrices)
//! - `uns` — unstructured string metadata
//! - `raw` — an optional frozen alternate view with its own gene axis
//!
//! # Example
//!
//! ```
//! use cellfate_omics::single_cell::{AnnData, MatrixData};
//!
//! let x = MatrixData::Dense(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
//! let adata = AnnData::new(
//!     x,
//!     vec!["cell_1".into(), "cell_2".into()],
//!     vec!["gene_a".into(), "gene_b".into()],
//! ).unwrap();
//! assert_eq!(adata.n_obs(), 2);
//! assert_eq!(adata.n_vars(), 2);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use cellfate_core::{CellfateError, Result, Summarizable};

use crate::series::Series;
use crate::sparse::SparseMatrix;

/// A data matrix, either dense or sparse.
#[derive(Debug, Clone, PartialEq)]
pub enum MatrixData {
    /// Dense row-major matrix.
    Dense(Vec<Vec<f64>>),
    /// Sparse COO matrix.
    Sparse(SparseMatrix),
}

impl MatrixData {
    /// (n_rows, n_cols).
    pub fn shape(&self) -> (usize, usize) {
        match self {
            MatrixData::Dense(rows) => {
                let n_rows = rows.len();
                let n_cols = rows.first().map_or(0, |r| r.len());
                (n_rows, n_cols)
            }
            MatrixData::Sparse(s) => s.shape(),
        }
    }

    /// Get a value at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        match self {
            MatrixData::Dense(rows) => {
                rows.get(row).and_then(|r| r.get(col)).copied().unwrap_or(0.0)
            }
            MatrixData::Sparse(s) => s.get(row, col),
        }
    }

    /// One column as a dense vector.
    pub fn column(&self, col: usize) -> Vec<f64> {
        match self {
            MatrixData::Dense(rows) => rows
                .iter()
                .map(|r| r.get(col).copied().unwrap_or(0.0))
                .collect(),
            MatrixData::Sparse(s) => {
                let mut out = vec![0.0; s.shape().0];
                for (r, c, v) in s.iter() {
                    if c == col {
                        out[r] += v;
                    }
                }
                out
            }
        }
    }

    /// Sum of values in each row.
    pub fn row_sums(&self) -> Vec<f64> {
        match self {
            MatrixData::Dense(rows) => rows.iter().map(|r| r.iter().sum()).collect(),
            MatrixData::Sparse(s) => s.row_sums(),
        }
    }

    /// Sparse copy of this matrix (explicit zeros of a dense matrix are dropped).
    pub fn to_sparse(&self) -> SparseMatrix {
        match self {
            MatrixData::Dense(rows) => SparseMatrix::from_dense(rows, 0.0),
            MatrixData::Sparse(s) => s.clone(),
        }
    }
}

impl From<SparseMatrix> for MatrixData {
    fn from(m: SparseMatrix) -> Self {
        MatrixData::Sparse(m)
    }
}

impl From<Vec<Vec<f64>>> for MatrixData {
    fn from(rows: Vec<Vec<f64>>) -> Self {
        MatrixData::Dense(rows)
    }
}

/// A metadata column with typed data.
///
/// Supports string, numeric, and categorical columns as found in `.h5ad` files.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColumnData {
    /// Free-text string values.
    Strings(Vec<String>),
    /// Numeric (f64) values.
    Numeric(Vec<f64>),
    /// Categorical data stored as integer codes indexing into a category list.
    /// A code of `-1` marks a missing value.
    Categorical {
        codes: Vec<i32>,
        categories: Vec<String>,
    },
}

impl ColumnData {
    /// Number of elements in this column.
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Strings(v) => v.len(),
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Categorical { codes, .. } => codes.len(),
        }
    }

    /// Whether the column is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Try to get as string slice. Returns `None` if not `Strings` variant.
    pub fn as_strings(&self) -> Option<&Vec<String>> {
        match self {
            ColumnData::Strings(v) => Some(v),
            _ => None,
        }
    }

    /// Try to get as numeric slice. Returns `None` if not `Numeric` variant.
    pub fn as_numeric(&self) -> Option<&Vec<f64>> {
        match self {
            ColumnData::Numeric(v) => Some(v),
            _ => None,
        }
    }

    /// Human-readable name of the column kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ColumnData::Strings(_) => "string",
            ColumnData::Numeric(_) => "numeric",
            ColumnData::Categorical { .. } => "categorical",
        }
    }

    /// Render every entry as a label. Missing categorical entries are `None`.
    ///
    /// Returns `None` for numeric columns.
    pub fn labels(&self) -> Option<Vec<Option<String>>> {
        match self {
            ColumnData::Strings(v) => Some(v.iter().cloned().map(Some).collect()),
            ColumnData::Numeric(_) => None,
            ColumnData::Categorical { codes, categories } => Some(
                codes
                    .iter()
                    .map(|&c| usize::try_from(c).ok().and_then(|c| categories.get(c).cloned()))
                    .collect(),
            ),
        }
    }
}

/// Frozen alternate view of the data with its own gene axis (e.g. unfiltered
/// log-normalized expression kept next to a highly-variable-gene subset).
#[derive(Debug, Clone)]
pub struct Raw {
    x: Arc<MatrixData>,
    var_names: Vec<String>,
    var: HashMap<String, ColumnData>,
}

impl Raw {
    /// Create a raw view; `var_names` must match the matrix columns.
    pub fn new(x: MatrixData, var_names: Vec<String>) -> Result<Self> {
        let (_, n_vars) = x.shape();
        if var_names.len() != n_vars {
            return Err(CellfateError::InvalidInput(format!(
                "raw var_names length ({}) does not match n_vars ({})",
                var_names.len(),
                n_vars
            )));
        }
        Ok(Self {
            x: Arc::new(x),
            var_names,
            var: HashMap::new(),
        })
    }

    /// The raw data matrix.
    pub fn x(&self) -> &MatrixData {
        &self.x
    }

    /// Number of cells in the raw view.
    pub fn n_obs(&self) -> usize {
        self.x.shape().0
    }

    /// Number of genes in the raw view.
    pub fn n_vars(&self) -> usize {
        self.var_names.len()
    }

    /// Gene names of the raw view.
    pub fn var_names(&self) -> &[String] {
        &self.var_names
    }

    /// Add a per-gene annotation column to the raw view.
    pub fn add_var_column(&mut self, key: &str, data: ColumnData) -> Result<()> {
        if data.len() != self.n_vars() {
            return Err(CellfateError::InvalidInput(format!(
                "raw var '{}' length ({}) does not match n_vars ({})",
                key,
                data.len(),
                self.n_vars()
            )));
        }
        self.var.insert(key.to_string(), data);
        Ok(())
    }

    /// Per-gene annotation column of the raw view.
    pub fn get_var(&self, key: &str) -> Option<&ColumnData> {
        self.var.get(key)
    }

    /// Copy of this view with another gene axis, sharing the data matrix.
    pub(crate) fn with_var_names(&self, var_names: Vec<String>) -> Self {
        Self {
            x: Arc::clone(&self.x),
            var_names,
            var: self.var.clone(),
        }
    }

    /// Whether two views share the same underlying data matrix.
    pub fn shares_data_with(&self, other: &Raw) -> bool {
        Arc::ptr_eq(&self.x, &other.x)
    }
}

/// AnnData-like container for single-cell data.
#[derive(Debug, Clone)]
pub struct AnnData {
    /// Primary data matrix (n_obs × n_vars).
    x: MatrixData,
    /// Observation (cell) names.
    obs_names: Vec<String>,
    /// Variable (gene) names.
    var_names: Vec<String>,
    /// Per-cell metadata.
    obs: HashMap<String, ColumnData>,
    /// Per-gene metadata.
    var: HashMap<String, ColumnData>,
    /// Multi-dimensional observation annotations.
    obsm: HashMap<String, Vec<Vec<f64>>>,
    /// Pairwise observation annotations (kNN graphs, transition matrices).
    obsp: HashMap<String, SparseMatrix>,
    /// Unstructured metadata (free-form key-value pairs).
    uns: HashMap<String, String>,
    /// Alternate frozen view.
    raw: Option<Arc<Raw>>,
}

impl AnnData {
    /// Create a new AnnData container.
    ///
    /// # Errors
    ///
    /// Returns an error if the matrix dimensions don't match the name vectors.
    pub fn new(x: MatrixData, obs_names: Vec<String>, var_names: Vec<String>) -> Result<Self> {
        let (n_obs, n_vars) = x.shape();
        if obs_names.len() != n_obs {
            return Err(CellfateError::InvalidInput(format!(
                "obs_names length ({}) does not match n_obs ({})",
                obs_names.len(),
                n_obs
            )));
        }
        if var_names.len() != n_vars {
            return Err(CellfateError::InvalidInput(format!(
                "var_names length ({}) does not match n_vars ({})",
                var_names.len(),
                n_vars
            )));
        }

        Ok(Self {
            x,
            obs_names,
            var_names,
            obs: HashMap::new(),
            var: HashMap::new(),
            obsm: HashMap::new(),
            obsp: HashMap::new(),
            uns: HashMap::new(),
            raw: None,
        })
    }

    /// Number of observations (cells).
    pub fn n_obs(&self) -> usize {
        self.obs_names.len()
    }

    /// Number of variables (genes).
    pub fn n_vars(&self) -> usize {
        self.var_names.len()
    }

    /// Shape of the primary data matrix.
    pub fn shape(&self) -> (usize, usize) {
        self.x.shape()
    }

    /// Access the primary data matrix.
    pub fn x(&self) -> &MatrixData {
        &self.x
    }

    /// Observation names.
    pub fn obs_names(&self) -> &[String] {
        &self.obs_names
    }

    /// Variable names.
    pub fn var_names(&self) -> &[String] {
        &self.var_names
    }

    /// Swap the gene axis labels, returning the previous ones.
    pub(crate) fn replace_var_names(&mut self, names: Vec<String>) -> Vec<String> {
        std::mem::replace(&mut self.var_names, names)
    }

    /// Add a per-cell metadata column of any type.
    pub fn add_obs_column(&mut self, key: &str, data: ColumnData) -> Result<()> {
        if data.len() != self.n_obs() {
            return Err(CellfateError::InvalidInput(format!(
                "obs '{}' length ({}) does not match n_obs ({})",
                key,
                data.len(),
                self.n_obs()
            )));
        }
        self.obs.insert(key.to_string(), data);
        Ok(())
    }

    /// Add a per-cell numeric metadata column.
    pub fn add_obs_numeric(&mut self, key: &str, values: Vec<f64>) -> Result<()> {
        self.add_obs_column(key, ColumnData::Numeric(values))
    }

    /// Get per-cell metadata column as typed data.
    pub fn get_obs(&self, key: &str) -> Option<&ColumnData> {
        self.obs.get(key)
    }

    /// A per-cell column as a [`Series`] indexed by the cell names.
    pub fn obs_series(&self, key: &str) -> Option<Series> {
        self.obs
            .get(key)
            .map(|col| Series::new_unchecked(self.obs_names.clone(), col.clone()))
    }

    /// Store a [`Series`] as a per-cell column. Its index must equal the cell names.
    pub fn set_obs_series(&mut self, key: &str, series: &Series) -> Result<()> {
        if series.index() != self.obs_names.as_slice() {
            return Err(CellfateError::InvalidInput(format!(
                "index of series '{key}' does not match obs_names"
            )));
        }
        self.add_obs_column(key, series.values().clone())
    }

    /// Add a per-gene metadata column of any type.
    pub fn add_var_column(&mut self, key: &str, data: ColumnData) -> Result<()> {
        if data.len() != self.n_vars() {
            return Err(CellfateError::InvalidInput(format!(
                "var '{}' length ({}) does not match n_vars ({})",
                key,
                data.len(),
                self.n_vars()
            )));
        }
        self.var.insert(key.to_string(), data);
        Ok(())
    }

    /// Get per-gene metadata column as typed data.
    pub fn get_var(&self, key: &str) -> Option<&ColumnData> {
        self.var.get(key)
    }

    /// Add a multi-dimensional observation annotation.
    pub fn add_obsm(&mut self, key: &str, data: Vec<Vec<f64>>) -> Result<()> {
        if data.len() != self.n_obs() {
            return Err(CellfateError::InvalidInput(format!(
                "obsm '{}' length ({}) does not match n_obs ({})",
                key,
                data.len(),
                self.n_obs()
            )));
        }
        self.obsm.insert(key.to_string(), data);
        Ok(())
    }

    /// Get a multi-dimensional observation annotation.
    pub fn get_obsm(&self, key: &str) -> Option<&Vec<Vec<f64>>> {
        self.obsm.get(key)
    }

    /// Add a pairwise observation annotation. The matrix must be n_obs × n_obs.
    pub fn add_obsp(&mut self, key: &str, matrix: SparseMatrix) -> Result<()> {
        let (r, c) = matrix.shape();
        if r != self.n_obs() || c != self.n_obs() {
            return Err(CellfateError::InvalidInput(format!(
                "obsp '{}' shape ({}, {}) does not match n_obs ({})",
                key,
                r,
                c,
                self.n_obs()
            )));
        }
        self.obsp.insert(key.to_string(), matrix);
        Ok(())
    }

    /// Get a pairwise observation annotation.
    pub fn get_obsp(&self, key: &str) -> Option<&SparseMatrix> {
        self.obsp.get(key)
    }

    /// Add unstructured metadata.
    pub fn add_uns(&mut self, key: &str, value: String) {
        self.uns.insert(key.to_string(), value);
    }

    /// Get unstructured metadata.
    pub fn get_uns(&self, key: &str) -> Option<&str> {
        self.uns.get(key).map(|s| s.as_str())
    }

    /// The raw view, if one is attached.
    pub fn raw(&self) -> Option<&Arc<Raw>> {
        self.raw.as_ref()
    }

    /// Attach a raw view. It must describe the same cells.
    pub fn set_raw(&mut self, raw: Raw) -> Result<()> {
        if raw.n_obs() != self.n_obs() {
            return Err(CellfateError::InvalidInput(format!(
                "raw n_obs ({}) does not match n_obs ({})",
                raw.n_obs(),
                self.n_obs()
            )));
        }
        self.raw = Some(Arc::new(raw));
        Ok(())
    }

    /// Detach and return the raw view.
    pub fn take_raw(&mut self) -> Option<Arc<Raw>> {
        self.raw.take()
    }

    /// Put a raw view handle in place, returning the previous one.
    pub(crate) fn replace_raw(&mut self, raw: Option<Arc<Raw>>) -> Option<Arc<Raw>> {
        std::mem::replace(&mut self.raw, raw)
    }

    /// Expression of one gene across all cells, read from `X` or the raw view.
    ///
    /// # Errors
    ///
    /// [`CellfateError::KeyNotFound`] if the gene is not on the selected axis.
    pub fn gene_expression(&self, gene: &str, use_raw: bool) -> Result<Vec<f64>> {
        let (names, x) = if use_raw {
            let raw = self.raw.as_ref().ok_or_else(|| {
                CellfateError::InvalidInput("use_raw was requested but no raw view is attached".into())
            })?;
            (raw.var_names(), raw.x())
        } else {
            (self.var_names.as_slice(), &self.x)
        };
        let idx = names
            .iter()
            .position(|g| g == gene)
            .ok_or_else(|| CellfateError::KeyNotFound(format!("gene `{gene}` not found")))?;
        Ok(x.column(idx))
    }
}

impl Summarizable for AnnData {
    fn summary(&self) -> String {
        format!(
            "AnnData: {} obs \u{00d7} {} vars, {} obsm, {} obsp, {} uns, raw: {}",
            self.n_obs(),
            self.n_vars(),
            self.obsm.len(),
            self.obsp.len(),
            self.uns.len(),
            if self.raw.is_some() { "yes" } else { "no" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_adata() -> AnnData {
        let x = MatrixData::Dense(vec![
            vec![1.0, 2.0, 0.0],
            vec![3.0, 0.0, 4.0],
            vec![0.0, 5.0, 6.0],
        ]);
        AnnData::new(
            x,
            vec!["cell_1".into(), "cell_2".into(), "cell_3".into()],
            vec!["gene_a".into(), "gene_b".into(), "gene_c".into()],
        )
        .unwrap()
    }

    #[test]
    fn dimension_mismatch_error() {
        let x = MatrixData::Dense(vec![vec![1.0, 2.0]]);
        let result = AnnData::new(
            x,
            vec!["cell_1".into(), "cell_2".into()],
            vec!["gene_a".into(), "gene_b".into()],
        );
        assert!(result.is_err());
    }

    #[test]
    fn obs_series_roundtrip() {
        let mut adata = sample_adata();
        let col = ColumnData::Categorical {
            codes: vec![0, -1, 1],
            categories: vec!["Alpha".into(), "Beta".into()],
        };
        adata.add_obs_column("terminal_states", col.clone()).unwrap();
        let series = adata.obs_series("terminal_states").unwrap();
        assert_eq!(series.index(), adata.obs_names());
        assert_eq!(series.values(), &col);
        adata.set_obs_series("copy", &series).unwrap();
        assert_eq!(adata.get_obs("copy"), Some(&col));
    }

    #[test]
    fn categorical_labels_with_missing() {
        let col = ColumnData::Categorical {
            codes: vec![1, -1, 0],
            categories: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            col.labels().unwrap(),
            vec![Some("b".to_string()), None, Some("a".to_string())]
        );
        assert!(ColumnData::Numeric(vec![1.0]).labels().is_none());
    }

    #[test]
    fn obsp_shape_checked() {
        let mut adata = sample_adata();
        assert!(adata.add_obsp("T_fwd", SparseMatrix::new(2, 2)).is_err());
        adata.add_obsp("T_fwd", SparseMatrix::new(3, 3)).unwrap();
        assert!(adata.get_obsp("T_fwd").is_some());
    }

    #[test]
    fn gene_expression_from_x_and_raw() {
        let mut adata = sample_adata();
        assert_eq!(adata.gene_expression("gene_b", false).unwrap(), vec![2.0, 0.0, 5.0]);
        assert!(matches!(
            adata.gene_expression("nope", false),
            Err(CellfateError::KeyNotFound(_))
        ));
        assert!(adata.gene_expression("gene_b", true).is_err());

        let raw = Raw::new(
            MatrixData::Sparse(SparseMatrix::from_dense(&[vec![7.0], vec![0.0], vec![1.0]], 0.0)),
            vec!["gene_z".into()],
        )
        .unwrap();
        adata.set_raw(raw).unwrap();
        assert_eq!(adata.gene_expression("gene_z", true).unwrap(), vec![7.0, 0.0, 1.0]);
    }

    #[test]
    fn raw_must_match_cells() {
        let mut adata = sample_adata();
        let raw = Raw::new(MatrixData::Dense(vec![vec![1.0]]), vec!["g".into()]).unwrap();
        assert!(adata.set_raw(raw).is_err());
    }

    #[test]
    fn summary() {
        let adata = sample_adata();
        assert_eq!(
            adata.summary(),
            "AnnData: 3 obs \u{00d7} 3 vars, 0 obsm, 0 obsp, 0 uns, raw: no"
        );
    }
}
