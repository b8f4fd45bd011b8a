//! Single-cell data containers and annotation utilities for cellfate.
//!
//! This crate provides the data side of the toolkit:
//!
//! - **Sparse matrices** — [`SparseMatrix`] in COO format with a CSR view
//! - **AnnData** — [`AnnData`] with `obs`/`var`/`obsm`/`obsp`/`uns` and a [`Raw`] view
//! - **Series** — labelled columns, categorical or not ([`Series`])
//! - **Categorical utilities** — [`merge_categorical`], [`process_series`],
//!   one-hot encoding and decoding
//! - **Colours** — validation, blending and the default categorical palette
//! - **Gene symbols** — [`gene_symbols`] temporarily relabels the gene axis
//!
//! # Quick start
//!
//! ```
//! use cellfate_omics::{merge_categorical, Series};
//!
//! let index: Vec<String> = (0..3).map(|i| i.to_string()).collect();
//! let old = Series::categorical(index.clone(), &[Some("a"), None, Some("a")], vec!["a".into()]).unwrap();
//! let new = Series::categorical(index, &[None, Some("b"), None], vec!["b".into()]).unwrap();
//!
//! let merged = merge_categorical(&old, &new, None, None, false).unwrap();
//! assert_eq!(merged.series.category_labels().unwrap(), vec![Some("a"), Some("b"), Some("a")]);
//! ```

pub mod categorical;
pub mod colors;
pub mod gene_symbols;
pub mod series;
pub mod single_cell;
pub mod sparse;

pub use categorical::{
    merge_categorical, one_hot, process_series, series_from_indicator, series_from_one_hot,
    MergedCategorical,
};
pub use colors::{is_color_like, mean_color, ColorSpec, DEFAULT_PALETTE};
pub use gene_symbols::{gene_symbols, make_unique, GeneSymbols, GeneSymbolsOptions};
pub use series::{Series, MISSING};
pub use single_cell::{AnnData, ColumnData, MatrixData, Raw};
pub use sparse::{Csr, SparseMatrix};
