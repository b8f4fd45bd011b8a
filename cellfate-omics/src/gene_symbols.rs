//! Scoped relabelling of the gene axis.
//!
//! [`gene_symbols`] swaps a dataset's gene names for the values of a
//! per-gene annotation column (e.g. Ensembl IDs to HGNC symbols) and returns a
//! guard. The original names, and the original raw view handle, come back when
//! the guard is dropped, whether the scope ends normally, through `?`, or by
//! unwinding.
//!
//! The guard holds the only mutable borrow of the dataset, so two scopes can
//! never interleave on the same [`AnnData`].

use std::collections::{HashMap, HashSet};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use cellfate_core::{CellfateError, Result};

use crate::single_cell::{AnnData, ColumnData, Raw};

/// Options for [`gene_symbols`].
#[derive(Debug, Clone, Default)]
pub struct GeneSymbolsOptions {
    /// Relabel the raw view instead of the main gene axis.
    pub use_raw: bool,
    /// Suffix duplicated symbols with `-1`, `-2`, ...
    pub make_unique: bool,
}

/// State put back on exit. The raw handle is kept whichever axis was
/// relabelled, so a scope that detaches or swaps the raw view cannot leak
/// that change.
struct Saved {
    var_names: Option<Vec<String>>,
    raw: Option<Arc<Raw>>,
}

/// Guard returned by [`gene_symbols`]; dereferences to the dataset.
pub struct GeneSymbols<'a> {
    adata: &'a mut AnnData,
    saved: Option<Saved>,
}

/// Relabel the gene axis of `adata` with the values of `var[key]` until the
/// returned guard goes out of scope.
///
/// With `key = None` nothing changes and the guard simply hands the dataset
/// through.
///
/// # Errors
///
/// - [`CellfateError::InvalidInput`] if `use_raw` is set and no raw view is attached
/// - [`CellfateError::KeyNotFound`] if the column does not exist
/// - [`CellfateError::InvalidType`] if the column is numeric
pub fn gene_symbols<'a>(
    adata: &'a mut AnnData,
    key: Option<&str>,
    options: GeneSymbolsOptions,
) -> Result<GeneSymbols<'a>> {
    let Some(key) = key else {
        return Ok(GeneSymbols { adata, saved: None });
    };

    let raw = if options.use_raw {
        let raw = adata.raw().ok_or_else(|| {
            CellfateError::InvalidInput("use_raw was requested but no raw view is attached".into())
        })?;
        Some(Arc::clone(raw))
    } else {
        None
    };

    let column = match &raw {
        Some(raw) => raw.get_var(key),
        None => adata.get_var(key),
    }
    .ok_or_else(|| {
        CellfateError::KeyNotFound(format!("gene symbol column `{key}` not found in `var`"))
    })?;

    let mut symbols = symbols_from(column, key)?;
    if options.make_unique {
        symbols = make_unique(&symbols);
    }

    let saved = match raw {
        Some(original) => {
            let relabelled = original.with_var_names(symbols);
            adata.replace_raw(Some(Arc::new(relabelled)));
            Saved {
                var_names: None,
                raw: Some(original),
            }
        }
        None => Saved {
            raw: adata.raw().cloned(),
            var_names: Some(adata.replace_var_names(symbols)),
        },
    };
    tracing::debug!(key, use_raw = options.use_raw, "substituted gene symbols");

    Ok(GeneSymbols {
        adata,
        saved: Some(saved),
    })
}

fn symbols_from(column: &ColumnData, key: &str) -> Result<Vec<String>> {
    match column {
        ColumnData::Strings(v) => Ok(v.clone()),
        ColumnData::Categorical { .. } => {
            let labels = column.labels().unwrap_or_default();
            labels
                .into_iter()
                .enumerate()
                .map(|(i, l)| {
                    l.ok_or_else(|| {
                        CellfateError::InvalidInput(format!(
                            "gene symbol column `{key}` has a missing value at position {i}"
                        ))
                    })
                })
                .collect()
        }
        ColumnData::Numeric(_) => Err(CellfateError::InvalidType(format!(
            "gene symbol column `{key}` must hold strings, found numeric"
        ))),
    }
}

/// Make names unique: the first occurrence is kept, later duplicates get
/// `-1`, `-2`, ... skipping any name that is already taken.
pub fn make_unique(names: &[String]) -> Vec<String> {
    let mut taken: HashSet<String> = names.iter().cloned().collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut counters: HashMap<&str, usize> = HashMap::new();
    names
        .iter()
        .map(|name| {
            if seen.insert(name) {
                return name.clone();
            }
            let counter = counters.entry(name).or_insert(0);
            loop {
                *counter += 1;
                let candidate = format!("{name}-{counter}");
                if taken.insert(candidate.clone()) {
                    return candidate;
                }
            }
        })
        .collect()
}

impl GeneSymbols<'_> {
    /// Whether a substitution is in effect.
    pub fn is_active(&self) -> bool {
        self.saved.is_some()
    }

    /// Restore the original names now instead of at the end of the scope.
    pub fn release(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        let Some(saved) = self.saved.take() else {
            return;
        };
        if let Some(names) = saved.var_names {
            self.adata.replace_var_names(names);
        }
        self.adata.replace_raw(saved.raw);
        tracing::debug!("restored gene names");
    }
}

impl Deref for GeneSymbols<'_> {
    type Target = AnnData;

    fn deref(&self) -> &AnnData {
        self.adata
    }
}

impl DerefMut for GeneSymbols<'_> {
    fn deref_mut(&mut self) -> &mut AnnData {
        self.adata
    }
}

impl Drop for GeneSymbols<'_> {
    fn drop(&mut self) {
        self.restore();
    }
}
