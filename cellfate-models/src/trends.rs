//! Fit gene trends for every (gene, lineage) pair.

use cellfate_core::{concatenate, parallelize, Chunk, ParallelConfig, Result};
use cellfate_omics::{gene_symbols, AnnData, GeneSymbolsOptions};

use crate::model::Model;
use crate::resolve::{resolve_callbacks, resolve_models, Callback, CallbackOptions};
use crate::spec::{Grid, ModelSpec};

/// A fitted trend evaluated on its test grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Trend {
    /// Name of the model that produced it.
    pub model: String,
    pub x_test: Vec<f64>,
    pub y_test: Vec<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct TrendConfig {
    pub callbacks: CallbackOptions,
    /// `var` column whose values replace gene names while fitting.
    pub gene_symbols: Option<String>,
    pub parallel: ParallelConfig,
}

#[derive(Clone)]
struct WorkItem {
    gene: String,
    lineage: String,
    model: Box<dyn Model>,
    callback: Callback,
}

/// Prepare, fit and predict one model per (gene, lineage) pair.
///
/// Pairs are fitted in parallel according to `config.parallel`. With
/// `config.gene_symbols`, `genes` are looked up by that `var` column and the
/// original names are restored before returning.
///
/// # Errors
///
/// Any resolution error, and the first error raised while preparing,
/// fitting or predicting a pair.
pub fn fit_trends(
    adata: &mut AnnData,
    models: &ModelSpec<Box<dyn Model>>,
    callbacks: &ModelSpec<Callback>,
    genes: &[String],
    lineages: &[String],
    config: &TrendConfig,
) -> Result<Grid<Trend>> {
    let options = GeneSymbolsOptions {
        use_raw: config.callbacks.request.use_raw,
        make_unique: true,
    };
    let scope = gene_symbols(adata, config.gene_symbols.as_deref(), options)?;
    let adata: &AnnData = &scope;

    let model_grid = resolve_models(models, genes, lineages)?;
    let callback_grid = resolve_callbacks(adata, callbacks, genes, lineages, &config.callbacks)?;
    let items: Vec<WorkItem> = model_grid
        .into_cells()
        .into_iter()
        .zip(callback_grid.into_cells())
        .enumerate()
        .map(|(i, (model, callback))| WorkItem {
            gene: genes[i / lineages.len()].clone(),
            lineage: lineages[i % lineages.len()].clone(),
            model,
            callback,
        })
        .collect();

    let request = &config.callbacks.request;
    let parts = parallelize(
        |chunk: Chunk<Vec<WorkItem>>| {
            chunk
                .data
                .into_iter()
                .map(|item| -> Result<Trend> {
                    let mut model =
                        (item.callback)(item.model, adata, &item.gene, &item.lineage, request)?;
                    model.fit()?;
                    let y_test = model.predict()?;
                    Ok(Trend {
                        model: model.name().to_string(),
                        x_test: model.data().x_test.clone(),
                        y_test,
                    })
                })
                .collect::<Result<Vec<_>>>()
        },
        &items,
        &config.parallel,
    )?;
    let trends = concatenate(parts);
    tracing::debug!(n_trends = trends.len(), "fitted gene trends");
    Ok(Grid::from_cells(genes.to_vec(), lineages.to_vec(), trends))
}
