//! The trend-model lifecycle.
//!
//! A model is created unbound, then *prepared* for one (gene, lineage) pair
//! of a dataset, fitted and finally evaluated on an even pseudotime grid.
//! [`ModelData`] carries the bookkeeping every model shares.

use std::fmt::Debug;

use cellfate_core::{CellfateError, Result};
use cellfate_estimators::Lineage;
use cellfate_omics::AnnData;

/// How far a model has progressed. Ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ModelStage {
    #[default]
    Created,
    Prepared,
    Fitted,
    Predicted,
}

/// State shared by all models.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelData {
    /// Gene the model was prepared for.
    pub gene: Option<String>,
    /// Lineage the model was prepared for.
    pub lineage: Option<String>,
    pub stage: ModelStage,
    /// Pseudotime of the retained cells.
    pub x: Vec<f64>,
    /// Expression of the retained cells.
    pub y: Vec<f64>,
    /// Lineage weights of the retained cells.
    pub w: Vec<f64>,
    /// Evaluation grid.
    pub x_test: Vec<f64>,
    /// Predictions on `x_test`.
    pub y_test: Vec<f64>,
}

/// Where [`Model::prepare`] reads its data from.
#[derive(Debug, Clone, PartialEq)]
pub struct PrepareRequest {
    /// Numeric `obs` column holding pseudotime.
    pub time_key: String,
    /// `obsm` key of the lineage matrix.
    pub lineage_key: String,
    /// Cells with a lineage weight below this are dropped.
    pub weight_threshold: f64,
    /// Size of the evaluation grid.
    pub n_test_points: usize,
    /// Read expression from the raw view.
    pub use_raw: bool,
}

impl Default for PrepareRequest {
    fn default() -> Self {
        Self {
            time_key: "latent_time".into(),
            lineage_key: "lineages_fwd".into(),
            weight_threshold: 0.01,
            n_test_points: 200,
            use_raw: false,
        }
    }
}

/// A gene-trend model.
///
/// Implementors hold a [`ModelData`] and provide `fit`/`predict`; `prepare`
/// has a default implementation that fills the data from a dataset.
pub trait Model: Send + Sync + Debug {
    /// Short human-readable name.
    fn name(&self) -> &str;

    fn data(&self) -> &ModelData;

    fn data_mut(&mut self) -> &mut ModelData;

    /// Bind the model to `gene` and `lineage` and load its training data.
    fn prepare(
        &mut self,
        adata: &AnnData,
        gene: &str,
        lineage: &str,
        request: &PrepareRequest,
    ) -> Result<()> {
        let data = prepare_data(adata, gene, lineage, request)?;
        *self.data_mut() = data;
        Ok(())
    }

    /// Fit on the prepared data. Requires [`ModelStage::Prepared`].
    fn fit(&mut self) -> Result<()>;

    /// Evaluate on `x_test`, store the result in `y_test` and return it.
    /// Requires [`ModelStage::Fitted`].
    fn predict(&mut self) -> Result<Vec<f64>>;

    /// Fresh copy behind a box, so `Box<dyn Model>` can be cloned.
    fn box_clone(&self) -> Box<dyn Model>;
}

impl Clone for Box<dyn Model> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Fail unless the model has reached `required`.
pub(crate) fn require_stage(model: &dyn Model, required: ModelStage) -> Result<()> {
    let stage = model.data().stage;
    if stage < required {
        return Err(CellfateError::InvalidInput(format!(
            "model `{}` is {stage:?}, expected at least {required:?}",
            model.name()
        )));
    }
    Ok(())
}

/// Evenly spaced grid of `n` points on `[lo, hi]`.
pub(crate) fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![lo],
        _ => {
            let step = (hi - lo) / (n - 1) as f64;
            (0..n).map(|i| lo + step * i as f64).collect()
        }
    }
}

/// Load the training data of one (gene, lineage) pair.
///
/// # Errors
///
/// `KeyNotFound` for an unknown gene, lineage, time key or lineage key;
/// `InvalidType` for a non-numeric time column; `InvalidInput` when no cell
/// passes the weight threshold or the time column is not finite.
pub fn prepare_data(
    adata: &AnnData,
    gene: &str,
    lineage: &str,
    request: &PrepareRequest,
) -> Result<ModelData> {
    let time = adata
        .get_obs(&request.time_key)
        .ok_or_else(|| {
            CellfateError::KeyNotFound(format!("`obs[{:?}]` not found", request.time_key))
        })?
        .as_numeric()
        .ok_or_else(|| {
            CellfateError::InvalidType(format!(
                "Expected `obs[{:?}]` to be numeric",
                request.time_key
            ))
        })?;
    let weights = Lineage::from_adata(adata, &request.lineage_key)?.column(lineage)?;
    let expression = adata.gene_expression(gene, request.use_raw)?;

    let mut data = ModelData {
        gene: Some(gene.to_string()),
        lineage: Some(lineage.to_string()),
        stage: ModelStage::Prepared,
        ..ModelData::default()
    };
    for ((&t, &y), &w) in time.iter().zip(&expression).zip(&weights) {
        if w >= request.weight_threshold {
            if !t.is_finite() {
                return Err(CellfateError::InvalidInput(format!(
                    "`obs[{:?}]` contains non-finite values",
                    request.time_key
                )));
            }
            data.x.push(t);
            data.y.push(y);
            data.w.push(w);
        }
    }
    if data.x.is_empty() {
        return Err(CellfateError::InvalidInput(format!(
            "no cells of lineage `{lineage}` have a weight of at least {}",
            request.weight_threshold
        )));
    }

    let lo = data.x.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = data.x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    data.x_test = linspace(lo, hi, request.n_test_points);
    tracing::debug!(gene, lineage, n_cells = data.x.len(), "prepared model data");
    Ok(data)
}
