//! Expansion of model and callback specifications onto a genes × lineages grid.
//!
//! Models are cloned into every cell so that fitting one pair never touches
//! another. Callbacks are immutable and shared by handle; an unspecified pair
//! gets [`default_callback`], which only prepares the model.

use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use cellfate_core::{panic_message, CellfateError, Result};
use cellfate_omics::AnnData;

use crate::model::{Model, ModelStage, PrepareRequest};
use crate::polynomial::PolynomialModel;
use crate::spec::{Grid, ModelSpec, Slot};

/// Turns an unprepared model into one prepared for `(gene, lineage)`.
pub type Callback = Arc<
    dyn Fn(Box<dyn Model>, &AnnData, &str, &str, &PrepareRequest) -> Result<Box<dyn Model>>
        + Send
        + Sync,
>;

/// Wrap a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(Box<dyn Model>, &AnnData, &str, &str, &PrepareRequest) -> Result<Box<dyn Model>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// The callback used wherever none is specified: calls [`Model::prepare`].
///
/// Always returns a handle to the same shared callback.
pub fn default_callback() -> Callback {
    static DEFAULT: OnceLock<Callback> = OnceLock::new();
    DEFAULT
        .get_or_init(|| {
            callback(|mut model, adata, gene, lineage, request| {
                model.prepare(adata, gene, lineage, request)?;
                Ok(model)
            })
        })
        .clone()
}

pub fn is_default_callback(cb: &Callback) -> bool {
    Arc::ptr_eq(cb, &default_callback())
}

/// Settings for [`resolve_callbacks`].
#[derive(Debug, Clone)]
pub struct CallbackOptions {
    /// Passed to every callback.
    pub request: PrepareRequest,
    /// Probe each distinct callback once before returning.
    pub perform_sanity_check: bool,
    /// Template of the model handed to the probe.
    pub probe_model: Box<dyn Model>,
}

impl Default for CallbackOptions {
    fn default() -> Self {
        Self {
            request: PrepareRequest::default(),
            perform_sanity_check: true,
            probe_model: Box::new(PolynomialModel::default()),
        }
    }
}

fn check_selection(genes: &[String], lineages: &[String]) -> Result<()> {
    if genes.is_empty() {
        return Err(CellfateError::InvalidInput("No genes have been selected.".into()));
    }
    if lineages.is_empty() {
        return Err(CellfateError::InvalidInput(
            "No lineages have been selected.".into(),
        ));
    }
    Ok(())
}

fn quoted<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names
        .into_iter()
        .map(|n| format!("`{n}`"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Expand a model specification so that every (gene, lineage) pair owns its
/// own model.
///
/// # Errors
///
/// `InvalidInput` if `genes` or `lineages` is empty, or some pair is not
/// covered by an entry or a fallback; `InvalidType` for
/// [`ModelSpec::Default`], since models have no built-in default.
pub fn resolve_models(
    spec: &ModelSpec<Box<dyn Model>>,
    genes: &[String],
    lineages: &[String],
) -> Result<Grid<Box<dyn Model>>> {
    check_selection(genes, lineages)?;
    if let ModelSpec::Default = spec {
        return Err(CellfateError::InvalidType(
            "Expected a model or a mapping of models, found no specification.".into(),
        ));
    }

    let missing_genes: BTreeSet<&str> = genes
        .iter()
        .filter(|g| matches!(spec.slot(g, &lineages[0]), Slot::MissingGene))
        .map(String::as_str)
        .collect();
    if !missing_genes.is_empty() {
        return Err(CellfateError::InvalidInput(format!(
            "No options were specified for genes {}.",
            quoted(missing_genes)
        )));
    }
    for gene in genes {
        let missing: Vec<&str> = lineages
            .iter()
            .filter(|l| matches!(spec.slot(gene, l), Slot::MissingLineage))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(CellfateError::InvalidInput(format!(
                "No options were specified for all lineages for gene `{gene}`, missing {}.",
                quoted(missing)
            )));
        }
    }

    let grid = Grid::try_from_fn(genes, lineages, |gene, lineage| match spec.slot(gene, lineage) {
        Slot::Found(model) => Ok(model.box_clone()),
        _ => Err(CellfateError::Other(format!(
            "no model for gene `{gene}` and lineage `{lineage}`"
        ))),
    })?;
    tracing::debug!(
        n_genes = genes.len(),
        n_lineages = lineages.len(),
        "resolved models"
    );
    Ok(grid)
}

/// Expand a callback specification. Pairs without an entry or fallback,
/// and every pair of [`ModelSpec::Default`], get [`default_callback`].
///
/// With `perform_sanity_check`, each distinct callback is invoked once on a
/// fresh copy of `options.probe_model` for the first pair that uses it. The
/// returned model must be at least prepared and still bound to that pair.
///
/// # Errors
///
/// `InvalidInput` if `genes` or `lineages` is empty; `CallbackValidation` if
/// a probed callback fails, panics or returns a model that does not pass the
/// checks above.
pub fn resolve_callbacks(
    adata: &AnnData,
    spec: &ModelSpec<Callback>,
    genes: &[String],
    lineages: &[String],
    options: &CallbackOptions,
) -> Result<Grid<Callback>> {
    check_selection(genes, lineages)?;
    let grid = Grid::try_from_fn::<CellfateError, _>(genes, lineages, |gene, lineage| {
        Ok(match spec.slot(gene, lineage) {
            Slot::Found(cb) => Arc::clone(cb),
            Slot::Unspecified | Slot::MissingGene | Slot::MissingLineage => default_callback(),
        })
    })?;

    if options.perform_sanity_check {
        let mut checked: Vec<&Callback> = Vec::new();
        for (gene, lineage, cb) in grid.iter() {
            if checked.iter().any(|seen| Arc::ptr_eq(seen, cb)) {
                continue;
            }
            sanity_check(cb, adata, gene, lineage, options)?;
            checked.push(cb);
        }
        tracing::debug!(n_callbacks = checked.len(), "callbacks passed the sanity check");
    }
    Ok(grid)
}

fn sanity_check(
    cb: &Callback,
    adata: &AnnData,
    gene: &str,
    lineage: &str,
    options: &CallbackOptions,
) -> Result<()> {
    let fail = |reason: String| {
        CellfateError::CallbackValidation(format!(
            "callback for gene `{gene}` and lineage `{lineage}` {reason}"
        ))
    };

    let probe = options.probe_model.box_clone();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        cb(probe, adata, gene, lineage, &options.request)
    }));
    let model = match outcome {
        Ok(Ok(model)) => model,
        Ok(Err(e)) => return Err(fail(format!("failed: {e}"))),
        Err(payload) => {
            return Err(fail(format!(
                "panicked: {}",
                panic_message(payload.as_ref())
            )))
        }
    };

    let data = model.data();
    if data.stage < ModelStage::Prepared {
        return Err(fail(format!(
            "returned a model that is {:?}, expected at least {:?}",
            data.stage,
            ModelStage::Prepared
        )));
    }
    if data.gene.as_deref() != Some(gene) {
        return Err(fail(format!(
            "returned a model for gene {:?}",
            data.gene
        )));
    }
    if data.lineage.as_deref() != Some(lineage) {
        return Err(fail(format!(
            "returned a model for lineage {:?}",
            data.lineage
        )));
    }
    tracing::debug!(gene, lineage, model = model.name(), "callback passed the sanity check");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_mean::LocalMeanModel;
    use crate::model::tests::trend_adata;
    use crate::spec::{Keyed, LineageSpec};

    fn s(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn poly(degree: usize) -> Box<dyn Model> {
        Box::new(PolynomialModel::new(degree).unwrap())
    }

    fn local() -> Box<dyn Model> {
        Box::new(LocalMeanModel::default())
    }

    fn describe(model: &dyn Model) -> String {
        format!("{model:?}")
    }

    fn unchecked() -> CallbackOptions {
        CallbackOptions {
            perform_sanity_check: false,
            ..CallbackOptions::default()
        }
    }

    // ── Models ──

    #[test]
    fn empty_selection() {
        let err = resolve_models(&poly(1).into(), &[], &s(&["foo"])).unwrap_err();
        assert!(err.to_string().contains("No genes have been selected"));
        let err = resolve_models(&poly(1).into(), &s(&["foo"]), &[]).unwrap_err();
        assert!(err.to_string().contains("No lineages have been selected"));
        let err = resolve_models(&ModelSpec::ByGene(Keyed::new()), &s(&["foo"]), &[]).unwrap_err();
        assert!(err.to_string().contains("No lineages have been selected"));
    }

    #[test]
    fn default_is_not_a_model() {
        assert!(matches!(
            resolve_models(&ModelSpec::Default, &s(&["foo"]), &s(&["bar"])),
            Err(CellfateError::InvalidType(_))
        ));
    }

    #[test]
    fn single_model_is_copied() {
        let genes = s(&["foo", "bar"]);
        let lineages = s(&["baz", "quux"]);
        let mut grid = resolve_models(&poly(2).into(), &genes, &lineages).unwrap();
        assert_eq!(grid.len(), 4);
        for (_, _, model) in grid.iter() {
            assert_eq!(model.name(), "polynomial");
            assert_eq!(model.data().stage, ModelStage::Created);
        }
        // mutating one cell leaves the others alone
        grid.get_mut("foo", "baz").unwrap().data_mut().stage = ModelStage::Fitted;
        assert_eq!(grid.get("foo", "quux").unwrap().data().stage, ModelStage::Created);
        assert_eq!(grid.get("bar", "baz").unwrap().data().stage, ModelStage::Created);
    }

    #[test]
    fn gene_specific_with_fallback() {
        let spec = ModelSpec::ByGene(Keyed::new().with("foo", local()).with_fallback(poly(1)));
        let grid = resolve_models(&spec, &s(&["foo", "bar"]), &s(&["baz"])).unwrap();
        assert_eq!(grid.get("foo", "baz").unwrap().name(), "local_mean");
        assert_eq!(grid.get("bar", "baz").unwrap().name(), "polynomial");
    }

    #[test]
    fn lineage_specific() {
        let spec = ModelSpec::ByGeneAndLineage(
            Keyed::new()
                .with(
                    "foo",
                    LineageSpec::PerLineage(Keyed::new().with("baz", local()).with_fallback(poly(1))),
                )
                .with_fallback(LineageSpec::All(poly(3))),
        );
        let grid = resolve_models(&spec, &s(&["foo", "bar"]), &s(&["baz", "quux", "wex"])).unwrap();
        assert_eq!(grid.get("foo", "baz").unwrap().name(), "local_mean");
        assert_eq!(describe(grid.get("foo", "quux").unwrap().as_ref()), describe(poly(1).as_ref()));
        for l in ["baz", "quux", "wex"] {
            assert_eq!(describe(grid.get("bar", l).unwrap().as_ref()), describe(poly(3).as_ref()));
        }
    }

    #[test]
    fn incomplete_specifications() {
        let spec = ModelSpec::ByGene(Keyed::new().with("foo", poly(1)));
        let err = resolve_models(&spec, &s(&["foo", "bar", "baz"]), &s(&["l"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid input: No options were specified for genes `bar`, `baz`."
        );

        let spec = ModelSpec::ByGeneAndLineage(
            Keyed::new().with("foo", LineageSpec::PerLineage(Keyed::new().with("bar", poly(1)))),
        );
        let err = resolve_models(&spec, &s(&["foo"]), &s(&["bar", "baz"])).unwrap_err();
        assert!(err.to_string().contains("No options were specified for all lineages"));

        let empty = ModelSpec::ByGeneAndLineage(Keyed::new().with(
            "foo",
            LineageSpec::PerLineage(Keyed::<Box<dyn Model>>::new()),
        ));
        let err = resolve_models(&empty, &s(&["foo"]), &s(&["bar"])).unwrap_err();
        assert!(err.to_string().contains("No options were specified for all lineages"));

        let no_genes = ModelSpec::<Box<dyn Model>>::ByGeneAndLineage(Keyed::new());
        let err = resolve_models(&no_genes, &s(&["foo"]), &s(&["bar"])).unwrap_err();
        assert!(err.to_string().contains("No options were specified for genes"));
    }

    // ── Callbacks ──

    #[test]
    fn callback_empty_selection() {
        let adata = trend_adata();
        let err = resolve_callbacks(&adata, &ModelSpec::Default, &[], &s(&["0"]), &unchecked())
            .err()
            .unwrap();
        assert!(err.to_string().contains("No genes have been selected"));
        let err = resolve_callbacks(&adata, &ModelSpec::Default, &s(&["g0"]), &[], &unchecked())
            .err()
            .unwrap();
        assert!(err.to_string().contains("No lineages have been selected"));
    }

    #[test]
    fn missing_entries_use_the_default_callback() {
        let adata = trend_adata();
        let spec = ModelSpec::ByGeneAndLineage(Keyed::new().with(
            "foo",
            LineageSpec::PerLineage(Keyed::<Callback>::new()),
        ));
        let grid = resolve_callbacks(&adata, &spec, &s(&["foo"]), &s(&["bar"]), &unchecked()).unwrap();
        assert!(is_default_callback(grid.get("foo", "bar").unwrap()));

        let grid = resolve_callbacks(&adata, &ModelSpec::Default, &s(&["g0"]), &s(&["0", "1"]), &CallbackOptions::default())
            .unwrap();
        assert!(grid.iter().all(|(_, _, cb)| is_default_callback(cb)));
    }

    #[test]
    fn distinct_callbacks_are_kept() {
        let adata = trend_adata();
        let cb1 = callback(|mut m, a, g, l, r| {
            m.prepare(a, g, l, r)?;
            Ok(m)
        });
        let cb2 = callback(|mut m, a, g, l, r| {
            m.prepare(a, g, l, r)?;
            Ok(m)
        });
        let spec = ModelSpec::ByGeneAndLineage(Keyed::new().with(
            "g0",
            LineageSpec::PerLineage(Keyed::new().with("0", cb1.clone()).with("1", cb2.clone())),
        ));
        let grid = resolve_callbacks(&adata, &spec, &s(&["g0"]), &s(&["0", "1"]), &CallbackOptions::default())
            .unwrap();
        assert!(Arc::ptr_eq(grid.get("g0", "0").unwrap(), &cb1));
        assert!(Arc::ptr_eq(grid.get("g0", "1").unwrap(), &cb2));
    }

    fn validation_error(cb: Callback, gene: &str, lineage: &str) -> CellfateError {
        let adata = trend_adata();
        resolve_callbacks(&adata, &cb.into(), &s(&[gene]), &s(&[lineage]), &CallbackOptions::default())
            .err()
            .unwrap()
    }

    #[test]
    fn default_callback_with_unknown_labels_fails_validation() {
        let err = validation_error(default_callback(), "foo", "0");
        assert!(matches!(err, CellfateError::CallbackValidation(_)));
        assert!(err.to_string().starts_with("Callback validation failed"));
        let err = validation_error(default_callback(), "g0", "foo");
        assert!(matches!(err, CellfateError::CallbackValidation(_)));
    }

    #[test]
    fn callback_must_prepare() {
        let err = validation_error(callback(|m, _, _, _, _| Ok(m)), "g0", "0");
        assert!(matches!(err, CellfateError::CallbackValidation(_)));
    }

    #[test]
    fn callback_must_not_relabel() {
        let gene = callback(|mut m, a, g, l, r| {
            m.prepare(a, g, l, r)?;
            m.data_mut().gene = Some("bar".into());
            Ok(m)
        });
        assert!(matches!(validation_error(gene, "g0", "0"), CellfateError::CallbackValidation(_)));

        let lineage = callback(|mut m, a, g, l, r| {
            m.prepare(a, g, l, r)?;
            m.data_mut().lineage = Some("bar".into());
            Ok(m)
        });
        assert!(matches!(validation_error(lineage, "g0", "0"), CellfateError::CallbackValidation(_)));
    }

    #[test]
    fn callback_failures_are_wrapped() {
        let err = validation_error(
            callback(|_, _, _, _, _| Err(CellfateError::InvalidType("foobar".into()))),
            "g0",
            "0",
        );
        assert!(matches!(err, CellfateError::CallbackValidation(ref m) if m.contains("foobar")));

        let err = validation_error(callback(|_, _, _, _, _| panic!("boom")), "g0", "0");
        assert!(matches!(err, CellfateError::CallbackValidation(ref m) if m.contains("boom")));
    }

    #[test]
    fn sanity_check_can_be_skipped() {
        let adata = trend_adata();
        let lazy = callback(|m, _, _, _, _| Ok(m));
        assert!(resolve_callbacks(&adata, &lazy.into(), &s(&["g0"]), &s(&["0"]), &unchecked()).is_ok());
    }
}
