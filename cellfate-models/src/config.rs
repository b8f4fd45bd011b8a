//! Model specifications from JSON.
//!
//! A leaf is a tagged model description:
//!
//! ```json
//! {"kind": "polynomial", "degree": 3}
//! {"kind": "local_mean", "bandwidth": 0.1}
//! ```
//!
//! Levels name their entries explicitly:
//!
//! ```json
//! {
//!   "genes": {
//!     "Sox9": {"kind": "polynomial", "degree": 2},
//!     "Pax6": {"lineages": {"Alpha": {"kind": "local_mean", "bandwidth": 0.2}},
//!              "fallback": {"kind": "polynomial", "degree": 1}}
//!   },
//!   "fallback": {"kind": "polynomial", "degree": 3}
//! }
//! ```
//!
//! `null` at the top level is [`ModelSpec::Default`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use cellfate_core::{CellfateError, Result};

use crate::local_mean::LocalMeanModel;
use crate::model::Model;
use crate::polynomial::PolynomialModel;
use crate::spec::{Keyed, LineageSpec, ModelSpec};

/// Serializable description of a concrete model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelConfig {
    Polynomial { degree: usize },
    LocalMean { bandwidth: f64 },
}

impl ModelConfig {
    /// Instantiate an unprepared model.
    pub fn build(&self) -> Result<Box<dyn Model>> {
        Ok(match *self {
            ModelConfig::Polynomial { degree } => Box::new(PolynomialModel::new(degree)?),
            ModelConfig::LocalMean { bandwidth } => Box::new(LocalMeanModel::new(bandwidth)?),
        })
    }
}

/// Parse a model specification from JSON text.
pub fn model_spec_from_json(text: &str) -> Result<ModelSpec<Box<dyn Model>>> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| CellfateError::InvalidInput(format!("invalid model configuration: {e}")))?;
    model_spec_from_value(&value)
}

/// Parse a model specification from an already decoded JSON value.
pub fn model_spec_from_value(value: &Value) -> Result<ModelSpec<Box<dyn Model>>> {
    let top = match value {
        Value::Null => return Ok(ModelSpec::Default),
        Value::Object(map) => map,
        other => return Err(not_a_model("Expected a model description", other)),
    };
    let Some(genes) = top.get("genes") else {
        return Ok(ModelSpec::Single(leaf(value, || {
            "Expected a model description".into()
        })?));
    };

    let genes = as_object(genes, "genes")?;
    let fallback = top.get("fallback");
    let nested = genes.values().chain(fallback).any(is_lineage_level);

    if !nested {
        let mut keyed = Keyed::new();
        for (gene, v) in genes {
            let model = leaf(v, || format!("Expected the model for gene `{gene}`"))?;
            keyed.entries.insert(gene.clone(), model);
        }
        if let Some(v) = fallback {
            keyed.fallback = Some(leaf(v, || "Expected the gene fallback model".into())?);
        }
        return Ok(ModelSpec::ByGene(keyed));
    }

    let mut keyed = Keyed::new();
    for (gene, v) in genes {
        keyed.entries.insert(gene.clone(), lineage_level(v, Some(gene))?);
    }
    if let Some(v) = fallback {
        keyed.fallback = Some(lineage_level(v, None)?);
    }
    Ok(ModelSpec::ByGeneAndLineage(keyed))
}

fn is_lineage_level(value: &Value) -> bool {
    value.as_object().map_or(false, |m| m.contains_key("lineages"))
}

/// `gene` is `None` for the gene fallback.
fn lineage_level(value: &Value, gene: Option<&str>) -> Result<LineageSpec<Box<dyn Model>>> {
    let owner = gene.map_or_else(|| "the gene fallback".to_string(), |g| format!("gene `{g}`"));
    let (map, lineages) = match value.as_object().and_then(|m| Some((m, m.get("lineages")?))) {
        Some(found) => found,
        None => {
            let what = match gene {
                Some(g) => format!("Expected the model for gene `{g}`"),
                None => "Expected the gene fallback model".into(),
            };
            return Ok(LineageSpec::All(leaf(value, || what)?));
        }
    };
    let lineages = as_object(lineages, "lineages")?;

    let mut keyed = Keyed::new();
    for (lineage, v) in lineages {
        let model = leaf(v, || {
            format!("Expected the model for {owner} and lineage `{lineage}`")
        })?;
        keyed.entries.insert(lineage.clone(), model);
    }
    if let Some(v) = map.get("fallback") {
        keyed.fallback = Some(leaf(v, || {
            format!("Expected the lineage fallback model for {owner}")
        })?);
    }
    Ok(LineageSpec::PerLineage(keyed))
}

fn as_object<'a>(value: &'a Value, field: &str) -> Result<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        CellfateError::InvalidType(format!(
            "Expected `{field}` to be an object, found `{value}`."
        ))
    })
}

fn not_a_model(what: &str, value: &Value) -> CellfateError {
    CellfateError::InvalidType(format!("{what} to be a model description, found `{value}`."))
}

fn leaf(value: &Value, what: impl FnOnce() -> String) -> Result<Box<dyn Model>> {
    if !value.is_object() {
        return Err(not_a_model(&what(), value));
    }
    let config: ModelConfig = serde_json::from_value(value.clone())
        .map_err(|e| CellfateError::InvalidInput(format!("invalid model description: {e}")))?;
    config.build()
}
