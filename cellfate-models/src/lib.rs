//! Gene-trend models along lineages.
//!
//! - **Models** — the [`Model`] lifecycle with [`PolynomialModel`] and
//!   [`LocalMeanModel`]
//! - **Specifications** — [`ModelSpec`] for one option, per-gene options or
//!   per-gene-and-lineage options, also loadable from JSON
//! - **Resolution** — [`resolve_models`] and [`resolve_callbacks`] expand a
//!   specification onto a genes × lineages [`Grid`]
//! - **Trends** — [`fit_trends`] fits every pair in parallel
//!
//! # Example
//!
//! ```
//! use cellfate_models::{model_spec_from_json, resolve_models};
//!
//! let spec = model_spec_from_json(
//!     r#"{"genes": {"Sox9": {"kind": "local_mean", "bandwidth": 0.2}},
//!         "fallback": {"kind": "polynomial", "degree": 2}}"#,
//! )
//! .unwrap();
//! let genes = vec!["Sox9".to_string(), "Pax6".to_string()];
//! let lineages = vec!["Alpha".to_string()];
//! let grid = resolve_models(&spec, &genes, &lineages).unwrap();
//! assert_eq!(grid.get("Sox9", "Alpha").unwrap().name(), "local_mean");
//! assert_eq!(grid.get("Pax6", "Alpha").unwrap().name(), "polynomial");
//! ```

pub mod config;
pub mod local_mean;
pub mod model;
pub mod polynomial;
pub mod resolve;
pub mod spec;
pub mod trends;

pub use config::{model_spec_from_json, model_spec_from_value, ModelConfig};
pub use local_mean::LocalMeanModel;
pub use model::{prepare_data, Model, ModelData, ModelStage, PrepareRequest};
pub use polynomial::PolynomialModel;
pub use resolve::{
    callback, default_callback, is_default_callback, resolve_callbacks, resolve_models, Callback,
    CallbackOptions,
};
pub use spec::{Grid, Keyed, LineageSpec, ModelSpec};
pub use trends::{fit_trends, Trend, TrendConfig};
