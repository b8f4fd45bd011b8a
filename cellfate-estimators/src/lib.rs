//! Estimators for cell-fate analysis on transition matrices.
//!
//! - **Structure** — [`is_irreducible`], [`is_connected`], [`is_symmetric`] and
//!   the recurrent/transient [`partition`] of a transition matrix
//! - **Lineages** — [`Lineage`], a named cell × lineage membership matrix
//! - **Discretization** — [`discretize`] turns fuzzy memberships into discrete
//!   state assignments, resolving or reporting overlap
//! - **Absorption** — [`absorption_probabilities`] and [`stationary_distribution`]
//! - **Estimator** — [`TerminalStateEstimator`] combining the above
//!
//! # Example
//!
//! ```
//! use cellfate_estimators::{discretize, DiscretizeConfig};
//!
//! let memberships = vec![vec![0.9, 0.1], vec![0.2, 0.8], vec![0.6, 0.4], vec![0.3, 0.7]];
//! let config = DiscretizeConfig { n_most_likely: Some(1), ..Default::default() };
//! let res = discretize(&memberships, &config).unwrap();
//! assert_eq!(res.members(0), vec![0]);
//! assert_eq!(res.members(1), vec![1]);
//! ```

pub mod absorption;
pub mod discretize;
pub mod estimator;
pub mod lineage;
pub mod structure;

pub use absorption::{absorption_probabilities, stationary_distribution, AbsorptionConfig};
pub use discretize::{discretize, DiscretizeConfig, Discretized, Memberships};
pub use estimator::{TerminalStateEstimator, TerminalStates};
pub use lineage::Lineage;
pub use structure::{is_connected, is_irreducible, is_symmetric, partition, Partition};
