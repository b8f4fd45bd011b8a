//! Terminal-state estimation on a cell-cell transition matrix.
//!
//! [`TerminalStateEstimator`] ties the pieces together: memberships are
//! discretized into named terminal states, repeated runs are merged and
//! recoloured, and absorption probabilities toward the terminal states are
//! computed once the matrix structure has been checked.

use cellfate_core::{CellfateError, Result, Summarizable};
use cellfate_omics::colors::palette_color;
use cellfate_omics::{
    merge_categorical, process_series, AnnData, ColorSpec, ColumnData, MatrixData, Series,
};

use crate::absorption::{absorption_probabilities, AbsorptionConfig};
use crate::discretize::{discretize, DiscretizeConfig, Discretized};
use crate::lineage::Lineage;
use crate::structure::partition;

/// Terminal-state bookkeeping: the assignment plus what was derived with it.
#[derive(Debug, Clone, Default)]
pub struct TerminalStates {
    assignment: Option<Series>,
    probabilities: Option<Vec<f64>>,
    colors: Option<Vec<String>>,
    memberships: Option<Lineage>,
}

impl TerminalStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_assignment(&mut self, assignment: Series) -> &mut Self {
        self.assignment = Some(assignment);
        self
    }

    pub fn set_probabilities(&mut self, probabilities: Vec<f64>) -> &mut Self {
        self.probabilities = Some(probabilities);
        self
    }

    pub fn set_colors(&mut self, colors: Vec<String>) -> &mut Self {
        self.colors = Some(colors);
        self
    }

    pub fn set_memberships(&mut self, memberships: Lineage) -> &mut Self {
        self.memberships = Some(memberships);
        self
    }

    /// Categorical assignment of cells to terminal states.
    pub fn assignment(&self) -> Option<&Series> {
        self.assignment.as_ref()
    }

    /// Per-cell confidence of the assignment.
    pub fn probabilities(&self) -> Option<&[f64]> {
        self.probabilities.as_deref()
    }

    /// One colour per category of the assignment.
    pub fn colors(&self) -> Option<&[String]> {
        self.colors.as_deref()
    }

    /// Memberships the assignment was discretized from.
    pub fn memberships(&self) -> Option<&Lineage> {
        self.memberships.as_ref()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Estimates terminal states and fate probabilities from a transition matrix.
#[derive(Debug, Clone)]
pub struct TerminalStateEstimator {
    transition: MatrixData,
    obs_names: Vec<String>,
    terminal: TerminalStates,
    absorption: Option<Lineage>,
}

impl TerminalStateEstimator {
    /// Create an estimator for an `n × n` transition matrix over `obs_names`.
    pub fn new(transition: MatrixData, obs_names: Vec<String>) -> Result<Self> {
        let (r, c) = transition.shape();
        if r != c || r != obs_names.len() {
            return Err(CellfateError::InvalidInput(format!(
                "transition matrix shape ({r}, {c}) does not match {} cells",
                obs_names.len()
            )));
        }
        Ok(Self {
            transition,
            obs_names,
            terminal: TerminalStates::new(),
            absorption: None,
        })
    }

    /// Create an estimator from `obsp[key]` of a dataset.
    pub fn from_adata(adata: &AnnData, key: &str) -> Result<Self> {
        let t = adata
            .get_obsp(key)
            .ok_or_else(|| CellfateError::KeyNotFound(format!("`obsp[{key:?}]` not found")))?;
        Self::new(MatrixData::Sparse(t.clone()), adata.obs_names().to_vec())
    }

    pub fn transition(&self) -> &MatrixData {
        &self.transition
    }

    pub fn terminal_states(&self) -> &TerminalStates {
        &self.terminal
    }

    pub fn absorption(&self) -> Option<&Lineage> {
        self.absorption.as_ref()
    }

    /// Set the terminal states, optionally merging them into the current ones.
    ///
    /// When merging, the previous colours are kept for states present in both
    /// runs; new states take `colors` or the default palette.
    pub fn set_terminal_states(
        &mut self,
        states: Series,
        colors: Option<&ColorSpec>,
        add_to_existing: bool,
    ) -> Result<()> {
        if states.index() != self.obs_names.as_slice() {
            return Err(CellfateError::InvalidInput(
                "terminal states must be indexed by the estimator's cells".into(),
            ));
        }
        let categories = states
            .categories()
            .ok_or_else(|| {
                CellfateError::InvalidType("Expected terminal states to be categorical".into())
            })?
            .to_vec();

        let (assignment, colors) = match (add_to_existing, self.terminal.assignment()) {
            (true, Some(previous)) => {
                let previous_colors = self.terminal.colors().map(|c| ColorSpec::Ordered(c.to_vec()));
                let merged = merge_categorical(
                    previous,
                    &states,
                    previous_colors.as_ref(),
                    colors,
                    false,
                )?;
                let n = merged.series.categories().map_or(0, <[String]>::len);
                let colors = merged
                    .colors
                    .unwrap_or_else(|| (0..n).map(|k| palette_color(k).to_string()).collect());
                (merged.series, colors)
            }
            _ => {
                let colors = match colors {
                    Some(spec) => spec.resolve(&categories, "colors")?,
                    None => (0..categories.len())
                        .map(|k| palette_color(k).to_string())
                        .collect(),
                };
                (states, colors)
            }
        };

        tracing::info!(
            n_states = colors.len(),
            add_to_existing,
            "set terminal states"
        );
        let probabilities = self.terminal.probabilities().map(<[f64]>::to_vec);
        let memberships = self.terminal.memberships().cloned();
        self.terminal.clear();
        self.terminal.set_assignment(assignment).set_colors(colors);
        if add_to_existing {
            if let Some(p) = probabilities {
                self.terminal.set_probabilities(p);
            }
            if let Some(m) = memberships {
                self.terminal.set_memberships(m);
            }
        }
        self.absorption = None;
        Ok(())
    }

    /// Discretize `memberships` into terminal states and store them.
    ///
    /// Each assigned cell's probability is its membership in its state.
    /// Requires a one-state-per-cell result, so `config.remove_overlap` must
    /// resolve any overlap.
    pub fn compute_terminal_states(
        &mut self,
        memberships: &Lineage,
        config: &DiscretizeConfig,
    ) -> Result<Discretized> {
        if memberships.n_cells() != self.obs_names.len() {
            return Err(CellfateError::InvalidInput(format!(
                "memberships cover {} cells, the estimator {}",
                memberships.n_cells(),
                self.obs_names.len()
            )));
        }
        let discretized = discretize(memberships, config)?;
        if !discretized.critical_pairs.is_empty() {
            tracing::warn!(
                n_pairs = discretized.critical_pairs.len(),
                "terminal states overlap; enable overlap removal to assign them"
            );
        }
        let series = discretized.to_series(self.obs_names.clone())?;
        let probabilities = discretized
            .assignment
            .iter()
            .zip(memberships.values())
            .map(|(assigned, values)| {
                assigned
                    .iter()
                    .position(|&a| a)
                    .map_or(0.0, |j| values[j])
            })
            .collect();

        self.set_terminal_states(
            series,
            Some(&ColorSpec::Ordered(memberships.colors().to_vec())),
            false,
        )?;
        self.terminal
            .set_probabilities(probabilities)
            .set_memberships(memberships.clone());
        Ok(discretized)
    }

    /// Keep only `keys` among the current terminal states, merging
    /// comma-separated groups into combined states.
    pub fn select_terminal_states<S: AsRef<str>>(&mut self, keys: &[S]) -> Result<()> {
        let current = self.terminal.assignment().ok_or_else(|| {
            CellfateError::InvalidInput("No terminal states have been set".into())
        })?;
        let (series, colors) = process_series(current, Some(keys), self.terminal.colors())?;
        let series = series.into_owned();
        let colors = colors.map(|c| c.into_owned());
        let spec = colors.map(ColorSpec::Ordered);
        self.set_terminal_states(series, spec.as_ref(), false)
    }

    /// Compute absorption probabilities toward the current terminal states.
    ///
    /// Every recurrent class of the transition matrix must contain a terminal
    /// cell, otherwise some walks are never absorbed.
    pub fn compute_absorption_probabilities(
        &mut self,
        config: &AbsorptionConfig,
    ) -> Result<&Lineage> {
        let assignment = self.terminal.assignment().ok_or_else(|| {
            CellfateError::InvalidInput("No terminal states have been set".into())
        })?;
        let codes = assignment.codes().unwrap_or_default();

        let classes = partition(&self.transition)?;
        for class in &classes.recurrent {
            if !class.iter().any(|&i| codes.get(i).is_some_and(|&c| c >= 0)) {
                return Err(CellfateError::InvalidInput(format!(
                    "recurrent class starting at cell `{}` contains no terminal state",
                    self.obs_names[class[0]]
                )));
            }
        }

        let mut lineage = absorption_probabilities(&self.transition, assignment, config)?;
        if let (Some(colors), Some(categories)) = (self.terminal.colors(), assignment.categories()) {
            let lineage_colors = lineage
                .names()
                .iter()
                .filter_map(|n| categories.iter().position(|c| c == n))
                .map(|k| colors[k].clone())
                .collect();
            lineage = lineage.with_colors(lineage_colors)?;
        }
        Ok(self.absorption.insert(lineage))
    }

    /// Write results into a dataset: `obs[key]`, `obs["{key}_probs"]`,
    /// `uns["{key}_colors"]`, and the absorption probabilities under
    /// `obsm[lineage_key]`.
    pub fn write_to(&self, adata: &mut AnnData, key: &str, lineage_key: &str) -> Result<()> {
        if adata.obs_names() != self.obs_names.as_slice() {
            return Err(CellfateError::InvalidInput(
                "dataset cells do not match the estimator's cells".into(),
            ));
        }
        if let Some(assignment) = self.terminal.assignment() {
            adata.set_obs_series(key, assignment)?;
        }
        if let Some(p) = self.terminal.probabilities() {
            adata.add_obs_column(&format!("{key}_probs"), ColumnData::Numeric(p.to_vec()))?;
        }
        if let Some(colors) = self.terminal.colors() {
            adata.add_uns(&format!("{key}_colors"), colors.join(","));
        }
        if let Some(lineage) = &self.absorption {
            lineage.write_to(adata, lineage_key)?;
        }
        tracing::debug!(key, lineage_key, "wrote terminal states");
        Ok(())
    }
}

impl Summarizable for TerminalStateEstimator {
    fn summary(&self) -> String {
        let n_states = self
            .terminal
            .assignment()
            .and_then(Series::categories)
            .map_or(0, <[String]>::len);
        format!(
            "TerminalStateEstimator: {} cells, {} terminal states, absorption: {}",
            self.obs_names.len(),
            n_states,
            if self.absorption.is_some() { "yes" } else { "no" }
        )
    }
}
