//! Fuzzy-to-discrete state assignment.
//!
//! Turns a membership matrix (rows = cells, columns = states, rows summing to
//! one) into a boolean assignment by selecting the most likely cells of each
//! state, then either resolving cells claimed by several states or reporting
//! the conflicting state pairs.

use cellfate_core::{CellfateError, Result};
use cellfate_omics::{series_from_one_hot, Series};

use crate::lineage::Lineage;

/// Tolerance on row sums of a membership matrix.
pub const ROW_SUM_TOL: f64 = 1e-6;

/// Row-major membership matrix, optionally with state names.
pub trait Memberships {
    /// Rows of the matrix (one per cell).
    fn rows(&self) -> &[Vec<f64>];

    /// State names, if the matrix carries them.
    fn state_names(&self) -> Option<&[String]> {
        None
    }
}

impl Memberships for [Vec<f64>] {
    fn rows(&self) -> &[Vec<f64>] {
        self
    }
}

impl Memberships for Vec<Vec<f64>> {
    fn rows(&self) -> &[Vec<f64>] {
        self
    }
}

impl Memberships for Lineage {
    fn rows(&self) -> &[Vec<f64>] {
        self.values()
    }

    fn state_names(&self) -> Option<&[String]> {
        Some(self.names())
    }
}

/// Configuration for [`discretize`].
#[derive(Debug, Clone)]
pub struct DiscretizeConfig {
    /// Take exactly this many top cells per state instead of thresholding.
    pub n_most_likely: Option<usize>,
    /// Keep a cell claimed by several states only in its most likely one.
    pub remove_overlap: bool,
    /// Minimum fraction of `n_most_likely` a state must keep after overlap
    /// removal; `None` requires a single cell.
    pub raise_threshold: Option<f64>,
}

impl Default for DiscretizeConfig {
    fn default() -> Self {
        Self {
            n_most_likely: None,
            remove_overlap: true,
            raise_threshold: Some(0.2),
        }
    }
}

/// Result of [`discretize`].
#[derive(Debug, Clone, PartialEq)]
pub struct Discretized {
    /// Cells × states; `true` marks membership.
    pub assignment: Vec<Vec<bool>>,
    /// Sorted `(i, j)`, `i < j`, of states sharing a cell. Empty when overlap
    /// was removed.
    pub critical_pairs: Vec<(usize, usize)>,
    /// States that lose (or, without overlap removal, would lose) cells to a
    /// more likely state.
    pub underpopulated: Vec<usize>,
    /// One label per state.
    pub state_names: Vec<String>,
}

impl Discretized {
    /// Cells assigned to `state`.
    pub fn members(&self, state: usize) -> Vec<usize> {
        self.assignment
            .iter()
            .enumerate()
            .filter(|(_, row)| row.get(state).copied().unwrap_or(false))
            .map(|(i, _)| i)
            .collect()
    }

    /// Critical pairs rendered with state names.
    pub fn critical_pair_labels(&self) -> Vec<(String, String)> {
        self.critical_pairs
            .iter()
            .map(|&(i, j)| (self.state_names[i].clone(), self.state_names[j].clone()))
            .collect()
    }

    /// The assignment as a categorical series over the state names.
    ///
    /// # Errors
    ///
    /// Fails if a cell still belongs to more than one state.
    pub fn to_series(&self, index: Vec<String>) -> Result<Series> {
        series_from_one_hot(&self.assignment, Some(index), Some(self.state_names.clone()))
    }
}

fn validate(rows: &[Vec<f64>]) -> Result<usize> {
    let n_states = rows.first().map_or(0, Vec::len);
    if rows.is_empty() || n_states == 0 {
        return Err(CellfateError::InvalidInput(
            "the membership matrix is empty".into(),
        ));
    }
    if rows.iter().any(|r| r.len() != n_states) {
        return Err(CellfateError::InvalidInput(
            "rows of the membership matrix differ in length".into(),
        ));
    }
    if rows.iter().flatten().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(CellfateError::InvalidInput(
            "the membership matrix must be finite and non-negative".into(),
        ));
    }
    if let Some(i) = rows
        .iter()
        .position(|r| (r.iter().sum::<f64>() - 1.0).abs() > ROW_SUM_TOL)
    {
        return Err(CellfateError::InvalidInput(format!(
            "Rows in the membership matrix do not sum to 1 (first offending row: {i})"
        )));
    }
    Ok(n_states)
}

/// Discretize a membership matrix.
///
/// Without `n_most_likely`, a state selects every cell whose membership is
/// positive and at least the state's mean membership. With it, a state selects
/// its `n_most_likely` most likely cells (ties go to the lower cell index).
///
/// # Errors
///
/// - rows that do not sum to one, negative or non-finite entries
/// - `n_most_likely` of zero or above `n_cells / n_states`
/// - with `remove_overlap`, a state left with fewer than
///   `max(floor(raise_threshold * n_most_likely), 1)` cells
pub fn discretize<M: Memberships + ?Sized>(
    memberships: &M,
    config: &DiscretizeConfig,
) -> Result<Discretized> {
    let rows = memberships.rows();
    let n_states = validate(rows)?;
    let n_cells = rows.len();

    let state_names = match memberships.state_names() {
        Some(names) if names.len() == n_states => names.to_vec(),
        _ => (0..n_states).map(|j| j.to_string()).collect(),
    };

    if let Some(n) = config.n_most_likely {
        let max = n_cells / n_states;
        if n == 0 || n > max {
            return Err(CellfateError::InvalidInput(format!(
                "You've selected `{n}` cells, please decrease this to at most `{max}` cells for your dataset"
            )));
        }
    }

    let mut assignment = vec![vec![false; n_states]; n_cells];
    for j in 0..n_states {
        let column: Vec<f64> = rows.iter().map(|r| r[j]).collect();
        match config.n_most_likely {
            Some(n) => {
                let mut order: Vec<usize> = (0..n_cells).collect();
                order.sort_by(|&a, &b| column[b].total_cmp(&column[a]).then(a.cmp(&b)));
                for &i in &order[..n] {
                    assignment[i][j] = true;
                }
            }
            None => {
                let mean = column.iter().sum::<f64>() / n_cells as f64;
                tracing::debug!(state = j, threshold = mean, "selecting cells above the mean");
                for (i, &v) in column.iter().enumerate() {
                    if v > 0.0 && v >= mean {
                        assignment[i][j] = true;
                    }
                }
            }
        }
    }

    let selected: Vec<usize> = (0..n_states)
        .map(|j| assignment.iter().filter(|r| r[j]).count())
        .collect();

    // most likely selected state of each cell claimed more than once
    let mut winners: Vec<Option<usize>> = vec![None; n_cells];
    let mut n_overlapping = 0;
    for (i, row) in assignment.iter().enumerate() {
        let claimed: Vec<usize> = (0..n_states).filter(|&j| row[j]).collect();
        if claimed.len() > 1 {
            n_overlapping += 1;
            winners[i] = claimed
                .iter()
                .copied()
                .reduce(|best, j| if rows[i][j] > rows[i][best] { j } else { best });
        }
    }
    tracing::debug!(n_overlapping, n_states, "discretized memberships");

    let mut losers = vec![false; n_states];
    let mut pairs = Vec::new();
    for (i, row) in assignment.iter().enumerate() {
        let Some(winner) = winners[i] else {
            continue;
        };
        let claimed: Vec<usize> = (0..n_states).filter(|&j| row[j]).collect();
        for (a, &j) in claimed.iter().enumerate() {
            if j != winner {
                losers[j] = true;
            }
            for &k in &claimed[a + 1..] {
                pairs.push((j, k));
            }
        }
    }
    let underpopulated: Vec<usize> = (0..n_states).filter(|&j| losers[j]).collect();

    let critical_pairs = if config.remove_overlap {
        for (row, winner) in assignment.iter_mut().zip(&winners) {
            if let Some(w) = *winner {
                for (j, slot) in row.iter_mut().enumerate() {
                    *slot = j == w;
                }
            }
        }

        let minimum = match (config.n_most_likely, config.raise_threshold) {
            (Some(n), Some(t)) => ((t * n as f64).floor() as usize).max(1),
            (Some(_), None) => 1,
            (None, _) => 0,
        };
        for j in 0..n_states {
            let kept = assignment.iter().filter(|r| r[j]).count();
            if kept < minimum {
                return Err(CellfateError::InvalidInput(format!(
                    "Discretizing leads to a state with {kept} cell(s) (`{}` selected {} before removing overlap, at least {minimum} required). Consider decreasing `n_most_likely` or `raise_threshold`",
                    state_names[j], selected[j]
                )));
            }
        }
        Vec::new()
    } else {
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    };

    Ok(Discretized {
        assignment,
        critical_pairs,
        underpopulated,
        state_names,
    })
}
