//! Absorption probabilities and stationary distributions of Markov chains.

use cellfate_core::{parallelize, CellfateError, Chunk, ParallelConfig, Result};
use cellfate_omics::{Csr, MatrixData, Series};

use crate::lineage::Lineage;
use crate::structure::{is_irreducible, square_csr};

/// Tolerance on row sums of a transition matrix.
pub const STOCHASTIC_TOL: f64 = 1e-6;

/// Configuration for [`absorption_probabilities`].
#[derive(Debug, Clone)]
pub struct AbsorptionConfig {
    /// Stop once no probability changes by more than this between sweeps.
    pub tol: f64,
    /// Maximum number of Gauss-Seidel sweeps per lineage.
    pub max_iter: usize,
    /// Worker settings; one work item per lineage.
    pub parallel: ParallelConfig,
}

impl Default for AbsorptionConfig {
    fn default() -> Self {
        Self {
            tol: 1e-10,
            max_iter: 10_000,
            parallel: ParallelConfig::default(),
        }
    }
}

fn stochastic_csr(transition: &MatrixData) -> Result<Csr> {
    let csr = square_csr(transition)?;
    for i in 0..csr.n_rows {
        let mut sum = 0.0;
        for (_, v) in csr.row(i) {
            if v < 0.0 {
                return Err(CellfateError::InvalidInput(format!(
                    "transition matrix has a negative entry in row {i}"
                )));
            }
            sum += v;
        }
        if (sum - 1.0).abs() > STOCHASTIC_TOL {
            return Err(CellfateError::InvalidInput(format!(
                "transition matrix is not row-stochastic: row {i} sums to {sum}"
            )));
        }
    }
    Ok(csr)
}

/// Gauss-Seidel solve of `x_i = sum_j T_ij x_j` over transient cells, with
/// `x` fixed on terminal cells.
fn solve_lineage(
    csr: &Csr,
    is_terminal: &[bool],
    fixed: Vec<f64>,
    config: &AbsorptionConfig,
) -> Result<Vec<f64>> {
    let mut x = fixed;
    for sweep in 0..config.max_iter {
        let mut delta: f64 = 0.0;
        for i in 0..csr.n_rows {
            if is_terminal[i] {
                continue;
            }
            let mut diag = 0.0;
            let mut acc = 0.0;
            for (j, v) in csr.row(i) {
                if j == i {
                    diag = v;
                } else {
                    acc += v * x[j];
                }
            }
            let denom = 1.0 - diag;
            if denom <= f64::EPSILON {
                return Err(CellfateError::InvalidInput(format!(
                    "cell {i} is absorbing but not marked as a terminal state"
                )));
            }
            let next = acc / denom;
            delta = delta.max((next - x[i]).abs());
            x[i] = next;
        }
        if delta < config.tol {
            tracing::debug!(sweeps = sweep + 1, "absorption solve converged");
            return Ok(x);
        }
    }
    Err(CellfateError::Other(format!(
        "absorption probabilities did not converge within {} iterations",
        config.max_iter
    )))
}

/// Probability that a random walk from each cell is absorbed in each terminal
/// state.
///
/// `terminal_states` is a categorical series over the cells; every category
/// with at least one cell becomes a lineage (in category order). Terminal
/// cells get a one-hot row for their own state.
///
/// # Errors
///
/// Fails if the matrix is not square and row-stochastic, the series does not
/// match it, no terminal cell is set, or the iteration does not converge.
pub fn absorption_probabilities(
    transition: &MatrixData,
    terminal_states: &Series,
    config: &AbsorptionConfig,
) -> Result<Lineage> {
    let csr = stochastic_csr(transition)?;
    let n = csr.n_rows;
    if terminal_states.len() != n {
        return Err(CellfateError::InvalidInput(format!(
            "terminal states cover {} cells, the transition matrix {n}",
            terminal_states.len()
        )));
    }
    let (codes, categories) = match (terminal_states.codes(), terminal_states.categories()) {
        (Some(codes), Some(categories)) => (codes, categories),
        _ => {
            return Err(CellfateError::InvalidType(
                "Expected terminal states to be a categorical series".into(),
            ))
        }
    };

    let used: Vec<usize> = (0..categories.len())
        .filter(|&c| codes.iter().any(|&code| code == c as i32))
        .collect();
    if used.is_empty() {
        return Err(CellfateError::InvalidInput(
            "No terminal states have been set".into(),
        ));
    }
    let is_terminal: Vec<bool> = codes.iter().map(|&c| c >= 0).collect();

    let fixed_columns: Vec<Vec<f64>> = used
        .iter()
        .map(|&c| {
            codes
                .iter()
                .map(|&code| if code == c as i32 { 1.0 } else { 0.0 })
                .collect()
        })
        .collect();

    let columns: Vec<Vec<f64>> = parallelize(
        |chunk: Chunk<Vec<Vec<f64>>>| {
            chunk
                .data
                .into_iter()
                .map(|fixed| solve_lineage(&csr, &is_terminal, fixed, config))
                .collect::<Result<Vec<_>>>()
        },
        &fixed_columns,
        &config.parallel,
    )?
    .into_iter()
    .flatten()
    .collect();

    tracing::debug!(n_cells = n, n_lineages = columns.len(), "computed absorption probabilities");

    let values = (0..n)
        .map(|i| columns.iter().map(|col| col[i]).collect())
        .collect();
    let names = used.iter().map(|&c| categories[c].clone()).collect();
    Lineage::new(values, names)
}

/// Stationary distribution of an irreducible row-stochastic matrix, by power
/// iteration on `pi <- pi T`.
///
/// # Errors
///
/// Fails if the matrix is not row-stochastic or not irreducible, or if the
/// iteration does not converge within `max_iter` steps.
pub fn stationary_distribution(
    transition: &MatrixData,
    tol: f64,
    max_iter: usize,
) -> Result<Vec<f64>> {
    let csr = stochastic_csr(transition)?;
    if !is_irreducible(transition)? {
        return Err(CellfateError::InvalidInput(
            "the stationary distribution requires an irreducible transition matrix".into(),
        ));
    }
    let n = csr.n_rows;
    let mut pi = vec![1.0 / n as f64; n];
    for step in 0..max_iter {
        let mut next = vec![0.0; n];
        for (i, &p) in pi.iter().enumerate() {
            for (j, v) in csr.row(i) {
                next[j] += p * v;
            }
        }
        // lazy step so periodic chains converge too
        for (nx, &p) in next.iter_mut().zip(&pi) {
            *nx = 0.5 * (*nx + p);
        }
        let total: f64 = next.iter().sum();
        for v in &mut next {
            *v /= total;
        }
        let delta = next
            .iter()
            .zip(&pi)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        pi = next;
        if delta < tol {
            tracing::debug!(steps = step + 1, "stationary distribution converged");
            return Ok(pi);
        }
    }
    Err(CellfateError::Other(format!(
        "stationary distribution did not converge within {max_iter} iterations"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::tests::irreducible_ring;
    use cellfate_omics::ColumnData;

    /// Symmetric random walk on a path 0..=4 absorbed at both ends.
    fn gambler() -> (MatrixData, Series) {
        let mut rows = vec![vec![0.0; 5]; 5];
        rows[0][0] = 1.0;
        rows[4][4] = 1.0;
        for i in 1..4 {
            rows[i][i - 1] = 0.5;
            rows[i][i + 1] = 0.5;
        }
        let terminal = Series::new(
            (0..5).map(|i| i.to_string()).collect(),
            ColumnData::Categorical {
                codes: vec![0, -1, -1, -1, 1],
                categories: vec!["Left".into(), "Right".into()],
            },
        )
        .unwrap();
        (MatrixData::Dense(rows), terminal)
    }

    #[test]
    fn gambler_ruin() {
        let (t, terminal) = gambler();
        let lin = absorption_probabilities(&t, &terminal, &AbsorptionConfig::default()).unwrap();
        assert_eq!(lin.names(), &["Left", "Right"]);
        let right = lin.column("Right").unwrap();
        for (i, expected) in [0.0, 0.25, 0.5, 0.75, 1.0].iter().enumerate() {
            assert!((right[i] - expected).abs() < 1e-8, "cell {i}: {}", right[i]);
        }
        for row in lin.values() {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-8);
        }
    }

    #[test]
    fn sequential_matches_parallel() {
        let (t, terminal) = gambler();
        let mut config = AbsorptionConfig::default();
        let parallel = absorption_probabilities(&t, &terminal, &config).unwrap();
        config.parallel.n_jobs = 1;
        let sequential = absorption_probabilities(&t, &terminal, &config).unwrap();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn unused_categories_are_skipped() {
        let (t, _) = gambler();
        let terminal = Series::new(
            (0..5).map(|i| i.to_string()).collect(),
            ColumnData::Categorical {
                codes: vec![0, -1, -1, -1, 2],
                categories: vec!["Left".into(), "Unused".into(), "Right".into()],
            },
        )
        .unwrap();
        let lin = absorption_probabilities(&t, &terminal, &AbsorptionConfig::default()).unwrap();
        assert_eq!(lin.names(), &["Left", "Right"]);
    }

    #[test]
    fn errors() {
        let (t, _) = gambler();
        let none_set = Series::new(
            (0..5).map(|i| i.to_string()).collect(),
            ColumnData::Categorical {
                codes: vec![-1; 5],
                categories: vec!["Left".into()],
            },
        )
        .unwrap();
        assert!(absorption_probabilities(&t, &none_set, &AbsorptionConfig::default()).is_err());

        let not_stochastic = MatrixData::Dense(vec![vec![0.5, 0.0], vec![0.0, 1.0]]);
        let terminal = Series::new(
            vec!["a".into(), "b".into()],
            ColumnData::Categorical {
                codes: vec![-1, 0],
                categories: vec!["B".into()],
            },
        )
        .unwrap();
        let err =
            absorption_probabilities(&not_stochastic, &terminal, &AbsorptionConfig::default())
                .unwrap_err();
        assert!(err.to_string().contains("row-stochastic"));

        // cell 0 is absorbing but unmarked
        let trap = MatrixData::Dense(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert!(absorption_probabilities(&trap, &terminal, &AbsorptionConfig::default()).is_err());
    }

    #[test]
    fn ragged_transition_rejected() {
        let ragged = MatrixData::Dense(vec![vec![0.0, 1.0], vec![0.0, 0.0, 1.0]]);
        let terminal = Series::new(
            vec!["a".into(), "b".into()],
            ColumnData::Categorical {
                codes: vec![-1, 0],
                categories: vec!["B".into()],
            },
        )
        .unwrap();
        assert!(matches!(
            absorption_probabilities(&ragged, &terminal, &AbsorptionConfig::default()),
            Err(CellfateError::InvalidInput(_))
        ));
        assert!(matches!(
            stationary_distribution(&ragged, 1e-12, 100),
            Err(CellfateError::InvalidInput(_))
        ));
    }

    #[test]
    fn stationary_of_two_state_chain() {
        let t = MatrixData::Dense(vec![vec![0.9, 0.1], vec![0.5, 0.5]]);
        let pi = stationary_distribution(&t, 1e-12, 10_000).unwrap();
        assert!((pi[0] - 5.0 / 6.0).abs() < 1e-8);
        assert!((pi[1] - 1.0 / 6.0).abs() < 1e-8);
    }

    #[test]
    fn stationary_of_skewed_ring_is_uniform() {
        // doubly stochastic and periodic
        let pi = stationary_distribution(&irreducible_ring(), 1e-12, 100_000).unwrap();
        for p in pi {
            assert!((p - 1.0 / 12.0).abs() < 1e-8);
        }
    }

    #[test]
    fn stationary_requires_irreducibility() {
        let (t, _) = gambler();
        assert!(stationary_distribution(&t, 1e-12, 1000).is_err());
    }
}
