//! Weighted least-squares polynomial trends.

use cellfate_core::{CellfateError, Result};

use crate::model::{require_stage, Model, ModelData, ModelStage};

/// Highest supported degree.
pub const MAX_DEGREE: usize = 10;

/// Polynomial of fixed degree fitted by weighted least squares.
///
/// Pseudotime is rescaled to `[0, 1]` before building the normal equations,
/// which keeps the Gram matrix well conditioned for moderate degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialModel {
    data: ModelData,
    degree: usize,
    coefficients: Vec<f64>,
    scale: (f64, f64),
}

impl PolynomialModel {
    pub fn new(degree: usize) -> Result<Self> {
        if degree > MAX_DEGREE {
            return Err(CellfateError::InvalidInput(format!(
                "polynomial degree must be at most {MAX_DEGREE}, found {degree}"
            )));
        }
        Ok(Self {
            data: ModelData::default(),
            degree,
            coefficients: Vec::new(),
            scale: (0.0, 1.0),
        })
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Coefficients in ascending powers of the rescaled pseudotime.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    fn rescale(&self, t: f64) -> f64 {
        (t - self.scale.0) / self.scale.1
    }

    fn evaluate(&self, t: f64) -> f64 {
        let u = self.rescale(t);
        self.coefficients.iter().rev().fold(0.0, |acc, c| acc * u + c)
    }
}

impl Default for PolynomialModel {
    fn default() -> Self {
        Self {
            data: ModelData::default(),
            degree: 3,
            coefficients: Vec::new(),
            scale: (0.0, 1.0),
        }
    }
}

impl Model for PolynomialModel {
    fn name(&self) -> &str {
        "polynomial"
    }

    fn data(&self) -> &ModelData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut ModelData {
        &mut self.data
    }

    fn fit(&mut self) -> Result<()> {
        require_stage(&*self, ModelStage::Prepared)?;
        let n_coef = self.degree + 1;
        if self.data.x.len() < n_coef {
            return Err(CellfateError::InvalidInput(format!(
                "a degree {} polynomial needs at least {n_coef} cells, found {}",
                self.degree,
                self.data.x.len()
            )));
        }

        let lo = self.data.x.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = self.data.x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let span = if hi - lo > f64::EPSILON { hi - lo } else { 1.0 };
        self.scale = (lo, span);

        // Normal equations  (V^T W V) c = V^T W y
        let mut gram = vec![0.0; n_coef * n_coef];
        let mut rhs = vec![0.0; n_coef];
        let mut powers = vec![0.0; n_coef];
        for ((&t, &y), &w) in self.data.x.iter().zip(&self.data.y).zip(&self.data.w) {
            let u = self.rescale(t);
            let mut p = 1.0;
            for slot in powers.iter_mut() {
                *slot = p;
                p *= u;
            }
            for i in 0..n_coef {
                rhs[i] += w * powers[i] * y;
                for j in 0..n_coef {
                    gram[i * n_coef + j] += w * powers[i] * powers[j];
                }
            }
        }

        let inverse = invert_small_matrix(&gram, n_coef).ok_or_else(|| {
            CellfateError::InvalidInput(format!(
                "normal equations are singular; too few distinct time points for degree {}",
                self.degree
            ))
        })?;
        self.coefficients = (0..n_coef)
            .map(|i| (0..n_coef).map(|j| inverse[i * n_coef + j] * rhs[j]).sum())
            .collect();
        self.data.stage = ModelStage::Fitted;
        Ok(())
    }

    fn predict(&mut self) -> Result<Vec<f64>> {
        require_stage(&*self, ModelStage::Fitted)?;
        let y_test: Vec<f64> = self.data.x_test.iter().map(|&t| self.evaluate(t)).collect();
        self.data.y_test = y_test.clone();
        self.data.stage = ModelStage::Predicted;
        Ok(y_test)
    }

    fn box_clone(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}

/// Gauss-Jordan inversion of a row-major `n × n` matrix with partial pivoting.
///
/// Returns `None` when a pivot falls below `1e-15`.
fn invert_small_matrix(m: &[f64], n: usize) -> Option<Vec<f64>> {
    let width = 2 * n;
    let mut aug = vec![0.0; n * width];
    for i in 0..n {
        aug[i * width..i * width + n].copy_from_slice(&m[i * n..(i + 1) * n]);
        aug[i * width + n + i] = 1.0;
    }

    for col in 0..n {
        let pivot_row = (col..n).max_by(|&a, &b| {
            aug[a * width + col]
                .abs()
                .total_cmp(&aug[b * width + col].abs())
        })?;
        if aug[pivot_row * width + col].abs() < 1e-15 {
            return None;
        }
        if pivot_row != col {
            for j in 0..width {
                aug.swap(col * width + j, pivot_row * width + j);
            }
        }

        let pivot = aug[col * width + col];
        for v in &mut aug[col * width..(col + 1) * width] {
            *v /= pivot;
        }
        for row in (0..n).filter(|&r| r != col) {
            let factor = aug[row * width + col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..width {
                aug[row * width + j] -= factor * aug[col * width + j];
            }
        }
    }

    Some(
        (0..n)
            .flat_map(|i| aug[i * width + n..(i + 1) * width].to_vec())
            .collect(),
    )
}
