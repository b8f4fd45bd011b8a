//! Gaussian-kernel local mean trends.

use cellfate_core::{CellfateError, Result};

use crate::model::{require_stage, Model, ModelData, ModelStage};

/// Nadaraya-Watson smoother: each test point is the kernel- and
/// lineage-weighted mean of the observed expression.
///
/// `bandwidth` is relative to the observed pseudotime range.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalMeanModel {
    data: ModelData,
    bandwidth: f64,
    sigma: f64,
}

impl LocalMeanModel {
    pub fn new(bandwidth: f64) -> Result<Self> {
        if !(bandwidth.is_finite() && bandwidth > 0.0) {
            return Err(CellfateError::InvalidInput(format!(
                "bandwidth must be positive, found {bandwidth}"
            )));
        }
        Ok(Self {
            data: ModelData::default(),
            bandwidth,
            sigma: bandwidth,
        })
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    fn smooth(&self, t: f64) -> f64 {
        let mut num = 0.0;
        let mut den = 0.0;
        for ((&x, &y), &w) in self.data.x.iter().zip(&self.data.y).zip(&self.data.w) {
            let z = (t - x) / self.sigma;
            let k = w * (-0.5 * z * z).exp();
            num += k * y;
            den += k;
        }
        if den > 0.0 {
            num / den
        } else {
            f64::NAN
        }
    }
}

impl Default for LocalMeanModel {
    fn default() -> Self {
        Self {
            data: ModelData::default(),
            bandwidth: 0.1,
            sigma: 0.1,
        }
    }
}

impl Model for LocalMeanModel {
    fn name(&self) -> &str {
        "local_mean"
    }

    fn data(&self) -> &ModelData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut ModelData {
        &mut self.data
    }

    fn fit(&mut self) -> Result<()> {
        require_stage(&*self, ModelStage::Prepared)?;
        if self.data.w.iter().sum::<f64>() <= 0.0 {
            return Err(CellfateError::InvalidInput(
                "local mean needs at least one cell with positive weight".into(),
            ));
        }
        let lo = self.data.x.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = self.data.x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = if hi - lo > f64::EPSILON { hi - lo } else { 1.0 };
        self.sigma = self.bandwidth * range;
        self.data.stage = ModelStage::Fitted;
        Ok(())
    }

    fn predict(&mut self) -> Result<Vec<f64>> {
        require_stage(&*self, ModelStage::Fitted)?;
        let y_test: Vec<f64> = self.data.x_test.iter().map(|&t| self.smooth(t)).collect();
        self.data.y_test = y_test.clone();
        self.data.stage = ModelStage::Predicted;
        Ok(y_test)
    }

    fn box_clone(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}
