//! Z-score standardization: `z = (x - mean) / std`, statistics learned once
//! at fit time. Zero-variance features keep a divisor of 1.

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{PricingError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl StandardScaler {
    /// Learns per-column mean and population standard deviation (ddof = 0).
    pub fn fit(data: ArrayView2<'_, f64>) -> Result<Self> {
        if data.nrows() == 0 {
            return Err(PricingError::MalformedInput(
                "cannot fit a scaler on an empty table".into(),
            ));
        }
        let mean = data
            .mean_axis(Axis(0))
            .map(|m| m.to_vec())
            .unwrap_or_default();
        let std = data
            .std_axis(Axis(0), 0.0)
            .iter()
            .map(|&s| if s == 0.0 || !s.is_finite() { 1.0 } else { s })
            .collect();
        Ok(Self { mean, std })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn std(&self) -> &[f64] {
        &self.std
    }

    pub fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if data.ncols() != self.n_features() {
            return Err(PricingError::FeatureMismatch(format!(
                "scaler fitted on {} features, got {}",
                self.n_features(),
                data.ncols()
            )));
        }
        let mut out = data.to_owned();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (mean, std) = (self.mean[j], self.std[j]);
            column.mapv_inplace(|x| (x - mean) / std);
        }
        Ok(out)
    }
}
