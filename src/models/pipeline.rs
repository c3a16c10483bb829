use ndarray::{Array2, ArrayView1};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::gbdt::GBDTModel;
use super::scaler::StandardScaler;
use super::traits::{Model, ModelFactory, Regressor};
use crate::config::ModelParams;
use crate::data_loader::PREDICTION_COLUMN;
use crate::error::{PricingError, Result};
use crate::feature_engineering::{feature_matrix, FEATURE_COLUMNS};

/// Standardization followed by a regressor, fitted and persisted as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline<R> {
    feature_columns: Vec<String>,
    standardize: bool,
    scaler: Option<StandardScaler>,
    regressor: R,
    fitted: bool,
}

pub type PricePipeline = Pipeline<GBDTModel>;

impl<R: Regressor> Pipeline<R> {
    pub fn new(regressor: R, standardize: bool) -> Self {
        Self {
            feature_columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            standardize,
            scaler: None,
            regressor,
            fitted: false,
        }
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn scaler(&self) -> Option<&StandardScaler> {
        self.scaler.as_ref()
    }

    pub fn regressor(&self) -> &R {
        &self.regressor
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    fn preprocess(&self, x: Array2<f64>) -> Result<Array2<f64>> {
        match &self.scaler {
            Some(scaler) => scaler.transform(x.view()),
            None => Ok(x),
        }
    }
}

impl<R: Regressor> Model for Pipeline<R> {
    #[instrument(skip_all, fields(rows = features.height()))]
    fn fit(&mut self, features: &DataFrame, targets: &Series) -> Result<()> {
        let x = feature_matrix(features, &self.feature_columns)?;
        let y: Vec<f64> = targets
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        if y.len() != x.nrows() {
            return Err(PricingError::FeatureMismatch(format!(
                "{} feature rows but {} targets",
                x.nrows(),
                y.len()
            )));
        }

        self.scaler = if self.standardize {
            Some(StandardScaler::fit(x.view())?)
        } else {
            None
        };
        let z = self.preprocess(x)?;
        self.regressor.fit(z.view(), ArrayView1::from(&y))?;
        self.fitted = true;
        debug!(standardized = self.standardize, "pipeline fitted");
        Ok(())
    }

    fn predict(&self, features: &DataFrame) -> Result<Series> {
        if !self.fitted {
            return Err(PricingError::NotFitted);
        }
        let x = feature_matrix(features, &self.feature_columns)?;
        let z = self.preprocess(x)?;
        let predictions = self.regressor.predict(z.view())?;
        Ok(Series::new(PREDICTION_COLUMN.into(), predictions.to_vec()))
    }
}

impl ModelFactory for PricePipeline {
    type ModelType = Self;

    fn create(params: &ModelParams) -> Result<Self::ModelType> {
        Ok(Pipeline::new(GBDTModel::new(params.into()), params.standardize))
    }
}
