use ndarray::{Array1, ArrayView1, ArrayView2};
use polars::prelude::*;

use crate::config::ModelParams;
use crate::error::Result;

/// Fit/predict over model-ready feature tables. Implementors are immutable
/// once fitted; `predict` never changes learned state.
pub trait Model {
    fn fit(&mut self, features: &DataFrame, targets: &Series) -> Result<()>;
    fn predict(&self, features: &DataFrame) -> Result<Series>;
}

pub trait ModelFactory {
    type ModelType: Model;

    fn create(params: &ModelParams) -> Result<Self::ModelType>;
}

/// Numeric regressor behind a pipeline, working on dense row-major matrices.
pub trait Regressor {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()>;
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>>;
}
