use std::path::Path;

use polars::prelude::*;
use tracing::{info, instrument};

use crate::artifact::ModelArtifact;
use crate::data_loader::{write_predictions, DataLoader};
use crate::error::{PricingError, Result};
use crate::feature_engineering::{FeatureBuilder, RawRecord};
use crate::geo::GeoSettings;
use crate::metrics::mean_std;
use crate::models::{Model, PricePipeline};

/// Read-only inference over a loaded pipeline. Safe to share across threads;
/// nothing here mutates the fitted state.
pub struct Predictor {
    pipeline: PricePipeline,
    builder: FeatureBuilder,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionSummary {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl Predictor {
    /// Loads an artifact trained under the given coordinate settings.
    pub fn load(path: &Path, geo: &GeoSettings) -> Result<Self> {
        let artifact = ModelArtifact::load(path, geo)?;
        info!(path = %path.display(), trees = artifact.pipeline().regressor().n_trees(), "model loaded");
        Ok(Self {
            builder: FeatureBuilder::new(*artifact.geo()),
            pipeline: artifact.into_pipeline(),
        })
    }

    pub fn from_pipeline(pipeline: PricePipeline, geo: GeoSettings) -> Result<Self> {
        if !pipeline.is_fitted() {
            return Err(PricingError::NotFitted);
        }
        Ok(Self {
            pipeline,
            builder: FeatureBuilder::new(geo),
        })
    }

    pub fn pipeline(&self) -> &PricePipeline {
        &self.pipeline
    }

    pub fn predict_record(&self, record: &RawRecord) -> Result<f64> {
        let features = self.builder.build_record_features(record)?;
        let predictions = self.pipeline.predict(&features)?;
        predictions
            .f64()?
            .get(0)
            .ok_or_else(|| PricingError::MalformedInput("no prediction produced".into()))
    }

    /// One prediction per input row, in input order.
    #[instrument(skip_all, fields(rows = raw.height()))]
    pub fn predict_frame(&self, raw: &DataFrame) -> Result<Series> {
        let features = self.builder.build_feature_frame(raw)?;
        self.pipeline.predict(&features)
    }

    #[instrument(skip(self))]
    pub fn predict_csv(&self, input: &Path, output: &Path) -> Result<PredictionSummary> {
        let raw = DataLoader::new(input)?.load()?;
        let predictions: Vec<f64> = self
            .predict_frame(&raw)?
            .f64()?
            .into_no_null_iter()
            .collect();
        write_predictions(output, &predictions)?;

        let summary = PredictionSummary::of(&predictions);
        info!(
            rows = summary.count,
            mean = summary.mean,
            min = summary.min,
            max = summary.max,
            output = %output.display(),
            "saved predictions"
        );
        Ok(summary)
    }
}

impl PredictionSummary {
    fn of(predictions: &[f64]) -> Self {
        let (mean, std) = mean_std(predictions);
        Self {
            count: predictions.len(),
            mean,
            std,
            min: predictions.iter().copied().fold(f64::INFINITY, f64::min),
            max: predictions.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}
