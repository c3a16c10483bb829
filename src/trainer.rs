use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::artifact::ModelArtifact;
use crate::config::{Config, ModelParams};
use crate::data_loader::{target_values, DataLoader};
use crate::error::{PricingError, Result};
use crate::feature_engineering::{numeric_column, FeatureBuilder, LAT_COLUMN, LON_COLUMN};
use crate::metrics::{root_mean_squared_error, FoldScores, RegressionMetrics};
use crate::models::{Model, ModelFactory, PricePipeline};
use crate::spatial_cv::{BlockKFold, Fold};

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub n_train: usize,
    pub n_test: usize,
    /// Errors on the random held-out split.
    pub holdout: RegressionMetrics,
    /// Negative RMSE per spatial fold.
    pub spatial_cv: FoldScores,
}

impl TrainingReport {
    /// Spatial-CV RMSE as (mean, std) in price units.
    pub fn spatial_rmse(&self) -> (f64, f64) {
        (-self.spatial_cv.mean, self.spatial_cv.std)
    }
}

pub struct TrainingOutcome {
    pub pipeline: PricePipeline,
    pub report: TrainingReport,
}

pub struct Trainer {
    config: Config,
    builder: FeatureBuilder,
}

impl Trainer {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let builder = FeatureBuilder::new(config.geo.settings());
        Ok(Self { config, builder })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Loads the training table, fits, cross-validates and persists the
    /// pipeline. Nothing is written unless every step succeeds.
    #[instrument(skip(self), fields(data = %self.config.data.train_path))]
    pub fn run(&self) -> Result<TrainingReport> {
        let raw = DataLoader::new(&self.config.data.train_path)?.load()?;
        let outcome = self.train_frame(&raw)?;
        ModelArtifact::new(outcome.pipeline, *self.builder.geo_settings())
            .save(&self.config.data.model_path)?;
        Ok(outcome.report)
    }

    #[instrument(skip_all, fields(rows = raw.height()))]
    pub fn train_frame(&self, raw: &DataFrame) -> Result<TrainingOutcome> {
        let features = self.builder.build_feature_frame(raw)?;
        let target_name = self.config.data.target_column.as_str();
        let target = Series::new(target_name.into(), target_values(raw, target_name)?);

        let split = &self.config.split;
        let (train_idx, test_idx) = train_test_split(features.height(), split.test_size, split.seed)?;
        let mut pipeline = PricePipeline::create(&self.config.model)?;
        pipeline.fit(&take_rows(&features, &train_idx)?, &take_series(&target, &train_idx)?)?;

        let predicted = pipeline.predict(&take_rows(&features, &test_idx)?)?;
        let holdout = RegressionMetrics::compute(
            &series_values(&take_series(&target, &test_idx)?)?,
            &series_values(&predicted)?,
        );
        info!(mae = holdout.mae, rmse = holdout.rmse, "hold-out evaluation");

        let lons = numeric_column(&features, LON_COLUMN)?;
        let lats = numeric_column(&features, LAT_COLUMN)?;
        let folds = BlockKFold::from(&self.config.spatial_cv).split(&lons, &lats)?;
        let spatial_cv = cross_val_score::<PricePipeline>(&features, &target, &folds, &self.config.model)?;
        info!(
            "Spatial-CV RMSE: {:.3} +/- {:.3}",
            -spatial_cv.mean, spatial_cv.std
        );

        Ok(TrainingOutcome {
            pipeline,
            report: TrainingReport {
                n_train: train_idx.len(),
                n_test: test_idx.len(),
                holdout,
                spatial_cv,
            },
        })
    }
}

/// Seeded shuffle split; the first `ceil(test_size * n)` permuted rows are
/// held out.
pub fn train_test_split(n_rows: usize, test_size: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    let n_test = (test_size * n_rows as f64).ceil() as usize;
    if n_test == 0 || n_test >= n_rows {
        return Err(PricingError::InvalidConfig(format!(
            "test_size {test_size} leaves no rows on one side of a {n_rows}-row split"
        )));
    }
    let mut permutation: Vec<usize> = (0..n_rows).collect();
    permutation.shuffle(&mut StdRng::seed_from_u64(seed));
    let train = permutation.split_off(n_test);
    Ok((train, permutation))
}

/// Fits a fresh model per fold and scores it on the held-out rows as
/// negative RMSE.
pub fn cross_val_score<F: ModelFactory>(
    features: &DataFrame,
    target: &Series,
    folds: &[Fold],
    params: &ModelParams,
) -> Result<FoldScores> {
    let mut scores = Vec::with_capacity(folds.len());
    for (k, fold) in folds.iter().enumerate() {
        let mut model = F::create(params)?;
        model.fit(&take_rows(features, &fold.train)?, &take_series(target, &fold.train)?)?;
        let predicted = model.predict(&take_rows(features, &fold.test)?)?;
        let rmse = root_mean_squared_error(
            &series_values(&take_series(target, &fold.test)?)?,
            &series_values(&predicted)?,
        );
        debug!(fold = k, train = fold.train.len(), test = fold.test.len(), rmse, "fold scored");
        scores.push(-rmse);
    }
    Ok(FoldScores::new(scores))
}

fn row_index(rows: &[usize]) -> IdxCa {
    IdxCa::from_vec("idx".into(), rows.iter().map(|&r| r as IdxSize).collect())
}

fn take_rows(frame: &DataFrame, rows: &[usize]) -> Result<DataFrame> {
    Ok(frame.take(&row_index(rows))?)
}

fn take_series(series: &Series, rows: &[usize]) -> Result<Series> {
    Ok(series.take(&row_index(rows))?)
}

fn series_values(series: &Series) -> Result<Vec<f64>> {
    Ok(series
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::Predictor;
    use crate::test_support::{fast_model_params, location_only_frame, synthetic_frame};
    use std::collections::HashSet;

    fn test_config() -> Config {
        Config {
            model: fast_model_params(),
            ..Config::default()
        }
    }

    #[test]
    fn split_is_seeded_and_disjoint() {
        let (train, test) = train_test_split(101, 0.2, 42).unwrap();
        assert_eq!(test.len(), 21);
        assert_eq!(train.len(), 80);
        let all: HashSet<_> = train.iter().chain(&test).collect();
        assert_eq!(all.len(), 101);
        assert_eq!(train_test_split(101, 0.2, 42).unwrap(), (train, test));
    }

    #[test]
    fn split_needs_rows_on_both_sides() {
        assert!(train_test_split(1, 0.2, 0).is_err());
    }

    #[test]
    fn training_reports_holdout_and_spatial_scores() {
        let raw = synthetic_frame(600, 17);
        let outcome = Trainer::new(test_config()).unwrap().train_frame(&raw).unwrap();
        let report = &outcome.report;
        assert_eq!(report.n_test, 120);
        assert_eq!(report.n_train, 480);
        assert_eq!(report.spatial_cv.scores.len(), 5);
        assert!(report.spatial_cv.scores.iter().all(|s| *s < 0.0));
        assert!(report.holdout.mae > 0.0 && report.holdout.rmse >= report.holdout.mae);
        assert!(outcome.pipeline.is_fitted());
    }

    #[test]
    fn training_is_reproducible() {
        let raw = synthetic_frame(300, 4);
        let trainer = Trainer::new(test_config()).unwrap();
        let a = trainer.train_frame(&raw).unwrap();
        let b = trainer.train_frame(&raw).unwrap();
        assert_eq!(a.pipeline, b.pipeline);
        assert_eq!(a.report.spatial_cv, b.report.spatial_cv);
    }

    #[test]
    fn spatial_blocks_expose_location_leakage() {
        let raw = location_only_frame(2000, 99);
        let config = Config {
            model: ModelParams {
                n_estimators: 120,
                learning_rate: 0.15,
                max_depth: 5,
                ..ModelParams::default()
            },
            ..Config::default()
        };
        let report = Trainer::new(config).unwrap().train_frame(&raw).unwrap().report;
        let (spatial_rmse, _) = report.spatial_rmse();
        assert!(
            spatial_rmse > 1.5 * report.holdout.rmse,
            "spatial {spatial_rmse} vs random {}",
            report.holdout.rmse
        );
    }

    #[test]
    fn missing_column_aborts_training() {
        let raw = synthetic_frame(50, 1).drop("sqft_living15").unwrap();
        let err = Trainer::new(test_config()).unwrap().train_frame(&raw).err().unwrap();
        match err {
            PricingError::MissingFeature { columns } => assert_eq!(columns, vec!["sqft_living15"]),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn run_persists_an_artifact_that_predicts_like_memory() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("kc_house_data.csv");
        let mut raw = synthetic_frame(400, 23);
        CsvWriter::new(std::fs::File::create(&data_path).unwrap())
            .finish(&mut raw)
            .unwrap();

        let mut config = test_config();
        config.data.train_path = data_path.to_string_lossy().into_owned();
        config.data.model_path = dir.path().join("kc_price_model.json");
        let trainer = Trainer::new(config.clone()).unwrap();
        trainer.run().unwrap();

        let reloaded = DataLoader::new(&data_path).unwrap().load().unwrap();
        let in_memory = trainer.train_frame(&reloaded).unwrap().pipeline;
        let predictor = Predictor::load(&config.data.model_path, &config.geo.settings()).unwrap();

        let expected = in_memory
            .predict(&FeatureBuilder::default().build_feature_frame(&reloaded).unwrap())
            .unwrap();
        let actual = predictor.predict_frame(&reloaded).unwrap();
        assert!(actual.equals(&expected));
    }

    #[test]
    fn failed_run_writes_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("broken.csv");
        let mut raw = synthetic_frame(40, 2).drop("grade").unwrap();
        CsvWriter::new(std::fs::File::create(&data_path).unwrap())
            .finish(&mut raw)
            .unwrap();

        let mut config = test_config();
        config.data.train_path = data_path.to_string_lossy().into_owned();
        config.data.model_path = dir.path().join("model.json");
        let err = Trainer::new(config.clone()).unwrap().run().unwrap_err();
        assert!(matches!(err, PricingError::MissingFeature { .. }));
        assert!(!config.data.model_path.exists());
    }
}
