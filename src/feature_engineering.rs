//! The one transform from raw property records to the model's feature table.
//!
//! Training, single-record inference and batch inference all go through
//! [`FeatureBuilder::build_feature_frame`]; the column order in
//! [`FEATURE_COLUMNS`] is part of the model contract.

use std::collections::BTreeMap;

use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{PricingError, Result};
use crate::geo::{GeoProjector, GeoSettings};

pub const LAT_COLUMN: &str = "lat";
pub const LON_COLUMN: &str = "long";
pub const DISTANCE_COLUMN: &str = "dist_to_center_m";

/// Canonical model input order.
pub const FEATURE_COLUMNS: [&str; 18] = [
    "bedrooms",
    "bathrooms",
    "sqft_living",
    "sqft_lot",
    "floors",
    "waterfront",
    "view",
    "condition",
    "grade",
    "sqft_above",
    "sqft_basement",
    "yr_built",
    "yr_renovated",
    LAT_COLUMN,
    LON_COLUMN,
    "sqft_living15",
    "sqft_lot15",
    DISTANCE_COLUMN,
];

/// Columns a raw record must carry; everything but the derived distance.
pub fn source_columns() -> impl Iterator<Item = &'static str> {
    FEATURE_COLUMNS
        .iter()
        .copied()
        .filter(|&name| name != DISTANCE_COLUMN)
}

/// One property observation as named numeric fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(BTreeMap<String, f64>);

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: f64) -> Self {
        self.0.insert(field.into(), value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: f64) -> Option<f64> {
        self.0.insert(field.into(), value)
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        self.0.get(field).copied()
    }

    /// One-row table with a column per field.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let columns = self
            .0
            .iter()
            .map(|(name, &value)| Column::from(Series::new(name.as_str().into(), [value])))
            .collect();
        Ok(DataFrame::new(columns)?)
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeatureBuilder {
    projector: GeoProjector,
}

impl FeatureBuilder {
    pub fn new(settings: GeoSettings) -> Self {
        Self {
            projector: GeoProjector::new(settings),
        }
    }

    pub fn geo_settings(&self) -> &GeoSettings {
        self.projector.settings()
    }

    /// Returns a copy of `frame` with the distance-to-reference column added.
    #[instrument(skip_all, fields(rows = frame.height()))]
    pub fn add_distance_feature(&self, frame: &DataFrame) -> Result<DataFrame> {
        ensure_present(frame, [LAT_COLUMN, LON_COLUMN])?;
        let lats = numeric_column(frame, LAT_COLUMN)?;
        let lons = numeric_column(frame, LON_COLUMN)?;

        let distances = self.projector.distances(&lats, &lons);
        let mut enriched = frame.clone();
        enriched.with_column(Series::new(DISTANCE_COLUMN.into(), distances))?;
        Ok(enriched)
    }

    /// Builds the model-ready table: distance feature added, columns checked,
    /// selected and ordered as [`FEATURE_COLUMNS`], every column `Float64`.
    #[instrument(skip_all, fields(rows = raw.height()))]
    pub fn build_feature_frame(&self, raw: &DataFrame) -> Result<DataFrame> {
        let enriched = self.add_distance_feature(raw)?;
        ensure_present(&enriched, FEATURE_COLUMNS)?;

        let columns = FEATURE_COLUMNS
            .iter()
            .map(|&name| {
                let series = enriched
                    .column(name)?
                    .as_materialized_series()
                    .strict_cast(&DataType::Float64)
                    .map_err(|e| malformed_column(name, e))?;
                Ok(Column::from(series))
            })
            .collect::<Result<Vec<_>>>()?;
        let features = DataFrame::new(columns)?;
        debug!(shape = ?features.shape(), "feature frame built");
        Ok(features)
    }

    pub fn build_record_features(&self, record: &RawRecord) -> Result<DataFrame> {
        self.build_feature_frame(&record.to_frame()?)
    }
}

/// Row-major matrix of a feature table, after checking its column order.
pub fn feature_matrix(features: &DataFrame, expected: &[String]) -> Result<Array2<f64>> {
    let names: Vec<&str> = features
        .get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .collect();
    if names.len() != expected.len() || names.iter().zip(expected).any(|(a, b)| *a != b) {
        return Err(PricingError::FeatureMismatch(format!(
            "expected columns [{}], got [{}]",
            expected.join(", "),
            names.join(", ")
        )));
    }

    let columns = expected
        .iter()
        .map(|name| numeric_column(features, name))
        .collect::<Result<Vec<_>>>()?;
    Ok(Array2::from_shape_fn(
        (features.height(), columns.len()),
        |(row, col)| columns[col][row],
    ))
}

/// Reads a column as `f64` values; nulls count as a missing feature.
pub fn numeric_column(frame: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = frame
        .column(name)
        .map_err(|_| PricingError::missing([name]))?;
    if column.null_count() > 0 {
        return Err(PricingError::missing([name]));
    }
    let series = column
        .as_materialized_series()
        .strict_cast(&DataType::Float64)
        .map_err(|e| malformed_column(name, e))?;
    Ok(series.f64()?.into_no_null_iter().collect())
}

fn ensure_present<'a>(frame: &DataFrame, required: impl IntoIterator<Item = &'a str>) -> Result<()> {
    let mut missing = Vec::new();
    for name in required {
        let absent = match frame.column(name) {
            Ok(column) => column.null_count() > 0,
            Err(_) => true,
        };
        if absent {
            missing.push(name);
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PricingError::missing(missing))
    }
}

fn malformed_column(name: &str, err: PolarsError) -> PricingError {
    PricingError::MalformedInput(format!("column `{name}` is not numeric: {err}"))
}
