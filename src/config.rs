use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PricingError, Result};
use crate::geo::{GeoPoint, GeoSettings, UtmZone};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataParams,
    pub model: ModelParams,
    pub split: SplitParams,
    pub spatial_cv: SpatialCvParams,
    pub geo: GeoParams,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataParams {
    /// Training table; a glob pattern selects several CSV shards.
    pub train_path: String,
    pub target_column: String,
    pub model_path: PathBuf,
    pub predict_input: PathBuf,
    pub predict_output: PathBuf,
}

impl Default for DataParams {
    fn default() -> Self {
        Self {
            train_path: "kc_house_data.csv".to_string(),
            target_column: "price".to_string(),
            model_path: PathBuf::from("kc_price_model.json"),
            predict_input: PathBuf::from("kc_new_listings.csv"),
            predict_output: PathBuf::from("predictions_kc_new.csv"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub max_bins: usize,
    pub min_child_weight: f64,
    pub reg_lambda: f64,
    pub seed: u64,
    pub standardize: bool,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            n_estimators: 600,
            learning_rate: 0.05,
            max_depth: 6,
            subsample: 0.8,
            colsample_bytree: 0.8,
            max_bins: 256,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            seed: 42,
            standardize: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SplitParams {
    pub test_size: f64,
    pub seed: u64,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpatialCvParams {
    /// Block edge length in degrees of longitude/latitude.
    pub spacing_degrees: f64,
    pub n_splits: usize,
    pub shuffle: bool,
    pub seed: u64,
    pub balancing: usize,
}

impl Default for SpatialCvParams {
    fn default() -> Self {
        Self {
            spacing_degrees: 0.2,
            n_splits: 5,
            shuffle: true,
            seed: 42,
            balancing: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeoParams {
    pub reference_lon: f64,
    pub reference_lat: f64,
    pub utm_zone: u8,
    pub northern: bool,
}

impl Default for GeoParams {
    fn default() -> Self {
        let settings = GeoSettings::default();
        Self {
            reference_lon: settings.reference.lon,
            reference_lat: settings.reference.lat,
            utm_zone: settings.zone.number,
            northern: settings.zone.northern,
        }
    }
}

impl GeoParams {
    pub fn settings(&self) -> GeoSettings {
        GeoSettings {
            zone: UtmZone {
                number: self.utm_zone,
                northern: self.northern,
            },
            reference: GeoPoint {
                lon: self.reference_lon,
                lat: self.reference_lat,
            },
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&contents).map_err(|e| PricingError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PricingError::InvalidConfig(msg));

        let m = &self.model;
        if m.n_estimators == 0 {
            return invalid("model.n_estimators must be positive".into());
        }
        if !(m.learning_rate > 0.0) {
            return invalid(format!("model.learning_rate must be positive, got {}", m.learning_rate));
        }
        if m.max_depth == 0 {
            return invalid("model.max_depth must be positive".into());
        }
        for (name, ratio) in [("subsample", m.subsample), ("colsample_bytree", m.colsample_bytree)] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return invalid(format!("model.{name} must lie in (0, 1], got {ratio}"));
            }
        }
        if !(2..=u16::MAX as usize).contains(&m.max_bins) {
            return invalid(format!("model.max_bins must lie in [2, 65535], got {}", m.max_bins));
        }
        if m.min_child_weight < 0.0 || m.reg_lambda < 0.0 {
            return invalid("model.min_child_weight and model.reg_lambda must be non-negative".into());
        }

        let t = self.split.test_size;
        if !(t > 0.0 && t < 1.0) {
            return invalid(format!("split.test_size must lie in (0, 1), got {t}"));
        }

        let cv = &self.spatial_cv;
        if cv.n_splits < 2 {
            return invalid(format!("spatial_cv.n_splits must be at least 2, got {}", cv.n_splits));
        }
        if !(cv.spacing_degrees > 0.0) {
            return invalid(format!(
                "spatial_cv.spacing_degrees must be positive, got {}",
                cv.spacing_degrees
            ));
        }
        if cv.balancing == 0 {
            return invalid("spatial_cv.balancing must be positive".into());
        }

        if !(1..=60).contains(&self.geo.utm_zone) {
            return invalid(format!("geo.utm_zone must lie in [1, 60], got {}", self.geo.utm_zone));
        }
        Ok(())
    }
}
