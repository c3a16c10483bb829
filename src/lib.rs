pub mod artifact;
pub mod config;
pub mod data_loader;
pub mod error;
pub mod feature_engineering;
pub mod geo;
pub mod metrics;
pub mod models;
pub mod predictor;
pub mod spatial_cv;
pub mod trainer;

#[cfg(test)]
mod test_support;

pub use artifact::ModelArtifact;
pub use config::Config;
pub use data_loader::DataLoader;
pub use error::{PricingError, Result};
pub use feature_engineering::{FeatureBuilder, RawRecord, FEATURE_COLUMNS};
pub use geo::{GeoProjector, GeoSettings};
pub use models::{GBDTModel, Model, PricePipeline};
pub use predictor::Predictor;
pub use trainer::{Trainer, TrainingReport};
