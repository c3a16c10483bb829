pub mod gbdt;
pub mod pipeline;
pub mod scaler;
pub mod traits;

pub use gbdt::{GBDTModel, GbdtConfig};
pub use pipeline::{Pipeline, PricePipeline};
pub use scaler::StandardScaler;
pub use traits::{Model, ModelFactory, Regressor};
