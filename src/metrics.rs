use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegressionMetrics {
    pub mae: f64,
    pub rmse: f64,
}

impl RegressionMetrics {
    pub fn compute(actuals: &[f64], predictions: &[f64]) -> Self {
        Self {
            mae: mean_absolute_error(actuals, predictions),
            rmse: root_mean_squared_error(actuals, predictions),
        }
    }
}

/// Per-fold scores with their mean and population standard deviation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoldScores {
    pub scores: Vec<f64>,
    pub mean: f64,
    pub std: f64,
}

impl FoldScores {
    pub fn new(scores: Vec<f64>) -> Self {
        let (mean, std) = mean_std(&scores);
        Self { scores, mean, std }
    }
}

pub fn mean_absolute_error(actuals: &[f64], predictions: &[f64]) -> f64 {
    debug_assert_eq!(actuals.len(), predictions.len());
    let n = actuals.len().max(1) as f64;
    actuals
        .iter()
        .zip(predictions)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / n
}

pub fn root_mean_squared_error(actuals: &[f64], predictions: &[f64]) -> f64 {
    debug_assert_eq!(actuals.len(), predictions.len());
    let n = actuals.len().max(1) as f64;
    let mse = actuals
        .iter()
        .zip(predictions)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / n;
    mse.sqrt()
}

pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}
