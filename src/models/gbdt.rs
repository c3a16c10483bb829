//! Gradient-boosted regression trees with histogram split finding.
//!
//! Squared-error loss, so every round fits a depth-limited tree to the
//! residual gradients `pred - y` with unit hessians. Each feature is cut into
//! at most `max_bins` quantile bins once per fit; split search then walks the
//! per-node bin histograms. Row subsampling (per round) and column
//! subsampling (per tree) draw from a single `StdRng` seeded from the config,
//! so the same data and seed always yield the same trees.

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::traits::Regressor;
use crate::config::ModelParams;
use crate::error::{PricingError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbdtConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub max_bins: usize,
    pub min_child_weight: f64,
    pub reg_lambda: f64,
    pub seed: u64,
}

impl From<&ModelParams> for GbdtConfig {
    fn from(params: &ModelParams) -> Self {
        Self {
            n_estimators: params.n_estimators,
            learning_rate: params.learning_rate,
            max_depth: params.max_depth,
            subsample: params.subsample,
            colsample_bytree: params.colsample_bytree,
            max_bins: params.max_bins,
            min_child_weight: params.min_child_weight,
            reg_lambda: params.reg_lambda,
            seed: params.seed,
        }
    }
}

impl Default for GbdtConfig {
    fn default() -> Self {
        Self::from(&ModelParams::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf { value } => return value,
                // NaN compares false and goes left, matching bin 0
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => idx = if row[feature] > threshold { right } else { left },
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Ensemble {
    base_score: f64,
    n_features: usize,
    trees: Vec<Tree>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GBDTModel {
    config: GbdtConfig,
    ensemble: Option<Ensemble>,
}

impl GBDTModel {
    pub fn new(config: GbdtConfig) -> Self {
        Self {
            config,
            ensemble: None,
        }
    }

    pub fn config(&self) -> &GbdtConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.ensemble.is_some()
    }

    pub fn n_trees(&self) -> usize {
        self.ensemble.as_ref().map_or(0, |e| e.trees.len())
    }
}

impl Regressor for GBDTModel {
    #[instrument(skip_all, fields(rows = x.nrows(), features = x.ncols()))]
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        let (n_rows, n_features) = x.dim();
        if n_rows == 0 || n_features == 0 {
            return Err(PricingError::MalformedInput(
                "cannot fit trees on an empty table".into(),
            ));
        }
        if y.len() != n_rows {
            return Err(PricingError::FeatureMismatch(format!(
                "{} feature rows but {} targets",
                n_rows,
                y.len()
            )));
        }
        if let Some(bad) = y.iter().position(|v| !v.is_finite()) {
            return Err(PricingError::MalformedInput(format!(
                "target at row {bad} is not finite"
            )));
        }

        let cfg = &self.config;
        let binned: Vec<BinnedFeature> = x
            .columns()
            .into_iter()
            .map(|column| BinnedFeature::new(column, cfg.max_bins))
            .collect();

        let base_score = y.sum() / n_rows as f64;
        let mut preds = vec![base_score; n_rows];
        let mut grad = vec![0.0; n_rows];
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let rows_per_round = sample_size(n_rows, cfg.subsample);
        let features_per_tree = sample_size(n_features, cfg.colsample_bytree);

        let mut trees = Vec::with_capacity(cfg.n_estimators);
        for _ in 0..cfg.n_estimators {
            for (g, (p, t)) in grad.iter_mut().zip(preds.iter().zip(y.iter())) {
                *g = p - t;
            }
            let rows = draw(&mut rng, n_rows, rows_per_round);
            let features = draw(&mut rng, n_features, features_per_tree);

            let mut builder = TreeBuilder {
                binned: &binned,
                grad: &grad,
                features: &features,
                config: cfg,
                nodes: Vec::new(),
            };
            builder.grow(rows, 0);
            let tree = Tree {
                nodes: builder.nodes,
            };

            for (i, pred) in preds.iter_mut().enumerate() {
                *pred += tree.predict_row(x.row(i));
            }
            trees.push(tree);
        }
        debug!(trees = trees.len(), base_score, "boosting finished");

        self.ensemble = Some(Ensemble {
            base_score,
            n_features,
            trees,
        });
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let ensemble = self.ensemble.as_ref().ok_or(PricingError::NotFitted)?;
        if x.ncols() != ensemble.n_features {
            return Err(PricingError::FeatureMismatch(format!(
                "trees fitted on {} features, got {}",
                ensemble.n_features,
                x.ncols()
            )));
        }
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                ensemble.base_score
                    + ensemble
                        .trees
                        .iter()
                        .map(|tree| tree.predict_row(row))
                        .sum::<f64>()
            })
            .collect())
    }
}

fn sample_size(total: usize, ratio: f64) -> usize {
    ((total as f64 * ratio).round() as usize).clamp(1, total)
}

/// Sorted draw of `amount` distinct indices below `total`.
fn draw(rng: &mut StdRng, total: usize, amount: usize) -> Vec<usize> {
    if amount >= total {
        return (0..total).collect();
    }
    let mut picked = index::sample(rng, total, amount).into_vec();
    picked.sort_unstable();
    picked
}

struct BinnedFeature {
    /// Sorted cut points; a value lands left of cut `b` when `x <= thresholds[b]`.
    thresholds: Vec<f64>,
    bins: Vec<u16>,
}

impl BinnedFeature {
    fn new(values: ArrayView1<'_, f64>, max_bins: usize) -> Self {
        let thresholds = bin_thresholds(values, max_bins);
        let bins = values
            .iter()
            .map(|&v| thresholds.partition_point(|&t| t < v) as u16)
            .collect();
        Self { thresholds, bins }
    }

    fn n_bins(&self) -> usize {
        self.thresholds.len() + 1
    }
}

fn bin_thresholds(values: ArrayView1<'_, f64>, max_bins: usize) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);

    let mut distinct = sorted.clone();
    distinct.dedup();
    if distinct.len() <= 1 {
        return Vec::new();
    }
    if distinct.len() <= max_bins {
        return distinct
            .windows(2)
            .map(|w| w[0] + (w[1] - w[0]) / 2.0)
            .collect();
    }

    let max = sorted[sorted.len() - 1];
    let mut cuts: Vec<f64> = (1..max_bins)
        .map(|i| sorted[i * sorted.len() / max_bins])
        .filter(|&c| c < max)
        .collect();
    cuts.dedup();
    cuts
}

struct SplitCandidate {
    feature: usize,
    bin: usize,
    gain: f64,
}

struct TreeBuilder<'a> {
    binned: &'a [BinnedFeature],
    grad: &'a [f64],
    features: &'a [usize],
    config: &'a GbdtConfig,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    /// Grows the subtree for `rows`, returning its root node index.
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let g: f64 = rows.iter().map(|&r| self.grad[r]).sum();
        let h = rows.len() as f64;

        let split = if depth < self.config.max_depth && rows.len() >= 2 {
            self.best_split(&rows, g, h)
        } else {
            None
        };

        let Some(split) = split else {
            let value = -g / (h + self.config.reg_lambda) * self.config.learning_rate;
            self.nodes.push(Node::Leaf { value });
            return self.nodes.len() - 1;
        };

        let binned = self.binned;
        let feature = &binned[split.feature];
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| usize::from(feature.bins[r]) <= split.bin);

        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value: 0.0 });
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: feature.thresholds[split.bin],
            left,
            right,
        };
        idx
    }

    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let lambda = self.config.reg_lambda;
        let min_weight = self.config.min_child_weight;
        let parent_score = g * g / (h + lambda);
        let mut best: Option<SplitCandidate> = None;

        for &f in self.features {
            let feature = &self.binned[f];
            let n_bins = feature.n_bins();
            if n_bins < 2 {
                continue;
            }

            let mut hist_g = vec![0.0; n_bins];
            let mut hist_h = vec![0.0; n_bins];
            for &r in rows {
                let b = usize::from(feature.bins[r]);
                hist_g[b] += self.grad[r];
                hist_h[b] += 1.0;
            }

            let (mut gl, mut hl) = (0.0, 0.0);
            for bin in 0..n_bins - 1 {
                gl += hist_g[bin];
                hl += hist_h[bin];
                let (gr, hr) = (g - gl, h - hl);
                if hl == 0.0 || hr == 0.0 || hl < min_weight || hr < min_weight {
                    continue;
                }
                let gain = gl * gl / (hl + lambda) + gr * gr / (hr + lambda) - parent_score;
                if gain > best.as_ref().map_or(0.0, |b| b.gain) {
                    best = Some(SplitCandidate {
                        feature: f,
                        bin,
                        gain,
                    });
                }
            }
        }
        best
    }
}
