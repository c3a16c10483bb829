//! Block K-fold cross-validation over a longitude/latitude grid.
//!
//! Points are grouped into square blocks of `spacing` degrees and whole
//! blocks are assigned to folds, so every test fold is geographically
//! separated from its training data.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::config::SpatialCvParams;
use crate::error::{PricingError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct BlockKFold {
    spacing: f64,
    n_splits: usize,
    shuffle: bool,
    seed: u64,
    balancing: usize,
}

impl From<&SpatialCvParams> for BlockKFold {
    fn from(params: &SpatialCvParams) -> Self {
        Self {
            spacing: params.spacing_degrees,
            n_splits: params.n_splits,
            shuffle: params.shuffle,
            seed: params.seed,
            balancing: params.balancing,
        }
    }
}

impl BlockKFold {
    pub fn new(spacing: f64, n_splits: usize) -> Self {
        Self::from(&SpatialCvParams {
            spacing_degrees: spacing,
            n_splits,
            ..SpatialCvParams::default()
        })
    }

    pub fn with_shuffle(mut self, shuffle: bool, seed: u64) -> Self {
        self.shuffle = shuffle;
        self.seed = seed;
        self
    }

    /// Block label of every point; labels index the occupied grid cells in
    /// (column, row) order.
    pub fn block_labels(&self, lons: &[f64], lats: &[f64]) -> Result<Vec<usize>> {
        if lons.len() != lats.len() {
            return Err(PricingError::MalformedInput(format!(
                "{} longitudes but {} latitudes",
                lons.len(),
                lats.len()
            )));
        }
        if lons.is_empty() {
            return Ok(Vec::new());
        }
        if lons.iter().chain(lats).any(|v| !v.is_finite()) {
            return Err(PricingError::MalformedInput(
                "coordinates must be finite for block assignment".into(),
            ));
        }

        let west = lons.iter().copied().fold(f64::INFINITY, f64::min);
        let south = lats.iter().copied().fold(f64::INFINITY, f64::min);
        let cells: Vec<(i64, i64)> = lons
            .iter()
            .zip(lats)
            .map(|(&lon, &lat)| {
                (
                    ((lon - west) / self.spacing).floor() as i64,
                    ((lat - south) / self.spacing).floor() as i64,
                )
            })
            .collect();

        let mut ids = BTreeMap::new();
        for &cell in &cells {
            ids.entry(cell).or_insert(0usize);
        }
        for (i, id) in ids.values_mut().enumerate() {
            *id = i;
        }
        Ok(cells.iter().map(|cell| ids[cell]).collect())
    }

    /// Train/test index sets, one per fold; indices ascend within each set.
    pub fn split(&self, lons: &[f64], lats: &[f64]) -> Result<Vec<Fold>> {
        let labels = self.block_labels(lons, lats)?;
        let n_blocks = labels.iter().max().map_or(0, |m| m + 1);
        if self.n_splits < 2 || self.n_splits > n_blocks {
            return Err(PricingError::InvalidConfig(format!(
                "cannot split {} blocks into {} folds; reduce n_splits or the block spacing",
                n_blocks, self.n_splits
            )));
        }

        let mut block_sizes = vec![0usize; n_blocks];
        for &label in &labels {
            block_sizes[label] += 1;
        }

        let block_fold = self.assign_blocks(&block_sizes);
        let folds: Vec<Fold> = (0..self.n_splits)
            .map(|k| {
                let (test, train): (Vec<usize>, Vec<usize>) =
                    (0..labels.len()).partition(|&i| block_fold[labels[i]] == k);
                Fold { train, test }
            })
            .collect();
        debug!(
            blocks = n_blocks,
            test_sizes = ?folds.iter().map(|f| f.test.len()).collect::<Vec<_>>(),
            "spatial folds assigned"
        );
        Ok(folds)
    }

    /// Fold index per block. With shuffling, keeps the candidate permutation
    /// whose test folds have the most even point counts.
    fn assign_blocks(&self, block_sizes: &[usize]) -> Vec<usize> {
        let n_blocks = block_sizes.len();
        let order: Vec<usize> = (0..n_blocks).collect();
        if !self.shuffle {
            return self.chunk_assignment(&order);
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<(f64, Vec<usize>)> = None;
        for _ in 0..self.balancing.max(1) {
            let mut permutation = order.clone();
            permutation.shuffle(&mut rng);
            let assignment = self.chunk_assignment(&permutation);

            let mut fold_sizes = vec![0.0; self.n_splits];
            for (block, &fold) in assignment.iter().enumerate() {
                fold_sizes[fold] += block_sizes[block] as f64;
            }
            let (_, spread) = crate::metrics::mean_std(&fold_sizes);
            if best.as_ref().map_or(true, |(s, _)| spread < *s) {
                best = Some((spread, assignment));
            }
        }
        best.map(|(_, a)| a).unwrap_or_default()
    }

    /// Splits `blocks` into `n_splits` contiguous chunks whose sizes differ
    /// by at most one, earlier chunks taking the remainder.
    fn chunk_assignment(&self, blocks: &[usize]) -> Vec<usize> {
        let n = blocks.len();
        let base = n / self.n_splits;
        let extra = n % self.n_splits;
        let mut assignment = vec![0; n];
        let mut start = 0;
        for fold in 0..self.n_splits {
            let len = base + usize::from(fold < extra);
            for &block in &blocks[start..start + len] {
                assignment[block] = fold;
            }
            start += len;
        }
        assignment
    }
}
