use std::fs::File;
use std::path::{Path, PathBuf};

use glob::glob;
use polars::prelude::*;
use tracing::{debug, info, instrument};

use crate::error::{PricingError, Result};
use crate::feature_engineering::numeric_column;

pub const PREDICTION_COLUMN: &str = "predicted_price";

const INFER_SCHEMA_ROWS: usize = 10_000;

/// DataLoader reads tabular property records from CSV files.
pub struct DataLoader {
    paths: Vec<PathBuf>,
}

impl DataLoader {
    /// Resolves a file path or glob pattern. An existing file is taken as is,
    /// even when its name contains glob metacharacters.
    pub fn new<P: AsRef<Path>>(path_pattern: P) -> Result<Self> {
        let pattern = path_pattern.as_ref();
        if pattern.is_file() {
            return Ok(Self {
                paths: vec![pattern.to_path_buf()],
            });
        }

        let pattern_str = pattern.to_str().ok_or_else(|| {
            PricingError::MalformedInput(format!("path is not valid UTF-8: {}", pattern.display()))
        })?;

        let mut paths: Vec<PathBuf> = glob(pattern_str)
            .map_err(|e| PricingError::MalformedInput(format!("bad glob pattern {pattern_str}: {e}")))?
            .filter_map(std::result::Result::ok)
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(PricingError::MalformedInput(format!(
                "no files found matching {pattern_str}"
            )));
        }
        debug!(?paths, "resolved input files");
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Loads every matched file into one frame, in path order.
    #[instrument(skip(self), fields(files = self.paths.len()))]
    pub fn load(&self) -> Result<DataFrame> {
        let frames = self
            .paths
            .iter()
            .map(|path| {
                LazyCsvReader::new(path)
                    .with_has_header(true)
                    .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
                    .finish()
            })
            .collect::<PolarsResult<Vec<_>>>()?;

        let df = concat(
            frames,
            UnionArgs {
                to_supertypes: true,
                ..Default::default()
            },
        )?
        .collect()?;

        if df.height() == 0 {
            return Err(PricingError::MalformedInput("input table has no rows".into()));
        }
        info!(shape = ?df.shape(), "loaded input table");
        Ok(df)
    }
}

/// Extracts the target column; a missing or null target is a missing feature.
pub fn target_values(frame: &DataFrame, target: &str) -> Result<Vec<f64>> {
    numeric_column(frame, target)
}

/// Writes one `predicted_price` column, row-aligned with the input.
#[instrument(skip(predictions), fields(rows = predictions.len()))]
pub fn write_predictions<P: AsRef<Path> + std::fmt::Debug>(path: P, predictions: &[f64]) -> Result<()> {
    let mut df = DataFrame::new(vec![Column::from(Series::new(
        PREDICTION_COLUMN.into(),
        predictions,
    ))])?;
    let mut file = File::create(path.as_ref())?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)?;
    Ok(())
}
