use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kc_house_price::{Config, Predictor, RawRecord, Trainer};
use tracing::{debug, info};

#[derive(Debug, Parser)]
#[command(name = "kc-house-price", about = "Train and serve the King County sale price model")]
struct Cli {
    /// TOML configuration; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fit the pipeline, report hold-out and spatial-CV errors, save the artifact.
    Train {
        /// Training CSV path or glob pattern.
        #[arg(long)]
        data: Option<String>,
        #[arg(long)]
        model: Option<PathBuf>,
    },
    /// Predict every row of a CSV file.
    Predict {
        #[arg(long)]
        model: Option<PathBuf>,
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Predict one record given as a JSON object of field -> number.
    PredictOne {
        #[arg(long)]
        model: Option<PathBuf>,
        #[arg(long)]
        record: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    debug!(?config, "configuration resolved");

    match cli.command {
        Command::Train { data, model } => {
            if let Some(data) = data {
                config.data.train_path = data;
            }
            if let Some(model) = model {
                config.data.model_path = model;
            }
            let report = Trainer::new(config)?.run().context("training failed")?;
            let (cv_rmse, cv_std) = report.spatial_rmse();
            println!("Spatial-CV RMSE: {cv_rmse:.3} +/- {cv_std:.3}");
            println!(
                "MAE: {:.3} | RMSE: {:.3}",
                report.holdout.mae, report.holdout.rmse
            );
        }
        Command::Predict {
            model,
            input,
            output,
        } => {
            let model = model.unwrap_or(config.data.model_path);
            let input = input.unwrap_or(config.data.predict_input);
            let output = output.unwrap_or(config.data.predict_output);
            let predictor = Predictor::load(&model, &config.geo.settings())?;
            let summary = predictor
                .predict_csv(&input, &output)
                .with_context(|| format!("batch prediction for {} failed", input.display()))?;
            info!(?summary, "batch complete");
            println!("Saved {}", output.display());
        }
        Command::PredictOne { model, record } => {
            let model = model.unwrap_or(config.data.model_path);
            let record: RawRecord =
                serde_json::from_str(&record).context("record must be a JSON object of numbers")?;
            let predictor = Predictor::load(&model, &config.geo.settings())?;
            let price = predictor.predict_record(&record)?;
            println!("{price:.2}");
        }
    }
    Ok(())
}
