//! Seeded synthetic King County tables for unit tests.

use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ModelParams;
use crate::feature_engineering::{numeric_column, FeatureBuilder, RawRecord};
use crate::models::{Model, ModelFactory, PricePipeline};

pub const TARGET: &str = "price";

pub fn fast_model_params() -> ModelParams {
    ModelParams {
        n_estimators: 40,
        learning_rate: 0.2,
        max_depth: 4,
        ..ModelParams::default()
    }
}

/// Listing used throughout: a 1990 three-bedroom a few blocks from downtown.
pub fn scenario_record() -> RawRecord {
    [
        ("bedrooms", 3.0),
        ("bathrooms", 2.0),
        ("sqft_living", 1800.0),
        ("sqft_lot", 5000.0),
        ("floors", 1.0),
        ("waterfront", 0.0),
        ("view", 0.0),
        ("condition", 3.0),
        ("grade", 7.0),
        ("sqft_above", 1800.0),
        ("sqft_basement", 0.0),
        ("yr_built", 1990.0),
        ("yr_renovated", 0.0),
        ("lat", 47.61),
        ("long", -122.33),
        ("sqft_living15", 1800.0),
        ("sqft_lot15", 5000.0),
    ]
    .into_iter()
    .collect()
}

fn location_premium(lat: f64, lon: f64) -> f64 {
    250_000.0 * (lat * 25.0).sin() * (lon * 20.0).cos()
}

/// Raw records with every source column plus a `price` target.
pub fn synthetic_frame(n: usize, seed: u64) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bedrooms = Vec::with_capacity(n);
    let mut bathrooms = Vec::with_capacity(n);
    let mut sqft_living = Vec::with_capacity(n);
    let mut sqft_lot = Vec::with_capacity(n);
    let mut floors = Vec::with_capacity(n);
    let mut waterfront = Vec::with_capacity(n);
    let mut view = Vec::with_capacity(n);
    let mut condition = Vec::with_capacity(n);
    let mut grade = Vec::with_capacity(n);
    let mut sqft_above = Vec::with_capacity(n);
    let mut sqft_basement = Vec::with_capacity(n);
    let mut yr_built = Vec::with_capacity(n);
    let mut yr_renovated = Vec::with_capacity(n);
    let mut lat = Vec::with_capacity(n);
    let mut long = Vec::with_capacity(n);
    let mut sqft_living15 = Vec::with_capacity(n);
    let mut sqft_lot15 = Vec::with_capacity(n);
    let mut price = Vec::with_capacity(n);

    for _ in 0..n {
        let living: f64 = rng.gen_range(600.0..4500.0_f64).round();
        let basement = if rng.gen_bool(0.4) {
            (living * rng.gen_range(0.1..0.4)).round()
        } else {
            0.0
        };
        let g: i64 = rng.gen_range(5..=11);
        let water = if rng.gen_bool(0.02) { 1i64 } else { 0 };
        let la = rng.gen_range(47.2..47.8);
        let lo = rng.gen_range(-122.5..-121.7);

        bedrooms.push(rng.gen_range(1i64..=6));
        bathrooms.push(f64::from(rng.gen_range(4i32..=16)) * 0.25);
        sqft_living.push(living);
        sqft_lot.push(rng.gen_range(2000.0..20000.0_f64).round());
        floors.push(f64::from(rng.gen_range(2i32..=6)) * 0.5);
        waterfront.push(water);
        view.push(rng.gen_range(0i64..=4));
        condition.push(rng.gen_range(1i64..=5));
        grade.push(g);
        sqft_above.push(living - basement);
        sqft_basement.push(basement);
        yr_built.push(rng.gen_range(1900i64..=2015));
        yr_renovated.push(if rng.gen_bool(0.05) {
            rng.gen_range(1990i64..=2015)
        } else {
            0
        });
        lat.push(la);
        long.push(lo);
        sqft_living15.push((living * rng.gen_range(0.7..1.3)).round());
        sqft_lot15.push(rng.gen_range(2000.0..20000.0_f64).round());
        price.push(
            150_000.0
                + 180.0 * living
                + 35_000.0 * (g - 7) as f64
                + 400_000.0 * water as f64
                + location_premium(la, lo)
                + 400_000.0,
        );
    }

    df!(
        "bedrooms" => bedrooms,
        "bathrooms" => bathrooms,
        "sqft_living" => sqft_living,
        "sqft_lot" => sqft_lot,
        "floors" => floors,
        "waterfront" => waterfront,
        "view" => view,
        "condition" => condition,
        "grade" => grade,
        "sqft_above" => sqft_above,
        "sqft_basement" => sqft_basement,
        "yr_built" => yr_built,
        "yr_renovated" => yr_renovated,
        "lat" => lat,
        "long" => long,
        "sqft_living15" => sqft_living15,
        "sqft_lot15" => sqft_lot15,
        TARGET => price
    )
    .expect("synthetic frame")
}

/// Same columns, but the price depends on location alone.
pub fn location_only_frame(n: usize, seed: u64) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    let (lats, lons): (Vec<f64>, Vec<f64>) = (0..n)
        .map(|_| (rng.gen_range(47.2..47.8), rng.gen_range(-122.5..-121.7)))
        .unzip();
    let price: Vec<f64> = lats
        .iter()
        .zip(&lons)
        .map(|(&la, &lo)| 600_000.0 + location_premium(la, lo))
        .collect();

    let constant = |v: f64| vec![v; n];
    df!(
        "bedrooms" => constant(3.0),
        "bathrooms" => constant(2.0),
        "sqft_living" => constant(1800.0),
        "sqft_lot" => constant(5000.0),
        "floors" => constant(1.0),
        "waterfront" => constant(0.0),
        "view" => constant(0.0),
        "condition" => constant(3.0),
        "grade" => constant(7.0),
        "sqft_above" => constant(1800.0),
        "sqft_basement" => constant(0.0),
        "yr_built" => constant(1990.0),
        "yr_renovated" => constant(0.0),
        "lat" => lats,
        "long" => lons,
        "sqft_living15" => constant(1800.0),
        "sqft_lot15" => constant(5000.0),
        TARGET => price
    )
    .expect("location-only frame")
}

pub fn synthetic_prices(raw: &DataFrame) -> Vec<f64> {
    numeric_column(raw, TARGET).expect("price column")
}

/// A pipeline fitted on `n` synthetic rows, with the feature table it saw.
pub fn fitted_pipeline(n: usize, seed: u64) -> (PricePipeline, DataFrame) {
    let raw = synthetic_frame(n, seed);
    let features = FeatureBuilder::default()
        .build_feature_frame(&raw)
        .expect("features");
    let prices = Series::new(TARGET.into(), synthetic_prices(&raw));
    let mut pipeline = PricePipeline::create(&fast_model_params()).expect("pipeline");
    pipeline.fit(&features, &prices).expect("fit");
    (pipeline, features)
}
