//! Forward UTM projection of WGS84 coordinates and distance to a fixed
//! reference point.
//!
//! The projection uses the Krüger series for the transverse Mercator
//! (accurate to well under a millimetre inside a zone). Input degrees are
//! not range-checked; out-of-range values propagate numerically.

use serde::{Deserialize, Serialize};

/// EPSG code of the geographic source coordinates.
pub const WGS84_EPSG: u32 = 4326;

/// Approximate downtown Seattle.
pub const SEATTLE_CENTER: GeoPoint = GeoPoint {
    lon: -122.3321,
    lat: 47.6062,
};

/// UTM zone 10N (EPSG:32610), covering King County.
pub const UTM_ZONE_10N: UtmZone = UtmZone {
    number: 10,
    northern: true,
};

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const UTM_K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmZone {
    pub number: u8,
    pub northern: bool,
}

impl UtmZone {
    pub fn epsg(&self) -> u32 {
        let base = if self.northern { 32600 } else { 32700 };
        base + u32::from(self.number)
    }

    fn central_meridian(&self) -> f64 {
        f64::from(self.number) * 6.0 - 183.0
    }
}

/// Planar easting/northing in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projected {
    pub easting: f64,
    pub northing: f64,
}

impl Projected {
    pub fn distance(&self, other: &Projected) -> f64 {
        (self.easting - other.easting).hypot(self.northing - other.northing)
    }
}

/// Coordinate reference settings shared by training and inference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoSettings {
    pub zone: UtmZone,
    pub reference: GeoPoint,
}

impl Default for GeoSettings {
    fn default() -> Self {
        Self {
            zone: UTM_ZONE_10N,
            reference: SEATTLE_CENTER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeoProjector {
    settings: GeoSettings,
    alpha: [f64; 3],
    big_a: f64,
    sqrt_n_factor: f64,
    reference: Projected,
}

impl Default for GeoProjector {
    fn default() -> Self {
        Self::new(GeoSettings::default())
    }
}

impl GeoProjector {
    pub fn new(settings: GeoSettings) -> Self {
        let n = WGS84_F / (2.0 - WGS84_F);
        let (n2, n3) = (n * n, n * n * n);
        let big_a = WGS84_A / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0);
        let alpha = [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0,
            61.0 * n3 / 240.0,
        ];
        let mut projector = Self {
            settings,
            alpha,
            big_a,
            sqrt_n_factor: 2.0 * n.sqrt() / (1.0 + n),
            reference: Projected {
                easting: 0.0,
                northing: 0.0,
            },
        };
        projector.reference = projector.project(settings.reference.lat, settings.reference.lon);
        projector
    }

    pub fn settings(&self) -> &GeoSettings {
        &self.settings
    }

    pub fn reference(&self) -> Projected {
        self.reference
    }

    /// Projects a WGS84 (lat, lon) pair in degrees into the configured zone.
    pub fn project(&self, lat: f64, lon: f64) -> Projected {
        let phi = lat.to_radians();
        let dlambda = (lon - self.settings.zone.central_meridian()).to_radians();

        let sin_phi = phi.sin();
        let t = (sin_phi.atanh() - self.sqrt_n_factor * (self.sqrt_n_factor * sin_phi).atanh()).sinh();
        let xi = t.atan2(dlambda.cos());
        let eta = (dlambda.sin() / (1.0 + t * t).sqrt()).atanh();

        let (mut e_sum, mut n_sum) = (eta, xi);
        for (j, alpha) in self.alpha.iter().enumerate() {
            let k = 2.0 * (j + 1) as f64;
            e_sum += alpha * (k * xi).cos() * (k * eta).sinh();
            n_sum += alpha * (k * xi).sin() * (k * eta).cosh();
        }

        let false_northing = if self.settings.zone.northern {
            0.0
        } else {
            FALSE_NORTHING_SOUTH
        };
        Projected {
            easting: FALSE_EASTING + UTM_K0 * self.big_a * e_sum,
            northing: false_northing + UTM_K0 * self.big_a * n_sum,
        }
    }

    /// Planar distance in meters from (lat, lon) to the reference point.
    pub fn distance_to_reference(&self, lat: f64, lon: f64) -> f64 {
        self.project(lat, lon).distance(&self.reference)
    }

    pub fn distances(&self, lats: &[f64], lons: &[f64]) -> Vec<f64> {
        lats.iter()
            .zip(lons)
            .map(|(&lat, &lon)| self.distance_to_reference(lat, lon))
            .collect()
    }
}
