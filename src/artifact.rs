//! On-disk form of a fitted pipeline.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, instrument};

use crate::error::{PricingError, Result};
use crate::feature_engineering::FEATURE_COLUMNS;
use crate::geo::GeoSettings;
use crate::models::PricePipeline;

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    format_version: u32,
    geo: GeoSettings,
    pipeline: PricePipeline,
}

impl ModelArtifact {
    pub fn new(pipeline: PricePipeline, geo: GeoSettings) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            geo,
            pipeline,
        }
    }

    pub fn geo(&self) -> &GeoSettings {
        &self.geo
    }

    pub fn pipeline(&self) -> &PricePipeline {
        &self.pipeline
    }

    pub fn into_pipeline(self) -> PricePipeline {
        self.pipeline
    }

    /// Writes through a uniquely named sibling temp file and renames it into
    /// place, so the target is always a complete artifact. Concurrent saves to
    /// one path each land whole; the last rename wins.
    #[instrument(skip(self))]
    pub fn save(&self, path: &Path) -> Result<()> {
        if !self.pipeline.is_fitted() {
            return Err(PricingError::NotFitted);
        }
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        tmp.persist(path).map_err(|e| PricingError::Io(e.error))?;
        info!(path = %path.display(), "saved model artifact");
        Ok(())
    }

    /// Reads an artifact and checks it against the feature contract and the
    /// process's coordinate settings.
    #[instrument]
    pub fn load(path: &Path, expected_geo: &GeoSettings) -> Result<Self> {
        let file = File::open(path).map_err(|e| PricingError::artifact(path, e))?;
        let artifact: ModelArtifact = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| PricingError::artifact(path, e))?;

        if artifact.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(PricingError::artifact(
                path,
                format!(
                    "format version {} is not supported (expected {})",
                    artifact.format_version, ARTIFACT_FORMAT_VERSION
                ),
            ));
        }
        if artifact.pipeline.feature_columns() != FEATURE_COLUMNS {
            return Err(PricingError::artifact(
                path,
                format!(
                    "feature columns [{}] differ from [{}]",
                    artifact.pipeline.feature_columns().join(", "),
                    FEATURE_COLUMNS.join(", ")
                ),
            ));
        }
        if artifact.geo != *expected_geo {
            return Err(PricingError::artifact(
                path,
                format!(
                    "trained with EPSG:{} and reference {:?}, current settings are EPSG:{} and {:?}",
                    artifact.geo.zone.epsg(),
                    artifact.geo.reference,
                    expected_geo.zone.epsg(),
                    expected_geo.reference
                ),
            ));
        }
        if !artifact.pipeline.is_fitted() {
            return Err(PricingError::artifact(path, "pipeline was saved unfitted"));
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelParams;
    use crate::geo::{GeoPoint, UtmZone};
    use crate::models::{Model, ModelFactory};
    use crate::test_support::fitted_pipeline;
    use std::fs;
    use std::thread;

    #[test]
    fn load_of_missing_file_is_an_artifact_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelArtifact::load(&dir.path().join("absent.json"), &GeoSettings::default())
            .unwrap_err();
        assert!(matches!(err, PricingError::ArtifactLoad { .. }));
    }

    #[test]
    fn load_of_garbage_is_an_artifact_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, b"not a model").unwrap();
        let err = ModelArtifact::load(&path, &GeoSettings::default()).unwrap_err();
        assert!(matches!(err, PricingError::ArtifactLoad { .. }));
    }

    #[test]
    fn save_load_round_trip_keeps_the_pipeline() {
        let (pipeline, features) = fitted_pipeline(150, 8);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        ModelArtifact::new(pipeline.clone(), GeoSettings::default())
            .save(&path)
            .unwrap();

        let loaded = ModelArtifact::load(&path, &GeoSettings::default()).unwrap();
        assert_eq!(loaded.pipeline(), &pipeline);
        assert!(loaded
            .pipeline()
            .predict(&features)
            .unwrap()
            .equals(&pipeline.predict(&features).unwrap()));

        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1, "temp file left behind");
    }

    #[test]
    fn concurrent_saves_to_one_path_leave_a_loadable_artifact() {
        let (first, _) = fitted_pipeline(80, 3);
        let (second, _) = fitted_pipeline(80, 4);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        for _ in 0..10 {
            let writers: Vec<_> = [first.clone(), second.clone()]
                .into_iter()
                .map(|pipeline| {
                    let path = path.clone();
                    thread::spawn(move || {
                        ModelArtifact::new(pipeline, GeoSettings::default()).save(&path)
                    })
                })
                .collect();
            for writer in writers {
                writer.join().unwrap().unwrap();
            }

            let loaded = ModelArtifact::load(&path, &GeoSettings::default()).unwrap();
            assert!(loaded.pipeline() == &first || loaded.pipeline() == &second);
        }
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "temp files left behind");
    }

    #[test]
    fn mismatched_projection_is_refused() {
        let (pipeline, _) = fitted_pipeline(60, 2);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        ModelArtifact::new(pipeline, GeoSettings::default())
            .save(&path)
            .unwrap();

        let other = GeoSettings {
            zone: UtmZone {
                number: 11,
                northern: true,
            },
            reference: GeoPoint {
                lon: -122.3321,
                lat: 47.6062,
            },
        };
        let err = ModelArtifact::load(&path, &other).unwrap_err();
        assert!(err.to_string().contains("EPSG:32610"), "{err}");
    }

    #[test]
    fn unfitted_pipelines_are_not_saved() {
        let pipeline = PricePipeline::create(&ModelParams::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let err = ModelArtifact::new(pipeline, GeoSettings::default())
            .save(&path)
            .unwrap_err();
        assert!(matches!(err, PricingError::NotFitted));
        assert!(!path.exists());
    }
}
