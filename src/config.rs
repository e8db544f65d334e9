//! Run configuration.
//!
//! Every constant of the classification workflow lives here with its
//! customary value as the default, so an empty JSON object is a valid
//! configuration apart from the input file paths.

use crate::core::acquisition::CloudMaskParams;
use crate::core::extract::SampleRegionsParams;
use crate::core::indices::IndexBands;
use crate::core::morphology::OpeningParams;
use crate::core::sampling::{ClassSampling, SplitParams};
use crate::core::texture::GlcmParams;
use crate::io::remote::ServiceConfig;
use crate::io::service::{RandomForestParams, SceneQuery};
use crate::types::{BoundingBox, CipError, CipResult, DateRange, NEGATIVE_CLASS, POSITIVE_CLASS};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up under the user configuration directory
pub const CONFIG_FILE_NAME: &str = "cipmap.json";

/// Scene collection and compositing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub collection: String,
    /// First acquisition day (inclusive)
    pub start_date: NaiveDate,
    /// Day after the last acquisition (exclusive)
    pub end_date: NaiveDate,
    pub max_cloud_percentage: f32,
    /// Reflectance bands kept in the composite, in stacking order
    pub bands: Vec<String>,
    pub cloud_mask: CloudMaskParams,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            collection: "COPERNICUS/S2_SR".to_string(),
            start_date: NaiveDate::from_ymd_opt(2021, 10, 1).unwrap_or(NaiveDate::MIN),
            end_date: NaiveDate::from_ymd_opt(2021, 12, 31).unwrap_or(NaiveDate::MAX),
            max_cloud_percentage: 20.0,
            bands: ["B8", "B4", "B2", "B3", "B11", "B12"]
                .iter()
                .map(|b| b.to_string())
                .collect(),
            cloud_mask: CloudMaskParams::default(),
        }
    }
}

impl AcquisitionConfig {
    pub fn date_range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }

    /// Collection query over `bounds`
    pub fn query(&self, bounds: BoundingBox) -> SceneQuery {
        SceneQuery {
            collection: self.collection.clone(),
            bounds,
            date_range: self.date_range(),
            max_cloud_percentage: self.max_cloud_percentage,
            bands: self.bands.clone(),
        }
    }
}

/// Reference polygons and point generation for one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassSource {
    /// GeoJSON file with the class polygons
    pub polygons: PathBuf,
    pub count: usize,
    pub point_seed: u64,
    pub split_seed: u64,
}

impl Default for ClassSource {
    fn default() -> Self {
        Self {
            polygons: PathBuf::new(),
            count: 3000,
            point_seed: 0,
            split_seed: 0,
        }
    }
}

impl ClassSource {
    fn at(path: &str) -> Self {
        Self {
            polygons: PathBuf::from(path),
            ..Self::default()
        }
    }

    pub fn sampling(&self, landcover: u8) -> ClassSampling {
        ClassSampling {
            landcover,
            count: self.count,
            point_seed: self.point_seed,
            split_seed: self.split_seed,
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// GeoJSON file with the region of interest
    pub roi: PathBuf,
    /// Chemical industrial park reference polygons
    pub positive: ClassSource,
    /// Other land reference polygons
    pub negative: ClassSource,
    pub acquisition: AcquisitionConfig,
    pub indices: IndexBands,
    pub texture: GlcmParams,
    pub split: SplitParams,
    pub training_sampling: SampleRegionsParams,
    pub validation_sampling: SampleRegionsParams,
    pub random_forest: RandomForestParams,
    pub opening: OpeningParams,
    pub service: ServiceConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            roi: PathBuf::from("roi.geojson"),
            positive: ClassSource::at("cips.geojson"),
            negative: ClassSource::at("other.geojson"),
            acquisition: AcquisitionConfig::default(),
            indices: IndexBands::default(),
            texture: GlcmParams::default(),
            split: SplitParams::default(),
            training_sampling: SampleRegionsParams {
                scale: 40.0,
                tile_scale: 15,
            },
            validation_sampling: SampleRegionsParams {
                scale: 40.0,
                tile_scale: 10,
            },
            random_forest: RandomForestParams::default(),
            opening: OpeningParams::default(),
            service: ServiceConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a JSON configuration
    pub fn from_json(text: &str) -> CipResult<Self> {
        let config: PipelineConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    ///
    /// Relative input paths are resolved against the file's directory.
    pub fn load<P: AsRef<Path>>(path: P) -> CipResult<Self> {
        let path = path.as_ref();
        log::info!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_json(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// `<config dir>/cipmap/cipmap.json`, when the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("cipmap").join(CONFIG_FILE_NAME))
    }

    pub fn to_json(&self) -> CipResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for path in [
            &mut self.roi,
            &mut self.positive.polygons,
            &mut self.negative.polygons,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn positive_sampling(&self) -> ClassSampling {
        self.positive.sampling(POSITIVE_CLASS)
    }

    pub fn negative_sampling(&self) -> ClassSampling {
        self.negative.sampling(NEGATIVE_CLASS)
    }

    /// Check names, ranges and dates
    pub fn validate(&self) -> CipResult<()> {
        let band_pattern = Regex::new(r"^B(\d{1,2}|8A)$")
            .map_err(|e| CipError::Config(format!("Invalid band pattern: {}", e)))?;

        let acq = &self.acquisition;
        if acq.collection.trim().is_empty() {
            return Err(CipError::Config("Collection id is empty".to_string()));
        }
        if acq.start_date >= acq.end_date {
            return Err(CipError::Config(format!(
                "Start date {} is not before end date {}",
                acq.start_date, acq.end_date
            )));
        }
        if !(acq.max_cloud_percentage > 0.0 && acq.max_cloud_percentage <= 100.0) {
            return Err(CipError::Config(format!(
                "Cloud threshold {} is outside (0, 100]",
                acq.max_cloud_percentage
            )));
        }
        if acq.bands.is_empty() {
            return Err(CipError::Config("No bands selected".to_string()));
        }
        let role_bands = [
            &self.indices.nir,
            &self.indices.red,
            &self.indices.green,
            &self.indices.swir,
            &self.texture.band,
        ];
        for band in acq.bands.iter().chain(role_bands) {
            if !band_pattern.is_match(band) {
                return Err(CipError::Config(format!(
                    "'{}' is not a Sentinel-2 band name",
                    band
                )));
            }
        }
        for band in role_bands {
            if !acq.bands.contains(band) {
                return Err(CipError::Config(format!(
                    "Band '{}' is used for features but not selected",
                    band
                )));
            }
        }

        if !(self.split.threshold > 0.0 && self.split.threshold < 1.0) {
            return Err(CipError::Config(format!(
                "Split threshold {} is outside (0, 1)",
                self.split.threshold
            )));
        }
        for (name, class) in [("positive", &self.positive), ("negative", &self.negative)] {
            if class.count == 0 {
                return Err(CipError::Config(format!("{} point count is 0", name)));
            }
            if class.polygons.as_os_str().is_empty() {
                return Err(CipError::Config(format!("{} polygons path is not set", name)));
            }
        }
        for (name, params) in [
            ("training", &self.training_sampling),
            ("validation", &self.validation_sampling),
        ] {
            if !(params.scale > 0.0) || params.tile_scale == 0 {
                return Err(CipError::Config(format!(
                    "Invalid {} sampling parameters: {:?}",
                    name, params
                )));
            }
        }
        if self.texture.size == 0 {
            return Err(CipError::Config("GLCM size must be > 0".to_string()));
        }
        if self.opening.kernel_radius == 0 {
            return Err(CipError::Config("Kernel radius must be > 0".to_string()));
        }
        let rf = &self.random_forest;
        if rf.number_of_trees == 0 || rf.variables_per_split == 0 {
            return Err(CipError::Config(
                "Random forest needs at least one tree and one variable per split".to_string(),
            ));
        }
        if !(rf.bag_fraction > 0.0 && rf.bag_fraction <= 1.0) {
            return Err(CipError::Config(format!(
                "Bag fraction {} is outside (0, 1]",
                rf.bag_fraction
            )));
        }
        if self.service.max_attempts == 0 {
            return Err(CipError::Config("max_attempts must be >= 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_workflow_constants() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.acquisition.bands, vec!["B8", "B4", "B2", "B3", "B11", "B12"]);
        assert_eq!(config.acquisition.max_cloud_percentage, 20.0);
        assert_eq!(config.texture.size, 4);
        assert_eq!(config.positive.count, 3000);
        assert_eq!(config.split.threshold, 0.7);
        assert_eq!(config.training_sampling.tile_scale, 15);
        assert_eq!(config.validation_sampling.tile_scale, 10);
        assert_eq!(config.random_forest.number_of_trees, 100);
        assert_eq!(config.opening.kernel_radius, 1);
        assert_eq!(config.positive_sampling().landcover, POSITIVE_CLASS);
        assert_eq!(config.negative_sampling().landcover, NEGATIVE_CLASS);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PipelineConfig::from_json(
            r#"{
                "positive": { "polygons": "parks.geojson", "count": 50 },
                "acquisition": { "start_date": "2022-01-01", "end_date": "2022-03-01" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.positive.count, 50);
        assert_eq!(config.positive.point_seed, 0);
        assert_eq!(config.acquisition.max_cloud_percentage, 20.0);
        assert_eq!(config.acquisition.collection, "COPERNICUS/S2_SR");
        assert_eq!(config.negative.polygons, PathBuf::from("other.geojson"));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = PipelineConfig::default();
        config.acquisition.bands.push("NIR".to_string());
        assert!(matches!(config.validate(), Err(CipError::Config(_))));

        let mut config = PipelineConfig::default();
        config.acquisition.bands.retain(|b| b != "B11");
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.split.threshold = 1.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.acquisition.end_date = config.acquisition.start_date;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.acquisition.bands.push("B8A".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn test_round_trip_json() {
        let config = PipelineConfig::default();
        let parsed = PipelineConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
