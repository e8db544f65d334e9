//! Seams to the external processing service.
//!
//! The pipeline only talks to these traits. `io::remote` implements them
//! over HTTP; tests use in-memory doubles.

use crate::core::extract::SampleRegionsParams;
use crate::types::{BoundingBox, CipResult, DateRange, LabeledPoint, MultiBandImage, SampleTable, SceneImage};
use serde::{Deserialize, Serialize};

/// Scene collection query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneQuery {
    /// Service-specific collection identifier
    pub collection: String,
    /// ROI bounds, in the CRS of the collection grid
    pub bounds: BoundingBox,
    pub date_range: DateRange,
    /// Scenes at or above this cloudy-pixel percentage are skipped
    pub max_cloud_percentage: f32,
    /// Reflectance bands kept after masking
    pub bands: Vec<String>,
}

/// Random-forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestParams {
    pub number_of_trees: usize,
    /// Features tried per split
    pub variables_per_split: usize,
    pub min_leaf_population: usize,
    /// Fraction of the training table bagged per tree
    pub bag_fraction: f64,
    pub max_nodes: Option<usize>,
    pub seed: u64,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            number_of_trees: 100,
            variables_per_split: 10,
            min_leaf_population: 1,
            bag_fraction: 0.5,
            max_nodes: None,
            seed: 0,
        }
    }
}

/// Source of Sentinel-2 scenes (QA band included)
pub trait ImageSource {
    fn fetch_scenes(&self, query: &SceneQuery) -> CipResult<Vec<SceneImage>>;
}

/// Extracts feature vectors at point locations
pub trait Sampler {
    fn sample_regions(
        &self,
        image: &MultiBandImage,
        points: &[LabeledPoint],
        params: &SampleRegionsParams,
    ) -> CipResult<SampleTable>;
}

/// Trained model. Rows follow the column order of `feature_names()`.
pub trait Classifier {
    fn feature_names(&self) -> &[String];

    fn predict(&self, rows: &[Vec<f32>]) -> CipResult<Vec<u8>>;
}

/// Trains a random forest on a sample table's features and `landcover` label
pub trait ClassifierTrainer {
    fn train(&self, table: &SampleTable, params: &RandomForestParams) -> CipResult<Box<dyn Classifier>>;
}
