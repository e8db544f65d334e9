//! Input/output: service seams, remote client, vector and report files

pub mod remote;
pub mod report;
pub mod service;
pub mod vector;

#[cfg(feature = "geotiff")]
pub mod raster;

pub use remote::{RemoteImageSource, RemoteService, RemoteTrainer, ServiceConfig};
pub use report::PipelineReport;
pub use service::{Classifier, ClassifierTrainer, ImageSource, RandomForestParams, Sampler, SceneQuery};
pub use vector::read_polygons;

#[cfg(feature = "geotiff")]
pub use raster::{write_class_map, GeoTiffSceneSource};
