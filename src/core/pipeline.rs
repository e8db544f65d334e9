//! End-to-end classification run.
//!
//! Each stage is a plain function over explicit inputs; `run_pipeline`
//! chains them in workflow order. Remote work goes through the [`Services`]
//! trait objects only.

use crate::config::PipelineConfig;
use crate::core::accuracy::ErrorMatrix;
use crate::core::acquisition::acquire_composite;
use crate::core::classify::{classify_image, classify_samples};
use crate::core::indices::{IndexCalculator, SpectralIndex};
use crate::core::morphology::opening;
use crate::core::sampling::{sample_class, SplitSets};
use crate::core::texture::GlcmTexture;
use crate::geometry::PolygonCollection;
use crate::io::report::PipelineReport;
use crate::io::service::{ClassifierTrainer, ImageSource, Sampler};
use crate::types::{CipError, CipResult, ClassMap, GeoTransform, MultiBandImage};
use std::time::Instant;

/// External collaborators of a run
pub struct Services<'a> {
    pub image_source: &'a dyn ImageSource,
    pub sampler: &'a dyn Sampler,
    pub trainer: &'a dyn ClassifierTrainer,
}

/// Region of interest and the two reference polygon sets
#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub roi: PolygonCollection,
    /// Chemical industrial parks
    pub positive: PolygonCollection,
    /// Other land
    pub negative: PolygonCollection,
}

/// Everything a run produces
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub report: PipelineReport,
    /// Class map after morphological opening
    pub class_map: ClassMap,
    /// Class map before opening
    pub raw_class_map: ClassMap,
    pub geo_transform: GeoTransform,
}

/// Append spectral indices and GLCM texture to the composite
pub fn build_feature_stack(
    composite: &MultiBandImage,
    config: &PipelineConfig,
) -> CipResult<MultiBandImage> {
    let mut stack = composite.clone();
    let indices = IndexCalculator::new(config.indices.clone())
        .compute_all(composite, &SpectralIndex::ALL)?;
    stack.add_bands(indices)?;
    let texture = GlcmTexture::new(config.texture.clone()).compute(composite)?;
    stack.add_bands(texture)?;
    log::info!(
        "Feature stack: {} bands ({})",
        stack.band_count(),
        stack.band_names().join(", ")
    );
    Ok(stack)
}

/// Generate, split and merge the points of both classes, positive first
pub fn build_samples(config: &PipelineConfig, reference: &ReferenceData) -> CipResult<SplitSets> {
    let positive = sample_class(&reference.positive, &config.positive_sampling(), &config.split)?;
    let negative = sample_class(&reference.negative, &config.negative_sampling(), &config.split)?;
    let merged = positive.merge(negative);
    log::info!(
        "Training points: {}, validation points: {}",
        merged.training.len(),
        merged.validation.len()
    );
    if merged.training.is_empty() || merged.validation.is_empty() {
        return Err(CipError::DataAvailability(format!(
            "Split left {} training and {} validation points",
            merged.training.len(),
            merged.validation.len()
        )));
    }
    Ok(merged)
}

/// Run acquisition, feature engineering, training, classification,
/// opening and validation
pub fn run_pipeline(
    config: &PipelineConfig,
    services: &Services<'_>,
    reference: &ReferenceData,
) -> CipResult<PipelineOutput> {
    let start = Instant::now();
    let bounds = reference.roi.bounds().ok_or_else(|| {
        CipError::InvalidInput("Region of interest has no polygons".to_string())
    })?;

    let query = config.acquisition.query(bounds);
    let composite = acquire_composite(services.image_source, &query, &config.acquisition.cloud_mask)?;
    log::info!("Composite ready in {:.1?}", start.elapsed());

    let stack = build_feature_stack(&composite, config)?;
    let points = build_samples(config, reference)?;

    let training = services
        .sampler
        .sample_regions(&stack, &points.training, &config.training_sampling)?;
    log::info!("Training table: {} samples", training.len());
    let classifier = services.trainer.train(&training, &config.random_forest)?;

    let raw_class_map = classify_image(&stack, Some(&reference.roi), classifier.as_ref())?;
    let class_map = opening(&raw_class_map, &config.opening)?;

    let validation = services
        .sampler
        .sample_regions(&stack, &points.validation, &config.validation_sampling)?;
    log::info!("Validation table: {} samples", validation.len());
    let predicted = classify_samples(&validation, classifier.as_ref())?;
    let matrix = ErrorMatrix::from_pairs(&validation.labels(), &predicted)?;
    log::info!("Validation error matrix:\n{}", matrix);

    let report = PipelineReport::new(
        config,
        stack.band_names().to_vec(),
        &points,
        training.len(),
        validation.len(),
        matrix,
        &class_map,
    );
    log::info!(
        "Pipeline finished in {:.1?}: overall accuracy {:.4}, kappa {:.4}",
        start.elapsed(),
        report.metrics.overall_accuracy,
        report.metrics.kappa
    );

    Ok(PipelineOutput {
        report,
        class_map,
        raw_class_map,
        geo_transform: *stack.geo_transform(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::rectangle;
    use crate::types::GeoTransform;
    use ndarray::Array2;

    #[test]
    fn test_feature_stack_layout() {
        let gt = GeoTransform::north_up(0.0, 100.0, 10.0);
        let band = |v: f32| Array2::from_shape_fn((10, 10), |(r, c)| v + (r * 10 + c) as f32 * 1e-3);
        let composite = MultiBandImage::from_bands(
            gt,
            vec![
                ("B8", band(0.4)),
                ("B4", band(0.1)),
                ("B2", band(0.05)),
                ("B3", band(0.08)),
                ("B11", band(0.3)),
                ("B12", band(0.2)),
            ],
        )
        .unwrap();
        let mut config = PipelineConfig::default();
        config.texture.size = 1;
        let stack = build_feature_stack(&composite, &config).unwrap();
        assert_eq!(stack.band_count(), 18);
        assert_eq!(&stack.band_names()[..7], &["B8", "B4", "B2", "B3", "B11", "B12", "ndvi"]);
        assert_eq!(stack.band_names()[10], "B8_asm");
        assert_eq!(stack.band_names()[17], "B8_diss");
    }

    #[test]
    fn test_samples_positive_first() {
        let mut config = PipelineConfig::default();
        config.positive.count = 20;
        config.negative.count = 20;
        config.negative.point_seed = 5;
        config.negative.split_seed = 5;
        let reference = ReferenceData {
            roi: PolygonCollection::new(vec![rectangle(0.0, 0.0, 200.0, 100.0)]),
            positive: PolygonCollection::new(vec![rectangle(0.0, 0.0, 100.0, 100.0)]),
            negative: PolygonCollection::new(vec![rectangle(100.0, 0.0, 200.0, 100.0)]),
        };
        let sets = build_samples(&config, &reference).unwrap();
        let first_negative = sets
            .training
            .iter()
            .position(|p| p.landcover == 0)
            .unwrap();
        assert!(sets.training[..first_negative].iter().all(|p| p.landcover == 1));
        assert!(sets.training[first_negative..].iter().all(|p| p.landcover == 0));
    }
}
