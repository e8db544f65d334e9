//! Core classification stages

pub mod accuracy;
pub mod acquisition;
pub mod classify;
pub mod extract;
pub mod indices;
pub mod morphology;
pub mod pipeline;
pub mod sampling;
pub mod texture;

// Re-export main types
pub use accuracy::{AccuracyMetrics, ErrorMatrix};
pub use acquisition::{acquire_composite, mask_clouds, median_composite, CloudMaskParams, CloudMasker};
pub use classify::{classify_image, classify_samples};
pub use extract::{GridSampler, SampleRegionsParams};
pub use indices::{IndexBands, IndexCalculator, SpectralIndex};
pub use morphology::{opening, OpeningParams};
pub use pipeline::{run_pipeline, PipelineOutput, ReferenceData, Services};
pub use sampling::{sample_class, BoundaryPolicy, ClassSampling, SplitParams, SplitSets};
pub use texture::{GlcmParams, GlcmStatistic, GlcmTexture};
