use crate::io::service::{ImageSource, SceneQuery};
use crate::types::{Band, CipError, CipResult, MultiBandImage, SceneImage};
use ndarray::{Array2, Zip};
use num_traits::Float;
use serde::{Deserialize, Serialize};

/// QA bitmask masking and reflectance scaling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudMaskParams {
    /// Name of the per-pixel quality band
    pub qa_band: String,
    /// Bit set for opaque clouds
    pub cloud_bit: u8,
    /// Bit set for cirrus
    pub cirrus_bit: u8,
    /// Divisor turning digital numbers into [0, 1] reflectance
    pub reflectance_scale: f32,
}

impl Default for CloudMaskParams {
    fn default() -> Self {
        Self {
            qa_band: "QA60".to_string(),
            cloud_bit: 10,
            cirrus_bit: 11,
            reflectance_scale: 10000.0,
        }
    }
}

/// Cloud and cirrus masking for Sentinel-2 scenes
pub struct CloudMasker {
    params: CloudMaskParams,
}

impl CloudMasker {
    pub fn new(params: CloudMaskParams) -> Self {
        Self { params }
    }

    /// Masker with the Sentinel-2 QA60 layout
    pub fn standard() -> Self {
        Self::new(CloudMaskParams::default())
    }

    /// True where both the cloud and the cirrus bit are zero
    pub fn clear_mask(&self, qa: &Band) -> Array2<bool> {
        let flags = (1u32 << self.params.cloud_bit) | (1u32 << self.params.cirrus_bit);
        qa.mapv(|v| v.is_finite() && v >= 0.0 && (v as u32) & flags == 0)
    }

    /// Apply the QA mask and reflectance scaling to every non-QA band.
    ///
    /// Masked pixels become NaN; the QA band is not carried over.
    pub fn mask_scene(&self, scene: &SceneImage) -> CipResult<MultiBandImage> {
        let qa = scene.image.band(&self.params.qa_band).map_err(|_| {
            CipError::InvalidInput(format!(
                "Scene {} has no '{}' quality band",
                scene.id, self.params.qa_band
            ))
        })?;
        let clear = self.clear_mask(qa);
        let clear_count = clear.iter().filter(|&&c| c).count();
        log::debug!(
            "Scene {}: {} of {} pixels clear",
            scene.id,
            clear_count,
            clear.len()
        );

        let scale = self.params.reflectance_scale;
        let mut masked = MultiBandImage::new(scene.image.shape(), *scene.image.geo_transform());
        for (name, data) in scene.image.bands() {
            if name == self.params.qa_band {
                continue;
            }
            let band = Zip::from(data)
                .and(&clear)
                .map_collect(|&v, &ok| if ok { v / scale } else { f32::NAN });
            masked.add_band(name, band)?;
        }
        Ok(masked)
    }
}

/// Mask one scene with `params`
pub fn mask_clouds(scene: &SceneImage, params: &CloudMaskParams) -> CipResult<MultiBandImage> {
    CloudMasker::new(params.clone()).mask_scene(scene)
}

/// Keep scenes inside the date window, under the cloud threshold, overlapping the ROI
pub fn filter_scenes(scenes: Vec<SceneImage>, query: &SceneQuery) -> Vec<SceneImage> {
    let total = scenes.len();
    let kept: Vec<SceneImage> = scenes
        .into_iter()
        .filter(|s| {
            query.date_range.contains(s.acquired)
                && s.cloudy_pixel_percentage < query.max_cloud_percentage
                && s.image.bounds().intersects(&query.bounds)
        })
        .collect();
    log::info!("Scene filter kept {} of {} scenes", kept.len(), total);
    kept
}

/// Median of the finite values, NaN when there are none
pub fn nan_median<T: Float>(values: &mut Vec<T>) -> T {
    values.retain(|v| !v.is_nan());
    if values.is_empty() {
        return T::nan();
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / (T::one() + T::one())
    }
}

/// Per-pixel median over masked scenes.
///
/// Every image must share the grid and carry the bands of the first image.
/// A pixel masked in every image is NaN in the composite.
pub fn median_composite(images: &[MultiBandImage]) -> CipResult<MultiBandImage> {
    let first = images.first().ok_or_else(|| {
        CipError::DataAvailability("No scenes left to composite".to_string())
    })?;
    let shape = first.shape();
    for image in &images[1..] {
        if image.shape() != shape || image.geo_transform() != first.geo_transform() {
            return Err(CipError::InvalidInput(
                "Scenes do not share a common grid".to_string(),
            ));
        }
    }

    log::info!(
        "Median compositing {} scenes over {}x{} pixels",
        images.len(),
        shape.0,
        shape.1
    );

    let mut composite = MultiBandImage::new(shape, *first.geo_transform());
    for name in first.band_names() {
        let stack: Vec<&Band> = images
            .iter()
            .map(|img| img.band(name))
            .collect::<CipResult<_>>()?;

        let mut out = Array2::<f32>::zeros(shape);
        let reduce = |(r, c): (usize, usize), o: &mut f32| {
            let mut values: Vec<f32> = stack.iter().map(|b| b[[r, c]]).collect();
            *o = nan_median(&mut values);
        };

        #[cfg(feature = "parallel")]
        Zip::indexed(&mut out).par_for_each(reduce);
        #[cfg(not(feature = "parallel"))]
        Zip::indexed(&mut out).for_each(reduce);

        composite.add_band(name.clone(), out)?;
    }
    Ok(composite)
}

/// Fetch, filter, mask, select and composite a scene collection
pub fn acquire_composite(
    source: &dyn ImageSource,
    query: &SceneQuery,
    params: &CloudMaskParams,
) -> CipResult<MultiBandImage> {
    log::info!(
        "Acquiring '{}' from {} to {} (cloud < {}%)",
        query.collection,
        query.date_range.start,
        query.date_range.end,
        query.max_cloud_percentage
    );

    let scenes = filter_scenes(source.fetch_scenes(query)?, query);
    if scenes.is_empty() {
        return Err(CipError::DataAvailability(format!(
            "No scenes of '{}' match the date range and cloud threshold",
            query.collection
        )));
    }

    let masker = CloudMasker::new(params.clone());
    let masked: Vec<MultiBandImage> = scenes
        .iter()
        .map(|scene| masker.mask_scene(scene)?.select(query.bands.as_slice()))
        .collect::<CipResult<_>>()?;

    let composite = median_composite(&masked)?;
    let undefined = composite
        .bands()
        .next()
        .map(|(_, b)| b.iter().filter(|v| v.is_nan()).count())
        .unwrap_or(0);
    if undefined > 0 {
        log::warn!("{} composite pixels are masked in every scene", undefined);
    }
    Ok(composite)
}
