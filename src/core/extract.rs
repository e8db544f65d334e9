use crate::io::service::Sampler;
use crate::types::{CipError, CipResult, LabeledPoint, MultiBandImage, SampleRecord, SampleTable};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Point sampling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleRegionsParams {
    /// Sampling resolution in CRS units
    pub scale: f64,
    /// Number of batches the point set is split into
    pub tile_scale: u32,
}

impl Default for SampleRegionsParams {
    fn default() -> Self {
        Self {
            scale: 40.0,
            tile_scale: 1,
        }
    }
}

/// Samples the feature stack locally at point locations.
///
/// At a scale coarser than the native grid, a point takes the mean of the
/// valid pixels of the scale-aligned block that contains it; otherwise the
/// pixel under the point. Points outside the image, or with any undefined
/// feature, are dropped.
#[derive(Debug, Clone, Default)]
pub struct GridSampler;

impl GridSampler {
    pub fn new() -> Self {
        Self
    }

    /// Feature vector at `point`, `None` when outside or undefined
    pub fn sample_point(
        &self,
        image: &MultiBandImage,
        point: &LabeledPoint,
        block: usize,
    ) -> Option<Vec<f32>> {
        let (rows, cols) = image.shape();
        let (row_f, col_f) = image.geo_transform().world_to_pixel(&point.location);
        if !(row_f >= 0.0 && col_f >= 0.0 && row_f < rows as f64 && col_f < cols as f64) {
            return None;
        }
        let (row, col) = (row_f.floor() as usize, col_f.floor() as usize);

        let features: Vec<f32> = if block <= 1 {
            image.pixel(row, col)
        } else {
            let r0 = (row / block) * block;
            let c0 = (col / block) * block;
            let r1 = (r0 + block).min(rows);
            let c1 = (c0 + block).min(cols);
            image
                .bands()
                .map(|(_, band)| {
                    let (sum, count) = band
                        .slice(ndarray::s![r0..r1, c0..c1])
                        .iter()
                        .filter(|v| v.is_finite())
                        .fold((0.0f64, 0usize), |(s, n), &v| (s + v as f64, n + 1));
                    if count == 0 {
                        f32::NAN
                    } else {
                        (sum / count as f64) as f32
                    }
                })
                .collect()
        };

        if features.iter().all(|v| v.is_finite()) {
            Some(features)
        } else {
            None
        }
    }
}

impl Sampler for GridSampler {
    fn sample_regions(
        &self,
        image: &MultiBandImage,
        points: &[LabeledPoint],
        params: &SampleRegionsParams,
    ) -> CipResult<SampleTable> {
        if points.is_empty() {
            return Err(CipError::DataAvailability(
                "No points to sample".to_string(),
            ));
        }
        let gt = image.geo_transform();
        if !gt.is_north_up() {
            return Err(CipError::InvalidInput(
                "Sampling requires a north-up grid".to_string(),
            ));
        }
        if params.scale <= 0.0 || params.tile_scale == 0 {
            return Err(CipError::InvalidInput(format!(
                "Invalid sampling parameters: {:?}",
                params
            )));
        }

        let pixel_size = gt.pixel_width.abs();
        let block = if params.scale > pixel_size {
            (params.scale / pixel_size).round().max(1.0) as usize
        } else {
            1
        };
        let tiles = params.tile_scale as usize;
        let batch = (points.len() + tiles - 1) / tiles;
        log::info!(
            "Sampling {} points at scale {} ({}x{} pixel blocks, {} batches)",
            points.len(),
            params.scale,
            block,
            block,
            tiles.min(points.len())
        );

        let sample_batch = |chunk: &[LabeledPoint]| -> Vec<SampleRecord> {
            chunk
                .iter()
                .filter_map(|p| {
                    self.sample_point(image, p, block).map(|features| SampleRecord {
                        point: *p,
                        features,
                    })
                })
                .collect()
        };

        #[cfg(feature = "parallel")]
        let batches: Vec<Vec<SampleRecord>> = points.par_chunks(batch).map(sample_batch).collect();
        #[cfg(not(feature = "parallel"))]
        let batches: Vec<Vec<SampleRecord>> = points.chunks(batch).map(sample_batch).collect();

        let records: Vec<SampleRecord> = batches.into_iter().flatten().collect();
        let dropped = points.len() - records.len();
        if dropped > 0 {
            log::warn!("Dropped {} points outside the image or on masked pixels", dropped);
        }
        if records.is_empty() {
            return Err(CipError::DataAvailability(
                "Every sample point fell on masked or missing pixels".to_string(),
            ));
        }

        Ok(SampleTable {
            feature_names: image.band_names().to_vec(),
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoTransform, Point};
    use ndarray::Array2;

    fn image() -> MultiBandImage {
        // 8x8 grid of 10 m pixels, value = row * 8 + col
        let values = Array2::from_shape_fn((8, 8), |(r, c)| (r * 8 + c) as f32);
        let mut masked = values.clone();
        masked[[7, 7]] = f32::NAN;
        MultiBandImage::from_bands(
            GeoTransform::north_up(0.0, 80.0, 10.0),
            vec![("a", values), ("b", masked)],
        )
        .unwrap()
    }

    fn at(x: f64, y: f64, landcover: u8) -> LabeledPoint {
        LabeledPoint {
            location: Point::new(x, y),
            landcover,
            random: 0.1,
        }
    }

    #[test]
    fn test_native_scale_takes_pixel() {
        let params = SampleRegionsParams { scale: 10.0, tile_scale: 2 };
        let table = GridSampler::new()
            .sample_regions(&image(), &[at(25.0, 75.0, 1), at(5.0, 5.0, 0)], &params)
            .unwrap();
        assert_eq!(table.feature_names, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.records[0].features, vec![2.0, 2.0]);
        assert_eq!(table.records[0].point.landcover, 1);
        assert_eq!(table.records[1].features, vec![56.0, 56.0]);
    }

    #[test]
    fn test_coarse_scale_averages_block() {
        // scale 20 -> 2x2 blocks; point in pixel (0, 1) -> block rows 0..2, cols 0..2
        let params = SampleRegionsParams { scale: 20.0, tile_scale: 1 };
        let table = GridSampler::new()
            .sample_regions(&image(), &[at(15.0, 75.0, 1)], &params)
            .unwrap();
        assert_eq!(table.records[0].features, vec![4.5, 4.5]);
    }

    #[test]
    fn test_masked_and_outside_points_dropped() {
        let params = SampleRegionsParams { scale: 10.0, tile_scale: 3 };
        let points = [at(75.0, 5.0, 1), at(-5.0, 5.0, 1), at(35.0, 45.0, 0)];
        let table = GridSampler::new().sample_regions(&image(), &points, &params).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.records[0].point.landcover, 0);

        let err = GridSampler::new()
            .sample_regions(&image(), &points[..2], &params)
            .unwrap_err();
        assert!(matches!(err, CipError::DataAvailability(_)));
    }

    #[test]
    fn test_batching_preserves_order() {
        let points: Vec<LabeledPoint> = (0..8).map(|c| at(c as f64 * 10.0 + 5.0, 45.0, 1)).collect();
        let single = SampleRegionsParams { scale: 10.0, tile_scale: 1 };
        let many = SampleRegionsParams { scale: 10.0, tile_scale: 5 };
        let sampler = GridSampler::new();
        let a = sampler.sample_regions(&image(), &points, &single).unwrap();
        let b = sampler.sample_regions(&image(), &points, &many).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.records[3].features[0], 27.0);
    }
}
