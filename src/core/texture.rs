//! Gray-level co-occurrence (GLCM) texture statistics.
//!
//! The input band is quantized to integers first. For each pixel a GLCM is
//! built from the square window of radius `size`, pooling the offsets
//! (0,1), (1,0), (1,1) and (1,-1). Pairs are counted symmetrically and
//! both members must lie inside the window and be valid. Gray levels are
//! kept sparse, so the quantized range does not bound memory.

use crate::types::{Band, CipError, CipResult, MultiBandImage};
use ndarray::Array2;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const OFFSETS: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

/// GLCM texture parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlcmParams {
    /// Band the texture is computed from
    pub band: String,
    /// Neighbourhood radius; the window is `(2 * size + 1)` pixels wide
    pub size: usize,
    /// Multiplier applied before truncating to integer gray levels
    pub gray_level_scale: f32,
}

impl Default for GlcmParams {
    fn default() -> Self {
        Self {
            band: "B8".to_string(),
            size: 4,
            gray_level_scale: 10000.0,
        }
    }
}

/// Texture statistics, in stacking order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlcmStatistic {
    /// Angular second moment
    Asm,
    Contrast,
    Correlation,
    Variance,
    /// Inverse difference moment
    Idm,
    SumAverage,
    Entropy,
    Dissimilarity,
}

impl GlcmStatistic {
    pub const ALL: [GlcmStatistic; 8] = [
        GlcmStatistic::Asm,
        GlcmStatistic::Contrast,
        GlcmStatistic::Correlation,
        GlcmStatistic::Variance,
        GlcmStatistic::Idm,
        GlcmStatistic::SumAverage,
        GlcmStatistic::Entropy,
        GlcmStatistic::Dissimilarity,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            GlcmStatistic::Asm => "asm",
            GlcmStatistic::Contrast => "contrast",
            GlcmStatistic::Correlation => "corr",
            GlcmStatistic::Variance => "var",
            GlcmStatistic::Idm => "idm",
            GlcmStatistic::SumAverage => "savg",
            GlcmStatistic::Entropy => "ent",
            GlcmStatistic::Dissimilarity => "diss",
        }
    }
}

/// All eight statistics of one normalized GLCM
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlcmStats {
    pub asm: f64,
    pub contrast: f64,
    pub correlation: f64,
    pub variance: f64,
    pub idm: f64,
    pub sum_average: f64,
    pub entropy: f64,
    pub dissimilarity: f64,
}

impl GlcmStats {
    fn undefined() -> Self {
        Self {
            asm: f64::NAN,
            contrast: f64::NAN,
            correlation: f64::NAN,
            variance: f64::NAN,
            idm: f64::NAN,
            sum_average: f64::NAN,
            entropy: f64::NAN,
            dissimilarity: f64::NAN,
        }
    }

    pub fn get(&self, statistic: GlcmStatistic) -> f64 {
        match statistic {
            GlcmStatistic::Asm => self.asm,
            GlcmStatistic::Contrast => self.contrast,
            GlcmStatistic::Correlation => self.correlation,
            GlcmStatistic::Variance => self.variance,
            GlcmStatistic::Idm => self.idm,
            GlcmStatistic::SumAverage => self.sum_average,
            GlcmStatistic::Entropy => self.entropy,
            GlcmStatistic::Dissimilarity => self.dissimilarity,
        }
    }

    /// Statistics of a symmetric pair list; sorts `pairs` in place
    pub fn from_pairs(pairs: &mut [(i32, i32)]) -> Self {
        if pairs.is_empty() {
            return Self::undefined();
        }
        pairs.sort_unstable();
        let total = pairs.len() as f64;

        // Run-length the sorted pairs into (i, j, p) cells
        let mut cells: Vec<(f64, f64, f64)> = Vec::new();
        let mut start = 0;
        for k in 1..=pairs.len() {
            if k == pairs.len() || pairs[k] != pairs[start] {
                let (i, j) = pairs[start];
                cells.push((i as f64, j as f64, (k - start) as f64 / total));
                start = k;
            }
        }

        let mean: f64 = cells.iter().map(|&(i, _, p)| i * p).sum();
        let variance: f64 = cells.iter().map(|&(i, _, p)| (i - mean).powi(2) * p).sum();

        let mut stats = GlcmStats {
            asm: 0.0,
            contrast: 0.0,
            correlation: 0.0,
            variance,
            idm: 0.0,
            sum_average: 0.0,
            entropy: 0.0,
            dissimilarity: 0.0,
        };
        let mut covariance = 0.0;
        for &(i, j, p) in &cells {
            let d = i - j;
            stats.asm += p * p;
            stats.contrast += d * d * p;
            stats.idm += p / (1.0 + d * d);
            stats.sum_average += (i + j) * p;
            stats.entropy -= p * p.ln();
            stats.dissimilarity += d.abs() * p;
            covariance += (i - mean) * (j - mean) * p;
        }
        // Symmetric GLCM: both marginals share mean and variance
        stats.correlation = if variance < 1e-12 { 0.0 } else { covariance / variance };
        stats
    }
}

/// GLCM texture extractor
pub struct GlcmTexture {
    params: GlcmParams,
}

impl GlcmTexture {
    pub fn new(params: GlcmParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(GlcmParams::default())
    }

    /// Integer gray levels; NaN pixels stay unset
    pub fn quantize(&self, band: &Band) -> Array2<Option<i32>> {
        let scale = self.params.gray_level_scale;
        band.mapv(|v| {
            let scaled = v * scale;
            if scaled.is_finite() {
                Some(scaled.trunc() as i32)
            } else {
                None
            }
        })
    }

    /// Statistics of the window centred on (row, col)
    pub fn window_stats(&self, levels: &Array2<Option<i32>>, row: usize, col: usize) -> GlcmStats {
        if levels[[row, col]].is_none() {
            return GlcmStats::undefined();
        }
        let (rows, cols) = levels.dim();
        let size = self.params.size as isize;
        let (r0, c0) = (row as isize, col as isize);
        let inside = |r: isize, c: isize| {
            r >= 0
                && c >= 0
                && (r as usize) < rows
                && (c as usize) < cols
                && (r - r0).abs() <= size
                && (c - c0).abs() <= size
        };

        let mut pairs = Vec::with_capacity(OFFSETS.len() * 2 * (2 * self.params.size + 1).pow(2));
        for r in (r0 - size)..=(r0 + size) {
            for c in (c0 - size)..=(c0 + size) {
                if !inside(r, c) {
                    continue;
                }
                let a = match levels[[r as usize, c as usize]] {
                    Some(a) => a,
                    None => continue,
                };
                for &(dr, dc) in &OFFSETS {
                    let (nr, nc) = (r + dr, c + dc);
                    if !inside(nr, nc) {
                        continue;
                    }
                    if let Some(b) = levels[[nr as usize, nc as usize]] {
                        pairs.push((a, b));
                        pairs.push((b, a));
                    }
                }
            }
        }
        GlcmStats::from_pairs(&mut pairs)
    }

    /// Compute the eight texture bands, named `<band>_<statistic>`
    pub fn compute(&self, image: &MultiBandImage) -> CipResult<MultiBandImage> {
        if self.params.size == 0 {
            return Err(CipError::InvalidInput("GLCM size must be > 0".to_string()));
        }
        let band = image.band(&self.params.band)?;
        let (rows, cols) = band.dim();
        log::info!(
            "Computing GLCM texture on {} ({}x{}, size {})",
            self.params.band,
            rows,
            cols,
            self.params.size
        );

        let levels = self.quantize(band);
        let row_stats = |r: usize| -> Vec<GlcmStats> {
            (0..cols).map(|c| self.window_stats(&levels, r, c)).collect()
        };

        #[cfg(feature = "parallel")]
        let stats: Vec<Vec<GlcmStats>> = (0..rows).into_par_iter().map(row_stats).collect();
        #[cfg(not(feature = "parallel"))]
        let stats: Vec<Vec<GlcmStats>> = (0..rows).map(row_stats).collect();

        let mut out = MultiBandImage::new((rows, cols), *image.geo_transform());
        for statistic in GlcmStatistic::ALL {
            let data = Array2::from_shape_fn((rows, cols), |(r, c)| stats[r][c].get(statistic) as f32);
            out.add_band(format!("{}_{}", self.params.band, statistic.suffix()), data)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_two_level_pairs() {
        // Symmetric pairs: (0,0) x2, (0,1) x1, (1,0) x1 -> p = 0.5, 0.25, 0.25
        let mut pairs = vec![(0, 0), (0, 0), (0, 1), (1, 0)];
        let s = GlcmStats::from_pairs(&mut pairs);
        assert_relative_eq!(s.asm, 0.25 + 0.0625 + 0.0625, epsilon = 1e-12);
        assert_relative_eq!(s.contrast, 0.5, epsilon = 1e-12);
        assert_relative_eq!(s.dissimilarity, 0.5, epsilon = 1e-12);
        assert_relative_eq!(s.idm, 0.5 + 0.25, epsilon = 1e-12);
        assert_relative_eq!(s.sum_average, 0.5, epsilon = 1e-12);
        // mean = 0.25, variance = 0.1875
        assert_relative_eq!(s.variance, 0.1875, epsilon = 1e-12);
        // covariance = 0.5*0.0625 + 2*0.25*(-0.25*0.75) = -0.0625
        assert_relative_eq!(s.correlation, -0.0625 / 0.1875, epsilon = 1e-12);
        let ent = -(0.5f64 * 0.5f64.ln() + 2.0 * 0.25 * 0.25f64.ln());
        assert_relative_eq!(s.entropy, ent, epsilon = 1e-12);
    }

    #[test]
    fn test_uniform_window() {
        let texture = GlcmTexture::new(GlcmParams {
            size: 1,
            gray_level_scale: 1.0,
            ..GlcmParams::default()
        });
        let levels = texture.quantize(&Array2::from_elem((5, 5), 7.0));
        let s = texture.window_stats(&levels, 2, 2);
        assert_relative_eq!(s.asm, 1.0);
        assert_relative_eq!(s.contrast, 0.0);
        assert_relative_eq!(s.correlation, 0.0);
        assert_relative_eq!(s.entropy, 0.0);
        assert_relative_eq!(s.sum_average, 14.0);
    }

    #[test]
    fn test_quantize_truncates_and_keeps_mask() {
        let texture = GlcmTexture::standard();
        let levels = texture.quantize(&array![[0.12345, f32::NAN], [0.99999, -0.00005]]);
        assert_eq!(levels[[0, 0]], Some(1234));
        assert_eq!(levels[[0, 1]], None);
        assert_eq!(levels[[1, 0]], Some(9999));
        assert_eq!(levels[[1, 1]], Some(0));
    }

    #[test]
    fn test_compute_band_names_and_masked_center() {
        let b8 = array![
            [0.1, 0.2, 0.1, 0.2],
            [0.2, 0.1, f32::NAN, 0.1],
            [0.1, 0.2, 0.1, 0.2],
        ];
        let image = MultiBandImage::from_bands(GeoTransform::north_up(0.0, 30.0, 10.0), vec![("B8", b8)])
            .unwrap();
        let texture = GlcmTexture::new(GlcmParams {
            size: 1,
            ..GlcmParams::default()
        });
        let out = texture.compute(&image).unwrap();
        assert_eq!(
            out.band_names(),
            &["B8_asm", "B8_contrast", "B8_corr", "B8_var", "B8_idm", "B8_savg", "B8_ent", "B8_diss"]
        );
        for (_, band) in out.bands() {
            assert!(band[[1, 2]].is_nan());
        }
        // Checkerboard neighbourhood has contrast
        assert!(out.band("B8_contrast").unwrap()[[1, 1]] > 0.0);
    }

    #[test]
    fn test_zero_size_rejected() {
        let image = MultiBandImage::from_bands(
            GeoTransform::north_up(0.0, 10.0, 10.0),
            vec![("B8", Array2::zeros((1, 1)))],
        )
        .unwrap();
        let texture = GlcmTexture::new(GlcmParams { size: 0, ..GlcmParams::default() });
        assert!(texture.compute(&image).is_err());
    }
}
