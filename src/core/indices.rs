//! Spectral indices over the composite bands.
//!
//! Every index is an elementwise operation producing one band. Zero
//! denominators give NaN (never a finite default) and NaN inputs propagate.

use crate::types::{Band, CipError, CipResult, MultiBandImage};
use ndarray::Zip;
use serde::{Deserialize, Serialize};

/// Supported indices, in stacking order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectralIndex {
    /// Normalized Difference Vegetation Index
    Ndvi,
    /// Modified Normalized Difference Water Index
    Mndwi,
    /// Normalized Difference Built-up Index
    Ndbi,
    /// Soil Adjusted Vegetation Index
    Savi,
}

impl SpectralIndex {
    pub const ALL: [SpectralIndex; 4] = [
        SpectralIndex::Ndvi,
        SpectralIndex::Mndwi,
        SpectralIndex::Ndbi,
        SpectralIndex::Savi,
    ];

    /// Band name used when the index is stacked
    pub fn band_name(&self) -> &'static str {
        match self {
            SpectralIndex::Ndvi => "ndvi",
            SpectralIndex::Mndwi => "mndwi",
            SpectralIndex::Ndbi => "ndbi",
            SpectralIndex::Savi => "savi",
        }
    }
}

impl std::fmt::Display for SpectralIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.band_name())
    }
}

impl std::str::FromStr for SpectralIndex {
    type Err = CipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.to_lowercase();
        SpectralIndex::ALL
            .into_iter()
            .find(|index| index.band_name() == name)
            .ok_or_else(|| CipError::InvalidInput(format!("Unknown spectral index: {}", s)))
    }
}

/// Which composite bands play which spectral role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexBands {
    pub nir: String,
    pub red: String,
    pub green: String,
    pub swir: String,
}

impl Default for IndexBands {
    fn default() -> Self {
        Self {
            nir: "B8".to_string(),
            red: "B4".to_string(),
            green: "B3".to_string(),
            swir: "B11".to_string(),
        }
    }
}

/// `(a - b) / (a + b)`, NaN when `a + b == 0`
pub fn normalized_difference(a: f32, b: f32) -> f32 {
    let sum = a + b;
    if sum == 0.0 {
        return f32::NAN;
    }
    (a - b) / sum
}

pub fn ndvi(nir: f32, red: f32) -> f32 {
    normalized_difference(nir, red)
}

pub fn mndwi(green: f32, swir: f32) -> f32 {
    normalized_difference(green, swir)
}

pub fn ndbi(swir: f32, nir: f32) -> f32 {
    normalized_difference(swir, nir)
}

/// `1.5 (NIR - RED) / (NIR + RED + 0.5)`.
///
/// Undefined where `NIR + RED == 0`, same as NDVI, and where the
/// soil-adjusted denominator itself is zero.
pub fn savi(nir: f32, red: f32) -> f32 {
    let sum = nir + red;
    let denominator = sum + 0.5;
    if sum == 0.0 || denominator == 0.0 {
        return f32::NAN;
    }
    1.5 * (nir - red) / denominator
}

/// Spectral index calculator bound to a band-role mapping
pub struct IndexCalculator {
    bands: IndexBands,
}

impl IndexCalculator {
    pub fn new(bands: IndexBands) -> Self {
        Self { bands }
    }

    pub fn standard() -> Self {
        Self::new(IndexBands::default())
    }

    /// Compute one index as a single band
    pub fn compute(&self, image: &MultiBandImage, index: SpectralIndex) -> CipResult<Band> {
        log::debug!("Computing {} from {:?}", index, self.bands);
        let b = &self.bands;
        let out = match index {
            SpectralIndex::Ndvi => binary(image.band(&b.nir)?, image.band(&b.red)?, ndvi),
            SpectralIndex::Mndwi => binary(image.band(&b.green)?, image.band(&b.swir)?, mndwi),
            SpectralIndex::Ndbi => binary(image.band(&b.swir)?, image.band(&b.nir)?, ndbi),
            SpectralIndex::Savi => binary(image.band(&b.nir)?, image.band(&b.red)?, savi),
        };
        Ok(out)
    }

    /// Compute `indices` and return them as a new image, named for stacking
    pub fn compute_all(
        &self,
        image: &MultiBandImage,
        indices: &[SpectralIndex],
    ) -> CipResult<MultiBandImage> {
        log::info!("Computing {} spectral indices", indices.len());
        let mut out = MultiBandImage::new(image.shape(), *image.geo_transform());
        for &index in indices {
            let band = self.compute(image, index)?;
            let undefined = band.iter().filter(|v| v.is_nan()).count();
            if undefined > 0 {
                log::debug!("{}: {} undefined pixels", index, undefined);
            }
            out.add_band(index.band_name(), band)?;
        }
        Ok(out)
    }
}

fn binary(a: &Band, b: &Band, op: fn(f32, f32) -> f32) -> Band {
    #[cfg(feature = "parallel")]
    {
        Zip::from(a).and(b).par_map_collect(|&x, &y| op(x, y))
    }
    #[cfg(not(feature = "parallel"))]
    {
        Zip::from(a).and(b).map_collect(|&x, &y| op(x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn image() -> MultiBandImage {
        MultiBandImage::from_bands(
            GeoTransform::north_up(0.0, 20.0, 10.0),
            vec![
                ("B8", array![[0.4, 0.0], [0.3, f32::NAN]]),
                ("B4", array![[0.1, 0.0], [0.3, 0.1]]),
                ("B3", array![[0.1, 0.2], [0.0, 0.1]]),
                ("B11", array![[0.3, 0.2], [0.0, 0.1]]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_pixel_formulas() {
        assert_relative_eq!(ndvi(0.4, 0.1), 0.6, epsilon = 1e-6);
        assert_relative_eq!(mndwi(0.1, 0.3), -0.5, epsilon = 1e-6);
        assert_relative_eq!(ndbi(0.3, 0.4), -1.0 / 7.0, epsilon = 1e-6);
        assert_relative_eq!(savi(0.4, 0.1), 1.5 * 0.3 / 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_denominator_is_nan() {
        assert!(ndvi(0.0, 0.0).is_nan());
        assert!(savi(0.0, 0.0).is_nan());
        assert!(mndwi(0.0, 0.0).is_nan());
        assert!(ndbi(0.0, 0.0).is_nan());
        assert!(savi(-0.25, -0.25).is_nan());
        // Not clamped
        assert_relative_eq!(ndvi(0.3, -0.1), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_compute_all_appends_named_bands() {
        let calc = IndexCalculator::standard();
        let indices = calc.compute_all(&image(), &SpectralIndex::ALL).unwrap();
        assert_eq!(indices.band_names(), &["ndvi", "mndwi", "ndbi", "savi"]);

        let ndvi_band = indices.band("ndvi").unwrap();
        assert_relative_eq!(ndvi_band[[0, 0]], 0.6, epsilon = 1e-6);
        assert!(ndvi_band[[0, 1]].is_nan());
        assert_relative_eq!(ndvi_band[[1, 0]], 0.0, epsilon = 1e-6);
        assert!(ndvi_band[[1, 1]].is_nan());

        let savi_band = indices.band("savi").unwrap();
        assert!(savi_band[[0, 1]].is_nan());

        let mndwi_band = indices.band("mndwi").unwrap();
        assert!(mndwi_band[[1, 0]].is_nan());
    }

    #[test]
    fn test_missing_band_is_error() {
        let calc = IndexCalculator::new(IndexBands {
            swir: "B12x".to_string(),
            ..IndexBands::default()
        });
        assert!(calc.compute(&image(), SpectralIndex::Ndbi).is_err());
        assert!(calc.compute(&image(), SpectralIndex::Ndvi).is_ok());
    }

    #[test]
    fn test_parse_index_name() {
        assert_eq!("NDBI".parse::<SpectralIndex>().unwrap(), SpectralIndex::Ndbi);
        assert_eq!("savi".parse::<SpectralIndex>().unwrap(), SpectralIndex::Savi);
        assert!("evi".parse::<SpectralIndex>().is_err());
    }
}
