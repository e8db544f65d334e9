//! cipmap: Sentinel-2 mapping of chemical industrial parks
//!
//! Cloud-masked median composites, spectral indices and GLCM texture form a
//! feature stack; seeded reference points train a random forest on a remote
//! processing service; the class map is cleaned by morphological opening
//! and checked against held-out validation points.

pub mod config;
pub mod core;
pub mod geometry;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use crate::config::PipelineConfig;
pub use crate::core::pipeline::{run_pipeline, PipelineOutput, ReferenceData, Services};
pub use crate::geometry::{Polygon, PolygonCollection};
pub use crate::types::{
    Band, CipError, CipResult, ClassMap, GeoTransform, LabeledPoint, MultiBandImage, Point,
    SampleTable, SceneImage, NO_CLASS,
};

#[cfg(feature = "python")]
mod python {
    use crate::core::accuracy::ErrorMatrix;
    use crate::core::indices::{IndexBands, IndexCalculator, SpectralIndex};
    use crate::core::morphology::{opening, OpeningParams};
    use crate::core::texture::{GlcmParams, GlcmStatistic, GlcmTexture};
    use crate::types::{GeoTransform, MultiBandImage};
    use numpy::{PyReadonlyArray2, ToPyArray};
    use pyo3::exceptions::PyValueError;
    use pyo3::prelude::*;
    use pyo3::types::PyDict;

    fn value_error(e: crate::CipError) -> PyErr {
        PyValueError::new_err(format!("{}", e))
    }

    /// Convert PyReadonlyArray2 to ndarray Array2
    fn numpy_to_array2<T>(arr: PyReadonlyArray2<T>) -> ndarray::Array2<T>
    where
        T: Copy + numpy::Element,
    {
        arr.as_array().to_owned()
    }

    /// One spectral index from reflectance arrays
    #[pyfunction]
    #[pyo3(signature = (index, nir=None, red=None, green=None, swir=None))]
    fn spectral_index(
        py: Python,
        index: &str,
        nir: Option<PyReadonlyArray2<f32>>,
        red: Option<PyReadonlyArray2<f32>>,
        green: Option<PyReadonlyArray2<f32>>,
        swir: Option<PyReadonlyArray2<f32>>,
    ) -> PyResult<PyObject> {
        let index: SpectralIndex = index.parse().map_err(value_error)?;
        let roles = IndexBands::default();
        let bands: Vec<(String, ndarray::Array2<f32>)> = [
            (&roles.nir, nir),
            (&roles.red, red),
            (&roles.green, green),
            (&roles.swir, swir),
        ]
        .into_iter()
        .filter_map(|(name, arr)| arr.map(|a| (name.clone(), numpy_to_array2(a))))
        .collect();

        let image = MultiBandImage::from_bands(GeoTransform::north_up(0.0, 0.0, 1.0), bands)
            .map_err(value_error)?;
        let result = IndexCalculator::new(roles)
            .compute(&image, index)
            .map_err(value_error)?;
        Ok(result.to_pyarray(py).into())
    }

    /// The eight GLCM statistics of one band, keyed by statistic suffix
    #[pyfunction]
    #[pyo3(signature = (band, size=4, gray_level_scale=10000.0))]
    fn glcm_texture(
        py: Python,
        band: PyReadonlyArray2<f32>,
        size: usize,
        gray_level_scale: f32,
    ) -> PyResult<PyObject> {
        let params = GlcmParams {
            band: "band".to_string(),
            size,
            gray_level_scale,
        };
        let image = MultiBandImage::from_bands(
            GeoTransform::north_up(0.0, 0.0, 1.0),
            vec![("band", numpy_to_array2(band))],
        )
        .map_err(value_error)?;
        let texture = GlcmTexture::new(params).compute(&image).map_err(value_error)?;

        let result = PyDict::new(py);
        for statistic in GlcmStatistic::ALL {
            let name = format!("band_{}", statistic.suffix());
            let data = texture.band(&name).map_err(value_error)?;
            result.set_item(statistic.suffix(), data.to_pyarray(py))?;
        }
        Ok(result.into())
    }

    /// Erosion then dilation of a uint8 class map (255 = no class)
    #[pyfunction]
    #[pyo3(signature = (class_map, kernel_radius=1))]
    fn morphological_opening(
        py: Python,
        class_map: PyReadonlyArray2<u8>,
        kernel_radius: usize,
    ) -> PyResult<PyObject> {
        let map = numpy_to_array2(class_map);
        let opened = opening(&map, &OpeningParams { kernel_radius }).map_err(value_error)?;
        Ok(opened.to_pyarray(py).into())
    }

    /// Error matrix and accuracy statistics for paired labels
    #[pyfunction]
    fn error_matrix_metrics(py: Python, actual: Vec<u8>, predicted: Vec<u8>) -> PyResult<PyObject> {
        let matrix = ErrorMatrix::from_pairs(&actual, &predicted).map_err(value_error)?;
        let metrics = matrix.metrics();

        let result = PyDict::new(py);
        result.set_item("matrix", matrix.as_rows().to_vec())?;
        result.set_item("overall_accuracy", metrics.overall_accuracy)?;
        result.set_item("producers_accuracy", metrics.producers_accuracy)?;
        result.set_item("consumers_accuracy", metrics.consumers_accuracy)?;
        result.set_item("kappa", metrics.kappa)?;
        Ok(result.into())
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(spectral_index, m)?)?;
        m.add_function(wrap_pyfunction!(glcm_texture, m)?)?;
        m.add_function(wrap_pyfunction!(morphological_opening, m)?)?;
        m.add_function(wrap_pyfunction!(error_matrix_metrics, m)?)?;
        Ok(())
    }
}
