//! GeoTIFF scene input and class map output through GDAL.

use crate::io::service::{ImageSource, SceneQuery};
use crate::types::{CipError, CipResult, ClassMap, GeoTransform, MultiBandImage, SceneImage, NO_CLASS};
use chrono::NaiveDate;
use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One scene entry of a local manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneEntry {
    pub id: String,
    pub acquired: NaiveDate,
    pub cloudy_pixel_percentage: f32,
    /// Multi-band GeoTIFF, relative paths resolve against the manifest
    pub path: PathBuf,
    /// Band names in file order, QA band included
    pub bands: Vec<String>,
}

/// Local scene collection: a JSON manifest listing one GeoTIFF per scene
pub struct GeoTiffSceneSource {
    entries: Vec<SceneEntry>,
}

impl GeoTiffSceneSource {
    pub fn new(entries: Vec<SceneEntry>) -> Self {
        Self { entries }
    }

    pub fn from_manifest<P: AsRef<Path>>(manifest: P) -> CipResult<Self> {
        let manifest = manifest.as_ref();
        let mut entries: Vec<SceneEntry> =
            serde_json::from_str(&std::fs::read_to_string(manifest)?)?;
        if let Some(base) = manifest.parent() {
            for entry in &mut entries {
                if entry.path.is_relative() {
                    entry.path = base.join(&entry.path);
                }
            }
        }
        log::info!("Scene manifest {} lists {} scenes", manifest.display(), entries.len());
        Ok(Self { entries })
    }

    pub fn read_scene(entry: &SceneEntry) -> CipResult<SceneImage> {
        log::debug!("Reading scene {} from {}", entry.id, entry.path.display());
        let dataset = Dataset::open(&entry.path)?;
        let geo_transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let (width, height) = dataset.raster_size();
        let count = dataset.raster_count() as usize;
        if count != entry.bands.len() {
            return Err(CipError::InvalidInput(format!(
                "{} has {} bands, manifest names {}",
                entry.path.display(),
                count,
                entry.bands.len()
            )));
        }

        let mut image = MultiBandImage::new((height, width), geo_transform);
        for (index, name) in entry.bands.iter().enumerate() {
            let band = dataset.rasterband(index as isize + 1)?;
            let nodata = band.no_data_value();
            let buffer = band.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
            let mut data = Array2::from_shape_vec((height, width), buffer.data)
                .map_err(|e| CipError::Processing(format!("Failed to reshape band {}: {}", name, e)))?;
            if let Some(nodata) = nodata {
                let nodata = nodata as f32;
                data.mapv_inplace(|v| if v == nodata { f32::NAN } else { v });
            }
            image.add_band(name.clone(), data)?;
        }

        Ok(SceneImage {
            id: entry.id.clone(),
            acquired: entry.acquired,
            cloudy_pixel_percentage: entry.cloudy_pixel_percentage,
            image,
        })
    }
}

impl ImageSource for GeoTiffSceneSource {
    fn fetch_scenes(&self, query: &SceneQuery) -> CipResult<Vec<SceneImage>> {
        // Metadata filters run before any pixel is read
        self.entries
            .iter()
            .filter(|e| {
                query.date_range.contains(e.acquired)
                    && e.cloudy_pixel_percentage < query.max_cloud_percentage
            })
            .map(Self::read_scene)
            .collect()
    }
}

/// Write a class map as a single-band Byte GeoTIFF with `NO_CLASS` as nodata
pub fn write_class_map<P: AsRef<Path>>(
    path: P,
    map: &ClassMap,
    geo_transform: &GeoTransform,
    projection: Option<&str>,
) -> CipResult<()> {
    let path = path.as_ref();
    let (rows, cols) = map.dim();
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset =
        driver.create_with_band_type::<u8, _>(path, cols as isize, rows as isize, 1)?;
    dataset.set_geo_transform(&geo_transform.to_gdal())?;
    if let Some(wkt) = projection {
        dataset.set_projection(wkt)?;
    }

    let mut band = dataset.rasterband(1)?;
    band.set_no_data_value(Some(NO_CLASS as f64))?;
    let buffer = Buffer::new((cols, rows), map.iter().copied().collect());
    band.write((0, 0), (cols, rows), &buffer)?;
    log::info!("Class map written to {} ({}x{})", path.display(), cols, rows);
    Ok(())
}
