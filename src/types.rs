use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Single-band raster (row x column), masked pixels are NaN
pub type Band = Array2<f32>;

/// Classified raster holding one class label per pixel
pub type ClassMap = Array2<u8>;

/// Class map value for pixels that are masked or outside the region of interest
pub const NO_CLASS: u8 = 255;

/// Label of the chemical industrial park class
pub const POSITIVE_CLASS: u8 = 1;

/// Label of the "other land" class
pub const NEGATIVE_CLASS: u8 = 0;

/// Position in the CRS of the image grid (linear units, e.g. UTM metres)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.min_x && point.x <= self.max_x && point.y >= self.min_y && point.y <= self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up grid with square pixels of `pixel_size` CRS units
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    pub fn is_north_up(&self) -> bool {
        self.rotation_x == 0.0 && self.rotation_y == 0.0
    }

    /// Centre of pixel (row, col) in world coordinates
    pub fn pixel_center(&self, row: usize, col: usize) -> Point {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        Point {
            x: self.top_left_x + c * self.pixel_width + r * self.rotation_x,
            y: self.top_left_y + c * self.rotation_y + r * self.pixel_height,
        }
    }

    /// Fractional (row, col) of a world coordinate; north-up grids only
    pub fn world_to_pixel(&self, point: &Point) -> (f64, f64) {
        let col = (point.x - self.top_left_x) / self.pixel_width;
        let row = (point.y - self.top_left_y) / self.pixel_height;
        (row, col)
    }

    /// World extent of a `rows` x `cols` grid
    pub fn bounds(&self, rows: usize, cols: usize) -> BoundingBox {
        let x0 = self.top_left_x;
        let x1 = self.top_left_x + cols as f64 * self.pixel_width;
        let y0 = self.top_left_y;
        let y1 = self.top_left_y + rows as f64 * self.pixel_height;
        BoundingBox {
            min_x: x0.min(x1),
            max_x: x0.max(x1),
            min_y: y0.min(y1),
            max_y: y0.max(y1),
        }
    }
}

/// Inclusive start, exclusive end, matching collection date filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }
}

/// Multi-band raster sharing one grid; bands keep insertion order
#[derive(Debug, Clone)]
pub struct MultiBandImage {
    shape: (usize, usize),
    geo_transform: GeoTransform,
    names: Vec<String>,
    bands: Vec<Band>,
}

impl MultiBandImage {
    /// Empty image on a `(rows, cols)` grid
    pub fn new(shape: (usize, usize), geo_transform: GeoTransform) -> Self {
        Self {
            shape,
            geo_transform,
            names: Vec::new(),
            bands: Vec::new(),
        }
    }

    /// Build an image from named bands, all of the same shape
    pub fn from_bands<S: Into<String>>(
        geo_transform: GeoTransform,
        bands: Vec<(S, Band)>,
    ) -> CipResult<Self> {
        let shape = match bands.first() {
            Some((_, data)) => data.dim(),
            None => {
                return Err(CipError::InvalidInput(
                    "Cannot build an image without bands".to_string(),
                ))
            }
        };
        let mut image = Self::new(shape, geo_transform);
        for (name, data) in bands {
            image.add_band(name, data)?;
        }
        Ok(image)
    }

    /// Append a band. Existing bands are never replaced.
    pub fn add_band(&mut self, name: impl Into<String>, data: Band) -> CipResult<()> {
        let name = name.into();
        if self.has_band(&name) {
            return Err(CipError::InvalidInput(format!(
                "Band '{}' already exists",
                name
            )));
        }
        if data.dim() != self.shape {
            return Err(CipError::InvalidInput(format!(
                "Band '{}' has shape {:?}, image grid is {:?}",
                name,
                data.dim(),
                self.shape
            )));
        }
        self.names.push(name);
        self.bands.push(data);
        Ok(())
    }

    /// Append every band of `other` (same grid required)
    pub fn add_bands(&mut self, other: MultiBandImage) -> CipResult<()> {
        for (name, data) in other.names.into_iter().zip(other.bands) {
            self.add_band(name, data)?;
        }
        Ok(())
    }

    pub fn has_band(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn band(&self, name: &str) -> CipResult<&Band> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.bands[i])
            .ok_or_else(|| CipError::InvalidInput(format!("Band '{}' not found", name)))
    }

    /// New image holding only `names`, in the requested order
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> CipResult<Self> {
        let mut selected = Self::new(self.shape, self.geo_transform);
        for name in names {
            let name = name.as_ref();
            selected.add_band(name, self.band(name)?.clone())?;
        }
        Ok(selected)
    }

    pub fn band_names(&self) -> &[String] {
        &self.names
    }

    pub fn bands(&self) -> impl Iterator<Item = (&str, &Band)> {
        self.names.iter().map(String::as_str).zip(self.bands.iter())
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn geo_transform(&self) -> &GeoTransform {
        &self.geo_transform
    }

    pub fn bounds(&self) -> BoundingBox {
        self.geo_transform.bounds(self.shape.0, self.shape.1)
    }

    /// Feature vector of one pixel, in band order
    pub fn pixel(&self, row: usize, col: usize) -> Vec<f32> {
        self.bands.iter().map(|b| b[[row, col]]).collect()
    }
}

/// One acquisition of the scene collection, QA band still attached
#[derive(Debug, Clone)]
pub struct SceneImage {
    pub id: String,
    pub acquired: NaiveDate,
    pub cloudy_pixel_percentage: f32,
    pub image: MultiBandImage,
}

/// Sample location with its class label and split value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledPoint {
    pub location: Point,
    pub landcover: u8,
    /// Uniform in [0, 1), decides training/validation membership
    pub random: f64,
}

/// Labeled point joined with the stack values sampled at its location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub point: LabeledPoint,
    pub features: Vec<f32>,
}

/// Sampled feature table; `feature_names[i]` names column `i` of every record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleTable {
    pub feature_names: Vec<String>,
    pub records: Vec<SampleRecord>,
}

impl SampleTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn labels(&self) -> Vec<u8> {
        self.records.iter().map(|r| r.point.landcover).collect()
    }

    pub fn feature_rows(&self) -> Vec<Vec<f32>> {
        self.records.iter().map(|r| r.features.clone()).collect()
    }

    /// Number of records per label, indexed by label
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = Vec::new();
        for record in &self.records {
            let label = record.point.landcover as usize;
            if counts.len() <= label {
                counts.resize(label + 1, 0);
            }
            counts[label] += 1;
        }
        counts
    }
}

/// Error types for the classification pipeline
#[derive(Debug, thiserror::Error)]
pub enum CipError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No data available: {0}")]
    DataAvailability(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Service error: {message}")]
    Service { message: String, retryable: bool },

    #[cfg(feature = "geotiff")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

impl CipError {
    /// Whether repeating the failed remote call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, CipError::Service { retryable: true, .. })
    }
}

/// Result type for pipeline operations
pub type CipResult<T> = Result<T, CipError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_add_band_never_replaces() {
        let gt = GeoTransform::north_up(0.0, 30.0, 10.0);
        let mut image = MultiBandImage::new((3, 3), gt);
        image.add_band("B8", Array2::from_elem((3, 3), 0.2)).unwrap();

        let err = image.add_band("B8", Array2::zeros((3, 3))).unwrap_err();
        assert!(matches!(err, CipError::InvalidInput(_)));
        assert_eq!(image.band("B8").unwrap()[[0, 0]], 0.2);

        let err = image.add_band("B4", Array2::zeros((2, 3))).unwrap_err();
        assert!(matches!(err, CipError::InvalidInput(_)));
    }

    #[test]
    fn test_select_keeps_requested_order() {
        let gt = GeoTransform::north_up(0.0, 20.0, 10.0);
        let image = MultiBandImage::from_bands(
            gt,
            vec![
                ("B2", Array2::from_elem((2, 2), 2.0)),
                ("B3", Array2::from_elem((2, 2), 3.0)),
                ("B4", Array2::from_elem((2, 2), 4.0)),
            ],
        )
        .unwrap();

        let selected = image.select(&["B4", "B2"]).unwrap();
        assert_eq!(selected.band_names(), &["B4".to_string(), "B2".to_string()]);
        assert_eq!(selected.pixel(1, 1), vec![4.0, 2.0]);
        assert!(image.select(&["B12"]).is_err());
    }

    #[test]
    fn test_geo_transform_round_trip_pixel_center() {
        let gt = GeoTransform::north_up(500_000.0, 3_500_000.0, 10.0);
        let center = gt.pixel_center(2, 3);
        assert_eq!(center, Point::new(500_035.0, 3_499_975.0));

        let (row, col) = gt.world_to_pixel(&center);
        assert_eq!((row.floor() as usize, col.floor() as usize), (2, 3));

        let bounds = gt.bounds(10, 20);
        assert_eq!(bounds.min_x, 500_000.0);
        assert_eq!(bounds.max_x, 500_200.0);
        assert_eq!(bounds.min_y, 3_499_900.0);
        assert_eq!(bounds.max_y, 3_500_000.0);
    }

    #[test]
    fn test_date_range_end_is_exclusive() {
        let range = DateRange {
            start: NaiveDate::from_ymd_opt(2021, 10, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2021, 12, 31).unwrap(),
        };
        assert!(range.contains(NaiveDate::from_ymd_opt(2021, 10, 1).unwrap()));
        assert!(range.contains(NaiveDate::from_ymd_opt(2021, 12, 30).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2021, 12, 31).unwrap()));
    }

    #[test]
    fn test_sample_table_class_counts() {
        let record = |landcover| SampleRecord {
            point: LabeledPoint {
                location: Point::new(0.0, 0.0),
                landcover,
                random: 0.5,
            },
            features: vec![1.0],
        };
        let table = SampleTable {
            feature_names: vec!["B8".to_string()],
            records: vec![record(1), record(0), record(1)],
        };
        assert_eq!(table.class_counts(), vec![1, 2]);
        assert_eq!(table.labels(), vec![1, 0, 1]);
    }
}
