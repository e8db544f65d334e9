//! Planar polygon geometry for regions of interest and reference classes

use crate::types::{BoundingBox, Point};
use geo::{coord, Area, BoundingRect, Contains, MultiPolygon, Rect};

pub use geo::Polygon;

/// Axis-aligned rectangle, handy for tests and synthetic regions
pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Polygon<f64> {
    Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y }).to_polygon()
}

/// Set of polygons treated as one region (their union)
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonCollection {
    polygons: MultiPolygon<f64>,
}

impl Default for PolygonCollection {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl PolygonCollection {
    pub fn new(polygons: Vec<Polygon<f64>>) -> Self {
        Self {
            polygons: MultiPolygon::new(polygons),
        }
    }

    pub fn polygons(&self) -> &[Polygon<f64>] {
        &self.polygons.0
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.polygons.0.len()
    }

    /// Strict interior test; points inside a hole or on a boundary are outside
    pub fn contains(&self, point: &Point) -> bool {
        self.polygons.contains(&geo::Point::new(point.x, point.y))
    }

    pub fn bounds(&self) -> Option<BoundingBox> {
        self.polygons.bounding_rect().map(|rect| BoundingBox {
            min_x: rect.min().x,
            max_x: rect.max().x,
            min_y: rect.min().y,
            max_y: rect.max().y,
        })
    }

    /// Sum of member areas (overlaps counted twice)
    pub fn area(&self) -> f64 {
        self.polygons.unsigned_area()
    }
}

impl From<Vec<Polygon<f64>>> for PolygonCollection {
    fn from(polygons: Vec<Polygon<f64>>) -> Self {
        Self::new(polygons)
    }
}
