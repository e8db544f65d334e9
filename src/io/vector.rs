//! GeoJSON polygon input.
//!
//! Accepts a FeatureCollection, a single Feature or a bare geometry.
//! Polygon and MultiPolygon geometries are kept; other geometry types are
//! skipped with a warning. Coordinates must already be in the CRS of the
//! image grid.

use crate::geometry::{Polygon, PolygonCollection};
use crate::types::{CipError, CipResult};
use geojson::{GeoJson, Value};
use std::path::Path;

fn geojson_error(e: geojson::Error) -> CipError {
    CipError::InvalidInput(format!("GeoJSON: {}", e))
}

/// Every ring needs an exterior and every position at least x and y
fn check_rings(rings: &[Vec<Vec<f64>>]) -> CipResult<()> {
    if rings.first().map_or(true, |exterior| exterior.is_empty()) {
        return Err(CipError::InvalidInput(
            "Polygon without an exterior ring".to_string(),
        ));
    }
    if let Some(position) = rings.iter().flatten().find(|p| p.len() < 2) {
        return Err(CipError::InvalidInput(format!(
            "Coordinate {:?} has fewer than two values",
            position
        )));
    }
    Ok(())
}

fn collect(geometry: geojson::Geometry, out: &mut Vec<Polygon<f64>>) -> CipResult<()> {
    match &geometry.value {
        Value::Polygon(rings) => check_rings(rings)?,
        Value::MultiPolygon(polygons) => {
            for rings in polygons {
                check_rings(rings)?;
            }
        }
        _ => {
            log::warn!("Skipping non-polygon geometry");
            return Ok(());
        }
    }
    match geo::Geometry::<f64>::try_from(geometry).map_err(geojson_error)? {
        geo::Geometry::Polygon(polygon) => out.push(polygon),
        geo::Geometry::MultiPolygon(multi) => out.extend(multi.0),
        _ => {}
    }
    Ok(())
}

/// Parse polygons from GeoJSON text
pub fn parse_polygons(text: &str) -> CipResult<PolygonCollection> {
    let document: GeoJson = text.parse().map_err(geojson_error)?;
    let mut polygons = Vec::new();
    match document {
        GeoJson::FeatureCollection(collection) => {
            for feature in collection.features {
                if let Some(geometry) = feature.geometry {
                    collect(geometry, &mut polygons)?;
                }
            }
        }
        GeoJson::Feature(feature) => {
            if let Some(geometry) = feature.geometry {
                collect(geometry, &mut polygons)?;
            }
        }
        GeoJson::Geometry(geometry) => collect(geometry, &mut polygons)?,
    }
    Ok(PolygonCollection::new(polygons))
}

/// Read polygons from a GeoJSON file; an empty result is an error
pub fn read_polygons<P: AsRef<Path>>(path: P) -> CipResult<PolygonCollection> {
    let path = path.as_ref();
    let collection = parse_polygons(&std::fs::read_to_string(path)?)?;
    if collection.is_empty() {
        return Err(CipError::DataAvailability(format!(
            "{} contains no polygons",
            path.display()
        )));
    }
    log::info!(
        "Read {} polygons from {} (area {:.1})",
        collection.len(),
        path.display(),
        collection.area()
    );
    Ok(collection)
}
