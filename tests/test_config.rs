//! Configuration files and GeoJSON inputs on disk.

use cipmap::io::vector::read_polygons;
use cipmap::{CipError, PipelineConfig, Point};
use std::fs;

const SQUARE: &str = r#"{
    "type": "FeatureCollection",
    "features": [{
        "type": "Feature",
        "properties": {},
        "geometry": { "type": "Polygon", "coordinates": [[[0, 0], [100, 0], [100, 100], [0, 100], [0, 0]]] }
    }]
}"#;

#[test]
fn test_load_resolves_relative_paths() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("roi.geojson"), SQUARE).unwrap();
    fs::write(dir.path().join("parks.geojson"), SQUARE).unwrap();

    let config_path = dir.path().join("run.json");
    fs::write(
        &config_path,
        r#"{
            "roi": "roi.geojson",
            "positive": { "polygons": "parks.geojson", "count": 10, "point_seed": 7 },
            "negative": { "polygons": "/data/other.geojson" },
            "split": { "threshold": 0.6, "boundary": "training_only" },
            "service": { "base_url": "https://processing.example.org", "max_attempts": 5 }
        }"#,
    )
    .unwrap();

    let config = PipelineConfig::load(&config_path).unwrap();
    assert_eq!(config.roi, dir.path().join("roi.geojson"));
    assert_eq!(config.positive.polygons, dir.path().join("parks.geojson"));
    assert_eq!(config.negative.polygons, std::path::PathBuf::from("/data/other.geojson"));
    assert_eq!(config.positive.point_seed, 7);
    assert_eq!(config.negative.count, 3000);
    assert_eq!(config.split.threshold, 0.6);
    assert_eq!(config.service.max_attempts, 5);
    assert_eq!(config.service.timeout_secs, 300);

    let roi = read_polygons(&config.roi).unwrap();
    assert!(roi.contains(&Point::new(50.0, 50.0)));
    assert!(!roi.contains(&Point::new(150.0, 50.0)));
}

#[test]
fn test_invalid_config_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");

    fs::write(&path, r#"{ "acquisition": { "bands": ["B8", "SWIR"] } }"#).unwrap();
    assert!(matches!(PipelineConfig::load(&path), Err(CipError::Config(_))));

    fs::write(&path, r#"{ "split": { "threshold": "high" } }"#).unwrap();
    assert!(matches!(PipelineConfig::load(&path), Err(CipError::Json(_))));

    assert!(matches!(
        PipelineConfig::load(dir.path().join("missing.json")),
        Err(CipError::Io(_))
    ));
}
