//! Ten labeled points through sampling, prediction and the error matrix.

use approx::assert_abs_diff_eq;
use cipmap::core::accuracy::ErrorMatrix;
use cipmap::core::classify::classify_samples;
use cipmap::core::extract::{GridSampler, SampleRegionsParams};
use cipmap::io::service::{Classifier, Sampler};
use cipmap::{CipResult, GeoTransform, LabeledPoint, MultiBandImage, Point};
use ndarray::Array2;

/// Class 1 where the single feature is positive
struct SignRule {
    names: Vec<String>,
}

impl Classifier for SignRule {
    fn feature_names(&self) -> &[String] {
        &self.names
    }

    fn predict(&self, rows: &[Vec<f32>]) -> CipResult<Vec<u8>> {
        Ok(rows.iter().map(|r| u8::from(r[0] > 0.0)).collect())
    }
}

#[test]
fn test_hand_computed_metrics() {
    let _ = env_logger::builder().is_test(true).try_init();

    // One row of ten 10 m pixels; feature value = column - 4.5, except two
    // deliberately wrong pixels
    let mut values = Array2::from_shape_fn((1, 10), |(_, c)| c as f32 - 4.5);
    values[[0, 9]] = -1.0; // positive reference, predicted 0
    values[[0, 0]] = 1.0; // negative reference, predicted 1
    let image = MultiBandImage::from_bands(
        GeoTransform::north_up(0.0, 10.0, 10.0),
        vec![("ndbi", values)],
    )
    .unwrap();

    let points: Vec<LabeledPoint> = (0..10)
        .map(|c| LabeledPoint {
            location: Point::new(c as f64 * 10.0 + 5.0, 5.0),
            landcover: u8::from(c >= 5),
            random: 0.9,
        })
        .collect();

    let params = SampleRegionsParams {
        scale: 10.0,
        tile_scale: 10,
    };
    let table = GridSampler::new().sample_regions(&image, &points, &params).unwrap();
    assert_eq!(table.len(), 10);

    let classifier = SignRule {
        names: vec!["ndbi".to_string()],
    };
    let predicted = classify_samples(&table, &classifier).unwrap();
    let matrix = ErrorMatrix::from_pairs(&table.labels(), &predicted).unwrap();

    assert_eq!(matrix.as_rows(), &[vec![4, 1], vec![1, 4]]);
    assert_eq!(matrix.row_sums(), vec![5, 5]);
    assert_eq!(matrix.col_sums(), vec![5, 5]);

    let metrics = matrix.metrics();
    assert_abs_diff_eq!(metrics.overall_accuracy, 0.8, epsilon = 1e-12);
    assert_abs_diff_eq!(metrics.producers_accuracy[0], 0.8, epsilon = 1e-12);
    assert_abs_diff_eq!(metrics.producers_accuracy[1], 0.8, epsilon = 1e-12);
    assert_abs_diff_eq!(metrics.consumers_accuracy[1], 0.8, epsilon = 1e-12);
    assert_abs_diff_eq!(metrics.kappa, 0.6, epsilon = 1e-12);
}

#[test]
fn test_unbalanced_predictions() {
    // 6 reference positives, 4 negatives; the rule says 1 everywhere
    let actual = [1, 1, 1, 1, 1, 1, 0, 0, 0, 0];
    let predicted = [1; 10];
    let matrix = ErrorMatrix::from_pairs(&actual, &predicted).unwrap();

    assert_abs_diff_eq!(matrix.overall_accuracy(), 0.6, epsilon = 1e-12);
    assert_abs_diff_eq!(matrix.producers_accuracy()[1], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(matrix.producers_accuracy()[0], 0.0, epsilon = 1e-12);
    assert!(matrix.consumers_accuracy()[0].is_nan());
    // po = 0.6, pe = 0.6 * 1.0 + 0.4 * 0.0
    assert_abs_diff_eq!(matrix.kappa(), 0.0, epsilon = 1e-12);
}
