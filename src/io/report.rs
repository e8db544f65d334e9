//! Run summary written at the end of a classification.

use crate::config::PipelineConfig;
use crate::core::accuracy::{AccuracyMetrics, ErrorMatrix};
use crate::core::sampling::SplitSets;
use crate::types::{CipResult, ClassMap, DateRange, LabeledPoint, NO_CLASS};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Point counts per class for one subset
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubsetSize {
    pub positive: usize,
    pub negative: usize,
}

impl SubsetSize {
    fn count(points: &[LabeledPoint], positive: u8) -> Self {
        let n = points.iter().filter(|p| p.landcover == positive).count();
        Self {
            positive: n,
            negative: points.len() - n,
        }
    }

    pub fn total(&self) -> usize {
        self.positive + self.negative
    }
}

/// Summary of a pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub collection: String,
    pub date_range: DateRange,
    pub feature_names: Vec<String>,
    pub training_points: SubsetSize,
    pub validation_points: SubsetSize,
    /// Points left after sampling dropped masked locations
    pub training_samples: usize,
    pub validation_samples: usize,
    pub error_matrix: ErrorMatrix,
    pub metrics: AccuracyMetrics,
    /// Pixels per class in the opened map, `NO_CLASS` excluded
    pub class_pixels: BTreeMap<u8, u64>,
}

impl PipelineReport {
    pub fn new(
        config: &PipelineConfig,
        feature_names: Vec<String>,
        points: &SplitSets,
        training_samples: usize,
        validation_samples: usize,
        error_matrix: ErrorMatrix,
        class_map: &ClassMap,
    ) -> Self {
        let positive = config.positive_sampling().landcover;
        let mut class_pixels = BTreeMap::new();
        for &label in class_map.iter().filter(|&&v| v != NO_CLASS) {
            *class_pixels.entry(label).or_insert(0) += 1;
        }
        Self {
            collection: config.acquisition.collection.clone(),
            date_range: config.acquisition.date_range(),
            feature_names,
            training_points: SubsetSize::count(&points.training, positive),
            validation_points: SubsetSize::count(&points.validation, positive),
            training_samples,
            validation_samples,
            metrics: error_matrix.metrics(),
            error_matrix,
            class_pixels,
        }
    }

    /// Write the report as pretty-printed JSON; undefined statistics become `null`
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> CipResult<()> {
        let path = path.as_ref();
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::info!("Report written to {}", path.display());
        Ok(())
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Collection {} ({} to {})",
            self.collection, self.date_range.start, self.date_range.end
        )?;
        writeln!(f, "Features ({}): {}", self.feature_names.len(), self.feature_names.join(", "))?;
        writeln!(
            f,
            "Training points:   {} CIPs, {} other ({} sampled)",
            self.training_points.positive, self.training_points.negative, self.training_samples
        )?;
        writeln!(
            f,
            "Validation points: {} CIPs, {} other ({} sampled)",
            self.validation_points.positive, self.validation_points.negative, self.validation_samples
        )?;
        writeln!(f)?;
        writeln!(f, "Validation error matrix:")?;
        write!(f, "{}", self.error_matrix)?;
        writeln!(f)?;
        write!(f, "{}", self.metrics)?;
        for (class, pixels) in &self.class_pixels {
            writeln!(f, "Class {} pixels: {}", class, pixels)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;
    use ndarray::array;

    fn point(landcover: u8) -> LabeledPoint {
        LabeledPoint {
            location: Point::new(0.0, 0.0),
            landcover,
            random: 0.5,
        }
    }

    fn report() -> PipelineReport {
        let points = SplitSets {
            training: vec![point(1), point(1), point(0)],
            validation: vec![point(1), point(0)],
        };
        let matrix = ErrorMatrix::from_pairs(&[1, 0], &[1, 1]).unwrap();
        let map = array![[1, 0], [NO_CLASS, 1]];
        PipelineReport::new(
            &PipelineConfig::default(),
            vec!["B8".to_string()],
            &points,
            3,
            2,
            matrix,
            &map,
        )
    }

    #[test]
    fn test_report_counts() {
        let report = report();
        assert_eq!(report.training_points, SubsetSize { positive: 2, negative: 1 });
        assert_eq!(report.validation_points.total(), 2);
        assert_eq!(report.class_pixels.get(&1), Some(&2));
        assert_eq!(report.class_pixels.get(&0), Some(&1));
        assert!(!report.class_pixels.contains_key(&NO_CLASS));
    }

    #[test]
    fn test_report_json_and_text() {
        let report = report();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["training_points"]["positive"], 2);
        // No validation sample was predicted as class 0
        assert!(value["metrics"]["consumers_accuracy"][0].is_null());

        let text = report.to_string();
        assert!(text.contains("Validation error matrix"));
        assert!(text.contains("Kappa"));
    }
}
