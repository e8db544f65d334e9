//! Error matrix and the accuracy statistics reported for validation.

use crate::types::{CipError, CipResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Square error matrix.
///
/// `counts[actual][predicted]` counts validation samples whose true label is
/// `actual` and whose predicted label is `predicted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMatrix {
    counts: Vec<Vec<u64>>,
}

/// Scalar and per-class statistics derived from an [`ErrorMatrix`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    pub overall_accuracy: f64,
    /// Indexed by class label; `NaN` when the class has no reference samples
    pub producers_accuracy: Vec<f64>,
    /// Indexed by class label; `NaN` when the class was never predicted
    pub consumers_accuracy: Vec<f64>,
    pub kappa: f64,
}

impl ErrorMatrix {
    /// Build the matrix from paired true and predicted labels.
    ///
    /// The order is the largest label seen plus one, and at least 2.
    pub fn from_pairs(actual: &[u8], predicted: &[u8]) -> CipResult<Self> {
        if actual.len() != predicted.len() {
            return Err(CipError::InvalidInput(format!(
                "{} reference labels but {} predictions",
                actual.len(),
                predicted.len()
            )));
        }
        if actual.is_empty() {
            return Err(CipError::DataAvailability(
                "No validation samples to build an error matrix".to_string(),
            ));
        }
        let order = actual
            .iter()
            .chain(predicted)
            .map(|&l| l as usize + 1)
            .max()
            .unwrap_or(2)
            .max(2);
        let mut counts = vec![vec![0u64; order]; order];
        for (&a, &p) in actual.iter().zip(predicted) {
            counts[a as usize][p as usize] += 1;
        }
        Ok(Self { counts })
    }

    /// Wrap precomputed counts (rows are true labels)
    pub fn from_counts(counts: Vec<Vec<u64>>) -> CipResult<Self> {
        let order = counts.len();
        if order == 0 || counts.iter().any(|row| row.len() != order) {
            return Err(CipError::InvalidInput(
                "Error matrix must be square and non-empty".to_string(),
            ));
        }
        Ok(Self { counts })
    }

    pub fn order(&self) -> usize {
        self.counts.len()
    }

    pub fn as_rows(&self) -> &[Vec<u64>] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    pub fn row_sums(&self) -> Vec<u64> {
        self.counts.iter().map(|row| row.iter().sum()).collect()
    }

    pub fn col_sums(&self) -> Vec<u64> {
        (0..self.order())
            .map(|j| self.counts.iter().map(|row| row[j]).sum())
            .collect()
    }

    fn diagonal(&self) -> u64 {
        (0..self.order()).map(|i| self.counts[i][i]).sum()
    }

    /// Correct predictions over all samples
    pub fn overall_accuracy(&self) -> f64 {
        ratio(self.diagonal(), self.total())
    }

    /// Per class: correct predictions over reference samples of that class
    pub fn producers_accuracy(&self) -> Vec<f64> {
        self.row_sums()
            .iter()
            .enumerate()
            .map(|(i, &n)| ratio(self.counts[i][i], n))
            .collect()
    }

    /// Per class: correct predictions over all predictions of that class
    pub fn consumers_accuracy(&self) -> Vec<f64> {
        self.col_sums()
            .iter()
            .enumerate()
            .map(|(j, &n)| ratio(self.counts[j][j], n))
            .collect()
    }

    /// Cohen's Kappa: (po - pe) / (1 - pe)
    pub fn kappa(&self) -> f64 {
        let total = self.total() as f64;
        if total == 0.0 {
            return f64::NAN;
        }
        let po = self.diagonal() as f64 / total;
        let pe: f64 = self
            .row_sums()
            .iter()
            .zip(self.col_sums())
            .map(|(&r, c)| (r as f64 / total) * (c as f64 / total))
            .sum();
        if (1.0 - pe).abs() < f64::EPSILON {
            return f64::NAN;
        }
        (po - pe) / (1.0 - pe)
    }

    pub fn metrics(&self) -> AccuracyMetrics {
        AccuracyMetrics {
            overall_accuracy: self.overall_accuracy(),
            producers_accuracy: self.producers_accuracy(),
            consumers_accuracy: self.consumers_accuracy(),
            kappa: self.kappa(),
        }
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        f64::NAN
    } else {
        num as f64 / den as f64
    }
}

impl fmt::Display for ErrorMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}", "")?;
        for j in 0..self.order() {
            write!(f, " pred_{j:>3}")?;
        }
        writeln!(f)?;
        for (i, row) in self.counts.iter().enumerate() {
            write!(f, "true_{i:>3}")?;
            for val in row {
                write!(f, " {val:>8}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl fmt::Display for AccuracyMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Overall accuracy:    {:.4}", self.overall_accuracy)?;
        writeln!(f, "Kappa:               {:.4}", self.kappa)?;
        for (class, (pa, ca)) in self
            .producers_accuracy
            .iter()
            .zip(&self.consumers_accuracy)
            .enumerate()
        {
            writeln!(
                f,
                "Class {class}: producer's {pa:.4}, consumer's {ca:.4}"
            )?;
        }
        Ok(())
    }
}
