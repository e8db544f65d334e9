use crate::geometry::PolygonCollection;
use crate::types::{CipError, CipResult, LabeledPoint, Point};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Rejection draws allowed per requested point before giving up
const MAX_ATTEMPTS_PER_POINT: usize = 10_000;

/// Where points whose split value equals the threshold end up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// `random <= t` trains and `random >= t` validates, so ties land in both sets
    #[default]
    Both,
    /// Ties go to training only
    TrainingOnly,
}

/// Training/validation partitioning parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitParams {
    /// Split threshold on the random column (0.7 gives a 7:3 split)
    pub threshold: f64,
    pub boundary: BoundaryPolicy,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            boundary: BoundaryPolicy::Both,
        }
    }
}

/// Training and validation subsets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitSets {
    pub training: Vec<LabeledPoint>,
    pub validation: Vec<LabeledPoint>,
}

impl SplitSets {
    /// Concatenate class-wise sets, `self` first
    pub fn merge(mut self, other: SplitSets) -> SplitSets {
        self.training.extend(other.training);
        self.validation.extend(other.validation);
        self
    }
}

/// `count` uniformly distributed points inside the union of `polygons`.
///
/// Rejection sampling inside the collection's bounding box with a seeded
/// ChaCha8 stream, so the same inputs always give the same points.
pub fn random_points(polygons: &PolygonCollection, count: usize, seed: u64) -> CipResult<Vec<Point>> {
    let bounds = polygons.bounds().ok_or_else(|| {
        CipError::DataAvailability("Reference polygon set is empty".to_string())
    })?;
    if polygons.area() <= 0.0 || bounds.width() <= 0.0 || bounds.height() <= 0.0 {
        return Err(CipError::DataAvailability(
            "Reference polygons have zero area".to_string(),
        ));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(count);
    let max_attempts = count.saturating_mul(MAX_ATTEMPTS_PER_POINT).max(MAX_ATTEMPTS_PER_POINT);
    let mut attempts = 0;
    while points.len() < count {
        if attempts == max_attempts {
            return Err(CipError::DataAvailability(format!(
                "Placed only {} of {} random points after {} draws",
                points.len(),
                count,
                attempts
            )));
        }
        attempts += 1;
        let candidate = Point::new(
            rng.gen_range(bounds.min_x..bounds.max_x),
            rng.gen_range(bounds.min_y..bounds.max_y),
        );
        if polygons.contains(&candidate) {
            points.push(candidate);
        }
    }
    log::debug!("Placed {} points in {} draws (seed {})", count, attempts, seed);
    Ok(points)
}

/// Attach the class label and an independent uniform split value in [0, 1)
pub fn label_points(points: &[Point], landcover: u8, seed: u64) -> Vec<LabeledPoint> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    points
        .iter()
        .map(|&location| LabeledPoint {
            location,
            landcover,
            random: rng.gen::<f64>(),
        })
        .collect()
}

/// Partition points on their split value
pub fn split_points(points: &[LabeledPoint], params: &SplitParams) -> SplitSets {
    let t = params.threshold;
    let mut sets = SplitSets::default();
    for p in points {
        let train = p.random <= t;
        let validate = match params.boundary {
            BoundaryPolicy::Both => p.random >= t,
            BoundaryPolicy::TrainingOnly => p.random > t,
        };
        if train {
            sets.training.push(*p);
        }
        if validate {
            sets.validation.push(*p);
        }
    }
    sets
}

/// Point generation for one reference class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSampling {
    pub landcover: u8,
    pub count: usize,
    /// Seed of the point placement stream
    pub point_seed: u64,
    /// Seed of the split-value stream
    pub split_seed: u64,
}

/// Generate, label and split the points of one class
pub fn sample_class(
    polygons: &PolygonCollection,
    class: &ClassSampling,
    split: &SplitParams,
) -> CipResult<SplitSets> {
    let points = random_points(polygons, class.count, class.point_seed)?;
    let labeled = label_points(&points, class.landcover, class.split_seed);
    let sets = split_points(&labeled, split);
    log::info!(
        "Class {}: {} points, {} training, {} validation",
        class.landcover,
        labeled.len(),
        sets.training.len(),
        sets.validation.len()
    );
    Ok(sets)
}
