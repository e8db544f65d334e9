use crate::geometry::PolygonCollection;
use crate::io::service::Classifier;
use crate::types::{CipError, CipResult, ClassMap, MultiBandImage, SampleTable, NO_CLASS};
use ndarray::Array2;

/// Classify every valid pixel of `image` inside `roi`.
///
/// Pixels with any undefined feature, or whose centre lies outside the ROI,
/// are `NO_CLASS`. Bands are matched to the classifier by name.
pub fn classify_image(
    image: &MultiBandImage,
    roi: Option<&PolygonCollection>,
    classifier: &dyn Classifier,
) -> CipResult<ClassMap> {
    let stack = image.select(classifier.feature_names())?;
    let (rows, cols) = stack.shape();
    let gt = *stack.geo_transform();

    let mut positions = Vec::new();
    let mut features = Vec::new();
    let mut outside = 0usize;
    for r in 0..rows {
        for c in 0..cols {
            if let Some(roi) = roi {
                if !roi.contains(&gt.pixel_center(r, c)) {
                    outside += 1;
                    continue;
                }
            }
            let pixel = stack.pixel(r, c);
            if pixel.iter().all(|v| v.is_finite()) {
                positions.push((r, c));
                features.push(pixel);
            }
        }
    }
    log::info!(
        "Classifying {} of {} pixels ({} outside the ROI)",
        positions.len(),
        rows * cols,
        outside
    );

    let mut map = Array2::from_elem((rows, cols), NO_CLASS);
    if positions.is_empty() {
        log::warn!("No valid pixels to classify");
        return Ok(map);
    }

    let labels = classifier.predict(&features)?;
    if labels.len() != positions.len() {
        return Err(CipError::Processing(format!(
            "Classifier returned {} labels for {} pixels",
            labels.len(),
            positions.len()
        )));
    }
    for ((r, c), label) in positions.into_iter().zip(labels) {
        map[[r, c]] = label;
    }
    Ok(map)
}

/// Predict labels for a sampled table, in record order
pub fn classify_samples(table: &SampleTable, classifier: &dyn Classifier) -> CipResult<Vec<u8>> {
    if table.feature_names != classifier.feature_names() {
        return Err(CipError::InvalidInput(format!(
            "Sample columns {:?} do not match classifier inputs {:?}",
            table.feature_names,
            classifier.feature_names()
        )));
    }
    let labels = classifier.predict(&table.feature_rows())?;
    if labels.len() != table.len() {
        return Err(CipError::Processing(format!(
            "Classifier returned {} labels for {} samples",
            labels.len(),
            table.len()
        )));
    }
    Ok(labels)
}
