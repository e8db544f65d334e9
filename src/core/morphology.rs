//! Morphological opening of class maps.
//!
//! Focal minimum then focal maximum over a square structuring element.
//! `NO_CLASS` pixels are skipped inside windows and stay `NO_CLASS`;
//! windows are truncated at the raster edge.

use crate::types::{CipError, CipResult, ClassMap, NO_CLASS};
use ndarray::Zip;
use serde::{Deserialize, Serialize};

/// Opening parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpeningParams {
    /// Radius of the square kernel (1 gives a 3x3 window)
    pub kernel_radius: usize,
}

impl Default for OpeningParams {
    fn default() -> Self {
        Self { kernel_radius: 1 }
    }
}

fn focal(map: &ClassMap, radius: usize, pick: fn(u8, u8) -> u8) -> ClassMap {
    let (rows, cols) = map.dim();
    let reduce = |(r, c): (usize, usize), &center: &u8| -> u8 {
        if center == NO_CLASS {
            return NO_CLASS;
        }
        let (r0, r1) = (r.saturating_sub(radius), (r + radius).min(rows - 1));
        let (c0, c1) = (c.saturating_sub(radius), (c + radius).min(cols - 1));
        let mut acc = center;
        for rr in r0..=r1 {
            for cc in c0..=c1 {
                let v = map[[rr, cc]];
                if v != NO_CLASS {
                    acc = pick(acc, v);
                }
            }
        }
        acc
    };

    #[cfg(feature = "parallel")]
    {
        Zip::indexed(map).par_map_collect(reduce)
    }
    #[cfg(not(feature = "parallel"))]
    {
        Zip::indexed(map).map_collect(reduce)
    }
}

/// Erosion: every valid pixel takes the smallest label in its window
pub fn focal_min(map: &ClassMap, radius: usize) -> ClassMap {
    focal(map, radius, std::cmp::min)
}

/// Dilation: every valid pixel takes the largest label in its window
pub fn focal_max(map: &ClassMap, radius: usize) -> ClassMap {
    focal(map, radius, std::cmp::max)
}

/// Erosion followed by dilation, one iteration each
pub fn opening(map: &ClassMap, params: &OpeningParams) -> CipResult<ClassMap> {
    if params.kernel_radius == 0 {
        return Err(CipError::InvalidInput(
            "Kernel radius must be > 0".to_string(),
        ));
    }
    if map.is_empty() {
        return Ok(map.clone());
    }
    log::info!(
        "Morphological opening with {}x{} square kernel",
        2 * params.kernel_radius + 1,
        2 * params.kernel_radius + 1
    );
    let eroded = focal_min(map, params.kernel_radius);
    let opened = focal_max(&eroded, params.kernel_radius);
    let changed = Zip::from(map)
        .and(&opened)
        .fold(0usize, |n, a, b| if a != b { n + 1 } else { n });
    log::debug!("Opening changed {} pixels", changed);
    Ok(opened)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_isolated_pixel_removed() {
        let mut map = Array2::<u8>::zeros((7, 7));
        map[[3, 3]] = 1;
        let opened = opening(&map, &OpeningParams::default()).unwrap();
        assert!(opened.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_solid_block_survives() {
        let mut map = Array2::<u8>::zeros((9, 9));
        for r in 2..6 {
            for c in 2..6 {
                map[[r, c]] = 1;
            }
        }
        let opened = opening(&map, &OpeningParams::default()).unwrap();
        assert_eq!(opened, map);
    }

    #[test]
    fn test_order_is_erosion_then_dilation() {
        // A one-pixel hole in foreground: closing would fill it, opening keeps it
        let mut map = Array2::<u8>::from_elem((7, 7), 1);
        map[[3, 3]] = 0;
        let opened = opening(&map, &OpeningParams::default()).unwrap();
        assert_eq!(opened[[3, 3]], 0);
        // Eroded ring around the hole grows back from the untouched border
        assert_eq!(opened[[2, 2]], 1);
        assert_eq!(opened, map);
    }

    #[test]
    fn test_no_class_ignored_and_kept() {
        let map = array![
            [1, 1, NO_CLASS],
            [1, 1, NO_CLASS],
            [NO_CLASS, NO_CLASS, NO_CLASS],
        ];
        let opened = opening(&map, &OpeningParams::default()).unwrap();
        assert_eq!(opened, map);
    }

    #[test]
    fn test_zero_radius_rejected() {
        let map = Array2::<u8>::zeros((3, 3));
        assert!(opening(&map, &OpeningParams { kernel_radius: 0 }).is_err());
    }
}
